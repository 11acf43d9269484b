//! Microsoft/Logitech 3-button serial mouse emulation
//!
//! Line format is 1200 baud 7N1. Each motion packet looks like this:
//!
//! ```text
//! byte  d6   d5   d4   d3   d2   d1   d0
//!    1   1   lb   rb  dy7  dy6  dx7  dx6
//!    2   0  dx5  dx4  dx3  dx2  dx1  dx0
//!    3   0  dy5  dy4  dy3  dy2  dy1  dy0
//!   (4   0    1    0    0    0    0    0) - only while middle is held
//! ```
//!
//! The host probes for a mouse by toggling DTR; on the falling edge the
//! mouse answers with `M3` (Microsoft protocol, 3 buttons).

use embedded_hal::digital::InputPin;

use crate::config::MOUSE_SIGNATURE;
use crate::error::{BridgeError, Result};
use crate::hid::{MouseEvent, MouseEventAggregator};
use super::{SerialChannel, SerialFormat, UartPort};

/// Sync bit marking the first byte of a packet
const SYNC: u8 = 0b100_0000;
const LEFT: u8 = 0b010_0000;
const RIGHT: u8 = 0b001_0000;
/// Fourth byte sent while the middle button is held
const MIDDLE: u8 = 0b010_0000;
const LOW_SIX: u8 = 0b0011_1111;

/// Encoded serial mouse packet, 3 or 4 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MousePacket {
    bytes: [u8; 4],
    len: usize,
}

impl MousePacket {
    /// Encode an accumulated event
    ///
    /// Deltas are halved to approximate the lower resolution of a serial
    /// mouse, then clamped to the signed 8-bit range the packet can carry.
    ///
    /// ```
    /// use retro_usb_bridge::hid::{MouseButtons, MouseEvent};
    /// use retro_usb_bridge::serial::MousePacket;
    ///
    /// let packet = MousePacket::encode(&MouseEvent { dx: 10, dy: -4, buttons: MouseButtons::LEFT });
    /// assert_eq!(packet.as_bytes(), &[0x6C, 0x05, 0x3E]);
    /// ```
    pub fn encode(event: &MouseEvent) -> Self {
        let x = scale(event.dx);
        let y = scale(event.dy);

        let mut head = SYNC;
        if event.buttons.left() {
            head |= LEFT;
        }
        if event.buttons.right() {
            head |= RIGHT;
        }
        head |= ((y >> 6) & 0b11) << 2;
        head |= (x >> 6) & 0b11;

        let mut packet = Self {
            bytes: [head, x & LOW_SIX, y & LOW_SIX, 0],
            len: 3,
        };
        if event.buttons.middle() {
            packet.bytes[3] = MIDDLE;
            packet.len = 4;
        }
        packet
    }

    /// Bytes to put on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Halve and clamp one axis, returned as the two's complement byte
fn scale(delta: i32) -> u8 {
    (delta / 2).clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8
}

/// What a [`SerialMouse::poll`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MousePoll {
    /// Nothing to do
    Idle,
    /// DTR dropped, port reset and signature queued
    Identified,
    /// A motion packet was queued
    Sent(MousePacket),
}

/// Serial mouse adapter
///
/// Watches DTR for the host's detection handshake and turns pending
/// pointer events into packets on the shared [`SerialChannel`].
pub struct SerialMouse<P> {
    dtr: P,
    previous_dtr: bool,
    format: SerialFormat,
}

impl<P: InputPin> SerialMouse<P> {
    /// Create a mouse adapter on the given DTR input
    ///
    /// DTR is assumed high at startup, so a host already holding it low
    /// gets the signature on the first poll.
    pub fn new(dtr: P, format: SerialFormat) -> Self {
        Self {
            dtr,
            previous_dtr: true,
            format,
        }
    }

    /// Service the handshake line and send at most one packet
    ///
    /// A packet is only built when the transmit FIFO has drained, so
    /// reports arriving while the slow line is busy keep accumulating in
    /// `events` instead of queueing up stale motion.
    ///
    /// The pending event is therefore only taken from `events` on a poll
    /// that finds the transmit FIFO empty, not on every poll; a poll while
    /// the FIFO still holds bytes leaves `events` untouched.
    pub fn poll<U: UartPort, const TX: usize, const RX: usize>(
        &mut self,
        channel: &SerialChannel<U, TX, RX>,
        events: &mut MouseEventAggregator,
    ) -> Result<MousePoll> {
        let dtr = self.dtr.is_high().map_err(|_| BridgeError::Gpio)?;
        let previous = core::mem::replace(&mut self.previous_dtr, dtr);

        if previous && !dtr {
            #[cfg(feature = "defmt")]
            defmt::info!("serial: sending mouse handshake");

            let format = self.format;
            channel.lock(|port| {
                port.reconfigure(format);
                port.enqueue_all(&MOUSE_SIGNATURE)
            })??;
            return Ok(MousePoll::Identified);
        }

        channel.lock(|port| {
            if !port.transmit_fifo().is_empty() {
                return Ok(MousePoll::Idle);
            }
            match events.take_pending() {
                Some(event) => {
                    let packet = MousePacket::encode(&event);
                    port.enqueue_all(packet.as_bytes())?;
                    Ok(MousePoll::Sent(packet))
                }
                None => Ok(MousePoll::Idle),
            }
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::MouseButtons;

    fn event(dx: i32, dy: i32, buttons: MouseButtons) -> MouseEvent {
        MouseEvent { dx, dy, buttons }
    }

    #[test]
    fn test_encode_left_button() {
        let packet = MousePacket::encode(&event(10, -4, MouseButtons::LEFT));
        // x = 5, y = -2 (0xFE): dy7/dy6 = 11, dx7/dx6 = 00
        assert_eq!(packet.as_bytes(), &[0b110_1100, 0b000_0101, 0b011_1110]);
    }

    #[test]
    fn test_encode_middle_adds_fourth_byte() {
        let packet = MousePacket::encode(&event(0, 0, MouseButtons::MIDDLE));
        assert_eq!(packet.as_bytes(), &[0x40, 0x00, 0x00, 0x20]);
    }

    #[test]
    fn test_encode_right_and_negative_x() {
        let packet = MousePacket::encode(&event(-3, 1, MouseButtons::RIGHT | MouseButtons::LEFT));
        // -3 / 2 = -1 (0xFF), 1 / 2 = 0
        assert_eq!(packet.as_bytes(), &[0x40 | 0x20 | 0x10 | 0b11, 0x3F, 0x00]);
    }

    #[test]
    fn test_large_motion_clamps() {
        let packet = MousePacket::encode(&event(1000, -1000, MouseButtons::empty()));
        let clamped = MousePacket::encode(&event(254, -256, MouseButtons::empty()));
        assert_eq!(packet, clamped);
        // +127 = 0x7F, -128 = 0x80
        assert_eq!(packet.as_bytes(), &[0x40 | 0b1000 | 0b01, 0x3F, 0x00]);
    }
}
