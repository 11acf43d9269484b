//! Legacy keyboard bus device
//!
//! Emulates the device side of the two-wire AT/PS/2 keyboard bus by bit
//! banging four GPIOs: two open-drain outputs that pull clock and data low,
//! and two inputs that read the wired-AND level of each line.
//!
//! # Bus Protocol
//!
//! Idle is both lines released (high). The device generates the clock in
//! both directions.
//!
//! - **Device → host**: 11-bit [`frame`]; the device puts each bit on data
//!   while clock is high, then pulses clock low. The host may inhibit a
//!   send at any time by holding clock low, in which case the byte is
//!   retried later.
//! - **Host → device**: the host pulls clock low, then data low (start
//!   bit), then releases clock. The device clocks in start, 8 data bits and
//!   parity, waits for the stop bit, and acknowledges by pulling data low
//!   for one more clock pulse.
//!
//! Timing is driven by the [`DelayNs`] provider: the whole transfer runs in
//! the caller's context, roughly 9 ms per byte at the default half-period.

pub mod frame;
pub mod observer;
pub mod scancode;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Deque;

use crate::config::KEYBOARD_QUEUE_LEN;
use crate::error::{BridgeError, Result};

pub use frame::{odd_parity, FRAME_BITS};
pub use observer::{BusObserver, BusTransition, DebugPinObserver};
pub use scancode::{Scancode, ScancodeSequence, ScancodeTranslator};

/// Host command: reset and run the self test
pub const CMD_RESET: u8 = 0xFF;
/// Reply: command acknowledged
pub const REPLY_ACK: u8 = 0xFA;
/// Reply: basic assurance test passed
pub const REPLY_SELF_TEST_PASSED: u8 = 0xAA;

/// The four keyboard bus GPIOs
pub struct KeyboardPins<CO, DO, CI, DI> {
    /// Pulls clock low when set low, releases it when set high
    pub clock_out: CO,
    /// Pulls data low when set low, releases it when set high
    pub data_out: DO,
    /// Reads the clock line level
    pub clock_in: CI,
    /// Reads the data line level
    pub data_in: DI,
}

/// Result of one [`LegacyKeyboard::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyboardPoll {
    /// Bus idle, nothing queued
    Idle,
    /// Host command received and answered
    Command(u8),
    /// This many queued bytes were sent
    Sent(usize),
    /// Host inhibited the bus after `sent` bytes; the rest stays queued
    Aborted {
        /// Bytes sent before the collision
        sent: usize,
    },
}

/// Keyboard device seen by the bridge main loop
pub trait KeyboardBus {
    /// Queue a whole scan code sequence, or nothing if it does not fit
    fn queue_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Serve the bus once
    fn poll(&mut self) -> Result<KeyboardPoll>;
}

/// Bit-banged legacy keyboard
pub struct LegacyKeyboard<CO, DO, CI, DI, D, O = ()> {
    pins: KeyboardPins<CO, DO, CI, DI>,
    delay: D,
    half_period_us: u32,
    outbound: Deque<u8, KEYBOARD_QUEUE_LEN>,
    observer: O,
}

fn pin<T, E>(result: core::result::Result<T, E>) -> Result<T> {
    result.map_err(|_| BridgeError::Gpio)
}

impl<CO, DO, CI, DI, D> LegacyKeyboard<CO, DO, CI, DI, D>
where
    CO: OutputPin,
    DO: OutputPin,
    CI: InputPin,
    DI: InputPin,
    D: DelayNs,
{
    /// Take the pins and release both lines
    pub fn new(pins: KeyboardPins<CO, DO, CI, DI>, delay: D, half_period_us: u32) -> Result<Self> {
        let mut keyboard = Self {
            pins,
            delay,
            half_period_us,
            outbound: Deque::new(),
            observer: (),
        };
        keyboard.release()?;
        Ok(keyboard)
    }

    /// Attach an observer to the state machine
    pub fn with_observer<O: BusObserver>(self, observer: O) -> LegacyKeyboard<CO, DO, CI, DI, D, O> {
        LegacyKeyboard {
            pins: self.pins,
            delay: self.delay,
            half_period_us: self.half_period_us,
            outbound: self.outbound,
            observer,
        }
    }
}

impl<CO, DO, CI, DI, D, O> LegacyKeyboard<CO, DO, CI, DI, D, O>
where
    CO: OutputPin,
    DO: OutputPin,
    CI: InputPin,
    DI: InputPin,
    D: DelayNs,
    O: BusObserver,
{
    /// Bytes waiting to be sent, oldest first
    pub fn outbound(&self) -> impl Iterator<Item = u8> + '_ {
        self.outbound.iter().copied()
    }

    /// Number of bytes waiting to be sent
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Observer attached to the state machine
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Release both lines
    pub fn release(&mut self) -> Result<()> {
        pin(self.pins.clock_out.set_high())?;
        pin(self.pins.data_out.set_high())
    }

    /// Queue bytes for the host, all or nothing
    pub fn queue_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if KEYBOARD_QUEUE_LEN - self.outbound.len() < bytes.len() {
            #[cfg(feature = "defmt")]
            defmt::warn!("keyboard: queue full, dropping {} bytes", bytes.len());
            return Err(BridgeError::KeyboardQueueFull);
        }
        for &byte in bytes {
            self.outbound
                .push_back(byte)
                .map_err(|_| BridgeError::KeyboardQueueFull)?;
        }
        Ok(())
    }

    /// Serve the bus once
    ///
    /// A host request (clock and data both low) takes priority over sending.
    /// Otherwise queued bytes are sent until the queue is empty or the host
    /// inhibits the bus.
    pub fn poll(&mut self) -> Result<KeyboardPoll> {
        let clock_low = pin(self.pins.clock_in.is_low())?;
        let data_low = pin(self.pins.data_in.is_low())?;
        if clock_low && data_low {
            let command = self.receive()?;
            self.answer(command)?;
            return Ok(KeyboardPoll::Command(command));
        }

        if self.outbound.is_empty() {
            return Ok(KeyboardPoll::Idle);
        }
        self.send_queued()
    }

    fn half_period(&mut self) {
        self.delay.delay_us(self.half_period_us);
    }

    /// Clock in one byte from the host
    fn receive(&mut self) -> Result<u8> {
        self.observer.on_transition(BusTransition::HostRequest);

        // Host releases clock once it has set up the start bit
        while pin(self.pins.clock_in.is_low())? {}

        // start, 8 data bits, parity
        let mut bits: u16 = 0;
        for bit in 0..10 {
            self.half_period();
            pin(self.pins.clock_out.set_low())?;
            self.half_period();
            if pin(self.pins.data_in.is_high())? {
                bits |= 1 << bit;
            }
            pin(self.pins.clock_out.set_high())?;
        }

        // Stop bit
        while pin(self.pins.data_in.is_low())? {}

        // Ack: data low for one extra clock pulse
        self.half_period();
        pin(self.pins.data_out.set_low())?;
        pin(self.pins.clock_out.set_low())?;
        self.half_period();
        pin(self.pins.clock_out.set_high())?;
        pin(self.pins.data_out.set_high())?;

        let (byte, parity_ok) = frame::decode(bits >> 1);
        if !parity_ok {
            #[cfg(feature = "defmt")]
            defmt::warn!("keyboard: parity error on host byte {=u8:#x}", byte);
            self.observer.on_transition(BusTransition::ParityError(byte));
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("keyboard: host sent {=u8:#x}", byte);
        self.observer.on_transition(BusTransition::CommandReceived(byte));
        Ok(byte)
    }

    /// Queue the reply to a host command
    ///
    /// Any command supersedes scan codes still waiting to go out, so the
    /// queue is flushed first and the reply always fits.
    fn answer(&mut self, command: u8) -> Result<()> {
        if !self.outbound.is_empty() {
            #[cfg(feature = "defmt")]
            defmt::debug!("keyboard: host command flushes {} bytes", self.outbound.len());
            self.outbound.clear();
        }
        if command == CMD_RESET {
            #[cfg(feature = "defmt")]
            defmt::info!("keyboard: reset");
            self.queue_bytes(&[REPLY_ACK, REPLY_SELF_TEST_PASSED])?;
        } else {
            self.queue_bytes(&[REPLY_ACK])?;
        }
        self.observer.on_transition(BusTransition::ReplyQueued);
        Ok(())
    }

    fn send_queued(&mut self) -> Result<KeyboardPoll> {
        let mut sent = 0;
        while let Some(&byte) = self.outbound.front() {
            match self.send_byte(byte) {
                Ok(()) => {
                    self.outbound.pop_front();
                    self.observer.on_transition(BusTransition::FrameSent(byte));
                    sent += 1;
                }
                Err(BridgeError::BusCollision) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("keyboard: host inhibited send of {=u8:#x}", byte);
                    self.observer.on_transition(BusTransition::SendAborted(byte));
                    return Ok(KeyboardPoll::Aborted { sent });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(KeyboardPoll::Sent(sent))
    }

    /// Clock one frame out, checking for a host inhibit before every bit
    fn send_byte(&mut self, byte: u8) -> Result<()> {
        let bits = frame::encode(byte);
        for i in 0..FRAME_BITS {
            if pin(self.pins.clock_in.is_low())? {
                self.release()?;
                return Err(BridgeError::BusCollision);
            }
            if bits & (1 << i) != 0 {
                pin(self.pins.data_out.set_high())?;
            } else {
                pin(self.pins.data_out.set_low())?;
            }
            self.half_period();
            pin(self.pins.clock_out.set_low())?;
            self.half_period();
            pin(self.pins.clock_out.set_high())?;
        }
        pin(self.pins.data_out.set_high())?;
        // Inter-byte gap
        self.half_period();
        Ok(())
    }
}

impl<CO, DO, CI, DI, D, O> KeyboardBus for LegacyKeyboard<CO, DO, CI, DI, D, O>
where
    CO: OutputPin,
    DO: OutputPin,
    CI: InputPin,
    DI: InputPin,
    D: DelayNs,
    O: BusObserver,
{
    fn queue_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        LegacyKeyboard::queue_bytes(self, bytes)
    }

    fn poll(&mut self) -> Result<KeyboardPoll> {
        LegacyKeyboard::poll(self)
    }
}
