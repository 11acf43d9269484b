//! Interrupt-driven serial channel
//!
//! A [`SerialChannel`] ties one asynchronous serial port to a transmit and a
//! receive [`RingFifo`]. The serial interrupt drains the receiver into the
//! receive FIFO and feeds the transmitter from the transmit FIFO; the main
//! loop works on the FIFOs through [`SerialChannel::lock`], which suppresses
//! the interrupt for the duration of the closure.
//!
//! The channel is `const`-constructible so it can be placed in a `static`
//! shared with the interrupt vector:
//!
//! ```ignore
//! static SERIAL: SerialChannel<Uart1> = SerialChannel::new();
//!
//! #[interrupt]
//! fn LPUART1() {
//!     SERIAL.on_interrupt();
//! }
//! ```
//!
//! The two adapters built on top of the channel are mutually exclusive:
//!
//! - [`mouse`] - Microsoft 3-button serial mouse emulation
//! - [`storage`] - sector relay with CRC16 trailer

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::config::{RX_FIFO_SIZE, TX_FIFO_SIZE};
use crate::error::{BridgeError, Result};
use crate::fifo::RingFifo;

pub mod mouse;
pub mod storage;

pub use mouse::{MousePacket, MousePoll, SerialMouse};
pub use storage::{crc16_xmodem, SerialStorage, StoragePoll};

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 7 data bits
    Seven = 7,
    /// 8 data bits
    Eight = 8,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One = 1,
    /// 2 stop bits
    Two = 2,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity bit
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Line format of the serial port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialFormat {
    /// Baud rate in bits per second
    pub baud: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Stop bits per character
    pub stop_bits: StopBits,
    /// Parity mode
    pub parity: Parity,
}

/// Which protocol currently owns the shared serial port
///
/// The only transition is `MouseHandshake -> Storage`, triggered by the
/// storage magic sequence. It is not reversed for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortMode {
    /// 1200 baud 7N1 serial mouse
    MouseHandshake,
    /// 115200 baud 8N1 sector relay
    Storage,
}

/// Hardware access to an asynchronous serial port
///
/// Implemented by the board support code on top of its UART peripheral.
/// None of these methods are called concurrently: the channel serializes
/// them behind a critical section.
pub trait UartPort {
    /// Reprogram baud rate and character format, hardware FIFOs disabled
    fn configure(&mut self, format: SerialFormat);

    /// Read one received character, if any is waiting
    fn read_byte(&mut self) -> Option<u8>;

    /// Check if the transmit holding register can take a character
    fn is_writable(&self) -> bool;

    /// Place one character in the transmit holding register
    ///
    /// Only called after `is_writable()` returned true.
    fn write_byte(&mut self, byte: u8);

    /// Write characters synchronously, bypassing the interrupt path
    fn write_blocking(&mut self, bytes: &[u8]);

    /// Enable or disable the receive interrupt
    fn set_rx_interrupt(&mut self, enabled: bool);

    /// Enable or disable the transmit-ready interrupt
    fn set_tx_interrupt(&mut self, enabled: bool);
}

/// Port state guarded by the channel's critical section
pub struct PortState<U, const TX: usize = TX_FIFO_SIZE, const RX: usize = RX_FIFO_SIZE> {
    uart: U,
    format: SerialFormat,
    transmit: RingFifo<TX>,
    receive: RingFifo<RX>,
}

impl<U: UartPort, const TX: usize, const RX: usize> PortState<U, TX, RX> {
    fn new(mut uart: U, format: SerialFormat) -> Self {
        uart.configure(format);
        uart.set_rx_interrupt(true);
        // Transmit interrupt is armed once there is something to send
        uart.set_tx_interrupt(false);
        Self {
            uart,
            format,
            transmit: RingFifo::new(),
            receive: RingFifo::new(),
        }
    }

    /// Queue a byte for transmission
    ///
    /// If nothing was queued the byte goes straight to the transmitter,
    /// which primes the transmit-ready interrupt chain.
    pub fn enqueue(&mut self, byte: u8) -> Result<()> {
        let was_empty = self.transmit.is_empty();
        self.transmit.push(byte)?;
        if was_empty {
            if self.uart.is_writable() {
                self.transmit_next();
            } else {
                // Holding register still busy, let the interrupt pick it up
                self.uart.set_tx_interrupt(true);
            }
        }
        Ok(())
    }

    /// Queue several bytes, all or nothing
    pub fn enqueue_all(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.transmit.free_space() {
            return Err(BridgeError::FifoOverflow);
        }
        bytes.iter().try_for_each(|&b| self.enqueue(b))
    }

    /// Reprogram the port and drop everything in flight
    pub fn reconfigure(&mut self, format: SerialFormat) {
        self.uart.configure(format);
        self.uart.set_tx_interrupt(false);
        self.format = format;
        self.transmit.clear();
        self.receive.clear();
    }

    /// Write directly to the hardware, ignoring the transmit FIFO
    pub fn write_blocking(&mut self, bytes: &[u8]) {
        self.uart.write_blocking(bytes);
    }

    /// Current line format
    pub fn format(&self) -> SerialFormat {
        self.format
    }

    /// Bytes received and not yet consumed
    pub fn receive_fifo(&mut self) -> &mut RingFifo<RX> {
        &mut self.receive
    }

    /// Bytes waiting for the transmitter
    pub fn transmit_fifo(&self) -> &RingFifo<TX> {
        &self.transmit
    }

    /// Interrupt body: drain the receiver, then feed the transmitter
    fn service(&mut self, overruns: &AtomicU32) {
        while let Some(byte) = self.uart.read_byte() {
            if self.receive.push(byte).is_err() {
                overruns.fetch_add(1, Ordering::Relaxed);
            }
        }

        if self.uart.is_writable() {
            if self.transmit.is_empty() {
                // Nothing left to send
                self.uart.set_tx_interrupt(false);
            } else {
                self.transmit_next();
            }
        }
    }

    fn transmit_next(&mut self) {
        if let Some(byte) = self.transmit.pop() {
            self.uart.write_byte(byte);
            self.uart.set_tx_interrupt(true);
        }
    }
}

/// Serial port shared between the main loop and the serial interrupt
pub struct SerialChannel<U, const TX: usize = TX_FIFO_SIZE, const RX: usize = RX_FIFO_SIZE> {
    port: Mutex<RefCell<Option<PortState<U, TX, RX>>>>,
    rx_overruns: AtomicU32,
}

impl<U: UartPort, const TX: usize, const RX: usize> SerialChannel<U, TX, RX> {
    /// Create a channel with no UART installed
    pub const fn new() -> Self {
        Self {
            port: Mutex::new(RefCell::new(None)),
            rx_overruns: AtomicU32::new(0),
        }
    }

    /// Bind a UART to the channel and arm its receive interrupt
    pub fn install(&self, uart: U, format: SerialFormat) -> Result<()> {
        critical_section::with(|cs| {
            let mut port = self.port.borrow_ref_mut(cs);
            if port.is_some() {
                return Err(BridgeError::AlreadyInstalled);
            }
            *port = Some(PortState::new(uart, format));

            #[cfg(feature = "defmt")]
            defmt::info!("serial: installed at {} baud", format.baud);

            Ok(())
        })
    }

    /// Detach the UART, disabling its interrupts
    pub fn uninstall(&self) -> Option<U> {
        critical_section::with(|cs| {
            self.port.borrow_ref_mut(cs).take().map(|mut state| {
                state.uart.set_rx_interrupt(false);
                state.uart.set_tx_interrupt(false);
                state.uart
            })
        })
    }

    /// Check if a UART is bound
    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| self.port.borrow_ref(cs).is_some())
    }

    /// Serial interrupt handler body
    ///
    /// Call from the UART interrupt vector. Does nothing while no UART is
    /// installed.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            if let Some(state) = self.port.borrow_ref_mut(cs).as_mut() {
                state.service(&self.rx_overruns);
            }
        });
    }

    /// Run `f` on the port state with the serial interrupt suppressed
    ///
    /// Use this for any inspection that spans more than one FIFO access and
    /// for multi-byte enqueues that must not interleave with the interrupt.
    pub fn lock<R>(&self, f: impl FnOnce(&mut PortState<U, TX, RX>) -> R) -> Result<R> {
        critical_section::with(|cs| {
            self.port
                .borrow_ref_mut(cs)
                .as_mut()
                .map(f)
                .ok_or(BridgeError::NotInstalled)
        })
    }

    /// Queue a single byte for transmission
    pub fn enqueue(&self, byte: u8) -> Result<()> {
        self.lock(|port| port.enqueue(byte))?
    }

    /// Reprogram the port; both FIFOs are cleared and in-flight bytes lost
    pub fn reconfigure(&self, format: SerialFormat) -> Result<()> {
        self.lock(|port| port.reconfigure(format))
    }

    /// Received bytes dropped because the receive FIFO was full
    pub fn rx_overruns(&self) -> u32 {
        self.rx_overruns.load(Ordering::Relaxed)
    }
}

impl<U: UartPort, const TX: usize, const RX: usize> Default for SerialChannel<U, TX, RX> {
    fn default() -> Self {
        Self::new()
    }
}
