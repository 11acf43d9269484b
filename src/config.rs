//! Bridge configuration
//!
//! Protocol constants for the three legacy interfaces plus [`BridgeConfig`],
//! the runtime set of tunables handed to the adapters.

use crate::serial::{DataBits, Parity, SerialFormat, StopBits};

/// Serial mouse line format: 1200 baud, 7 data bits, no parity, 1 stop bit
pub const MOUSE_FORMAT: SerialFormat = SerialFormat {
    baud: 1_200,
    data_bits: DataBits::Seven,
    stop_bits: StopBits::One,
    parity: Parity::None,
};

/// Serial storage line format: 115200 baud, 8N1
pub const STORAGE_FORMAT: SerialFormat = SerialFormat {
    baud: 115_200,
    data_bits: DataBits::Eight,
    stop_bits: StopBits::One,
    parity: Parity::None,
};

/// Identification sent after the host drops DTR ('M' = Microsoft, '3' = 3 buttons)
pub const MOUSE_SIGNATURE: [u8; 2] = [b'M', b'3'];

/// Bytes the host sends to switch the serial port into storage mode
pub const STORAGE_MAGIC: [u8; 2] = [b'*', b'^'];

/// Acknowledgment written before the port is reprogrammed
pub const STORAGE_ACK: [u8; 2] = [b'K', b'O'];

/// Sector read request command byte
pub const STORAGE_READ_COMMAND: u8 = b'R';

/// Request length: command byte + 32-bit big-endian sector index
pub const STORAGE_REQUEST_LEN: usize = 5;

/// Only devices with this block size are accepted
pub const BLOCK_SIZE: usize = 512;

/// Block payload + big-endian CRC16 trailer
pub const STORAGE_RESPONSE_LEN: usize = BLOCK_SIZE + 2;

/// Added to every requested sector (first partition of a classic MBR layout)
pub const PARTITION_OFFSET: u32 = 63;

/// Time given to the ack bytes to leave the wire before reprogramming the port
pub const STORAGE_SETTLE_MS: u32 = 20;

/// Keyboard bus clock half-period
pub const KEYBOARD_HALF_PERIOD_US: u32 = 400;

/// Keyboard outbound queue depth
pub const KEYBOARD_QUEUE_LEN: usize = 64;

/// Transmit FIFO size; holds a complete storage response with room to spare
pub const TX_FIFO_SIZE: usize = 1024;

/// Receive FIFO size
pub const RX_FIFO_SIZE: usize = 64;

/// Runtime bridge configuration
///
/// `Default` reproduces the protocol constants above. Setters follow the
/// builder style so a board can override a single value:
///
/// ```
/// use retro_usb_bridge::config::BridgeConfig;
///
/// let config = BridgeConfig::default()
///     .partition_offset(0)
///     .keyboard_half_period_us(40);
/// assert_eq!(config.partition_offset, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    /// Line format while emulating the serial mouse
    pub mouse_format: SerialFormat,
    /// Line format after the storage handshake
    pub storage_format: SerialFormat,
    /// Sector offset added to every storage request
    pub partition_offset: u32,
    /// Delay between the storage ack and the port reprogramming
    pub storage_settle_ms: u32,
    /// Keyboard bus clock half-period
    pub keyboard_half_period_us: u32,
}

impl BridgeConfig {
    /// Configuration built from the protocol constants
    pub const fn new() -> Self {
        Self {
            mouse_format: MOUSE_FORMAT,
            storage_format: STORAGE_FORMAT,
            partition_offset: PARTITION_OFFSET,
            storage_settle_ms: STORAGE_SETTLE_MS,
            keyboard_half_period_us: KEYBOARD_HALF_PERIOD_US,
        }
    }

    /// Override the mouse line format
    pub fn mouse_format(mut self, format: SerialFormat) -> Self {
        self.mouse_format = format;
        self
    }

    /// Override the storage line format
    pub fn storage_format(mut self, format: SerialFormat) -> Self {
        self.storage_format = format;
        self
    }

    /// Override the partition offset
    pub fn partition_offset(mut self, sectors: u32) -> Self {
        self.partition_offset = sectors;
        self
    }

    /// Override the storage settling interval
    pub fn storage_settle_ms(mut self, ms: u32) -> Self {
        self.storage_settle_ms = ms;
        self
    }

    /// Override the keyboard clock half-period
    pub fn keyboard_half_period_us(mut self, us: u32) -> Self {
        self.keyboard_half_period_us = us;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
