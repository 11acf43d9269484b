//! Bridge error types

use core::fmt;

/// Bridge operation result type
pub type Result<T> = core::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeError {
    /// Push into a full ring FIFO
    FifoOverflow,
    /// Keyboard outbound queue cannot hold the whole sequence
    KeyboardQueueFull,
    /// Host pulled the keyboard clock low during a device send
    BusCollision,
    /// A GPIO line could not be read or driven
    Gpio,
    /// Serial channel has no UART installed
    NotInstalled,
    /// Serial channel already has a UART installed
    AlreadyInstalled,
    /// Mass-storage device does not use 512-byte blocks
    UnsupportedBlockSize,
    /// Mass-storage read did not complete successfully
    StorageRead,
    /// No mass-storage device is attached
    NoStorageDevice,
    /// HID report too short or malformed
    InvalidReport,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FifoOverflow => write!(f, "FIFO overflow"),
            Self::KeyboardQueueFull => write!(f, "Keyboard queue full"),
            Self::BusCollision => write!(f, "Keyboard bus collision"),
            Self::Gpio => write!(f, "GPIO error"),
            Self::NotInstalled => write!(f, "Serial channel not installed"),
            Self::AlreadyInstalled => write!(f, "Serial channel already installed"),
            Self::UnsupportedBlockSize => write!(f, "Unsupported block size"),
            Self::StorageRead => write!(f, "Storage read failed"),
            Self::NoStorageDevice => write!(f, "No storage device attached"),
            Self::InvalidReport => write!(f, "Invalid HID report"),
        }
    }
}
