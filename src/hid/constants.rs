//! HID protocol constants
//!
//! Boot interface protocol codes from USB HID Specification 1.11, 4.3

/// HID interface protocol codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidProtocol {
    /// No boot protocol (report descriptor required)
    None,
    /// Boot keyboard
    Keyboard,
    /// Boot mouse
    Mouse,
    /// Anything else the interface reports
    Other(u8),
}

impl From<u8> for HidProtocol {
    fn from(val: u8) -> Self {
        match val {
            0x00 => Self::None,
            0x01 => Self::Keyboard,
            0x02 => Self::Mouse,
            other => Self::Other(other),
        }
    }
}
