//! HID mouse support
//!
//! Boot protocol mouse reports (USB HID Spec 1.11, Appendix B.2)

use bitflags::bitflags;

use crate::error::{BridgeError, Result};
use super::aggregator::MouseEvent;

/// HID mouse report (boot protocol)
///
/// - Byte 0: Button states
/// - Byte 1: X displacement (signed)
/// - Byte 2: Y displacement (signed)
///
/// Trailing bytes (wheel, vendor data) are ignored; the legacy side has no
/// use for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MouseReport {
    /// Button states
    pub buttons: MouseButtons,
    /// X displacement, positive is right
    pub x: i8,
    /// Y displacement, positive is down
    pub y: i8,
}

impl MouseReport {
    /// Parse report from raw data
    ///
    /// ```
    /// use retro_usb_bridge::hid::{MouseButtons, MouseReport};
    ///
    /// let report = MouseReport::parse(&[0x01, 0x05, 0xFB, 0x00]).unwrap();
    /// assert_eq!(report.buttons, MouseButtons::LEFT);
    /// assert_eq!((report.x, report.y), (5, -5));
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [buttons, x, y, ..] => Ok(Self {
                buttons: MouseButtons::from_bits_truncate(*buttons),
                x: *x as i8,
                y: *y as i8,
            }),
            _ => Err(BridgeError::InvalidReport),
        }
    }

    /// Motion and buttons in aggregator form
    pub fn to_event(&self) -> MouseEvent {
        MouseEvent {
            dx: i32::from(self.x),
            dy: i32::from(self.y),
            buttons: self.buttons,
        }
    }
}

bitflags! {
    /// Mouse buttons that survive the trip to the legacy host
    ///
    /// Bit positions match the boot protocol report; extra buttons are
    /// truncated on parse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MouseButtons: u8 {
        /// Button 1 (left button)
        const LEFT   = 0b00000001;
        /// Button 2 (right button)
        const RIGHT  = 0b00000010;
        /// Button 3 (middle button / wheel click)
        const MIDDLE = 0b00000100;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MouseButtons {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "MouseButtons({=u8:#x})", self.bits())
    }
}

impl MouseButtons {
    /// Check if left button is pressed
    pub fn left(&self) -> bool {
        self.contains(Self::LEFT)
    }

    /// Check if right button is pressed
    pub fn right(&self) -> bool {
        self.contains(Self::RIGHT)
    }

    /// Check if middle button is pressed
    pub fn middle(&self) -> bool {
        self.contains(Self::MIDDLE)
    }
}
