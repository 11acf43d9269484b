//! HID (Human Interface Device) input side
//!
//! Boot protocol reports from USB keyboards and mice, and the
//! [`MouseEventAggregator`] that coalesces pointer reports until the serial
//! mouse adapter can send them.
//!
//! # Boot Protocol
//!
//! Only boot protocol devices are accepted. Their reports have a fixed
//! layout (8 bytes for keyboards, at least 3 bytes for mice) so no report
//! descriptor parsing is needed.
//!
//! # Reference
//!
//! - USB HID Specification 1.11: <https://www.usb.org/document-library/device-class-definition-hid-111>
//! - HID Usage Tables 1.12: <https://usb.org/document-library/hid-usage-tables-15>

pub mod aggregator;
pub mod constants;
pub mod keyboard;
pub mod mouse;

pub use aggregator::{MouseEvent, MouseEventAggregator};
pub use constants::*;
pub use keyboard::{KeyCode, KeyModifiers, KeyboardReport};
pub use mouse::{MouseButtons, MouseReport};
