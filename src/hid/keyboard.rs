//! HID keyboard support
//!
//! Boot protocol keyboard reports (USB HID Spec 1.11, Appendix B.1)

use bitflags::bitflags;

use crate::error::{BridgeError, Result};

/// HID keyboard report (boot protocol)
///
/// Standard 8-byte keyboard report format:
/// - Byte 0: Modifier keys (Ctrl, Alt, Shift, GUI)
/// - Byte 1: Reserved (OEM use)
/// - Bytes 2-7: Up to 6 simultaneous key presses
///
/// See USB HID Specification 1.11, Appendix B.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    /// Modifier key states
    pub modifiers: KeyModifiers,
    /// Active keycodes (up to 6, zero = unused slot)
    keycodes: [u8; 6],
}

impl KeyboardReport {
    /// Report with every key released
    pub const fn released() -> Self {
        Self {
            modifiers: KeyModifiers::empty(),
            keycodes: [0; 6],
        }
    }

    /// Parse report from raw 8-byte data
    ///
    /// ```
    /// use retro_usb_bridge::hid::{KeyCode, KeyboardReport};
    ///
    /// let data: [u8; 8] = [0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
    /// let report = KeyboardReport::parse(&data).unwrap();
    /// assert!(report.is_key_pressed(KeyCode::A));
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(BridgeError::InvalidReport);
        }

        let mut keycodes = [0u8; 6];
        keycodes.copy_from_slice(&data[2..8]);
        Ok(Self {
            modifiers: KeyModifiers::from_bits_retain(data[0]),
            keycodes,
        })
    }

    /// Get iterator over pressed keys (excluding modifiers)
    pub fn keys_pressed(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.keycodes
            .iter()
            .filter(|&&code| code != 0) // 0x00 = no key
            .map(|&code| KeyCode(code))
    }

    /// Check if specific key is pressed
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keycodes.contains(&key.0)
    }

    /// Check for the phantom state a keyboard sends when too many keys are
    /// held (every slot reports ErrorRollOver)
    pub fn is_rollover_error(&self) -> bool {
        self.keycodes.iter().all(|&code| code == KeyCode::ERROR_ROLLOVER.0)
    }
}

bitflags! {
    /// Keyboard modifier keys
    ///
    /// These are separate from regular keys and can be combined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyModifiers: u8 {
        /// Left Control
        const LEFT_CTRL  = 0b00000001;
        /// Left Shift
        const LEFT_SHIFT = 0b00000010;
        /// Left Alt
        const LEFT_ALT   = 0b00000100;
        /// Left GUI (Windows/Command key)
        const LEFT_GUI   = 0b00001000;
        /// Right Control
        const RIGHT_CTRL  = 0b00010000;
        /// Right Shift
        const RIGHT_SHIFT = 0b00100000;
        /// Right Alt
        const RIGHT_ALT   = 0b01000000;
        /// Right GUI (Windows/Command key)
        const RIGHT_GUI   = 0b10000000;
    }
}

impl KeyModifiers {
    /// Modifier bits in report order, paired with the key they stand for
    pub const KEYS: [(KeyModifiers, KeyCode); 8] = [
        (Self::LEFT_CTRL, KeyCode::LEFT_CTRL),
        (Self::LEFT_SHIFT, KeyCode::LEFT_SHIFT),
        (Self::LEFT_ALT, KeyCode::LEFT_ALT),
        (Self::LEFT_GUI, KeyCode::LEFT_GUI),
        (Self::RIGHT_CTRL, KeyCode::RIGHT_CTRL),
        (Self::RIGHT_SHIFT, KeyCode::RIGHT_SHIFT),
        (Self::RIGHT_ALT, KeyCode::RIGHT_ALT),
        (Self::RIGHT_GUI, KeyCode::RIGHT_GUI),
    ];
}

#[cfg(feature = "defmt")]
impl defmt::Format for KeyModifiers {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "KeyModifiers({=u8:#x})", self.bits())
    }
}

/// HID keyboard keycode
///
/// Standard USB HID keyboard scancodes (Usage Page 0x07).
/// See HID Usage Tables 1.12, Section 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyCode(pub u8);

impl KeyCode {
    /// Reported in every slot when too many keys are held
    pub const ERROR_ROLLOVER: Self = Self(0x01);

    // Letter keys (0x04-0x1D)
    pub const A: Self = Self(0x04);
    pub const B: Self = Self(0x05);
    pub const C: Self = Self(0x06);
    pub const D: Self = Self(0x07);
    pub const E: Self = Self(0x08);
    pub const F: Self = Self(0x09);
    pub const G: Self = Self(0x0A);
    pub const H: Self = Self(0x0B);
    pub const I: Self = Self(0x0C);
    pub const J: Self = Self(0x0D);
    pub const K: Self = Self(0x0E);
    pub const L: Self = Self(0x0F);
    pub const M: Self = Self(0x10);
    pub const N: Self = Self(0x11);
    pub const O: Self = Self(0x12);
    pub const P: Self = Self(0x13);
    pub const Q: Self = Self(0x14);
    pub const R: Self = Self(0x15);
    pub const S: Self = Self(0x16);
    pub const T: Self = Self(0x17);
    pub const U: Self = Self(0x18);
    pub const V: Self = Self(0x19);
    pub const W: Self = Self(0x1A);
    pub const X: Self = Self(0x1B);
    pub const Y: Self = Self(0x1C);
    pub const Z: Self = Self(0x1D);

    // Number keys (0x1E-0x27)
    pub const KEY_1: Self = Self(0x1E);
    pub const KEY_2: Self = Self(0x1F);
    pub const KEY_3: Self = Self(0x20);
    pub const KEY_4: Self = Self(0x21);
    pub const KEY_5: Self = Self(0x22);
    pub const KEY_6: Self = Self(0x23);
    pub const KEY_7: Self = Self(0x24);
    pub const KEY_8: Self = Self(0x25);
    pub const KEY_9: Self = Self(0x26);
    pub const KEY_0: Self = Self(0x27);

    // Special keys
    pub const ENTER: Self = Self(0x28);
    pub const ESCAPE: Self = Self(0x29);
    pub const BACKSPACE: Self = Self(0x2A);
    pub const TAB: Self = Self(0x2B);
    pub const SPACE: Self = Self(0x2C);
    pub const MINUS: Self = Self(0x2D);
    pub const EQUALS: Self = Self(0x2E);
    pub const LEFT_BRACKET: Self = Self(0x2F);
    pub const RIGHT_BRACKET: Self = Self(0x30);
    pub const BACKSLASH: Self = Self(0x31);
    pub const SEMICOLON: Self = Self(0x33);
    pub const APOSTROPHE: Self = Self(0x34);
    pub const GRAVE: Self = Self(0x35);
    pub const COMMA: Self = Self(0x36);
    pub const PERIOD: Self = Self(0x37);
    pub const SLASH: Self = Self(0x38);
    pub const CAPS_LOCK: Self = Self(0x39);

    // Function keys
    pub const F1: Self = Self(0x3A);
    pub const F2: Self = Self(0x3B);
    pub const F3: Self = Self(0x3C);
    pub const F4: Self = Self(0x3D);
    pub const F5: Self = Self(0x3E);
    pub const F6: Self = Self(0x3F);
    pub const F7: Self = Self(0x40);
    pub const F8: Self = Self(0x41);
    pub const F9: Self = Self(0x42);
    pub const F10: Self = Self(0x43);
    pub const F11: Self = Self(0x44);
    pub const F12: Self = Self(0x45);

    // Navigation keys
    pub const INSERT: Self = Self(0x49);
    pub const HOME: Self = Self(0x4A);
    pub const PAGE_UP: Self = Self(0x4B);
    pub const DELETE: Self = Self(0x4C);
    pub const END: Self = Self(0x4D);
    pub const PAGE_DOWN: Self = Self(0x4E);
    pub const RIGHT_ARROW: Self = Self(0x4F);
    pub const LEFT_ARROW: Self = Self(0x50);
    pub const DOWN_ARROW: Self = Self(0x51);
    pub const UP_ARROW: Self = Self(0x52);

    // Lock keys
    pub const SCROLL_LOCK: Self = Self(0x47);
    pub const NUM_LOCK: Self = Self(0x53);

    // Modifier usages (0xE0-0xE7); boot reports carry these as bits in
    // byte 0, these values name them for translation
    pub const LEFT_CTRL: Self = Self(0xE0);
    pub const LEFT_SHIFT: Self = Self(0xE1);
    pub const LEFT_ALT: Self = Self(0xE2);
    pub const LEFT_GUI: Self = Self(0xE3);
    pub const RIGHT_CTRL: Self = Self(0xE4);
    pub const RIGHT_SHIFT: Self = Self(0xE5);
    pub const RIGHT_ALT: Self = Self(0xE6);
    pub const RIGHT_GUI: Self = Self(0xE7);

    /// Get raw keycode value
    pub fn raw(&self) -> u8 {
        self.0
    }
}
