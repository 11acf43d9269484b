//! USB HID usage → AT scan code set 2
//!
//! Boot keyboard reports are snapshots of the held keys. The translator
//! diffs each report against the previous one and emits a break code for
//! every key that went up, then a make code for every key that went down.
//! Modifier bits are treated as keys of their own.

use heapless::Vec;

use crate::hid::{KeyCode, KeyModifiers, KeyboardReport};

/// Prefix for the extended (grey) keys
pub const EXTENDED: u8 = 0xE0;
/// Prefix of every break code
pub const BREAK: u8 = 0xF0;

/// Room for one report transition: 14 keys changing, at most 3 bytes each
pub const MAX_SEQUENCE: usize = 48;

/// Scan code bytes for one report transition
pub type ScancodeSequence = Vec<u8, MAX_SEQUENCE>;

/// Set 2 code for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scancode {
    /// Code byte
    pub code: u8,
    /// Needs the `E0` prefix
    pub extended: bool,
}

const fn base(code: u8) -> Option<Scancode> {
    Some(Scancode { code, extended: false })
}

const fn extended(code: u8) -> Option<Scancode> {
    Some(Scancode { code, extended: true })
}

/// Look up the set 2 code for a HID usage, `None` for keys with no mapping
pub fn lookup(key: KeyCode) -> Option<Scancode> {
    match key {
        KeyCode::A => base(0x1C),
        KeyCode::B => base(0x32),
        KeyCode::C => base(0x21),
        KeyCode::D => base(0x23),
        KeyCode::E => base(0x24),
        KeyCode::F => base(0x2B),
        KeyCode::G => base(0x34),
        KeyCode::H => base(0x33),
        KeyCode::I => base(0x43),
        KeyCode::J => base(0x3B),
        KeyCode::K => base(0x42),
        KeyCode::L => base(0x4B),
        KeyCode::M => base(0x3A),
        KeyCode::N => base(0x31),
        KeyCode::O => base(0x44),
        KeyCode::P => base(0x4D),
        KeyCode::Q => base(0x15),
        KeyCode::R => base(0x2D),
        KeyCode::S => base(0x1B),
        KeyCode::T => base(0x2C),
        KeyCode::U => base(0x3C),
        KeyCode::V => base(0x2A),
        KeyCode::W => base(0x1D),
        KeyCode::X => base(0x22),
        KeyCode::Y => base(0x35),
        KeyCode::Z => base(0x1A),

        KeyCode::KEY_1 => base(0x16),
        KeyCode::KEY_2 => base(0x1E),
        KeyCode::KEY_3 => base(0x26),
        KeyCode::KEY_4 => base(0x25),
        KeyCode::KEY_5 => base(0x2E),
        KeyCode::KEY_6 => base(0x36),
        KeyCode::KEY_7 => base(0x3D),
        KeyCode::KEY_8 => base(0x3E),
        KeyCode::KEY_9 => base(0x46),
        KeyCode::KEY_0 => base(0x45),

        KeyCode::ENTER => base(0x5A),
        KeyCode::ESCAPE => base(0x76),
        KeyCode::BACKSPACE => base(0x66),
        KeyCode::TAB => base(0x0D),
        KeyCode::SPACE => base(0x29),
        KeyCode::MINUS => base(0x4E),
        KeyCode::EQUALS => base(0x55),
        KeyCode::LEFT_BRACKET => base(0x54),
        KeyCode::RIGHT_BRACKET => base(0x5B),
        KeyCode::BACKSLASH => base(0x5D),
        KeyCode::SEMICOLON => base(0x4C),
        KeyCode::APOSTROPHE => base(0x52),
        KeyCode::GRAVE => base(0x0E),
        KeyCode::COMMA => base(0x41),
        KeyCode::PERIOD => base(0x49),
        KeyCode::SLASH => base(0x4A),
        KeyCode::CAPS_LOCK => base(0x58),

        KeyCode::F1 => base(0x05),
        KeyCode::F2 => base(0x06),
        KeyCode::F3 => base(0x04),
        KeyCode::F4 => base(0x0C),
        KeyCode::F5 => base(0x03),
        KeyCode::F6 => base(0x0B),
        KeyCode::F7 => base(0x83),
        KeyCode::F8 => base(0x0A),
        KeyCode::F9 => base(0x01),
        KeyCode::F10 => base(0x09),
        KeyCode::F11 => base(0x78),
        KeyCode::F12 => base(0x07),

        KeyCode::INSERT => extended(0x70),
        KeyCode::HOME => extended(0x6C),
        KeyCode::PAGE_UP => extended(0x7D),
        KeyCode::DELETE => extended(0x71),
        KeyCode::END => extended(0x69),
        KeyCode::PAGE_DOWN => extended(0x7A),
        KeyCode::RIGHT_ARROW => extended(0x74),
        KeyCode::LEFT_ARROW => extended(0x6B),
        KeyCode::DOWN_ARROW => extended(0x72),
        KeyCode::UP_ARROW => extended(0x75),

        KeyCode::SCROLL_LOCK => base(0x7E),
        KeyCode::NUM_LOCK => base(0x77),

        KeyCode::LEFT_CTRL => base(0x14),
        KeyCode::LEFT_SHIFT => base(0x12),
        KeyCode::LEFT_ALT => base(0x11),
        KeyCode::LEFT_GUI => extended(0x1F),
        KeyCode::RIGHT_CTRL => extended(0x14),
        KeyCode::RIGHT_SHIFT => base(0x59),
        KeyCode::RIGHT_ALT => extended(0x11),
        KeyCode::RIGHT_GUI => extended(0x27),

        _ => None,
    }
}

/// Turns successive keyboard reports into make/break sequences
#[derive(Debug, Default)]
pub struct ScancodeTranslator {
    previous: KeyboardReport,
}

impl ScancodeTranslator {
    /// Start with every key released
    pub const fn new() -> Self {
        Self {
            previous: KeyboardReport::released(),
        }
    }

    /// Forget the held keys, e.g. when the keyboard is unplugged
    pub fn reset(&mut self) {
        self.previous = KeyboardReport::released();
    }

    /// Diff `report` against the previous one without committing it
    ///
    /// Rollover error reports carry no key state and produce nothing.
    pub fn diff(&self, report: &KeyboardReport) -> ScancodeSequence {
        let mut out = ScancodeSequence::new();
        if report.is_rollover_error() {
            #[cfg(feature = "defmt")]
            defmt::debug!("keyboard: rollover report ignored");
            return out;
        }

        for key in held(&self.previous).filter(|&k| !is_held(report, k)) {
            push_code(&mut out, key, true);
        }
        for key in held(report).filter(|&k| !is_held(&self.previous, k)) {
            push_code(&mut out, key, false);
        }
        out
    }

    /// Make `report` the reference for the next diff
    ///
    /// Call once the sequence from [`diff`](Self::diff) has been queued.
    /// Rollover error reports leave the reference unchanged.
    pub fn commit(&mut self, report: &KeyboardReport) {
        if !report.is_rollover_error() {
            self.previous = *report;
        }
    }

    /// `diff` followed by `commit`
    pub fn translate(&mut self, report: &KeyboardReport) -> ScancodeSequence {
        let out = self.diff(report);
        self.commit(report);
        out
    }
}

/// Modifier keys followed by the regular keys of a report
fn held(report: &KeyboardReport) -> impl Iterator<Item = KeyCode> + '_ {
    KeyModifiers::KEYS
        .iter()
        .filter(|(bit, _)| report.modifiers.contains(*bit))
        .map(|&(_, key)| key)
        .chain(report.keys_pressed())
}

fn is_held(report: &KeyboardReport, key: KeyCode) -> bool {
    KeyModifiers::KEYS
        .iter()
        .find(|&&(_, k)| k == key)
        .map_or_else(|| report.is_key_pressed(key), |&(bit, _)| report.modifiers.contains(bit))
}

fn push_code(out: &mut ScancodeSequence, key: KeyCode, released: bool) {
    let Some(scancode) = lookup(key) else {
        #[cfg(feature = "defmt")]
        defmt::debug!("keyboard: no set 2 code for usage {=u8:#x}", key.raw());
        return;
    };
    // Six keys plus eight modifiers at three bytes each always fit
    if scancode.extended {
        let _ = out.push(EXTENDED);
    }
    if released {
        let _ = out.push(BREAK);
    }
    let _ = out.push(scancode.code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(modifiers: u8, keys: &[u8]) -> KeyboardReport {
        let mut raw = [0u8; 8];
        raw[0] = modifiers;
        raw[2..2 + keys.len()].copy_from_slice(keys);
        KeyboardReport::parse(&raw).unwrap()
    }

    #[test]
    fn test_make_then_break() {
        let mut t = ScancodeTranslator::new();
        assert_eq!(t.translate(&report(0, &[KeyCode::A.0])).as_slice(), &[0x1C]);
        // repeated report: nothing changed
        assert!(t.translate(&report(0, &[KeyCode::A.0])).is_empty());
        assert_eq!(t.translate(&report(0, &[])).as_slice(), &[0xF0, 0x1C]);
    }

    #[test]
    fn test_extended_keys() {
        let mut t = ScancodeTranslator::new();
        assert_eq!(t.translate(&report(0, &[KeyCode::UP_ARROW.0])).as_slice(), &[0xE0, 0x75]);
        assert_eq!(t.translate(&report(0, &[])).as_slice(), &[0xE0, 0xF0, 0x75]);
    }

    #[test]
    fn test_modifiers_are_keys() {
        let mut t = ScancodeTranslator::new();
        let shift_a = report(KeyModifiers::LEFT_SHIFT.bits(), &[KeyCode::A.0]);
        assert_eq!(t.translate(&shift_a).as_slice(), &[0x12, 0x1C]);

        let right_ctrl = report(KeyModifiers::RIGHT_CTRL.bits(), &[]);
        // breaks first, then the new make
        assert_eq!(
            t.translate(&right_ctrl).as_slice(),
            &[0xF0, 0x12, 0xF0, 0x1C, 0xE0, 0x14]
        );
    }

    #[test]
    fn test_rollover_report_ignored() {
        let mut t = ScancodeTranslator::new();
        t.translate(&report(0, &[KeyCode::B.0]));
        assert!(t.translate(&report(0, &[0x01; 6])).is_empty());
        // still relative to the last real report
        assert_eq!(t.translate(&report(0, &[])).as_slice(), &[0xF0, 0x32]);
    }

    #[test]
    fn test_diff_without_commit_repeats() {
        let mut t = ScancodeTranslator::new();
        t.translate(&report(0, &[KeyCode::A.0]));
        let release = report(0, &[]);
        assert_eq!(t.diff(&release).as_slice(), &[0xF0, 0x1C]);
        // not committed: the break is produced again
        assert_eq!(t.diff(&release).as_slice(), &[0xF0, 0x1C]);
        t.commit(&release);
        assert!(t.diff(&release).is_empty());
    }

    #[test]
    fn test_unmapped_usage_skipped() {
        let mut t = ScancodeTranslator::new();
        // keypad 1 has no entry
        assert_eq!(t.translate(&report(0, &[0x59, KeyCode::F7.0])).as_slice(), &[0x83]);
    }

    #[test]
    fn test_full_report_fits() {
        let mut t = ScancodeTranslator::new();
        let keys = [
            KeyCode::HOME.0,
            KeyCode::END.0,
            KeyCode::INSERT.0,
            KeyCode::DELETE.0,
            KeyCode::PAGE_UP.0,
            KeyCode::PAGE_DOWN.0,
        ];
        let down = t.translate(&report(0xFF, &keys));
        // four modifiers need E0, four do not
        assert_eq!(down.len(), 4 + 4 * 2 + 6 * 2);
        let up = t.translate(&report(0, &[]));
        assert_eq!(up.len(), 4 * 2 + 4 * 3 + 6 * 3);
        // reset forgets held keys without emitting breaks
        t.translate(&report(0, &[KeyCode::A.0]));
        t.reset();
        assert_eq!(t.translate(&report(0, &[KeyCode::A.0])).as_slice(), &[0x1C]);
    }
}
