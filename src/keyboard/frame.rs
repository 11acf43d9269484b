//! 11-bit keyboard bus frame
//!
//! ```text
//! bit   0      1..=8        9        10
//!     start  data (LSB)   parity    stop
//!       0                  odd        1
//! ```

/// Bits per frame
pub const FRAME_BITS: usize = 11;

/// Odd parity bit for `byte`: set when the data has an even number of ones
#[inline]
pub const fn odd_parity(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

/// Frame bits for `byte`, bit 0 (start) first
pub const fn encode(byte: u8) -> u16 {
    let parity = odd_parity(byte) as u16;
    // start bit is bit 0 = 0
    ((byte as u16) << 1) | (parity << 9) | (1 << 10)
}

/// Split the 9 bits clocked in after the start bit into data and parity
///
/// Returns the data byte and whether the parity bit was correct.
pub const fn decode(bits: u16) -> (u8, bool) {
    let byte = bits as u8;
    let parity = (bits >> 8) & 1 == 1;
    (byte, parity == odd_parity(byte))
}
