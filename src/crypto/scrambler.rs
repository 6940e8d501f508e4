//! CTR key scrambler.
//!
//! The console never stores normal keys for most keyslots. Instead a KeyX
//! and a KeyY are fed through a fixed hardware function to produce the
//! normal key used by AES.

/// Constant added by the hardware key generator.
pub const KEYGEN_CONSTANT: u128 = 0x1FF9E9AAC5FE0408024591DC5D52768A;

/// Derives a normal key: `ROL128((ROL128(KeyX, 2) ^ KeyY) + C, 87)`.
pub fn scramble(key_x: &[u8; 0x10], key_y: &[u8; 0x10]) -> [u8; 0x10] {
    let x = u128::from_be_bytes(*key_x);
    let y = u128::from_be_bytes(*key_y);
    (x.rotate_left(2) ^ y)
        .wrapping_add(KEYGEN_CONSTANT)
        .rotate_left(87)
        .to_be_bytes()
}
