//! Dreamcast PowerVR textures: twiddled 16-bit and vector-quantized.
//!
//! Twiddled textures store pixels in Z-order with the Y coordinate in the
//! low bit of each pair: `index = (twiddle[x] << 1) | twiddle[y]`.

use std::sync::LazyLock;

use super::pixel::{argb1555_to_argb32, argb4444_to_argb32, rgb565_to_argb32};
use super::{DecodedImage, SBit};

/// Largest supported texture edge.
pub const MAX_DIMENSION: u32 = 4096;

/// Bit-spread table: bit `n` of the index moves to bit `2n`.
static TWIDDLE_MAP: LazyLock<Box<[u32]>> = LazyLock::new(|| {
    (0..MAX_DIMENSION)
        .map(|i| {
            (0..12u32)
                .filter(|bit| i & (1u32 << bit) != 0)
                .fold(0u32, |acc, bit| acc | (1u32 << (2 * bit)))
        })
        .collect()
});

#[inline]
fn twiddle(v: u32) -> usize {
    TWIDDLE_MAP[v as usize] as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Argb1555,
    Rgb565,
    Argb4444,
}

impl PixelFormat {
    fn convert(self, px: u16) -> u32 {
        match self {
            PixelFormat::Argb1555 => argb1555_to_argb32(px),
            PixelFormat::Rgb565 => rgb565_to_argb32(px),
            PixelFormat::Argb4444 => argb4444_to_argb32(px),
        }
    }

    fn sbit(self) -> SBit {
        match self {
            PixelFormat::Argb1555 => SBit::new(5, 5, 5, 0, 1),
            PixelFormat::Rgb565 => SBit::new(5, 6, 5, 0, 0),
            PixelFormat::Argb4444 => SBit::new(4, 4, 4, 0, 4),
        }
    }
}

fn valid_square(width: u32, height: u32) -> bool {
    width == height && width.is_power_of_two() && width <= MAX_DIMENSION
}

/// Square, power-of-two twiddled texture of 16-bit pixels.
pub fn decode_twiddled(
    format: PixelFormat,
    width: u32,
    height: u32,
    data: &[u16],
) -> Option<DecodedImage> {
    if !valid_square(width, height) || data.len() < width as usize * height as usize {
        return None;
    }

    let mut img = DecodedImage::new(width, height)?;
    for y in 0..height {
        for x in 0..width {
            let px = data[(twiddle(x) << 1) | twiddle(y)];
            img.set_pixel(x, y, format.convert(px));
        }
    }
    Some(img.with_sbit(format.sbit()))
}

/// Number of 16-bit codebook entries for a VQ texture.
///
/// Regular VQ always carries 256 codes of 4 pixels. Small VQ shrinks the
/// codebook with the texture width, and more so when mipmaps are present.
pub fn vq_codebook_entries(small_vq: bool, has_mipmaps: bool, width: u32) -> usize {
    if !small_vq {
        return 1024;
    }
    match (has_mipmaps, width) {
        (false, ..=16) => 64,
        (false, ..=32) => 256,
        (false, ..=64) => 512,
        (true, ..=16) => 64,
        (true, ..=32) => 128,
        (true, ..=64) => 256,
        _ => 1024,
    }
}

/// Vector-quantized texture.
///
/// Each index byte selects four codebook pixels covering a 2x2 block; the
/// index array itself is twiddled at half resolution.
pub fn decode_vq(
    format: PixelFormat,
    small_vq: bool,
    has_mipmaps: bool,
    width: u32,
    height: u32,
    codebook: &[u16],
    indices: &[u8],
) -> Option<DecodedImage> {
    if !valid_square(width, height) || width < 2 {
        return None;
    }
    let entries = vq_codebook_entries(small_vq, has_mipmaps, width);
    if codebook.len() < entries || indices.len() < (width as usize / 2) * (height as usize / 2) {
        return None;
    }

    let palette: Vec<u32> = codebook[..entries]
        .iter()
        .map(|&px| format.convert(px))
        .collect();

    let mut img = DecodedImage::new(width, height)?;
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let src = (twiddle(x >> 1) << 1) | twiddle(y >> 1);
            let base = indices[src] as usize * 4;
            let quad = palette.get(base..base + 4)?;
            img.set_pixel(x, y, quad[0]);
            img.set_pixel(x, y + 1, quad[1]);
            img.set_pixel(x + 1, y, quad[2]);
            img.set_pixel(x + 1, y + 1, quad[3]);
        }
    }
    Some(img.with_sbit(format.sbit()))
}
