//! Tiled handheld icon formats.

use super::pixel::{bgr555_to_argb32, rgb565_to_argb32};
use super::{DecodedImage, SBit};

/// Position of pixel `i` inside an 8x8 3DS tile (Morton order, X in the low bit).
#[inline]
const fn morton_xy(i: u32) -> (u32, u32) {
    let x = (i & 1) | ((i >> 1) & 2) | ((i >> 2) & 4);
    let y = ((i >> 1) & 1) | ((i >> 2) & 2) | ((i >> 3) & 4);
    (x, y)
}

/// 3DS RGB565 texture: 8x8 tiles in raster order, Morton order inside each tile.
///
/// Both dimensions must be multiples of 8.
pub fn decode_n3ds_rgb565(width: u32, height: u32, data: &[u16]) -> Option<DecodedImage> {
    if width % 8 != 0 || height % 8 != 0 || data.len() < width as usize * height as usize {
        return None;
    }

    let mut img = DecodedImage::new(width, height)?;
    let mut src = data.iter();
    for ty in (0..height).step_by(8) {
        for tx in (0..width).step_by(8) {
            for i in 0..64 {
                let (x, y) = morton_xy(i);
                img.set_pixel(tx + x, ty + y, rgb565_to_argb32(*src.next()?));
            }
        }
    }
    Some(img.with_sbit(SBit::new(5, 6, 5, 0, 0)))
}

/// Nintendo DS 4bpp paletted texture in 8x8 tiles.
///
/// Each byte holds two pixels, left pixel in the low nibble. Palette entry 0
/// is transparent.
pub fn decode_nds_ci4(
    width: u32,
    height: u32,
    data: &[u8],
    palette: &[u16; 16],
) -> Option<DecodedImage> {
    if width % 8 != 0 || height % 8 != 0 || data.len() < (width as usize * height as usize) / 2 {
        return None;
    }

    let mut colors = palette.map(bgr555_to_argb32);
    colors[0] = 0;

    let mut img = DecodedImage::new(width, height)?;
    let mut tiles = data.chunks_exact(32);
    for ty in (0..height).step_by(8) {
        for tx in (0..width).step_by(8) {
            let tile = tiles.next()?;
            for (i, &byte) in tile.iter().enumerate() {
                let (x, y) = ((i % 4) as u32 * 2, (i / 4) as u32);
                img.set_pixel(tx + x, ty + y, colors[(byte & 0xF) as usize]);
                img.set_pixel(tx + x + 1, ty + y, colors[(byte >> 4) as usize]);
            }
        }
    }
    Some(img.with_sbit(SBit::new(5, 5, 5, 0, 1)))
}
