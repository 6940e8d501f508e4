//! S2TC decoders.
//!
//! S2TC reads the same block formats as S3TC but never interpolates: the
//! in-between palette codes are replaced by one of the two endpoints,
//! chosen by the pixel's position parity `(x ^ y) & 1` inside the tile.
//! Codes that S3TC defines as literals (DXT1 black/transparent, DXT5
//! alpha 0 and 255) keep their literal values.

use super::dxtn::{self, AlphaBlock, ColorBlock, Tile};
use super::pixel::{argb32, rgb565_to_argb32};
use super::{DecodedImage, SBit};

#[inline]
fn odd(i: usize) -> bool {
    ((i % 4) ^ (i / 4)) & 1 != 0
}

/// `three_color_mode` enables the DXT1 `c0 <= c1` literal for index 3.
fn color_tile(block: &ColorBlock, three_color_mode: bool, color3_transparent: bool) -> Tile {
    let c0 = rgb565_to_argb32(block.c0);
    let c1 = rgb565_to_argb32(block.c1);
    let literal3 = three_color_mode && block.c0 <= block.c1;
    std::array::from_fn(|i| match block.index(i) {
        0 => c0,
        1 => c1,
        2 => {
            if odd(i) {
                c1
            } else {
                c0
            }
        }
        _ if literal3 => {
            if color3_transparent {
                0
            } else {
                0xFF00_0000
            }
        }
        _ => {
            if odd(i) {
                c0
            } else {
                c1
            }
        }
    })
}

fn alpha_values(b: &[u8]) -> [u8; 16] {
    let block = AlphaBlock::parse(b);
    let literals = block.a0 <= block.a1;
    std::array::from_fn(|i| match block.index(i) {
        0 => block.a0,
        1 => block.a1,
        6 if literals => 0x00,
        7 if literals => 0xFF,
        code => {
            // Alternate like the colour codes: even codes lean to a0.
            if odd(i) ^ (code & 1 != 0) {
                block.a1
            } else {
                block.a0
            }
        }
    })
}

fn with_alpha(color: u32, alpha: u8) -> u32 {
    (color & 0x00FF_FFFF) | ((alpha as u32) << 24)
}

pub fn decode_dxt1(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        color_tile(&ColorBlock::parse(b), true, false)
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 0)))
}

pub fn decode_dxt1_a1(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        color_tile(&ColorBlock::parse(b), true, true)
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 1)))
}

pub fn decode_dxt1_gcn(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_gcn_blocks(width, height, data, |block| color_tile(block, true, true))
        .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 1)))
}

pub fn decode_dxt3(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let colors = color_tile(&ColorBlock::parse(&b[8..]), false, false);
        std::array::from_fn(|i| with_alpha(colors[i], dxtn::explicit_alpha(b, i)))
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 4)))
}

pub fn decode_dxt2(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    let mut img = decode_dxt3(width, height, data)?;
    img.un_premultiply();
    Some(img)
}

pub fn decode_dxt5(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let alpha = alpha_values(&b[..8]);
        let colors = color_tile(&ColorBlock::parse(&b[8..]), false, false);
        std::array::from_fn(|i| with_alpha(colors[i], alpha[i]))
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 8)))
}

pub fn decode_dxt4(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    let mut img = decode_dxt5(width, height, data)?;
    img.un_premultiply();
    Some(img)
}

pub fn decode_bc4(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        let red = alpha_values(b);
        std::array::from_fn(|i| argb32(0xFF, red[i], 0, 0))
    })
    .map(|img| img.with_sbit(SBit::new(8, 1, 1, 0, 0)))
}

pub fn decode_bc5(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let red = alpha_values(&b[..8]);
        let green = alpha_values(&b[8..]);
        std::array::from_fn(|i| argb32(0xFF, red[i], green[i], 0))
    })
    .map(|img| img.with_sbit(SBit::new(8, 8, 1, 0, 0)))
}
