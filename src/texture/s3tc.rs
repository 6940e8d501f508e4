//! S3TC decoders: DXT1-5, BC4, BC5 and GameCube CMPR.
//!
//! Interpolated palette entries use truncating integer division.

use super::dxtn::{self, AlphaBlock, ColorBlock, Tile};
use super::pixel::{argb32, channels, rgb565_to_argb32};
use super::{DecodedImage, SBit};

fn mix(p: u32, q: u32, wp: u32, wq: u32) -> u32 {
    let [_, pr, pg, pb] = channels(p);
    let [_, qr, qg, qb] = channels(q);
    let div = wp + wq;
    let ch = |a: u8, b: u8| ((a as u32 * wp + b as u32 * wq) / div) as u8;
    argb32(0xFF, ch(pr, qr), ch(pg, qg), ch(pb, qb))
}

/// Four-colour palette: both endpoints plus the 1/3 and 2/3 blends.
pub fn four_color_palette(c0: u16, c1: u16) -> [u32; 4] {
    let p0 = rgb565_to_argb32(c0);
    let p1 = rgb565_to_argb32(c1);
    [p0, p1, mix(p0, p1, 2, 1), mix(p0, p1, 1, 2)]
}

/// DXT1 palette. The raw endpoint values select the mode: `c0 > c1` gives
/// four colours, otherwise the midpoint and black (or transparent).
pub fn dxt1_palette(c0: u16, c1: u16, color3_transparent: bool) -> [u32; 4] {
    if c0 > c1 {
        return four_color_palette(c0, c1);
    }
    let p0 = rgb565_to_argb32(c0);
    let p1 = rgb565_to_argb32(c1);
    let color3 = if color3_transparent { 0 } else { 0xFF00_0000 };
    [p0, p1, mix(p0, p1, 1, 1), color3]
}

/// Eight-entry alpha palette used by DXT5, BC4 and BC5.
pub fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let (x, y) = (a0 as u32, a1 as u32);
    let mut pal = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for (i, entry) in pal[2..].iter_mut().enumerate() {
            let i = i as u32;
            *entry = (((6 - i) * x + (1 + i) * y) / 7) as u8;
        }
    } else {
        for (i, entry) in pal[2..6].iter_mut().enumerate() {
            let i = i as u32;
            *entry = (((4 - i) * x + (1 + i) * y) / 5) as u8;
        }
        pal[6] = 0x00;
        pal[7] = 0xFF;
    }
    pal
}

fn dxt1_tile(block: &ColorBlock, color3_transparent: bool) -> Tile {
    let pal = dxt1_palette(block.c0, block.c1, color3_transparent);
    std::array::from_fn(|i| pal[block.index(i)])
}

fn four_color_tile(block: &ColorBlock) -> Tile {
    let pal = four_color_palette(block.c0, block.c1);
    std::array::from_fn(|i| pal[block.index(i)])
}

fn alpha_values(b: &[u8]) -> [u8; 16] {
    let block = AlphaBlock::parse(b);
    let pal = alpha_palette(block.a0, block.a1);
    std::array::from_fn(|i| pal[block.index(i)])
}

fn with_alpha(color: u32, alpha: u8) -> u32 {
    (color & 0x00FF_FFFF) | ((alpha as u32) << 24)
}

/// DXT1 with index 3 of three-colour blocks decoded as opaque black.
pub fn decode_dxt1(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        dxt1_tile(&ColorBlock::parse(b), false)
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 0)))
}

/// DXT1 with one-bit alpha: index 3 of three-colour blocks is transparent.
pub fn decode_dxt1_a1(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        dxt1_tile(&ColorBlock::parse(b), true)
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 1)))
}

/// GameCube CMPR (big-endian DXT1 with one-bit alpha).
pub fn decode_dxt1_gcn(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_gcn_blocks(width, height, data, |block| dxt1_tile(block, true))
        .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 1)))
}

/// DXT3: explicit 4-bit alpha. The colour block always uses the
/// four-colour palette, whatever the endpoint order.
pub fn decode_dxt3(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let colors = four_color_tile(&ColorBlock::parse(&b[8..]));
        std::array::from_fn(|i| with_alpha(colors[i], dxtn::explicit_alpha(b, i)))
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 4)))
}

/// DXT2: premultiplied DXT3.
pub fn decode_dxt2(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    let mut img = decode_dxt3(width, height, data)?;
    img.un_premultiply();
    Some(img)
}

/// DXT5: interpolated 8-bit alpha.
pub fn decode_dxt5(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let alpha = alpha_values(&b[..8]);
        let colors = four_color_tile(&ColorBlock::parse(&b[8..]));
        std::array::from_fn(|i| with_alpha(colors[i], alpha[i]))
    })
    .map(|img| img.with_sbit(SBit::new(5, 6, 5, 0, 8)))
}

/// DXT4: premultiplied DXT5.
pub fn decode_dxt4(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    let mut img = decode_dxt5(width, height, data)?;
    img.un_premultiply();
    Some(img)
}

/// BC4: a single channel, decoded into red.
pub fn decode_bc4(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 8, |b| {
        let red = alpha_values(b);
        std::array::from_fn(|i| argb32(0xFF, red[i], 0, 0))
    })
    .map(|img| img.with_sbit(SBit::new(8, 1, 1, 0, 0)))
}

/// BC5: two channels, decoded into red and green.
pub fn decode_bc5(width: u32, height: u32, data: &[u8]) -> Option<DecodedImage> {
    dxtn::decode_blocks(width, height, data, 16, |b| {
        let red = alpha_values(&b[..8]);
        let green = alpha_values(&b[8..]);
        std::array::from_fn(|i| argb32(0xFF, red[i], green[i], 0))
    })
    .map(|img| img.with_sbit(SBit::new(8, 8, 1, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: u16 = 0xF800;
    const BLUE: u16 = 0x001F;

    fn color_block(c0: u16, c1: u16, indices: u32) -> [u8; 8] {
        let mut b = [0u8; 8];
        b[..2].copy_from_slice(&c0.to_le_bytes());
        b[2..4].copy_from_slice(&c1.to_le_bytes());
        b[4..].copy_from_slice(&indices.to_le_bytes());
        b
    }

    /// First row uses indices 0, 1, 2, 3.
    const FIRST_ROW_ALL: u32 = 0b11_10_01_00;

    fn first_row(img: &DecodedImage) -> Vec<u32> {
        (0..4).map(|x| img.pixel(x, 0).unwrap()).collect()
    }

    #[test]
    fn dxt1_four_color_mode() {
        let img = decode_dxt1(4, 4, &color_block(RED, BLUE, FIRST_ROW_ALL)).unwrap();
        assert_eq!(
            first_row(&img),
            vec![0xFFFF_0000, 0xFF00_00FF, 0xFFAA_0055, 0xFF55_00AA]
        );
        assert_eq!(img.sbit(), Some(SBit::new(5, 6, 5, 0, 0)));
    }

    #[test]
    fn dxt1_three_color_mode() {
        let block = color_block(BLUE, RED, FIRST_ROW_ALL);
        let opaque = decode_dxt1(4, 4, &block).unwrap();
        assert_eq!(
            first_row(&opaque),
            vec![0xFF00_00FF, 0xFFFF_0000, 0xFF7F_007F, 0xFF00_0000]
        );

        let alpha = decode_dxt1_a1(4, 4, &block).unwrap();
        assert_eq!(alpha.pixel(3, 0), Some(0));
    }

    #[test]
    fn dxt1_equal_endpoints_use_three_color_mode() {
        let img = decode_dxt1_a1(4, 4, &color_block(RED, RED, 0xFFFF_FFFF)).unwrap();
        assert!(img.pixels().iter().all(|&px| px == 0));
    }

    #[test]
    fn dxt3_ignores_endpoint_order() {
        let mut data = [0u8; 16];
        data[..8].copy_from_slice(&[0x0F, 0, 0, 0, 0, 0, 0, 0]);
        data[8..].copy_from_slice(&color_block(BLUE, RED, 0b11_00_00_11));
        let img = decode_dxt3(4, 4, &data).unwrap();
        // Index 3 is the 1/3 blend, not black.
        assert_eq!(img.pixel(0, 0), Some(0xFFAA_0055));
        assert_eq!(img.pixel(1, 0), Some(0x0000_00FF));
    }

    #[test]
    fn dxt2_is_un_premultiplied_dxt3() {
        let mut data = [0u8; 16];
        data[..8].copy_from_slice(&[0x88; 8]);
        data[8..].copy_from_slice(&color_block(0x4208, 0x4208, 0));
        let mut expected = decode_dxt3(4, 4, &data).unwrap();
        expected.un_premultiply();
        assert_eq!(decode_dxt2(4, 4, &data).unwrap(), expected);
        assert_ne!(decode_dxt3(4, 4, &data).unwrap(), expected);
    }

    #[test]
    fn alpha_palette_eight_step() {
        let pal = alpha_palette(200, 50);
        assert_eq!(pal, [200, 50, 178, 157, 135, 114, 92, 71]);
    }

    #[test]
    fn alpha_palette_six_step_with_literals() {
        let pal = alpha_palette(50, 200);
        assert_eq!(pal, [50, 200, 80, 110, 140, 170, 0, 255]);
    }

    #[test]
    fn dxt5_alpha_selectors() {
        let mut data = [0u8; 16];
        // Pixel 0 -> code 6, pixel 1 -> code 7
        data[..8].copy_from_slice(&[200, 50, 0b0011_1110, 0, 0, 0, 0, 0]);
        data[8..].copy_from_slice(&color_block(0xFFFF, 0xFFFF, 0));
        let img = decode_dxt5(4, 4, &data).unwrap();
        assert_eq!(img.pixel(0, 0), Some(0x5CFF_FFFF));
        assert_eq!(img.pixel(1, 0), Some(0x47FF_FFFF));
        assert_eq!(img.pixel(2, 0), Some(0xC8FF_FFFF));
    }

    #[test]
    fn bc4_and_bc5_channels() {
        let red_block = [50u8, 200, 0b0011_1110, 0, 0, 0, 0, 0];
        let bc4 = decode_bc4(4, 4, &red_block).unwrap();
        assert_eq!(bc4.pixel(0, 0), Some(0xFF00_0000));
        assert_eq!(bc4.pixel(1, 0), Some(0xFFFF_0000));
        assert_eq!(bc4.pixel(2, 0), Some(0xFF32_0000));

        let mut data = [0u8; 16];
        data[..8].copy_from_slice(&red_block);
        data[8..].copy_from_slice(&[0x10, 0x10, 0, 0, 0, 0, 0, 0]);
        let mut bc5 = decode_bc5(4, 4, &data).unwrap();
        assert_eq!(bc5.pixel(1, 0), Some(0xFFFF_1000));
        bc5.red_green_to_luminance_alpha();
        assert_eq!(bc5.pixel(1, 0), Some(0x10FF_FFFF));
    }

    #[test]
    fn gcn_tiles_are_two_by_two_blocks() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xFF, 0xFF, 0x00, 0x00, 0, 0, 0, 0]); // white
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]); // transparent
        data.extend_from_slice(&[0xF8, 0x00, 0x00, 0x00, 0, 0, 0, 0]); // red
        data.extend_from_slice(&[0x00, 0x1F, 0x00, 0x00, 0, 0, 0, 0]); // blue

        let img = decode_dxt1_gcn(8, 8, &data).unwrap();
        assert_eq!(img.pixel(0, 0), Some(0xFFFF_FFFF));
        assert_eq!(img.pixel(4, 0), Some(0));
        assert_eq!(img.pixel(3, 4), Some(0xFFFF_0000));
        assert_eq!(img.pixel(7, 7), Some(0xFF00_00FF));
    }

    #[test]
    fn rejects_bad_dimensions() {
        let data = color_block(RED, BLUE, 0);
        assert!(decode_dxt1(3, 4, &data).is_none());
        assert!(decode_dxt1(0, 4, &data).is_none());
        assert!(decode_dxt1(4, 8, &data).is_none());
    }
}
