//! Block layouts shared by the S3TC and S2TC decoders.

use super::DecodedImage;

/// 4x4 tile of decoded pixels, row-major.
pub(crate) type Tile = [u32; 16];

/// DXT1 colour block: two RGB565 endpoints and 2-bit indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColorBlock {
    pub c0: u16,
    pub c1: u16,
    /// Pixel `i` (row-major in the tile) uses bits `2i..2i+2`.
    pub indices: u32,
}

impl ColorBlock {
    pub fn parse(b: &[u8]) -> Self {
        Self {
            c0: u16::from_le_bytes([b[0], b[1]]),
            c1: u16::from_le_bytes([b[2], b[3]]),
            indices: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    /// GameCube layout: big-endian endpoints, one byte per row with the
    /// leftmost pixel in the top bits.
    pub fn parse_gcn(b: &[u8]) -> Self {
        let mut indices = 0u32;
        for y in 0..4 {
            for x in 0..4 {
                let idx = (b[4 + y] >> (6 - 2 * x)) & 3;
                indices |= (idx as u32) << (2 * (y * 4 + x));
            }
        }
        Self {
            c0: u16::from_be_bytes([b[0], b[1]]),
            c1: u16::from_be_bytes([b[2], b[3]]),
            indices,
        }
    }

    #[inline]
    pub fn index(&self, i: usize) -> usize {
        ((self.indices >> (2 * i)) & 3) as usize
    }
}

/// DXT5/BC4 alpha block: two 8-bit endpoints and 3-bit selectors.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AlphaBlock {
    pub a0: u8,
    pub a1: u8,
    selectors: u64,
}

impl AlphaBlock {
    pub fn parse(b: &[u8]) -> Self {
        let mut sel = [0u8; 8];
        sel[..6].copy_from_slice(&b[2..8]);
        Self {
            a0: b[0],
            a1: b[1],
            selectors: u64::from_le_bytes(sel),
        }
    }

    #[inline]
    pub fn index(&self, i: usize) -> usize {
        ((self.selectors >> (3 * i)) & 7) as usize
    }
}

/// DXT3 explicit 4-bit alpha for pixel `i`, widened to 8 bits.
#[inline]
pub(crate) fn explicit_alpha(b: &[u8], i: usize) -> u8 {
    let nibble = (b[i / 2] >> (4 * (i & 1))) & 0xF;
    (nibble << 4) | nibble
}

pub(crate) fn write_tile(img: &mut DecodedImage, x0: u32, y0: u32, tile: &Tile) {
    for (i, &px) in tile.iter().enumerate() {
        img.set_pixel(x0 + (i % 4) as u32, y0 + (i / 4) as u32, px);
    }
}

/// Walk 4x4 blocks in raster order.
///
/// Both dimensions must be multiples of 4.
pub(crate) fn decode_blocks(
    width: u32,
    height: u32,
    data: &[u8],
    block_size: usize,
    mut decode: impl FnMut(&[u8]) -> Tile,
) -> Option<DecodedImage> {
    if width % 4 != 0 || height % 4 != 0 {
        return None;
    }
    let mut img = DecodedImage::new(width, height)?;
    let tiles_x = width / 4;
    let tiles_y = height / 4;
    let needed = tiles_x as usize * tiles_y as usize * block_size;
    if data.len() < needed {
        return None;
    }

    let mut blocks = data[..needed].chunks_exact(block_size);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let block = blocks.next()?;
            write_tile(&mut img, tx * 4, ty * 4, &decode(block));
        }
    }
    Some(img)
}

/// Walk GameCube CMPR data: 8x8 tiles of 2x2 DXT1 blocks.
///
/// Both dimensions must be multiples of 8.
pub(crate) fn decode_gcn_blocks(
    width: u32,
    height: u32,
    data: &[u8],
    mut decode: impl FnMut(&ColorBlock) -> Tile,
) -> Option<DecodedImage> {
    if width % 8 != 0 || height % 8 != 0 {
        return None;
    }
    let mut img = DecodedImage::new(width, height)?;
    let needed = (width as usize / 4) * (height as usize / 4) * 8;
    if data.len() < needed {
        return None;
    }

    let mut blocks = data[..needed].chunks_exact(8);
    for ty in (0..height).step_by(8) {
        for tx in (0..width).step_by(8) {
            for sub in 0..4u32 {
                let block = ColorBlock::parse_gcn(blocks.next()?);
                let tile = decode(&block);
                write_tile(&mut img, tx + (sub & 1) * 4, ty + (sub >> 1) * 4, &tile);
            }
        }
    }
    Some(img)
}
