//! 16-bit pixel formats to ARGB32 (`0xAARRGGBB`).

#[inline]
pub const fn argb32(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Split an ARGB32 pixel into `[a, r, g, b]`.
#[inline]
pub const fn channels(px: u32) -> [u8; 4] {
    [(px >> 24) as u8, (px >> 16) as u8, (px >> 8) as u8, px as u8]
}

#[inline]
const fn expand4(v: u16) -> u8 {
    let v = (v & 0xF) as u8;
    (v << 4) | v
}

#[inline]
const fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

#[inline]
const fn expand6(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

pub const fn rgb565_to_argb32(px: u16) -> u32 {
    argb32(0xFF, expand5(px >> 11), expand6(px >> 5), expand5(px))
}

pub const fn argb1555_to_argb32(px: u16) -> u32 {
    let a = if px & 0x8000 != 0 { 0xFF } else { 0x00 };
    argb32(a, expand5(px >> 10), expand5(px >> 5), expand5(px))
}

pub const fn argb4444_to_argb32(px: u16) -> u32 {
    argb32(expand4(px >> 12), expand4(px >> 8), expand4(px >> 4), expand4(px))
}

/// Nintendo DS palette entries: red in the low bits, bit 15 unused.
pub const fn bgr555_to_argb32(px: u16) -> u32 {
    argb32(0xFF, expand5(px), expand5(px >> 5), expand5(px >> 10))
}
