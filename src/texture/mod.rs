//! Texture decoders for console formats.
//!
//! Every decoder takes the image dimensions and the raw texture data and
//! returns a [`DecodedImage`] in ARGB32, or `None` when the input violates
//! the format's constraints (zero or unsupported dimensions, short data).
//!
//! The DXTn/BCn entry points exported here use S3TC interpolation when the
//! `s3tc` feature is enabled (the default) and the S2TC subset otherwise.
//! The S2TC decoders are always reachable through [`s2tc`].

pub mod dreamcast;
mod dxtn;
pub mod pixel;
pub mod s2tc;
#[cfg(feature = "s3tc")]
pub mod s3tc;
pub mod tiled;

#[cfg(not(feature = "s3tc"))]
pub use s2tc::{
    decode_bc4, decode_bc5, decode_dxt1, decode_dxt1_a1, decode_dxt1_gcn, decode_dxt2,
    decode_dxt3, decode_dxt4, decode_dxt5,
};
#[cfg(feature = "s3tc")]
pub use s3tc::{
    decode_bc4, decode_bc5, decode_dxt1, decode_dxt1_a1, decode_dxt1_gcn, decode_dxt2,
    decode_dxt3, decode_dxt4, decode_dxt5,
};

use image::{Rgba, RgbaImage};

use self::pixel::{argb32, channels};

/// Significant bits per channel of the source format (PNG `sBIT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SBit {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub gray: u8,
    pub alpha: u8,
}

impl SBit {
    pub const fn new(red: u8, green: u8, blue: u8, gray: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            gray,
            alpha,
        }
    }
}

/// A decoded ARGB32 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    sbit: Option<SBit>,
}

impl DecodedImage {
    /// Fully transparent image. `None` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            sbit: None,
        })
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
            sbit: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major ARGB32 pixels.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Out-of-bounds writes are ignored.
    pub(crate) fn set_pixel(&mut self, x: u32, y: u32, px: u32) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = px;
        }
    }

    pub fn sbit(&self) -> Option<SBit> {
        self.sbit
    }

    pub fn set_sbit(&mut self, sbit: SBit) {
        self.sbit = Some(sbit);
    }

    pub(crate) fn with_sbit(mut self, sbit: SBit) -> Self {
        self.sbit = Some(sbit);
        self
    }

    /// Undo premultiplied alpha.
    pub fn un_premultiply(&mut self) {
        for px in &mut self.pixels {
            let [a, r, g, b] = channels(*px);
            if a == 0 || a == 0xFF {
                continue;
            }
            let scale = |c: u8| ((c as u32 * 255) / a as u32).min(255) as u8;
            *px = argb32(a, scale(r), scale(g), scale(b));
        }
    }

    /// Replicate the red channel into green and blue (BC4 as luminance).
    pub fn red_to_luminance(&mut self) {
        for px in &mut self.pixels {
            let [_, r, _, _] = channels(*px);
            *px = argb32(0xFF, r, r, r);
        }
        if let Some(sbit) = &mut self.sbit {
            *sbit = SBit::new(sbit.red, sbit.red, sbit.red, sbit.red, 0);
        }
    }

    /// Red becomes luminance and green becomes alpha (BC5 as luminance + alpha).
    pub fn red_green_to_luminance_alpha(&mut self) {
        for px in &mut self.pixels {
            let [_, r, g, _] = channels(*px);
            *px = argb32(g, r, r, r);
        }
        if let Some(sbit) = &mut self.sbit {
            *sbit = SBit::new(sbit.red, sbit.red, sbit.red, sbit.red, sbit.green);
        }
    }

    /// Convert to an RGBA8 buffer for saving or further processing.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let [a, r, g, b] = channels(self.pixels[y as usize * self.width as usize + x as usize]);
            Rgba([r, g, b, a])
        })
    }
}
