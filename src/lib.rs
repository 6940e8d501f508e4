//! Nintendo 3DS container parsing and console texture decoding.
//!
//! The [`formats`] module detects and walks CCI, CIA, NCCH, SMDH, 3DSX and
//! eMMC images (including DS ROMs nested inside DSiWare packages). Encrypted
//! content is handled through [`crypto`] using key material from a
//! [`keys::KeyStore`], and icons are decoded by the [`texture`] codecs into
//! [`texture::DecodedImage`] surfaces. Parsed metadata is exposed through the
//! [`fields`] model.

pub mod crypto;
pub mod error;
pub mod fields;
pub mod formats;
pub mod io;
pub mod keys;
pub mod texture;
pub mod util;

pub use error::{Error, Result};
pub use io::ReadSeek;
pub use util::TitleDataExt;
