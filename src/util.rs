//! Utility helpers and traits for ctr-archive.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::io::read_full;

pub trait TitleDataExt {
    fn title_id(&self) -> Result<u64>;
    fn title_id_serialized(&self) -> Result<String> {
        Ok(format!("{:016X}", self.title_id()?))
    }
}

/// CIA sections are padded to 64 bytes.
pub const fn align64(value: u64) -> u64 {
    crate::io::align_up(value, 0x40)
}

pub const fn checked_align64(value: u64) -> Option<u64> {
    crate::io::checked_align_up(value, 0x40)
}

/// Seek to `offset` and fill `buf`, failing with [`Error::ShortRead`] at end of stream.
pub fn read_exact_at<R: Read + Seek + ?Sized>(
    reader: &mut R,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    let actual = read_full(reader, buf)?;
    if actual != buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

/// Decode a NUL-terminated UTF-16 string.
pub fn utf16_to_string(units: &[u16]) -> String {
    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Decode NUL-padded ASCII, dropping trailing padding.
pub fn ascii_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// `00040000-00ABCD00` rendering of a 64-bit title ID.
pub fn format_title_id(title_id: u64) -> String {
    format!("{:08X}-{:08X}", title_id >> 32, title_id & 0xFFFF_FFFF)
}
