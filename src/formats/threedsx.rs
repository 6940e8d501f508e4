//! # 3DSX homebrew executables
//!
//! A 0x20-byte header followed by the relocation headers and segments.
//! Headers of at least 0x2C bytes carry an extension pointing at an embedded
//! SMDH and RomFS.

use std::io::{Read, Seek, SeekFrom};

use binrw::prelude::*;

use crate::error::Result;
use crate::fields::RomFields;

pub const THREEDSX_HEADER_SIZE: u64 = 0x20;
pub const THREEDSX_EXTENDED_HEADER_SIZE: u64 = 0x2C;

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct ThreedsxHeader {
    #[br(magic = b"3DSX")]
    pub header_size: u16,
    pub reloc_header_size: u16,
    pub format_version: u32,
    pub flags: u32,
    pub code_size: u32,
    pub rodata_size: u32,
    pub data_size: u32,
    /// Zero-filled memory following the data segment
    pub bss_size: u32,
}

/// Present when `header_size >= 0x2C`.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct ThreedsxExtendedHeader {
    pub smdh_offset: u32,
    pub smdh_size: u32,
    pub romfs_offset: u32,
}

#[derive(Debug, Clone)]
pub struct Threedsx {
    pub header: ThreedsxHeader,
    pub extended: Option<ThreedsxExtendedHeader>,
}

impl Threedsx {
    pub const MAGIC: [u8; 4] = *b"3DSX";

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header: ThreedsxHeader = reader.read_le()?;
        let has_extended = u64::from(header.header_size) >= THREEDSX_EXTENDED_HEADER_SIZE;
        let extended: Option<ThreedsxExtendedHeader> = if has_extended {
            reader.seek(SeekFrom::Start(THREEDSX_HEADER_SIZE))?;
            Some(reader.read_le()?)
        } else {
            None
        };
        tracing::trace!(
            header_size = header.header_size,
            has_smdh = extended.as_ref().is_some_and(|e| e.smdh_size != 0),
            "Parsed 3DSX header"
        );
        Ok(Self { header, extended })
    }

    /// Byte range of the embedded SMDH, if any.
    pub fn smdh_range(&self) -> Option<(u64, u64)> {
        self.extended
            .filter(|ext| ext.smdh_offset != 0 && ext.smdh_size != 0)
            .map(|ext| (u64::from(ext.smdh_offset), u64::from(ext.smdh_size)))
    }

    pub fn romfs_offset(&self) -> Option<u64> {
        self.extended
            .map(|ext| u64::from(ext.romfs_offset))
            .filter(|&offset| offset != 0)
    }

    pub fn add_fields(&self, fields: &mut RomFields) {
        let h = &self.header;
        fields.add_string("Type", "Homebrew Application");
        fields.add_hex("Code Size", u64::from(h.code_size), 8);
        fields.add_hex("Read-Only Data Size", u64::from(h.rodata_size), 8);
        fields.add_hex("Data Size", u64::from(h.data_size), 8);
        fields.add_hex("BSS Size", u64::from(h.bss_size), 8);
        if let Some(offset) = self.romfs_offset() {
            fields.add_hex("RomFS Offset", offset, 8);
        }
    }
}
