//! # NCSD images
//!
//! The NCSD header sits at the start of both CCI game card dumps and eMMC NAND
//! dumps. It carries a table of eight partitions addressed in media units.
//! Card images follow it with a card info header at 0x200; NAND images put
//! an MBR there instead.

use std::io::{Read, Seek, SeekFrom};

use binrw::prelude::*;
use tracing::trace;

use super::names::{format_version, media_type_name, platform_name};
use super::ncch::DEFAULT_MEDIA_UNIT_SHIFT;
use crate::error::{Error, Result};
use crate::fields::RomFields;
use crate::util::format_title_id;

pub const NCSD_MAGIC_OFFSET: usize = 0x100;
pub const NCSD_CRYPT_TYPE_OFFSET: usize = 0x118;
pub const CARD_INFO_OFFSET: u64 = 0x200;
pub const NCSD_PARTITION_COUNT: usize = 8;
/// Largest media unit exponent accepted in the partition flags.
pub const MAX_MEDIA_UNIT_EXP: u8 = 20;

/// Card partitions must start past the header and card info area.
pub const MIN_CCI_PARTITION_OFFSET: u64 = 0x2000;

/// Crypt types of a retail Old 3DS eMMC image.
pub const NAND_CRYPT_TYPES_OLD: [u8; 8] = [1, 2, 2, 2, 2, 0, 0, 0];
/// Crypt types of a retail New 3DS eMMC image.
pub const NAND_CRYPT_TYPES_NEW: [u8; 8] = [1, 2, 2, 2, 3, 0, 0, 0];

/// Indices into [`NcsdHeader::partition_flags`].
pub mod partition_flag {
    pub const BACKUP_WRITE_WAIT_TIME: usize = 0;
    pub const MEDIA_CARD_DEVICE: usize = 3;
    pub const MEDIA_PLATFORM: usize = 4;
    pub const MEDIA_TYPE: usize = 5;
    pub const MEDIA_UNIT_SIZE: usize = 6;
    pub const MEDIA_CARD_DEVICE_OLD: usize = 7;
}

const CCI_PARTITION_NAMES: [&str; NCSD_PARTITION_COUNT] = [
    "Game",
    "Manual",
    "Download Play",
    "",
    "",
    "",
    "Update (New 3DS)",
    "Update",
];

#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct PartitionEntry {
    /// In media units
    pub offset: u32,
    /// In media units
    pub length: u32,
}

impl PartitionEntry {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// NCSD header, 0x000-0x1D0. Fields from `exheader_hash` on are only
/// meaningful for card images.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct NcsdHeader {
    pub signature: [u8; 0x100],
    #[br(magic = b"NCSD")]
    /// Image size in media units
    pub image_size: u32,
    pub media_id: u64,
    pub fs_types: [u8; 8],
    pub crypt_types: [u8; 8],
    pub partitions: [PartitionEntry; NCSD_PARTITION_COUNT],
    pub exheader_hash: [u8; 0x20],
    pub additional_header_size: u32,
    pub sector_zero_offset: u32,
    pub partition_flags: [u8; 8],
    pub partition_ids: [u64; NCSD_PARTITION_COUNT],
}

impl NcsdHeader {
    pub fn is_nand(&self) -> bool {
        self.crypt_types != [0; 8]
    }

    /// New 3DS NAND images use crypt type 3 for the CTR NAND partition.
    pub fn is_new_hardware_nand(&self) -> bool {
        self.crypt_types == NAND_CRYPT_TYPES_NEW
    }
}

/// Card info header at 0x200 of card images.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CardInfoHeader {
    /// In media units
    pub writable_address: u32,
    pub card_info_bitmask: u32,
    #[br(pad_before = 0xF8)]
    pub filled_size: u32,
    #[br(pad_before = 0x0C)]
    pub title_version: u16,
    pub card_revision: u16,
    #[br(pad_before = 0x0C)]
    pub cver_title_id: u64,
    pub cver_version: u16,
}

#[derive(Debug, Clone)]
pub struct Ncsd {
    pub header: NcsdHeader,
    /// `None` for NAND images
    pub card_info: Option<CardInfoHeader>,
}

impl Ncsd {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header: NcsdHeader = reader.read_le()?;
        let unit_exp = header.partition_flags[partition_flag::MEDIA_UNIT_SIZE];
        if !header.is_nand() && unit_exp > MAX_MEDIA_UNIT_EXP {
            return Err(Error::InvalidData(format!(
                "media unit size exponent {unit_exp} is out of range"
            )));
        }
        let card_info = if header.is_nand() {
            None
        } else {
            reader.seek(SeekFrom::Start(CARD_INFO_OFFSET))?;
            Some(reader.read_le()?)
        };
        trace!(
            media_id = %format_title_id(header.media_id),
            image_size = header.image_size,
            nand = header.is_nand(),
            "Parsed NCSD header"
        );
        Ok(Self { header, card_info })
    }

    pub fn is_nand(&self) -> bool {
        self.header.is_nand()
    }

    /// Shift converting media units to bytes.
    pub fn media_unit_shift(&self) -> u8 {
        if self.is_nand() {
            DEFAULT_MEDIA_UNIT_SHIFT
        } else {
            DEFAULT_MEDIA_UNIT_SHIFT + self.header.partition_flags[partition_flag::MEDIA_UNIT_SIZE]
        }
    }

    pub fn image_size(&self) -> u64 {
        u64::from(self.header.image_size) << self.media_unit_shift()
    }

    /// Byte range `(offset, length)` of partition `index`, or `None` when the
    /// slot is empty.
    pub fn partition_range(&self, index: usize) -> Result<Option<(u64, u64)>> {
        let entry = self
            .header
            .partitions
            .get(index)
            .ok_or(Error::IndexOutOfRange {
                index,
                count: NCSD_PARTITION_COUNT,
            })?;
        if entry.is_empty() {
            return Ok(None);
        }

        let shift = self.media_unit_shift();
        let offset = u64::from(entry.offset) << shift;
        let length = u64::from(entry.length) << shift;
        if !self.is_nand() && offset <= MIN_CCI_PARTITION_OFFSET {
            return Err(Error::InvalidData(format!(
                "partition {index} starts at 0x{offset:X}, inside the card header"
            )));
        }
        trace!(
            index,
            offset = format!("{:012X}", offset),
            length = format!("{:012X}", length),
            "Resolved NCSD partition"
        );
        Ok(Some((offset, length)))
    }

    /// Name of partition `index` for display.
    pub fn partition_name(&self, index: usize) -> &'static str {
        if !self.is_nand() {
            return CCI_PARTITION_NAMES.get(index).copied().unwrap_or("");
        }
        let fs_type = self.header.fs_types.get(index).copied().unwrap_or(0);
        let crypt_type = self.header.crypt_types.get(index).copied().unwrap_or(0);
        match (fs_type, crypt_type) {
            (1, 1) => "TWL NAND",
            (1, 2 | 3) => "CTR NAND",
            (4, _) => "AGB_SAVE",
            (3, _) => {
                let firm_index = self.header.fs_types[..index]
                    .iter()
                    .filter(|&&t| t == 3)
                    .count();
                if firm_index == 0 { "FIRM0" } else { "FIRM1" }
            }
            _ => "Unknown",
        }
    }

    fn partition_rows(&self) -> Vec<Vec<String>> {
        let shift = self.media_unit_shift();
        self.header
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_empty())
            .map(|(index, entry)| {
                let mut row = vec![index.to_string(), self.partition_name(index).to_string()];
                if self.is_nand() {
                    row.push(fs_type_name(self.header.fs_types[index]).to_string());
                    row.push(crypt_type_name(self.header.crypt_types[index]).to_string());
                }
                row.push(format!("0x{:08X}", u64::from(entry.offset) << shift));
                row.push(format!("0x{:08X}", u64::from(entry.length) << shift));
                row
            })
            .collect()
    }

    pub fn add_fields(&self, fields: &mut RomFields) {
        let h = &self.header;
        if self.is_nand() {
            fields.add_string(
                "Type",
                if h.is_new_hardware_nand() {
                    "eMMC Dump (New 3DS)"
                } else {
                    "eMMC Dump (Old 3DS)"
                },
            );
            fields.add_hex("Image Size", self.image_size(), 8);
            fields.add_list(
                "Partitions",
                &["#", "Name", "FS Type", "Crypt Type", "Offset", "Size"],
                self.partition_rows(),
            );
            return;
        }

        let flags = &h.partition_flags;
        fields.add_string("Type", "CCI (Game Card)");
        fields.add_string("Media ID", format_title_id(h.media_id));
        fields.add_hex("Image Size", self.image_size(), 8);
        fields.add_string("Media Type", media_type_name(flags[partition_flag::MEDIA_TYPE]));
        fields.add_string("Platform", platform_name(flags[partition_flag::MEDIA_PLATFORM]));

        if let Some(card) = &self.card_info {
            fields.add_hex(
                "Writable Address",
                u64::from(card.writable_address) << self.media_unit_shift(),
                8,
            );
            fields.add_hex("Card Info Bitmask", u64::from(card.card_info_bitmask), 8);
            fields.add_hex("Filled Size", u64::from(card.filled_size), 8);
            fields.add_string("Title Version", format_version(card.title_version));
            fields.add_dec("Card Revision", u64::from(card.card_revision));
            if card.cver_title_id != 0 {
                fields.add_string("CVer Title ID", format_title_id(card.cver_title_id));
                fields.add_string("CVer Version", format_version(card.cver_version));
            }
        }

        fields.add_list(
            "Partitions",
            &["#", "Name", "Offset", "Size"],
            self.partition_rows(),
        );
    }
}

pub fn fs_type_name(fs_type: u8) -> &'static str {
    match fs_type {
        0 => "None",
        1 => "Normal",
        3 => "FIRM",
        4 => "AGB_SAVE",
        _ => "Unknown",
    }
}

pub fn crypt_type_name(crypt_type: u8) -> &'static str {
    match crypt_type {
        0 => "None",
        1 => "TWL",
        2 => "CTR",
        3 => "New 3DS CTR",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::formats::testdata::{self, CciBuilder, NcchBuilder};
    use std::io::Cursor;
    use tracing_test::traced_test;

    fn parse(data: Vec<u8>) -> Ncsd {
        Ncsd::read(&mut Cursor::new(data)).unwrap()
    }

    #[test]
    #[traced_test]
    fn card_partitions() {
        let game = NcchBuilder::new().exheader("game").build();
        let manual = NcchBuilder::new().build();
        let ncsd = parse(
            CciBuilder::new()
                .partition(0, game.clone())
                .partition(1, manual)
                .build(),
        );
        assert!(!ncsd.is_nand());
        assert_eq!(ncsd.media_unit_shift(), 9);
        assert_eq!(
            ncsd.partition_range(0).unwrap(),
            Some((0x4000, game.len() as u64))
        );
        let (offset, _) = ncsd.partition_range(1).unwrap().unwrap();
        assert_eq!(offset, 0x4000 + game.len() as u64);
        assert_eq!(ncsd.partition_range(2).unwrap(), None);
        assert_eq!(ncsd.partition_name(1), "Manual");
    }

    #[test]
    fn eight_partition_boundary() {
        let mut builder = CciBuilder::new();
        for i in 0..NCSD_PARTITION_COUNT {
            builder = builder.partition(i, NcchBuilder::new().build());
        }
        let ncsd = parse(builder.build());
        assert!(ncsd.partition_range(7).unwrap().is_some());
        assert!(matches!(
            ncsd.partition_range(8),
            Err(Error::IndexOutOfRange { index: 8, count: 8 })
        ));
    }

    #[test]
    fn media_unit_exponent_scales_offsets() {
        let ncch = NcchBuilder::new().build();
        let ncsd = parse(CciBuilder::new().unit_exp(1).partition(0, ncch).build());
        assert_eq!(ncsd.media_unit_shift(), 10);
        let (offset, length) = ncsd.partition_range(0).unwrap().unwrap();
        assert_eq!(offset, 0x4000);
        assert_eq!(length % 0x400, 0);
    }

    #[test]
    fn oversized_unit_exponent_rejected() {
        let mut data = CciBuilder::new()
            .partition(0, NcchBuilder::new().build())
            .build();
        data[0x188 + partition_flag::MEDIA_UNIT_SIZE] = 0x40;
        assert!(matches!(
            Ncsd::read(&mut Cursor::new(data)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn partition_inside_header_rejected() {
        let ncch = NcchBuilder::new().build();
        // 0x10 units of 0x200 = 0x2000
        let ncsd = parse(CciBuilder::new().partition_at(0, 0x10, ncch).build());
        assert!(matches!(ncsd.partition_range(0), Err(Error::InvalidData(_))));
    }

    #[test]
    fn card_info() {
        let ncsd = parse(
            CciBuilder::new()
                .partition(0, NcchBuilder::new().build())
                .build(),
        );
        let card = ncsd.card_info.as_ref().unwrap();
        assert_eq!(card.filled_size, 0x0123_4000);
        assert_eq!(card.title_version, 0x0410);
        assert_eq!(card.card_revision, 3);
        assert_eq!(card.cver_title_id, 0x0004_db00_0001_7102);
        assert_eq!(card.cver_version, 0x1C20);

        let mut fields = RomFields::new();
        ncsd.add_fields(&mut fields);
        assert_eq!(fields.get("Media Type").unwrap().to_string(), "Card1");
        assert_eq!(fields.get("Platform").unwrap().to_string(), "Old 3DS (CTR)");
        assert_eq!(fields.get("Title Version").unwrap().to_string(), "1.1.0");
        assert_eq!(fields.get("CVer Version").unwrap().to_string(), "7.2.0");
    }

    #[test]
    fn nand_partitions() {
        let old = parse(testdata::nand(false));
        assert!(old.is_nand());
        assert!(!old.header.is_new_hardware_nand());
        assert!(old.card_info.is_none());
        let names: Vec<_> = (0..5).map(|i| old.partition_name(i)).collect();
        assert_eq!(names, ["TWL NAND", "AGB_SAVE", "FIRM0", "FIRM1", "CTR NAND"]);
        // NAND partitions may start at 0
        assert_eq!(old.partition_range(0).unwrap(), Some((0, 0x0005_8800 << 9)));

        let new = parse(testdata::nand(true));
        assert!(new.header.is_new_hardware_nand());
        let mut fields = RomFields::new();
        new.add_fields(&mut fields);
        assert_eq!(fields.get("Type").unwrap().to_string(), "eMMC Dump (New 3DS)");
        let Some(FieldValue::ListData { rows, .. }) = fields.get("Partitions") else {
            panic!("missing partition list");
        };
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4][3], "New 3DS CTR");
    }
}
