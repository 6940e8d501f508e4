use binrw::prelude::*;

use crate::util::ascii_to_string;

/// Size of the NCCH header, including the RSA signature.
pub const NCCH_HEADER_SIZE: u64 = 0x200;
/// The extended header always follows the NCCH header.
pub const EXHEADER_OFFSET: u64 = 0x200;
/// SCI + ACI, the part of the exheader that carries metadata.
pub const EXHEADER_INFO_SIZE: u64 = 0x400;
/// Exheader including the access descriptor.
pub const EXHEADER_FULL_SIZE: u64 = 0x800;
/// ExeFS header; file data starts right after it.
pub const EXEFS_HEADER_SIZE: u64 = 0x200;
/// Number of file slots in an ExeFS header.
pub const EXEFS_ENTRY_COUNT: usize = 10;

/// `flags[7]` bits.
pub mod key_flags {
    /// Section keys are a fixed key instead of a KeyX/KeyY pair.
    pub const FIXED_KEY: u8 = 0x01;
    /// RomFS is not mounted.
    pub const NO_MOUNT_ROMFS: u8 = 0x02;
    /// Nothing is encrypted.
    pub const NO_CRYPTO: u8 = 0x04;
    /// Key 1 is derived with a seed.
    pub const SEED: u8 = 0x20;
}

/// Content type bits in `flags[5]`.
pub mod content_type {
    pub const DATA: u8 = 0x01;
    pub const EXECUTABLE: u8 = 0x02;
    pub const SYSTEM_UPDATE: u8 = 0x04;
    pub const MANUAL: u8 = 0x08;
    /// Low two bits of the form type: child (Download Play) content.
    pub const CHILD: u8 = 0x0C;
    pub const TRIAL: u8 = 0x10;
}

/// NCCH flag bytes at 0x188.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct NcchFlags {
    _reserved: [u8; 3],
    /// Secondary key selector (0x00, 0x01, 0x0A, 0x0B).
    pub crypto_method: u8,
    /// 1 = CTR, 2 = SNAKE (New 3DS).
    pub platform: u8,
    /// See [`content_type`].
    pub content_type: u8,
    /// Content unit size is `0x200 << unit_size_exp`.
    pub unit_size_exp: u8,
    /// See [`key_flags`].
    pub key_flags: u8,
}

impl NcchFlags {
    pub fn has(&self, flag: u8) -> bool {
        self.key_flags & flag != 0
    }
}

/// Region stored as (offset, size) in media units.
#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct Region {
    pub offset: u32,
    pub size: u32,
}

/// ExeFS or RomFS region, with the size of its hashed prefix.
#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct HashedRegion {
    pub offset: u32,
    pub size: u32,
    pub hash_region_size: u32,
    _reserved: u32,
}

/// NCCH header, the first 0x200 bytes of every NCCH.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct NcchHeader {
    /// RSA-2048 signature. Its first 16 bytes double as KeyY.
    pub signature: [u8; 0x100],
    #[br(magic = b"NCCH")]
    /// Content size in media units
    pub content_size: u32,
    pub partition_id: u64,
    pub maker_code: [u8; 2],
    /// Format version, selects the counter layout
    pub version: u16,
    /// First 4 bytes of SHA-256(seed || program_id)
    pub seed_check: [u8; 4],
    pub program_id: u64,
    _reserved1: [u8; 0x10],
    pub logo_hash: [u8; 0x20],
    pub product_code: [u8; 0x10],
    pub exheader_hash: [u8; 0x20],
    /// Size of the SCI + ACI, 0 when there is no exheader
    pub exheader_size: u32,
    _reserved2: u32,
    pub flags: NcchFlags,
    pub plain_region: Region,
    pub logo_region: Region,
    pub exefs: HashedRegion,
    pub romfs: HashedRegion,
    pub exefs_hash: [u8; 0x20],
    pub romfs_hash: [u8; 0x20],
}

impl NcchHeader {
    pub const MAGIC: [u8; 4] = *b"NCCH";

    /// KeyY for the section keys.
    pub fn key_y(&self) -> [u8; 0x10] {
        let mut key_y = [0u8; 0x10];
        key_y.copy_from_slice(&self.signature[..0x10]);
        key_y
    }

    pub fn product_code(&self) -> String {
        ascii_to_string(&self.product_code)
    }

    pub fn maker_code(&self) -> String {
        ascii_to_string(&self.maker_code)
    }

    pub fn has_exheader(&self) -> bool {
        self.exheader_size != 0
    }

    pub fn is_executable(&self) -> bool {
        self.flags.content_type & content_type::EXECUTABLE != 0
    }

    /// System titles use the fixed system key when fixed-key crypto is set.
    pub fn is_system_title(&self) -> bool {
        (self.program_id >> 32) & 0x10 != 0
    }

    /// Human-readable form type, derived from the content type bits.
    pub fn content_type_name(&self) -> &'static str {
        let ct = self.flags.content_type;
        if ct & content_type::EXECUTABLE == 0 {
            match ct & content_type::CHILD {
                content_type::MANUAL => "Manual",
                content_type::CHILD => "Download Play",
                _ if ct & content_type::TRIAL != 0 => "Trial",
                _ if ct & content_type::SYSTEM_UPDATE != 0 => "System Update",
                _ => "Data",
            }
        } else {
            "Executable"
        }
    }
}

/// One ExeFS file slot.
#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct ExefsEntry {
    pub name: [u8; 8],
    /// Offset relative to the end of the ExeFS header
    pub offset: u32,
    pub size: u32,
}

impl ExefsEntry {
    pub fn name(&self) -> String {
        ascii_to_string(&self.name)
    }

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0 || self.size == 0
    }
}

/// ExeFS header.
///
/// File hashes are stored in reverse order: `hashes[9]` belongs to `entries[0]`.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct ExefsHeader {
    pub entries: [ExefsEntry; EXEFS_ENTRY_COUNT],
    _reserved: [u8; 0x20],
    pub hashes: [[u8; 0x20]; EXEFS_ENTRY_COUNT],
}

impl ExefsHeader {
    /// Non-empty file slots.
    pub fn files(&self) -> impl Iterator<Item = &ExefsEntry> {
        self.entries.iter().filter(|e| !e.is_empty())
    }

    pub fn find(&self, name: &str) -> Option<(usize, &ExefsEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| !e.is_empty() && e.name() == name)
    }

    pub fn hash(&self, index: usize) -> Option<&[u8; 0x20]> {
        self.hashes.get(EXEFS_ENTRY_COUNT.checked_sub(index + 1)?)
    }
}

/// Code segment descriptor in the SCI.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct CodeSegment {
    pub address: u32,
    /// Size in 4 KiB pages
    pub num_pages: u32,
    pub size: u32,
}

/// System control info, the first 0x200 bytes of the exheader.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct SystemControlInfo {
    pub application_title: [u8; 8],
    _reserved1: [u8; 5],
    /// Bit 0: .code is compressed, bit 1: SD application
    pub flags: u8,
    pub remaster_version: u16,
    pub text: CodeSegment,
    pub stack_size: u32,
    pub rodata: CodeSegment,
    _reserved2: u32,
    pub data: CodeSegment,
    pub bss_size: u32,
    pub dependencies: [u64; 48],
    pub save_data_size: u64,
    pub jump_id: u64,
    _reserved3: [u8; 0x30],
}

impl SystemControlInfo {
    pub fn title(&self) -> String {
        ascii_to_string(&self.application_title)
    }

    pub fn is_code_compressed(&self) -> bool {
        self.flags & 0x01 != 0
    }

    pub fn is_sd_application(&self) -> bool {
        self.flags & 0x02 != 0
    }

    pub fn dependencies(&self) -> impl Iterator<Item = u64> + '_ {
        self.dependencies.iter().copied().filter(|&tid| tid != 0)
    }
}

/// Storage access info inside the ARM11 local capabilities.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct StorageInfo {
    pub extdata_id: u64,
    pub system_savedata_ids: [u32; 2],
    pub accessible_unique_ids: u64,
    pub fs_access: [u8; 7],
    pub other_attributes: u8,
}

/// ARM11 local system capabilities, the start of the ACI.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct AccessControlInfo {
    pub program_id: u64,
    pub core_version: u32,
    /// Bit 0: L2 cache, bit 1: 804 MHz CPU (New 3DS)
    pub flag1: u8,
    /// Bits 0-3: New 3DS system mode
    pub flag2: u8,
    /// Bits 0-1: ideal processor, bits 2-3: affinity mask, bits 4-7: system mode
    pub flag0: u8,
    pub thread_priority: u8,
    pub resource_limits: [u16; 16],
    pub storage: StorageInfo,
    pub services: [[u8; 8]; 34],
}

impl AccessControlInfo {
    pub fn services(&self) -> impl Iterator<Item = String> + '_ {
        self.services
            .iter()
            .filter(|s| s[0] != 0)
            .map(|s| ascii_to_string(s))
    }

    pub fn old3ds_system_mode(&self) -> u8 {
        self.flag0 >> 4
    }

    pub fn new3ds_system_mode(&self) -> u8 {
        self.flag2 & 0x0F
    }
}

/// Decrypted extended header (SCI + start of ACI).
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct Exheader {
    pub sci: SystemControlInfo,
    pub aci: AccessControlInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exefs_hashes_are_reversed() {
        let mut data = vec![0u8; EXEFS_HEADER_SIZE as usize];
        data[..4].copy_from_slice(b"icon");
        data[0x08..0x0C].copy_from_slice(&0x40u32.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&0x36C0u32.to_le_bytes());
        // hash slot 9 belongs to file 0
        data[0x1E0] = 0xAB;

        let header: ExefsHeader = Cursor::new(data).read_le().unwrap();
        let (index, entry) = header.find("icon").unwrap();
        assert_eq!(index, 0);
        assert_eq!(entry.offset, 0x40);
        assert_eq!(header.hash(0).unwrap()[0], 0xAB);
        assert!(header.hash(10).is_none());
        assert_eq!(header.files().count(), 1);
        assert!(header.find("banner").is_none());
    }

    #[test]
    fn exheader_layout() {
        let mut data = vec![0u8; EXHEADER_INFO_SIZE as usize];
        data[..4].copy_from_slice(b"TEST");
        data[0x0D] = 0x03;
        data[0x40..0x48].copy_from_slice(&0x0004_0130_0000_2002u64.to_le_bytes());
        data[0x1C0..0x1C8].copy_from_slice(&0x8_0000u64.to_le_bytes());
        data[0x200..0x208].copy_from_slice(&0x0004_0000_0012_3400u64.to_le_bytes());
        data[0x20F] = 0x30;
        data[0x250..0x257].copy_from_slice(b"fs:USER");

        let exheader: Exheader = Cursor::new(data).read_le().unwrap();
        assert_eq!(exheader.sci.title(), "TEST");
        assert!(exheader.sci.is_code_compressed());
        assert!(exheader.sci.is_sd_application());
        assert_eq!(
            exheader.sci.dependencies().collect::<Vec<_>>(),
            [0x0004_0130_0000_2002]
        );
        assert_eq!(exheader.sci.save_data_size, 0x8_0000);
        assert_eq!(exheader.aci.program_id, 0x0004_0000_0012_3400);
        assert_eq!(exheader.aci.thread_priority, 0x30);
        assert_eq!(exheader.aci.services().collect::<Vec<_>>(), ["fs:USER"]);
    }
}
