//! # NCCH (Nintendo Content Container Header)
//!
//! NCCH is the container for a single piece of 3DS content: an executable
//! with its exheader, ExeFS and RomFS, a manual, a Download Play child, or
//! system data. CCI partitions and CIA contents are both NCCHs.
//!
//! Sections are encrypted with AES-128-CTR. Key 0 covers the exheader, the
//! ExeFS header and the `icon` and `banner` files; key 1 covers everything
//! else. See [`keys`] for how they are derived.

pub mod keys;
pub mod types;

use std::io::Read;

use binrw::BinReaderExt;
use sha2::{Digest, Sha256};

use self::keys::{CounterType, CryptoContext, NcchKeyManagement, section_counter};
pub use self::types::*;
use super::cia::ContentCrypto;
use crate::crypto::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::io::{CtrReader, DynReader, SectionReader, SubFile, align_down};
use crate::keys::{KeyStore, VerifyResult};
use crate::util::TitleDataExt;

/// Media unit shift for NCCHs outside a CCI.
pub const DEFAULT_MEDIA_UNIT_SHIFT: u8 = 9;

/// Regions of an NCCH that can be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcchSection {
    Header,
    Exheader,
    Logo,
    Plain,
    Exefs,
    Romfs,
}

/// Reader for one NCCH, positioned on a byte range of a shared source.
///
/// Construction never fails. When the header cannot be read the reader is
/// closed and [`NcchReader::verify_result`] says why.
pub struct NcchReader {
    content: SubFile<DynReader>,
    media_unit_shift: u8,
    header: Option<NcchHeader>,
    crypto: Option<CryptoContext>,
    keys: NcchKeyManagement,
    verify_result: VerifyResult,
    exefs_header: Option<ExefsHeader>,
    exheader: Option<Exheader>,
}

impl NcchReader {
    /// Open the NCCH in `range`.
    ///
    /// `content_crypto` is the CIA layer, applied underneath the NCCH's own
    /// encryption.
    #[tracing::instrument(skip_all, level = "trace", fields(start = %format!("{:012X}", range.start())))]
    pub fn new(
        range: SubFile<DynReader>,
        media_unit_shift: u8,
        keys: Option<&KeyStore>,
        content_crypto: Option<&ContentCrypto>,
    ) -> Self {
        let cia_encrypted = content_crypto.is_some();
        let content = match content_crypto.map(|crypto| crypto.open(range.sub_file(0, range.size()))) {
            None => range,
            Some(Ok(plain)) => plain,
            Some(Err(reason)) => {
                tracing::warn!("CIA content cannot be decrypted: {}", reason);
                return Self::closed(range, media_unit_shift, reason);
            }
        };

        let header = match content.sub_file(0, NCCH_HEADER_SIZE).read_le::<NcchHeader>() {
            Ok(header) => header,
            Err(e) => {
                tracing::trace!("No NCCH header: {}", e);
                let reason = if cia_encrypted {
                    VerifyResult::WrongKey
                } else {
                    VerifyResult::HeaderInvalid
                };
                return Self::closed(content, media_unit_shift, reason);
            }
        };

        let ctx = CryptoContext::from_header(&header);
        tracing::trace!(
            program_id = %format!("{:016X}", header.program_id),
            version = header.version,
            crypto = ?ctx,
            "NCCH header read"
        );
        let keys = NcchKeyManagement::new(&header, &ctx, keys);
        let verify_result = keys.status();

        Self {
            content,
            media_unit_shift,
            header: Some(header),
            crypto: Some(ctx),
            keys,
            verify_result,
            exefs_header: None,
            exheader: None,
        }
    }

    pub(crate) fn closed(content: SubFile<DynReader>, media_unit_shift: u8, reason: VerifyResult) -> Self {
        Self {
            content,
            media_unit_shift,
            header: None,
            crypto: None,
            keys: NcchKeyManagement::default(),
            verify_result: reason,
            exefs_header: None,
            exheader: None,
        }
    }

    /// The header was read and has the NCCH magic.
    pub fn is_open(&self) -> bool {
        self.header.is_some()
    }

    /// Why the reader is closed or why some sections read back as ciphertext.
    pub fn verify_result(&self) -> VerifyResult {
        self.verify_result
    }

    pub fn header(&self) -> Option<&NcchHeader> {
        self.header.as_ref()
    }

    pub fn crypto_context(&self) -> Option<&CryptoContext> {
        self.crypto.as_ref()
    }

    pub fn media_unit_shift(&self) -> u8 {
        self.media_unit_shift
    }

    /// Size of the NCCH's byte range.
    pub fn size(&self) -> u64 {
        self.content.size()
    }

    fn header_or_err(&self) -> Result<&NcchHeader> {
        self.header
            .as_ref()
            .ok_or(Error::ReaderNotOpen(self.verify_result))
    }

    fn is_encrypted(&self) -> bool {
        self.crypto.is_some_and(|ctx| ctx.encrypted)
    }

    /// Byte offset and size of a section, or `None` when it is absent.
    pub fn section_range(&self, section: NcchSection) -> Option<(u64, u64)> {
        let header = self.header.as_ref()?;
        let unit = |v: u32| (v as u64) << self.media_unit_shift;
        let (offset, size) = match section {
            NcchSection::Header => (0, NCCH_HEADER_SIZE),
            NcchSection::Exheader if header.has_exheader() => {
                (EXHEADER_OFFSET, EXHEADER_FULL_SIZE)
            }
            NcchSection::Exheader => return None,
            NcchSection::Logo => (
                unit(header.logo_region.offset),
                unit(header.logo_region.size),
            ),
            NcchSection::Plain => (
                unit(header.plain_region.offset),
                unit(header.plain_region.size),
            ),
            NcchSection::Exefs => (unit(header.exefs.offset), unit(header.exefs.size)),
            NcchSection::Romfs => (unit(header.romfs.offset), unit(header.romfs.size)),
        };
        (size != 0).then_some((offset, size))
    }

    /// Reader over `size` bytes at `offset`, inside a section starting at
    /// `section_offset`.
    ///
    /// Without `key` the region is returned as stored.
    fn region_reader(
        &self,
        kind: CounterType,
        section_offset: u64,
        offset: u64,
        size: u64,
        key: Option<&[u8; 0x10]>,
    ) -> Result<SectionReader> {
        let header = self.header_or_err()?;
        let key = match key {
            Some(key) if self.is_encrypted() => key,
            _ => return Ok(Box::new(self.content.sub_file(offset, offset + size))),
        };

        // CTR needs a block-aligned start; the counter advances per block.
        let relative = offset - section_offset;
        let aligned = align_down(relative, BLOCK_SIZE as u64);
        let skip = relative - aligned;
        let counter = section_counter(header, kind, section_offset)
            .wrapping_add((aligned / BLOCK_SIZE as u64) as u128);
        tracing::trace!(
            section = ?kind,
            offset = %format!("{:012X}", offset),
            size = %format!("{:012X}", size),
            "Opening encrypted region"
        );

        let start = section_offset + aligned;
        let ctr = CtrReader::new(
            self.content.sub_file(start, offset + size),
            *key,
            counter,
            skip + size,
        );
        Ok(Box::new(SubFile::new(ctr, skip, skip + size)))
    }

    /// Open a whole section.
    ///
    /// The ExeFS is opened with key 0, which is right for its header and for
    /// `icon` and `banner`; use [`NcchReader::open_exefs_file`] for the rest.
    pub fn open_section(&self, section: NcchSection) -> Result<Option<SectionReader>> {
        self.header_or_err()?;
        let Some((offset, size)) = self.section_range(section) else {
            return Ok(None);
        };
        let (kind, key) = match section {
            NcchSection::Header | NcchSection::Logo | NcchSection::Plain => {
                return Ok(Some(Box::new(self.content.sub_file(offset, offset + size))));
            }
            NcchSection::Exheader => (CounterType::Exheader, self.keys.key0()),
            NcchSection::Exefs => (CounterType::Exefs, self.keys.key0()),
            NcchSection::Romfs => (CounterType::Romfs, self.keys.key1()),
        };
        self.region_reader(kind, offset, offset, size, key).map(Some)
    }

    /// Open a section, or a named file inside the ExeFS.
    pub fn open(&mut self, section: NcchSection, name: Option<&str>) -> Result<Option<SectionReader>> {
        match (section, name) {
            (_, None) => self.open_section(section),
            (NcchSection::Exefs, Some(name)) => self.open_exefs_file(name),
            (_, Some(name)) => Err(Error::NotSupported(format!(
                "{section:?} has no named files (requested {name})"
            ))),
        }
    }

    /// Fail when key 0 is needed and missing: parsed structures would be garbage.
    fn require_key0(&self) -> Result<()> {
        if self.is_encrypted() && self.keys.key0().is_none() {
            return Err(Error::ReaderNotOpen(self.verify_result));
        }
        Ok(())
    }

    /// Parsed ExeFS header, loaded on first use.
    pub fn exefs_header(&mut self) -> Result<&ExefsHeader> {
        if self.exefs_header.is_none() {
            self.require_key0()?;
            let mut reader = self
                .open_section(NcchSection::Exefs)?
                .ok_or_else(|| Error::NotFound("ExeFS".to_string()))?;
            let header: ExefsHeader = reader.read_le()?;
            tracing::trace!(files = header.files().count(), "ExeFS header read");
            self.exefs_header = Some(header);
        }
        self.exefs_header
            .as_ref()
            .ok_or(Error::NotLoaded("ExeFS header"))
    }

    /// Open a file inside the ExeFS. `Ok(None)` when there is no such file.
    pub fn open_exefs_file(&mut self, name: &str) -> Result<Option<SectionReader>> {
        let Some(entry) = self.exefs_header()?.find(name).map(|(_, e)| *e) else {
            return Ok(None);
        };
        let (exefs_offset, exefs_size) = self
            .section_range(NcchSection::Exefs)
            .ok_or_else(|| Error::NotFound("ExeFS".to_string()))?;

        let file_offset = EXEFS_HEADER_SIZE + entry.offset as u64;
        if file_offset + entry.size as u64 > exefs_size {
            return Err(Error::InvalidData(format!(
                "ExeFS file {name} extends past the ExeFS"
            )));
        }

        let key = match name {
            "icon" | "banner" => self.keys.key0(),
            _ => self.keys.key1(),
        };
        self.region_reader(
            CounterType::Exefs,
            exefs_offset,
            exefs_offset + file_offset,
            entry.size as u64,
            key,
        )
        .map(Some)
    }

    /// Read a whole ExeFS file into memory.
    pub fn read_exefs_file(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(mut reader) = self.open_exefs_file(name)? else {
            return Ok(None);
        };
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Names of the files in the ExeFS.
    pub fn exefs_files(&mut self) -> Result<Vec<String>> {
        Ok(self.exefs_header()?.files().map(|e| e.name()).collect())
    }

    /// Parsed exheader, or `None` when the NCCH has none.
    ///
    /// The decrypted SCI and ACI are checked against the header's hash, so a
    /// wrong key is reported instead of returning garbage.
    pub fn exheader(&mut self) -> Result<Option<&Exheader>> {
        if self.exheader.is_none() {
            self.require_key0()?;
            let Some(mut reader) = self.open_section(NcchSection::Exheader)? else {
                return Ok(None);
            };
            let mut raw = vec![0u8; EXHEADER_INFO_SIZE as usize];
            reader.read_exact(&mut raw)?;

            let expected = self.header_or_err()?.exheader_hash;
            if Sha256::digest(&raw)[..] != expected[..] {
                tracing::warn!("Exheader hash mismatch");
                self.verify_result = VerifyResult::WrongKey;
                return Err(Error::ReaderNotOpen(VerifyResult::WrongKey));
            }
            self.exheader = Some(std::io::Cursor::new(raw).read_le()?);
        }
        Ok(self.exheader.as_ref())
    }
}

impl TitleDataExt for NcchReader {
    fn title_id(&self) -> Result<u64> {
        Ok(self.header_or_err()?.program_id)
    }
}
