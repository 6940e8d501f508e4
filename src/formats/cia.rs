//! # CTR Importable Archive (CIA)
//!
//! CIA files are the install packages of the 3DS: a small header followed by a
//! certificate chain, a ticket, a title metadata (TMD) block, the contents and
//! an optional meta block. Every section is padded to 64 bytes.
//!
//! Contents are NCCHs (or a DS ROM for DSiWare), optionally encrypted with the
//! title key carried in the ticket.

use std::io::{Read, Seek, SeekFrom};

use binrw::prelude::*;
use tracing::{debug, trace, warn};

use crate::crypto::AesCipher;
use crate::error::{Error, Result};
use crate::io::{CbcReader, DynReader, SharedReader, SubFile};
use crate::keys::{COMMON_KEY_COUNT, KeyStore, VerifyResult};
use crate::util::{align64, checked_align64};

/// The only CIA header size in use.
pub const CIA_HEADER_SIZE: u32 = 0x2020;
/// Size tolerated past the computed end of a CIA.
pub const CIA_SIZE_SLACK: u64 = 0x10000;
/// Meta block: dependency list, core version, then an SMDH.
pub const META_SMDH_OFFSET: u64 = 0x400;
/// Most content records a TMD can describe here.
pub const MAX_CONTENTS: usize = 255;
/// Keyslot that decrypts ticket title keys.
pub const KEYSLOT_COMMON: u8 = 0x3D;

/// CIA header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct CiaHeader {
    pub header_size: u32,
    pub cia_type: u16,
    pub version: u16,
    pub cert_chain_size: u32,
    pub ticket_size: u32,
    pub tmd_size: u32,
    pub meta_size: u32,
    pub content_size: u64,
    /// Bitmap of contents present, MSB first
    pub content_index: [u8; 0x2000],
}

impl CiaHeader {
    pub fn cert_chain_offset(&self) -> u64 {
        align64(self.header_size as u64)
    }

    pub fn ticket_offset(&self) -> u64 {
        self.cert_chain_offset() + align64(self.cert_chain_size as u64)
    }

    pub fn tmd_offset(&self) -> u64 {
        self.ticket_offset() + align64(self.ticket_size as u64)
    }

    pub fn content_offset(&self) -> u64 {
        self.tmd_offset() + align64(self.tmd_size as u64)
    }

    /// `None` when the declared content size runs past the end of a u64.
    pub fn meta_offset(&self) -> Option<u64> {
        self.content_offset()
            .checked_add(checked_align64(self.content_size)?)
    }

    /// File size implied by the section sizes.
    pub fn expected_size(&self) -> Option<u64> {
        self.meta_offset()?
            .checked_add(align64(self.meta_size as u64))
    }

    /// Whether the header marks content `index` as present.
    pub fn has_content(&self, index: u16) -> bool {
        let byte = self.content_index[index as usize / 8];
        byte & (0x80 >> (index % 8)) != 0
    }
}

/// Signature block preceding the ticket and TMD bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Rsa4096Sha1 = 0x10000,
    Rsa2048Sha1 = 0x10001,
    EcdsaSha1 = 0x10002,
    Rsa4096Sha256 = 0x10003,
    Rsa2048Sha256 = 0x10004,
    EcdsaSha256 = 0x10005,
}

impl SignatureType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0x10000 => Self::Rsa4096Sha1,
            0x10001 => Self::Rsa2048Sha1,
            0x10002 => Self::EcdsaSha1,
            0x10003 => Self::Rsa4096Sha256,
            0x10004 => Self::Rsa2048Sha256,
            0x10005 => Self::EcdsaSha256,
            _ => return None,
        })
    }

    /// Signature plus alignment padding, excluding the type word.
    pub fn padded_len(self) -> u64 {
        match self {
            Self::Rsa4096Sha1 | Self::Rsa4096Sha256 => 0x200 + 0x3C,
            Self::Rsa2048Sha1 | Self::Rsa2048Sha256 => 0x100 + 0x3C,
            Self::EcdsaSha1 | Self::EcdsaSha256 => 0x3C + 0x40,
        }
    }
}

/// Read the signature type at the reader's position and skip the signature.
fn skip_signature<R: Read + Seek>(reader: &mut R) -> Result<SignatureType> {
    let raw: u32 = reader.read_be()?;
    let sig_type = SignatureType::from_u32(raw)
        .ok_or_else(|| Error::InvalidData(format!("Unknown signature type 0x{raw:08X}")))?;
    trace!(sig_type = ?sig_type, "Skipping signature");
    reader.seek(SeekFrom::Current(sig_type.padded_len() as i64))?;
    Ok(sig_type)
}

/// Ticket body, up to the eShop account ID.
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct Ticket {
    pub issuer: [u8; 0x40],
    pub ecc_public_key: [u8; 0x3C],
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    /// Title key, encrypted with the common key
    pub title_key: [u8; 0x10],
    _reserved1: u8,
    pub ticket_id: u64,
    pub console_id: u32,
    pub title_id: u64,
    _reserved2: u16,
    pub ticket_version: u16,
    _reserved3: u64,
    pub license_type: u8,
    pub common_key_index: u8,
    _reserved4: [u8; 0x2A],
    pub eshop_account_id: u32,
}

impl Ticket {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        skip_signature(reader)?;
        Ok(reader.read_be()?)
    }

    pub fn issuer(&self) -> String {
        crate::util::ascii_to_string(&self.issuer)
    }

    /// Decrypt the title key with the common key the ticket names.
    ///
    /// The IV is the title ID, big-endian, zero-padded to 16 bytes.
    pub fn decrypt_title_key(
        &self,
        keys: Option<&KeyStore>,
    ) -> std::result::Result<[u8; 0x10], VerifyResult> {
        let keys = keys.ok_or(VerifyResult::KeyStoreMissing)?;
        let index = self.common_key_index;
        if index as usize >= COMMON_KEY_COUNT {
            return Err(VerifyResult::CommonKeyIndexInvalid { index });
        }
        let key_y = keys
            .common_key_y(index as usize)
            .ok_or(VerifyResult::CommonKeyNotFound { index })?;
        let key = keys
            .normal_key(KEYSLOT_COMMON, Some(key_y))
            .ok_or(VerifyResult::KeyNotFound {
                slot: KEYSLOT_COMMON,
            })?;

        let mut iv = [0u8; 0x10];
        iv[..8].copy_from_slice(&self.title_id.to_be_bytes());

        let mut title_key = self.title_key;
        AesCipher::new_cbc(&key, &iv)
            .and_then(|mut cipher| cipher.decrypt(&mut title_key))
            .map_err(|e| {
                warn!("Failed to decrypt title key: {}", e);
                VerifyResult::WrongKey
            })?;
        debug!(common_key_index = index, "Title key decrypted");
        Ok(title_key)
    }
}

/// TMD header, following the signature block.
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct TmdHeader {
    pub issuer: [u8; 0x40],
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    _reserved1: u8,
    pub system_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    #[br(little)]
    pub save_data_size: u32,
    #[br(little)]
    pub srl_private_save_size: u32,
    _reserved2: u32,
    pub srl_flag: u8,
    _reserved3: [u8; 0x31],
    pub access_rights: u32,
    pub title_version: u16,
    pub content_count: u16,
    pub boot_content: u16,
    _padding: u16,
    pub info_records_hash: [u8; 0x20],
}

/// One content chunk record.
#[derive(Debug, Clone, Copy, BinRead)]
#[br(big)]
pub struct ContentChunk {
    pub id: u32,
    pub index: u16,
    /// Bit 0: encrypted, bit 14: optional, bit 15: shared
    pub content_type: u16,
    pub size: u64,
    pub hash: [u8; 0x20],
}

impl ContentChunk {
    pub fn is_encrypted(&self) -> bool {
        self.content_type & 0x0001 != 0
    }

    pub fn is_optional(&self) -> bool {
        self.content_type & 0x4000 != 0
    }
}

/// Title metadata: header, 64 content info records (skipped), content records.
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct Tmd {
    pub header: TmdHeader,
    #[br(
        pad_before = 0x900,
        count = (header.content_count as usize).min(MAX_CONTENTS)
    )]
    pub chunks: Vec<ContentChunk>,
}

impl Tmd {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        skip_signature(reader)?;
        let tmd: Tmd = reader.read_be()?;
        if tmd.header.content_count as usize > MAX_CONTENTS {
            warn!(
                content_count = tmd.header.content_count,
                "TMD content count clamped to {}", MAX_CONTENTS
            );
        }
        Ok(tmd)
    }

    /// Offset of every chunk relative to the start of the content section.
    ///
    /// Contents are laid out in record order, each padded to 64 bytes.
    /// Fails when a chunk would start beyond the end of a u64.
    pub fn content_offsets(&self) -> Result<Vec<u64>> {
        let mut offsets = Vec::with_capacity(self.chunks.len());
        let mut next = Some(0u64);
        for (position, chunk) in self.chunks.iter().enumerate() {
            let offset = next.ok_or_else(|| {
                Error::InvalidData(format!("content record {position} starts past 2^64"))
            })?;
            offsets.push(offset);
            next = checked_align64(chunk.size).and_then(|size| offset.checked_add(size));
        }
        Ok(offsets)
    }

    /// Record position of the boot content, falling back to the first record.
    pub fn boot_chunk(&self) -> usize {
        self.chunks
            .iter()
            .position(|c| c.index == self.header.boot_content)
            .unwrap_or(0)
    }
}

/// CIA-layer encryption of one content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCrypto {
    /// Decrypt with the title key; the IV is the content index.
    TitleKey { key: [u8; 0x10], index: u16 },
    /// The content is encrypted and the title key is unavailable.
    Unavailable(VerifyResult),
}

impl ContentCrypto {
    /// Crypto for a chunk, given the outcome of the title key decryption.
    pub fn for_chunk(
        chunk: &ContentChunk,
        title_key: Option<std::result::Result<[u8; 0x10], VerifyResult>>,
    ) -> Option<Self> {
        if !chunk.is_encrypted() {
            return None;
        }
        Some(match title_key {
            Some(Ok(key)) => Self::TitleKey {
                key,
                index: chunk.index,
            },
            Some(Err(reason)) => Self::Unavailable(reason),
            None => Self::Unavailable(VerifyResult::TicketMissing),
        })
    }

    pub fn iv(index: u16) -> [u8; 0x10] {
        let mut iv = [0u8; 0x10];
        iv[..2].copy_from_slice(&index.to_be_bytes());
        iv
    }

    /// Plaintext view of a content range.
    ///
    /// Fails with the reason the content cannot be decrypted.
    pub fn open(
        &self,
        range: SubFile<DynReader>,
    ) -> std::result::Result<SubFile<DynReader>, VerifyResult> {
        match *self {
            ContentCrypto::TitleKey { key, index } => {
                let size = range.size();
                let reader = CbcReader::new(range, key, Self::iv(index), size);
                Ok(SharedReader::from_reader(reader).sub_file(0, size))
            }
            ContentCrypto::Unavailable(reason) => Err(reason),
        }
    }
}
