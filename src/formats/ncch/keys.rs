use sha2::{Digest, Sha256};

use super::types::{NcchHeader, key_flags};
use crate::keys::{KeyStore, VerifyResult};

/// KeyX slot for key 0 (ExeFS header, exheader, icon and banner).
pub const KEYSLOT_ORIGINAL: u8 = 0x2C;
/// Firmware 7.x crypto.
pub const KEYSLOT_7X: u8 = 0x25;
/// New 3DS 9.3 crypto.
pub const KEYSLOT_SECURE3: u8 = 0x18;
/// New 3DS 9.6 crypto.
pub const KEYSLOT_SECURE4: u8 = 0x1B;

/// Keyslot for key 1, selected by the crypto method byte.
pub fn resolve_keyslot(crypto_method: u8) -> Option<u8> {
    match crypto_method {
        0x00 => Some(KEYSLOT_ORIGINAL),
        0x01 => Some(KEYSLOT_7X),
        0x0A => Some(KEYSLOT_SECURE3),
        0x0B => Some(KEYSLOT_SECURE4),
        _ => None,
    }
}

/// How an NCCH's sections are encrypted. Depends only on the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoContext {
    pub encrypted: bool,
    pub fixed_key: bool,
    /// Key 1 slot; `None` for an unknown crypto method.
    pub keyslot: Option<u8>,
    pub uses_seed: bool,
}

impl CryptoContext {
    pub fn from_header(header: &NcchHeader) -> Self {
        let flags = &header.flags;
        Self {
            encrypted: !flags.has(key_flags::NO_CRYPTO),
            fixed_key: flags.has(key_flags::FIXED_KEY),
            keyslot: resolve_keyslot(flags.crypto_method),
            uses_seed: flags.has(key_flags::SEED),
        }
    }
}

/// First 4 bytes of SHA-256(seed || program_id), as stored in the header.
pub fn seed_check(seed: &[u8; 0x10], program_id: u64) -> [u8; 4] {
    let digest = Sha256::new()
        .chain_update(seed)
        .chain_update(program_id.to_le_bytes())
        .finalize();
    let mut check = [0u8; 4];
    check.copy_from_slice(&digest[..4]);
    check
}

/// KeyY for key 1 of a seeded title: SHA-256(KeyY || seed)[0..16].
pub fn seeded_key_y(key_y: &[u8; 0x10], seed: &[u8; 0x10]) -> [u8; 0x10] {
    let digest = Sha256::new()
        .chain_update(key_y)
        .chain_update(seed)
        .finalize();
    let mut out = [0u8; 0x10];
    out.copy_from_slice(&digest[..0x10]);
    out
}

/// Section keys for one NCCH.
///
/// A missing key leaves its slot `None`; reads through it return ciphertext.
#[derive(Debug, Clone, Default)]
pub struct NcchKeyManagement {
    key0: Option<[u8; 0x10]>,
    key1: Option<[u8; 0x10]>,
    status: VerifyResult,
}

impl NcchKeyManagement {
    pub fn new(header: &NcchHeader, ctx: &CryptoContext, keys: Option<&KeyStore>) -> Self {
        if !ctx.encrypted {
            tracing::trace!("NCCH is not encrypted");
            return Self::default();
        }

        if ctx.fixed_key {
            return Self::fixed(header, keys);
        }

        let Some(keys) = keys else {
            tracing::warn!("NCCH is encrypted but no key store was supplied");
            return Self {
                status: VerifyResult::KeyStoreMissing,
                ..Default::default()
            };
        };

        let key_y = header.key_y();
        let mut status = VerifyResult::Ok;

        let key0 = keys.normal_key(KEYSLOT_ORIGINAL, Some(&key_y));
        if key0.is_none() {
            tracing::warn!(slot = %format!("0x{KEYSLOT_ORIGINAL:02X}"), "Key 0 not present");
            status = VerifyResult::KeyNotFound {
                slot: KEYSLOT_ORIGINAL,
            };
        }

        let key1 = match ctx.keyslot {
            None => {
                tracing::warn!(
                    crypto_method = %format!("0x{:02X}", header.flags.crypto_method),
                    "Unknown NCCH crypto method"
                );
                status = VerifyResult::HeaderInvalid;
                None
            }
            Some(slot) => match Self::secondary_key_y(header, ctx, keys, key_y) {
                Ok(key_y1) => {
                    tracing::debug!(slot = %format!("0x{slot:02X}"), seeded = ctx.uses_seed, "Key 1 slot");
                    let key = keys.normal_key(slot, Some(&key_y1));
                    if key.is_none() {
                        tracing::warn!(slot = %format!("0x{slot:02X}"), "Key 1 not present");
                        if status.is_ok() {
                            status = VerifyResult::KeyNotFound { slot };
                        }
                    }
                    key
                }
                Err(reason) => {
                    tracing::warn!("Cannot derive key 1: {}", reason);
                    if status.is_ok() {
                        status = reason;
                    }
                    None
                }
            },
        };

        Self { key0, key1, status }
    }

    fn fixed(header: &NcchHeader, keys: Option<&KeyStore>) -> Self {
        if !header.is_system_title() {
            tracing::debug!("Using the zero fixed key");
            let key = Some([0u8; 0x10]);
            return Self {
                key0: key,
                key1: key,
                status: VerifyResult::Ok,
            };
        }

        match keys.and_then(KeyStore::fixed_system_key) {
            Some(&key) => {
                tracing::debug!("Using the fixed system key");
                Self {
                    key0: Some(key),
                    key1: Some(key),
                    status: VerifyResult::Ok,
                }
            }
            None => {
                tracing::warn!("System title needs the fixed system key");
                Self {
                    status: if keys.is_some() {
                        VerifyResult::FixedKeyNotFound
                    } else {
                        VerifyResult::KeyStoreMissing
                    },
                    ..Default::default()
                }
            }
        }
    }

    fn secondary_key_y(
        header: &NcchHeader,
        ctx: &CryptoContext,
        keys: &KeyStore,
        key_y: [u8; 0x10],
    ) -> Result<[u8; 0x10], VerifyResult> {
        if !ctx.uses_seed {
            return Ok(key_y);
        }
        let seed = keys
            .seed(header.program_id)
            .ok_or(VerifyResult::SeedNotFound)?;
        if seed_check(seed, header.program_id) != header.seed_check {
            return Err(VerifyResult::SeedMismatch);
        }
        Ok(seeded_key_y(&key_y, seed))
    }

    /// Key for the exheader, the ExeFS header, `icon` and `banner`.
    pub fn key0(&self) -> Option<&[u8; 0x10]> {
        self.key0.as_ref()
    }

    /// Key for the remaining ExeFS files and the RomFS.
    pub fn key1(&self) -> Option<&[u8; 0x10]> {
        self.key1.as_ref()
    }

    pub fn status(&self) -> VerifyResult {
        self.status
    }
}

/// Section type byte used in v0/v2 counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CounterType {
    Exheader = 1,
    Exefs = 2,
    Romfs = 3,
}

/// Initial AES-CTR counter for a section starting at `byte_offset` in the NCCH.
pub fn section_counter(header: &NcchHeader, kind: CounterType, byte_offset: u64) -> u128 {
    let mut ctr = [0u8; 0x10];
    if header.version == 1 {
        ctr[..8].copy_from_slice(&header.partition_id.to_le_bytes());
        ctr[12..].copy_from_slice(&(byte_offset as u32).to_be_bytes());
    } else {
        ctr[..8].copy_from_slice(&header.partition_id.to_be_bytes());
        ctr[8] = kind as u8;
    }
    u128::from_be_bytes(ctr)
}
