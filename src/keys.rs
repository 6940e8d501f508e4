//! Key material: AES keyslots, ticket common keys and seeds.
//!
//! Keys are loaded from an `aes_keys.txt` style file:
//!
//! ```text
//! # comment
//! slot0x2CKeyX = 0123456789ABCDEF0123456789ABCDEF
//! slot0x3DKeyY = ...
//! slot0x11KeyN = ...
//! common0 = ...        # ticket common KeyY, index 0-5
//! fixedSysKey = ...    # fixed key for system titles
//! ```
//!
//! Seeds for seed-encrypted titles are loaded from a binary `seeddb.bin`.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use binrw::{BinRead, BinReaderExt};
use hex::decode as hex_decode;
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::crypto::scrambler::scramble;

/// Number of ticket common keys.
pub const COMMON_KEY_COUNT: usize = 6;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Failed to decode hex value: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    #[error("Failed to parse seed database: {0}")]
    SeedDb(#[from] binrw::Error),

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

/// Outcome of checking whether a piece of content can be decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyResult {
    /// Content is readable, either unencrypted or with all keys present.
    #[default]
    Ok,
    /// No key store was supplied.
    KeyStoreMissing,
    /// The keyslot has neither a normal key nor a KeyX/KeyY pair.
    KeyNotFound { slot: u8 },
    /// A system title needs the fixed system key, which was not loaded.
    FixedKeyNotFound,
    /// The ticket names a common key that was not loaded.
    CommonKeyNotFound { index: u8 },
    /// Ticket refers to a common key index outside 0-5.
    CommonKeyIndexInvalid { index: u8 },
    /// Encrypted content without a ticket to decrypt the title key.
    TicketMissing,
    /// The title uses a seed and none is known for it.
    SeedNotFound,
    /// The known seed does not match the header's verification hash.
    SeedMismatch,
    /// Decryption produced garbage: the keys are wrong.
    WrongKey,
    /// The content header could not be read or is not the expected format.
    HeaderInvalid,
}

impl VerifyResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyResult::Ok)
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyResult::Ok => write!(f, "OK"),
            VerifyResult::KeyStoreMissing => write!(f, "no key store loaded"),
            VerifyResult::KeyNotFound { slot } => write!(f, "key for slot 0x{slot:02X} not found"),
            VerifyResult::FixedKeyNotFound => write!(f, "fixed system key not found"),
            VerifyResult::CommonKeyNotFound { index } => {
                write!(f, "common key {index} not found")
            }
            VerifyResult::CommonKeyIndexInvalid { index } => {
                write!(f, "invalid common key index {index}")
            }
            VerifyResult::TicketMissing => write!(f, "ticket missing"),
            VerifyResult::SeedNotFound => write!(f, "seed not found"),
            VerifyResult::SeedMismatch => write!(f, "seed does not match the title"),
            VerifyResult::WrongKey => write!(f, "wrong key (decrypted header is invalid)"),
            VerifyResult::HeaderInvalid => write!(f, "header is invalid"),
        }
    }
}

#[derive(BinRead)]
#[br(little)]
struct SeedDbHeader {
    count: u32,
    _reserved: [u8; 0xC],
}

#[derive(BinRead)]
#[br(little)]
struct SeedDbEntry {
    title_id: u64,
    seed: [u8; 0x10],
    _reserved: [u8; 0x8],
}

/// Key store for 3DS content decryption.
#[derive(Default, Debug, Clone)]
pub struct KeyStore {
    key_x: HashMap<u8, [u8; 0x10]>,
    key_y: HashMap<u8, [u8; 0x10]>,
    normal: HashMap<u8, [u8; 0x10]>,
    common_key_y: [Option<[u8; 0x10]>; COMMON_KEY_COUNT],
    fixed_system_key: Option<[u8; 0x10]>,
    seeds: HashMap<u64, [u8; 0x10]>,
    loaded_file: Option<String>,
}

enum KeyName {
    Slot { slot: u8, kind: char },
    Common(usize),
    FixedSystem,
}

fn parse_key_name(name: &str) -> Option<KeyName> {
    let lower = name.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("slot0x") {
        // slot0x2CKeyX
        let (slot_hex, suffix) = rest.split_at_checked(2)?;
        let slot = u8::from_str_radix(slot_hex, 16).ok()?;
        let kind = match suffix {
            "keyx" => 'X',
            "keyy" => 'Y',
            "keyn" => 'N',
            _ => return None,
        };
        Some(KeyName::Slot { slot, kind })
    } else if let Some(idx) = lower.strip_prefix("common") {
        let idx: usize = idx.parse().ok()?;
        (idx < COMMON_KEY_COUNT).then_some(KeyName::Common(idx))
    } else if lower == "fixedsyskey" {
        Some(KeyName::FixedSystem)
    } else {
        None
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_x(&mut self, slot: u8, key: [u8; 0x10]) {
        self.key_x.insert(slot, key);
    }

    pub fn set_key_y(&mut self, slot: u8, key: [u8; 0x10]) {
        self.key_y.insert(slot, key);
    }

    pub fn set_normal_key(&mut self, slot: u8, key: [u8; 0x10]) {
        self.normal.insert(slot, key);
    }

    pub fn set_common_key_y(&mut self, index: usize, key: [u8; 0x10]) {
        if let Some(entry) = self.common_key_y.get_mut(index) {
            *entry = Some(key);
        }
    }

    pub fn set_fixed_system_key(&mut self, key: [u8; 0x10]) {
        self.fixed_system_key = Some(key);
    }

    pub fn add_seed(&mut self, title_id: u64, seed: [u8; 0x10]) {
        self.seeds.insert(title_id, seed);
    }

    pub fn key_x(&self, slot: u8) -> Option<&[u8; 0x10]> {
        self.key_x.get(&slot)
    }

    pub fn common_key_y(&self, index: usize) -> Option<&[u8; 0x10]> {
        self.common_key_y.get(index).and_then(Option::as_ref)
    }

    pub fn fixed_system_key(&self) -> Option<&[u8; 0x10]> {
        self.fixed_system_key.as_ref()
    }

    pub fn seed(&self, title_id: u64) -> Option<&[u8; 0x10]> {
        self.seeds.get(&title_id)
    }

    /// Normal key for `slot`.
    ///
    /// With a KeyX for the slot, the normal key is scrambled from it and
    /// `key_y` (or the slot's stored KeyY). Otherwise a stored normal key is
    /// returned.
    pub fn normal_key(&self, slot: u8, key_y: Option<&[u8; 0x10]>) -> Option<[u8; 0x10]> {
        let key_y = key_y.or_else(|| self.key_y.get(&slot));
        match (self.key_x.get(&slot), key_y) {
            (Some(x), Some(y)) => Some(scramble(x, y)),
            _ => self.normal.get(&slot).copied(),
        }
    }

    /// Parse an `aes_keys.txt` style key file.
    ///
    /// Malformed lines are skipped with a warning.
    pub fn from_reader(reader: impl Read) -> Result<Self, KeyError> {
        let mut keys = KeyStore::new();

        for (line_num, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once('=') else {
                warn!("Ignoring line {} without '='", line_num + 1);
                continue;
            };
            let (name, value) = (name.trim(), value.trim());

            let Some(key_name) = parse_key_name(name) else {
                trace!("Ignoring unknown key {}", name);
                continue;
            };

            let key: [u8; 0x10] = match hex_decode(value) {
                Ok(bytes) => match bytes.try_into() {
                    Ok(key) => key,
                    Err(bytes) => {
                        warn!(
                            "Invalid key length for {} at line {}: expected 16 bytes, got {}",
                            name,
                            line_num + 1,
                            bytes.len()
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Failed to decode hex key {} at line {}: {}", name, line_num + 1, e);
                    continue;
                }
            };

            match key_name {
                KeyName::Slot { slot, kind: 'X' } => keys.set_key_x(slot, key),
                KeyName::Slot { slot, kind: 'Y' } => keys.set_key_y(slot, key),
                KeyName::Slot { slot, .. } => keys.set_normal_key(slot, key),
                KeyName::Common(idx) => keys.set_common_key_y(idx, key),
                KeyName::FixedSystem => keys.set_fixed_system_key(key),
            }
        }

        Ok(keys)
    }

    /// Load keys from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open key file {:?}: {}", path.as_ref(), e);
                return Err(KeyError::Io(e));
            }
        };

        let mut keys = Self::from_reader(file)?;
        keys.loaded_file = Some(path.as_ref().to_string_lossy().to_string());

        info!("Loaded {} keys from {}", keys.len(), path.as_ref().display());
        Ok(keys)
    }

    /// Load keys from the default locations: `~/.3ds/aes_keys.txt`, then `./aes_keys.txt`.
    ///
    /// A `seeddb.bin` next to the key file is loaded as well when present.
    pub fn load_default() -> Result<Self, KeyError> {
        let home_dir = dirs::home_dir();

        let possible_paths = vec![
            home_dir.as_ref().map(|h| h.join(".3ds").join("aes_keys.txt")),
            Some(Path::new("aes_keys.txt").to_path_buf()),
        ];

        let mut last_error = None;

        for path in possible_paths.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(mut keys) => {
                    let seeddb = path.with_file_name("seeddb.bin");
                    if seeddb.exists() {
                        if let Err(e) = keys.load_seeddb_file(&seeddb) {
                            warn!("Failed to load seeds from {}: {}", seeddb.display(), e);
                        }
                    }
                    return Ok(keys);
                }
                Err(e) => {
                    warn!("Failed to load keys from {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            KeyError::InvalidFormat("No aes_keys.txt file found in default locations".to_string())
        }))
    }

    /// Merge seeds from a `seeddb.bin` stream. Returns the number of seeds read.
    pub fn load_seeddb(&mut self, mut reader: impl Read + io::Seek) -> Result<usize, KeyError> {
        let header: SeedDbHeader = reader.read_le()?;
        for _ in 0..header.count {
            let entry: SeedDbEntry = reader.read_le()?;
            self.add_seed(entry.title_id, entry.seed);
        }
        Ok(header.count as usize)
    }

    pub fn load_seeddb_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, KeyError> {
        let count = self.load_seeddb(BufReader::new(File::open(&path)?))?;
        info!("Loaded {} seeds from {}", count, path.as_ref().display());
        Ok(count)
    }

    /// Number of keys loaded, seeds excluded
    pub fn len(&self) -> usize {
        self.key_x.len()
            + self.key_y.len()
            + self.normal.len()
            + self.common_key_y.iter().flatten().count()
            + usize::from(self.fixed_system_key.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the path of the loaded file, if any
    pub fn loaded_file(&self) -> Option<&str> {
        self.loaded_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::io::Cursor;

    const KEY_FILE: &str = "\
# test keys
slot0x2CKeyX = 00112233445566778899AABBCCDDEEFF
slot0x25keyx=FFEEDDCCBBAA99887766554433221100
slot0x11KeyN = 0F0E0D0C0B0A09080706050403020100
common1 = 11111111111111111111111111111111  # retail
common9 = 22222222222222222222222222222222
slot0x18KeyX = 1234
bogus = 00
";

    #[test]
    fn parses_key_file() {
        let keys = KeyStore::from_reader(KEY_FILE.as_bytes()).unwrap();

        assert_eq!(
            keys.key_x(0x2C),
            Some(&hex!("00112233445566778899AABBCCDDEEFF"))
        );
        assert!(keys.key_x(0x25).is_some());
        assert_eq!(keys.common_key_y(1), Some(&[0x11; 16]));
        assert!(keys.common_key_y(0).is_none());
        assert!(keys.key_x(0x18).is_none());
        assert_eq!(keys.len(), 4);
        assert!(keys.loaded_file().is_none());
    }

    #[test]
    fn normal_key_prefers_scrambled_pair() {
        let mut keys = KeyStore::from_reader(KEY_FILE.as_bytes()).unwrap();
        let key_y = [0x42u8; 16];

        let expected = scramble(&hex!("00112233445566778899AABBCCDDEEFF"), &key_y);
        assert_eq!(keys.normal_key(0x2C, Some(&key_y)), Some(expected));
        // No KeyY anywhere, no normal key either
        assert_eq!(keys.normal_key(0x2C, None), None);

        keys.set_key_y(0x2C, key_y);
        assert_eq!(keys.normal_key(0x2C, None), Some(expected));

        assert_eq!(
            keys.normal_key(0x11, None),
            Some(hex!("0F0E0D0C0B0A09080706050403020100"))
        );
        assert_eq!(keys.normal_key(0x3D, None), None);
    }

    #[test]
    fn loads_seeddb() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0; 0xC]);
        for (tid, fill) in [(0x0004_0000_0011_2233u64, 0xAA), (0x0004_0000_0044_5566, 0xBB)] {
            data.extend_from_slice(&tid.to_le_bytes());
            data.extend_from_slice(&[fill; 0x10]);
            data.extend_from_slice(&[0; 8]);
        }

        let mut keys = KeyStore::new();
        assert_eq!(keys.load_seeddb(Cursor::new(data)).unwrap(), 2);
        assert_eq!(keys.seed(0x0004_0000_0044_5566), Some(&[0xBB; 16]));
        assert!(keys.seed(0x0004_0000_0000_0000).is_none());
    }

    #[test]
    fn truncated_seeddb_is_an_error() {
        let mut data = 3u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 0xC + 0x20]);
        let mut keys = KeyStore::new();
        assert!(matches!(
            keys.load_seeddb(Cursor::new(data)),
            Err(KeyError::SeedDb(_))
        ));
    }
}
