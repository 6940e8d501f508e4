//! In-memory container images for tests.

use aes::Aes128;
use binrw::BinReaderExt;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncryptMut, KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};
use std::io::Cursor;

use super::ncch::keys::{CounterType, KEYSLOT_ORIGINAL, resolve_keyslot, section_counter};
use super::ncch::types::{NcchHeader, content_type, key_flags};
use crate::keys::KeyStore;
use crate::util::align64;

pub const TITLE_ID: u64 = 0x0004_0000_0012_3400;
pub const TITLE_KEY: [u8; 16] = *b"title-key-012345";
pub const COMMON_KEY_X: [u8; 16] = [0x3D; 16];
pub const KEY_X_ORIGINAL: [u8; 16] = [0x2C; 16];
pub const KEY_X_7X: [u8; 16] = [0x25; 16];

/// Small icon colour (RGB565 red).
pub const SMALL_ICON_PIXEL: u16 = 0xF800;
/// Large icon colour (RGB565 blue).
pub const LARGE_ICON_PIXEL: u16 = 0x001F;

const UNIT: usize = 0x200;

fn pad_to(data: &mut Vec<u8>, align: usize) {
    let len = data.len().div_ceil(align) * align;
    data.resize(len, 0);
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn ctr_apply(buf: &mut [u8], key: &[u8; 16], counter: u128) {
    ctr::Ctr128BE::<Aes128>::new(GenericArray::from_slice(key), &counter.to_be_bytes().into())
        .apply_keystream(buf);
}

fn cbc_encrypt(buf: &mut [u8], key: &[u8; 16], iv: [u8; 16]) {
    let mut enc = cbc::Encryptor::<Aes128>::new(GenericArray::from_slice(key), &iv.into());
    for block in buf.chunks_exact_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Keys for slots 0x2C, 0x25 and 0x3D plus all six common KeyYs.
pub fn key_store() -> KeyStore {
    let mut keys = KeyStore::new();
    keys.set_key_x(KEYSLOT_ORIGINAL, KEY_X_ORIGINAL);
    keys.set_key_x(0x25, KEY_X_7X);
    keys.set_key_x(0x3D, COMMON_KEY_X);
    for i in 0..6u8 {
        keys.set_common_key_y(i as usize, [0xC0 | i; 16]);
    }
    keys
}

/// SMDH blob with selectable title slots.
pub struct SmdhBuilder {
    titles: Vec<(usize, String, String, String)>,
    region: u32,
    flags: u32,
    ratings: [u8; 16],
}

impl SmdhBuilder {
    pub fn new() -> Self {
        Self {
            titles: Vec::new(),
            region: 0x7FFF_FFFF,
            flags: 0,
            ratings: [0; 16],
        }
    }

    pub fn title(mut self, lang: usize, short: &str, long: &str, publisher: &str) -> Self {
        self.titles
            .push((lang, short.into(), long.into(), publisher.into()));
        self
    }

    pub fn region(mut self, region: u32) -> Self {
        self.region = region;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn rating(mut self, index: usize, value: u8) -> Self {
        self.ratings[index] = value;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; 0x36C0];
        put(&mut data, 0, b"SMDH");
        for (lang, short, long, publisher) in &self.titles {
            let base = 8 + lang * 0x200;
            for (offset, text) in [(0, short), (0x80, long), (0x180, publisher)] {
                let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
                put(&mut data, base + offset, &bytes);
            }
        }
        put(&mut data, 0x2008, &self.ratings);
        put(&mut data, 0x2018, &self.region.to_le_bytes());
        put(&mut data, 0x2028, &self.flags.to_le_bytes());
        for px in data[0x2040..0x24C0].chunks_exact_mut(2) {
            px.copy_from_slice(&SMALL_ICON_PIXEL.to_le_bytes());
        }
        for px in data[0x24C0..0x36C0].chunks_exact_mut(2) {
            px.copy_from_slice(&LARGE_ICON_PIXEL.to_le_bytes());
        }
        data
    }
}

/// SMDH with the given English titles.
pub fn smdh(short: &str, long: &str, publisher: &str, region: u32) -> Vec<u8> {
    SmdhBuilder::new()
        .title(1, short, long, publisher)
        .region(region)
        .build()
}

enum Encryption {
    Plain,
    Fixed,
    Store(KeyStore),
}

/// NCCH image with 0x200-byte media units.
pub struct NcchBuilder {
    key_y: [u8; 16],
    partition_id: Option<u64>,
    program_id: u64,
    version: u16,
    crypto_method: u8,
    key_flags: u8,
    content_type: u8,
    seed_check: [u8; 4],
    product_code: String,
    exheader: Option<String>,
    exefs: Vec<(String, Vec<u8>)>,
    romfs: Option<Vec<u8>>,
    encryption: Encryption,
}

impl NcchBuilder {
    pub fn new() -> Self {
        Self {
            key_y: *b"NCCH-sig-key-y!!",
            partition_id: None,
            program_id: TITLE_ID,
            version: 2,
            crypto_method: 0,
            key_flags: 0,
            content_type: content_type::DATA | content_type::EXECUTABLE,
            seed_check: [0; 4],
            product_code: "CTR-P-ABCE".into(),
            exheader: None,
            exefs: Vec::new(),
            romfs: None,
            encryption: Encryption::Plain,
        }
    }

    pub fn partition_id(mut self, id: u64) -> Self {
        self.partition_id = Some(id);
        self
    }

    pub fn program_id(mut self, id: u64) -> Self {
        self.program_id = id;
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn crypto_method(mut self, method: u8) -> Self {
        self.crypto_method = method;
        self
    }

    pub fn key_flags(mut self, flags: u8) -> Self {
        self.key_flags |= flags;
        self
    }

    pub fn content_type(mut self, content_type: u8) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn seed_check(mut self, check: [u8; 4]) -> Self {
        self.seed_check = check;
        self
    }

    pub fn product_code(mut self, code: &str) -> Self {
        self.product_code = code.into();
        self
    }

    pub fn exheader(mut self, title: &str) -> Self {
        self.exheader = Some(title.into());
        self
    }

    pub fn exefs_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.exefs.push((name.into(), data));
        self
    }

    pub fn romfs(mut self, data: Vec<u8>) -> Self {
        self.romfs = Some(data);
        self
    }

    pub fn no_crypto(self) -> Self {
        self.key_flags(key_flags::NO_CRYPTO)
    }

    /// Encrypt with the zero fixed key.
    pub fn fixed_key(mut self) -> Self {
        self.encryption = Encryption::Fixed;
        self.key_flags(key_flags::FIXED_KEY)
    }

    /// Encrypt with keys derived from `keys`.
    pub fn encrypt_with(mut self, keys: &KeyStore) -> Self {
        self.encryption = Encryption::Store(keys.clone());
        self
    }

    fn section_keys(&self) -> Option<([u8; 16], [u8; 16])> {
        if self.key_flags & key_flags::NO_CRYPTO != 0 {
            return None;
        }
        match &self.encryption {
            Encryption::Plain => None,
            Encryption::Fixed => Some(([0; 16], [0; 16])),
            Encryption::Store(keys) => {
                let key0 = keys.normal_key(KEYSLOT_ORIGINAL, Some(&self.key_y))?;
                let key1 = keys.normal_key(resolve_keyslot(self.crypto_method)?, Some(&self.key_y))?;
                Some((key0, key1))
            }
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; UNIT];

        let exheader_hash = self.exheader.as_ref().map(|title| {
            let mut exh = vec![0u8; 0x800];
            put(&mut exh, 0, title.as_bytes());
            put(&mut exh, 0x1C0, &0x8_0000u64.to_le_bytes());
            put(&mut exh, 0x200, &self.program_id.to_le_bytes());
            let hash = Sha256::digest(&exh[..0x400]);
            out.extend_from_slice(&exh);
            hash
        });

        let mut exefs_files = Vec::new();
        let exefs_offset = out.len();
        if !self.exefs.is_empty() {
            let mut header = vec![0u8; UNIT];
            let mut files = Vec::new();
            for (i, (name, data)) in self.exefs.iter().enumerate() {
                put(&mut header, i * 0x10, name.as_bytes());
                put(&mut header, i * 0x10 + 8, &(files.len() as u32).to_le_bytes());
                put(&mut header, i * 0x10 + 12, &(data.len() as u32).to_le_bytes());
                put(&mut header, 0xC0 + (9 - i) * 0x20, &Sha256::digest(data));
                exefs_files.push((name.clone(), UNIT + files.len(), data.len()));
                files.extend_from_slice(data);
                pad_to(&mut files, UNIT);
            }
            out.extend_from_slice(&header);
            out.extend_from_slice(&files);
        }
        let exefs_size = out.len() - exefs_offset;

        let romfs_offset = out.len();
        if let Some(romfs) = &self.romfs {
            out.extend_from_slice(romfs);
            pad_to(&mut out, UNIT);
        }
        let romfs_size = out.len() - romfs_offset;

        put(&mut out, 0, &self.key_y);
        put(&mut out, 0x100, b"NCCH");
        let units = (out.len() / UNIT) as u32;
        put(&mut out, 0x104, &units.to_le_bytes());
        let partition_id = self.partition_id.unwrap_or(self.program_id);
        put(&mut out, 0x108, &partition_id.to_le_bytes());
        put(&mut out, 0x110, b"01");
        put(&mut out, 0x112, &self.version.to_le_bytes());
        put(&mut out, 0x114, &self.seed_check);
        put(&mut out, 0x118, &self.program_id.to_le_bytes());
        put(&mut out, 0x150, self.product_code.as_bytes());
        if let Some(hash) = &exheader_hash {
            put(&mut out, 0x160, hash);
            put(&mut out, 0x180, &0x400u32.to_le_bytes());
        }
        out[0x188 + 3] = self.crypto_method;
        out[0x188 + 4] = 1;
        out[0x188 + 5] = self.content_type;
        out[0x188 + 7] = self.key_flags;
        if exefs_size != 0 {
            put(&mut out, 0x1A0, &((exefs_offset / UNIT) as u32).to_le_bytes());
            put(&mut out, 0x1A4, &((exefs_size / UNIT) as u32).to_le_bytes());
            put(&mut out, 0x1A8, &1u32.to_le_bytes());
        }
        if romfs_size != 0 {
            put(&mut out, 0x1B0, &((romfs_offset / UNIT) as u32).to_le_bytes());
            put(&mut out, 0x1B4, &((romfs_size / UNIT) as u32).to_le_bytes());
            put(&mut out, 0x1B8, &1u32.to_le_bytes());
        }

        let Some((key0, key1)) = self.section_keys() else {
            return out;
        };
        let header: NcchHeader = Cursor::new(&out[..UNIT]).read_le().unwrap();

        if exheader_hash.is_some() {
            let ctr = section_counter(&header, CounterType::Exheader, 0x200);
            ctr_apply(&mut out[0x200..0xA00], &key0, ctr);
        }
        if exefs_size != 0 {
            let base = section_counter(&header, CounterType::Exefs, exefs_offset as u64);
            ctr_apply(&mut out[exefs_offset..exefs_offset + UNIT], &key0, base);
            for (name, offset, size) in exefs_files {
                let key = if name == "icon" || name == "banner" { &key0 } else { &key1 };
                let start = exefs_offset + offset;
                let ctr = base + (offset / 16) as u128;
                ctr_apply(&mut out[start..start + size], key, ctr);
            }
        }
        if romfs_size != 0 {
            let ctr = section_counter(&header, CounterType::Romfs, romfs_offset as u64);
            ctr_apply(&mut out[romfs_offset..romfs_offset + romfs_size], &key1, ctr);
        }
        out
    }
}

/// Signature block length (type word included) used by the builders.
fn signature_block(sig_type: u32) -> Vec<u8> {
    let len = match sig_type {
        0x10000 | 0x10003 => 0x200 + 0x3C,
        0x10001 | 0x10004 => 0x100 + 0x3C,
        _ => 0x3C + 0x40,
    };
    let mut block = sig_type.to_be_bytes().to_vec();
    block.resize(4 + len, 0);
    block
}

/// CIA image. Contents are stored in the order they are added.
pub struct CiaBuilder {
    title_id: u64,
    sig_type: u32,
    common_key_index: u8,
    title_version: u16,
    boot_content: u16,
    contents: Vec<(u16, Vec<u8>, bool)>,
    meta: Option<Vec<u8>>,
}

impl CiaBuilder {
    pub fn new() -> Self {
        Self {
            title_id: TITLE_ID,
            sig_type: 0x10004,
            common_key_index: 0,
            title_version: 0x0410,
            boot_content: 0,
            contents: Vec::new(),
            meta: None,
        }
    }

    pub fn title_id(mut self, title_id: u64) -> Self {
        self.title_id = title_id;
        self
    }

    pub fn signature_type(mut self, sig_type: u32) -> Self {
        self.sig_type = sig_type;
        self
    }

    pub fn common_key_index(mut self, index: u8) -> Self {
        self.common_key_index = index;
        self
    }

    pub fn boot_content(mut self, index: u16) -> Self {
        self.boot_content = index;
        self
    }

    /// Add a content. Encrypted contents are padded to 16 bytes.
    pub fn content(mut self, index: u16, mut data: Vec<u8>, encrypted: bool) -> Self {
        if encrypted {
            pad_to(&mut data, 16);
        }
        self.contents.push((index, data, encrypted));
        self
    }

    /// Meta block carrying `smdh`.
    pub fn meta_smdh(mut self, smdh: Vec<u8>) -> Self {
        self.meta = Some(smdh);
        self
    }

    fn ticket(&self) -> Vec<u8> {
        let mut body = vec![0u8; 0x210];
        put(&mut body, 0, b"Root-CA00000003-XS0000000c");

        let mut title_key = TITLE_KEY;
        let keys = key_store();
        if let Some(key) = keys
            .common_key_y(self.common_key_index as usize)
            .and_then(|y| keys.normal_key(0x3D, Some(y)))
        {
            let mut iv = [0u8; 16];
            iv[..8].copy_from_slice(&self.title_id.to_be_bytes());
            cbc_encrypt(&mut title_key, &key, iv);
        }
        put(&mut body, 0x7F, &title_key);
        put(&mut body, 0x90, &0x0001_0002_0003_0004u64.to_be_bytes());
        put(&mut body, 0x98, &0x1234_5678u32.to_be_bytes());
        put(&mut body, 0x9C, &self.title_id.to_be_bytes());
        put(&mut body, 0xA6, &self.title_version.to_be_bytes());
        body[0xB1] = self.common_key_index;
        put(&mut body, 0xDC, &0x0BAD_F00Du32.to_be_bytes());

        let mut ticket = signature_block(self.sig_type);
        ticket.extend_from_slice(&body);
        ticket
    }

    fn tmd(&self) -> Vec<u8> {
        let mut header = vec![0u8; 0xC4];
        put(&mut header, 0, b"Root-CA00000003-CP0000000b");
        put(&mut header, 0x4C, &self.title_id.to_be_bytes());
        put(&mut header, 0x54, &0x40u32.to_be_bytes());
        put(&mut header, 0x5A, &0x8_0000u32.to_le_bytes());
        put(&mut header, 0x9C, &self.title_version.to_be_bytes());
        put(&mut header, 0x9E, &(self.contents.len() as u16).to_be_bytes());
        put(&mut header, 0xA0, &self.boot_content.to_be_bytes());

        let mut tmd = signature_block(self.sig_type);
        tmd.extend_from_slice(&header);
        tmd.resize(tmd.len() + 0x900, 0);
        for (index, data, encrypted) in &self.contents {
            tmd.extend_from_slice(&(*index as u32).to_be_bytes());
            tmd.extend_from_slice(&index.to_be_bytes());
            tmd.extend_from_slice(&u16::from(*encrypted).to_be_bytes());
            tmd.extend_from_slice(&(data.len() as u64).to_be_bytes());
            tmd.extend_from_slice(&Sha256::digest(data));
        }
        tmd
    }

    pub fn build(&self) -> Vec<u8> {
        let ticket = self.ticket();
        let tmd = self.tmd();
        let cert_size = 0xA00usize;
        let content_size: u64 = self
            .contents
            .iter()
            .map(|(_, data, _)| align64(data.len() as u64))
            .sum();
        let meta = self.meta.as_ref().map(|smdh| {
            let mut meta = vec![0u8; 0x400];
            meta.extend_from_slice(smdh);
            meta
        });

        let mut out = vec![0u8; 0x2020];
        put(&mut out, 0, &0x2020u32.to_le_bytes());
        put(&mut out, 0x08, &(cert_size as u32).to_le_bytes());
        put(&mut out, 0x0C, &(ticket.len() as u32).to_le_bytes());
        put(&mut out, 0x10, &(tmd.len() as u32).to_le_bytes());
        let meta_size = meta.as_ref().map_or(0, Vec::len);
        put(&mut out, 0x14, &(meta_size as u32).to_le_bytes());
        put(&mut out, 0x18, &content_size.to_le_bytes());
        for (index, _, _) in &self.contents {
            out[0x20 + *index as usize / 8] |= 0x80 >> (index % 8);
        }
        pad_to(&mut out, 0x40);

        out.resize(out.len() + cert_size, 0);
        out.extend_from_slice(&ticket);
        pad_to(&mut out, 0x40);
        out.extend_from_slice(&tmd);
        pad_to(&mut out, 0x40);

        for (index, data, encrypted) in &self.contents {
            let mut data = data.clone();
            if *encrypted {
                let mut iv = [0u8; 16];
                iv[..2].copy_from_slice(&index.to_be_bytes());
                cbc_encrypt(&mut data, &TITLE_KEY, iv);
            }
            out.extend_from_slice(&data);
            pad_to(&mut out, 0x40);
        }

        if let Some(meta) = meta {
            out.extend_from_slice(&meta);
            pad_to(&mut out, 0x40);
        }
        out
    }
}

/// Offset of the TMD inside a [`CiaBuilder`] image with the default signature type.
pub fn cia_tmd_offset(cia: &[u8]) -> usize {
    let word = |at: usize| {
        let bytes = [cia[at], cia[at + 1], cia[at + 2], cia[at + 3]];
        u32::from_le_bytes(bytes) as usize
    };
    let align = |v: usize| v.div_ceil(0x40) * 0x40;
    align(word(0x00)) + align(word(0x08)) + align(word(0x0C))
}

/// Overwrite the size of TMD content record `record` in a [`CiaBuilder`] image.
pub fn set_cia_chunk_size(cia: &mut [u8], record: usize, size: u64) {
    let records = cia_tmd_offset(cia) + signature_block(0x10004).len() + 0xC4 + 0x900;
    put(cia, records + record * 0x30 + 8, &size.to_be_bytes());
}

/// CCI image. Partitions are NCCH images built separately.
pub struct CciBuilder {
    media_id: u64,
    unit_exp: u8,
    partitions: Vec<(usize, Option<u32>, Vec<u8>)>,
}

impl CciBuilder {
    pub fn new() -> Self {
        Self {
            media_id: TITLE_ID,
            unit_exp: 0,
            partitions: Vec::new(),
        }
    }

    pub fn unit_exp(mut self, exp: u8) -> Self {
        self.unit_exp = exp;
        self
    }

    pub fn partition(mut self, index: usize, ncch: Vec<u8>) -> Self {
        self.partitions.push((index, None, ncch));
        self
    }

    /// Partition at an explicit offset in media units.
    pub fn partition_at(mut self, index: usize, unit_offset: u32, ncch: Vec<u8>) -> Self {
        self.partitions.push((index, Some(unit_offset), ncch));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let unit = UNIT << self.unit_exp;
        let mut out = vec![0u8; 0x4000];

        for (index, unit_offset, data) in &self.partitions {
            let offset = match unit_offset {
                Some(units) => *units as usize * unit,
                None => out.len(),
            };
            if out.len() < offset + data.len() {
                out.resize(offset + data.len(), 0);
            }
            put(&mut out, offset, data);
            pad_to(&mut out, unit);
            let entry = 0x120 + index * 8;
            put(&mut out, entry, &((offset / unit) as u32).to_le_bytes());
            put(&mut out, entry + 4, &(data.len().div_ceil(unit) as u32).to_le_bytes());
            put(&mut out, 0x190 + index * 8, &self.media_id.to_le_bytes());
        }

        put(&mut out, 0x100, b"NCSD");
        let units = (out.len() / unit) as u32;
        put(&mut out, 0x104, &units.to_le_bytes());
        put(&mut out, 0x108, &self.media_id.to_le_bytes());
        out[0x188 + 4] = 1;
        out[0x188 + 5] = 1;
        out[0x188 + 6] = self.unit_exp;
        out[0x188 + 7] = 2;

        put(&mut out, 0x200, &0xFFFF_FFFFu32.to_le_bytes());
        put(&mut out, 0x300, &0x0123_4000u32.to_le_bytes());
        put(&mut out, 0x310, &0x0410u16.to_le_bytes());
        put(&mut out, 0x312, &3u16.to_le_bytes());
        put(&mut out, 0x320, &0x0004_db00_0001_7102u64.to_le_bytes());
        put(&mut out, 0x328, &0x1C20u16.to_le_bytes());
        out
    }
}

/// eMMC image header with the standard five partitions.
pub fn nand(new_hardware: bool) -> Vec<u8> {
    let mut out = vec![0u8; 0x1000];
    put(&mut out, 0x100, b"NCSD");
    put(&mut out, 0x104, &0x0074_0000u32.to_le_bytes());
    put(&mut out, 0x110, &[1, 4, 3, 3, 1, 0, 0, 0]);
    let crypt = if new_hardware { 3 } else { 2 };
    put(&mut out, 0x118, &[1, 2, 2, 2, crypt, 0, 0, 0]);
    let table: [(u32, u32); 5] = [
        (0, 0x0005_8800),
        (0x0005_8800, 0x0000_0800),
        (0x0005_B000, 0x0000_2000),
        (0x0005_D000, 0x0000_2000),
        (0x0005_F000, 0x0068_1000),
    ];
    for (i, (offset, len)) in table.iter().enumerate() {
        put(&mut out, 0x120 + i * 8, &offset.to_le_bytes());
        put(&mut out, 0x124 + i * 8, &len.to_le_bytes());
    }
    out
}

/// 3DSX image, with the extended header when `smdh` is given.
pub fn threedsx(smdh: Option<&[u8]>) -> Vec<u8> {
    let header_size: u16 = if smdh.is_some() { 0x2C } else { 0x20 };
    let mut out = vec![0u8; header_size as usize];
    put(&mut out, 0, b"3DSX");
    put(&mut out, 4, &header_size.to_le_bytes());
    put(&mut out, 6, &8u16.to_le_bytes());
    put(&mut out, 0x10, &0x1000u32.to_le_bytes());
    put(&mut out, 0x14, &0x200u32.to_le_bytes());
    put(&mut out, 0x18, &0x300u32.to_le_bytes());
    put(&mut out, 0x1C, &0x100u32.to_le_bytes());
    out.resize(header_size as usize + 0x400, 0);

    if let Some(smdh) = smdh {
        let offset = out.len() as u32;
        put(&mut out, 0x20, &offset.to_le_bytes());
        put(&mut out, 0x24, &(smdh.len() as u32).to_le_bytes());
        out.extend_from_slice(smdh);
    }
    out
}

/// Offset of the banner inside [`srl`] images.
pub const SRL_BANNER_OFFSET: usize = 0x1000;

/// DS ROM with a version 1 banner.
///
/// The icon uses palette entry 1 (pure red) everywhere except the top-left
/// pixel, which is transparent.
pub fn srl(title: &str, game_code: &str) -> Vec<u8> {
    let mut out = vec![0u8; 0x2000];
    put(&mut out, 0, title.as_bytes());
    put(&mut out, 0x0C, game_code.as_bytes());
    put(&mut out, 0x10, b"01");
    out[0x14] = 0x09;
    out[0x1E] = 1;
    put(&mut out, 0x68, &(SRL_BANNER_OFFSET as u32).to_le_bytes());
    put(&mut out, 0x15C, &0xCF56u16.to_le_bytes());

    let banner = SRL_BANNER_OFFSET;
    put(&mut out, banner, &1u16.to_le_bytes());
    let icon = &mut out[banner + 0x20..banner + 0x220];
    icon.fill(0x11);
    icon[0] = 0x10;
    put(&mut out, banner + 0x220, &0x7FFFu16.to_le_bytes());
    put(&mut out, banner + 0x222, &0x001Fu16.to_le_bytes());
    for lang in 0..6 {
        let text = format!("{title}\nDS Subtitle\nNintendo");
        let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        put(&mut out, banner + 0x240 + lang * 0x100, &bytes);
    }
    out
}
