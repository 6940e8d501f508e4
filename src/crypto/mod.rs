//! AES block cipher engine.
//!
//! ECB and CBC are delegated to the RustCrypto `ecb` and `cbc` mode crates.
//! CTR is emulated on top of single-block encryption: the counter block is
//! encrypted, XORed into the data, and then incremented as a 128-bit
//! big-endian integer. The increment wraps silently on overflow, which is how
//! the console formats define it.
//!
//! The engine keeps its key, mode and IV/counter between calls, so a CBC or
//! CTR stream can be decrypted in several pieces. An [`AesCipher`] must not be
//! shared between threads without external locking.

pub mod scrambler;

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use cipher::consts::U16;
use cipher::generic_array::GenericArray;
use cipher::{
    BlockCipher, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockSizeUser, KeyInit, KeyIvInit,
};
use thiserror::Error;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 0x10;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    #[error("No key has been set")]
    KeyNotSet,
    #[error("Invalid key length: {0} (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),
    #[error("Invalid IV/counter length: {0} (expected 16)")]
    InvalidIvLength(usize),
    #[error("{0:?} mode requires an IV/counter, but none was set")]
    IvNotSet(ChainingMode),
    #[error("Data length {0} is not a multiple of the AES block size")]
    InvalidDataLength(usize),
}

/// Block chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainingMode {
    #[default]
    Ecb,
    Cbc,
    Ctr,
}

/// Stateful AES decryptor supporting 128, 192 and 256-bit keys.
#[derive(Clone, Default)]
pub struct AesCipher {
    key: Option<Vec<u8>>,
    mode: ChainingMode,
    iv: Option<[u8; BLOCK_SIZE]>,
}

impl fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCipher")
            .field("key_bits", &self.key.as_ref().map(|k| k.len() * 8))
            .field("mode", &self.mode)
            .field("iv_set", &self.iv.is_some())
            .finish()
    }
}

impl AesCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// ECB cipher with the given key.
    pub fn new_ecb(key: &[u8]) -> Result<Self, CipherError> {
        let mut cipher = Self::new();
        cipher.set_key(key)?;
        Ok(cipher)
    }

    /// CBC cipher with the given key and IV.
    pub fn new_cbc(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let mut cipher = Self::new();
        cipher.set_key(key)?;
        cipher.set_chaining_mode(ChainingMode::Cbc);
        cipher.set_iv(iv)?;
        Ok(cipher)
    }

    /// CTR cipher with the given key and initial counter value.
    pub fn new_ctr(key: &[u8], counter: u128) -> Result<Self, CipherError> {
        let mut cipher = Self::new();
        cipher.set_key(key)?;
        cipher.set_chaining_mode(ChainingMode::Ctr);
        cipher.set_iv(&counter.to_be_bytes())?;
        Ok(cipher)
    }

    pub fn set_key(&mut self, key: &[u8]) -> Result<(), CipherError> {
        match key.len() {
            16 | 24 | 32 => {
                self.key = Some(key.to_vec());
                Ok(())
            }
            len => Err(CipherError::InvalidKeyLength(len)),
        }
    }

    pub fn is_key_set(&self) -> bool {
        self.key.is_some()
    }

    /// Switches the chaining mode.
    ///
    /// The block cipher is re-derived from the stored key on every call to
    /// [`decrypt`](Self::decrypt), so switching never reuses state from the
    /// previous mode. The IV/counter is kept.
    pub fn set_chaining_mode(&mut self, mode: ChainingMode) {
        self.mode = mode;
    }

    pub fn chaining_mode(&self) -> ChainingMode {
        self.mode
    }

    /// Sets the CBC IV or the CTR counter block.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<(), CipherError> {
        let iv: [u8; BLOCK_SIZE] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv.len()))?;
        self.iv = Some(iv);
        Ok(())
    }

    /// Current IV (CBC) or counter (CTR). Advances as data is decrypted.
    pub fn iv(&self) -> Option<[u8; BLOCK_SIZE]> {
        self.iv
    }

    /// Decrypts `data` in place and returns the number of bytes processed.
    ///
    /// `data` must be a whole number of blocks. On error the buffer is left
    /// untouched.
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<usize, CipherError> {
        let key = self.key.as_deref().ok_or(CipherError::KeyNotSet)?;
        if data.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidDataLength(data.len()));
        }
        let iv = match self.mode {
            ChainingMode::Ecb => None,
            mode => Some(self.iv.as_mut().ok_or(CipherError::IvNotSet(mode))?),
        };
        if data.is_empty() {
            return Ok(0);
        }

        match key.len() {
            16 => process::<Aes128>(key, self.mode, iv, data)?,
            24 => process::<Aes192>(key, self.mode, iv, data)?,
            32 => process::<Aes256>(key, self.mode, iv, data)?,
            len => return Err(CipherError::InvalidKeyLength(len)),
        }
        Ok(data.len())
    }
}

fn process<C>(
    key: &[u8],
    mode: ChainingMode,
    iv: Option<&mut [u8; BLOCK_SIZE]>,
    data: &mut [u8],
) -> Result<(), CipherError>
where
    C: BlockCipher + BlockEncrypt + BlockDecrypt + KeyInit + BlockSizeUser<BlockSize = U16>,
{
    let bad_key = |_| CipherError::InvalidKeyLength(key.len());

    match (mode, iv) {
        (ChainingMode::Ecb, _) => {
            let mut dec = ecb::Decryptor::<C>::new_from_slice(key).map_err(bad_key)?;
            for block in data.chunks_exact_mut(BLOCK_SIZE) {
                dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }
        (ChainingMode::Cbc, Some(iv)) => {
            // The last ciphertext block chains into the next call.
            let mut next_iv = [0u8; BLOCK_SIZE];
            next_iv.copy_from_slice(&data[data.len() - BLOCK_SIZE..]);

            let mut dec =
                cbc::Decryptor::<C>::new_from_slices(key, iv.as_slice()).map_err(bad_key)?;
            for block in data.chunks_exact_mut(BLOCK_SIZE) {
                dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            *iv = next_iv;
        }
        (ChainingMode::Ctr, Some(iv)) => {
            let cipher = C::new_from_slice(key).map_err(bad_key)?;
            let mut counter = u128::from_be_bytes(*iv);
            for block in data.chunks_exact_mut(BLOCK_SIZE) {
                let mut keystream = GenericArray::clone_from_slice(&counter.to_be_bytes());
                cipher.encrypt_block(&mut keystream);
                block
                    .iter_mut()
                    .zip(keystream.iter())
                    .for_each(|(b, k)| *b ^= k);
                counter = counter.wrapping_add(1);
            }
            *iv = counter.to_be_bytes();
        }
        (mode, None) => return Err(CipherError::IvNotSet(mode)),
    }
    Ok(())
}
