use thiserror::Error;

use crate::crypto::CipherError;
use crate::keys::{KeyError, VerifyResult};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] binrw::Error),
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Index {index} out of range (count: {count})")]
    IndexOutOfRange { index: usize, count: usize },
    /// A prerequisite header was never loaded. This is a caller bug, not bad data.
    #[error("Not loaded: {0}")]
    NotLoaded(&'static str),
    #[error("Content reader is not open: {0}")]
    ReaderNotOpen(VerifyResult),
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
