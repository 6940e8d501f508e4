use std::io::{self, Read, Result, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::crypto::{AesCipher, BLOCK_SIZE};

/// Align down to a power-of-two boundary
pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Align up to a power-of-two boundary
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// [`align_up`] for sizes read from a file; `None` when the result does not fit.
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Trait that combines Read and Seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Type-erased source shared between a container and the readers it hands out.
pub type DynReader = SharedReader<Box<dyn ReadSeek + Send>>;

/// Boxed reader for a section or a file inside one.
pub type SectionReader = Box<dyn ReadSeek + Send>;

/// A shared reader that can be used by multiple consumers
pub struct SharedReader<R: Read + Seek> {
    inner: Arc<Mutex<R>>,
}

impl<R: Read + Seek> Clone for SharedReader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Read + Seek> SharedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reader)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, R>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("shared reader lock poisoned"))
    }

    /// Create a SubFile from this shared reader
    pub fn sub_file(&self, start: u64, end: u64) -> SubFile<Self> {
        SubFile::new(self.clone(), start, end)
    }

    /// Total length of the underlying stream. The stream position is preserved.
    pub fn len(&self) -> Result<u64> {
        let mut inner = self.lock()?;
        let pos = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Seek and read under a single lock.
    ///
    /// Returns fewer bytes than requested only at end of stream.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.seek(SeekFrom::Start(offset))?;
        read_full(&mut *inner, buf)
    }
}

impl SharedReader<Box<dyn ReadSeek + Send>> {
    /// Wrap any owned reader as a [`DynReader`].
    pub fn from_reader<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        Self::new(Box::new(reader))
    }
}

impl<R: Read + Seek> Read for SharedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.lock()?.read(buf)
    }
}

impl<R: Read + Seek> Seek for SharedReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.lock()?.seek(pos)
    }
}

/// Read until `buf` is full or the stream ends.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Resolve a seek request against a window of `size` bytes.
fn resolve_seek(position: u64, size: u64, pos: SeekFrom) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::End(offset) => size.checked_add_signed(offset),
        SeekFrom::Current(offset) => position.checked_add_signed(offset),
    };
    match target {
        Some(new_pos) if new_pos <= size => Ok(new_pos),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Cannot seek past end of subfile",
        )),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Cannot seek before start of subfile",
        )),
    }
}

/// Represents a sub-section of a file
pub struct SubFile<R: Read + Seek> {
    reader: R,
    start: u64,
    end: u64,
    position: u64,
}

impl<R: Read + Seek> SubFile<R> {
    pub fn new(reader: R, start: u64, end: u64) -> Self {
        Self {
            reader,
            start,
            end: end.max(start),
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Absolute offset of this window in the underlying stream.
    pub fn start(&self) -> u64 {
        self.start
    }
}

impl<R: Read + Seek + Clone> SubFile<R> {
    /// A nested window, expressed relative to this one.
    ///
    /// The result reads straight from the underlying stream rather than
    /// through this window, and is clamped to this window's end.
    pub fn sub_file(&self, start: u64, end: u64) -> SubFile<R> {
        let abs_start = self.start.saturating_add(start).min(self.end);
        let abs_end = self.start.saturating_add(end).min(self.end);
        SubFile::new(self.reader.clone(), abs_start, abs_end)
    }
}

impl<R: Read + Seek> Read for SubFile<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.size() {
            return Ok(0);
        }

        self.reader
            .seek(SeekFrom::Start(self.start + self.position))?;

        let max_read = std::cmp::min(buf.len() as u64, self.size() - self.position) as usize;
        let bytes_read = self.reader.read(&mut buf[..max_read])?;

        self.position += bytes_read as u64;
        Ok(bytes_read)
    }
}

impl<R: Read + Seek> Seek for SubFile<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(self.position, self.size(), pos)?;
        Ok(self.position)
    }
}

/// AES-128-CTR reader that decrypts a section as it's read.
///
/// The counter for byte offset `n` of the section is `counter + n / 16`.
pub struct CtrReader<R: Read + Seek> {
    inner: R,
    key: [u8; 0x10],
    counter: u128,
    size: u64,
    position: u64,
}

impl<R: Read + Seek> CtrReader<R> {
    /// `inner` must be positioned so that offset 0 is the start of the section.
    pub fn new(inner: R, key: [u8; 0x10], counter: u128, size: u64) -> Self {
        Self {
            inner,
            key,
            counter,
            size,
            position: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<R: Read + Seek> Read for CtrReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let aligned = align_down(self.position, BLOCK_SIZE as u64);
        let skip = (self.position - aligned) as usize;
        let want = std::cmp::min(buf.len() as u64, self.size - self.position) as usize;
        let span = align_up((skip + want) as u64, BLOCK_SIZE as u64) as usize;

        let mut block_buf = vec![0u8; span];
        self.inner.seek(SeekFrom::Start(aligned))?;
        let got = read_full(&mut self.inner, &mut block_buf)?;

        // A trailing partial block is padded with zeros; only the real bytes are returned.
        let decrypt_len = align_up(got as u64, BLOCK_SIZE as u64) as usize;
        let mut cipher = AesCipher::new_ctr(
            &self.key,
            self.counter.wrapping_add((aligned / BLOCK_SIZE as u64) as u128),
        )
        .map_err(io::Error::other)?;
        cipher
            .decrypt(&mut block_buf[..decrypt_len])
            .map_err(io::Error::other)?;

        let n = std::cmp::min(want, got.saturating_sub(skip));
        buf[..n].copy_from_slice(&block_buf[skip..skip + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for CtrReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(self.position, self.size, pos)?;
        Ok(self.position)
    }
}

/// AES-128-CBC reader with random access.
///
/// Any block can be decrypted on its own: its IV is the preceding ciphertext
/// block, or the base IV for the first block.
pub struct CbcReader<R: Read + Seek> {
    inner: R,
    key: [u8; 0x10],
    iv: [u8; 0x10],
    size: u64,
    position: u64,
}

impl<R: Read + Seek> CbcReader<R> {
    pub fn new(inner: R, key: [u8; 0x10], iv: [u8; 0x10], size: u64) -> Self {
        Self {
            inner,
            key,
            iv,
            size,
            position: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<R: Read + Seek> Read for CbcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let aligned = align_down(self.position, BLOCK_SIZE as u64);
        let skip = (self.position - aligned) as usize;
        let want = std::cmp::min(buf.len() as u64, self.size - self.position) as usize;
        let span = align_up((skip + want) as u64, BLOCK_SIZE as u64) as usize;

        let iv = if aligned == 0 {
            self.iv
        } else {
            let mut prev = [0u8; BLOCK_SIZE];
            self.inner
                .seek(SeekFrom::Start(aligned - BLOCK_SIZE as u64))?;
            self.inner.read_exact(&mut prev)?;
            prev
        };

        let mut block_buf = vec![0u8; span];
        self.inner.seek(SeekFrom::Start(aligned))?;
        let got = read_full(&mut self.inner, &mut block_buf)?;
        // CBC cannot decrypt a truncated block.
        let whole = align_down(got as u64, BLOCK_SIZE as u64) as usize;

        let mut cipher = AesCipher::new_cbc(&self.key, &iv).map_err(io::Error::other)?;
        cipher
            .decrypt(&mut block_buf[..whole])
            .map_err(io::Error::other)?;

        let n = std::cmp::min(want, whole.saturating_sub(skip));
        buf[..n].copy_from_slice(&block_buf[skip..skip + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for CbcReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(self.position, self.size, pos)?;
        Ok(self.position)
    }
}
