//! The byte-source contract the zip engine reads archives through.
//!
//! The parser drives a [`ZipSource`] the way a stdio consumer drives a file:
//! open a session, seek, read, tell, and ask for the total size it needs to
//! locate the central directory. Two implementations are provided:
//! [`DirectSource`] passes reads straight to a [`ReadAt`] source, while
//! [`CachedSource`] routes them through a [`LazyFile`] so every byte range
//! the engine touches is staged on disk and reused on the next run.

use std::io::SeekFrom;
use std::path::PathBuf;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::cache::{CacheError, LazyFile, SourceReader};
use crate::io::ReadAt;

/// Capability bits reported by [`ZipSource::supports`].
pub mod caps {
    pub const OPEN: u32 = 1 << 0;
    pub const CLOSE: u32 = 1 << 1;
    pub const READ: u32 = 1 << 2;
    pub const SEEK: u32 = 1 << 3;
    pub const TELL: u32 = 1 << 4;
    pub const SIZE: u32 = 1 << 5;
    pub const SUPPORTS: u32 = 1 << 6;
    /// Destruction; in Rust terms, `Drop`.
    pub const FREE: u32 = 1 << 7;
}

/// A stateful, seekable byte source of fixed total size.
///
/// The engine serializes calls per source; implementations do not need to be
/// thread-safe. Destruction is ordinary `Drop`.
#[async_trait]
pub trait ZipSource: Send {
    /// Begin a read session, rewinding the offset to zero.
    async fn open(&mut self) -> Result<()>;

    /// End the session and rewind. The source remains reusable.
    async fn close(&mut self) -> Result<()>;

    /// Read bytes at the current offset, advancing it by the returned count.
    /// Zero means end of file; short reads are normal and callers loop.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition the offset. Relative positions (`Current`, `End`) are
    /// resolved against the current offset and the fixed size; resolving to
    /// a negative offset is an error.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current read offset.
    fn tell(&self) -> u64;

    /// Fixed total size of the archive in bytes.
    fn size(&self) -> u64;

    /// Bitmap of the commands this source supports.
    fn supports(&self) -> u32 {
        caps::OPEN
            | caps::CLOSE
            | caps::READ
            | caps::SEEK
            | caps::TELL
            | caps::SIZE
            | caps::SUPPORTS
            | caps::FREE
    }
}

fn resolve_seek(pos: SeekFrom, offset: u64, size: u64) -> Result<u64> {
    let resolved = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(delta) => offset.checked_add_signed(delta),
        SeekFrom::End(delta) => size.checked_add_signed(delta),
    };
    match resolved {
        Some(n) => Ok(n),
        None => bail!("seek resolves to a negative archive offset"),
    }
}

/// Uncached pass-through source over any [`ReadAt`] reader.
///
/// Used for archives that are already cheap to read, like local files.
pub struct DirectSource<R> {
    reader: R,
    size: u64,
    offset: u64,
}

impl<R: ReadAt> DirectSource<R> {
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self {
            reader,
            size,
            offset: 0,
        }
    }
}

#[async_trait]
impl<R: ReadAt> ZipSource for DirectSource<R> {
    async fn open(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.offset >= self.size {
            return Ok(0);
        }
        let got = self.reader.read_at(self.offset, buf).await?;
        self.offset += got as u64;
        Ok(got)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.offset = resolve_seek(pos, self.offset, self.size)?;
        Ok(self.offset)
    }

    fn tell(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Source that lazily mirrors the archive into a local cache file.
///
/// Reads are delegated to a [`LazyFile`] keyed at `cache_path`: ranges the
/// engine already touched (this run or a previous one) are served from disk,
/// everything else is fetched from the inner reader. The sidecar at
/// `<cache_path>.frag_data` is refreshed when the source is dropped.
pub struct CachedSource<R> {
    file: LazyFile<SourceReader<R>>,
    size: u64,
    offset: u64,
}

impl<R: ReadAt> CachedSource<R> {
    /// Wrap `inner` with an on-disk cache at `cache_path`.
    ///
    /// The archive's total size is captured from `inner` up front; the zip
    /// engine relies on it to locate the central directory without probing.
    pub fn new(inner: R, cache_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let size = inner.size();
        let file = LazyFile::create(cache_path, size, SourceReader::new(inner))?;
        Ok(Self {
            file,
            size,
            offset: 0,
        })
    }

    /// Bytes currently staged in the cache file.
    pub fn cached_bytes(&self) -> u64 {
        self.file.downloaded().covered_bytes()
    }
}

#[async_trait]
impl<R: ReadAt> ZipSource for CachedSource<R> {
    async fn open(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.file.seek(self.offset);
        let got = self.file.read(buf).await?;
        self.offset += got as u64;
        Ok(got)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.offset = resolve_seek(pos, self.offset, self.size)?;
        Ok(self.offset)
    }

    fn tell(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }
}
