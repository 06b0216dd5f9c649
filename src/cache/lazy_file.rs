//! Lazily materialized local copy of an expensive byte source.
//!
//! [`LazyFile`] serves seekable reads over a blob of known, fixed size. Bytes
//! already fetched are answered from a local contents file; everything else
//! is pulled from an injected [`RemoteReader`] on demand, written into the
//! contents file at its natural offset, and remembered in a
//! [`DisjointRangeSet`] so the next run does not fetch it again.
//!
//! ## Fetch policy
//!
//! Round trips to the upstream are assumed expensive, so on a cache miss the
//! upstream is asked for the caller's full buffer length rather than just the
//! bytes up to the next cached range. That can re-download a few bytes that
//! were already present, but it halves the number of requests in the common
//! scan-forward access pattern.
//!
//! ## Persistence
//!
//! The set of fetched ranges lives in a sidecar file next to the contents
//! file (`<path>.frag_data`), rewritten atomically (temp file + rename) when
//! the [`LazyFile`] is dropped. Losing or corrupting the sidecar is harmless:
//! it is reloaded as "nothing cached" with a warning and the bytes are simply
//! fetched again.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::{CacheError, Result};
use super::range_set::DisjointRangeSet;
use crate::io::ReadAt;

/// Extension appended to the contents path to name the range sidecar.
const SIDECAR_SUFFIX: &str = ".frag_data";

/// The upstream capability a [`LazyFile`] fetches missing bytes through.
///
/// Implementations keep their own position: `seek` repositions it, `read`
/// advances it. Short reads are permitted and a zero return means end of
/// stream; the cache treats either as "that's all for now" and lets the
/// caller loop.
#[async_trait]
pub trait RemoteReader: Send {
    /// Reposition to an absolute byte offset.
    async fn seek(&mut self, offset: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes at the current position.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// A [`RemoteReader`] over any positional [`ReadAt`] source.
///
/// Owns the source together with the read cursor into it, so the pair cannot
/// drift apart or outlive one another.
pub struct SourceReader<R> {
    source: R,
    cursor: u64,
}

impl<R: ReadAt> SourceReader<R> {
    pub fn new(source: R) -> Self {
        Self { source, cursor: 0 }
    }
}

#[async_trait]
impl<R: ReadAt> RemoteReader for SourceReader<R> {
    async fn seek(&mut self, offset: u64) -> Result<()> {
        self.cursor = offset;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.cursor >= self.source.size() {
            return Ok(0);
        }
        let got = self
            .source
            .read_at(self.cursor, buf)
            .await
            .map_err(CacheError::Remote)?;
        self.cursor += got as u64;
        Ok(got)
    }
}

/// A file whose bytes are fetched from an upstream reader on first use and
/// served locally ever after.
///
/// Not thread-safe: all methods take `&mut self` and callers are expected to
/// serialize access. Exactly one live instance may own a given contents path;
/// two instances over the same paths corrupt each other's sidecars.
pub struct LazyFile<R> {
    path: PathBuf,
    size: u64,
    contents: File,
    remote: R,
    downloaded: DisjointRangeSet,
    cursor: u64,
}

impl<R: RemoteReader> LazyFile<R> {
    /// Open or create the contents file at `path` for a blob of `size` bytes,
    /// with `remote` supplying bytes on cache misses.
    ///
    /// The sidecar at `<path>.frag_data` is opened (created if absent) and
    /// parsed into the initial downloaded-range set; if it is unreadable or
    /// malformed the cache starts empty and a warning is logged. Creation
    /// fails only if the contents file itself cannot be opened.
    pub fn create(path: impl Into<PathBuf>, size: u64, remote: R) -> Result<Self> {
        let path = path.into();
        let contents = open_read_write(&path).map_err(|source| CacheError::Construction {
            path: path.clone(),
            source,
        })?;

        let downloaded = match load_sidecar(&sidecar_path(&path)) {
            Ok(set) => set,
            Err(err) => {
                warn!(
                    "ignoring unusable range sidecar for {}: {err}",
                    path.display()
                );
                DisjointRangeSet::new()
            }
        };
        debug!(
            path = %path.display(),
            size,
            cached = downloaded.covered_bytes(),
            "opened lazy file"
        );

        Ok(Self {
            path,
            size,
            contents,
            remote,
            downloaded,
            cursor: 0,
        })
    }

    /// Total size of the backing blob, fixed at creation.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current logical read offset.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Byte ranges currently materialized in the contents file.
    pub fn downloaded(&self) -> &DisjointRangeSet {
        &self.downloaded
    }

    /// Set the offset the next [`read`](Self::read) starts from.
    ///
    /// Not bounds-checked; reads past the end of the blob return zero bytes.
    pub fn seek(&mut self, location: u64) {
        self.cursor = location;
    }

    /// Read the next contiguous chunk of bytes at the cursor.
    ///
    /// If the cursor sits inside an already-fetched range, bytes come from
    /// the contents file, clamped to that range's end, and the upstream is
    /// not contacted. Otherwise the upstream is asked for the full buffer
    /// length, whatever arrives is staged into the contents file and recorded,
    /// and that count is returned. Either way the return may be shorter than
    /// `buf`; callers loop.
    ///
    /// On error the cursor and the downloaded set are left unchanged.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.downloaded.end_of_containing_range(self.cursor) {
            Some(range_end) => {
                let want = (range_end - self.cursor).min(buf.len() as u64) as usize;
                let got = read_at(&self.contents, self.cursor, &mut buf[..want])
                    .map_err(CacheError::Read)?;
                debug!(offset = self.cursor, len = got, "cache hit");
                self.cursor += got as u64;
                Ok(got)
            }
            None => {
                self.remote.seek(self.cursor).await?;
                let got = self.remote.read(buf).await?;
                if got > 0 {
                    write_all_at(&self.contents, self.cursor, &buf[..got])
                        .map_err(CacheError::Write)?;
                    self.downloaded.insert(self.cursor, self.cursor + got as u64);
                }
                debug!(offset = self.cursor, len = got, "cache miss filled");
                self.cursor += got as u64;
                Ok(got)
            }
        }
    }
}

impl<R> LazyFile<R> {
    /// Rewrite the sidecar from the in-memory range set.
    ///
    /// Written to a temp file in the same directory and renamed into place so
    /// a crash mid-write never leaves a half-written sidecar behind.
    fn persist_ranges(&self) -> io::Result<()> {
        let sidecar = sidecar_path(&self.path);
        let mut tmp = sidecar.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, self.downloaded.to_string())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644))?;
        }
        fs::rename(&tmp, &sidecar)
    }
}

impl<R> Drop for LazyFile<R> {
    fn drop(&mut self) {
        if let Err(err) = self.persist_ranges() {
            warn!(
                "failed to persist range sidecar for {}: {err}",
                self.path.display()
            );
        }
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(SIDECAR_SUFFIX);
    PathBuf::from(sidecar)
}

fn open_read_write(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

fn load_sidecar(path: &Path) -> anyhow::Result<DisjointRangeSet> {
    use std::io::Read;
    let mut file = open_read_write(path)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text.parse()?)
}

fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }
    #[cfg(not(unix))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

fn write_all_at(file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.write_all_at(buf, offset)
    }
    #[cfg(not(unix))]
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Deterministic upstream over an in-memory blob, recording every seek
    /// and counting every read.
    struct MemoryRemote {
        blob: Vec<u8>,
        cursor: u64,
        fetches: Arc<AtomicUsize>,
        seeks: Arc<Mutex<Vec<u64>>>,
    }

    impl MemoryRemote {
        fn new(blob: Vec<u8>) -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<u64>>>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let seeks = Arc::new(Mutex::new(Vec::new()));
            let remote = Self {
                blob,
                cursor: 0,
                fetches: Arc::clone(&fetches),
                seeks: Arc::clone(&seeks),
            };
            (remote, fetches, seeks)
        }
    }

    #[async_trait]
    impl RemoteReader for MemoryRemote {
        async fn seek(&mut self, offset: u64) -> Result<()> {
            self.seeks.lock().unwrap().push(offset);
            self.cursor = offset;
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            if self.cursor >= self.blob.len() as u64 {
                return Ok(0);
            }
            let start = self.cursor as usize;
            let n = buf.len().min(self.blob.len() - start);
            buf[..n].copy_from_slice(&self.blob[start..start + n]);
            self.cursor += n as u64;
            Ok(n)
        }
    }

    /// Upstream that always fails, for error-path checks.
    struct BrokenRemote;

    #[async_trait]
    impl RemoteReader for BrokenRemote {
        async fn seek(&mut self, _offset: u64) -> Result<()> {
            Ok(())
        }

        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Err(CacheError::Remote(anyhow!("upstream unavailable")))
        }
    }

    fn test_blob() -> Vec<u8> {
        (0u8..24).collect()
    }

    fn ranges_of(set: &DisjointRangeSet) -> Vec<(u64, u64)> {
        set.iter().map(|r| (r.begin, r.end)).collect()
    }

    #[tokio::test]
    async fn cold_read_fetches_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, fetches, seeks) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        let mut buf = [0u8; 8];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 8);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(fetches.load(Ordering::Relaxed), 1);
        assert_eq!(*seeks.lock().unwrap(), vec![0]);
        assert_eq!(ranges_of(file.downloaded()), vec![(0, 8)]);
        assert_eq!(file.cursor(), 8);
    }

    #[tokio::test]
    async fn warm_read_skips_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, fetches, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        let mut buf = [0u8; 8];
        file.read(&mut buf).await.unwrap();

        file.seek(2);
        let mut buf = [0u8; 4];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 4);
        assert_eq!(buf, [2, 3, 4, 5]);
        assert_eq!(fetches.load(Ordering::Relaxed), 1, "hit must not fetch");
        assert_eq!(ranges_of(file.downloaded()), vec![(0, 8)]);
        assert_eq!(file.cursor(), 6);
    }

    #[tokio::test]
    async fn gap_read_fetches_only_missing_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, _, seeks) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        let mut buf = [0u8; 8];
        file.read(&mut buf).await.unwrap();

        file.seek(16);
        let mut buf = [0u8; 4];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 4);
        assert_eq!(buf, [16, 17, 18, 19]);
        assert_eq!(*seeks.lock().unwrap(), vec![0, 16]);
        assert_eq!(ranges_of(file.downloaded()), vec![(0, 8), (16, 20)]);
        assert_eq!(file.cursor(), 20);
    }

    #[tokio::test]
    async fn gap_fill_merges_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, _, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        let mut buf = [0u8; 8];
        file.read(&mut buf).await.unwrap();
        file.seek(16);
        file.read(&mut buf[..4]).await.unwrap();

        // Fill the hole between the two cached ranges.
        file.seek(8);
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 8);
        assert_eq!(buf, [8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(ranges_of(file.downloaded()), vec![(0, 20)]);
        assert_eq!(file.cursor(), 16);
    }

    #[tokio::test]
    async fn ranges_persist_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");

        {
            let (remote, _, _) = MemoryRemote::new(test_blob());
            let mut file = LazyFile::create(&path, 24, remote).unwrap();
            let mut buf = [0u8; 20];
            file.read(&mut buf).await.unwrap();
        }

        let sidecar = std::fs::read_to_string(sidecar_path(&path)).unwrap();
        assert_eq!(sidecar, "0 20");

        let (remote, fetches, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();
        assert_eq!(ranges_of(file.downloaded()), vec![(0, 20)]);

        let mut buf = [0u8; 20];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 20);
        assert_eq!(buf.to_vec(), test_blob()[..20].to_vec());
        assert_eq!(fetches.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn corrupt_sidecar_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");

        {
            let (remote, _, _) = MemoryRemote::new(test_blob());
            let mut file = LazyFile::create(&path, 24, remote).unwrap();
            let mut buf = [0u8; 8];
            file.read(&mut buf).await.unwrap();
        }

        std::fs::write(sidecar_path(&path), "garbage").unwrap();

        let (remote, fetches, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();
        assert!(file.downloaded().is_empty());

        // Everything is re-fetched and still correct.
        let mut buf = [0u8; 24];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 24);
        assert_eq!(buf.to_vec(), test_blob());
        assert_eq!(fetches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_read_does_not_touch_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, fetches, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        let got = file.read(&mut []).await.unwrap();
        assert_eq!(got, 0);
        assert_eq!(fetches.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn read_past_end_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, _, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        file.seek(100);
        let mut buf = [0u8; 8];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 0);
        assert!(file.downloaded().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let mut file = LazyFile::create(&path, 24, BrokenRemote).unwrap();

        file.seek(4);
        let mut buf = [0u8; 8];
        let err = file.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, CacheError::Remote(_)));
        assert_eq!(file.cursor(), 4);
        assert!(file.downloaded().is_empty());
    }

    #[tokio::test]
    async fn short_upstream_read_near_end_of_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let (remote, _, _) = MemoryRemote::new(test_blob());
        let mut file = LazyFile::create(&path, 24, remote).unwrap();

        file.seek(20);
        let mut buf = [0u8; 16];
        let got = file.read(&mut buf).await.unwrap();
        assert_eq!(got, 4);
        assert_eq!(&buf[..4], &[20, 21, 22, 23]);
        assert_eq!(ranges_of(file.downloaded()), vec![(20, 24)]);
    }
}
