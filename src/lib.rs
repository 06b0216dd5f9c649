//! # zipstash
//!
//! A Rust unzip utility that lazily caches remote archive bytes on disk.
//!
//! This library extracts ZIP files from the local filesystem and from HTTP
//! servers. Remote archives are read with HTTP Range requests, and the byte
//! ranges actually touched can be persisted in a local cache file so repeated
//! invocations against the same archive skip the network for everything that
//! was already fetched.
//!
//! ## Features
//!
//! - Extract ZIP files from local filesystem
//! - Extract ZIP files from HTTP/HTTPS URLs using Range requests
//! - Persistent range-tracked cache for remote archives
//! - Support for ZIP64 format (archives larger than 4GB)
//! - Support for STORED (uncompressed) and DEFLATE compression methods
//! - Selective file extraction with glob pattern matching
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipstash::{CachedSource, HttpRangeReader, ZipExtractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Create a reader for a remote ZIP file
//!     let reader = Arc::new(HttpRangeReader::new("https://example.com/archive.zip".to_string()).await?);
//!
//!     // Route reads through an on-disk cache that survives restarts
//!     let source = CachedSource::new(reader, "/tmp/archive.zip.cache")?;
//!
//!     // Create an extractor
//!     let mut extractor = ZipExtractor::new(source).await?;
//!
//!     // List all files in the archive
//!     let files = extractor.list_files().await?;
//!     for file in &files {
//!         println!("{}", file.file_name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod io;
pub mod zip;

pub use cache::{CacheError, DisjointRangeSet, LazyFile, RemoteReader, SourceReader};
pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use zip::{CachedSource, DirectSource, ZipEntry, ZipExtractor, ZipSource};
