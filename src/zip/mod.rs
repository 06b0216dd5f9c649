//! ZIP archive parsing and extraction.
//!
//! This module reads and extracts ZIP archives, supporting both the standard
//! format and ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! Four components:
//!
//! - [`source`]: the byte-source contract ([`ZipSource`]) the engine reads
//!   through, with a cached and an uncached implementation
//! - [`structures`]: data structures for the ZIP format elements (EOCD, file
//!   headers, and friends)
//! - [`parser`]: low-level parsing of those structures out of a source
//! - [`extractor`]: the high-level extraction API
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The engine reads the EOCD first (from the end of the file), then the
//! Central Directory, so listing an archive touches only its tail. Combined
//! with a ranged or cached source this means entries can be listed and
//! extracted without ever materializing the whole archive.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod extractor;
mod parser;
mod source;
mod structures;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use source::{CachedSource, DirectSource, ZipSource, caps};
pub use structures::*;
