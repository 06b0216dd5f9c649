//! Range-tracked lazy file cache.
//!
//! A [`LazyFile`] stands in front of an expensive byte source of known, fixed
//! size (typically a remote archive) and materializes it piecemeal into an
//! ordinary local file. Only the byte ranges a caller actually reads are
//! fetched; a [`DisjointRangeSet`] records which ranges are present, and a
//! small sidecar file (`<path>.frag_data`) persists that record across runs.
//!
//! The cache is append-only for a given file: ranges are never evicted, and
//! the backing blob is assumed immutable once its size is fixed. There is no
//! multi-process coordination; exactly one live [`LazyFile`] may own a given
//! contents/sidecar pair.

mod error;
mod lazy_file;
mod range_set;

pub use error::CacheError;
pub use lazy_file::{LazyFile, RemoteReader, SourceReader};
pub use range_set::{DisjointRangeSet, ParseRangesError, Range};
