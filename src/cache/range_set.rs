//! Minimal representation of a set of downloaded byte ranges.
//!
//! The set is kept in its canonical form at all times: ranges are sorted,
//! non-overlapping, and non-adjacent (touching ranges are merged on insert).
//! This is what makes the sidecar format unambiguous and keeps lookups at
//! O(log n).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A half-open byte range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// Errors produced when parsing a serialized range set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRangesError {
    /// Offsets come in `begin end` pairs, so the token count must be even
    #[error("odd number of offsets")]
    OddTokenCount,

    /// A token failed to parse as an unsigned integer
    #[error("offset {0:?} is not an unsigned integer")]
    BadToken(String),

    /// A pair described an empty or inverted range
    #[error("range [{begin}, {end}) is empty or inverted")]
    EmptyRange { begin: u64, end: u64 },

    /// A pair was out of order, overlapped, or touched the pair before it
    #[error("range starting at {begin} overlaps or touches the previous range")]
    OutOfOrder { begin: u64 },
}

/// An ordered set of non-overlapping, non-adjacent half-open byte ranges.
///
/// Keyed by range begin; the invariant maintained by [`insert`](Self::insert)
/// is that consecutive ranges satisfy `prev.end < next.begin` strictly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisjointRangeSet {
    ranges: BTreeMap<u64, u64>,
}

impl DisjointRangeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `[begin, end)`, merging with every existing range it overlaps
    /// or touches.
    ///
    /// # Panics
    ///
    /// Panics if `begin >= end`; empty and inverted ranges are programmer
    /// errors.
    pub fn insert(&mut self, begin: u64, end: u64) {
        assert!(begin < end, "range [{begin}, {end}) is empty or inverted");

        let mut merged_begin = begin;
        let mut merged_end = end;

        // Every mergeable neighbor starts at or before `end`. Walking
        // backwards from there, the disjoint invariant means ends are sorted
        // too, so the first range ending before `begin` terminates the scan.
        let absorbed: Vec<u64> = self
            .ranges
            .range(..=end)
            .rev()
            .take_while(|&(_, &e)| e >= begin)
            .map(|(&b, &e)| {
                merged_begin = merged_begin.min(b);
                merged_end = merged_end.max(e);
                b
            })
            .collect();

        for b in absorbed {
            self.ranges.remove(&b);
        }
        self.ranges.insert(merged_begin, merged_end);
    }

    /// If `offset` lies strictly inside a range (`begin <= offset < end`),
    /// return that range's `end`.
    ///
    /// An offset equal to a range's `end` is not contained.
    pub fn end_of_containing_range(&self, offset: u64) -> Option<u64> {
        self.ranges
            .range(..=offset)
            .next_back()
            .filter(|&(_, &end)| end > offset)
            .map(|(_, &end)| end)
    }

    /// Iterate the ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Range> + '_ {
        self.ranges.iter().map(|(&begin, &end)| Range { begin, end })
    }

    /// Number of disjoint ranges in the set.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of bytes covered by all ranges.
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(|(b, e)| e - b).sum()
    }
}

/// Serializes as whitespace-separated decimal pairs: `"b0 e0 b1 e1 ..."`.
/// An empty set serializes to the empty string.
impl fmt::Display for DisjointRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (begin, end) in &self.ranges {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{begin} {end}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for DisjointRangeSet {
    type Err = ParseRangesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut offsets = Vec::new();
        for token in s.split_whitespace() {
            let value = token
                .parse::<u64>()
                .map_err(|_| ParseRangesError::BadToken(token.to_string()))?;
            offsets.push(value);
        }
        if offsets.len() % 2 != 0 {
            return Err(ParseRangesError::OddTokenCount);
        }

        let mut ranges = BTreeMap::new();
        let mut prev_end: Option<u64> = None;
        for pair in offsets.chunks_exact(2) {
            let (begin, end) = (pair[0], pair[1]);
            if begin >= end {
                return Err(ParseRangesError::EmptyRange { begin, end });
            }
            // Strictly after the previous range; equality would mean two
            // adjacent ranges that insert() would have merged.
            if prev_end.is_some_and(|e| begin <= e) {
                return Err(ParseRangesError::OutOfOrder { begin });
            }
            ranges.insert(begin, end);
            prev_end = Some(end);
        }
        Ok(Self { ranges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_of(set: &DisjointRangeSet) -> Vec<(u64, u64)> {
        set.iter().map(|r| (r.begin, r.end)).collect()
    }

    #[test]
    fn insert_into_empty_set() {
        let mut set = DisjointRangeSet::new();
        set.insert(10, 20);
        assert_eq!(ranges_of(&set), vec![(10, 20)]);
    }

    #[test]
    fn disjoint_inserts_stay_sorted() {
        let mut set = DisjointRangeSet::new();
        set.insert(30, 40);
        set.insert(0, 5);
        set.insert(10, 20);
        assert_eq!(ranges_of(&set), vec![(0, 5), (10, 20), (30, 40)]);
        // Strictly disjoint and non-adjacent after arbitrary inserts.
        for pair in ranges_of(&set).windows(2) {
            assert!(pair[0].1 < pair[1].0);
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = DisjointRangeSet::new();
        set.insert(5, 15);
        let once = set.clone();
        set.insert(5, 15);
        assert_eq!(set, once);
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 8);
        set.insert(8, 16);
        assert_eq!(ranges_of(&set), vec![(0, 16)]);
    }

    #[test]
    fn overlapping_ranges_merge() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 10);
        set.insert(5, 20);
        assert_eq!(ranges_of(&set), vec![(0, 20)]);
    }

    #[test]
    fn insert_bridges_multiple_ranges() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 4);
        set.insert(10, 14);
        set.insert(20, 24);
        set.insert(3, 21);
        assert_eq!(ranges_of(&set), vec![(0, 24)]);
    }

    #[test]
    fn insert_contained_within_existing() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 100);
        set.insert(40, 60);
        assert_eq!(ranges_of(&set), vec![(0, 100)]);
    }

    #[test]
    #[should_panic]
    fn empty_insert_panics() {
        let mut set = DisjointRangeSet::new();
        set.insert(5, 5);
    }

    #[test]
    fn containing_range_query_is_strict() {
        let mut set = DisjointRangeSet::new();
        set.insert(10, 20);
        assert_eq!(set.end_of_containing_range(9), None);
        assert_eq!(set.end_of_containing_range(10), Some(20));
        assert_eq!(set.end_of_containing_range(19), Some(20));
        // `end` itself is outside the half-open range.
        assert_eq!(set.end_of_containing_range(20), None);
    }

    #[test]
    fn query_on_empty_set() {
        let set = DisjointRangeSet::new();
        assert_eq!(set.end_of_containing_range(0), None);
    }

    #[test]
    fn covered_bytes_sums_all_ranges() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 8);
        set.insert(16, 20);
        assert_eq!(set.covered_bytes(), 12);
    }

    #[test]
    fn display_format() {
        let mut set = DisjointRangeSet::new();
        set.insert(16, 20);
        set.insert(0, 8);
        assert_eq!(set.to_string(), "0 8 16 20");
        assert_eq!(DisjointRangeSet::new().to_string(), "");
    }

    #[test]
    fn serialization_round_trips() {
        let mut set = DisjointRangeSet::new();
        set.insert(0, 8);
        set.insert(16, 20);
        set.insert(100, 250);
        let parsed: DisjointRangeSet = set.to_string().parse().unwrap();
        assert_eq!(parsed, set);

        let empty: DisjointRangeSet = "".parse().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "garbage".parse::<DisjointRangeSet>(),
            Err(ParseRangesError::BadToken("garbage".to_string()))
        );
        assert_eq!(
            "0 8 16".parse::<DisjointRangeSet>(),
            Err(ParseRangesError::OddTokenCount)
        );
        assert_eq!(
            "8 0".parse::<DisjointRangeSet>(),
            Err(ParseRangesError::EmptyRange { begin: 8, end: 0 })
        );
        assert_eq!(
            "0 8 4 12".parse::<DisjointRangeSet>(),
            Err(ParseRangesError::OutOfOrder { begin: 4 })
        );
        // Adjacent pairs are invalid too: the canonical form merges them.
        assert_eq!(
            "0 8 8 12".parse::<DisjointRangeSet>(),
            Err(ParseRangesError::OutOfOrder { begin: 8 })
        );
    }

    #[test]
    fn parse_accepts_arbitrary_whitespace() {
        let parsed: DisjointRangeSet = " 0 8\n16\t20 ".parse().unwrap();
        assert_eq!(ranges_of(&parsed), vec![(0, 8), (16, 20)]);
    }
}
