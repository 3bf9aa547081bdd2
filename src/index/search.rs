//! Parallel first-match search over index entries
//!
//! The entries are split into contiguous chunks that are scanned on the rayon
//! pool. Workers share the index of the lowest chunk that has matched so far;
//! a worker whose chunk comes after that one stops scanning. The result is
//! the lowest matching position, exactly what a sequential scan returns.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sequential first-match scan
pub fn first_match_sequential<T, F>(entries: &[T], matches: F) -> Option<usize>
where
    F: Fn(&T) -> bool,
{
    entries.iter().position(matches)
}

/// Parallel first-match scan split into `chunks` pieces
///
/// Returns the position of the first entry (in slice order) for which
/// `matches` is true.
pub fn first_match<T, F>(entries: &[T], chunks: usize, matches: F) -> Option<usize>
where
    T: Sync,
    F: Fn(&T) -> bool + Sync,
{
    if entries.is_empty() {
        return None;
    }
    let chunk_len = entries.len().div_ceil(chunks.max(1)).max(1);
    let winner = AtomicUsize::new(usize::MAX);

    entries
        .par_chunks(chunk_len)
        .enumerate()
        .filter_map(|(chunk_idx, chunk)| {
            for (offset, entry) in chunk.iter().enumerate() {
                // Checked between comparisons; an earlier chunk already won
                if winner.load(Ordering::Relaxed) < chunk_idx {
                    return None;
                }
                if matches(entry) {
                    winner.fetch_min(chunk_idx, Ordering::Relaxed);
                    return Some(chunk_idx * chunk_len + offset);
                }
            }
            None
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let entries: Vec<u32> = Vec::new();
        assert_eq!(first_match(&entries, 4, |_| true), None);
        assert_eq!(first_match_sequential(&entries, |_| true), None);
    }

    #[test]
    fn test_matches_sequential_result() {
        let entries: Vec<u32> = (0..10_000).collect();
        for target in [0, 1, 2_499, 2_500, 7_777, 9_999] {
            let pred = |v: &u32| *v % 10_000 == target;
            assert_eq!(
                first_match(&entries, 8, pred),
                first_match_sequential(&entries, pred),
                "target {target}"
            );
        }
    }

    #[test]
    fn test_earliest_of_several_matches_wins() {
        // Matches in several chunks; the lowest position must always win
        let entries: Vec<u32> = (0..1_000).collect();
        for _ in 0..50 {
            let found = first_match(&entries, 16, |v| *v % 97 == 96);
            assert_eq!(found, Some(96));
        }
    }

    #[test]
    fn test_no_match() {
        let entries: Vec<u32> = (0..5_000).collect();
        assert_eq!(first_match(&entries, 4, |v| *v > 10_000), None);
    }

    #[test]
    fn test_more_chunks_than_entries() {
        let entries = vec![5u32, 6, 7];
        assert_eq!(first_match(&entries, 64, |v| *v == 7), Some(2));
        assert_eq!(first_match(&entries, 0, |v| *v == 6), Some(1));
    }
}
