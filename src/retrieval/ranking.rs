//! Top-k selection under a single total order
//!
//! Every ranked list in the crate is ordered by score descending, then by the
//! item's original position ascending. NaN scores sort last.

use std::cmp::Ordering;

/// Ordering of `(position, score)` pairs: best first
pub fn compare_ranked(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    compare_scores(a.1, b.1).then_with(|| a.0.cmp(&b.0))
}

fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // +0.0 and -0.0 compare equal here, unlike total_cmp
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// The `k` best `(position, score)` pairs, sorted
///
/// Partitions in O(n) before sorting the kept prefix when `k` is smaller than
/// the input.
pub fn select_top(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    if k == 0 {
        return Vec::new();
    }
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, compare_ranked);
        scored.truncate(k);
    }
    scored.sort_unstable_by(compare_ranked);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_top_orders_by_score() {
        let scored = vec![(0, 0.1), (1, 0.9), (2, 0.5), (3, 0.7)];
        assert_eq!(select_top(scored, 2), vec![(1, 0.9), (3, 0.7)]);
    }

    #[test]
    fn test_ties_break_by_position() {
        let scored = vec![(3, 0.5), (0, 0.5), (2, 0.5), (1, 0.9)];
        assert_eq!(select_top(scored, 3), vec![(1, 0.9), (0, 0.5), (2, 0.5)]);
    }

    #[test]
    fn test_partition_matches_full_sort() {
        let scored: Vec<(usize, f32)> = (0..200).map(|i| (i, ((i * 37) % 11) as f32)).collect();
        let full = select_top(scored.clone(), scored.len());
        for k in [1, 5, 50, 199, 200, 500] {
            let expected: Vec<_> = full.iter().copied().take(k).collect();
            assert_eq!(select_top(scored.clone(), k), expected);
        }
    }

    #[test]
    fn test_nan_sorts_last() {
        let scored = vec![(0, f32::NAN), (1, -1.0), (2, 0.0)];
        let top = select_top(scored, 3);
        assert_eq!(top[0], (2, 0.0));
        assert_eq!(top[1], (1, -1.0));
        assert!(top[2].1.is_nan());
    }

    #[test]
    fn test_signed_zeros_tie() {
        assert_eq!(compare_ranked(&(0, -0.0), &(1, 0.0)), Ordering::Less);
    }

    #[test]
    fn test_zero_k() {
        assert!(select_top(vec![(0, 1.0)], 0).is_empty());
    }
}
