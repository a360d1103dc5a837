//! Deterministic top-n selection over score columns.

use std::cmp::Ordering;

fn descending(scores: &[f64]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
    // `+ 0.0` maps `-0.0` to `+0.0`; `total_cmp` would otherwise order them.
    move |a: &usize, b: &usize| {
        (scores[*b] + 0.0)
            .total_cmp(&(scores[*a] + 0.0))
            .then_with(|| a.cmp(b))
    }
}

/// Indices of the `n` highest scores, best first. Equal scores keep
/// ascending index order, so the result is a pure function of the input.
#[must_use]
pub fn top_positions(scores: &[f64], n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let cmp = descending(scores);
    let mut positions: Vec<usize> = (0..scores.len()).collect();
    if n < positions.len() {
        positions.select_nth_unstable_by(n - 1, &cmp);
        positions.truncate(n);
    }
    positions.sort_unstable_by(&cmp);
    positions
}

/// Every index ordered by score descending, ties by ascending index.
#[must_use]
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    top_positions(scores, scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn picks_highest_scores() {
        assert_eq!(top_positions(&[0.1, 3.0, 2.0, 0.5], 2), vec![1, 2]);
    }

    #[test]
    fn ties_go_to_lower_position() {
        assert_eq!(top_positions(&[1.0, 2.0, 2.0, 2.0, 0.0], 2), vec![1, 2]);
        assert_eq!(rank_descending(&[0.0, 0.0, 0.0]), vec![0, 1, 2]);
    }

    #[test]
    fn signed_zeros_tie_on_position() {
        assert_eq!(top_positions(&[-0.0, 0.0], 1), vec![0]);
        assert_eq!(rank_descending(&[0.0, -0.0, 0.0]), vec![0, 1, 2]);
    }

    #[test]
    fn n_beyond_len_returns_everything() {
        assert_eq!(top_positions(&[1.0, 5.0], 10), vec![1, 0]);
        assert!(top_positions(&[1.0, 5.0], 0).is_empty());
        assert!(top_positions(&[], 3).is_empty());
    }

    proptest! {
        #[test]
        fn matches_stable_full_sort(
            scores in prop::collection::vec(prop::sample::select(vec![0.0_f64, 0.5, 1.0, 2.5, -1.0]), 0..40),
            n in 0_usize..50,
        ) {
            let mut expected: Vec<usize> = (0..scores.len()).collect();
            expected.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
            expected.truncate(n);
            prop_assert_eq!(top_positions(&scores, n), expected);
        }
    }
}
