use crate::core::CurveMatrix;
use crate::distance::DistanceMetric;
use crate::errors::LampError;
use crate::rank::{
    baseline_distance_values, rank, select_below_distance, select_below_rank, RankEngine,
};
use crate::tests::{fan_of_lines, init, random_ensemble, SEED};

use approx::assert_relative_eq;

#[test]
fn test_each_column_is_a_permutation() {
    init();
    let curves = random_ensemble(5, 10, SEED);
    let ranks = rank(&curves, 2, DistanceMetric::Euclidean, None, false).unwrap();
    assert_eq!(ranks.shape(), (5, 10));
    assert_eq!(ranks.baseline(), 2);

    for t in 0..10 {
        let col = ranks.column(t);
        assert_eq!(col[2], None);
        let mut got: Vec<usize> = col.into_iter().flatten().collect();
        got.sort_unstable();
        assert_eq!(got, (0..4).collect::<Vec<_>>());
    }
    assert!(ranks.series(2).is_none());
    assert_eq!(ranks.series(0).map(|s| s.len()), Some(10));
}

#[test]
fn test_inverted_ranks_start_at_one() {
    let curves = random_ensemble(5, 10, SEED + 1);
    let ranks = RankEngine::new(DistanceMetric::Manhattan)
        .with_inverted(true)
        .rank(&curves, 0)
        .unwrap();
    assert!(ranks.inverted());
    for t in 0..10 {
        let mut got: Vec<usize> = ranks.column(t).into_iter().flatten().collect();
        got.sort_unstable();
        assert_eq!(got, (1..5).collect::<Vec<_>>());
    }
}

#[test]
fn test_ranks_follow_distance() {
    let curves = fan_of_lines();
    let asc = rank(&curves, 0, DistanceMetric::Euclidean, None, false).unwrap();
    let inv = rank(&curves, 0, DistanceMetric::Euclidean, None, true).unwrap();
    for t in 0..10 {
        for k in 1..5 {
            assert_eq!(asc.rank(k, t), Some(k - 1));
        }
    }
    // column 0 only sees the shared origin, so every distance ties there
    for t in 1..10 {
        for k in 1..5 {
            assert_eq!(inv.rank(k, t), Some(5 - k));
        }
    }
    assert_eq!(inv.rank(1, 0), Some(1));
}

#[test]
fn test_zero_distance_ties_keep_index_order() {
    // curves 1 and 3 duplicate the baseline; jitter keeps them ahead of the rest
    let base = vec![1.0, 2.0, 3.0, 4.0];
    let curves = CurveMatrix::new(vec![
        vec![9.0, 9.0, 9.0, 9.0],
        base.clone(),
        base.clone(),
        base,
        vec![5.0, 5.0, 5.0, 5.0],
    ])
    .unwrap();
    let ranks = rank(&curves, 2, DistanceMetric::Euclidean, None, false).unwrap();
    for t in 0..4 {
        assert_eq!(ranks.rank(1, t), Some(0));
        assert_eq!(ranks.rank(3, t), Some(1));
    }
    assert_eq!(ranks.rank(2, 0), None);
    assert_eq!(ranks.raw(2, 0), 0);
}

#[test]
fn test_trailing_window() {
    // curve 1 diverges early then matches; curve 2 matches early then diverges
    let curves = CurveMatrix::new(vec![
        vec![0.0; 6],
        vec![5.0, 5.0, 5.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    ])
    .unwrap();
    let full = rank(&curves, 0, DistanceMetric::Euclidean, None, false).unwrap();
    let windowed = rank(&curves, 0, DistanceMetric::Euclidean, Some(2), false).unwrap();

    // whole prefix: curve 1 still carries its early divergence
    assert_eq!(full.rank(1, 5), Some(1));
    assert_eq!(full.rank(2, 5), Some(0));
    // last two samples only: curve 1 is identical to the baseline
    assert_eq!(windowed.rank(1, 5), Some(0));
    assert_eq!(windowed.rank(2, 5), Some(1));
}

#[test]
fn test_rank_errors() {
    let curves = random_ensemble(4, 6, SEED);
    assert_eq!(
        rank(&curves, 4, DistanceMetric::Euclidean, None, false).unwrap_err(),
        LampError::IndexOutOfRange { index: 4, len: 4 }
    );
    for w in [0, 7] {
        assert!(matches!(
            rank(&curves, 0, DistanceMetric::Euclidean, Some(w), false),
            Err(LampError::InvalidArgument(_))
        ));
    }
    let single = CurveMatrix::new(vec![vec![1.0, 2.0]]).unwrap();
    assert!(matches!(
        rank(&single, 0, DistanceMetric::Euclidean, None, false),
        Err(LampError::InvalidInput(_))
    ));
}

#[test]
fn test_distance_values() {
    let curves = fan_of_lines();
    let values = baseline_distance_values(&curves, 0, DistanceMetric::Manhattan, 0..10, false)
        .unwrap();
    // Σ_t k·t over t = 0..9
    for k in 0..5 {
        assert_relative_eq!(values[k], 45.0 * k as f64);
    }

    let logged = baseline_distance_values(&curves, 0, DistanceMetric::Manhattan, 0..10, true)
        .unwrap();
    assert_eq!(logged[0], 0.0);
    assert_relative_eq!(logged[2], 90f64.log10());

    assert!(matches!(
        baseline_distance_values(&curves, 0, DistanceMetric::Euclidean, 3..3, false),
        Err(LampError::InvalidRange(_))
    ));
    assert!(matches!(
        baseline_distance_values(&curves, 0, DistanceMetric::Euclidean, 0..11, false),
        Err(LampError::InvalidRange(_))
    ));
}

#[test]
fn test_threshold_selections() {
    let curves = fan_of_lines();
    let ranks = rank(&curves, 0, DistanceMetric::Euclidean, None, false).unwrap();

    assert_eq!(select_below_rank(&ranks, 5, 2.0, |_| true), vec![1, 2]);
    assert_eq!(select_below_rank(&ranks, 5, 2.0, |i| i != 1), vec![2]);
    assert!(select_below_rank(&ranks, 5, 0.0, |_| true).is_empty());

    let values = [0.0, 1.0, 2.0, 3.0];
    assert_eq!(select_below_distance(&values, 2.5, |i| i != 0), vec![1, 2]);
    // a value equal to the threshold is selected
    assert_eq!(select_below_distance(&values, 2.0, |i| i != 0), vec![1, 2]);
    assert_eq!(select_below_distance(&values, 1.0, |_| true), vec![0, 1]);
}
