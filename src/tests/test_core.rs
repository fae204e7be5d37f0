use crate::core::{zero_pad, CurveMatrix};
use crate::errors::LampError;
use crate::tests::init;

use smartcore::linalg::basic::arrays::Array;

#[test]
fn test_new_and_accessors() {
    init();
    let curves = CurveMatrix::new(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
    assert_eq!(curves.shape(), (2, 3));
    assert_eq!(curves.row(1), &[4.0, 5.0, 6.0]);
    assert_eq!(curves.get(0, 2), 3.0);
    assert_eq!(curves.column(1), vec![2.0, 5.0]);
    assert_eq!(curves.rows().count(), 2);
}

#[test]
fn test_rejects_bad_input() {
    assert!(matches!(
        CurveMatrix::new(vec![]),
        Err(LampError::InvalidArgument(_))
    ));
    assert!(matches!(
        CurveMatrix::new(vec![vec![1.0, 2.0], vec![1.0]]),
        Err(LampError::InvalidArgument(_))
    ));
    assert!(matches!(
        CurveMatrix::new(vec![vec![1.0, f64::NAN]]),
        Err(LampError::InvalidInput(_))
    ));
    assert!(matches!(
        CurveMatrix::from_flat(vec![1.0; 5], 2, 3),
        Err(LampError::DimensionMismatch(_))
    ));
}

#[test]
fn test_dense_conversion_keeps_layout() {
    let curves = CurveMatrix::new(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
    let dense = curves.to_dense();
    assert_eq!(dense.shape(), (2, 3));
    assert_eq!(*dense.get((1, 0)), 4.0);
    assert_eq!(*dense.get((0, 2)), 3.0);

    let back = CurveMatrix::from_dense(&dense).unwrap();
    assert_eq!(back, curves);
}

#[test]
fn test_slice_columns() {
    let curves = CurveMatrix::new(vec![(0..10).map(|v| v as f64).collect()]).unwrap();
    assert_eq!(curves.slice_columns(2, 8, 3), vec![vec![2.0, 5.0]]);
    // end clamps to the series length
    assert_eq!(curves.slice_columns(7, 50, 1), vec![vec![7.0, 8.0, 9.0]]);
    assert_eq!(curves.slice_columns(5, 5, 1), vec![Vec::<f64>::new()]);
}

#[test]
fn test_names_and_fallback() {
    let curves = CurveMatrix::new(vec![vec![0.0], vec![1.0], vec![2.0]])
        .unwrap()
        .with_names(vec!["well-a".into(), String::new()]);
    assert_eq!(curves.curve_name(0), "well-a");
    assert_eq!(curves.curve_name(1), "Curve 1");
    assert_eq!(curves.curve_name(2), "Curve 2");
}

#[test]
fn test_append_rows_fills_names() {
    let curves = CurveMatrix::new(vec![vec![0.0, 1.0], vec![1.0, 2.0]]).unwrap();
    let out = curves
        .append_rows(vec![vec![5.0, 5.0]], Some(vec!["P50".to_string()]))
        .unwrap();
    assert_eq!(out.shape(), (3, 2));
    assert_eq!(out.names().unwrap(), &["", "", "P50"]);
    assert_eq!(out.curve_name(2), "P50");

    assert!(curves.append_rows(vec![vec![1.0]], None).is_err());
}

#[test]
fn test_zero_pad() {
    let padded = zero_pad(&[vec![1.0], vec![1.0, 2.0, 3.0]], 2);
    assert_eq!(padded, vec![vec![1.0, 0.0], vec![1.0, 2.0, 3.0]]);
}
