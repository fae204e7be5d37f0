use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::CurveMatrix;
use crate::errors::LampError;
use crate::lamp::Lamp;
use crate::mds::{ClassicalMds, MdsParams};
use crate::tests::{fan_of_lines, init, random_ensemble, SEED};
use crate::timelapse::{
    compute_projection, control_points, time_lapse_lamp, timestep_variance, GlyphSizeMap,
    SaturationMap, TimeLapseEngine, TimeWindow,
};

use approx::assert_relative_eq;
use log::debug;

fn engine() -> TimeLapseEngine {
    TimeLapseEngine::new(MdsParams::default(), 1e-9)
}

fn padded(rows: &[Vec<f64>], width: usize) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|r| {
            let mut out = r.clone();
            out.extend(std::iter::repeat(0.0).take(width - r.len()));
            out
        })
        .collect()
}

fn fixed_layout(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| vec![(i as f64).cos() * (i + 1) as f64, (i as f64).sin()])
        .collect()
}

#[test]
fn test_full_window_shapes() {
    init();
    let curves = fan_of_lines();
    let proj = compute_projection(
        &curves,
        TimeWindow::full(10),
        &ClassicalMds::default(),
        &Lamp::default(),
    )
    .unwrap();

    assert_eq!(proj.ncurves(), 5);
    assert_eq!(proj.nframes(), 9);
    assert_eq!(proj.control_points().len(), 5);
    assert!(proj.control_points().iter().all(|p| p.len() == 2));

    let paths = proj.paths();
    assert_eq!(paths.len(), 5);
    for path in &paths {
        assert_eq!(path.len(), 9);
        assert!(path.points().all(|p| p[0].is_finite() && p[1].is_finite()));
    }
}

#[test]
fn test_paths_are_views_over_frames() {
    let curves = random_ensemble(8, 12, SEED);
    let proj = compute_projection(
        &curves,
        TimeWindow::new(1, 11, 2),
        &ClassicalMds::default(),
        &Lamp::default(),
    )
    .unwrap();
    assert_eq!(proj.nframes(), TimeWindow::new(1, 11, 2).path_len());

    let path = proj.path(4).unwrap();
    for k in 0..proj.nframes() {
        assert_eq!(path.get(k), Some(proj.frame(k).unwrap()[4]));
    }
    assert_eq!((&path).into_iter().count(), path.len());
    assert_eq!(path.to_vec().len(), path.len());
    assert!(path.get(proj.nframes()).is_none());
    assert_eq!(
        proj.path(8).unwrap_err(),
        LampError::IndexOutOfRange { index: 8, len: 8 }
    );
}

#[test]
fn test_control_points_sample_the_window() {
    let curves = random_ensemble(6, 20, SEED + 1);
    let window = TimeWindow::new(0, 20, 5);
    let ctrl = control_points(&curves, window, &ClassicalMds::default()).unwrap();
    assert_eq!(ctrl.len(), 6);
    assert!(ctrl.iter().all(|p| p.len() == 2));
}

#[test]
fn test_window_validation() {
    let t = 10;
    for (start, end, step) in [(0, 1, 1), (5, 3, 1), (4, 4, 1), (0, 5, 0), (0, 4, 4), (0, 11, 1)] {
        assert!(
            matches!(
                TimeWindow::new(start, end, step).validate(t),
                Err(LampError::InvalidRange(_))
            ),
            "window ({}, {}, {}) should be rejected",
            start,
            end,
            step
        );
    }
    assert!(TimeWindow::new(0, 2, 1).validate(t).is_ok());
    assert!(TimeWindow::full(t).validate(t).is_ok());

    let w = TimeWindow::new(3, 8, 2);
    assert_eq!(w.len(), 5);
    assert_eq!(w.path_len(), 4);
    assert_eq!(w.timestep_of(0), 4);
    assert_eq!(w.timestep_of(3), 7);
}

#[test]
fn test_identical_curves_project_to_one_point() {
    init();
    let curves = CurveMatrix::new(vec![vec![3.0, 1.0, 4.0, 1.0, 5.0]; 3]).unwrap();
    let proj = compute_projection(
        &curves,
        TimeWindow::full(5),
        &ClassicalMds::default(),
        &Lamp::default(),
    )
    .unwrap();

    for k in 0..proj.nframes() {
        let frame = proj.frame(k).unwrap();
        for p in frame {
            assert!(p[0].is_finite() && p[1].is_finite());
            assert_relative_eq!(p[0], frame[0][0], epsilon = 1e-9);
            assert_relative_eq!(p[1], frame[0][1], epsilon = 1e-9);
        }
    }
}

#[test]
fn test_engine_requires_curves_for_range() {
    let mut eng = engine();
    assert!(matches!(
        eng.set_timestep_range(0, 5, 1),
        Err(LampError::InvalidState(_))
    ));
    assert!(eng.projected_curves().is_empty());
}

#[test]
fn test_engine_invalid_range_keeps_state() {
    init();
    let mut eng = engine();
    eng.set_curves(Arc::new(fan_of_lines())).unwrap();
    assert_eq!(eng.window(), Some(TimeWindow::full(10)));

    assert!(matches!(
        eng.set_timestep_range(0, 1, 1),
        Err(LampError::InvalidRange(_))
    ));
    assert_eq!(eng.window(), Some(TimeWindow::full(10)));
    assert_eq!(eng.projected_curves()[0].len(), 9);

    eng.set_timestep_range(2, 8, 2).unwrap();
    assert_eq!(eng.projected_curves()[0].len(), 5);
    assert_eq!(eng.control_points().map(|c| c.len()), Some(5));
}

#[test]
fn test_narrow_controls_are_zero_padded() {
    init();
    let data = random_ensemble(5, 8, SEED);
    let ctrl_orig = random_ensemble(5, 3, SEED + 7).to_rows();
    let ctrl_proj = fixed_layout(5);
    let lamp = Lamp::default();
    let (start, end) = (1, 8);

    let frames = time_lapse_lamp(&data, &ctrl_orig, &ctrl_proj, start, end, &lamp).unwrap();
    assert_eq!(frames.len(), end - start - 1);

    for (k, frame) in frames.iter().enumerate() {
        let t = start + 2 + k;
        let slice = data.slice_columns(start, t, 1);
        let width = t - start;
        let expected = if width < 3 {
            lamp.project(&padded(&slice, 3), &ctrl_orig, &ctrl_proj).unwrap()
        } else {
            lamp.project(&slice, &padded(&ctrl_orig, width), &ctrl_proj).unwrap()
        };
        for (got, want) in frame.iter().zip(&expected) {
            assert_relative_eq!(got[0], want[0], epsilon = 1e-12);
            assert_relative_eq!(got[1], want[1], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_wide_controls_pad_every_slice() {
    let data = random_ensemble(6, 10, SEED + 1);
    let ctrl_orig = random_ensemble(6, 14, SEED + 2).to_rows();
    let ctrl_proj = fixed_layout(6);
    let lamp = Lamp::default();

    let frames = time_lapse_lamp(&data, &ctrl_orig, &ctrl_proj, 0, 10, &lamp).unwrap();
    assert_eq!(frames.len(), 9);

    for (k, frame) in frames.iter().enumerate() {
        let slice = data.slice_columns(0, k + 2, 1);
        let expected = lamp
            .project(&padded(&slice, 14), &ctrl_orig, &ctrl_proj)
            .unwrap();
        assert_eq!(frame.len(), 6);
        for (got, want) in frame.iter().zip(&expected) {
            assert_relative_eq!(got[0], want[0], epsilon = 1e-12);
            assert_relative_eq!(got[1], want[1], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_window_fit_or_full() {
    let w = TimeWindow::new(2, 9, 3);
    assert_eq!(TimeWindow::fit_or_full(Some(w), 9), w);
    assert_eq!(TimeWindow::fit_or_full(Some(w), 8), TimeWindow::full(8));
    assert_eq!(TimeWindow::fit_or_full(None, 5), TimeWindow::full(5));
}

#[test]
fn test_engine_window_reset_on_shorter_curves() {
    let mut eng = engine();
    eng.set_curves(Arc::new(random_ensemble(5, 20, SEED))).unwrap();
    eng.set_timestep_range(5, 18, 1).unwrap();

    // still fits
    eng.set_curves(Arc::new(random_ensemble(5, 19, SEED))).unwrap();
    assert_eq!(eng.window(), Some(TimeWindow::new(5, 18, 1)));

    // does not fit any more
    eng.set_curves(Arc::new(random_ensemble(5, 12, SEED))).unwrap();
    assert_eq!(eng.window(), Some(TimeWindow::full(12)));
}

#[test]
fn test_engine_rejects_too_few_curves() {
    let mut eng = engine();
    let two = CurveMatrix::new(vec![vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap();
    assert!(matches!(
        eng.set_curves(Arc::new(two)),
        Err(LampError::InsufficientData { required: 3, found: 2 })
    ));
    assert!(eng.curves().is_none());
}

#[test]
fn test_nearest_point_and_visibility() {
    init();
    let mut eng = engine();
    eng.set_curves(Arc::new(random_ensemble(6, 10, SEED + 2))).unwrap();

    let target = eng.projected_curves()[3].get(4).unwrap();
    let picked = eng.nearest_point(target[0], target[1]).unwrap();
    debug!("picked {:?}", picked);
    assert_eq!(picked.curve, 3);
    assert_eq!(picked.path_index, 4);
    assert_eq!(picked.timestep, 5);
    assert_relative_eq!(picked.distance, 0.0);

    eng.set_curve_visible(3, false).unwrap();
    assert!(!eng.is_curve_visible(3).unwrap());
    let other = eng.nearest_point(target[0], target[1]).unwrap();
    assert_ne!(other.curve, 3);

    assert!(eng.set_curve_visible(6, false).is_err());

    // replacing the curves makes everything visible again
    eng.set_curves(Arc::new(random_ensemble(6, 10, SEED + 3))).unwrap();
    assert!(eng.is_curve_visible(3).unwrap());
}

#[test]
fn test_nearest_point_all_hidden() {
    let curves = fan_of_lines();
    let proj = compute_projection(
        &curves,
        TimeWindow::full(10),
        &ClassicalMds::default(),
        &Lamp::default(),
    )
    .unwrap();
    let hidden: BTreeSet<usize> = (0..5).collect();
    assert!(proj.nearest_point(0.0, 0.0, &hidden).is_none());
}

#[test]
fn test_variance_and_styling_maps() {
    let curves = fan_of_lines();
    let var = timestep_variance(&curves);
    assert_eq!(var.len(), 10);
    assert_relative_eq!(var[0], 0.0);
    assert_relative_eq!(var[9], 1.0);
    assert!(var.windows(2).all(|w| w[0] <= w[1]));

    let window = TimeWindow::full(10);
    assert_eq!(SaturationMap::Constant.values(window, &var), vec![1.0; 9]);

    let inc = SaturationMap::LinearIncreasing.values(window, &var);
    assert_relative_eq!(inc[0], 0.01);
    assert_relative_eq!(inc[8], 0.95);

    let by_var = SaturationMap::Variance.values(window, &var);
    assert_eq!(by_var.len(), 9);
    assert_relative_eq!(by_var[8], 0.0);

    let sizes = GlyphSizeMap::LinearDecreasing.sizes(9, (1.0, 10.0));
    assert_relative_eq!(sizes[0], 10.0);
    assert_relative_eq!(sizes[8], 1.0);
}

#[test]
fn test_constant_variance_maps_to_zero() {
    let curves = CurveMatrix::new(vec![vec![1.0, 2.0, 3.0], vec![2.0, 3.0, 4.0]]).unwrap();
    assert_eq!(timestep_variance(&curves), vec![0.0; 3]);
}
