mod test_core;
mod test_rank;
mod test_timelapse;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::CurveMatrix;

pub const SEED: u64 = 42;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `n` random-walk curves of `t` samples, each with its own drift.
pub fn random_ensemble(n: usize, t: usize, seed: u64) -> CurveMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows = (0..n)
        .map(|_| {
            let drift: f64 = rng.random_range(-0.5..0.5);
            let mut level: f64 = rng.random_range(0.0..10.0);
            (0..t)
                .map(|_| {
                    level += drift + rng.random_range(-0.2..0.2);
                    level
                })
                .collect()
        })
        .collect();
    CurveMatrix::new(rows).unwrap()
}

/// Five straight lines `y = k·t`, k = 0..5, over ten timesteps.
pub fn fan_of_lines() -> CurveMatrix {
    let rows = (0..5)
        .map(|k| (0..10).map(|t| (k * t) as f64).collect())
        .collect();
    CurveMatrix::new(rows).unwrap()
}
