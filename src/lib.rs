//! # lampview
//!
//! Time-lapse projection and linked ranking views for ensembles of time
//! series.
//!
//! - `timelapse`: classical MDS lays out control points, LAMP projects every
//!   curve as more timesteps are revealed, giving one 2-D path per curve.
//! - `rank`: bump chart ranks and distance chart values relative to a
//!   baseline curve.
//! - `selection`: highlighted/reference/baseline state shared by every view,
//!   with brushing & linking callbacks.
//! - `session`: ties the above together over immutable snapshots, with
//!   synchronous and rayon-backed asynchronous recomputes.
//!
//! ```
//! use lampview::builder::SessionBuilder;
//! use lampview::core::CurveMatrix;
//!
//! let curves = CurveMatrix::new(vec![
//!     vec![0.0, 1.0, 2.0, 3.0],
//!     vec![0.0, 1.5, 2.5, 3.5],
//!     vec![1.0, 0.5, 0.0, -0.5],
//!     vec![2.0, 2.0, 2.0, 2.0],
//! ]).unwrap();
//!
//! let session = SessionBuilder::new().build().unwrap();
//! session.set_curves(curves).unwrap();
//! session.set_baseline(0).unwrap();
//!
//! assert_eq!(session.projected_curves().len(), 4);
//! assert!(session.rank_matrix().is_some());
//! ```

pub mod builder;
pub mod core;
pub mod distance;
pub mod errors;
pub mod lamp;
pub mod mds;
pub mod percentiles;
pub mod rank;
pub mod selection;
pub mod session;
pub mod timelapse;

#[cfg(test)]
mod tests;
