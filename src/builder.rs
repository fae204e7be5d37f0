use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::errors::{LampError, Result};
use crate::lamp::LAMP_DEFAULT_TOLERANCE;
use crate::mds::MdsParams;
use crate::percentiles::REFERENCE_PERCENTILES;
use crate::session::Session;
use crate::timelapse::{GlyphSizeMap, SaturationMap};

use log::{debug, info};

/// Everything a `Session` needs to know up front.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub metric: DistanceMetric,
    pub mds: MdsParams,
    pub lamp_tolerance: f64,

    // Ranking
    pub rank_window: Option<usize>,
    pub rank_inverted: bool,
    pub log_scale_distances: bool,

    // Percentile curves appended as references on `set_curves`
    pub percentile_references: bool,
    pub reference_percentiles: Vec<f64>,

    // Path styling
    pub saturation: SaturationMap,
    pub glyph_size: GlyphSizeMap,
    pub glyph_limits: (f64, f64),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            mds: MdsParams::default(),
            lamp_tolerance: LAMP_DEFAULT_TOLERANCE,
            rank_window: None,
            rank_inverted: false,
            log_scale_distances: false,
            percentile_references: false,
            reference_percentiles: REFERENCE_PERCENTILES.to_vec(),
            saturation: SaturationMap::Constant,
            glyph_size: GlyphSizeMap::LinearIncreasing,
            glyph_limits: (1.0, 10.0),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.lamp_tolerance > 0.0) {
            return Err(LampError::InvalidArgument(format!(
                "LAMP tolerance must be positive, got {}",
                self.lamp_tolerance
            )));
        }
        if !(self.mds.tolerance > 0.0) || self.mds.max_iter == 0 {
            return Err(LampError::InvalidArgument(format!(
                "invalid MDS parameters {:?}",
                self.mds
            )));
        }
        if self.rank_window == Some(0) {
            return Err(LampError::InvalidArgument(
                "rank window must be at least 1".to_string(),
            ));
        }
        if let Some(q) = self
            .reference_percentiles
            .iter()
            .find(|q| !(0.0..=100.0).contains(*q))
        {
            return Err(LampError::InvalidArgument(format!(
                "percentile {} outside [0, 100]",
                q
            )));
        }
        let (lo, hi) = self.glyph_limits;
        if !(lo > 0.0 && lo <= hi) {
            return Err(LampError::InvalidArgument(format!(
                "glyph limits ({}, {}) must satisfy 0 < min <= max",
                lo, hi
            )));
        }
        Ok(())
    }
}

/// Fluent construction of a `Session`.
#[derive(Clone, Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        info!("Initializing new SessionBuilder");
        Self::default()
    }

    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    // -------------------- Projection --------------------

    /// Metric for ranks and distance values. The projection itself always
    /// works in Euclidean space.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        info!("Setting distance metric: {:?}", metric);
        self.config.metric = metric;
        self
    }

    pub fn with_mds_params(mut self, params: MdsParams) -> Self {
        info!("Configuring MDS: {:?}", params);
        self.config.mds = params;
        self
    }

    pub fn with_lamp_tolerance(mut self, tolerance: f64) -> Self {
        info!("Setting LAMP tolerance: {}", tolerance);
        self.config.lamp_tolerance = tolerance;
        self
    }

    // -------------------- Ranking --------------------

    /// Compare only the trailing `window` samples instead of the whole prefix.
    pub fn with_rank_window(mut self, window: Option<usize>) -> Self {
        info!("Setting rank window: {:?}", window);
        self.config.rank_window = window;
        self
    }

    pub fn with_inverted_ranks(mut self, inverted: bool) -> Self {
        info!("Setting inverted ranks: {}", inverted);
        self.config.rank_inverted = inverted;
        self
    }

    pub fn with_log_scale_distances(mut self, log_scale: bool) -> Self {
        self.config.log_scale_distances = log_scale;
        self
    }

    // -------------------- References --------------------

    /// Append the `qs` percentile curves on every `set_curves` and mark them
    /// as references.
    pub fn with_percentile_references(mut self, enabled: bool, qs: Option<Vec<f64>>) -> Self {
        info!("Setting percentile references: {} ({:?})", enabled, qs);
        self.config.percentile_references = enabled;
        if let Some(qs) = qs {
            self.config.reference_percentiles = qs;
        }
        self
    }

    // -------------------- Styling --------------------

    pub fn with_saturation(mut self, map: SaturationMap) -> Self {
        self.config.saturation = map;
        self
    }

    pub fn with_glyph_size(mut self, map: GlyphSizeMap, limits: (f64, f64)) -> Self {
        self.config.glyph_size = map;
        self.config.glyph_limits = limits;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -------------------- Build --------------------

    /// Validates the configuration and returns an empty session.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        debug!("Build configuration: {:?}", self.config);
        Ok(Session::new(self.config))
    }
}
