//! Job configuration
//!
//! One `PlotConfig` is passed per `optimize()` call; the engine owns no
//! persisted state. The core reads `pen_width`, `visibility_threshold`,
//! `max_iterations` and `merge_threshold`; the remaining options are
//! recognized and carried for the G-code emission layer, which is an
//! external collaborator.

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, Result};

/// Configuration record for a single optimization job.
///
/// Deserializes from a JSON object with every field optional; unknown
/// shapes fail loudly rather than being silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Ink footprint width in mm used by the overlap filter. `0` disables
    /// the filter entirely.
    pub pen_width: f64,

    /// Minimum percentage (0-100) of a path's footprint that must remain
    /// un-inked for it to survive the filter.
    pub visibility_threshold: f64,

    /// Cap on 2-opt improvement passes.
    pub max_iterations: i64,

    /// Endpoint-coincidence tolerance in mm. Paths shorter than this are
    /// treated as points by the filter.
    pub merge_threshold: f64,

    // Options below are consumed by the emission/ingest layer, not the
    // core. They ride along so one config record covers the whole job.
    pub curve_tolerance: f64,
    pub feedrate: f64,
    pub travel_speed: f64,
    pub z_up: f64,
    pub z_down: f64,
    pub z_speed: f64,
    pub gcode_header: String,
    pub gcode_footer: String,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            pen_width: 0.0,
            visibility_threshold: 50.0,
            max_iterations: 1000,
            merge_threshold: 0.1,
            curve_tolerance: 0.1,
            feedrate: 1000.0,
            travel_speed: 3000.0,
            z_up: 5.0,
            z_down: 0.0,
            z_speed: 500.0,
            gcode_header: String::new(),
            gcode_footer: String::new(),
        }
    }
}

impl PlotConfig {
    /// Range-check the options the core consumes. Fatal at ingress; the
    /// pipeline never starts with an out-of-range config.
    pub fn validate(&self) -> Result<()> {
        if !self.pen_width.is_finite() || self.pen_width < 0.0 {
            return Err(OptimizeError::ConfigRange(format!(
                "pen_width must be a finite value >= 0, got {}",
                self.pen_width
            )));
        }
        if !self.visibility_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.visibility_threshold)
        {
            return Err(OptimizeError::ConfigRange(format!(
                "visibility_threshold must be in [0, 100], got {}",
                self.visibility_threshold
            )));
        }
        if self.max_iterations < 0 {
            return Err(OptimizeError::ConfigRange(format!(
                "max_iterations must be >= 0, got {}",
                self.max_iterations
            )));
        }
        if !self.merge_threshold.is_finite() || self.merge_threshold < 0.0 {
            return Err(OptimizeError::ConfigRange(format!(
                "merge_threshold must be a finite value >= 0, got {}",
                self.merge_threshold
            )));
        }
        Ok(())
    }

    /// Whether the overlap filter does any geometric work for this config
    pub fn filter_enabled(&self) -> bool {
        self.pen_width > 0.0 && self.visibility_threshold < 100.0
    }
}
