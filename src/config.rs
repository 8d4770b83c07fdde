//! Tunable behavior for the whole engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on `HeatmapConfig::grid_size`; both grids hold `grid_size^2` cells.
pub const MAX_GRID_SIZE: usize = 4096;

/// How the tracker resolves competition between tracks for the same element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Tracks claim elements one after another, in track order.
    #[default]
    Greedy,
    /// All eligible pairs of a frame are ranked together before any is accepted.
    /// Links can differ from `Greedy` when two tracks want the same element.
    GlobalAssignment,
}

/// Parameters of the density/ratio strategy of the region identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Cells per side of both density grids.
    pub grid_size: usize,
    /// Standard deviation of the smoothing kernel, in cells. Zero disables smoothing.
    pub sigma: f64,
    /// Cells whose combined density is at or below this value are ignored.
    pub noise_floor: f64,
    /// A cell is dynamic when `dynamic / (dynamic + static)` exceeds this.
    pub ratio_threshold: f64,
    /// Components (and the mask as a whole) smaller than this share of the grid are dropped.
    pub min_component_fraction: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            grid_size: 100,
            sigma: 2.0,
            noise_floor: 0.05,
            ratio_threshold: 0.5,
            min_component_fraction: 0.01,
        }
    }
}

/// Configuration for the `RegionPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum embedding dot product for two occurrences to be the same element.
    pub similarity_threshold: f64,
    /// Maximum distance between normalized bbox centers for a match.
    pub proximity_threshold: f64,
    /// Share of valid frames a track must appear in to be classified at all.
    pub persistence_fraction: f64,
    /// Content variation at or above this makes a persistent track dynamic.
    pub dynamic_threshold: f64,
    /// Elements narrower or shorter than this (in pixels, after clamping) are skipped.
    pub min_element_px: f64,
    /// Tolerance used when deciding whether a raw bbox is normalized or in pixels.
    pub normalized_epsilon: f64,
    pub match_strategy: MatchStrategy,
    pub heatmap: HeatmapConfig,
    /// Fallback rectangles at or below this normalized area are dropped.
    pub fallback_min_area: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            proximity_threshold: 0.1,
            persistence_fraction: 0.5,
            dynamic_threshold: 0.3,
            min_element_px: 5.0,
            normalized_epsilon: 1e-6,
            match_strategy: MatchStrategy::Greedy,
            heatmap: HeatmapConfig::default(),
            fallback_min_area: 1e-5,
        }
    }
}

impl PipelineConfig {
    /// Fewer, more confident links: near-identical embeddings that barely moved.
    pub fn strict() -> Self {
        Self {
            similarity_threshold: 0.95,
            proximity_threshold: 0.05,
            persistence_fraction: 0.6,
            ..Self::default()
        }
    }

    /// Tolerates re-rendered elements and scroll jitter.
    pub fn lenient() -> Self {
        Self {
            similarity_threshold: 0.8,
            proximity_threshold: 0.2,
            persistence_fraction: 0.4,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Rejects values the stages cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("similarity_threshold", self.similarity_threshold, -1.0, 1.0)?;
        check_range("proximity_threshold", self.proximity_threshold, 0.0, 2.0)?;
        check_range("persistence_fraction", self.persistence_fraction, 0.0, 1.0)?;
        check_range("dynamic_threshold", self.dynamic_threshold, 0.0, 1.0)?;
        check_range("min_element_px", self.min_element_px, 0.0, f64::MAX)?;
        check_range("normalized_epsilon", self.normalized_epsilon, 0.0, 1.0)?;
        check_range("fallback_min_area", self.fallback_min_area, 0.0, 1.0)?;

        let heatmap = &self.heatmap;
        if heatmap.grid_size == 0 || heatmap.grid_size > MAX_GRID_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "heatmap.grid_size",
                message: format!("{} is outside [1, {MAX_GRID_SIZE}]", heatmap.grid_size),
            });
        }
        // Bounds the smoothing kernel to a few grid widths.
        check_range("heatmap.sigma", heatmap.sigma, 0.0, heatmap.grid_size as f64)?;
        check_range("heatmap.noise_floor", heatmap.noise_floor, 0.0, 2.0)?;
        check_range("heatmap.ratio_threshold", heatmap.ratio_threshold, 0.0, 1.0)?;
        check_range(
            "heatmap.min_component_fraction",
            heatmap.min_component_fraction,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field,
            message: format!("{value} is outside [{min}, {max}]"),
        });
    }
    Ok(())
}
