//! Error types for every layer of the engine.
//!
//! None of these cross the public `analyze` boundary: ingestion errors skip an element or
//! a frame, and stage errors degrade the call to the all-null selection.

use thiserror::Error;

/// Failure reported by an embedding provider for a single patch.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("patch rejected: {0}")]
    Rejected(String),

    #[error("embedding backend failure: {0}")]
    Backend(String),
}

/// Ingestion failure. Element-scoped variants skip one element, frame-scoped ones skip the frame.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to open frame image {path}: {source}")]
    ImageOpen {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("frame image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("element {id}: bbox contains non-finite values")]
    NonFiniteBox { id: i64 },

    #[error("element {id}: box is degenerate after clamping")]
    Degenerate { id: i64 },

    #[error("element {id}: {width:.1}x{height:.1}px is below the {min_px}px minimum")]
    TooSmall {
        id: i64,
        width: f64,
        height: f64,
        min_px: f64,
    },

    #[error("element {id}: embedding failed: {source}")]
    Embedding {
        id: i64,
        #[source]
        source: EmbedError,
    },

    #[error("element {id}: embedding is empty, zero-norm or non-finite")]
    InvalidEmbedding { id: i64 },
}

impl BuildError {
    /// True when the whole frame has to be dropped rather than a single element.
    pub fn is_frame_level(&self) -> bool {
        matches!(self, BuildError::ImageOpen { .. } | BuildError::EmptyImage { .. })
    }
}

/// Failure inside tracking, classification, region identification or rule selection.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("track {track_id}: frame {frame_index} is not after its latest occurrence")]
    OutOfOrder { track_id: u64, frame_index: usize },
}

/// Configuration and manifest loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}
