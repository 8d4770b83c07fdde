// THEORY:
// The engine never looks at pixels to decide what an element *is*. That judgement
// belongs to an external embedding provider, which turns an image patch into a
// fixed-length vector. Two occurrences of the same element should produce vectors
// whose dot product is close to 1.
//
// This module is the seam to that provider. `Embedder` is the only thing the builder
// knows about it; a real deployment plugs in a model-backed implementation. The
// `HistogramEmbedder` shipped here is a deliberately simple stand-in (a per-channel
// intensity histogram) for demos, the runner binary and tests. It is not a perception
// model and makes no claim to tell visually similar elements apart.

use crate::error::EmbedError;
use image::DynamicImage;

/// An embedding provider. Called once per surviving element per frame.
///
/// Implementations should return a unit-norm vector of the same length for every patch.
/// The builder re-normalizes whatever comes back and rejects empty or non-finite vectors.
/// A panic inside `embed` drops the whole frame, in both pipelines.
pub trait Embedder: Send + Sync {
    fn embed(&self, patch: &DynamicImage) -> Result<Vec<f32>, EmbedError>;
}

/// Normalized RGB intensity histogram of a patch.
#[derive(Debug, Clone)]
pub struct HistogramEmbedder {
    bins: usize,
}

impl HistogramEmbedder {
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.clamp(1, 256),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.bins * 3
    }
}

impl Default for HistogramEmbedder {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Embedder for HistogramEmbedder {
    fn embed(&self, patch: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
        let rgb = patch.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(EmbedError::Rejected("empty patch".to_string()));
        }

        let mut histogram = vec![0f64; self.dimensions()];
        for pixel in rgb.pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                let bin = (*value as usize * self.bins) / 256;
                histogram[channel * self.bins + bin] += 1.0;
            }
        }

        let norm = histogram.iter().map(|v| v * v).sum::<f64>().sqrt();
        Ok(histogram.into_iter().map(|v| (v / norm) as f32).collect())
    }
}
