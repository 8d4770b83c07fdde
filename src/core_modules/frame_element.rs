// THEORY:
// The `frame_element` module is the ingestion layer. It bridges the gap between the
// raw output of an external vision parser (boxes in whatever unit the parser liked,
// plus some text) and the clean, comparable records the rest of the engine works on.
//
// Key architectural principles:
// 1.  **Normalization**: Raw boxes arrive either as fractions of the frame or as
//     absolute pixels. A box whose four values are all `<= 1 + epsilon` is taken as
//     normalized. Everything leaving this module is normalized.
// 2.  **Local Failure**: A bad element (tiny, degenerate, or one the embedder chokes
//     on) is skipped and logged; its neighbours are unaffected. A frame whose image
//     cannot be opened is skipped as a whole and does not count as a valid frame.
// 3.  **Data Container**: `FrameElement` is a "dumb", immutable snapshot of one
//     element in one frame. It knows how to compare itself to another element
//     (embedding similarity and center distance) and nothing more.
// 4.  **Stable Order**: Surviving elements are emitted sorted by their parser id, so
//     the tracker sees the same order no matter how the work was scheduled.

use crate::config::PipelineConfig;
use crate::core_modules::embedder::Embedder;
use crate::core_modules::region::BoundingBox;
use crate::error::{BuildError, RegionError};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One element exactly as the vision parser reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    /// Unique within its frame, not across frames.
    pub id: i64,
    /// `[x1, y1, x2, y2]`, normalized or in pixels.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub content: Option<String>,
    /// Parser tags, carried along but never interpreted.
    #[serde(default, rename = "type")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RawElement {
    pub fn new(id: i64, bbox: [f64; 4], content: Option<&str>) -> Self {
        Self {
            id,
            bbox,
            content: content.map(str::to_string),
            element_type: None,
            source: None,
        }
    }
}

/// Where a frame's pixels come from.
#[derive(Debug, Clone)]
pub enum FrameSource {
    Path(PathBuf),
    Image(Arc<DynamicImage>),
}

/// One captured frame: its image plus the parser's element list.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub source: FrameSource,
    pub elements: Vec<RawElement>,
}

impl FrameInput {
    pub fn from_path(path: impl Into<PathBuf>, elements: Vec<RawElement>) -> Self {
        Self {
            source: FrameSource::Path(path.into()),
            elements,
        }
    }

    pub fn from_image(image: DynamicImage, elements: Vec<RawElement>) -> Self {
        Self {
            source: FrameSource::Image(Arc::new(image)),
            elements,
        }
    }
}

/// A normalized, embedded element observed in a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameElement {
    /// Position of the frame in the input sequence.
    pub frame_index: usize,
    /// The parser's id, unique within the frame.
    pub element_id: i64,
    pub bbox: BoundingBox,
    pub content: Option<String>,
    /// Unit-norm embedding of the element's patch.
    pub embedding: Vec<f32>,
}

impl FrameElement {
    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }

    /// The content string, if there is a non-empty one.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    /// Dot product of the two unit embeddings.
    pub fn similarity(&self, other: &FrameElement) -> Result<f64, RegionError> {
        if self.embedding.len() != other.embedding.len() {
            return Err(RegionError::DimensionMismatch {
                left: self.embedding.len(),
                right: other.embedding.len(),
            });
        }
        Ok(self
            .embedding
            .iter()
            .zip(&other.embedding)
            .map(|(a, b)| *a as f64 * *b as f64)
            .sum())
    }

    pub fn center_distance(&self, other: &FrameElement) -> f64 {
        self.bbox.center_distance(&other.bbox)
    }
}

/// Turns raw frames into `FrameElement` lists.
#[derive(Clone)]
pub struct ElementBuilder {
    embedder: Arc<dyn Embedder>,
    min_element_px: f64,
    normalized_epsilon: f64,
}

impl ElementBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            min_element_px: config.min_element_px,
            normalized_epsilon: config.normalized_epsilon,
        }
    }

    /// Opens the frame's image. Any error here means the frame is skipped.
    pub fn load_image(source: &FrameSource) -> Result<Arc<DynamicImage>, BuildError> {
        let image = match source {
            FrameSource::Image(image) => Arc::clone(image),
            FrameSource::Path(path) => {
                let image = image::open(path).map_err(|source| BuildError::ImageOpen {
                    path: path.display().to_string(),
                    source,
                })?;
                Arc::new(image)
            }
        };
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BuildError::EmptyImage { width, height });
        }
        Ok(image)
    }

    /// Builds every element of one frame. `Err` only for frame-level failures.
    pub fn build_frame(
        &self,
        frame_index: usize,
        frame: &FrameInput,
    ) -> Result<Vec<FrameElement>, BuildError> {
        let image = Self::load_image(&frame.source)?;

        let mut elements = Vec::with_capacity(frame.elements.len());
        for raw in &frame.elements {
            match self.build_element(frame_index, &image, raw) {
                Ok(element) => elements.push(element),
                Err(err) => warn!(frame_index, element_id = raw.id, error = %err, "skipping element"),
            }
        }
        elements.sort_by_key(|element| element.element_id);

        debug!(
            frame_index,
            raw = frame.elements.len(),
            kept = elements.len(),
            "built frame elements"
        );
        Ok(elements)
    }

    /// Normalizes, crops and embeds a single element.
    pub fn build_element(
        &self,
        frame_index: usize,
        image: &DynamicImage,
        raw: &RawElement,
    ) -> Result<FrameElement, BuildError> {
        let (width, height) = image.dimensions();
        let (w, h) = (width as f64, height as f64);

        if raw.bbox.iter().any(|v| !v.is_finite()) {
            return Err(BuildError::NonFiniteBox { id: raw.id });
        }

        // --- 1. Absolute pixel box, clamped to the image ---
        let normalized = raw.bbox.iter().all(|v| *v <= 1.0 + self.normalized_epsilon);
        let [x1, y1, x2, y2] = if normalized {
            [raw.bbox[0] * w, raw.bbox[1] * h, raw.bbox[2] * w, raw.bbox[3] * h]
        } else {
            raw.bbox
        };
        let (x1, x2) = (x1.clamp(0.0, w), x2.clamp(0.0, w));
        let (y1, y2) = (y1.clamp(0.0, h), y2.clamp(0.0, h));

        let box_width = x2 - x1;
        let box_height = y2 - y1;
        if box_width <= 0.0 || box_height <= 0.0 {
            return Err(BuildError::Degenerate { id: raw.id });
        }
        if box_width < self.min_element_px || box_height < self.min_element_px {
            return Err(BuildError::TooSmall {
                id: raw.id,
                width: box_width,
                height: box_height,
                min_px: self.min_element_px,
            });
        }

        // --- 2. Crop and embed ---
        let left = x1.floor() as u32;
        let top = y1.floor() as u32;
        let right = (x2.ceil() as u32).min(width);
        let bottom = (y2.ceil() as u32).min(height);
        if right <= left || bottom <= top {
            return Err(BuildError::Degenerate { id: raw.id });
        }
        let patch = image.crop_imm(left, top, right - left, bottom - top);

        let embedding = self
            .embedder
            .embed(&patch)
            .map_err(|source| BuildError::Embedding { id: raw.id, source })?;
        let embedding =
            unit_normalize(embedding).ok_or(BuildError::InvalidEmbedding { id: raw.id })?;

        Ok(FrameElement {
            frame_index,
            element_id: raw.id,
            bbox: BoundingBox::new(x1 / w, y1 / h, x2 / w, y2 / h),
            content: raw.content.clone(),
            embedding,
        })
    }
}

/// Scales a vector to unit length. `None` for empty, zero or non-finite input.
pub fn unit_normalize(vector: Vec<f32>) -> Option<Vec<f32>> {
    if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let norm = vector.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return None;
    }
    Some(vector.into_iter().map(|v| (v as f64 / norm) as f32).collect())
}
