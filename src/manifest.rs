//! On-disk description of a capture sequence, as consumed by the runner binary.
//!
//! ```json
//! {
//!   "frames": [
//!     { "image": "frame_000.png", "elements": [ { "id": 3, "bbox": [0, 0, 1, 0.1], "content": "Inbox" } ] }
//!   ]
//! }
//! ```
//!
//! Relative image paths are resolved against the manifest's own directory.

use crate::core_modules::frame_element::{FrameInput, RawElement};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub image: PathBuf,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub frames: Vec<FrameEntry>,
}

impl Manifest {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a manifest and rebases its relative image paths onto its directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut manifest = Self::from_json_str(&raw)?;
        if let Some(base) = path.parent() {
            manifest.rebase(base);
        }
        Ok(manifest)
    }

    pub fn rebase(&mut self, base: &Path) {
        for frame in &mut self.frames {
            if frame.image.is_relative() {
                frame.image = base.join(&frame.image);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Path-backed frame inputs; images are opened lazily by the pipeline.
    pub fn into_inputs(self) -> Vec<FrameInput> {
        self.frames
            .into_iter()
            .map(|frame| FrameInput::from_path(frame.image, frame.elements))
            .collect()
    }
}
