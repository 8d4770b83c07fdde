// THEORY:
// The `pipeline` module is the top-level API for the entire engine. It wires the
// layers together in their fixed order and owns the error policy at the boundary:
//
//   Stage 1: Ingestion          raw frames      -> FrameElement lists (per frame)
//   Stage 2: Tracking           element lists   -> ElementTracks
//   Stage 3: Classification     tracks          -> Static / Dynamic populations
//   Stage 4: Region Finding     populations     -> candidate DynamicRegions
//   Stage 5: Rule Selection     candidates      -> SelectionResult
//
// "No detection" is always expressed as nulls. Fewer than two valid frames, or any
// failure inside stages 2-5, produces the all-null `SelectionResult` and a log line;
// nothing is ever returned to the caller as an error. A caller iterating over many
// sequences is never aborted by one malformed run.
//
// A `RegionPipeline` holds only configuration and the embedder handle. Each call is
// independent, so one pipeline can serve concurrent callers.

use crate::config::PipelineConfig;
use crate::core_modules::embedder::Embedder;
use crate::core_modules::frame_element::{ElementBuilder, FrameElement, FrameInput};
use crate::core_modules::persistence::PersistenceClassifier;
use crate::core_modules::region::DynamicRegion;
use crate::core_modules::region_identifier::{RegionIdentifier, RegionStrategy};
use crate::core_modules::rule_selector::{self, SelectionResult};
use crate::core_modules::tracker::Tracker;
use crate::error::{ConfigError, RegionError};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MIN_VALID_FRAMES: usize = 2;

/// Everything a caller might want to know about one run, beyond the selection itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReport {
    pub selection: SelectionResult,
    pub candidates: Vec<DynamicRegion>,
    /// `None` when the run never reached region finding.
    pub strategy: Option<RegionStrategy>,
    pub valid_frames: usize,
    pub skipped_frames: usize,
    pub track_count: usize,
    pub static_count: usize,
    pub dynamic_count: usize,
}

impl RegionReport {
    pub(crate) fn no_opinion(valid_frames: usize, skipped_frames: usize) -> Self {
        Self {
            selection: SelectionResult::empty(),
            candidates: Vec::new(),
            strategy: None,
            valid_frames,
            skipped_frames,
            track_count: 0,
            static_count: 0,
            dynamic_count: 0,
        }
    }
}

/// The valid frames of a sequence after ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestedFrames {
    pub frames: Vec<Vec<FrameElement>>,
    pub skipped: usize,
}

/// The main, top-level struct for the engine.
#[derive(Clone)]
pub struct RegionPipeline {
    config: PipelineConfig,
    builder: ElementBuilder,
}

impl RegionPipeline {
    pub fn new(config: PipelineConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ConfigError> {
        config.validate()?;
        let builder = ElementBuilder::new(embedder, &config);
        Ok(Self { config, builder })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn builder(&self) -> &ElementBuilder {
        &self.builder
    }

    /// Runs the whole engine and returns only the selection.
    pub fn analyze(&self, frames: &[FrameInput]) -> SelectionResult {
        self.analyze_detailed(frames).selection
    }

    /// Runs the whole engine and returns the selection with its diagnostics.
    pub fn analyze_detailed(&self, frames: &[FrameInput]) -> RegionReport {
        if frames.len() < MIN_VALID_FRAMES {
            debug!(frames = frames.len(), "sequence too short, skipping ingestion");
            return RegionReport::no_opinion(0, 0);
        }
        let ingested = self.ingest(frames);
        self.analyze_elements(ingested)
    }

    /// Stage 1. Frames that fail to load, or whose embedder panics, are counted and dropped.
    pub fn ingest(&self, frames: &[FrameInput]) -> IngestedFrames {
        let mut ingested = IngestedFrames::default();
        for (frame_index, frame) in frames.iter().enumerate() {
            let built = panic::catch_unwind(AssertUnwindSafe(|| self.builder.build_frame(frame_index, frame)));
            match built {
                Ok(Ok(elements)) => ingested.frames.push(elements),
                Ok(Err(err)) => {
                    warn!(frame_index, error = %err, "skipping frame");
                    ingested.skipped += 1;
                }
                Err(_) => {
                    warn!(frame_index, "frame builder panicked, skipping frame");
                    ingested.skipped += 1;
                }
            }
        }
        ingested
    }

    /// Stages 2-5 over already-built frames.
    pub fn analyze_elements(&self, ingested: IngestedFrames) -> RegionReport {
        let IngestedFrames { frames, skipped } = ingested;
        if frames.len() < MIN_VALID_FRAMES {
            info!(valid = frames.len(), skipped, "fewer than two valid frames, no opinion");
            return RegionReport::no_opinion(frames.len(), skipped);
        }

        match self.run_stages(&frames, skipped) {
            Ok(report) => {
                debug!(
                    valid = report.valid_frames,
                    tracks = report.track_count,
                    static_tracks = report.static_count,
                    dynamic_tracks = report.dynamic_count,
                    candidates = report.candidates.len(),
                    strategy = ?report.strategy,
                    "region analysis complete"
                );
                report
            }
            Err(err) => {
                warn!(error = %err, "region analysis failed, returning no opinion");
                RegionReport::no_opinion(frames.len(), skipped)
            }
        }
    }

    fn run_stages(&self, frames: &[Vec<FrameElement>], skipped: usize) -> Result<RegionReport, RegionError> {
        // Stage 2: Tracking
        let tracks = Tracker::track_frames(frames, &self.config)?;

        // Stage 3: Classification
        let classification = PersistenceClassifier::new(&self.config).classify(&tracks, frames.len());

        // Stage 4: Region Finding
        let (candidates, strategy) = RegionIdentifier::new(&self.config).identify(&classification)?;

        // Stage 5: Rule Selection
        let selection = rule_selector::select(&candidates, frames);

        Ok(RegionReport {
            selection,
            strategy: Some(strategy),
            valid_frames: frames.len(),
            skipped_frames: skipped,
            track_count: tracks.len(),
            static_count: classification.static_tracks.len(),
            dynamic_count: classification.dynamic_tracks.len(),
            candidates,
        })
    }
}

/// One-shot convenience over `RegionPipeline`. An invalid configuration is logged and
/// treated like any other failure: no opinion.
pub fn analyze_sequence(
    frames: &[FrameInput],
    embedder: Arc<dyn Embedder>,
    config: PipelineConfig,
) -> SelectionResult {
    match RegionPipeline::new(config, embedder) {
        Ok(pipeline) => pipeline.analyze(frames),
        Err(err) => {
            warn!(error = %err, "invalid pipeline configuration");
            SelectionResult::empty()
        }
    }
}
