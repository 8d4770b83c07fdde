// THEORY:
// This file is the main entry point for the `dynamo_vision` library crate. It defines
// the public API exposed to callers that hand over a sequence of screen captures and
// want to know where the changing content lives.
//
// The primary interface is `RegionPipeline` (or its async sibling `ParallelPipeline`)
// together with `PipelineConfig` and the `SelectionResult` it produces. The stage
// modules under `core_modules` stay public so each layer can be used and tested on
// its own, but a typical consumer never needs to touch them directly.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod manifest;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{HeatmapConfig, MatchStrategy, PipelineConfig};
pub use core_modules::embedder::{Embedder, HistogramEmbedder};
pub use core_modules::frame_element::{FrameElement, FrameInput, RawElement};
pub use core_modules::region::{BoundingBox, DynamicRegion};
pub use core_modules::rule_selector::{SelectionResult, SelectionRule};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{RegionPipeline, RegionReport, analyze_sequence};
