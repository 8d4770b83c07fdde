// The stages of the engine, bottom-up: geometry, ingestion, tracking,
// classification, region finding and rule selection.

pub mod embedder;
pub mod frame_element;
pub mod heatmap;
pub mod persistence;
pub mod region;
pub mod region_identifier;
pub mod rule_selector;
pub mod tracker;
