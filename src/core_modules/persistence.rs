// THEORY:
// The `persistence` module turns the tracker's raw narrative (a pile of closed
// tracks) into the two populations the region identifier needs: chrome that stays
// put and says the same thing, and content that stays put but keeps changing.
//
// Key architectural principles:
// 1.  **Persistence Gate**: A track has to show up in enough frames to mean anything.
//     `min_occurrences = max(2, ceil(valid_frames * persistence_fraction))`. Shorter
//     tracks are transient and are dropped before classification; they can never
//     influence where the dynamic region ends up.
// 2.  **Content Variation**: What changes is measured on text, not pixels. The
//     non-empty content strings of a track form a frequency distribution; its Shannon
//     entropy divided by `ln(distinct values)` lands in [0, 1]. One distinct value (or
//     none) is 0 by definition.
// 3.  **Binary Split**: Variation below `dynamic_threshold` is Static, anything else
//     is Dynamic.
//
// Icon-only elements never carry text, so they always score 0 and read as Static even
// when their pixels change. That is a known blind spot of a text-based measure.

use crate::config::PipelineConfig;
use crate::core_modules::tracker::ElementTrack;
use std::collections::BTreeMap;
use tracing::debug;

/// Which population a persistent track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackClass {
    Static,
    Dynamic,
}

/// The persistent tracks of one run, split by class.
#[derive(Debug, Clone, Default)]
pub struct Classification<'a> {
    pub static_tracks: Vec<&'a ElementTrack>,
    pub dynamic_tracks: Vec<&'a ElementTrack>,
    /// Tracks that fell under the persistence gate.
    pub discarded: usize,
    /// The gate that was applied.
    pub min_occurrences: usize,
}

/// `max(2, ceil(valid_frames * fraction))`.
pub fn min_occurrences(valid_frames: usize, persistence_fraction: f64) -> usize {
    let scaled = (valid_frames as f64 * persistence_fraction).ceil();
    (scaled.max(0.0) as usize).max(2)
}

/// Normalized Shannon entropy of a track's non-empty content strings, in `[0, 1]`.
pub fn content_variation(track: &ElementTrack) -> f64 {
    let mut frequencies: BTreeMap<&str, usize> = BTreeMap::new();
    for text in track.contents() {
        *frequencies.entry(text).or_default() += 1;
    }
    if frequencies.len() < 2 {
        return 0.0;
    }

    let total: usize = frequencies.values().sum();
    let entropy: f64 = frequencies
        .values()
        .map(|count| {
            let p = *count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    (entropy / (frequencies.len() as f64).ln()).clamp(0.0, 1.0)
}

pub struct PersistenceClassifier {
    persistence_fraction: f64,
    dynamic_threshold: f64,
}

impl PersistenceClassifier {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            persistence_fraction: config.persistence_fraction,
            dynamic_threshold: config.dynamic_threshold,
        }
    }

    pub fn class_of(&self, track: &ElementTrack) -> TrackClass {
        if content_variation(track) < self.dynamic_threshold {
            TrackClass::Static
        } else {
            TrackClass::Dynamic
        }
    }

    /// Splits `tracks` into Static and Dynamic, dropping transient ones.
    pub fn classify<'a>(&self, tracks: &'a [ElementTrack], valid_frames: usize) -> Classification<'a> {
        let gate = min_occurrences(valid_frames, self.persistence_fraction);
        let mut classification = Classification {
            min_occurrences: gate,
            ..Classification::default()
        };

        for track in tracks {
            if track.len() < gate {
                classification.discarded += 1;
                continue;
            }
            match self.class_of(track) {
                TrackClass::Static => classification.static_tracks.push(track),
                TrackClass::Dynamic => classification.dynamic_tracks.push(track),
            }
        }

        debug!(
            min_occurrences = gate,
            static_tracks = classification.static_tracks.len(),
            dynamic_tracks = classification.dynamic_tracks.len(),
            discarded = classification.discarded,
            "classified tracks"
        );
        classification
    }
}
