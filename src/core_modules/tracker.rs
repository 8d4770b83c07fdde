// THEORY:
// The `tracker` module adds "object permanence" to the engine. The vision parser
// gives every element a fresh id in every frame, so identity has to be rebuilt from
// what the element looks like (its embedding) and where it is (its bbox center).
//
// This module solves the data association problem for UI elements.
//
// Key architectural principles:
// 1.  **Explicit State**: The `Tracker` owns two lists, `active` and `closed`. It is a
//     plain value: nothing global, so independent runs never interfere.
// 2.  **Gated Matching**: A current-frame element is a candidate for a track only if
//     the embedding similarity clears `similarity_threshold` AND the center distance
//     is within `proximity_threshold`. Distance is only computed once similarity has
//     passed. Among candidates the highest similarity wins.
// 3.  **Lifecycle Management**:
//     - **Birth**: Every element no track claimed opens a new track.
//     - **Tracking**: A matched element is appended and the track stays active.
//     - **Death**: A track that finds no match in a frame is closed for good; there
//       is no occlusion grace period.
// 4.  **Order Sensitivity**: Greedy matching processes tracks in order, so when two
//     tracks want the same element the earlier one gets it. `GlobalAssignment` ranks
//     all eligible pairs of a frame first, which removes that dependence and can
//     change which elements get linked.

use crate::config::{MatchStrategy, PipelineConfig};
use crate::core_modules::frame_element::FrameElement;
use crate::error::RegionError;
use tracing::debug;

/// A hypothesized identity for one UI element followed across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTrack {
    /// Unique within one tracking run.
    pub track_id: u64,
    /// Occurrences in strictly increasing frame order.
    pub occurrences: Vec<FrameElement>,
}

impl ElementTrack {
    fn new(track_id: u64, first: FrameElement) -> Self {
        Self {
            track_id,
            occurrences: vec![first],
        }
    }

    /// The most recent occurrence.
    pub fn latest(&self) -> &FrameElement {
        // A track is never created empty.
        &self.occurrences[self.occurrences.len() - 1]
    }

    fn extend(&mut self, element: FrameElement) -> Result<(), RegionError> {
        if element.frame_index <= self.latest().frame_index {
            return Err(RegionError::OutOfOrder {
                track_id: self.track_id,
                frame_index: element.frame_index,
            });
        }
        self.occurrences.push(element);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Non-empty content strings across occurrences, in frame order.
    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.occurrences.iter().filter_map(FrameElement::text)
    }
}

/// A pairing proposal between an active track and a current-frame element.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    track: usize,
    element: usize,
    similarity: f64,
    distance: f64,
}

/// Links `FrameElement`s of consecutive frames into `ElementTrack`s.
#[derive(Debug, Clone)]
pub struct Tracker {
    active: Vec<ElementTrack>,
    closed: Vec<ElementTrack>,
    next_id: u64,
    similarity_threshold: f64,
    proximity_threshold: f64,
    strategy: MatchStrategy,
}

impl Tracker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            active: Vec::new(),
            closed: Vec::new(),
            next_id: 0,
            similarity_threshold: config.similarity_threshold,
            proximity_threshold: config.proximity_threshold,
            strategy: config.match_strategy,
        }
    }

    /// Runs the tracker over every valid frame and returns all tracks, closed.
    pub fn track_frames(
        frames: &[Vec<FrameElement>],
        config: &PipelineConfig,
    ) -> Result<Vec<ElementTrack>, RegionError> {
        let mut tracker = Tracker::new(config);
        for elements in frames {
            tracker.update(elements.clone())?;
        }
        Ok(tracker.finish())
    }

    /// Feeds the next valid frame. On the first call every element opens a track.
    pub fn update(&mut self, elements: Vec<FrameElement>) -> Result<(), RegionError> {
        // --- 1. Matching ---
        let assignments = match self.strategy {
            MatchStrategy::Greedy => self.match_greedy(&elements)?,
            MatchStrategy::GlobalAssignment => self.match_global(&elements)?,
        };

        // --- 2. State Updating ---
        let mut slots: Vec<Option<FrameElement>> = elements.into_iter().map(Some).collect();
        let mut still_active = Vec::with_capacity(self.active.len());
        let mut newly_closed = 0usize;

        for (mut track, assignment) in self.active.drain(..).zip(assignments) {
            match assignment.and_then(|j| slots[j].take()) {
                Some(element) => {
                    track.extend(element)?;
                    still_active.push(track);
                }
                None => {
                    self.closed.push(track);
                    newly_closed += 1;
                }
            }
        }

        // --- 3. Births ---
        let mut born = 0usize;
        for element in slots.into_iter().flatten() {
            still_active.push(ElementTrack::new(self.next_id, element));
            self.next_id += 1;
            born += 1;
        }

        debug!(
            continued = still_active.len() - born,
            closed = newly_closed,
            born,
            "tracker updated"
        );
        self.active = still_active;
        Ok(())
    }

    /// Closes every remaining track and returns all of them, closed order first.
    pub fn finish(mut self) -> Vec<ElementTrack> {
        self.closed.append(&mut self.active);
        self.closed
    }

    pub fn active_tracks(&self) -> &[ElementTrack] {
        &self.active
    }

    pub fn closed_tracks(&self) -> &[ElementTrack] {
        &self.closed
    }

    /// Similarity and distance of `element` against `track`, if the pair is eligible.
    fn evaluate(
        &self,
        track: &ElementTrack,
        element: &FrameElement,
    ) -> Result<Option<(f64, f64)>, RegionError> {
        let latest = track.latest();
        let similarity = latest.similarity(element)?;
        // Written as negations so NaN never qualifies.
        if !(similarity >= self.similarity_threshold) {
            return Ok(None);
        }
        let distance = latest.center_distance(element);
        if !(distance <= self.proximity_threshold) {
            return Ok(None);
        }
        Ok(Some((similarity, distance)))
    }

    fn match_greedy(&self, elements: &[FrameElement]) -> Result<Vec<Option<usize>>, RegionError> {
        let mut claimed = vec![false; elements.len()];
        let mut assignments = Vec::with_capacity(self.active.len());

        for track in &self.active {
            let mut best: Option<(usize, f64)> = None;
            for (j, element) in elements.iter().enumerate() {
                if claimed[j] {
                    continue;
                }
                if let Some((similarity, _)) = self.evaluate(track, element)? {
                    if best.is_none_or(|(_, best_similarity)| similarity > best_similarity) {
                        best = Some((j, similarity));
                    }
                }
            }

            if let Some((j, _)) = best {
                claimed[j] = true;
            }
            assignments.push(best.map(|(j, _)| j));
        }

        Ok(assignments)
    }

    fn match_global(&self, elements: &[FrameElement]) -> Result<Vec<Option<usize>>, RegionError> {
        let mut candidates = Vec::new();
        for (t, track) in self.active.iter().enumerate() {
            for (j, element) in elements.iter().enumerate() {
                if let Some((similarity, distance)) = self.evaluate(track, element)? {
                    candidates.push(Candidate {
                        track: t,
                        element: j,
                        similarity,
                        distance,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.distance.total_cmp(&b.distance))
                .then(a.track.cmp(&b.track))
                .then(a.element.cmp(&b.element))
        });

        let mut assignments = vec![None; self.active.len()];
        let mut claimed = vec![false; elements.len()];
        for candidate in candidates {
            if assignments[candidate.track].is_none() && !claimed[candidate.element] {
                assignments[candidate.track] = Some(candidate.element);
                claimed[candidate.element] = true;
            }
        }
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::region::BoundingBox;

    fn element(frame: usize, id: i64, bbox: [f64; 4], embedding: Vec<f32>, text: &str) -> FrameElement {
        FrameElement {
            frame_index: frame,
            element_id: id,
            bbox: BoundingBox::from(bbox),
            content: Some(text.to_string()),
            embedding,
        }
    }

    #[test]
    fn links_identical_elements_across_frames() {
        let config = PipelineConfig::default();
        let frames = vec![
            vec![element(0, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0, 0.0], "Menu")],
            vec![element(1, 5, [0.1, 0.1, 0.3, 0.3], vec![1.0, 0.0], "Menu")],
            vec![element(2, 9, [0.11, 0.1, 0.31, 0.3], vec![1.0, 0.0], "Menu")],
        ];
        let tracks = Tracker::track_frames(&frames, &config).unwrap();
        assert_eq!(tracks.len(), 1);
        let frames_seen: Vec<usize> = tracks[0].occurrences.iter().map(|e| e.frame_index).collect();
        assert_eq!(frames_seen, vec![0, 1, 2]);
    }

    #[test]
    fn dissimilar_or_distant_elements_open_new_tracks() {
        let config = PipelineConfig::default();
        let frames = vec![
            vec![element(0, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0, 0.0], "a")],
            vec![
                // Same place, different look.
                element(1, 1, [0.1, 0.1, 0.3, 0.3], vec![0.0, 1.0], "b"),
                // Same look, far away.
                element(1, 2, [0.7, 0.7, 0.9, 0.9], vec![1.0, 0.0], "a"),
            ],
        ];
        let tracks = Tracker::track_frames(&frames, &config).unwrap();
        assert_eq!(tracks.len(), 3);
        assert!(tracks.iter().all(|t| t.len() == 1));
        // The unmatched first-frame track was closed before the survivors were flushed.
        assert_eq!(tracks[0].track_id, 0);
    }

    #[test]
    fn highest_similarity_wins_among_eligible() {
        let config = PipelineConfig::default();
        let mut tracker = Tracker::new(&config);
        tracker
            .update(vec![element(0, 1, [0.4, 0.4, 0.6, 0.6], vec![1.0, 0.0], "x")])
            .unwrap();

        let close_but_weaker = element(1, 1, [0.4, 0.4, 0.6, 0.6], vec![0.92, 0.39], "x");
        let stronger = element(1, 2, [0.42, 0.4, 0.62, 0.6], vec![0.99, 0.14], "x");
        tracker.update(vec![close_but_weaker, stronger]).unwrap();

        let track = &tracker.active_tracks()[0];
        assert_eq!(track.len(), 2);
        assert_eq!(track.latest().element_id, 2);
        assert_eq!(tracker.active_tracks().len(), 2);
    }

    #[test]
    fn greedy_gives_contested_element_to_earlier_track() {
        let config = PipelineConfig::default();
        let mut tracker = Tracker::new(&config);
        tracker
            .update(vec![
                element(0, 1, [0.40, 0.4, 0.5, 0.5], vec![0.95, 0.31], "a"),
                element(0, 2, [0.45, 0.4, 0.55, 0.5], vec![1.0, 0.0], "b"),
            ])
            .unwrap();
        tracker
            .update(vec![element(1, 1, [0.45, 0.4, 0.55, 0.5], vec![1.0, 0.0], "b")])
            .unwrap();

        assert_eq!(tracker.active_tracks().len(), 1);
        assert_eq!(tracker.active_tracks()[0].track_id, 0);
        assert_eq!(tracker.closed_tracks()[0].track_id, 1);
    }

    #[test]
    fn global_assignment_prefers_the_best_pair() {
        let config = PipelineConfig {
            match_strategy: MatchStrategy::GlobalAssignment,
            ..PipelineConfig::default()
        };
        let mut tracker = Tracker::new(&config);
        tracker
            .update(vec![
                element(0, 1, [0.40, 0.4, 0.5, 0.5], vec![0.95, 0.31], "a"),
                element(0, 2, [0.45, 0.4, 0.55, 0.5], vec![1.0, 0.0], "b"),
            ])
            .unwrap();
        tracker
            .update(vec![element(1, 1, [0.45, 0.4, 0.55, 0.5], vec![1.0, 0.0], "b")])
            .unwrap();

        assert_eq!(tracker.active_tracks().len(), 1);
        assert_eq!(tracker.active_tracks()[0].track_id, 1);
        assert_eq!(tracker.closed_tracks()[0].track_id, 0);
    }

    #[test]
    fn empty_frames_close_everything() {
        let config = PipelineConfig::default();
        let frames = vec![
            vec![element(0, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0], "a")],
            Vec::new(),
            vec![element(2, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0], "a")],
        ];
        let tracks = Tracker::track_frames(&frames, &config).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].len(), 1);
        assert_eq!(tracks[1].occurrences[0].frame_index, 2);
    }

    #[test]
    fn occurrences_must_move_forward() {
        let config = PipelineConfig::default();
        let mut tracker = Tracker::new(&config);
        tracker
            .update(vec![element(3, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0], "a")])
            .unwrap();
        let err = tracker
            .update(vec![element(3, 1, [0.1, 0.1, 0.3, 0.3], vec![1.0], "a")])
            .unwrap_err();
        assert!(matches!(err, RegionError::OutOfOrder { track_id: 0, frame_index: 3 }));
    }

    #[test]
    fn nan_embeddings_never_match() {
        let config = PipelineConfig::default();
        let frames = vec![
            vec![element(0, 1, [0.1, 0.1, 0.3, 0.3], vec![f32::NAN], "a")],
            vec![element(1, 1, [0.1, 0.1, 0.3, 0.3], vec![f32::NAN], "a")],
        ];
        let tracks = Tracker::track_frames(&frames, &config).unwrap();
        assert_eq!(tracks.len(), 2);
    }
}
