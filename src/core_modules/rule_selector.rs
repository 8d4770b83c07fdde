// THEORY:
// The `rule_selector` is the terminal layer. The region identifier may hand over
// several candidates; different consumers want different things from them, so three
// independent rules each pick their own winner:
//
// - `largest_area`: the biggest rectangle.
// - `most_elements`: the rectangle that, on average over the valid frames, contains
//   the most element centers.
// - `highest_variation`: the rectangle whose text changes most from frame to frame,
//   measured as the mean pairwise Jaccard distance between per-frame sets of
//   content strings.
//
// Every rule scans candidates in order and only replaces its current winner on a
// strictly better score, so ties go to the first candidate. The rules may disagree.

use crate::core_modules::frame_element::FrameElement;
use crate::core_modules::region::{BoundingBox, DynamicRegion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The three fixed selection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    LargestArea,
    MostElements,
    HighestVariation,
}

impl SelectionRule {
    pub const ALL: [SelectionRule; 3] = [
        SelectionRule::LargestArea,
        SelectionRule::MostElements,
        SelectionRule::HighestVariation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SelectionRule::LargestArea => "largest_area",
            SelectionRule::MostElements => "most_elements",
            SelectionRule::HighestVariation => "highest_variation",
        }
    }
}

/// The engine's output: one optional box per rule. All `None` means "no opinion".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub largest_area: Option<BoundingBox>,
    pub most_elements: Option<BoundingBox>,
    pub highest_variation: Option<BoundingBox>,
}

impl SelectionResult {
    /// The all-null result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every rule agrees on `bbox`.
    pub fn uniform(bbox: BoundingBox) -> Self {
        Self {
            largest_area: Some(bbox),
            most_elements: Some(bbox),
            highest_variation: Some(bbox),
        }
    }

    pub fn get(&self, rule: SelectionRule) -> Option<BoundingBox> {
        match rule {
            SelectionRule::LargestArea => self.largest_area,
            SelectionRule::MostElements => self.most_elements,
            SelectionRule::HighestVariation => self.highest_variation,
        }
    }

    pub fn is_empty(&self) -> bool {
        SelectionRule::ALL.iter().all(|rule| self.get(*rule).is_none())
    }
}

/// Applies all three rules to `regions` given the valid frames' elements.
pub fn select(regions: &[DynamicRegion], frames: &[Vec<FrameElement>]) -> SelectionResult {
    match regions {
        [] => SelectionResult::empty(),
        [only] => SelectionResult::uniform(only.bbox),
        _ => SelectionResult {
            largest_area: largest_area(regions),
            most_elements: most_elements(regions, frames),
            highest_variation: highest_variation(regions, frames),
        },
    }
}

/// First candidate with a strictly greater score wins.
fn first_best(scored: impl Iterator<Item = (BoundingBox, f64)>) -> Option<BoundingBox> {
    let mut best: Option<(BoundingBox, f64)> = None;
    for (bbox, score) in scored {
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((bbox, score));
        }
    }
    best.map(|(bbox, _)| bbox)
}

pub fn largest_area(regions: &[DynamicRegion]) -> Option<BoundingBox> {
    first_best(regions.iter().map(|r| (r.bbox, r.bbox.area())))
}

pub fn most_elements(regions: &[DynamicRegion], frames: &[Vec<FrameElement>]) -> Option<BoundingBox> {
    first_best(regions.iter().map(|r| (r.bbox, average_element_count(&r.bbox, frames))))
}

pub fn highest_variation(regions: &[DynamicRegion], frames: &[Vec<FrameElement>]) -> Option<BoundingBox> {
    first_best(
        regions
            .iter()
            .filter_map(|r| content_variation_in(&r.bbox, frames).map(|score| (r.bbox, score))),
    )
}

/// Mean number of element centers inside `bbox` per frame.
pub fn average_element_count(bbox: &BoundingBox, frames: &[Vec<FrameElement>]) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    let total: usize = frames
        .iter()
        .map(|elements| elements.iter().filter(|e| bbox.contains_point(e.center())).count())
        .sum();
    total as f64 / frames.len() as f64
}

/// Mean pairwise Jaccard distance between the per-frame content sets inside `bbox`.
/// `None` when fewer than two frames have any content there.
pub fn content_variation_in(bbox: &BoundingBox, frames: &[Vec<FrameElement>]) -> Option<f64> {
    let sets: Vec<BTreeSet<&str>> = frames
        .iter()
        .map(|elements| {
            elements
                .iter()
                .filter(|e| bbox.contains_point(e.center()))
                .filter_map(FrameElement::text)
                .collect::<BTreeSet<&str>>()
        })
        .filter(|set| !set.is_empty())
        .collect();
    if sets.len() < 2 {
        return None;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            let intersection = a.intersection(b).count();
            let union = a.union(b).count();
            total += 1.0 - intersection as f64 / union as f64;
            pairs += 1;
        }
    }
    Some(total / pairs as f64)
}
