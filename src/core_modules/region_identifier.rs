// THEORY:
// The `region_identifier` decides where the dynamic content lives. It runs two
// strategies in a fixed fallback chain:
//
// 1.  **Heatmap (primary)**: Paint static and dynamic tracks onto separate density
//     grids, smooth, normalize, and keep the 4-connected areas where dynamic density
//     dominates. Tiny components (and masks that are tiny overall) are noise.
// 2.  **Geometric (fallback)**: If the heatmap finds nothing, assume the static
//     elements are chrome hugging the content. Take their union box and return what
//     is left of the frame around it: a full-width band above, a full-width band
//     below, and the left and right pieces beside it. With no static elements at all,
//     the whole frame is the candidate.
//
// The output is a plain list of candidates; choosing among them is the rule
// selector's job.

use crate::config::{HeatmapConfig, PipelineConfig};
use crate::core_modules::heatmap::DensityGrid;
use crate::core_modules::heatmap::region_grower::{dynamic_mask, find_components};
use crate::core_modules::persistence::Classification;
use crate::core_modules::region::{BoundingBox, DynamicRegion};
use crate::core_modules::tracker::ElementTrack;
use crate::error::RegionError;
use serde::Serialize;
use tracing::debug;

/// Which strategy produced the candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStrategy {
    Heatmap,
    Fallback,
}

pub struct RegionIdentifier {
    heatmap: HeatmapConfig,
    fallback_min_area: f64,
}

impl RegionIdentifier {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            heatmap: config.heatmap.clone(),
            fallback_min_area: config.fallback_min_area,
        }
    }

    /// Runs the heatmap strategy and falls back to geometric subtraction when it
    /// yields nothing.
    pub fn identify(
        &self,
        classification: &Classification<'_>,
    ) -> Result<(Vec<DynamicRegion>, RegionStrategy), RegionError> {
        for track in classification
            .static_tracks
            .iter()
            .chain(&classification.dynamic_tracks)
        {
            if track.occurrences.iter().any(|o| !o.bbox.is_finite()) {
                return Err(RegionError::NonFinite("occurrence bbox"));
            }
        }

        if let Some(regions) = self.heatmap_regions(classification) {
            debug!(candidates = regions.len(), "heatmap strategy found regions");
            return Ok((regions, RegionStrategy::Heatmap));
        }

        let regions = self.fallback_regions(&classification.static_tracks);
        debug!(candidates = regions.len(), "fell back to geometric subtraction");
        Ok((regions, RegionStrategy::Fallback))
    }

    /// Components of the dynamic ratio mask, or `None` when none qualify.
    pub fn heatmap_regions(&self, classification: &Classification<'_>) -> Option<Vec<DynamicRegion>> {
        if classification.dynamic_tracks.is_empty() {
            return None;
        }
        let size = self.heatmap.grid_size;

        let mut static_grid = DensityGrid::from_tracks(&classification.static_tracks, size);
        let mut dynamic_grid = DensityGrid::from_tracks(&classification.dynamic_tracks, size);
        for grid in [&mut static_grid, &mut dynamic_grid] {
            grid.smooth(self.heatmap.sigma);
            grid.normalize_max();
        }

        let mask = dynamic_mask(&static_grid, &dynamic_grid, &self.heatmap);
        if mask.coverage() < self.heatmap.min_component_fraction {
            debug!(coverage = mask.coverage(), "dynamic mask too small");
            return None;
        }

        let min_cells = self.heatmap.min_component_fraction * (size * size) as f64;
        let regions: Vec<DynamicRegion> = find_components(&mask)
            .into_iter()
            .filter(|component| component.cell_count as f64 >= min_cells)
            .map(|component| DynamicRegion::new(component.bbox(size)))
            .collect();

        if regions.is_empty() { None } else { Some(regions) }
    }

    /// Frame minus the static union box, as up to four rectangles.
    pub fn fallback_regions(&self, static_tracks: &[&ElementTrack]) -> Vec<DynamicRegion> {
        let Some(union) = static_union(static_tracks) else {
            return vec![DynamicRegion::new(BoundingBox::FULL_FRAME)];
        };

        let pieces = [
            // Above and below span the full width.
            BoundingBox::new(0.0, 0.0, 1.0, union.y1),
            BoundingBox::new(0.0, union.y2, 1.0, 1.0),
            // Left and right are limited to the union's vertical band.
            BoundingBox::new(0.0, union.y1, union.x1, union.y2),
            BoundingBox::new(union.x2, union.y1, 1.0, union.y2),
        ];

        pieces
            .into_iter()
            .filter(|piece| {
                piece.width() > 0.0 && piece.height() > 0.0 && piece.area() > self.fallback_min_area
            })
            .map(DynamicRegion::new)
            .collect()
    }
}

/// Union of every occurrence box of every track, clamped to the frame.
pub fn static_union(tracks: &[&ElementTrack]) -> Option<BoundingBox> {
    tracks
        .iter()
        .flat_map(|track| track.occurrences.iter().map(|o| o.bbox))
        .reduce(|acc, bbox| acc.union(&bbox))
        .map(|union| union.clamped())
}
