// THEORY:
// The `heatmap` module is the spatial grouping layer of the engine. It answers
// "where on screen do dynamic tracks live, as opposed to static ones?" by painting
// both populations onto coarse density grids and comparing them cell by cell.
//
// Key architectural principles & algorithm steps:
// 1.  **Density Painting**: Every occurrence of every track in a population adds a
//     uniform weight of 1.0 to each grid cell its bbox covers. Long-lived elements
//     therefore weigh more than short-lived ones.
// 2.  **Smoothing**: Both grids are blurred with the same Gaussian, applied as two 1D
//     passes (rows, then columns) with edge clamping. This merges neighbouring
//     elements into coherent areas instead of a speckle of boxes.
// 3.  **Independent Normalization**: Each grid is divided by its own maximum. A
//     sequence with many static elements and few dynamic ones still gets a fair
//     comparison.
// 4.  **Ratio Mask**: Where the combined density clears a noise floor, the share of
//     dynamic density decides whether a cell is dynamic.
// 5.  **Region Growing**: Dynamic cells are grouped into 4-connected components with
//     an iterative flood fill; each component is summarized by its bounding box.

use crate::config::HeatmapConfig;
use crate::core_modules::region::BoundingBox;
use crate::core_modules::tracker::ElementTrack;

/// A square density grid over the normalized frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    size: usize,
    cells: Vec<f64>,
}

impl DensityGrid {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0.0; size * size],
        }
    }

    /// Paints every occurrence of every track.
    pub fn from_tracks(tracks: &[&ElementTrack], size: usize) -> Self {
        let mut grid = Self::new(size);
        for track in tracks {
            for occurrence in &track.occurrences {
                grid.splat(&occurrence.bbox, 1.0);
            }
        }
        grid
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.cells[y * self.size + x]
    }

    pub fn max(&self) -> f64 {
        self.cells.iter().copied().fold(0.0, f64::max)
    }

    /// Adds `weight` to every cell the box touches. Boxes thinner than a cell still
    /// paint the cell they start in.
    pub fn splat(&mut self, bbox: &BoundingBox, weight: f64) {
        if self.size == 0 {
            return;
        }
        let bbox = bbox.clamped();
        let (x_start, x_end) = self.cell_span(bbox.x1, bbox.x2);
        let (y_start, y_end) = self.cell_span(bbox.y1, bbox.y2);
        for y in y_start..y_end {
            let row = y * self.size;
            for cell in &mut self.cells[row + x_start..row + x_end] {
                *cell += weight;
            }
        }
    }

    fn cell_span(&self, start: f64, end: f64) -> (usize, usize) {
        let n = self.size as f64;
        let first = ((start * n).floor() as usize).min(self.size - 1);
        let last = ((end * n).ceil() as usize).min(self.size);
        (first, last.max(first + 1))
    }

    /// Separable Gaussian blur. `sigma <= 0` leaves the grid untouched.
    pub fn smooth(&mut self, sigma: f64) {
        if sigma <= 0.0 || self.size == 0 {
            return;
        }
        let kernel = gaussian_kernel(sigma);
        let radius = (kernel.len() / 2) as isize;
        let n = self.size;
        let last = (n - 1) as isize;

        let mut scratch = vec![0.0; n * n];
        for y in 0..n {
            for x in 0..n {
                scratch[y * n + x] = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let sx = (x as isize + k as isize - radius).clamp(0, last) as usize;
                        w * self.cells[y * n + sx]
                    })
                    .sum();
            }
        }
        for y in 0..n {
            for x in 0..n {
                self.cells[y * n + x] = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let sy = (y as isize + k as isize - radius).clamp(0, last) as usize;
                        w * scratch[sy * n + x]
                    })
                    .sum();
            }
        }
    }

    /// Scales the grid into `[0, 1]`. An all-zero grid stays all zero.
    pub fn normalize_max(&mut self) {
        let max = self.max();
        if max > 0.0 {
            for cell in &mut self.cells {
                *cell /= max;
            }
        }
    }
}

/// Normalized 1D Gaussian with radius `ceil(3 * sigma)`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= total;
    }
    kernel
}

/// A 4-connected group of dynamic cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub cell_count: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Component {
    /// The component's extent in normalized coordinates (cell edges, not centers).
    pub fn bbox(&self, grid_size: usize) -> BoundingBox {
        let n = grid_size as f64;
        BoundingBox::new(
            self.min_x as f64 / n,
            self.min_y as f64 / n,
            (self.max_x + 1) as f64 / n,
            (self.max_y + 1) as f64 / n,
        )
    }
}

/// A boolean grid marking cells dominated by dynamic density.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMask {
    size: usize,
    cells: Vec<bool>,
}

impl DynamicMask {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.size + x]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|set| **set).count()
    }

    /// Share of the grid that is dynamic.
    pub fn coverage(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.count() as f64 / self.cells.len() as f64
    }
}

pub mod region_grower {
    use super::*;

    /// Builds the ratio mask from two smoothed, max-normalized grids of equal size.
    pub fn dynamic_mask(
        static_grid: &DensityGrid,
        dynamic_grid: &DensityGrid,
        config: &HeatmapConfig,
    ) -> DynamicMask {
        let cells = static_grid
            .cells
            .iter()
            .zip(&dynamic_grid.cells)
            .map(|(s, d)| {
                let combined = s + d;
                combined > config.noise_floor && d / combined > config.ratio_threshold
            })
            .collect();
        DynamicMask {
            size: static_grid.size,
            cells,
        }
    }

    /// Finds every 4-connected component of set cells, in row-major order of their
    /// first cell.
    pub fn find_components(mask: &DynamicMask) -> Vec<Component> {
        let n = mask.size;
        let mut visited = vec![false; n * n];
        let mut components = Vec::new();

        for y in 0..n {
            for x in 0..n {
                if visited[y * n + x] || !mask.is_set(x, y) {
                    continue;
                }
                components.push(grow_component(mask, &mut visited, x, y));
            }
        }
        components
    }

    /// Iterative flood fill from a seed cell (stack-based, 4 direct neighbours).
    fn grow_component(mask: &DynamicMask, visited: &mut [bool], seed_x: usize, seed_y: usize) -> Component {
        let n = mask.size as isize;
        let mut component = Component {
            cell_count: 0,
            min_x: seed_x,
            min_y: seed_y,
            max_x: seed_x,
            max_y: seed_y,
        };
        let mut stack = vec![(seed_x, seed_y)];
        visited[seed_y * mask.size + seed_x] = true;

        while let Some((x, y)) = stack.pop() {
            component.cell_count += 1;
            component.min_x = component.min_x.min(x);
            component.min_y = component.min_y.min(y);
            component.max_x = component.max_x.max(x);
            component.max_y = component.max_y.max(y);

            for (dx, dy) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || nx >= n || ny < 0 || ny >= n {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                let index = ny * mask.size + nx;
                if !visited[index] && mask.is_set(nx, ny) {
                    visited[index] = true;
                    stack.push((nx, ny));
                }
            }
        }
        component
    }
}
