// THEORY:
// The `region` module holds the geometric vocabulary shared by every layer of the
// engine. Everything downstream of the builder speaks in normalized coordinates:
// a box is four fractions of the frame's width and height, so frames of different
// resolutions can be compared directly.
//
// Key architectural principles:
// 1.  **Dumb Data Containers**: `BoundingBox` and `DynamicRegion` carry no state and
//     no history. They are snapshots, exactly like a single-frame detection.
// 2.  **One Convention**: Boxes are `(x1, y1, x2, y2)` with the origin at the top-left
//     corner. Area is `(x2 - x1) * (y2 - y1)` and containment is inclusive on every
//     edge, so an element centered on a region border counts as inside.
// 3.  **Wire Shape**: On the outside a box is always a plain `[x1, y1, x2, y2]` array.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in normalized `[0, 1]` frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// The whole frame.
    pub const FULL_FRAME: BoundingBox = BoundingBox {
        x1: 0.0,
        y1: 0.0,
        x2: 1.0,
        y2: 1.0,
    };

    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Inclusive on all four edges.
    pub fn contains_point(&self, (x, y): (f64, f64)) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// The smallest box enclosing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Clamps every coordinate into `[0, 1]`.
    pub fn clamped(&self) -> BoundingBox {
        BoundingBox {
            x1: self.x1.clamp(0.0, 1.0),
            y1: self.y1.clamp(0.0, 1.0),
            x2: self.x2.clamp(0.0, 1.0),
            y2: self.y2.clamp(0.0, 1.0),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

/// A candidate screen area whose composition changes across the sequence.
/// Produced by the region identifier and consumed by the rule selector; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicRegion {
    pub bbox: BoundingBox,
}

impl DynamicRegion {
    pub fn new(bbox: BoundingBox) -> Self {
        Self { bbox }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_and_center() {
        let bbox = BoundingBox::new(0.1, 0.2, 0.5, 0.6);
        assert!((bbox.area() - 0.16).abs() < 1e-12);
        let (cx, cy) = bbox.center();
        assert!((cx - 0.3).abs() < 1e-12);
        assert!((cy - 0.4).abs() < 1e-12);
    }

    #[test]
    fn containment_is_inclusive() {
        let bbox = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        assert!(bbox.contains_point((0.5, 0.5)));
        assert!(bbox.contains_point((0.0, 0.25)));
        assert!(!bbox.contains_point((0.51, 0.25)));
    }

    #[test]
    fn union_and_clamp() {
        let a = BoundingBox::new(-0.2, 0.1, 0.3, 0.3);
        let b = BoundingBox::new(0.2, 0.2, 1.4, 0.9);
        let union = a.union(&b).clamped();
        assert_eq!(union, BoundingBox::new(0.0, 0.1, 1.0, 0.9));
    }

    #[test]
    fn serializes_as_plain_array() {
        let bbox = BoundingBox::new(0.0, 0.25, 1.0, 0.75);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[0.0,0.25,1.0,0.75]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }
}
