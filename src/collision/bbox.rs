// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Axis-aligned bounding boxes for broad-phase pruning

use nalgebra::Vector3;
use serde::Serialize;

/// Axis-aligned bounding box, machine millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f64>>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand_to_include(p);
        }
        bbox
    }

    pub fn expand_to_include(&mut self, point: &Vector3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Grow uniformly by a margin on all sides.
    pub fn inflated(&self, margin: f64) -> Aabb {
        Aabb {
            min: self.min - Vector3::repeat(margin),
            max: self.max + Vector3::repeat(margin),
        }
    }

    /// Symmetric overlap test (closed intervals).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_and_center() {
        let mut bbox = Aabb::empty();
        bbox.expand_to_include(&Vector3::new(1.0, 2.0, 3.0));
        bbox.expand_to_include(&Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.min, Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.max, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.center(), Vector3::zeros());
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let a = Aabb::new(Vector3::zeros(), Vector3::repeat(10.0));
        let b = Aabb::new(Vector3::repeat(5.0), Vector3::repeat(15.0));
        let c = Aabb::new(Vector3::repeat(11.0), Vector3::repeat(12.0));
        assert_eq!(a.intersects(&b), b.intersects(&a));
        assert!(a.intersects(&b));
        assert_eq!(a.intersects(&c), c.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_touching_boxes_count_as_overlap() {
        let a = Aabb::new(Vector3::zeros(), Vector3::repeat(1.0));
        let b = Aabb::new(Vector3::repeat(1.0), Vector3::repeat(2.0));
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_inflate() {
        let a = Aabb::new(Vector3::zeros(), Vector3::repeat(1.0)).inflated(0.5);
        assert_eq!(a.min, Vector3::repeat(-0.5));
        assert_eq!(a.max, Vector3::repeat(1.5));
    }
}
