// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Convex collision shapes
//!
//! A small closed shape set with one capability: the support function.
//! That is all GJK/EPA need, and it keeps margin inflation (near-miss
//! checks) exact: a margin is a Minkowski sum with a sphere, applied in
//! the support itself.

use crate::collision::bbox::Aabb;
use crate::machine::{ComponentGeometry, MachineComponent};
use crate::tool::{Tool, ToolShape};
use nalgebra::{Rotation3, Vector3};

/// Local-frame convex shape. Axial shapes run along local +Z from the
/// origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box { half: Vector3<f64> },
    Sphere { radius: f64 },
    Cylinder { radius: f64, height: f64 },
    /// Sphere-capped segment from origin to `height`.
    Capsule { radius: f64, height: f64 },
    /// Truncated cone, `r_bottom` at the origin, `r_top` at `height`.
    Frustum { r_bottom: f64, r_top: f64, height: f64 },
    Hull { points: Vec<Vector3<f64>> },
}

impl Shape {
    /// Farthest local point in the given local direction.
    pub fn support_local(&self, dir: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Shape::Box { half } => Vector3::new(
                half.x.copysign(dir.x),
                half.y.copysign(dir.y),
                half.z.copysign(dir.z),
            ),
            Shape::Sphere { radius } => safe_normalize(dir) * *radius,
            Shape::Cylinder { radius, height } => {
                radial(dir, *radius) + Vector3::new(0.0, 0.0, if dir.z > 0.0 { *height } else { 0.0 })
            }
            Shape::Capsule { radius, height } => {
                let cap = if dir.z > 0.0 { *height } else { 0.0 };
                Vector3::new(0.0, 0.0, cap) + safe_normalize(dir) * *radius
            }
            Shape::Frustum {
                r_bottom,
                r_top,
                height,
            } => {
                let bottom = radial(dir, *r_bottom);
                let top = radial(dir, *r_top) + Vector3::new(0.0, 0.0, *height);
                if top.dot(dir) > bottom.dot(dir) {
                    top
                } else {
                    bottom
                }
            }
            Shape::Hull { points } => points
                .iter()
                .copied()
                .max_by(|a, b| {
                    a.dot(dir)
                        .partial_cmp(&b.dot(dir))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or_else(Vector3::zeros),
        }
    }

    /// Conservative local bounds.
    pub fn local_bounds(&self) -> Aabb {
        match self {
            Shape::Box { half } => Aabb::new(-half, *half),
            Shape::Sphere { radius } => {
                Aabb::new(Vector3::repeat(-radius), Vector3::repeat(*radius))
            }
            Shape::Cylinder { radius, height } => Aabb::new(
                Vector3::new(-radius, -radius, 0.0),
                Vector3::new(*radius, *radius, *height),
            ),
            Shape::Frustum {
                r_bottom,
                r_top,
                height,
            } => {
                let r = r_bottom.max(*r_top);
                Aabb::new(Vector3::new(-r, -r, 0.0), Vector3::new(r, r, *height))
            }
            Shape::Capsule { radius, height } => Aabb::new(
                Vector3::new(-radius, -radius, -radius),
                Vector3::new(*radius, *radius, height + radius),
            ),
            Shape::Hull { points } => Aabb::from_points(points.iter()),
        }
    }
}

fn safe_normalize(dir: &Vector3<f64>) -> Vector3<f64> {
    let n = dir.norm();
    if n < 1e-12 {
        Vector3::z()
    } else {
        dir / n
    }
}

fn radial(dir: &Vector3<f64>, radius: f64) -> Vector3<f64> {
    let planar = Vector3::new(dir.x, dir.y, 0.0);
    let n = planar.norm();
    if n < 1e-12 {
        Vector3::zeros()
    } else {
        planar * (radius / n)
    }
}

/// A shape placed in machine coordinates.
#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: Shape,
    pub rotation: Rotation3<f64>,
    pub position: Vector3<f64>,
    /// Minkowski margin added in the support function.
    pub margin: f64,
}

impl Collider {
    pub fn new(shape: Shape, position: Vector3<f64>) -> Self {
        Self {
            shape,
            rotation: Rotation3::identity(),
            position,
            margin: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation3<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Farthest world point in a world direction.
    pub fn support(&self, dir: &Vector3<f64>) -> Vector3<f64> {
        let local_dir = self.rotation.inverse() * dir;
        let p = self.rotation * self.shape.support_local(&local_dir) + self.position;
        if self.margin > 0.0 {
            p + safe_normalize(dir) * self.margin
        } else {
            p
        }
    }

    /// World bounds from the rotated local corners, margin included.
    pub fn bounds(&self) -> Aabb {
        let local = self.shape.local_bounds();
        let mut bbox = Aabb::empty();
        for i in 0..8 {
            let corner = Vector3::new(
                if i & 1 == 0 { local.min.x } else { local.max.x },
                if i & 2 == 0 { local.min.y } else { local.max.y },
                if i & 4 == 0 { local.min.z } else { local.max.z },
            );
            bbox.expand_to_include(&(self.rotation * corner + self.position));
        }
        bbox.inflated(self.margin)
    }

    /// Evaluate relative to a reference point: narrow phase runs in a
    /// tool-local frame to dodge the scale disparity between a 6mm cutter
    /// and a meter-long machine body.
    pub fn offset_by(&self, reference: &Vector3<f64>) -> Collider {
        let mut c = self.clone();
        c.position -= reference;
        c
    }
}

/// Collider for a machine component entry at its configured offset.
pub fn component_collider(component: &MachineComponent) -> Collider {
    let position = Vector3::from(component.offset);
    let shape = match component.geometry {
        ComponentGeometry::Box { size } => Shape::Box {
            half: Vector3::from(size) / 2.0,
        },
        ComponentGeometry::Cylinder { radius, height } => Shape::Cylinder { radius, height },
        ComponentGeometry::Sphere { radius } => Shape::Sphere { radius },
    };
    Collider::new(shape, position)
}

/// Cutting-body collider for a tool at a tip position, pointing along the
/// unit tool axis.
pub fn tool_collider(tool: &Tool, tip: Vector3<f64>, axis: Vector3<f64>) -> Collider {
    let r = tool.radius();
    let shape = match tool.shape {
        ToolShape::BallEndmill => Shape::Capsule {
            radius: r,
            height: (tool.length - r).max(r),
        },
        ToolShape::Drill | ToolShape::Tap => Shape::Frustum {
            r_bottom: 0.1 * r,
            r_top: r,
            height: tool.length,
        },
        _ => Shape::Cylinder {
            radius: r,
            height: tool.length,
        },
    };
    let offset = if tool.shape == ToolShape::BallEndmill {
        tip + axis * r
    } else {
        tip
    };
    Collider::new(shape, offset).with_rotation(rotation_to_axis(axis))
}

/// Rotation taking local +Z to the given unit axis.
pub fn rotation_to_axis(axis: Vector3<f64>) -> Rotation3<f64> {
    Rotation3::rotation_between(&Vector3::z(), &axis).unwrap_or_else(|| {
        // Antiparallel: flip about X.
        Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
    })
}
