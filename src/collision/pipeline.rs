// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Two-phase collision pipeline
//!
//! Broad phase prunes with a refit BVH over all rigid components, narrow
//! phase runs GJK/EPA per surviving pair. Rapid moves are sampled along
//! the path so fast traversal cannot tunnel through thin geometry. The
//! pipeline only reports; severity policy (stop, warn, ignore) belongs to
//! the caller.

use crate::collision::bbox::Aabb;
use crate::collision::bvh::Bvh;
use crate::collision::gjk;
use crate::collision::shape::{component_collider, tool_collider, rotation_to_axis, Collider, Shape};
use crate::kinematics::{AxisPose, KinematicChain};
use crate::machine::{ComponentClass, MachineConfig};
use crate::parse::resolve::Move;
use crate::stock::sweep::chord_move;
use crate::tool::Tool;
use ahash::AHashMap;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::Serialize;

/// Fallback holder radius when the tool shank gives no better bound (mm).
const HOLDER_MIN_RADIUS: f64 = 16.0;
const SPINDLE_RADIUS: f64 = 55.0;
const SPINDLE_HEIGHT: f64 = 250.0;
/// Chord tolerance for arc sampling during collision checks (mm).
const SAMPLE_CHORD_TOL: f64 = 0.5;

/// Tunables of the pipeline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CollisionConfig {
    /// Distance below which an advisory near-miss is raised (mm).
    pub near_miss_clearance: f64,
    /// Smallest geometry feature CCD sampling must not skip over (mm).
    pub min_feature_size: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            near_miss_clearance: 2.0,
            min_feature_size: 1.0,
        }
    }
}

/// Contact classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollisionKind {
    ToolStock,
    ToolHolderStock,
    ToolFixture,
    SpindleContact,
    NearMiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Normal cutting contact, not a fault.
    Expected,
    Critical,
    Advisory,
}

impl CollisionKind {
    /// Severity is fixed by the pair classes, never configurable.
    pub fn severity(&self) -> Severity {
        match self {
            CollisionKind::ToolStock => Severity::Expected,
            CollisionKind::NearMiss => Severity::Advisory,
            _ => Severity::Critical,
        }
    }
}

/// One reported contact, ordered by block then pair.
#[derive(Debug, Clone, Serialize)]
pub struct CollisionEvent {
    pub block: usize,
    pub pair: (String, String),
    pub kind: CollisionKind,
    pub severity: Severity,
    /// Penetration depth (mm); for near-misses the estimated remaining
    /// clearance instead.
    pub depth: f64,
    pub point: [f64; 3],
    pub normal: [f64; 3],
}

#[derive(Debug, Clone)]
struct SceneObject {
    name: String,
    class: ComponentClass,
    collider: Collider,
}

/// Broad+narrow pipeline over the machine scene.
#[derive(Debug)]
pub struct CollisionPipeline {
    objects: Vec<SceneObject>,
    bvh: Bvh,
    tool_id: usize,
    holder_id: usize,
    spindle_id: usize,
    stock_id: usize,
    config: CollisionConfig,
}

impl CollisionPipeline {
    /// Build the scene from the machine's static components plus the four
    /// dynamic slots (tool, holder, spindle, stock box).
    pub fn new(machine: &MachineConfig, stock_bounds: Aabb, config: CollisionConfig) -> Self {
        let mut objects = Vec::new();
        for component in &machine.components {
            // Dynamic classes are managed by the pipeline itself.
            if matches!(
                component.class,
                ComponentClass::Tool | ComponentClass::Holder | ComponentClass::Spindle
                    | ComponentClass::Stock
            ) {
                continue;
            }
            objects.push(SceneObject {
                name: component.name.clone(),
                class: component.class,
                collider: component_collider(component),
            });
        }

        let far = Vector3::repeat(1e9);
        let placeholder = || Collider::new(Shape::Sphere { radius: 1e-6 }, far);
        let tool_id = objects.len();
        objects.push(SceneObject {
            name: "tool".into(),
            class: ComponentClass::Tool,
            collider: placeholder(),
        });
        let holder_id = objects.len();
        objects.push(SceneObject {
            name: "holder".into(),
            class: ComponentClass::Holder,
            collider: placeholder(),
        });
        let spindle_id = objects.len();
        objects.push(SceneObject {
            name: "spindle".into(),
            class: ComponentClass::Spindle,
            collider: placeholder(),
        });
        let stock_id = objects.len();
        objects.push(SceneObject {
            name: "stock".into(),
            class: ComponentClass::Stock,
            collider: box_collider(&stock_bounds),
        });

        let leaves: Vec<(usize, Aabb)> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (i, o.collider.bounds()))
            .collect();
        let bvh = Bvh::build(&leaves);

        Self {
            objects,
            bvh,
            tool_id,
            holder_id,
            spindle_id,
            stock_id,
            config,
        }
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Track the shrinking stock: the box tightens as material comes off.
    pub fn update_stock_bounds(&mut self, bounds: Aabb) {
        self.objects[self.stock_id].collider = box_collider(&bounds);
        self.bvh
            .refit(self.stock_id, self.objects[self.stock_id].collider.bounds());
    }

    /// Check one move, sampling along its path. Rapid moves use a CCD step
    /// of `min_feature_size`; cutting moves sample chord endpoints only,
    /// since the stock model already accounts for swept material.
    pub fn check_move(
        &mut self,
        mv: &Move,
        tool: &Tool,
        machine: &MachineConfig,
        chain: &KinematicChain,
    ) -> Vec<CollisionEvent> {
        let max_step = if mv.is_rapid() {
            self.config.min_feature_size.max(1e-3)
        } else {
            f64::INFINITY
        };
        let chords = chord_move(mv, SAMPLE_CHORD_TOL, max_step);

        let mut samples: Vec<(Vector3<f64>, f64)> = Vec::with_capacity(chords.len() + 1);
        samples.push((mv.start, 0.0));
        let n = chords.len() as f64;
        for (i, chord) in chords.iter().enumerate() {
            samples.push((chord.end, (i as f64 + 1.0) / n));
        }

        let mut best: AHashMap<(usize, usize, CollisionKind), CollisionEvent> = AHashMap::new();
        for (tip, t) in samples {
            let pose = AxisPose::new(
                tip.x,
                tip.y,
                tip.z,
                mv.a_start + (mv.a_end - mv.a_start) * t,
                mv.c_start + (mv.c_end - mv.c_start) * t,
            );
            let axis = chain.tool_axis_machine(&pose);
            self.place_spindle_group(tool, machine, &tip, &axis);

            for (key, event) in self.check_step(mv, &tip) {
                merge_event(&mut best, key, event);
            }
        }

        let mut events: Vec<CollisionEvent> = best.into_values().collect();
        events.sort_by(|a, b| (&a.pair, a.kind as u8).cmp(&(&b.pair, b.kind as u8)));
        events
    }

    /// Position tool, holder and spindle for one sample and refit their
    /// BVH leaves.
    fn place_spindle_group(
        &mut self,
        tool: &Tool,
        machine: &MachineConfig,
        tip: &Vector3<f64>,
        axis: &Vector3<f64>,
    ) {
        let rotation = rotation_to_axis(*axis);
        self.objects[self.tool_id].collider = tool_collider(tool, *tip, *axis);

        let holder_base = tip + axis * tool.length;
        self.objects[self.holder_id].collider = Collider::new(
            Shape::Cylinder {
                radius: tool.radius().max(HOLDER_MIN_RADIUS),
                height: machine.holder_clearance.max(1.0),
            },
            holder_base,
        )
        .with_rotation(rotation);

        let spindle_base = holder_base + axis * machine.holder_clearance;
        self.objects[self.spindle_id].collider = Collider::new(
            Shape::Cylinder {
                radius: SPINDLE_RADIUS,
                height: SPINDLE_HEIGHT,
            },
            spindle_base,
        )
        .with_rotation(rotation);

        for id in [self.tool_id, self.holder_id, self.spindle_id] {
            self.bvh.refit(id, self.objects[id].collider.bounds());
        }
    }

    /// Broad phase then parallel narrow phase for the current placement.
    fn check_step(
        &self,
        mv: &Move,
        tip: &Vector3<f64>,
    ) -> Vec<((usize, usize, CollisionKind), CollisionEvent)> {
        let moving = [self.tool_id, self.holder_id, self.spindle_id];
        let candidates: Vec<(usize, usize, CollisionKind)> = self
            .bvh
            .overlapping_pairs()
            .into_iter()
            .filter(|(a, b)| moving.contains(a) != moving.contains(b))
            .filter_map(|(a, b)| {
                classify(self.objects[a].class, self.objects[b].class).map(|kind| (a, b, kind))
            })
            .collect();

        let clearance = self.config.near_miss_clearance;
        candidates
            .par_iter()
            .filter_map(|&(a, b, kind)| {
                // Tool-local frame: both colliders shifted to the tip.
                let ca = self.objects[a].collider.offset_by(tip);
                let cb = self.objects[b].collider.offset_by(tip);
                if let Some(contact) = gjk::intersect(&ca, &cb) {
                    return Some((
                        (a, b, kind),
                        self.event(mv, a, b, kind, contact.depth, contact, tip),
                    ));
                }
                if clearance > 0.0 && kind != CollisionKind::ToolStock {
                    let fa = ca.clone().with_margin(clearance / 2.0);
                    let fb = cb.clone().with_margin(clearance / 2.0);
                    if let Some(contact) = gjk::intersect(&fa, &fb) {
                        let gap = (clearance - contact.depth).max(0.0);
                        let kind = CollisionKind::NearMiss;
                        return Some((
                            (a, b, kind),
                            self.event(mv, a, b, kind, gap, contact, tip),
                        ));
                    }
                }
                None
            })
            .collect()
    }

    fn event(
        &self,
        mv: &Move,
        a: usize,
        b: usize,
        kind: CollisionKind,
        depth: f64,
        contact: gjk::Contact,
        tip: &Vector3<f64>,
    ) -> CollisionEvent {
        let point = contact.point + tip;
        CollisionEvent {
            block: mv.block,
            pair: (self.objects[a].name.clone(), self.objects[b].name.clone()),
            kind,
            severity: kind.severity(),
            depth,
            point: [point.x, point.y, point.z],
            normal: [contact.normal.x, contact.normal.y, contact.normal.z],
        }
    }
}

fn box_collider(bounds: &Aabb) -> Collider {
    Collider::new(
        Shape::Box {
            half: bounds.size() / 2.0,
        },
        bounds.center(),
    )
}

/// Event kind for an (unordered) class pair; `None` means the pair is not
/// tracked (e.g. table against fixture, both static).
fn classify(a: ComponentClass, b: ComponentClass) -> Option<CollisionKind> {
    use ComponentClass::*;
    let pair = if (a as u8) <= (b as u8) { (a, b) } else { (b, a) };
    match pair {
        (Tool, Stock) => Some(CollisionKind::ToolStock),
        (Holder, Stock) => Some(CollisionKind::ToolHolderStock),
        (Tool, Fixture) | (Tool, Table) | (Holder, Fixture) | (Holder, Table) => {
            Some(CollisionKind::ToolFixture)
        }
        (Spindle, _) | (_, Spindle) => Some(CollisionKind::SpindleContact),
        _ => None,
    }
}

/// Keep one event per (pair, kind): max depth for contacts, min remaining
/// distance for near-misses.
fn merge_event(
    best: &mut AHashMap<(usize, usize, CollisionKind), CollisionEvent>,
    key: (usize, usize, CollisionKind),
    event: CollisionEvent,
) {
    match best.get_mut(&key) {
        Some(existing) => {
            let replace = if event.kind == CollisionKind::NearMiss {
                event.depth < existing.depth
            } else {
                event.depth > existing.depth
            };
            if replace {
                *existing = event;
            }
        }
        None => {
            best.insert(key, event);
        }
    }
}
