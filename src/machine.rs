// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Machine configuration
//!
//! Structured, read-only description of the machine under simulation: axis
//! limits, feed caps, kinematic chain type and geometry references. Loaded
//! from JSON and never mutated during a run.

use crate::error::LimitViolation;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Travel range of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub min: f64,
    pub max: f64,
}

impl AxisLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check a programmed value, producing a violation record on failure.
    pub fn check(&self, axis: char, value: f64, block: usize) -> Option<LimitViolation> {
        if self.contains(value) {
            None
        } else {
            Some(LimitViolation {
                block,
                axis,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            min: -9999.0,
            max: 9999.0,
        }
    }
}

/// Kinematic chain arrangement of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KinematicChainKind {
    /// Plain 3-axis machine, no rotary axes.
    None3Axis,
    /// Both rotary axes in the spindle head.
    HeadHead,
    /// Tilting head (A) over a rotary table (C).
    HeadTable,
    /// Tilt/rotary table, fixed spindle.
    TableTable,
}

/// Collision role of a named machine component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentClass {
    Tool,
    Holder,
    Spindle,
    Stock,
    Fixture,
    Table,
}

/// Geometric primitive referenced by a machine component entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentGeometry {
    /// Axis-aligned box given as full extents.
    Box { size: [f64; 3] },
    /// Cylinder along +Z from the component origin.
    Cylinder { radius: f64, height: f64 },
    /// Sphere at the component origin.
    Sphere { radius: f64 },
}

/// A named rigid component of the machine assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineComponent {
    pub name: String,
    pub class: ComponentClass,
    pub geometry: ComponentGeometry,
    /// Offset of the component origin in its parent frame (mm).
    pub offset: [f64; 3],
}

/// Read-only machine description consumed for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    pub x_limits: AxisLimits,
    pub y_limits: AxisLimits,
    pub z_limits: AxisLimits,
    /// Rotary axis ranges in degrees. Unused for 3-axis chains.
    pub a_limits: AxisLimits,
    pub c_limits: AxisLimits,
    /// Rapid traverse rate cap (mm/min).
    pub max_rapid_feed: f64,
    /// Cutting feed rate cap (mm/min).
    pub max_cutting_feed: f64,
    pub chain: KinematicChainKind,
    /// Rotary pivot point in machine coordinates (mm).
    pub pivot: [f64; 3],
    /// Spindle gauge line to tool tip distance (mm), before tool length.
    pub gauge_length: f64,
    /// Clearance from spindle nose to holder bottom (mm).
    pub holder_clearance: f64,
    pub components: Vec<MachineComponent>,
}

impl MachineConfig {
    /// Default 3-axis mill, matching common hobby-VMC travel.
    pub fn default_3axis() -> Self {
        Self {
            name: "Default 3-Axis Mill".into(),
            x_limits: AxisLimits::new(-500.0, 500.0),
            y_limits: AxisLimits::new(-300.0, 300.0),
            z_limits: AxisLimits::new(-200.0, 200.0),
            a_limits: AxisLimits::new(-120.0, 120.0),
            c_limits: AxisLimits::new(-99999.0, 99999.0),
            max_rapid_feed: 10_000.0,
            max_cutting_feed: 5_000.0,
            chain: KinematicChainKind::None3Axis,
            pivot: [0.0, 0.0, 0.0],
            gauge_length: 0.0,
            holder_clearance: 30.0,
            components: Vec::new(),
        }
    }

    /// Head-table 5-axis variant of the default machine.
    pub fn default_5axis() -> Self {
        Self {
            name: "Default 5-Axis Mill (head-table)".into(),
            chain: KinematicChainKind::HeadTable,
            pivot: [0.0, 0.0, -50.0],
            gauge_length: 120.0,
            ..Self::default_3axis()
        }
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn pivot_point(&self) -> Vector3<f64> {
        Vector3::new(self.pivot[0], self.pivot[1], self.pivot[2])
    }

    /// Check all linear axes for a programmed machine position.
    pub fn check_linear_limits(&self, pos: &Vector3<f64>, block: usize) -> Vec<LimitViolation> {
        let mut out = Vec::new();
        if let Some(v) = self.x_limits.check('X', pos.x, block) {
            out.push(v);
        }
        if let Some(v) = self.y_limits.check('Y', pos.y, block) {
            out.push(v);
        }
        if let Some(v) = self.z_limits.check('Z', pos.z, block) {
            out.push(v);
        }
        out
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::default_3axis()
    }
}

/// Work coordinate offset table (G54 is index 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WcsTable {
    pub offsets: Vec<[f64; 3]>,
}

impl WcsTable {
    pub fn with_slots(n: usize) -> Self {
        Self {
            offsets: vec![[0.0; 3]; n.max(6)],
        }
    }

    pub fn set(&mut self, index: usize, x: f64, y: f64, z: f64) {
        if index < self.offsets.len() {
            self.offsets[index] = [x, y, z];
        }
    }

    pub fn offset(&self, index: usize) -> Vector3<f64> {
        let o = self.offsets.get(index).copied().unwrap_or([0.0; 3]);
        Vector3::new(o[0], o[1], o[2])
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl Default for WcsTable {
    fn default() -> Self {
        Self::with_slots(6)
    }
}
