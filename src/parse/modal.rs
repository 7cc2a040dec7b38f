// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Modal groups and modal state
//!
//! One code per group is active at any point of program execution; state is
//! threaded through the resolver as a value, never a global, so multiple
//! programs can be resolved concurrently.

use nalgebra::Vector3;

/// Fanuc modal group classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalGroup {
    /// One-shot codes (G4, G10, G28, G53, ...).
    NonModal,
    /// G0/G1/G2/G3.
    Motion,
    /// G17/G18/G19.
    Plane,
    /// G90/G91.
    Distance,
    /// G93/G94/G95.
    Feed,
    /// G20/G21.
    Units,
    /// G40/G41/G42.
    CutterComp,
    /// G43/G44/G49.
    ToolLength,
    /// G98/G99.
    CannedReturn,
    /// G73..G89, G80.
    CannedCycle,
    /// G54..G59.
    Wcs,
    /// G52/G92.
    CoordSystem,
}

/// Modal group of a G-code, if known.
pub fn group_of(code: f64) -> Option<ModalGroup> {
    let whole = code.trunc() as i32;
    Some(match whole {
        4 | 9 | 10 | 28 | 30 | 53 => ModalGroup::NonModal,
        0..=3 => ModalGroup::Motion,
        17..=19 => ModalGroup::Plane,
        90 | 91 => ModalGroup::Distance,
        93..=95 => ModalGroup::Feed,
        20 | 21 => ModalGroup::Units,
        40..=42 => ModalGroup::CutterComp,
        43 | 44 | 49 => ModalGroup::ToolLength,
        98 | 99 => ModalGroup::CannedReturn,
        73 | 74 | 76 | 80..=89 => ModalGroup::CannedCycle,
        54..=59 => ModalGroup::Wcs,
        52 | 92 => ModalGroup::CoordSystem,
        _ => return None,
    })
}

/// Active interpolation plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Plane {
    Xy,
    Xz,
    Yz,
}

/// Full modal snapshot, mutated strictly in program order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalState {
    /// Active group-01 code (0..3).
    pub motion: i32,
    pub plane: Plane,
    /// G90 absolute vs G91 incremental.
    pub absolute: bool,
    /// G21 metric vs G20 inch.
    pub metric: bool,
    /// Active WCS slot (0 = G54).
    pub wcs: usize,
    /// G94 units/min vs G93 inverse time.
    pub feed_per_minute: bool,
    pub cutter_comp: i32,
    pub tool_length_comp: i32,
    /// G98 (initial level) vs G99 (R level) canned-cycle return.
    pub retract_to_initial: bool,
    /// Active group-10 cycle code, 80 = cancelled.
    pub canned_cycle: i32,
    /// Current position in work coordinates.
    pub position: Vector3<f64>,
    pub feed_rate: f64,
    pub spindle_rpm: f64,
    pub spindle_on: bool,
    pub tool: u32,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            motion: 1,
            plane: Plane::Xy,
            absolute: true,
            metric: true,
            wcs: 0,
            feed_per_minute: true,
            cutter_comp: 40,
            tool_length_comp: 49,
            retract_to_initial: true,
            canned_cycle: 80,
            position: Vector3::zeros(),
            feed_rate: 0.0,
            spindle_rpm: 0.0,
            spindle_on: false,
            tool: 0,
        }
    }
}

impl ModalState {
    /// Apply a non-motion modal G-code. Motion codes are handled by the
    /// resolver because they interact with axis words on the same line.
    pub fn apply_g(&mut self, code: f64) {
        let whole = code.trunc() as i32;
        match group_of(code) {
            Some(ModalGroup::Motion) => self.motion = whole,
            Some(ModalGroup::Plane) => {
                self.plane = match whole {
                    18 => Plane::Xz,
                    19 => Plane::Yz,
                    _ => Plane::Xy,
                }
            }
            Some(ModalGroup::Distance) => self.absolute = whole == 90,
            Some(ModalGroup::Units) => self.metric = whole == 21,
            Some(ModalGroup::Wcs) => self.wcs = (whole - 54).max(0) as usize,
            Some(ModalGroup::Feed) => self.feed_per_minute = whole != 93,
            Some(ModalGroup::CutterComp) => self.cutter_comp = whole,
            Some(ModalGroup::ToolLength) => self.tool_length_comp = whole,
            Some(ModalGroup::CannedReturn) => self.retract_to_initial = whole == 98,
            Some(ModalGroup::CannedCycle) => self.canned_cycle = whole,
            Some(ModalGroup::NonModal) | Some(ModalGroup::CoordSystem) | None => {}
        }
    }

    /// Scale factor from programmed units to millimeters.
    pub fn unit_scale(&self) -> f64 {
        if self.metric {
            1.0
        } else {
            25.4
        }
    }
}
