// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Inverse kinematics with rotation-around-tool-center-point
//!
//! Given a tool tip position and tool axis orientation in workpiece
//! coordinates, solve for the axis pose that realizes them. All supported
//! chains share the same structure: `A = ±acos(k_z)` gives a mirror pair of
//! tilt candidates and the in-plane angle of the orientation vector gives C
//! for each. Candidates outside the A travel range are discarded; among the
//! survivors the one closest to the previous pose wins, with C measured on
//! the shortest wrapped path. A vertical tool axis leaves C indeterminate:
//! the previous C is held and the solution is flagged singular.

use crate::error::KinematicError;
use crate::kinematics::chain::{rot_x, rot_z, AxisPose, KinematicChain};
use crate::machine::{AxisLimits, KinematicChainKind, MachineConfig};
use nalgebra::Vector3;

/// Orientation magnitude below which the direction is unusable.
const DIRECTION_EPS: f64 = 1e-9;
/// |sin A| below which C is indeterminate.
const SINGULAR_EPS: f64 = 1e-7;

/// One inverse solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSolution {
    pub pose: AxisPose,
    /// C was held at its previous value because the axis was vertical.
    pub singular: bool,
}

/// Wrap an angle delta to (-180, 180] degrees.
pub fn wrap_delta_deg(delta: f64) -> f64 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Inverse solver for one machine.
#[derive(Debug, Clone)]
pub struct RtcpSolver {
    chain: KinematicChain,
    a_limits: AxisLimits,
    c_limits: AxisLimits,
}

impl RtcpSolver {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            chain: KinematicChain::new(config),
            a_limits: config.a_limits,
            c_limits: config.c_limits,
        }
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    /// Solve for the axis pose reaching `tip_work` with the tool axis along
    /// `orientation` (workpiece coordinates, toward the spindle).
    pub fn solve(
        &self,
        tip_work: Vector3<f64>,
        orientation: Vector3<f64>,
        previous: &AxisPose,
        tool_length: f64,
        block: usize,
    ) -> Result<InverseSolution, KinematicError> {
        if self.chain.kind == KinematicChainKind::None3Axis {
            return Ok(InverseSolution {
                pose: AxisPose::new(tip_work.x, tip_work.y, tip_work.z, 0.0, 0.0),
                singular: false,
            });
        }

        let norm = orientation.norm();
        if norm < DIRECTION_EPS {
            return Err(KinematicError::DegenerateOrientation { block });
        }
        let dir = orientation / norm;

        let kz = dir.z.clamp(-1.0, 1.0);
        let tilt = kz.acos().to_degrees();
        let in_plane = (dir.x * dir.x + dir.y * dir.y).sqrt();

        if in_plane < SINGULAR_EPS {
            // Vertical axis: C indeterminate, hold it.
            let a = if kz >= 0.0 { 0.0 } else { 180.0 };
            let pose = self.place_linear(tip_work, a, previous.c, tool_length);
            return self.check_a(pose, true, block);
        }

        let phi = dir.y.atan2(dir.x).to_degrees();
        let mut best: Option<(f64, AxisPose)> = None;
        for a in [tilt, -tilt] {
            if !self.a_limits.contains(a) {
                continue;
            }
            let Some(c_raw) = self.c_for(a, phi) else { continue };
            let c = previous.c + wrap_delta_deg(c_raw - previous.c);
            if !self.c_limits.contains(c) {
                continue;
            }
            let pose = self.place_linear(tip_work, a, c, tool_length);
            let cost = (a - previous.a).abs() + (c - previous.c).abs();
            if best.map(|(b, _)| cost < b).unwrap_or(true) {
                best = Some((cost, pose));
            }
        }

        match best {
            Some((_, pose)) => Ok(InverseSolution {
                pose,
                singular: false,
            }),
            None => Err(KinematicError::NoSolution { block }),
        }
    }

    /// C angle that aligns the orientation's in-plane direction for a given
    /// tilt, per chain arrangement. `phi` is the in-plane angle of the
    /// workpiece-frame orientation, degrees.
    fn c_for(&self, a: f64, phi: f64) -> Option<f64> {
        // Reference in-plane angle of Rx(a)·ẑ is atan2(-sin a, 0).
        let tau = (-a.to_radians().sin()).atan2(0.0).to_degrees();
        match self.chain.kind {
            KinematicChainKind::None3Axis => None,
            // o_w = Rz(-c)·Rx(a)·ẑ: rotating by -c subtracts c from the angle.
            KinematicChainKind::HeadTable => Some(tau - phi),
            // o = Rz(c)·Rx(a)·ẑ: c adds to the reference angle.
            KinematicChainKind::HeadHead => Some(phi - tau),
            // o_w = Rz(-c)·Rx(-a)·ẑ, with Rx(-a)·ẑ at angle atan2(sin a, 0).
            KinematicChainKind::TableTable => {
                let tau = a.to_radians().sin().atan2(0.0).to_degrees();
                Some(tau - phi)
            }
        }
    }

    /// Linear axis values placing the tip at `tip_work` for fixed rotaries.
    fn place_linear(&self, tip_work: Vector3<f64>, a: f64, c: f64, tool_length: f64) -> AxisPose {
        let pivot = self.chain.pivot;
        let arm = Vector3::new(0.0, 0.0, -(self.chain.gauge_length + tool_length));
        match self.chain.kind {
            KinematicChainKind::None3Axis => {
                AxisPose::new(tip_work.x, tip_work.y, tip_work.z, 0.0, 0.0)
            }
            KinematicChainKind::HeadTable => {
                let tip_machine = rot_z(c) * (tip_work - pivot) + pivot;
                let swing = rot_x(a) * arm - arm;
                let linear = tip_machine - swing;
                AxisPose::new(linear.x, linear.y, linear.z, a, c)
            }
            KinematicChainKind::HeadHead => {
                let swing = rot_z(c) * (rot_x(a) * arm) - arm;
                let linear = tip_work - swing;
                AxisPose::new(linear.x, linear.y, linear.z, a, c)
            }
            KinematicChainKind::TableTable => {
                let tip_machine = rot_x(a) * (rot_z(c) * (tip_work - pivot)) + pivot;
                AxisPose::new(tip_machine.x, tip_machine.y, tip_machine.z, a, c)
            }
        }
    }

    fn check_a(
        &self,
        pose: AxisPose,
        singular: bool,
        block: usize,
    ) -> Result<InverseSolution, KinematicError> {
        if self.a_limits.contains(pose.a) {
            Ok(InverseSolution { pose, singular })
        } else {
            Err(KinematicError::NoSolution { block })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(kind: KinematicChainKind) -> RtcpSolver {
        let mut config = MachineConfig::default_5axis();
        config.chain = kind;
        config.pivot = [0.0, 0.0, -50.0];
        RtcpSolver::new(&config)
    }

    fn round_trip(kind: KinematicChainKind, tip: Vector3<f64>, dir: Vector3<f64>) {
        let solver = solver(kind);
        let previous = AxisPose::default();
        let sol = solver.solve(tip, dir, &previous, 30.0, 1).unwrap();
        let chain = solver.chain();
        let tip_back = chain.tip_work(&sol.pose, 30.0);
        let dir_back = chain.tool_axis_work(&sol.pose);
        assert_relative_eq!(tip_back, tip, epsilon = 1e-9);
        assert_relative_eq!(dir_back, dir.normalize(), epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_all_chains() {
        let tip = Vector3::new(25.0, -10.0, 5.0);
        let dir = Vector3::new(0.3, -0.2, 0.9);
        round_trip(KinematicChainKind::HeadTable, tip, dir);
        round_trip(KinematicChainKind::HeadHead, tip, dir);
        round_trip(KinematicChainKind::TableTable, tip, dir);
    }

    #[test]
    fn test_vertical_axis_holds_c_and_flags_singular() {
        let solver = solver(KinematicChainKind::HeadTable);
        let previous = AxisPose::new(0.0, 0.0, 0.0, 10.0, 77.0);
        let sol = solver
            .solve(Vector3::new(5.0, 5.0, 0.0), Vector3::z(), &previous, 30.0, 3)
            .unwrap();
        assert!(sol.singular);
        assert_relative_eq!(sol.pose.a, 0.0);
        assert_relative_eq!(sol.pose.c, 77.0);
    }

    #[test]
    fn test_mirror_candidate_prefers_continuity() {
        let solver = solver(KinematicChainKind::HeadTable);
        let dir = Vector3::new(0.0, -0.5, 0.86602540378).normalize();
        // Previous pose tilted negative: the -30 candidate should win.
        let previous = AxisPose::new(0.0, 0.0, 0.0, -25.0, 180.0);
        let sol = solver
            .solve(Vector3::zeros(), dir, &previous, 30.0, 1)
            .unwrap();
        assert!(sol.pose.a < 0.0, "picked a = {}", sol.pose.a);
        // And from a positive previous tilt, the +30 candidate wins.
        let previous = AxisPose::new(0.0, 0.0, 0.0, 25.0, 0.0);
        let sol = solver
            .solve(Vector3::zeros(), dir, &previous, 30.0, 1)
            .unwrap();
        assert!(sol.pose.a > 0.0);
    }

    #[test]
    fn test_c_takes_shortest_wrapped_path() {
        let solver = solver(KinematicChainKind::HeadTable);
        let dir = Vector3::new(0.5, 0.0, 0.86602540378).normalize();
        let previous = AxisPose::new(0.0, 0.0, 0.0, 20.0, 350.0);
        let sol = solver
            .solve(Vector3::zeros(), dir, &previous, 30.0, 1)
            .unwrap();
        // Never more than half a turn away from the previous C.
        assert!((sol.pose.c - previous.c).abs() <= 180.0 + 1e-9);
    }

    #[test]
    fn test_tilt_beyond_travel_is_no_solution() {
        let mut config = MachineConfig::default_5axis();
        config.a_limits = AxisLimits::new(-30.0, 30.0);
        let solver = RtcpSolver::new(&config);
        // 60 degrees off vertical: outside ±30.
        let dir = Vector3::new(0.0, -0.86602540378, 0.5);
        let result = solver.solve(Vector3::zeros(), dir, &AxisPose::default(), 30.0, 9);
        assert!(matches!(result, Err(KinematicError::NoSolution { block: 9 })));
    }

    #[test]
    fn test_zero_orientation_is_degenerate() {
        let solver = solver(KinematicChainKind::HeadTable);
        let result = solver.solve(
            Vector3::zeros(),
            Vector3::zeros(),
            &AxisPose::default(),
            30.0,
            4,
        );
        assert!(matches!(
            result,
            Err(KinematicError::DegenerateOrientation { block: 4 })
        ));
    }
}
