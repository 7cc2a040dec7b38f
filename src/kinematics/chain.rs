// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Forward kinematic chains
//!
//! Rigid-body transforms for the supported machine arrangements. All
//! rotations are built from the machine's pivot point; linear axis values
//! are the spindle reference position in machine coordinates. Rotary axes
//! are degrees: A tilts about +X, C rotates about +Z.

use crate::machine::{KinematicChainKind, MachineConfig};
use nalgebra::{Matrix4, Rotation3, Vector3};
use serde::Serialize;

/// One machine axis state: linear mm, rotary degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AxisPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub c: f64,
}

impl AxisPose {
    pub fn new(x: f64, y: f64, z: f64, a: f64, c: f64) -> Self {
        Self { x, y, z, a, c }
    }

    pub fn linear(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Linear interpolation of all five axes.
    pub fn lerp(&self, other: &AxisPose, t: f64) -> AxisPose {
        AxisPose {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
            a: self.a + (other.a - self.a) * t,
            c: self.c + (other.c - self.c) * t,
        }
    }
}

pub(crate) fn rot_x(degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), degrees.to_radians())
}

pub(crate) fn rot_z(degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians())
}

/// Forward kinematics for one machine configuration.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    pub kind: KinematicChainKind,
    /// Rotary pivot in machine coordinates.
    pub pivot: Vector3<f64>,
    /// Spindle gauge line to tool tip, before tool length.
    pub gauge_length: f64,
}

impl KinematicChain {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            kind: config.chain,
            pivot: config.pivot_point(),
            gauge_length: config.gauge_length,
        }
    }

    /// Pivot-to-tip vector at zero rotation, pointing down the spindle.
    fn tip_arm(&self, tool_length: f64) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -(self.gauge_length + tool_length))
    }

    /// Tool tip position in machine coordinates for an axis pose.
    ///
    /// With head rotation the tip swings about the pivot; the linear axes
    /// track the spindle reference, so at zero rotation the tip equals the
    /// programmed position.
    pub fn tip_machine(&self, pose: &AxisPose, tool_length: f64) -> Vector3<f64> {
        let arm = self.tip_arm(tool_length);
        let swing = match self.kind {
            KinematicChainKind::None3Axis | KinematicChainKind::TableTable => Vector3::zeros(),
            KinematicChainKind::HeadTable => rot_x(pose.a) * arm - arm,
            KinematicChainKind::HeadHead => rot_z(pose.c) * (rot_x(pose.a) * arm) - arm,
        };
        pose.linear() + swing
    }

    /// Tool axis direction in machine coordinates (unit, toward spindle).
    pub fn tool_axis_machine(&self, pose: &AxisPose) -> Vector3<f64> {
        match self.kind {
            KinematicChainKind::None3Axis | KinematicChainKind::TableTable => Vector3::z(),
            KinematicChainKind::HeadTable => rot_x(pose.a) * Vector3::z(),
            KinematicChainKind::HeadHead => rot_z(pose.c) * (rot_x(pose.a) * Vector3::z()),
        }
    }

    /// Machine-to-workpiece rotation for table chains (identity for head
    /// chains, where the stock never moves).
    pub fn machine_to_work(&self, pose: &AxisPose) -> Rotation3<f64> {
        match self.kind {
            KinematicChainKind::None3Axis | KinematicChainKind::HeadHead => {
                Rotation3::identity()
            }
            KinematicChainKind::HeadTable => rot_z(-pose.c),
            KinematicChainKind::TableTable => rot_z(-pose.c) * rot_x(-pose.a),
        }
    }

    /// Tool tip in workpiece coordinates.
    pub fn tip_work(&self, pose: &AxisPose, tool_length: f64) -> Vector3<f64> {
        let tip = self.tip_machine(pose, tool_length);
        self.machine_to_work(pose) * (tip - self.pivot) + self.pivot
    }

    /// Tool axis in workpiece coordinates.
    pub fn tool_axis_work(&self, pose: &AxisPose) -> Vector3<f64> {
        self.machine_to_work(pose) * self.tool_axis_machine(pose)
    }

    /// Homogeneous tool frame in machine coordinates: rotation of the tool
    /// assembly with its origin at the tool tip. Column Z is the tool axis.
    pub fn tool_frame(&self, pose: &AxisPose, tool_length: f64) -> Matrix4<f64> {
        let rotation = match self.kind {
            KinematicChainKind::None3Axis | KinematicChainKind::TableTable => {
                Rotation3::identity()
            }
            KinematicChainKind::HeadTable => rot_x(pose.a),
            KinematicChainKind::HeadHead => rot_z(pose.c) * rot_x(pose.a),
        };
        let tip = self.tip_machine(pose, tool_length);
        let mut m = rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&tip);
        m
    }

    /// Homogeneous workpiece frame in machine coordinates.
    pub fn work_frame(&self, pose: &AxisPose) -> Matrix4<f64> {
        let rotation = self.machine_to_work(pose).inverse();
        let mut m = rotation.to_homogeneous();
        let translation = self.pivot - rotation * self.pivot;
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn head_table() -> KinematicChain {
        KinematicChain::new(&MachineConfig::default_5axis())
    }

    #[test]
    fn test_three_axis_tip_is_programmed_position() {
        let chain = KinematicChain::new(&MachineConfig::default_3axis());
        let pose = AxisPose::new(10.0, -5.0, 3.0, 0.0, 0.0);
        assert_relative_eq!(chain.tip_machine(&pose, 50.0), pose.linear());
        assert_relative_eq!(chain.tool_axis_work(&pose), Vector3::z());
    }

    #[test]
    fn test_zero_rotation_is_identity_for_all_chains() {
        let mut config = MachineConfig::default_5axis();
        for kind in [
            KinematicChainKind::HeadHead,
            KinematicChainKind::HeadTable,
            KinematicChainKind::TableTable,
        ] {
            config.chain = kind;
            let chain = KinematicChain::new(&config);
            let pose = AxisPose::new(7.0, 8.0, 9.0, 0.0, 0.0);
            assert_relative_eq!(chain.tip_work(&pose, 40.0), pose.linear(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_head_tilt_swings_tip_about_pivot() {
        let chain = head_table();
        let length = 30.0;
        let pose = AxisPose::new(0.0, 0.0, 0.0, 90.0, 0.0);
        let tip = chain.tip_machine(&pose, length);
        // Arm length 150: tilting A+90 swings the tip from -Z toward +Y.
        assert_relative_eq!(tip.y, 150.0, epsilon = 1e-9);
        assert_relative_eq!(tip.z, 150.0, epsilon = 1e-9);
        let axis = chain.tool_axis_machine(&pose);
        assert_relative_eq!(axis, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_table_rotation_moves_work_frame() {
        let mut config = MachineConfig::default_5axis();
        config.pivot = [0.0, 0.0, 0.0];
        let chain = KinematicChain::new(&config);
        // C+90 table rotation: a machine point on +X appears on -Y in work
        // coordinates.
        let pose = AxisPose::new(10.0, 0.0, 0.0, 0.0, 90.0);
        let tip = chain.tip_work(&pose, 0.0);
        assert_relative_eq!(tip.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(tip.y, -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tool_frame_z_column_is_tool_axis() {
        let chain = head_table();
        let pose = AxisPose::new(1.0, 2.0, 3.0, 35.0, 0.0);
        let frame = chain.tool_frame(&pose, 25.0);
        let axis = chain.tool_axis_machine(&pose);
        for i in 0..3 {
            assert_relative_eq!(frame[(i, 2)], axis[i], epsilon = 1e-12);
        }
    }
}
