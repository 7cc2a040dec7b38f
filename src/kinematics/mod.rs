// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Machine kinematics
//!
//! [`chain`] holds the forward transforms for the supported arrangements;
//! [`rtcp`] inverts them with mirror-candidate selection and singularity
//! handling. Axis travel is validated here so motion planning and stock
//! removal can assume in-range poses.

pub mod chain;
pub mod rtcp;

pub use chain::{AxisPose, KinematicChain};
pub use rtcp::{wrap_delta_deg, InverseSolution, RtcpSolver};

use crate::error::LimitViolation;
use crate::machine::MachineConfig;

/// Check all five axes of a pose against the machine travel ranges.
pub fn check_pose_limits(
    config: &MachineConfig,
    pose: &AxisPose,
    block: usize,
) -> Vec<LimitViolation> {
    let mut out = config.check_linear_limits(&pose.linear(), block);
    if let Some(v) = config.a_limits.check('A', pose.a, block) {
        out.push(v);
    }
    if let Some(v) = config.c_limits.check('C', pose.c, block) {
        out.push(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_limits_cover_rotary_axes() {
        let config = MachineConfig::default_5axis();
        let ok = AxisPose::new(0.0, 0.0, 0.0, 90.0, 720.0);
        assert!(check_pose_limits(&config, &ok, 1).is_empty());

        let bad = AxisPose::new(0.0, 0.0, 0.0, 150.0, 0.0);
        let violations = check_pose_limits(&config, &bad, 2);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].axis, 'A');
    }
}
