// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Kerf — CNC digital-twin simulation core
//!
//! Turns a numeric-control program into a verified, time-ordered motion
//! program and simulates it against a virtual machine and workpiece:
//!
//! - [`parse`]: multi-dialect G-code front end with modal-state resolution,
//!   sub-programs and canned cycles;
//! - [`kinematics`]: forward/inverse chains with RTCP compensation;
//! - [`stock`]: tri-dexel material removal with per-move statistics;
//! - [`collision`]: broad/narrow-phase detection with CCD for rapids;
//! - [`sim`]: the move-ordered runner tying it all together.
//!
//! The core never renders, formats or applies policy; it reports, and the
//! caller decides.

pub mod collision;
pub mod dialect;
pub mod error;
pub mod kinematics;
pub mod machine;
pub mod parse;
pub mod sim;
pub mod stock;
pub mod tool;

pub use collision::{CollisionConfig, CollisionEvent, CollisionKind, Severity};
pub use dialect::Dialect;
pub use error::{Diagnostic, Diagnostics, KinematicError, LimitViolation, ParseError};
pub use machine::{KinematicChainKind, MachineConfig, WcsTable};
pub use parse::{MotionProgram, Move, MoveKind};
pub use sim::{SimMetrics, SimReport, Simulator};
pub use stock::{CutClass, StockConfig, TriDexelStock};
pub use tool::{Tool, ToolTable};

/// Parse, resolve and simulate a program in one call.
pub fn simulate(
    source: &str,
    dialect: &Dialect,
    machine: MachineConfig,
    tools: ToolTable,
    wcs_table: &WcsTable,
    stock_config: StockConfig,
) -> SimReport {
    let (motion, diags) = parse::load(source, dialect, wcs_table, false);
    let mut simulator = Simulator::new(machine, tools, stock_config, CollisionConfig::default());
    simulator.run(&motion, diags)
}
