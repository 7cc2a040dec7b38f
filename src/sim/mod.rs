// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Move-ordered simulation runner
//!
//! Drives the resolved motion program through the stock model and the
//! collision pipeline in strict program order: removal and collision state
//! are path-dependent, so moves never run concurrently with each other.
//! The runner checks cancellation between moves only, leaving the stock
//! and the event log in the state of the last fully completed move.

use crate::collision::{Aabb, CollisionConfig, CollisionEvent, CollisionPipeline, Severity};
use crate::error::{Diagnostic, Diagnostics, GeometryWarning};
use crate::kinematics::{check_pose_limits, AxisPose, KinematicChain};
use crate::machine::{KinematicChainKind, MachineConfig};
use crate::parse::resolve::{MotionProgram, Move, MoveKind};
use crate::stock::{CutClass, StockConfig, TriDexelStock};
use crate::tool::{Tool, ToolTable};
use ahash::AHashSet;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fallback geometry when a program calls a tool the table does not hold.
const DEFAULT_TOOL_DIAMETER: f64 = 10.0;
const DEFAULT_TOOL_LENGTH: f64 = 50.0;

/// Per-move outcome.
#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub block: usize,
    pub line: usize,
    pub kind: MoveKind,
    pub end: [f64; 3],
    pub a: f64,
    pub c: f64,
    pub class: CutClass,
    pub removed_volume: f64,
    /// Estimated duration in seconds at the effective (capped) feed.
    pub duration_s: f64,
    pub limit_violations: usize,
}

/// Cumulative run metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimMetrics {
    pub total_volume: f64,
    pub removed_volume: f64,
    pub remaining_volume: f64,
    pub removal_percent: f64,
    pub moves: usize,
    pub air_moves: usize,
    pub cut_time_s: f64,
    pub rapid_time_s: f64,
    pub critical_events: usize,
}

/// Everything a run produces. The core never renders or formats this.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub records: Vec<MoveRecord>,
    pub events: Vec<CollisionEvent>,
    pub metrics: SimMetrics,
    pub diagnostics: Diagnostics,
    /// True when the run was cancelled before the last move.
    pub cancelled: bool,
}

/// Owns the mutable simulation state for one run at a time.
pub struct Simulator {
    machine: MachineConfig,
    chain: KinematicChain,
    tools: ToolTable,
    stock: TriDexelStock,
    pipeline: CollisionPipeline,
    cancel: Arc<AtomicBool>,
}

impl Simulator {
    pub fn new(
        machine: MachineConfig,
        tools: ToolTable,
        stock_config: StockConfig,
        collision_config: CollisionConfig,
    ) -> Self {
        let chain = KinematicChain::new(&machine);
        let stock = TriDexelStock::new(stock_config);
        let (min, max) = stock.collision_box();
        let pipeline = CollisionPipeline::new(&machine, Aabb::new(min, max), collision_config);
        Self {
            machine,
            chain,
            tools,
            stock,
            pipeline,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stock(&self) -> &TriDexelStock {
        &self.stock
    }

    pub fn machine(&self) -> &MachineConfig {
        &self.machine
    }

    /// Shared flag a caller may set from another thread to stop the run
    /// after the current move.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Restore the stock and collision scene for a fresh run.
    pub fn reset(&mut self) {
        self.stock.reset();
        let (min, max) = self.stock.collision_box();
        self.pipeline.update_stock_bounds(Aabb::new(min, max));
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Run a resolved program to completion (or cancellation), folding the
    /// parse-stage diagnostics into the report.
    pub fn run(&mut self, program: &MotionProgram, parse_diags: Diagnostics) -> SimReport {
        let mut diagnostics = parse_diags;
        let mut records = Vec::with_capacity(program.len());
        let mut events: Vec<CollisionEvent> = Vec::new();
        let mut missing_tools: AHashSet<u32> = AHashSet::new();
        let mut metrics = SimMetrics {
            total_volume: self.stock.initial_volume(),
            ..SimMetrics::default()
        };
        let mut cancelled = false;

        for mv in &program.moves {
            if self.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let pose = AxisPose::new(mv.end.x, mv.end.y, mv.end.z, mv.a_end, mv.c_end);
            let violations = check_pose_limits(&self.machine, &pose, mv.block);
            let violation_count = violations.len();
            for v in violations {
                diagnostics.push(Diagnostic::Limit(v));
            }

            let tool = self.lookup_tool(mv, &mut missing_tools, &mut diagnostics);

            // Collisions are evaluated against the stock as it stood when
            // the move began.
            let mut move_events = self
                .pipeline
                .check_move(mv, &tool, &self.machine, &self.chain);
            metrics.critical_events += move_events
                .iter()
                .filter(|e| e.severity == Severity::Critical)
                .count();
            events.append(&mut move_events);

            let cut_mv = self.work_frame_move(mv);
            let stats = self.stock.cut(&cut_mv, &tool);
            let (min, max) = self.stock.collision_box();
            self.pipeline.update_stock_bounds(Aabb::new(min, max));

            let duration_s = self.move_duration_s(mv);
            if mv.is_rapid() {
                metrics.rapid_time_s += duration_s;
            } else {
                metrics.cut_time_s += duration_s;
            }
            if stats.class.is_air() {
                metrics.air_moves += 1;
            }

            records.push(MoveRecord {
                block: mv.block,
                line: mv.line,
                kind: mv.kind,
                end: [mv.end.x, mv.end.y, mv.end.z],
                a: mv.a_end,
                c: mv.c_end,
                class: stats.class,
                removed_volume: stats.removed_volume,
                duration_s,
                limit_violations: violation_count,
            });
        }

        metrics.moves = records.len();
        metrics.removed_volume = self.stock.removed_volume();
        metrics.remaining_volume = self.stock.remaining_volume();
        metrics.removal_percent = self.stock.removal_percent();

        SimReport {
            records,
            events,
            metrics,
            diagnostics,
            cancelled,
        }
    }

    fn lookup_tool(
        &self,
        mv: &Move,
        missing: &mut AHashSet<u32>,
        diagnostics: &mut Diagnostics,
    ) -> Tool {
        match self.tools.get(mv.tool) {
            Some(tool) => tool.clone(),
            None => {
                if missing.insert(mv.tool) {
                    diagnostics.push(Diagnostic::Geometry(GeometryWarning {
                        block: mv.block,
                        message: format!(
                            "tool T{} not in tool table, using default geometry",
                            mv.tool
                        ),
                    }));
                }
                Tool::flat(mv.tool, DEFAULT_TOOL_DIAMETER, DEFAULT_TOOL_LENGTH)
            }
        }
    }

    /// Stock removal happens in the workpiece frame. For table chains the
    /// work frame rotates with the rotary axes, so the move's machine
    /// coordinates are rotated about the pivot before sweeping.
    fn work_frame_move(&self, mv: &Move) -> Move {
        match self.chain.kind {
            KinematicChainKind::None3Axis | KinematicChainKind::HeadHead => mv.clone(),
            _ => {
                let start_pose =
                    AxisPose::new(mv.start.x, mv.start.y, mv.start.z, mv.a_start, mv.c_start);
                let end_pose = AxisPose::new(mv.end.x, mv.end.y, mv.end.z, mv.a_end, mv.c_end);
                let pivot = self.chain.pivot;
                let to_work = |p: nalgebra::Vector3<f64>, pose: &AxisPose| {
                    self.chain.machine_to_work(pose) * (p - pivot) + pivot
                };
                let mut out = mv.clone();
                out.start = to_work(mv.start, &start_pose);
                out.end = to_work(mv.end, &end_pose);
                // Arc centers follow the start-of-move table attitude.
                out.center = mv.center.map(|c| to_work(c, &start_pose));
                out
            }
        }
    }

    /// Path length over the effective (capped) feed, in seconds.
    fn move_duration_s(&self, mv: &Move) -> f64 {
        let length = mv.path_length();
        if length <= 0.0 {
            return 0.0;
        }
        let feed = if mv.is_rapid() {
            self.machine.max_rapid_feed
        } else {
            mv.feed.min(self.machine.max_cutting_feed)
        };
        if feed <= 0.0 {
            0.0
        } else {
            length / feed * 60.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::machine::WcsTable;
    use crate::parse;
    use approx::assert_relative_eq;

    fn load(source: &str) -> (MotionProgram, Diagnostics) {
        parse::load(source, &Dialect::fanuc(), &WcsTable::default(), false)
    }

    /// Stock top at the machine origin plane so the initial position is
    /// not buried in material.
    fn test_stock() -> StockConfig {
        StockConfig {
            min: [-50.0, -50.0, -50.0],
            max: [50.0, 50.0, 0.0],
            ..StockConfig::default()
        }
    }

    fn simulator() -> Simulator {
        let mut tools = ToolTable::default();
        tools.insert(Tool::flat(1, 10.0, 40.0));
        Simulator::new(
            MachineConfig::default_3axis(),
            tools,
            test_stock(),
            CollisionConfig::default(),
        )
    }

    #[test]
    fn test_simple_slot_removes_material() {
        let mut sim = simulator();
        let (motion, diags) = load(
            "T1 M6\n\
             G0 X-20 Y0 Z5\n\
             G1 Z-2 F600\n\
             G1 X20 F800\n\
             G0 Z10\n\
             M30\n",
        );
        let report = sim.run(&motion, diags);
        assert!(report.metrics.removed_volume > 0.0);
        assert_relative_eq!(
            report.metrics.remaining_volume,
            report.metrics.total_volume - report.metrics.removed_volume,
            epsilon = 1e-9
        );
        let cut = report
            .records
            .iter()
            .find(|r| r.end == [20.0, 0.0, -2.0])
            .unwrap();
        assert!(!cut.class.is_air());
        assert!(cut.removed_volume > 0.0);
    }

    #[test]
    fn test_air_move_leaves_stock_untouched() {
        let mut sim = simulator();
        let (motion, diags) = load("T1 M6\nG0 X0 Y0 Z30\nG1 X30 F500\nM30\n");
        let report = sim.run(&motion, diags);
        assert_eq!(report.metrics.removed_volume, 0.0);
        let feed = report
            .records
            .iter()
            .find(|r| r.kind == MoveKind::Linear)
            .unwrap();
        assert_eq!(feed.class, CutClass::FeedAir);
        assert!(report.metrics.air_moves >= 1);
    }

    #[test]
    fn test_time_estimate_uses_capped_feed() {
        let mut sim = simulator();
        // 120mm at F1000 -> 7.2s; rapids at the 10000 machine cap.
        let (motion, diags) = load("G0 X0 Y0 Z30\nG1 X120 F1000\nM30\n");
        let report = sim.run(&motion, diags);
        let cut: f64 = report
            .records
            .iter()
            .filter(|r| r.kind == MoveKind::Linear)
            .map(|r| r.duration_s)
            .sum();
        assert_relative_eq!(cut, 7.2, epsilon = 1e-9);
        assert!(report.metrics.rapid_time_s > 0.0);
    }

    #[test]
    fn test_limit_violation_reported_not_clamped() {
        let mut sim = simulator();
        let (motion, diags) = load("G0 X900 Z30\nM30\n");
        let report = sim.run(&motion, diags);
        assert_eq!(report.records[0].limit_violations, 1);
        assert!(report
            .diagnostics
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::Limit(_))));
        // The recorded end position is the programmed one.
        assert_relative_eq!(report.records[0].end[0], 900.0);
    }

    #[test]
    fn test_cancellation_stops_between_moves() {
        let mut sim = simulator();
        sim.cancel_handle().store(true, Ordering::Relaxed);
        let (motion, diags) = load("G0 X10 Z30\nG1 X20 F500\nM30\n");
        let report = sim.run(&motion, diags);
        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(sim.stock().removed_volume(), 0.0);
    }

    #[test]
    fn test_replay_after_reset_is_identical() {
        let mut sim = simulator();
        let source = "T1 M6\nG0 X-15 Y-15 Z5\nG1 Z-3 F600\nG1 X15 F800\nG1 Y15\nG0 Z10\nM30\n";
        let (motion, diags) = load(source);
        let first = sim.run(&motion, diags.clone());
        sim.reset();
        let second = sim.run(&motion, diags);
        assert_relative_eq!(
            first.metrics.removed_volume,
            second.metrics.removed_volume,
            epsilon = 1e-12
        );
        assert_eq!(first.events.len(), second.events.len());
        for (a, b) in first.records.iter().zip(&second.records) {
            assert_eq!(a.class, b.class);
            assert_relative_eq!(a.removed_volume, b.removed_volume, epsilon = 1e-12);
        }
    }
}
