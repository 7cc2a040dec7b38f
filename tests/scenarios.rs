// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! End-to-end simulation scenarios

use approx::assert_relative_eq;
use kerf::collision::CollisionConfig;
use kerf::{
    parse, CollisionKind, Dialect, MachineConfig, Severity, SimReport, Simulator, StockConfig,
    Tool, ToolTable, WcsTable,
};

/// 100×100 stock with its top face at the machine Z origin.
fn stock_top_zero() -> StockConfig {
    StockConfig {
        min: [-50.0, -50.0, -50.0],
        max: [50.0, 50.0, 0.0],
        ..StockConfig::default()
    }
}

fn tool_table() -> ToolTable {
    let mut tools = ToolTable::default();
    tools.insert(Tool::flat(1, 10.0, 40.0));
    tools
}

fn run(source: &str, wcs: &WcsTable) -> SimReport {
    let (motion, diags) = parse::load(source, &Dialect::fanuc(), wcs, false);
    let mut sim = Simulator::new(
        MachineConfig::default_3axis(),
        tool_table(),
        stock_top_zero(),
        CollisionConfig::default(),
    );
    sim.run(&motion, diags)
}

#[test]
fn simple_pocket_removes_expected_volume_without_critical_events() {
    // Serpentine pocket: rows 8mm apart with a D10 tool cover 50×50mm,
    // 5mm deep.
    let source = "\
T1 M6
G0 X-20 Y-20 Z5
G1 Z-5 F300
G1 X20 F600
G1 Y-12
G1 X-20
G1 Y-4
G1 X20
G1 Y4
G1 X-20
G1 Y12
G1 X20
G1 Y20
G1 X-20
G0 Z10
M30
";
    let report = run(source, &WcsTable::default());
    let expected = 50.0 * 50.0 * 5.0;
    let removed = report.metrics.removed_volume;
    assert!(
        (removed - expected).abs() / expected < 0.15,
        "removed {removed:.0} mm³, expected about {expected:.0} mm³"
    );
    assert_eq!(report.metrics.critical_events, 0);
    assert_relative_eq!(
        report.metrics.remaining_volume,
        report.metrics.total_volume - removed,
        epsilon = 1e-9
    );
}

#[test]
fn holder_crash_reports_critical_event_at_offending_block() {
    // Holder clearance is 30mm and the tool is 40mm long: plunging the tip
    // to Z-50 buries the holder bottom 10mm into the stock top.
    let source = "\
T1 M6
N1 G0 Z100
N2 G1 Z-50 F500
M30
";
    let report = run(source, &WcsTable::default());
    let crash = report
        .events
        .iter()
        .find(|e| e.kind == CollisionKind::ToolHolderStock)
        .expect("holder contact must be reported");
    assert_eq!(crash.block, 2);
    assert_eq!(crash.severity, Severity::Critical);
    assert!(crash.depth > 0.0);
    assert_relative_eq!(crash.depth, 10.0, epsilon = 0.5);
    assert!(report.metrics.critical_events >= 1);
}

#[test]
fn wcs_switch_shifts_machine_positions_by_offset_delta() {
    let mut wcs = WcsTable::default();
    wcs.set(1, 7.0, -3.0, 0.0);
    let source = "\
G0 X10 Y10 Z30
G55 G0 X10 Y10 Z30
M30
";
    let (motion, diags) = parse::load(source, &Dialect::fanuc(), &wcs, false);
    assert_eq!(diags.parse_errors(), 0);
    assert_eq!(motion.moves.len(), 2);
    let delta = motion.moves[1].end - motion.moves[0].end;
    assert_relative_eq!(delta.x, 7.0, epsilon = 1e-9);
    assert_relative_eq!(delta.y, -3.0, epsilon = 1e-9);
    assert_relative_eq!(delta.z, 0.0, epsilon = 1e-9);
}

#[test]
fn feed_move_above_stock_is_air_and_leaves_stock_untouched() {
    let source = "\
T1 M6
G0 X-30 Y0 Z20
G1 X30 F400
M30
";
    let report = run(source, &WcsTable::default());
    assert_eq!(report.metrics.removed_volume, 0.0);
    assert!(report
        .records
        .iter()
        .any(|r| r.class == kerf::CutClass::FeedAir));
    assert!(report.metrics.air_moves >= 1);
}

#[test]
fn replay_is_deterministic() {
    let source = "\
T1 M6
G0 X-20 Y0 Z5
G1 Z-4 F300
G2 X20 Y0 I20 J0 F600
G1 X-20
G0 Z10
M30
";
    let first = run(source, &WcsTable::default());
    let second = run(source, &WcsTable::default());

    assert_eq!(first.records.len(), second.records.len());
    assert_relative_eq!(
        first.metrics.removed_volume,
        second.metrics.removed_volume,
        epsilon = 1e-12
    );
    assert_eq!(first.events.len(), second.events.len());
    for (a, b) in first.events.iter().zip(&second.events) {
        assert_eq!(a.block, b.block);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.pair, b.pair);
        assert_relative_eq!(a.depth, b.depth, epsilon = 1e-12);
    }
    for (a, b) in first.records.iter().zip(&second.records) {
        assert_eq!(a.class, b.class);
        assert_relative_eq!(a.removed_volume, b.removed_volume, epsilon = 1e-12);
    }
}

#[test]
fn siemens_dialect_runs_with_r_parameters() {
    let mut tools = ToolTable::default();
    tools.insert(Tool::flat(1, 8.0, 35.0));
    let source = "\
T1 M6
R1 = -3
G0 X-15 Y0 Z5
G1 Z=R1 F300
G1 X15 F500
M30
";
    let (motion, diags) = parse::load(source, &Dialect::siemens(), &WcsTable::default(), false);
    assert_eq!(diags.parse_errors(), 0, "diagnostics: {:?}", diags.entries());
    let plunge = motion
        .moves
        .iter()
        .find(|m| m.end.z < 0.0)
        .expect("plunge move present");
    assert_relative_eq!(plunge.end.z, -3.0, epsilon = 1e-9);
}
