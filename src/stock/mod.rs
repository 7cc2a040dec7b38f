// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Tri-dexel stock model
//!
//! The Z board is authoritative for volume accounting; optional X/Y boards
//! refine the lateral surface only. Removal is parallel across board rows
//! (disjoint columns per worker) and reduced in row order, so replaying a
//! motion program is bit-for-bit deterministic.
//!
//! Resolution is the accuracy/performance trade-off: features smaller than
//! one cell are invisible, and sweep cost scales with the column count
//! under the tool's bounding box.

pub mod board;
pub mod dexel;
pub mod sweep;

use crate::parse::resolve::{Move, MoveKind};
use crate::tool::Tool;
use board::{BoardAxis, DexelBoard};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::Serialize;
use sweep::{chord_move, line_tool_interval, VerticalSweep};

/// Removal below this volume counts as an air move (mm³).
const AIR_VOLUME_EPS: f64 = 1e-9;
/// Moves between prune passes over the boards.
const PRUNE_INTERVAL: usize = 64;

/// Stock setup.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct StockConfig {
    /// Box corner minima, machine mm.
    pub min: [f64; 3],
    pub max: [f64; 3],
    /// Dexel grid pitch (mm).
    pub resolution: f64,
    /// Arc chording tolerance (mm).
    pub chord_tolerance: f64,
    /// Maintain X/Y boards for lateral surface fidelity.
    pub secondary_boards: bool,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            min: [-50.0, -50.0, 0.0],
            max: [50.0, 50.0, 50.0],
            resolution: 2.0,
            chord_tolerance: 0.1,
            secondary_boards: false,
        }
    }
}

impl StockConfig {
    pub fn min_v(&self) -> Vector3<f64> {
        Vector3::from(self.min)
    }

    pub fn max_v(&self) -> Vector3<f64> {
        Vector3::from(self.max)
    }
}

/// Per-move cut classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CutClass {
    /// Rapid with no material contact.
    RapidAir,
    /// Cutting-mode move with no material contact.
    FeedAir,
    /// Downward cutting-mode move with no material contact yet.
    ApproachAir,
    /// Some visited columns held material, some did not.
    Partial,
    /// Every column under the sweep gave up material.
    Normal,
}

impl CutClass {
    pub fn is_air(&self) -> bool {
        matches!(self, CutClass::RapidAir | CutClass::FeedAir | CutClass::ApproachAir)
    }
}

/// Removal statistics for one move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveStats {
    pub class: CutClass,
    pub removed_volume: f64,
    pub columns_visited: usize,
    pub columns_cut: usize,
}

/// The stock under simulation.
#[derive(Debug, Clone)]
pub struct TriDexelStock {
    config: StockConfig,
    z_board: DexelBoard,
    x_board: Option<DexelBoard>,
    y_board: Option<DexelBoard>,
    initial_volume: f64,
    removed_volume: f64,
    moves_since_prune: usize,
}

impl TriDexelStock {
    pub fn new(config: StockConfig) -> Self {
        let min = config.min_v();
        let max = config.max_v();
        let z_board = DexelBoard::solid_box(BoardAxis::Z, min, max, config.resolution);
        let (x_board, y_board) = if config.secondary_boards {
            (
                Some(DexelBoard::solid_box(BoardAxis::X, min, max, config.resolution)),
                Some(DexelBoard::solid_box(BoardAxis::Y, min, max, config.resolution)),
            )
        } else {
            (None, None)
        };
        let initial_volume = z_board.volume();
        Self {
            config,
            z_board,
            x_board,
            y_board,
            initial_volume,
            removed_volume: 0.0,
            moves_since_prune: 0,
        }
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    pub fn initial_volume(&self) -> f64 {
        self.initial_volume
    }

    pub fn removed_volume(&self) -> f64 {
        self.removed_volume
    }

    /// Remaining = initial - removed, exactly, under the model's own
    /// arithmetic.
    pub fn remaining_volume(&self) -> f64 {
        self.initial_volume - self.removed_volume
    }

    pub fn removal_percent(&self) -> f64 {
        if self.initial_volume <= 0.0 {
            0.0
        } else {
            100.0 * self.removed_volume / self.initial_volume
        }
    }

    pub fn z_board(&self) -> &DexelBoard {
        &self.z_board
    }

    /// Current stock extent for collision geometry: configured footprint up
    /// to the highest remaining material.
    pub fn collision_box(&self) -> (Vector3<f64>, Vector3<f64>) {
        let min = self.config.min_v();
        let mut max = self.config.max_v();
        if let Some(top) = self.z_board.max_top() {
            max.z = top;
        }
        (min, max)
    }

    /// Top surface as a triangle height-field mesh.
    pub fn height_mesh(&self) -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
        self.z_board.height_mesh()
    }

    /// Restore the initial solid box.
    pub fn reset(&mut self) {
        self.z_board.reset();
        if let Some(board) = &mut self.x_board {
            board.reset();
        }
        if let Some(board) = &mut self.y_board {
            board.reset();
        }
        self.removed_volume = 0.0;
        self.moves_since_prune = 0;
    }

    /// Sweep one move's tool path through the stock and remove material.
    ///
    /// Parallel across board rows; each row owns its columns, results are
    /// reduced in row index order.
    pub fn cut(&mut self, mv: &Move, tool: &Tool) -> MoveStats {
        let max_step = self.config.resolution.max(self.config.chord_tolerance);
        let chords = chord_move(mv, self.config.chord_tolerance, max_step);
        let sweeps: Vec<VerticalSweep> =
            chords.iter().map(|c| VerticalSweep::new(tool, *c)).collect();

        // Union of swept bounds prunes the visited grid region.
        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        for sweep in &sweeps {
            let (smin, smax) = sweep.bounds();
            lo = lo.inf(&smin);
            hi = hi.sup(&smax);
        }

        let (us, vs) = self
            .z_board
            .cells_in_rect(lo.x, lo.y, hi.x, hi.y);
        let cell_area = self.z_board.cell_area();
        let (nu, _) = self.z_board.dims();
        let res = self.z_board.resolution();
        let origin_u = {
            let (u, _) = self.z_board.cell_center(0, 0);
            u - 0.5 * res
        };
        let origin_v = {
            let (_, v) = self.z_board.cell_center(0, 0);
            v - 0.5 * res
        };

        let per_row: Vec<(f64, usize, usize)> = self
            .z_board
            .columns_mut()
            .par_chunks_mut(nu)
            .enumerate()
            .map(|(iv, row)| {
                if !vs.contains(&iv) {
                    return (0.0, 0, 0);
                }
                let y = origin_v + (iv as f64 + 0.5) * res;
                let mut removed_h = 0.0;
                let mut visited = 0;
                let mut cut = 0;
                for iu in us.clone() {
                    let x = origin_u + (iu as f64 + 0.5) * res;
                    let mut touched = false;
                    let mut column_removed = 0.0;
                    for sweep in &sweeps {
                        if let Some((floor, top)) = sweep.column_interval(x, y) {
                            touched = true;
                            column_removed += row[iu].remove(floor, top);
                        }
                    }
                    if touched {
                        visited += 1;
                    }
                    if column_removed > 0.0 {
                        cut += 1;
                        removed_h += column_removed;
                    }
                }
                (removed_h, visited, cut)
            })
            .collect();

        // Sequential row-order reduction keeps the result deterministic.
        let mut removed_h = 0.0;
        let mut visited = 0;
        let mut cut = 0;
        for (h, v, c) in per_row {
            removed_h += h;
            visited += v;
            cut += c;
        }
        let removed_volume = removed_h * cell_area;
        self.removed_volume += removed_volume;

        if removed_volume > AIR_VOLUME_EPS {
            self.stamp_secondary(&chords, tool);
        }

        self.moves_since_prune += 1;
        if self.moves_since_prune >= PRUNE_INTERVAL {
            self.z_board.prune();
            if let Some(board) = &mut self.x_board {
                board.prune();
            }
            if let Some(board) = &mut self.y_board {
                board.prune();
            }
            self.moves_since_prune = 0;
        }

        let class = if removed_volume <= AIR_VOLUME_EPS {
            classify_air(mv)
        } else if cut == visited {
            CutClass::Normal
        } else {
            CutClass::Partial
        };

        MoveStats {
            class,
            removed_volume,
            columns_visited: visited,
            columns_cut: cut,
        }
    }

    /// Update the lateral boards from sampled tool poses. Surface fidelity
    /// only; never feeds volume accounting.
    fn stamp_secondary(&mut self, chords: &[sweep::Chord], tool: &Tool) {
        if self.x_board.is_none() && self.y_board.is_none() {
            return;
        }
        let step = self.config.resolution * 0.5;
        let mut samples = Vec::new();
        for chord in chords {
            let len = (chord.end - chord.start).norm();
            let n = ((len / step).ceil() as usize).max(1);
            for i in 0..=n {
                let t = i as f64 / n as f64;
                samples.push(chord.start + (chord.end - chord.start) * t);
            }
        }
        for board in [&mut self.x_board, &mut self.y_board]
            .into_iter()
            .flatten()
        {
            let dir = board.axis.direction();
            for tip in &samples {
                let r = tool.radius();
                let (u_lo, v_lo, _) = board.axis.split(*tip - Vector3::repeat(r));
                let (u_hi, v_hi, _) = board
                    .axis
                    .split(*tip + Vector3::new(r, r, r + tool.length));
                let (us, vs) = board.cells_in_rect(u_lo, v_lo, u_hi, v_hi);
                for iv in vs {
                    for iu in us.clone() {
                        let (u, v) = board.cell_center(iu, iv);
                        let origin = board.axis.assemble(u, v, 0.0);
                        if let Some((t0, t1)) =
                            line_tool_interval(origin, dir, tool, *tip, Vector3::z())
                        {
                            board.column_mut(iu, iv).remove(t0, t1);
                        }
                    }
                }
            }
        }
    }
}

fn classify_air(mv: &Move) -> CutClass {
    if mv.is_rapid() {
        return CutClass::RapidAir;
    }
    let delta = mv.end - mv.start;
    let lateral = (delta.x * delta.x + delta.y * delta.y).sqrt();
    if delta.z < 0.0 && -delta.z > lateral {
        CutClass::ApproachAir
    } else {
        CutClass::FeedAir
    }
}
