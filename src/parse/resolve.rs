// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Program resolution
//!
//! Walks a parsed [`Program`] with full modal state, variables and the
//! active work-offset table, and flattens it into a [`MotionProgram`]: a
//! linear list of machine-coordinate moves. Sub-programs are executed with
//! an explicit call stack, WHILE/GOTO loops are bounded, and every
//! recoverable problem lands in [`Diagnostics`] instead of aborting.
//!
//! The machine position is the canonical coordinate; work coordinates are
//! derived as `machine - active_offset`, so a WCS switch moves the work
//! frame and never the tool.

use crate::dialect::{Dialect, DuplicateModal};
use crate::error::{Diagnostic, Diagnostics, GeometryWarning, ParseError};
use crate::machine::WcsTable;
use crate::parse::ast::{Block, Control, Program};
use crate::parse::expr::{eval, VariableStore};
use crate::parse::modal::{group_of, ModalGroup, ModalState, Plane};
use ahash::AHashMap;
use nalgebra::Vector3;
use serde::Serialize;

/// Radius agreement tolerance for IJK arcs, mm.
const ARC_RADIUS_TOL: f64 = 1e-3;
/// Re-engage clearance above the previous peck bottom, mm.
const PECK_CLEARANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoveKind {
    Rapid,
    Linear,
    /// Clockwise arc when viewed along the plane normal (G2).
    CircularCw,
    /// Counter-clockwise arc (G3).
    CircularCcw,
}

/// One resolved machine motion.
///
/// Linear coordinates are absolute machine millimeters; rotary axes are
/// degrees. For arcs, `center` is set and a start equal to the end denotes
/// a full circle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Move {
    pub kind: MoveKind,
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,
    pub a_start: f64,
    pub a_end: f64,
    pub c_start: f64,
    pub c_end: f64,
    pub center: Option<Vector3<f64>>,
    pub plane: Plane,
    /// Effective feed in mm/min; 0 for rapids.
    pub feed: f64,
    /// 1-based source line.
    pub line: usize,
    /// Block identifier (N number, else source line).
    pub block: usize,
    /// Active WCS slot at emission (0 = G54).
    pub wcs: usize,
    pub tool: u32,
}

impl Move {
    pub fn is_rapid(&self) -> bool {
        self.kind == MoveKind::Rapid
    }

    pub fn is_arc(&self) -> bool {
        matches!(self.kind, MoveKind::CircularCw | MoveKind::CircularCcw)
    }

    /// Straight-line length of the linear component.
    pub fn linear_length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Path length: chord for linear moves, arc length (including helical
    /// pitch) for circular moves.
    pub fn path_length(&self) -> f64 {
        match self.center {
            Some(center) => {
                let (su, sv) = plane_uv(self.start - center, self.plane);
                let (eu, ev) = plane_uv(self.end - center, self.plane);
                let radius = (su * su + sv * sv).sqrt();
                let sweep = arc_sweep(su, sv, eu, ev, self.kind);
                let rise = plane_w(self.end - self.start, self.plane);
                ((radius * sweep).powi(2) + rise * rise).sqrt()
            }
            None => self.linear_length(),
        }
    }

    /// Total sweep angle in radians for arcs, 0 otherwise.
    pub fn arc_sweep(&self) -> f64 {
        match self.center {
            Some(center) => {
                let (su, sv) = plane_uv(self.start - center, self.plane);
                let (eu, ev) = plane_uv(self.end - center, self.plane);
                arc_sweep(su, sv, eu, ev, self.kind)
            }
            None => 0.0,
        }
    }
}

/// In-plane components of a vector for the given plane.
pub(crate) fn plane_uv(v: Vector3<f64>, plane: Plane) -> (f64, f64) {
    match plane {
        Plane::Xy => (v.x, v.y),
        // G18 is the ZX plane: arc direction is viewed along +Y.
        Plane::Xz => (v.z, v.x),
        Plane::Yz => (v.y, v.z),
    }
}

/// Out-of-plane component.
pub(crate) fn plane_w(v: Vector3<f64>, plane: Plane) -> f64 {
    match plane {
        Plane::Xy => v.z,
        Plane::Xz => v.y,
        Plane::Yz => v.x,
    }
}

/// Swept angle from start to end radius vectors, in (0, 2π]. Coincident
/// endpoints sweep a full circle.
fn arc_sweep(su: f64, sv: f64, eu: f64, ev: f64, kind: MoveKind) -> f64 {
    let start_angle = sv.atan2(su);
    let end_angle = ev.atan2(eu);
    let tau = std::f64::consts::TAU;
    let sweep = match kind {
        MoveKind::CircularCcw => (end_angle - start_angle).rem_euclid(tau),
        _ => (start_angle - end_angle).rem_euclid(tau),
    };
    if sweep < 1e-9 {
        tau
    } else {
        sweep
    }
}

/// The flattened result of resolving one program.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MotionProgram {
    pub moves: Vec<Move>,
}

impl MotionProgram {
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn total_path_length(&self) -> f64 {
        self.moves.iter().map(Move::path_length).sum()
    }
}

/// Resolve a parsed program into machine motion.
pub fn resolve(
    program: &Program,
    dialect: &Dialect,
    wcs_table: &WcsTable,
    block_skip_active: bool,
) -> (MotionProgram, Diagnostics) {
    let mut resolver = Resolver {
        program,
        dialect,
        wcs_table,
        block_skip_active,
        modal: ModalState::default(),
        vars: VariableStore::new(),
        machine_pos: Vector3::zeros(),
        a: 0.0,
        c: 0.0,
        pending_tool: 0,
        cycle: CycleState::default(),
        initial_z: 0.0,
        moves: Vec::new(),
        diags: Diagnostics::new(),
    };
    resolver.modal.position = -wcs_table.offset(0);
    resolver.run();
    (
        MotionProgram {
            moves: resolver.moves,
        },
        resolver.diags,
    )
}

/// Sticky canned-cycle data (Fanuc keeps R/Z/Q modal inside a cycle).
#[derive(Debug, Clone, Copy, Default)]
struct CycleState {
    r: Option<f64>,
    z: Option<f64>,
    q: Option<f64>,
}

struct Frame {
    unit: usize,
    pc: usize,
    repeats_left: u32,
}

enum Action {
    Continue,
    Jump(usize),
    Call { unit: usize, repeats: u32 },
    Return,
    End,
}

/// Evaluated words of one block, ready for modal application.
#[derive(Default)]
struct BlockWords {
    g: Vec<f64>,
    m: Vec<i32>,
    axis: AHashMap<char, (f64, bool)>,
}

impl BlockWords {
    fn axis_raw(&self, letter: char) -> Option<(f64, bool)> {
        self.axis.get(&letter).copied()
    }

    fn has_any(&self, letters: &[char]) -> bool {
        letters.iter().any(|l| self.axis.contains_key(l))
    }
}

struct Resolver<'a> {
    program: &'a Program,
    dialect: &'a Dialect,
    wcs_table: &'a WcsTable,
    block_skip_active: bool,
    modal: ModalState,
    vars: VariableStore,
    /// Canonical linear position, machine mm.
    machine_pos: Vector3<f64>,
    /// Rotary axes, degrees.
    a: f64,
    c: f64,
    pending_tool: u32,
    cycle: CycleState,
    /// Work-coordinate Z at canned-cycle entry (G98 return level).
    initial_z: f64,
    moves: Vec<Move>,
    diags: Diagnostics,
}

impl<'a> Resolver<'a> {
    fn run(&mut self) {
        if self.program.units.is_empty() {
            return;
        }
        let mut frames = vec![Frame {
            unit: 0,
            pc: 0,
            repeats_left: 1,
        }];
        // Backward-jump counters shared by WHILE and GOTO loops, keyed by
        // (unit, target pc).
        let mut jump_counts: AHashMap<(usize, usize), usize> = AHashMap::new();

        while let Some(frame) = frames.last() {
            let unit = frame.unit;
            let pc = frame.pc;

            if pc >= self.program.units[unit].blocks.len() {
                // Implicit return at end of a unit.
                self.pop_frame(&mut frames);
                continue;
            }
            let block = &self.program.units[unit].blocks[pc];
            frames.last_mut().unwrap().pc = pc + 1;

            let action = match self.exec_block(unit, pc, block) {
                Ok(action) => action,
                Err(err) => {
                    self.diags.parse_error(err);
                    Action::Continue
                }
            };

            match action {
                Action::Continue => {}
                Action::Jump(target) => {
                    if target <= pc {
                        let count = jump_counts.entry((unit, target)).or_insert(0);
                        *count += 1;
                        if *count > self.dialect.max_loop_iterations {
                            self.diags.parse_error(ParseError::LoopIterationLimit {
                                line: block.line,
                                limit: self.dialect.max_loop_iterations,
                            });
                            continue;
                        }
                    }
                    frames.last_mut().unwrap().pc = target;
                }
                Action::Call { unit: callee, repeats } => {
                    if frames.len() >= self.dialect.max_call_depth {
                        self.diags.parse_error(ParseError::CallDepthExceeded {
                            line: block.line,
                            depth: frames.len(),
                            limit: self.dialect.max_call_depth,
                        });
                        continue;
                    }
                    if frames.iter().any(|f| f.unit == callee) {
                        let number = self.program.units[callee].number.unwrap_or(0);
                        self.diags.parse_error(ParseError::RecursiveCall {
                            line: block.line,
                            program: number,
                        });
                        continue;
                    }
                    self.vars.push_scope();
                    frames.push(Frame {
                        unit: callee,
                        pc: 0,
                        repeats_left: repeats.max(1),
                    });
                }
                Action::Return => self.pop_frame(&mut frames),
                Action::End => break,
            }
        }
    }

    /// M99 or end-of-unit: rewind for a repeat, otherwise drop the frame.
    fn pop_frame(&mut self, frames: &mut Vec<Frame>) {
        if let Some(frame) = frames.last_mut() {
            if frame.repeats_left > 1 {
                frame.repeats_left -= 1;
                frame.pc = 0;
                return;
            }
        }
        if frames.len() > 1 {
            self.vars.pop_scope();
        }
        frames.pop();
    }

    fn exec_block(&mut self, unit: usize, pc: usize, block: &Block) -> Result<Action, ParseError> {
        if block.block_skip && self.block_skip_active {
            return Ok(Action::Continue);
        }

        for assignment in &block.assignments {
            let value = eval(&assignment.value, &self.vars, block.line)?;
            self.vars.set(assignment.index, value, block.line)?;
        }

        if let Some(control) = &block.control {
            return self.exec_control(unit, pc, block, control);
        }

        let words = self.collect_words(block)?;
        self.check_duplicate_modals(&words, block.line)?;

        // Feed/spindle/tool words take effect before any motion on the line.
        if let Some((value, integer)) = words.axis_raw('F') {
            self.modal.feed_rate = if self.modal.feed_per_minute {
                self.scale_linear(value, integer)
            } else {
                value
            };
        }
        if let Some((value, _)) = words.axis_raw('S') {
            self.modal.spindle_rpm = value;
        }
        if let Some((value, _)) = words.axis_raw('T') {
            self.pending_tool = value as u32;
        }

        let mut g53 = false;
        let mut g28 = false;
        for &code in &self.effective_g(&words) {
            let whole = code.trunc() as i32;
            match whole {
                53 => g53 = true,
                28 => g28 = true,
                4 | 9 | 30 => {}
                10 | 52 | 92 => self.warn(block.id(), format!("G{whole} is ignored")),
                80 => {
                    self.modal.apply_g(code);
                    self.cycle = CycleState::default();
                }
                _ => {
                    if group_of(code).is_none() {
                        self.warn(block.id(), format!("unsupported code G{code}"));
                        continue;
                    }
                    let prev_wcs = self.modal.wcs;
                    let prev_cycle = self.modal.canned_cycle;
                    self.modal.apply_g(code);
                    if self.modal.wcs != prev_wcs {
                        // Tool stays put; the work frame jumps.
                        self.modal.position =
                            self.machine_pos - self.wcs_table.offset(self.modal.wcs);
                    }
                    if self.modal.canned_cycle != 80 && prev_cycle == 80 {
                        self.initial_z = self.modal.position.z;
                    }
                }
            }
        }

        // Spindle and tool change before motion.
        let mut end = false;
        let mut call: Option<(u32, u32)> = None;
        let mut ret = false;
        for &m in &words.m {
            match m {
                3 | 4 => self.modal.spindle_on = true,
                5 => self.modal.spindle_on = false,
                6 => self.modal.tool = self.pending_tool,
                7 | 8 | 9 => {}
                98 => {
                    let program = match words.axis_raw('P') {
                        Some((p, _)) => p as u32,
                        None => {
                            return Err(ParseError::Syntax {
                                line: block.line,
                                message: "M98 requires a P program number".into(),
                            })
                        }
                    };
                    let repeats = words.axis_raw('L').map(|(l, _)| l as u32).unwrap_or(1);
                    call = Some((program, repeats));
                }
                99 => ret = true,
                0 | 1 => {}
                2 | 30 => end = true,
                other => self.warn(block.id(), format!("unsupported code M{other}")),
            }
        }

        if g28 {
            self.return_home(&words, block);
        } else if self.modal.canned_cycle != 80
            && words.has_any(&['X', 'Y', 'Z', 'R', 'Q'])
            && call.is_none()
        {
            self.run_cycle(&words, block)?;
        } else if words.has_any(&['X', 'Y', 'Z', 'A', 'C']) {
            self.run_motion(&words, g53, block)?;
        }

        if end {
            return Ok(Action::End);
        }
        if ret {
            return Ok(Action::Return);
        }
        if let Some((program, repeats)) = call {
            let callee = self.program.unit_by_number(program).ok_or(
                ParseError::UnknownSubProgram {
                    line: block.line,
                    program,
                },
            )?;
            return Ok(Action::Call {
                unit: callee,
                repeats,
            });
        }
        Ok(Action::Continue)
    }

    fn exec_control(
        &mut self,
        unit: usize,
        pc: usize,
        block: &Block,
        control: &Control,
    ) -> Result<Action, ParseError> {
        match control {
            Control::Goto { target } => self.jump_to_label(unit, block, *target),
            Control::IfGoto { cond, target } => {
                if eval(cond, &self.vars, block.line)? != 0.0 {
                    self.jump_to_label(unit, block, *target)
                } else {
                    Ok(Action::Continue)
                }
            }
            Control::WhileDo { cond, label } => {
                if eval(cond, &self.vars, block.line)? != 0.0 {
                    Ok(Action::Continue)
                } else {
                    let end = self.find_end_while(unit, pc + 1, *label).ok_or(
                        ParseError::Syntax {
                            line: block.line,
                            message: format!("WHILE DO {label} has no matching END"),
                        },
                    )?;
                    Ok(Action::Jump(end + 1))
                }
            }
            Control::EndWhile { label } => {
                let head = self
                    .find_while(unit, pc, *label)
                    .ok_or(ParseError::Syntax {
                        line: block.line,
                        message: format!("END {label} has no matching WHILE"),
                    })?;
                Ok(Action::Jump(head))
            }
            Control::Call { program, repeats } => {
                let callee = self.program.unit_by_number(*program).ok_or(
                    ParseError::UnknownSubProgram {
                        line: block.line,
                        program: *program,
                    },
                )?;
                Ok(Action::Call {
                    unit: callee,
                    repeats: *repeats,
                })
            }
        }
    }

    fn jump_to_label(&self, unit: usize, block: &Block, target: u32) -> Result<Action, ParseError> {
        self.program.units[unit]
            .blocks
            .iter()
            .position(|b| b.number == Some(target))
            .map(Action::Jump)
            .ok_or(ParseError::MissingGotoTarget {
                line: block.line,
                target,
            })
    }

    fn find_end_while(&self, unit: usize, from: usize, label: u32) -> Option<usize> {
        self.program.units[unit].blocks[from..]
            .iter()
            .position(|b| matches!(b.control, Some(Control::EndWhile { label: l }) if l == label))
            .map(|offset| from + offset)
    }

    fn find_while(&self, unit: usize, before: usize, label: u32) -> Option<usize> {
        self.program.units[unit].blocks[..before]
            .iter()
            .rposition(|b| matches!(b.control, Some(Control::WhileDo { label: l, .. }) if l == label))
    }

    fn collect_words(&self, block: &Block) -> Result<BlockWords, ParseError> {
        let mut words = BlockWords::default();
        for word in &block.words {
            let value = eval(&word.value, &self.vars, block.line)?;
            match word.letter {
                'G' => words.g.push(value),
                'M' => words.m.push(value.round() as i32),
                'N' | 'O' => {}
                letter => {
                    words
                        .axis
                        .insert(letter, (value, word.value.is_integer_literal()));
                }
            }
        }
        Ok(words)
    }

    fn check_duplicate_modals(&self, words: &BlockWords, line: usize) -> Result<(), ParseError> {
        let mut seen: AHashMap<ModalGroup, f64> = AHashMap::new();
        for &code in &words.g {
            let Some(group) = group_of(code) else { continue };
            if group == ModalGroup::NonModal {
                continue;
            }
            if let Some(&first) = seen.get(&group) {
                if first != code && self.dialect.duplicate_modal == DuplicateModal::Reject {
                    return Err(ParseError::ModalConflict {
                        line,
                        first,
                        second: code,
                    });
                }
            }
            seen.insert(group, code);
        }
        Ok(())
    }

    /// Last-wins collapse per modal group, preserving source order and all
    /// non-modal codes.
    fn effective_g(&self, words: &BlockWords) -> Vec<f64> {
        let mut last: AHashMap<ModalGroup, usize> = AHashMap::new();
        for (i, &code) in words.g.iter().enumerate() {
            if let Some(group) = group_of(code) {
                if group != ModalGroup::NonModal {
                    last.insert(group, i);
                }
            }
        }
        words
            .g
            .iter()
            .enumerate()
            .filter(|(i, code)| match group_of(**code) {
                Some(group) if group != ModalGroup::NonModal => last[&group] == *i,
                _ => true,
            })
            .map(|(_, &code)| code)
            .collect()
    }

    fn scale_linear(&self, value: f64, integer_literal: bool) -> f64 {
        let v = if integer_literal {
            value * self.dialect.integer_scale
        } else {
            value
        };
        v * self.modal.unit_scale()
    }

    fn scale_rotary(&self, value: f64, integer_literal: bool) -> f64 {
        if integer_literal {
            value * self.dialect.integer_scale
        } else {
            value
        }
    }

    fn offset(&self) -> Vector3<f64> {
        self.wcs_table.offset(self.modal.wcs)
    }

    /// Work-coordinate axis target honoring G90/G91 and value scaling.
    fn linear_target(&self, words: &BlockWords, letter: char, current: f64) -> f64 {
        match words.axis_raw(letter) {
            Some((value, integer)) => {
                let scaled = self.scale_linear(value, integer);
                if self.modal.absolute {
                    scaled
                } else {
                    current + scaled
                }
            }
            None => current,
        }
    }

    fn rotary_target(&self, words: &BlockWords, letter: char, current: f64) -> f64 {
        match words.axis_raw(letter) {
            Some((value, integer)) => {
                let scaled = self.scale_rotary(value, integer);
                if self.modal.absolute {
                    scaled
                } else {
                    current + scaled
                }
            }
            None => current,
        }
    }

    fn run_motion(&mut self, words: &BlockWords, g53: bool, block: &Block) -> Result<(), ParseError> {
        let work = self.modal.position;
        let a_end = self.rotary_target(words, 'A', self.a);
        let c_end = self.rotary_target(words, 'C', self.c);

        let end_machine = if g53 {
            // Machine-coordinate one-shot: absolute values, no offset.
            let mut target = self.machine_pos;
            for (letter, axis) in [('X', 0usize), ('Y', 1), ('Z', 2)] {
                if let Some((value, integer)) = words.axis_raw(letter) {
                    target[axis] = self.scale_linear(value, integer);
                }
            }
            target
        } else {
            Vector3::new(
                self.linear_target(words, 'X', work.x),
                self.linear_target(words, 'Y', work.y),
                self.linear_target(words, 'Z', work.z),
            ) + self.offset()
        };

        match self.modal.motion {
            0 => self.emit(MoveKind::Rapid, end_machine, a_end, c_end, None, 0.0, block),
            1 => {
                let feed = self.cutting_feed((end_machine - self.machine_pos).norm(), block);
                self.emit(MoveKind::Linear, end_machine, a_end, c_end, None, feed, block);
            }
            2 | 3 => {
                let kind = if self.modal.motion == 2 {
                    MoveKind::CircularCw
                } else {
                    MoveKind::CircularCcw
                };
                let center = self.arc_center(words, end_machine, kind, block)?;
                let feed = self.cutting_feed((end_machine - self.machine_pos).norm(), block);
                self.emit(kind, end_machine, a_end, c_end, Some(center), feed, block);
            }
            other => {
                self.warn(block.id(), format!("motion G{other} not supported"));
            }
        }
        Ok(())
    }

    /// Arc center in machine coordinates from IJK offsets or the R word.
    fn arc_center(
        &self,
        words: &BlockWords,
        end_machine: Vector3<f64>,
        kind: MoveKind,
        block: &Block,
    ) -> Result<Vector3<f64>, ParseError> {
        let start = self.machine_pos;
        let (iu, iv) = match self.modal.plane {
            Plane::Xy => (words.axis_raw('I'), words.axis_raw('J')),
            Plane::Xz => (words.axis_raw('I'), words.axis_raw('K')),
            Plane::Yz => (words.axis_raw('J'), words.axis_raw('K')),
        };

        if iu.is_some() || iv.is_some() {
            let du = iu.map(|(v, i)| self.scale_linear(v, i)).unwrap_or(0.0);
            let dv = iv.map(|(v, i)| self.scale_linear(v, i)).unwrap_or(0.0);
            let center = start + in_plane(du, dv, self.modal.plane);

            let (su, sv) = plane_uv(start - center, self.modal.plane);
            let (eu, ev) = plane_uv(end_machine - center, self.modal.plane);
            let r_start = (su * su + sv * sv).sqrt();
            let r_end = (eu * eu + ev * ev).sqrt();
            if r_start < ARC_RADIUS_TOL {
                return Err(ParseError::BadArc {
                    line: block.line,
                    message: "zero radius".into(),
                });
            }
            if (r_start - r_end).abs() > ARC_RADIUS_TOL {
                return Err(ParseError::BadArc {
                    line: block.line,
                    message: format!(
                        "start radius {r_start:.4} and end radius {r_end:.4} disagree"
                    ),
                });
            }
            return Ok(center);
        }

        if let Some((r_raw, integer)) = words.axis_raw('R') {
            let radius = self.scale_linear(r_raw, integer);
            let (dx, dy) = plane_uv(end_machine - start, self.modal.plane);
            let d2 = dx * dx + dy * dy;
            if d2 < ARC_RADIUS_TOL * ARC_RADIUS_TOL {
                return Err(ParseError::BadArc {
                    line: block.line,
                    message: "R-form arc with coincident endpoints".into(),
                });
            }
            let disc = 4.0 * radius * radius - d2;
            if disc < 0.0 {
                return Err(ParseError::BadArc {
                    line: block.line,
                    message: format!("radius {radius:.4} too small for chord"),
                });
            }
            // Positive R selects the minor arc, negative the major.
            let mut h = (disc.sqrt()) / d2.sqrt();
            if kind == MoveKind::CircularCw {
                h = -h;
            }
            if radius < 0.0 {
                h = -h;
            }
            let cu = (dx - h * dy) / 2.0;
            let cv = (dy + h * dx) / 2.0;
            return Ok(start + in_plane(cu, cv, self.modal.plane));
        }

        Err(ParseError::BadArc {
            line: block.line,
            message: "arc without center offsets or radius".into(),
        })
    }

    /// Canned-cycle expansion: rapid to XY, rapid to R, feed to depth,
    /// retract per G98/G99. G83 pecks in Q increments.
    fn run_cycle(&mut self, words: &BlockWords, block: &Block) -> Result<(), ParseError> {
        let cycle = self.modal.canned_cycle;
        if !matches!(cycle, 81 | 82 | 83) {
            self.warn(block.id(), format!("canned cycle G{cycle} not supported"));
            return Ok(());
        }

        let work = self.modal.position;
        if let Some((r_raw, integer)) = words.axis_raw('R') {
            let scaled = self.scale_linear(r_raw, integer);
            self.cycle.r = Some(if self.modal.absolute {
                scaled
            } else {
                work.z + scaled
            });
        }
        if let Some((z_raw, integer)) = words.axis_raw('Z') {
            let scaled = self.scale_linear(z_raw, integer);
            self.cycle.z = Some(if self.modal.absolute {
                scaled
            } else {
                // Incremental depth is relative to the R plane.
                self.cycle.r.unwrap_or(work.z) + scaled
            });
        }
        if let Some((q_raw, integer)) = words.axis_raw('Q') {
            self.cycle.q = Some(self.scale_linear(q_raw, integer).abs());
        }

        let (Some(r_plane), Some(depth)) = (self.cycle.r, self.cycle.z) else {
            self.warn(block.id(), "canned cycle needs R and Z".to_string());
            return Ok(());
        };
        if depth >= r_plane {
            self.warn(block.id(), "cycle depth is above the R plane".to_string());
            return Ok(());
        }

        let x = self.linear_target(words, 'X', work.x);
        let y = self.linear_target(words, 'Y', work.y);
        let offset = self.offset();
        let at = |z: f64| Vector3::new(x, y, z) + offset;

        // Position over the hole at the current level, then down to R.
        self.emit(MoveKind::Rapid, at(work.z), self.a, self.c, None, 0.0, block);
        self.emit(MoveKind::Rapid, at(r_plane), self.a, self.c, None, 0.0, block);

        let peck = match (cycle, self.cycle.q) {
            (83, Some(q)) if q > 0.0 => q,
            _ => r_plane - depth,
        };
        let mut bottom = r_plane;
        while bottom > depth {
            let next = (bottom - peck).max(depth);
            if bottom < r_plane {
                // Re-engage just above the previous bottom.
                let engage = (bottom + PECK_CLEARANCE).min(r_plane);
                self.emit(MoveKind::Rapid, at(engage), self.a, self.c, None, 0.0, block);
            }
            let feed = self.cutting_feed((bottom - next).abs(), block);
            self.emit(MoveKind::Linear, at(next), self.a, self.c, None, feed, block);
            bottom = next;
            if bottom > depth {
                self.emit(MoveKind::Rapid, at(r_plane), self.a, self.c, None, 0.0, block);
            }
        }

        let retract = if self.modal.retract_to_initial {
            self.initial_z.max(r_plane)
        } else {
            r_plane
        };
        self.emit(MoveKind::Rapid, at(retract), self.a, self.c, None, 0.0, block);
        Ok(())
    }

    /// G28: rapid through the optional intermediate point, then to machine
    /// zero.
    fn return_home(&mut self, words: &BlockWords, block: &Block) {
        let work = self.modal.position;
        if words.has_any(&['X', 'Y', 'Z']) {
            let via = Vector3::new(
                self.linear_target(words, 'X', work.x),
                self.linear_target(words, 'Y', work.y),
                self.linear_target(words, 'Z', work.z),
            ) + self.offset();
            self.emit(MoveKind::Rapid, via, self.a, self.c, None, 0.0, block);
        }
        self.emit(
            MoveKind::Rapid,
            Vector3::zeros(),
            self.a,
            self.c,
            None,
            0.0,
            block,
        );
    }

    /// Effective mm/min feed for a cutting move. G93 inverse time converts
    /// through the move length.
    fn cutting_feed(&mut self, distance: f64, block: &Block) -> f64 {
        let feed = if self.modal.feed_per_minute {
            self.modal.feed_rate
        } else {
            distance * self.modal.feed_rate
        };
        if feed <= 0.0 && distance > 1e-9 {
            self.warn(block.id(), "cutting move with no active feed".to_string());
        }
        feed
    }

    fn emit(
        &mut self,
        kind: MoveKind,
        end_machine: Vector3<f64>,
        a_end: f64,
        c_end: f64,
        center: Option<Vector3<f64>>,
        feed: f64,
        block: &Block,
    ) {
        let full_circle = center.is_some() && (end_machine - self.machine_pos).norm() < 1e-12;
        if !full_circle
            && (end_machine - self.machine_pos).norm() < 1e-12
            && (a_end - self.a).abs() < 1e-12
            && (c_end - self.c).abs() < 1e-12
        {
            return;
        }
        self.moves.push(Move {
            kind,
            start: self.machine_pos,
            end: end_machine,
            a_start: self.a,
            a_end,
            c_start: self.c,
            c_end,
            center,
            plane: self.modal.plane,
            feed,
            line: block.line,
            block: block.id(),
            wcs: self.modal.wcs,
            tool: self.modal.tool,
        });
        self.machine_pos = end_machine;
        self.a = a_end;
        self.c = c_end;
        self.modal.position = end_machine - self.offset();
    }

    fn warn(&mut self, block: usize, message: String) {
        self.diags
            .push(Diagnostic::Geometry(GeometryWarning { block, message }));
    }
}

fn in_plane(u: f64, v: f64, plane: Plane) -> Vector3<f64> {
    match plane {
        Plane::Xy => Vector3::new(u, v, 0.0),
        Plane::Xz => Vector3::new(v, 0.0, u),
        Plane::Yz => Vector3::new(0.0, u, v),
    }
}
