// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Error taxonomy and run diagnostics
//!
//! A simulation run never aborts on a single bad block or move: parse,
//! kinematic, limit and numeric problems are accumulated in [`Diagnostics`]
//! and the run completes. Final disposition is the caller's policy.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while parsing or resolving a program.
///
/// Fatal to the enclosing block only; resolution continues at the next block
/// where the dialect permits.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ParseError {
    #[error("L{line}: syntax error: {message}")]
    Syntax { line: usize, message: String },

    #[error("L{line}: malformed word '{word}'")]
    MalformedWord { line: usize, word: String },

    #[error("L{line}: G{first} and G{second} are in the same modal group")]
    ModalConflict { line: usize, first: f64, second: f64 },

    #[error("L{line}: bad expression: {message}")]
    BadExpression { line: usize, message: String },

    #[error("L{line}: call to unknown sub-program O{program}")]
    UnknownSubProgram { line: usize, program: u32 },

    #[error("L{line}: call stack depth {depth} exceeds limit {limit}")]
    CallDepthExceeded {
        line: usize,
        depth: usize,
        limit: usize,
    },

    #[error("L{line}: recursive inclusion of sub-program O{program}")]
    RecursiveCall { line: usize, program: u32 },

    #[error("L{line}: GOTO target N{target} not found")]
    MissingGotoTarget { line: usize, target: u32 },

    #[error("L{line}: WHILE loop exceeded {limit} iterations")]
    LoopIterationLimit { line: usize, limit: usize },

    #[error("L{line}: arc geometry is inconsistent: {message}")]
    BadArc { line: usize, message: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::MalformedWord { line, .. }
            | ParseError::ModalConflict { line, .. }
            | ParseError::BadExpression { line, .. }
            | ParseError::UnknownSubProgram { line, .. }
            | ParseError::CallDepthExceeded { line, .. }
            | ParseError::RecursiveCall { line, .. }
            | ParseError::MissingGotoTarget { line, .. }
            | ParseError::LoopIterationLimit { line, .. }
            | ParseError::BadArc { line, .. } => *line,
        }
    }
}

/// Kinematic resolution failures. Non-fatal to the run: the offending move
/// keeps the previous axis state and simulation continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum KinematicError {
    #[error("block {block}: no inverse solution within axis limits")]
    NoSolution { block: usize },

    #[error("block {block}: tool orientation is not a usable direction")]
    DegenerateOrientation { block: usize },
}

/// A programmed position outside the configured axis range.
///
/// Always reported, never silently clamped.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("block {block}: {axis} = {value:.3} outside [{min:.3}, {max:.3}]")]
pub struct LimitViolation {
    pub block: usize,
    pub axis: char,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Local numeric/geometric trouble recovered by clamping or skipping the
/// affected element.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("block {block}: {message}")]
pub struct GeometryWarning {
    pub block: usize,
    pub message: String,
}

/// One accumulated diagnostic from a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    Parse(ParseError),
    Kinematic(KinematicError),
    Limit(LimitViolation),
    Geometry(GeometryWarning),
    /// Rotary solution was degenerate; secondary axis held at its previous
    /// value.
    Singular { block: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Parse(e) => write!(f, "parse: {e}"),
            Diagnostic::Kinematic(e) => write!(f, "kinematics: {e}"),
            Diagnostic::Limit(e) => write!(f, "limit: {e}"),
            Diagnostic::Geometry(e) => write!(f, "geometry: {e}"),
            Diagnostic::Singular { block } => {
                write!(f, "kinematics: block {block}: singular orientation, secondary axis held")
            }
        }
    }
}

/// Ordered diagnostic log for a parse + simulation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.entries.push(diag);
    }

    pub fn parse_error(&mut self, err: ParseError) {
        self.entries.push(Diagnostic::Parse(err));
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of parse-level diagnostics.
    pub fn parse_errors(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::Parse(_)))
            .count()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }
}
