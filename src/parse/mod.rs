// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! G-code front end
//!
//! Three stages, each a pure function of its input:
//!
//! 1. [`token`]: pest-based lexing of one source line at a time;
//! 2. [`parser`]: token stream to [`ast::Program`] (blocks, expressions,
//!    control statements, O-numbered units);
//! 3. [`resolve`]: program execution with modal state, variables, WCS
//!    offsets and sub-programs, flattening to a [`resolve::MotionProgram`].
//!
//! Errors at every stage accumulate in [`crate::error::Diagnostics`]; a bad
//! block never aborts the rest of the file.

pub mod ast;
pub mod expr;
pub mod modal;
pub mod parser;
pub mod resolve;
pub mod token;

use crate::dialect::Dialect;
use crate::error::Diagnostics;
use crate::machine::WcsTable;

pub use ast::{Block, Program, ProgramUnit};
pub use modal::{ModalState, Plane};
pub use resolve::{MotionProgram, Move, MoveKind};

/// Parse NC source into its block structure.
pub fn parse(source: &str, dialect: &Dialect) -> (Program, Diagnostics) {
    parser::parse_source(source, dialect)
}

/// Parse and resolve in one step.
pub fn load(
    source: &str,
    dialect: &Dialect,
    wcs_table: &WcsTable,
    block_skip_active: bool,
) -> (MotionProgram, Diagnostics) {
    let (program, mut diags) = parser::parse_source(source, dialect);
    let (motion, resolve_diags) = resolve::resolve(&program, dialect, wcs_table, block_skip_active);
    diags.extend(resolve_diags);
    (motion, diags)
}
