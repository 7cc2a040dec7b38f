// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Program structure
//!
//! Blocks, words and expressions produced once at load time and immutable
//! afterwards. Resolution into a motion program happens in
//! [`crate::parse::resolve`].

/// Arithmetic/comparison operator in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

/// Built-in function (Fanuc set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Abs,
    Round,
    Fix,
    Fup,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SIN" => Func::Sin,
            "COS" => Func::Cos,
            "TAN" => Func::Tan,
            "ASIN" => Func::Asin,
            "ACOS" => Func::Acos,
            "ATAN" => Func::Atan,
            "SQRT" => Func::Sqrt,
            "ABS" => Func::Abs,
            "ROUND" => Func::Round,
            "FIX" => Func::Fix,
            "FUP" => Func::Fup,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal number; `has_decimal` feeds the dialect integer-scale rule
    /// when the expression is used as an axis word value.
    Number { value: f64, has_decimal: bool },
    /// Parameter reference (`#n` or dialect R/Q form).
    Parameter(u32),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Expr::Number {
            value,
            has_decimal: true,
        }
    }

    /// True when the expression is a plain literal written without a
    /// decimal point.
    pub fn is_integer_literal(&self) -> bool {
        matches!(
            self,
            Expr::Number {
                has_decimal: false,
                ..
            }
        )
    }
}

/// One address word with its (possibly computed) value.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: Expr,
}

/// Parameter assignment (`#100 = [#1 + 2]`, `R5 = 10`).
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub index: u32,
    pub value: Expr,
}

/// Structured control-flow statement on a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Goto { target: u32 },
    IfGoto { cond: Expr, target: u32 },
    WhileDo { cond: Expr, label: u32 },
    EndWhile { label: u32 },
    /// `CALL <program>` identifier form (M98-style calls are plain words).
    Call { program: u32, repeats: u32 },
}

/// A single block (source line) of NC code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// 1-based source line.
    pub line: usize,
    /// `N` number if present.
    pub number: Option<u32>,
    /// Leading `/` present.
    pub block_skip: bool,
    pub words: Vec<Word>,
    pub assignments: Vec<Assignment>,
    pub control: Option<Control>,
    pub comment: Option<String>,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
            && self.assignments.is_empty()
            && self.control.is_none()
            && self.comment.is_none()
    }

    /// Block identifier for reporting: the N number if present, else the
    /// source line.
    pub fn id(&self) -> usize {
        self.number.map(|n| n as usize).unwrap_or(self.line)
    }
}

/// One `O`-numbered program unit (or the unnumbered leading unit).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramUnit {
    pub number: Option<u32>,
    pub blocks: Vec<Block>,
}

/// A parsed source file: the main unit followed by any sub-programs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub units: Vec<ProgramUnit>,
}

impl Program {
    pub fn main(&self) -> Option<&ProgramUnit> {
        self.units.first()
    }

    pub fn unit_by_number(&self, number: u32) -> Option<usize> {
        self.units.iter().position(|u| u.number == Some(number))
    }
}
