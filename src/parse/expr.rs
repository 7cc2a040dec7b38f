// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Parameter storage and expression evaluation
//!
//! Variables live in three namespaces (Fanuc numbering): locals #1..#33
//! scoped to the active call frame, commons #100..#999 shared across the
//! program, and a read-only system namespace above #1000. Reading an unset
//! variable yields 0.0 ("vacant" reads as zero). Trigonometric functions
//! work in degrees, as on the controller.

use crate::error::ParseError;
use crate::parse::ast::{BinOp, Expr, Func};
use ahash::AHashMap;

const LOCAL_MAX: u32 = 33;
const SYSTEM_MIN: u32 = 1000;

/// Layered variable store threaded through resolution.
#[derive(Debug, Clone)]
pub struct VariableStore {
    locals: Vec<AHashMap<u32, f64>>,
    common: AHashMap<u32, f64>,
    system: AHashMap<u32, f64>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            locals: vec![AHashMap::new()],
            common: AHashMap::new(),
            system: AHashMap::new(),
        }
    }

    /// Push a fresh local scope for a sub-program call.
    pub fn push_scope(&mut self) {
        self.locals.push(AHashMap::new());
    }

    /// Pop the local scope on sub-program return. The outermost scope is
    /// never popped.
    pub fn pop_scope(&mut self) {
        if self.locals.len() > 1 {
            self.locals.pop();
        }
    }

    pub fn get(&self, index: u32) -> f64 {
        let map = if index <= LOCAL_MAX {
            self.locals.last()
        } else if index < SYSTEM_MIN {
            Some(&self.common)
        } else {
            Some(&self.system)
        };
        map.and_then(|m| m.get(&index)).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, index: u32, value: f64, line: usize) -> Result<(), ParseError> {
        if index >= SYSTEM_MIN {
            return Err(ParseError::BadExpression {
                line,
                message: format!("system variable #{index} is read-only"),
            });
        }
        if index <= LOCAL_MAX {
            if let Some(scope) = self.locals.last_mut() {
                scope.insert(index, value);
            }
        } else {
            self.common.insert(index, value);
        }
        Ok(())
    }

    /// Seed a read-only system variable (machine state exposure).
    pub fn seed_system(&mut self, index: u32, value: f64) {
        self.system.insert(index, value);
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate an expression against the store.
pub fn eval(expr: &Expr, vars: &VariableStore, line: usize) -> Result<f64, ParseError> {
    Ok(match expr {
        Expr::Number { value, .. } => *value,
        Expr::Parameter(index) => vars.get(*index),
        Expr::Neg(inner) => -eval(inner, vars, line)?,
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, vars, line)?;
            let b = eval(rhs, vars, line)?;
            match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(ParseError::BadExpression {
                            line,
                            message: "division by zero".into(),
                        });
                    }
                    a / b
                }
                BinOp::Eq => bool_val(a == b),
                BinOp::Ne => bool_val(a != b),
                BinOp::Gt => bool_val(a > b),
                BinOp::Ge => bool_val(a >= b),
                BinOp::Lt => bool_val(a < b),
                BinOp::Le => bool_val(a <= b),
                BinOp::And => bool_val(a != 0.0 && b != 0.0),
                BinOp::Or => bool_val(a != 0.0 || b != 0.0),
            }
        }
        Expr::Call(func, arg) => {
            let x = eval(arg, vars, line)?;
            match func {
                Func::Sin => x.to_radians().sin(),
                Func::Cos => x.to_radians().cos(),
                Func::Tan => x.to_radians().tan(),
                Func::Asin => check_finite(x.asin().to_degrees(), line)?,
                Func::Acos => check_finite(x.acos().to_degrees(), line)?,
                Func::Atan => x.atan().to_degrees(),
                Func::Sqrt => {
                    if x < 0.0 {
                        return Err(ParseError::BadExpression {
                            line,
                            message: "SQRT of negative value".into(),
                        });
                    }
                    x.sqrt()
                }
                Func::Abs => x.abs(),
                Func::Round => x.round(),
                Func::Fix => x.floor(),
                Func::Fup => x.ceil(),
            }
        }
    })
}

fn bool_val(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn check_finite(x: f64, line: usize) -> Result<f64, ParseError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(ParseError::BadExpression {
            line,
            message: "function argument out of domain".into(),
        })
    }
}
