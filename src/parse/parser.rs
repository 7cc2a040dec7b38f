// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Token stream → program structure
//!
//! Builds [`Block`]s from the typed token stream, parsing expressions and
//! dialect-specific assignment forms. Bad lines are reported into
//! [`Diagnostics`] and skipped; parsing always continues at the next block.

use crate::dialect::Dialect;
use crate::error::{Diagnostics, ParseError};
use crate::parse::ast::{
    Assignment, BinOp, Block, Control, Expr, Func, Program, ProgramUnit, Word,
};
use crate::parse::token::{tokenize, Token, TokenKind, WordLiteral};

/// Parse a full source file into program units.
pub fn parse_source(source: &str, dialect: &Dialect) -> (Program, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut blocks = Vec::new();

    for line_result in tokenize(source) {
        match line_result {
            Ok(tokens) => {
                if tokens.is_empty() {
                    continue;
                }
                let line = tokens[0].line;
                match parse_block(&tokens, line, dialect) {
                    Ok(block) => {
                        if !block.is_empty() {
                            blocks.push(block);
                        }
                    }
                    Err(err) => diags.parse_error(err),
                }
            }
            Err(err) => diags.parse_error(err),
        }
    }

    (split_units(blocks), diags)
}

/// Split a flat block list into O-numbered program units. Blocks before the
/// first O label form the (unnumbered) main unit.
fn split_units(blocks: Vec<Block>) -> Program {
    let mut units: Vec<ProgramUnit> = Vec::new();
    let mut current = ProgramUnit::default();

    for block in blocks {
        let label = block.words.iter().find_map(|w| {
            if w.letter == 'O' {
                if let Expr::Number { value, .. } = w.value {
                    return Some(value as u32);
                }
            }
            None
        });
        if let Some(number) = label {
            if !current.blocks.is_empty() || current.number.is_some() {
                units.push(current);
            }
            current = ProgramUnit {
                number: Some(number),
                blocks: Vec::new(),
            };
            // Keep any other words programmed on the label line.
            let rest: Vec<Word> = block
                .words
                .iter()
                .filter(|w| w.letter != 'O')
                .cloned()
                .collect();
            if !rest.is_empty() {
                current.blocks.push(Block {
                    words: rest,
                    ..block
                });
            }
        } else {
            current.blocks.push(block);
        }
    }
    if !current.blocks.is_empty() || current.number.is_some() || units.is_empty() {
        units.push(current);
    }
    Program { units }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
    /// Dialect variable sigil, so `R5`/`Q5` can be read as a parameter
    /// reference inside expressions.
    sigil: char,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<&'a TokenKind> {
        let tok = self.tokens.get(self.pos).map(|t| &t.kind);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_rbracket(&mut self) -> Result<(), ParseError> {
        match self.next() {
            Some(TokenKind::RBracket) => Ok(()),
            _ => Err(ParseError::BadExpression {
                line: self.line,
                message: "expected ']'".into(),
            }),
        }
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }
}

fn parse_block(tokens: &[Token], line: usize, dialect: &Dialect) -> Result<Block, ParseError> {
    let mut cur = Cursor {
        tokens,
        pos: 0,
        line,
        sigil: dialect.variable_sigil,
    };
    let mut block = Block {
        line,
        ..Block::default()
    };

    // Leading '/' is block skip; elsewhere '/' only occurs inside
    // expressions.
    if matches!(cur.peek(), Some(TokenKind::Slash)) {
        block.block_skip = true;
        cur.next();
    }

    while let Some(kind) = cur.peek() {
        match kind {
            TokenKind::Percent => {
                cur.next();
            }
            TokenKind::Comment(text) => {
                let text = text.clone();
                cur.next();
                match &mut block.comment {
                    Some(existing) => {
                        existing.push(' ');
                        existing.push_str(&text);
                    }
                    None => block.comment = Some(text),
                }
            }
            TokenKind::Parameter(index) => {
                let index = *index;
                cur.next();
                match cur.next() {
                    Some(TokenKind::Assign) => {
                        let value = parse_expr(&mut cur)?;
                        block.assignments.push(Assignment { index, value });
                    }
                    _ => return Err(cur.syntax("expected '=' after parameter")),
                }
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                cur.next();
                parse_statement(&mut cur, &name, &mut block)?;
            }
            TokenKind::Word { letter, value } => {
                let letter = *letter;
                let inline = *value;
                cur.next();

                // Dialect R/Q parameter assignment: `R5 = expr`.
                if letter == dialect.variable_sigil
                    && matches!(cur.peek(), Some(TokenKind::Assign))
                {
                    cur.next();
                    let index = match inline {
                        Some(WordLiteral::Number(n)) => n.value as u32,
                        _ => return Err(cur.syntax("parameter number expected before '='")),
                    };
                    let value = parse_expr(&mut cur)?;
                    block.assignments.push(Assignment { index, value });
                    continue;
                }

                let value = match inline {
                    Some(WordLiteral::Number(n)) => Expr::Number {
                        value: n.value,
                        has_decimal: n.has_decimal,
                    },
                    Some(WordLiteral::Parameter(p)) => Expr::Parameter(p),
                    // `X= expr` (Siemens-style) or a spaced/bracketed value
                    // as separate tokens.
                    None => {
                        if matches!(cur.peek(), Some(TokenKind::Assign)) {
                            cur.next();
                            parse_expr(&mut cur)?
                        } else {
                            parse_value(&mut cur).ok_or_else(|| {
                                ParseError::MalformedWord {
                                    line,
                                    word: letter.to_string(),
                                }
                            })??
                        }
                    }
                };

                if letter == 'N' && block.number.is_none() && block.words.is_empty() {
                    if let Expr::Number { value, .. } = value {
                        block.number = Some(value as u32);
                        continue;
                    }
                }
                block.words.push(Word { letter, value });
            }
            TokenKind::Slash => {
                return Err(cur.syntax("unexpected '/'"));
            }
            _ => {
                return Err(cur.syntax("unexpected token"));
            }
        }
    }

    Ok(block)
}

/// Optional spaced value after a bare word letter.
fn parse_value(cur: &mut Cursor) -> Option<Result<Expr, ParseError>> {
    match cur.peek()? {
        TokenKind::Number(_) | TokenKind::Parameter(_) | TokenKind::LBracket
        | TokenKind::Minus | TokenKind::Plus => Some(parse_unary(cur)),
        _ => None,
    }
}

fn parse_statement(cur: &mut Cursor, name: &str, block: &mut Block) -> Result<(), ParseError> {
    match name {
        "IF" => {
            let cond = parse_expr(cur)?;
            match cur.next() {
                Some(TokenKind::Ident(kw)) if kw == "GOTO" => {
                    let target = parse_block_target(cur)?;
                    block.control = Some(Control::IfGoto { cond, target });
                    Ok(())
                }
                _ => Err(cur.syntax("expected GOTO after IF condition")),
            }
        }
        "GOTO" => {
            let target = parse_block_target(cur)?;
            block.control = Some(Control::Goto { target });
            Ok(())
        }
        "WHILE" => {
            let cond = parse_expr(cur)?;
            match cur.next() {
                Some(TokenKind::Ident(kw)) if kw == "DO" => {
                    let label = parse_block_target(cur)?;
                    block.control = Some(Control::WhileDo { cond, label });
                    Ok(())
                }
                _ => Err(cur.syntax("expected DO after WHILE condition")),
            }
        }
        "END" => {
            let label = parse_block_target(cur)?;
            block.control = Some(Control::EndWhile { label });
            Ok(())
        }
        "CALL" => {
            let program = parse_block_target(cur)?;
            let repeats = match cur.peek() {
                Some(TokenKind::Word { letter: 'L', value: Some(WordLiteral::Number(n)) }) => {
                    cur.next();
                    (n.value as u32).max(1)
                }
                _ => 1,
            };
            block.control = Some(Control::Call { program, repeats });
            Ok(())
        }
        other => Err(cur.syntax(format!("unexpected keyword '{other}'"))),
    }
}

fn parse_block_target(cur: &mut Cursor) -> Result<u32, ParseError> {
    match cur.next() {
        Some(TokenKind::Number(n)) => Ok(n.value as u32),
        // `GOTO N100` form.
        Some(TokenKind::Word { letter: 'N', value: Some(WordLiteral::Number(n)) }) => {
            Ok(n.value as u32)
        }
        _ => Err(cur.syntax("expected a block number")),
    }
}

// Precedence-climbing expression parser: OR < AND < comparison < add < mul.

fn parse_expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    parse_or(cur)
}

fn parse_or(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut lhs = parse_and(cur)?;
    while matches!(cur.peek(), Some(TokenKind::Ident(n)) if n == "OR") {
        cur.next();
        let rhs = parse_and(cur)?;
        lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut lhs = parse_comparison(cur)?;
    while matches!(cur.peek(), Some(TokenKind::Ident(n)) if n == "AND") {
        cur.next();
        let rhs = parse_comparison(cur)?;
        lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn comparison_op(name: &str) -> Option<BinOp> {
    Some(match name {
        "EQ" => BinOp::Eq,
        "NE" => BinOp::Ne,
        "GT" => BinOp::Gt,
        "GE" => BinOp::Ge,
        "LT" => BinOp::Lt,
        "LE" => BinOp::Le,
        _ => return None,
    })
}

fn parse_comparison(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let lhs = parse_additive(cur)?;
    if let Some(TokenKind::Ident(name)) = cur.peek() {
        if let Some(op) = comparison_op(name) {
            cur.next();
            let rhs = parse_additive(cur)?;
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }
    Ok(lhs)
}

fn parse_additive(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut lhs = parse_multiplicative(cur)?;
    loop {
        let op = match cur.peek() {
            Some(TokenKind::Plus) => BinOp::Add,
            Some(TokenKind::Minus) => BinOp::Sub,
            _ => break,
        };
        cur.next();
        let rhs = parse_multiplicative(cur)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_multiplicative(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut lhs = parse_unary(cur)?;
    loop {
        let op = match cur.peek() {
            Some(TokenKind::Star) => BinOp::Mul,
            Some(TokenKind::Slash) => BinOp::Div,
            _ => break,
        };
        cur.next();
        let rhs = parse_unary(cur)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_unary(cur: &mut Cursor) -> Result<Expr, ParseError> {
    match cur.peek() {
        Some(TokenKind::Minus) => {
            cur.next();
            Ok(Expr::Neg(Box::new(parse_unary(cur)?)))
        }
        Some(TokenKind::Plus) => {
            cur.next();
            parse_unary(cur)
        }
        _ => parse_primary(cur),
    }
}

fn parse_primary(cur: &mut Cursor) -> Result<Expr, ParseError> {
    match cur.next() {
        Some(TokenKind::Number(n)) => Ok(Expr::Number {
            value: n.value,
            has_decimal: n.has_decimal,
        }),
        Some(TokenKind::Parameter(index)) => Ok(Expr::Parameter(*index)),
        Some(TokenKind::Word {
            letter,
            value: Some(WordLiteral::Number(n)),
        }) if *letter == cur.sigil => Ok(Expr::Parameter(n.value as u32)),
        Some(TokenKind::LBracket) => {
            let inner = parse_expr(cur)?;
            cur.expect_rbracket()?;
            Ok(inner)
        }
        Some(TokenKind::Ident(name)) => {
            let func = Func::from_name(name).ok_or_else(|| ParseError::BadExpression {
                line: cur.line,
                message: format!("unknown function '{name}'"),
            })?;
            match cur.next() {
                Some(TokenKind::LBracket) => {}
                _ => {
                    return Err(ParseError::BadExpression {
                        line: cur.line,
                        message: format!("expected '[' after {name}"),
                    })
                }
            }
            let arg = parse_expr(cur)?;
            cur.expect_rbracket()?;
            Ok(Expr::Call(func, Box::new(arg)))
        }
        _ => Err(ParseError::BadExpression {
            line: cur.line,
            message: "expected a value".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> Block {
        let (program, diags) = parse_source(text, &Dialect::fanuc());
        assert!(diags.is_empty(), "diagnostics: {:?}", diags.entries());
        program.units[0].blocks[0].clone()
    }

    #[test]
    fn test_basic_motion_block() {
        let block = parse_one("N10 G01 X12.5 Y-3. F250.");
        assert_eq!(block.number, Some(10));
        assert_eq!(block.words.len(), 4);
        assert_eq!(block.words[0].letter, 'G');
        assert_eq!(block.words[3].letter, 'F');
    }

    #[test]
    fn test_assignment_and_computed_word() {
        let block = parse_one("#1 = [2 + 3] * 2");
        assert_eq!(block.assignments.len(), 1);
        assert_eq!(block.assignments[0].index, 1);

        let block = parse_one("X[#1 + 1.5]");
        assert_eq!(block.words[0].letter, 'X');
        assert!(matches!(block.words[0].value, Expr::Binary(BinOp::Add, _, _)));
    }

    #[test]
    fn test_siemens_r_parameter_assignment() {
        let (program, diags) = parse_source("R5 = 12.5", &Dialect::siemens());
        assert!(diags.is_empty());
        let block = &program.units[0].blocks[0];
        assert_eq!(block.assignments.len(), 1);
        assert_eq!(block.assignments[0].index, 5);
        assert!(block.words.is_empty());
    }

    #[test]
    fn test_siemens_word_value_from_r_parameter() {
        let (program, diags) = parse_source("G1 Z=R1 F300", &Dialect::siemens());
        assert!(diags.is_empty(), "diagnostics: {:?}", diags.entries());
        let block = &program.units[0].blocks[0];
        let z = block.words.iter().find(|w| w.letter == 'Z').unwrap();
        assert!(matches!(z.value, Expr::Parameter(1)));
    }

    #[test]
    fn test_fanuc_r_word_is_not_an_assignment() {
        // For the Fanuc dialect R is the arc-radius word.
        let block = parse_one("G2 X10. Y0. R5.");
        assert!(block.assignments.is_empty());
        assert!(block.words.iter().any(|w| w.letter == 'R'));
    }

    #[test]
    fn test_control_flow_statements() {
        let block = parse_one("IF [#1 GT 5] GOTO 100");
        assert!(matches!(
            block.control,
            Some(Control::IfGoto { target: 100, .. })
        ));

        let block = parse_one("WHILE [#2 LT 10] DO 1");
        assert!(matches!(
            block.control,
            Some(Control::WhileDo { label: 1, .. })
        ));

        let block = parse_one("END 1");
        assert!(matches!(block.control, Some(Control::EndWhile { label: 1 })));
    }

    #[test]
    fn test_sub_program_units() {
        let source = "G0 X0\nM98 P100\nM30\nO100\nG1 X5. F100.\nM99\n";
        let (program, diags) = parse_source(source, &Dialect::fanuc());
        assert!(diags.is_empty());
        assert_eq!(program.units.len(), 2);
        assert_eq!(program.units[1].number, Some(100));
        assert_eq!(program.units[0].blocks.len(), 3);
    }

    #[test]
    fn test_bad_line_is_reported_and_skipped() {
        let (program, diags) = parse_source("G1 X5.\nX]\nG1 X10.", &Dialect::fanuc());
        assert_eq!(diags.parse_errors(), 1);
        assert_eq!(program.units[0].blocks.len(), 2);
    }

    #[test]
    fn test_block_skip_flag() {
        let block = parse_one("/ G1 X5.");
        assert!(block.block_skip);
    }
}
