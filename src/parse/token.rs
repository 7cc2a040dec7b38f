// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Typed token stream
//!
//! The pest grammar (`gcode.pest`) tokenizes one source line at a time;
//! this module converts pest pairs into [`Token`]s carrying the source line
//! number. Tokens are immutable once produced.

use crate::error::ParseError;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "parse/gcode.pest"]
struct LineParser;

/// A literal number as written, remembering whether a decimal point was
/// present (dialects scale point-less values by a configured factor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Literal {
    pub value: f64,
    pub has_decimal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `%` program start/end marker.
    Percent,
    /// `(...)` or `; ...` comment text.
    Comment(String),
    /// Multi-letter keyword, function name or comparison operator.
    Ident(String),
    /// Address letter with an optional attached value.
    Word {
        letter: char,
        value: Option<WordLiteral>,
    },
    /// `#n` parameter reference.
    Parameter(u32),
    Number(Literal),
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    LBracket,
    RBracket,
}

/// Value attached directly to an address letter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WordLiteral {
    Number(Literal),
    Parameter(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

fn literal_from_str(text: &str) -> Literal {
    Literal {
        value: text.parse().unwrap_or(0.0),
        has_decimal: text.contains('.'),
    }
}

/// Tokenize one source line (1-based `line` number).
pub fn tokenize_line(text: &str, line: usize) -> Result<Vec<Token>, ParseError> {
    let parsed = LineParser::parse(Rule::line, text).map_err(|e| ParseError::Syntax {
        line,
        message: compact_pest_error(&e),
    })?;

    let mut tokens = Vec::new();
    for pair in parsed {
        if pair.as_rule() != Rule::line {
            continue;
        }
        for tok in pair.into_inner() {
            let kind = match tok.as_rule() {
                Rule::percent => TokenKind::Percent,
                Rule::comment => {
                    let raw = tok.as_str();
                    TokenKind::Comment(raw[1..raw.len() - 1].trim().to_string())
                }
                Rule::semi_comment => {
                    TokenKind::Comment(tok.as_str()[1..].trim().to_string())
                }
                Rule::ident => TokenKind::Ident(tok.as_str().to_ascii_uppercase()),
                Rule::word => {
                    let mut inner = tok.into_inner();
                    let letter = inner
                        .next()
                        .map(|p| p.as_str().chars().next().unwrap_or('?'))
                        .unwrap_or('?')
                        .to_ascii_uppercase();
                    let value = inner.next().map(|p| match p.as_rule() {
                        Rule::parameter => {
                            WordLiteral::Parameter(parameter_index(p.as_str()))
                        }
                        _ => WordLiteral::Number(literal_from_str(p.as_str())),
                    });
                    TokenKind::Word { letter, value }
                }
                Rule::parameter => TokenKind::Parameter(parameter_index(tok.as_str())),
                Rule::number => TokenKind::Number(literal_from_str(tok.as_str())),
                Rule::plus => TokenKind::Plus,
                Rule::minus => TokenKind::Minus,
                Rule::star => TokenKind::Star,
                Rule::slash => TokenKind::Slash,
                Rule::assign => TokenKind::Assign,
                Rule::lbracket => TokenKind::LBracket,
                Rule::rbracket => TokenKind::RBracket,
                Rule::EOI => continue,
                _ => continue,
            };
            tokens.push(Token { kind, line });
        }
    }
    Ok(tokens)
}

fn parameter_index(text: &str) -> u32 {
    text.trim_start_matches('#').parse().unwrap_or(0)
}

fn compact_pest_error(err: &pest::error::Error<Rule>) -> String {
    match &err.variant {
        pest::error::ErrorVariant::ParsingError { positives, .. } => {
            format!("unexpected input, expected one of {positives:?}")
        }
        pest::error::ErrorVariant::CustomError { message } => message.clone(),
    }
}

/// Tokenize a whole program, one entry per source line. Lines that fail to
/// lex yield an `Err` entry so the caller can report and keep going.
pub fn tokenize(source: &str) -> Vec<Result<Vec<Token>, ParseError>> {
    source
        .lines()
        .enumerate()
        .map(|(i, text)| tokenize_line(text, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize_line(text, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_words_with_attached_values() {
        let toks = kinds("G01X12.5Y-3");
        assert_eq!(toks.len(), 3);
        assert_eq!(
            toks[0],
            TokenKind::Word {
                letter: 'G',
                value: Some(WordLiteral::Number(Literal {
                    value: 1.0,
                    has_decimal: false
                }))
            }
        );
        match &toks[1] {
            TokenKind::Word { letter: 'X', value: Some(WordLiteral::Number(n)) } => {
                assert_eq!(n.value, 12.5);
                assert!(n.has_decimal);
            }
            other => panic!("unexpected token {other:?}"),
        }
        match &toks[2] {
            TokenKind::Word { letter: 'Y', value: Some(WordLiteral::Number(n)) } => {
                assert_eq!(n.value, -3.0);
                assert!(!n.has_decimal);
            }
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_parameter_and_assignment() {
        let toks = kinds("#100 = 5.5");
        assert_eq!(
            toks,
            vec![
                TokenKind::Parameter(100),
                TokenKind::Assign,
                TokenKind::Number(Literal {
                    value: 5.5,
                    has_decimal: true
                }),
            ]
        );
    }

    #[test]
    fn test_word_with_parameter_value() {
        let toks = kinds("X#1");
        assert_eq!(
            toks,
            vec![TokenKind::Word {
                letter: 'X',
                value: Some(WordLiteral::Parameter(1))
            }]
        );
    }

    #[test]
    fn test_comments_and_block_skip() {
        let toks = kinds("/ N10 G0 (rapid) ; trailing");
        assert_eq!(toks[0], TokenKind::Slash);
        assert!(matches!(
            toks[1],
            TokenKind::Word { letter: 'N', .. }
        ));
        assert!(toks
            .iter()
            .any(|t| *t == TokenKind::Comment("rapid".into())));
        assert!(toks
            .iter()
            .any(|t| *t == TokenKind::Comment("trailing".into())));
    }

    #[test]
    fn test_control_flow_tokens() {
        let toks = kinds("IF[#1GT5]GOTO10");
        assert_eq!(toks[0], TokenKind::Ident("IF".into()));
        assert_eq!(toks[1], TokenKind::LBracket);
        assert_eq!(toks[2], TokenKind::Parameter(1));
        assert_eq!(toks[3], TokenKind::Ident("GT".into()));
        assert!(matches!(toks[4], TokenKind::Number(_)));
        assert_eq!(toks[5], TokenKind::RBracket);
        assert_eq!(toks[6], TokenKind::Ident("GOTO".into()));
        assert!(matches!(toks[7], TokenKind::Number(_)));
    }

    #[test]
    fn test_lowercase_is_normalized() {
        let toks = kinds("g1 x5.");
        assert!(matches!(
            toks[0],
            TokenKind::Word { letter: 'G', .. }
        ));
        match &toks[1] {
            TokenKind::Word { letter: 'X', value: Some(WordLiteral::Number(n)) } => {
                assert!(n.has_decimal)
            }
            other => panic!("unexpected token {other:?}"),
        }
    }
}
