// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Controller dialect descriptors
//!
//! Dialect differences (Fanuc/Siemens/Heidenhain-style) are modeled as a
//! capability set selected once per load. Shared parsing logic never
//! branches on a dialect name, only on these fields. Selection is an
//! explicit input; [`Dialect::suggest_from_extension`] is a suggestion
//! helper only and never applied implicitly.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when one line programs two codes of the same modal group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateModal {
    /// The last code on the line wins (Fanuc-documented behavior).
    LastWins,
    /// The block is rejected with a modal-conflict error.
    Reject,
}

/// How sub-programs are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubCallStyle {
    /// `M98 P<program> L<repeats>` with `M99` return.
    M98P,
    /// `CALL <program>` identifier form.
    CallWord,
}

/// Capability descriptor for one controller dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    pub name: String,
    /// Sigil introducing a parameter reference (`#` Fanuc, `R` Siemens-style,
    /// `Q` Heidenhain-style). `R`/`Q` sigils are recognized from the word
    /// stream (`R5 = 10`), since those letters double as axis/cycle words.
    pub variable_sigil: char,
    /// Same-line duplicate codes in one modal group.
    pub duplicate_modal: DuplicateModal,
    /// Scale applied to axis values written without a decimal point.
    /// `1.0` means "as written"; historical least-increment formats
    /// (e.g. `0.001`) must be configured explicitly, never inferred.
    pub integer_scale: f64,
    pub sub_call: SubCallStyle,
    /// Maximum sub-program nesting depth.
    pub max_call_depth: usize,
    /// Upper bound on WHILE iterations before the loop is rejected.
    pub max_loop_iterations: usize,
}

impl Dialect {
    /// Fanuc-compatible preset: `#` variables, last-wins duplicate modals,
    /// values taken as written.
    pub fn fanuc() -> Self {
        Self {
            name: "fanuc".into(),
            variable_sigil: '#',
            duplicate_modal: DuplicateModal::LastWins,
            integer_scale: 1.0,
            sub_call: SubCallStyle::M98P,
            max_call_depth: 10,
            max_loop_iterations: 100_000,
        }
    }

    /// Siemens-style preset: R-parameters, strict duplicate-modal rule.
    pub fn siemens() -> Self {
        Self {
            name: "siemens".into(),
            variable_sigil: 'R',
            duplicate_modal: DuplicateModal::Reject,
            integer_scale: 1.0,
            sub_call: SubCallStyle::CallWord,
            max_call_depth: 12,
            max_loop_iterations: 100_000,
        }
    }

    /// Heidenhain-style preset: Q-parameters, strict duplicate-modal rule.
    pub fn heidenhain() -> Self {
        Self {
            name: "heidenhain".into(),
            variable_sigil: 'Q',
            duplicate_modal: DuplicateModal::Reject,
            integer_scale: 1.0,
            sub_call: SubCallStyle::CallWord,
            max_call_depth: 8,
            max_loop_iterations: 100_000,
        }
    }

    /// File-extension convention, offered as a suggestion only.
    pub fn suggest_from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "nc" | "cnc" | "tap" | "eia" => Some(Self::fanuc()),
            "mpf" | "spf" => Some(Self::siemens()),
            "h" => Some(Self::heidenhain()),
            _ => None,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::fanuc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_where_documented() {
        let fanuc = Dialect::fanuc();
        let siemens = Dialect::siemens();
        assert_eq!(fanuc.duplicate_modal, DuplicateModal::LastWins);
        assert_eq!(siemens.duplicate_modal, DuplicateModal::Reject);
        assert_eq!(fanuc.variable_sigil, '#');
        assert_eq!(siemens.variable_sigil, 'R');
    }

    #[test]
    fn test_extension_suggestion() {
        assert_eq!(
            Dialect::suggest_from_extension(Path::new("part.nc")).map(|d| d.name),
            Some("fanuc".to_string())
        );
        assert_eq!(
            Dialect::suggest_from_extension(Path::new("part.mpf")).map(|d| d.name),
            Some("siemens".to_string())
        );
        assert!(Dialect::suggest_from_extension(Path::new("part.txt")).is_none());
    }
}
