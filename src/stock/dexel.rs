// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Single dexel column
//!
//! A dexel is an ordered, non-overlapping list of material spans along one
//! sampling axis. Removal trims, splits or deletes spans and returns the
//! exact height taken, which is what makes stock volume accounting exact
//! under this model's own arithmetic.

use serde::Serialize;

/// Spans shorter than this are dropped when pruning.
pub const MIN_SPAN_HEIGHT: f64 = 1e-9;

/// One contiguous material segment, `bottom < top`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Span {
    pub bottom: f64,
    pub top: f64,
}

impl Span {
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Material spans along one column, sorted by `bottom`, non-overlapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Dexel {
    spans: Vec<Span>,
}

impl Dexel {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single solid segment.
    pub fn solid(bottom: f64, top: f64) -> Self {
        if top - bottom <= MIN_SPAN_HEIGHT {
            return Self::default();
        }
        Self {
            spans: vec![Span { bottom, top }],
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total material height.
    pub fn material(&self) -> f64 {
        self.spans.iter().map(Span::height).sum()
    }

    /// Top of the highest span.
    pub fn top(&self) -> Option<f64> {
        self.spans.last().map(|s| s.top)
    }

    pub fn contains(&self, z: f64) -> bool {
        self.spans.iter().any(|s| z >= s.bottom && z <= s.top)
    }

    /// Remove the interval `[lo, hi]`, returning the material height
    /// actually removed. Spans are trimmed at the boundary, split when the
    /// interval lands inside one, and deleted when swallowed whole.
    pub fn remove(&mut self, lo: f64, hi: f64) -> f64 {
        if hi - lo <= 0.0 || self.spans.is_empty() {
            return 0.0;
        }
        let mut removed = 0.0;
        let mut result: Vec<Span> = Vec::with_capacity(self.spans.len() + 1);
        for span in &self.spans {
            if span.top <= lo || span.bottom >= hi {
                result.push(*span);
                continue;
            }
            let cut_lo = span.bottom.max(lo);
            let cut_hi = span.top.min(hi);
            removed += cut_hi - cut_lo;
            if span.bottom < cut_lo - MIN_SPAN_HEIGHT {
                result.push(Span {
                    bottom: span.bottom,
                    top: cut_lo,
                });
            }
            if span.top > cut_hi + MIN_SPAN_HEIGHT {
                result.push(Span {
                    bottom: cut_hi,
                    top: span.top,
                });
            }
        }
        self.spans = result;
        removed
    }

    /// Drop spans below the minimum height to bound numeric drift.
    pub fn prune(&mut self) {
        self.spans.retain(|s| s.height() > MIN_SPAN_HEIGHT);
    }
}
