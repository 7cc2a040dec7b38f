// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Tool definitions and the tool table

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cutting geometry family of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolShape {
    FlatEndmill,
    BallEndmill,
    Bullnose,
    Drill,
    Tap,
}

/// One tool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub number: u32,
    pub name: String,
    pub shape: ToolShape,
    /// Cutting diameter (mm).
    pub diameter: f64,
    /// Overall cutting length below the holder (mm).
    pub length: f64,
    /// Corner radius for bullnose cutters (mm).
    pub corner_radius: f64,
    pub flutes: u32,
    /// H/D offset register this tool maps to.
    pub offset_register: u32,
}

impl Tool {
    pub fn flat(number: u32, diameter: f64, length: f64) -> Self {
        Self {
            number,
            name: format!("D{diameter} flat endmill"),
            shape: ToolShape::FlatEndmill,
            diameter,
            length,
            corner_radius: 0.0,
            flutes: 3,
            offset_register: number,
        }
    }

    pub fn ball(number: u32, diameter: f64, length: f64) -> Self {
        Self {
            name: format!("D{diameter} ball endmill"),
            shape: ToolShape::BallEndmill,
            corner_radius: diameter / 2.0,
            ..Self::flat(number, diameter, length)
        }
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Height of the cutting profile above the tip at radial distance `d`
    /// from the tool axis. Returns `None` outside the cutting radius.
    pub fn profile_height(&self, d: f64) -> Option<f64> {
        let r = self.radius();
        if d > r {
            return None;
        }
        match self.shape {
            ToolShape::FlatEndmill | ToolShape::Tap => Some(0.0),
            ToolShape::BallEndmill => Some(r - (r * r - d * d).sqrt()),
            ToolShape::Bullnose => {
                let rc = self.corner_radius.min(r);
                let flat = r - rc;
                if d <= flat {
                    Some(0.0)
                } else {
                    let dd = d - flat;
                    Some(rc - (rc * rc - dd * dd).max(0.0).sqrt())
                }
            }
            // 118° point angle: rise = d / tan(59°).
            ToolShape::Drill => Some(d / 59f64.to_radians().tan()),
        }
    }
}

/// Tool-number-to-definition mapping, loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTable {
    pub tools: Vec<Tool>,
}

impl ToolTable {
    pub fn get(&self, number: u32) -> Option<&Tool> {
        self.tools.iter().find(|t| t.number == number)
    }

    pub fn insert(&mut self, tool: Tool) {
        self.tools.retain(|t| t.number != tool.number);
        self.tools.push(tool);
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
