// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Dexel board: a 2D grid of columns
//!
//! Columns sample along one world axis over a regular grid in the other
//! two. The grid resolution is the accuracy/performance trade-off of the
//! whole stock model: it bounds the minimum detectable feature and the
//! column count visited per sweep.

use crate::stock::dexel::Dexel;
use nalgebra::Vector3;
use serde::Serialize;

/// Sampling direction of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoardAxis {
    X,
    Y,
    Z,
}

impl BoardAxis {
    /// Split a world point into (u, v, w): grid coordinates and the span
    /// coordinate.
    pub fn split(&self, p: Vector3<f64>) -> (f64, f64, f64) {
        match self {
            BoardAxis::X => (p.y, p.z, p.x),
            BoardAxis::Y => (p.x, p.z, p.y),
            BoardAxis::Z => (p.x, p.y, p.z),
        }
    }

    /// Unit direction of the span axis.
    pub fn direction(&self) -> Vector3<f64> {
        match self {
            BoardAxis::X => Vector3::x(),
            BoardAxis::Y => Vector3::y(),
            BoardAxis::Z => Vector3::z(),
        }
    }

    /// Rebuild a world point from grid and span coordinates.
    pub fn assemble(&self, u: f64, v: f64, w: f64) -> Vector3<f64> {
        match self {
            BoardAxis::X => Vector3::new(w, u, v),
            BoardAxis::Y => Vector3::new(u, w, v),
            BoardAxis::Z => Vector3::new(u, v, w),
        }
    }
}

/// Regular grid of dexel columns.
#[derive(Debug, Clone, Serialize)]
pub struct DexelBoard {
    pub axis: BoardAxis,
    /// Grid origin: minimum (u, v) corner.
    origin: (f64, f64),
    resolution: f64,
    nu: usize,
    nv: usize,
    /// Span range the board was initialized with, for reset.
    w_range: (f64, f64),
    columns: Vec<Dexel>,
}

impl DexelBoard {
    /// Solid box stock covering `[min, max]` world coordinates.
    pub fn solid_box(
        axis: BoardAxis,
        min: Vector3<f64>,
        max: Vector3<f64>,
        resolution: f64,
    ) -> Self {
        let (u0, v0, w0) = axis.split(min);
        let (u1, v1, w1) = axis.split(max);
        let resolution = resolution.max(1e-3);
        let nu = (((u1 - u0) / resolution).ceil() as usize).max(1);
        let nv = (((v1 - v0) / resolution).ceil() as usize).max(1);
        let columns = vec![Dexel::solid(w0, w1); nu * nv];
        Self {
            axis,
            origin: (u0, v0),
            resolution,
            nu,
            nv,
            w_range: (w0, w1),
            columns,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.nu, self.nv)
    }

    /// Footprint area of one column.
    pub fn cell_area(&self) -> f64 {
        self.resolution * self.resolution
    }

    /// Column center in (u, v).
    pub fn cell_center(&self, iu: usize, iv: usize) -> (f64, f64) {
        (
            self.origin.0 + (iu as f64 + 0.5) * self.resolution,
            self.origin.1 + (iv as f64 + 0.5) * self.resolution,
        )
    }

    /// Grid index ranges covering a (u, v) rectangle, clamped to the board.
    pub fn cells_in_rect(
        &self,
        min_u: f64,
        min_v: f64,
        max_u: f64,
        max_v: f64,
    ) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let lo_u = (((min_u - self.origin.0) / self.resolution).floor() as isize).max(0) as usize;
        let lo_v = (((min_v - self.origin.1) / self.resolution).floor() as isize).max(0) as usize;
        let hi_u = ((((max_u - self.origin.0) / self.resolution).ceil() as isize).max(0) as usize)
            .min(self.nu);
        let hi_v = ((((max_v - self.origin.1) / self.resolution).ceil() as isize).max(0) as usize)
            .min(self.nv);
        (lo_u..hi_u, lo_v..hi_v)
    }

    pub fn column(&self, iu: usize, iv: usize) -> &Dexel {
        &self.columns[iv * self.nu + iu]
    }

    pub fn column_mut(&mut self, iu: usize, iv: usize) -> &mut Dexel {
        &mut self.columns[iv * self.nu + iu]
    }

    /// Flat column storage, row-major in v. Chunking by `dims().0` yields
    /// whole rows, so parallel workers never share a column.
    pub fn columns_mut(&mut self) -> &mut [Dexel] {
        &mut self.columns
    }

    /// Material volume: Σ span heights × cell footprint.
    pub fn volume(&self) -> f64 {
        let heights: f64 = self.columns.iter().map(Dexel::material).sum();
        heights * self.cell_area()
    }

    /// Highest material top over the whole board.
    pub fn max_top(&self) -> Option<f64> {
        self.columns
            .iter()
            .filter_map(Dexel::top)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))))
    }

    /// Restore the initial solid box.
    pub fn reset(&mut self) {
        let solid = Dexel::solid(self.w_range.0, self.w_range.1);
        for column in &mut self.columns {
            *column = solid.clone();
        }
    }

    pub fn prune(&mut self) {
        for column in &mut self.columns {
            column.prune();
        }
    }

    /// Top-surface height field as a triangle mesh (Z boards). Vertices at
    /// cell centers, two triangles per interior quad; empty columns drop to
    /// the board floor.
    pub fn height_mesh(&self) -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
        let mut vertices = Vec::with_capacity(self.nu * self.nv);
        for iv in 0..self.nv {
            for iu in 0..self.nu {
                let (u, v) = self.cell_center(iu, iv);
                let w = self.column(iu, iv).top().unwrap_or(self.w_range.0);
                let p = self.axis.assemble(u, v, w);
                vertices.push([p.x, p.y, p.z]);
            }
        }
        let mut triangles = Vec::new();
        for iv in 0..self.nv.saturating_sub(1) {
            for iu in 0..self.nu.saturating_sub(1) {
                let a = (iv * self.nu + iu) as u32;
                let b = a + 1;
                let c = a + self.nu as u32;
                let d = c + 1;
                triangles.push([a, b, d]);
                triangles.push([a, d, c]);
            }
        }
        (vertices, triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn board() -> DexelBoard {
        DexelBoard::solid_box(
            BoardAxis::Z,
            Vector3::new(-50.0, -50.0, 0.0),
            Vector3::new(50.0, 50.0, 50.0),
            2.0,
        )
    }

    #[test]
    fn test_solid_box_volume() {
        let board = board();
        assert_eq!(board.dims(), (50, 50));
        assert_relative_eq!(board.volume(), 100.0 * 100.0 * 50.0, epsilon = 1e-6);
        assert_relative_eq!(board.max_top().unwrap(), 50.0);
    }

    #[test]
    fn test_cells_in_rect_clamps_to_board() {
        let board = board();
        let (us, vs) = board.cells_in_rect(-60.0, 48.0, -46.0, 60.0);
        assert_eq!(us, 0..2);
        assert_eq!(vs, 49..50);
    }

    #[test]
    fn test_removal_changes_volume_exactly() {
        let mut board = board();
        let before = board.volume();
        let area = board.cell_area();
        let mut removed = 0.0;
        let (us, vs) = board.cells_in_rect(-10.0, -10.0, 10.0, 10.0);
        for iv in vs {
            for iu in us.clone() {
                removed += board.column_mut(iu, iv).remove(45.0, 50.0) * area;
            }
        }
        assert_relative_eq!(board.volume(), before - removed, epsilon = 1e-6);
        assert!(removed > 0.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut board = board();
        let initial = board.volume();
        board.column_mut(0, 0).remove(0.0, 50.0);
        assert!(board.volume() < initial);
        board.reset();
        assert_relative_eq!(board.volume(), initial, epsilon = 1e-9);
    }

    #[test]
    fn test_height_mesh_covers_grid() {
        let board = DexelBoard::solid_box(
            BoardAxis::Z,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 10.0, 5.0),
            2.0,
        );
        let (vertices, triangles) = board.height_mesh();
        assert_eq!(vertices.len(), 25);
        assert_eq!(triangles.len(), 2 * 16);
        assert!(vertices.iter().all(|v| (v[2] - 5.0).abs() < 1e-9));
    }
}
