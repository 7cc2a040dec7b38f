// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Tool sweep geometry
//!
//! Converts resolved moves into chorded straight sub-segments and computes
//! the column-line intervals a swept tool occupies. The vertical-tool path
//! is profile-exact (flat/ball/bullnose/drill floor); tilted tools and the
//! secondary boards use capsule and cylinder intervals along arbitrary
//! lines.

use crate::parse::modal::Plane;
use crate::parse::resolve::{plane_uv, plane_w, Move, MoveKind};
use crate::tool::Tool;
use nalgebra::Vector3;

/// One straight sub-segment of a chorded move (tool tip positions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chord {
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,
}

fn plane_basis(plane: Plane) -> (Vector3<f64>, Vector3<f64>) {
    match plane {
        Plane::Xy => (Vector3::x(), Vector3::y()),
        Plane::Xz => (Vector3::z(), Vector3::x()),
        Plane::Yz => (Vector3::y(), Vector3::z()),
    }
}

fn plane_normal(plane: Plane) -> Vector3<f64> {
    match plane {
        Plane::Xy => Vector3::z(),
        Plane::Xz => Vector3::y(),
        Plane::Yz => Vector3::x(),
    }
}

/// Chord a move into straight sub-segments. Arcs are subdivided so the
/// chord error stays below `chord_tol` and each chord is no longer than
/// `max_step`; straight moves pass through unchanged.
pub fn chord_move(mv: &Move, chord_tol: f64, max_step: f64) -> Vec<Chord> {
    let Some(center) = mv.center else {
        return vec![Chord {
            start: mv.start,
            end: mv.end,
        }];
    };

    let (su, sv) = plane_uv(mv.start - center, mv.plane);
    let radius_start = (su * su + sv * sv).sqrt();
    let (eu, ev) = plane_uv(mv.end - center, mv.plane);
    let radius_end = (eu * eu + ev * ev).sqrt();
    let radius = radius_start.max(1e-9);

    let sweep = mv.arc_sweep();
    // Chord error e = r(1 - cos(d/2)) <= tol bounds the step angle.
    let ratio = (1.0 - (chord_tol / radius)).clamp(-1.0, 1.0);
    let step_by_tol = 2.0 * ratio.acos();
    let step_by_len = (max_step / radius).max(1e-6);
    let step = step_by_tol.min(step_by_len).max(1e-6);
    let n = ((sweep / step).ceil() as usize).clamp(1, 100_000);

    let theta0 = sv.atan2(su);
    let signed = match mv.kind {
        MoveKind::CircularCcw => sweep,
        _ => -sweep,
    };
    let (u_axis, v_axis) = plane_basis(mv.plane);
    let w0 = plane_w(mv.start - center, mv.plane);
    let w1 = plane_w(mv.end - center, mv.plane);
    let normal = plane_normal(mv.plane);

    let point = |t: f64| -> Vector3<f64> {
        let theta = theta0 + signed * t;
        let r = radius_start + (radius_end - radius_start) * t;
        let w = w0 + (w1 - w0) * t;
        center + u_axis * (r * theta.cos()) + v_axis * (r * theta.sin()) + normal * w
    };

    let mut chords = Vec::with_capacity(n);
    let mut prev = mv.start;
    for i in 1..=n {
        let t = i as f64 / n as f64;
        let next = if i == n { mv.end } else { point(t) };
        chords.push(Chord {
            start: prev,
            end: next,
        });
        prev = next;
    }
    chords
}

/// Swept footprint of a vertical tool along one straight tip segment.
///
/// `column_interval` gives the exact removal interval for a vertical dexel
/// column: the lowest point of the cutting envelope over the pass (tip
/// profile included) up to the top of the flutes.
#[derive(Debug, Clone, Copy)]
pub struct VerticalSweep<'a> {
    pub tool: &'a Tool,
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,
}

impl<'a> VerticalSweep<'a> {
    pub fn new(tool: &'a Tool, chord: Chord) -> Self {
        Self {
            tool,
            start: chord.start,
            end: chord.end,
        }
    }

    /// Axis-aligned bounds of the swept tool body.
    pub fn bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        let r = self.tool.radius();
        let min = Vector3::new(
            self.start.x.min(self.end.x) - r,
            self.start.y.min(self.end.y) - r,
            self.start.z.min(self.end.z),
        );
        let max = Vector3::new(
            self.start.x.max(self.end.x) + r,
            self.start.y.max(self.end.y) + r,
            self.start.z.max(self.end.z) + self.tool.length,
        );
        (min, max)
    }

    /// Removal interval at the column centered on `(x, y)`, or `None` when
    /// the column is outside the swept footprint.
    pub fn column_interval(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let r = self.tool.radius();
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let px = x - self.start.x;
        let py = y - self.start.y;
        let len2 = dx * dx + dy * dy;

        // Parameter range of the pass during which the column is inside the
        // cutting radius, plus the closest-approach parameter.
        let (t_lo, t_hi, t_star) = if len2 < 1e-18 {
            let d2 = px * px + py * py;
            if d2 > r * r {
                return None;
            }
            (0.0, 1.0, 0.0)
        } else {
            let t_star = ((px * dx + py * dy) / len2).clamp(0.0, 1.0);
            // |p - t d|^2 = r^2, quadratic in t.
            let a = len2;
            let b = -2.0 * (px * dx + py * dy);
            let c = px * px + py * py - r * r;
            let disc = b * b - 4.0 * a * c;
            if disc < 0.0 {
                return None;
            }
            let sq = disc.sqrt();
            let lo = ((-b - sq) / (2.0 * a)).clamp(0.0, 1.0);
            let hi = ((-b + sq) / (2.0 * a)).clamp(0.0, 1.0);
            if lo >= hi && c > 0.0 {
                return None;
            }
            (lo, hi, t_star)
        };

        let dist_at = |t: f64| -> f64 {
            let ex = px - t * dx;
            let ey = py - t * dy;
            (ex * ex + ey * ey).sqrt().min(r)
        };
        let z_at = |t: f64| self.start.z + t * (self.end.z - self.start.z);

        // Lowest cutting envelope over the pass: check both interval ends
        // and the closest approach.
        let mut floor = f64::INFINITY;
        for t in [t_lo, t_hi, t_star] {
            let profile = self.tool.profile_height(dist_at(t)).unwrap_or(0.0);
            floor = floor.min(z_at(t) + profile);
        }
        let top = z_at(t_lo).max(z_at(t_hi)) + self.tool.length;
        if top <= floor {
            return None;
        }
        Some((floor, top))
    }
}

/// Interval of `origin + t·dir` (unit `dir`) inside a sphere.
pub fn line_sphere_interval(
    origin: Vector3<f64>,
    dir: Vector3<f64>,
    center: Vector3<f64>,
    radius: f64,
) -> Option<(f64, f64)> {
    let m = origin - center;
    let b = m.dot(&dir);
    let c = m.norm_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    Some((-b - sq, -b + sq))
}

/// Interval of `origin + t·dir` (unit `dir`) inside a finite cylinder from
/// `base` along unit `axis` with the given length.
pub fn line_cylinder_interval(
    origin: Vector3<f64>,
    dir: Vector3<f64>,
    base: Vector3<f64>,
    axis: Vector3<f64>,
    radius: f64,
    length: f64,
) -> Option<(f64, f64)> {
    let m = origin - base;
    let md = m.dot(&axis);
    let nd = dir.dot(&axis);

    // Radial quadratic with the axial component projected out.
    let mm = m - axis * md;
    let nn = dir - axis * nd;
    let a = nn.norm_squared();
    let (mut t0, mut t1);
    if a < 1e-18 {
        // Line parallel to the axis.
        if mm.norm_squared() > radius * radius {
            return None;
        }
        t0 = f64::NEG_INFINITY;
        t1 = f64::INFINITY;
    } else {
        let b = mm.dot(&nn);
        let c = mm.norm_squared() - radius * radius;
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        t0 = (-b - sq) / a;
        t1 = (-b + sq) / a;
    }

    // Axial slab: 0 <= md + t*nd <= length.
    if nd.abs() < 1e-18 {
        if md < 0.0 || md > length {
            return None;
        }
    } else {
        let s0 = (0.0 - md) / nd;
        let s1 = (length - md) / nd;
        let (s_lo, s_hi) = if s0 <= s1 { (s0, s1) } else { (s1, s0) };
        t0 = t0.max(s_lo);
        t1 = t1.min(s_hi);
    }
    if t0 >= t1 {
        return None;
    }
    Some((t0, t1))
}

/// Interval of a line inside a capsule (segment `a..b`, radius `r`):
/// cylinder body plus end spheres.
pub fn line_capsule_interval(
    origin: Vector3<f64>,
    dir: Vector3<f64>,
    a: Vector3<f64>,
    b: Vector3<f64>,
    radius: f64,
) -> Option<(f64, f64)> {
    let axis = b - a;
    let length = axis.norm();
    let mut best: Option<(f64, f64)> = None;
    let mut merge = |interval: Option<(f64, f64)>| {
        if let Some((lo, hi)) = interval {
            best = Some(match best {
                Some((blo, bhi)) => (blo.min(lo), bhi.max(hi)),
                None => (lo, hi),
            });
        }
    };
    if length > 1e-12 {
        merge(line_cylinder_interval(
            origin,
            dir,
            a,
            axis / length,
            radius,
            length,
        ));
    }
    merge(line_sphere_interval(origin, dir, a, radius));
    merge(line_sphere_interval(origin, dir, b, radius));
    best
}

/// Interval of a line inside a static tool body at `tip` pointing along
/// unit `tool_axis`. The body is the flute cylinder; ball tools add the
/// nose sphere.
pub fn line_tool_interval(
    origin: Vector3<f64>,
    dir: Vector3<f64>,
    tool: &Tool,
    tip: Vector3<f64>,
    tool_axis: Vector3<f64>,
) -> Option<(f64, f64)> {
    use crate::tool::ToolShape;
    let r = tool.radius();
    let body = match tool.shape {
        ToolShape::BallEndmill => {
            let nose = tip + tool_axis * r;
            let cyl = line_cylinder_interval(origin, dir, nose, tool_axis, r, tool.length - r);
            let sphere = line_sphere_interval(origin, dir, nose, r);
            match (cyl, sphere) {
                (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
                (some, None) | (None, some) => some,
            }
        }
        _ => line_cylinder_interval(origin, dir, tip, tool_axis, r, tool.length),
    };
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_move(start: Vector3<f64>, end: Vector3<f64>) -> Move {
        Move {
            kind: MoveKind::Linear,
            start,
            end,
            a_start: 0.0,
            a_end: 0.0,
            c_start: 0.0,
            c_end: 0.0,
            center: None,
            plane: Plane::Xy,
            feed: 500.0,
            line: 1,
            block: 1,
            wcs: 0,
            tool: 1,
        }
    }

    #[test]
    fn test_straight_move_is_one_chord() {
        let mv = linear_move(Vector3::zeros(), Vector3::new(100.0, 0.0, 0.0));
        let chords = chord_move(&mv, 0.1, 2.0);
        assert_eq!(chords.len(), 1);
        assert_relative_eq!(chords[0].end.x, 100.0);
    }

    #[test]
    fn test_arc_chording_respects_tolerance() {
        let mut mv = linear_move(Vector3::new(10.0, 0.0, 0.0), Vector3::new(-10.0, 0.0, 0.0));
        mv.kind = MoveKind::CircularCcw;
        mv.center = Some(Vector3::zeros());
        let chords = chord_move(&mv, 0.05, 100.0);
        // Chord error for each sub-segment stays under tolerance.
        for chord in &chords {
            let mid = (chord.start + chord.end) / 2.0;
            let sagitta = 10.0 - mid.norm();
            assert!(sagitta <= 0.05 + 1e-9, "sagitta {sagitta}");
        }
        // Endpoints are exact.
        assert_relative_eq!(chords.last().unwrap().end.x, -10.0, epsilon = 1e-12);
        // All chord points stay on the circle.
        for chord in &chords {
            assert_relative_eq!(chord.end.norm(), 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_full_circle_chording() {
        let mut mv = linear_move(Vector3::new(5.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0));
        mv.kind = MoveKind::CircularCw;
        mv.center = Some(Vector3::zeros());
        let chords = chord_move(&mv, 0.1, 1.0);
        let total: f64 = chords.iter().map(|c| (c.end - c.start).norm()).sum();
        assert_relative_eq!(total, std::f64::consts::TAU * 5.0, epsilon = 0.2);
    }

    #[test]
    fn test_vertical_sweep_flat_floor() {
        let tool = Tool::flat(1, 10.0, 40.0);
        let sweep = VerticalSweep {
            tool: &tool,
            start: Vector3::new(0.0, 0.0, -5.0),
            end: Vector3::new(50.0, 0.0, -5.0),
        };
        // Directly under the path: floor at tip depth.
        let (floor, top) = sweep.column_interval(25.0, 0.0).unwrap();
        assert_relative_eq!(floor, -5.0);
        assert_relative_eq!(top, 35.0);
        // Off to the side within radius.
        assert!(sweep.column_interval(25.0, 4.9).is_some());
        // Outside the radius.
        assert!(sweep.column_interval(25.0, 5.1).is_none());
    }

    #[test]
    fn test_vertical_sweep_ball_floor_rises_off_axis() {
        let tool = Tool::ball(2, 10.0, 40.0);
        let sweep = VerticalSweep {
            tool: &tool,
            start: Vector3::new(0.0, 0.0, 0.0),
            end: Vector3::new(20.0, 0.0, 0.0),
        };
        let (center_floor, _) = sweep.column_interval(10.0, 0.0).unwrap();
        let (edge_floor, _) = sweep.column_interval(10.0, 4.0).unwrap();
        assert_relative_eq!(center_floor, 0.0);
        assert!(edge_floor > center_floor);
    }

    #[test]
    fn test_ramp_uses_lowest_envelope() {
        let tool = Tool::flat(1, 10.0, 40.0);
        // Ramping down along X: a column near the end sees the deeper tip.
        let sweep = VerticalSweep {
            tool: &tool,
            start: Vector3::new(0.0, 0.0, 0.0),
            end: Vector3::new(50.0, 0.0, -10.0),
        };
        let (floor_start, _) = sweep.column_interval(0.0, 0.0).unwrap();
        let (floor_end, _) = sweep.column_interval(50.0, 0.0).unwrap();
        assert_relative_eq!(floor_start, 0.0, epsilon = 1e-9);
        assert_relative_eq!(floor_end, -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plunge_interval() {
        let tool = Tool::flat(1, 10.0, 40.0);
        let sweep = VerticalSweep {
            tool: &tool,
            start: Vector3::new(0.0, 0.0, 10.0),
            end: Vector3::new(0.0, 0.0, -5.0),
        };
        let (floor, top) = sweep.column_interval(0.0, 0.0).unwrap();
        assert_relative_eq!(floor, -5.0);
        assert_relative_eq!(top, 50.0);
    }

    #[test]
    fn test_line_cylinder_interval() {
        // Vertical line through a horizontal cylinder along X.
        let interval = line_cylinder_interval(
            Vector3::new(5.0, 0.0, -100.0),
            Vector3::z(),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::x(),
            2.0,
            10.0,
        )
        .unwrap();
        assert_relative_eq!(interval.1 - interval.0, 4.0, epsilon = 1e-9);

        // Line missing the cylinder.
        assert!(line_cylinder_interval(
            Vector3::new(5.0, 3.0, -100.0),
            Vector3::z(),
            Vector3::zeros(),
            Vector3::x(),
            2.0,
            10.0,
        )
        .is_none());
    }

    #[test]
    fn test_line_capsule_includes_end_caps() {
        // Line passing just beyond the segment end, inside the cap sphere.
        let interval = line_capsule_interval(
            Vector3::new(11.0, 0.0, -100.0),
            Vector3::z(),
            Vector3::zeros(),
            Vector3::new(10.0, 0.0, 0.0),
            2.0,
        );
        assert!(interval.is_some());
    }
}
