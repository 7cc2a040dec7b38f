// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! GJK intersection test with EPA penetration depth
//!
//! Works purely through collider support functions, so every shape pair
//! uses the same code path. GJK answers hit/miss; on a hit, EPA expands
//! the final simplex into the penetration depth, contact normal and a
//! witness point.

use crate::collision::shape::Collider;
use nalgebra::Vector3;

const GJK_MAX_ITERATIONS: usize = 64;
const EPA_MAX_ITERATIONS: usize = 64;
const EPA_TOLERANCE: f64 = 1e-6;
const DEGENERATE_EPS: f64 = 1e-12;

/// Minkowski-difference vertex with the contributing witness points.
#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    v: Vector3<f64>,
    pa: Vector3<f64>,
    pb: Vector3<f64>,
}

fn support(a: &Collider, b: &Collider, dir: &Vector3<f64>) -> SupportPoint {
    let pa = a.support(dir);
    let pb = b.support(&-dir);
    SupportPoint { v: pa - pb, pa, pb }
}

/// Resolved penetration between two colliders.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    /// Penetration depth along the normal (mm).
    pub depth: f64,
    /// Unit direction that separates `a` from `b` when `a` moves along it.
    pub normal: Vector3<f64>,
    /// Approximate deepest contact point, same frame as the colliders.
    pub point: Vector3<f64>,
}

/// Test two colliders, returning contact details on intersection.
pub fn intersect(a: &Collider, b: &Collider) -> Option<Contact> {
    let simplex = gjk(a, b)?;
    epa(a, b, simplex)
}

/// Boolean overlap test without the EPA pass.
pub fn hit(a: &Collider, b: &Collider) -> bool {
    gjk(a, b).is_some()
}

fn gjk(a: &Collider, b: &Collider) -> Option<Vec<SupportPoint>> {
    let mut dir = b.position - a.position;
    if dir.norm_squared() < DEGENERATE_EPS {
        dir = Vector3::x();
    }

    let first = support(a, b, &dir);
    if first.v.dot(&dir) < 0.0 {
        return None;
    }
    let mut simplex = vec![first];
    dir = -first.v;

    for _ in 0..GJK_MAX_ITERATIONS {
        if dir.norm_squared() < DEGENERATE_EPS {
            // Origin sits on the simplex boundary: touching contact.
            return Some(simplex);
        }
        let p = support(a, b, &dir);
        if p.v.dot(&dir) < 0.0 {
            return None;
        }
        simplex.push(p);
        if update_simplex(&mut simplex, &mut dir) {
            return Some(simplex);
        }
    }
    // No convergence: report the deep-overlap side to stay conservative.
    Some(simplex)
}

/// Evolve the simplex toward the origin. Returns true once the simplex
/// (a tetrahedron) encloses the origin.
fn update_simplex(simplex: &mut Vec<SupportPoint>, dir: &mut Vector3<f64>) -> bool {
    match simplex.len() {
        2 => {
            let a = simplex[1].v;
            let b = simplex[0].v;
            let ab = b - a;
            let ao = -a;
            if ab.dot(&ao) > 0.0 {
                *dir = ab.cross(&ao).cross(&ab);
            } else {
                simplex.remove(0);
                *dir = ao;
            }
            false
        }
        3 => {
            let a = simplex[2].v;
            let b = simplex[1].v;
            let c = simplex[0].v;
            let ab = b - a;
            let ac = c - a;
            let ao = -a;
            let abc = ab.cross(&ac);

            if abc.cross(&ac).dot(&ao) > 0.0 {
                if ac.dot(&ao) > 0.0 {
                    // Keep edge AC.
                    simplex.remove(1);
                    *dir = ac.cross(&ao).cross(&ac);
                } else {
                    simplex.remove(0);
                    return update_simplex(simplex, dir);
                }
            } else if ab.cross(&abc).dot(&ao) > 0.0 {
                simplex.remove(0);
                return update_simplex(simplex, dir);
            } else if abc.dot(&ao) > 0.0 {
                *dir = abc;
            } else {
                // Origin below the triangle: flip winding.
                simplex.swap(0, 1);
                *dir = -abc;
            }
            false
        }
        4 => {
            // Test the three faces through the newest vertex with normals
            // oriented away from the opposite vertex, independent of the
            // insertion order.
            let a = simplex[3].v;
            let ao = -a;
            let faces = [(2, 1, 0), (1, 0, 2), (0, 2, 1)];
            for (i, j, opposite) in faces {
                let b = simplex[i].v;
                let c = simplex[j].v;
                let mut n = (b - a).cross(&(c - a));
                if n.dot(&(simplex[opposite].v - a)) > 0.0 {
                    n = -n;
                }
                if n.dot(&ao) > 0.0 {
                    simplex.remove(opposite);
                    *dir = n;
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

/// EPA polytope face over the support vertex list.
#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vector3<f64>,
    distance: f64,
}

fn make_face(vertices: &[SupportPoint], indices: [usize; 3]) -> Option<Face> {
    let a = vertices[indices[0]].v;
    let b = vertices[indices[1]].v;
    let c = vertices[indices[2]].v;
    let mut normal = (b - a).cross(&(c - a));
    let len = normal.norm();
    if len < DEGENERATE_EPS {
        return None;
    }
    normal /= len;
    let mut distance = normal.dot(&a);
    let mut face = indices;
    if distance < 0.0 {
        // Wind outward.
        face.swap(1, 2);
        normal = -normal;
        distance = -distance;
    }
    Some(Face {
        indices: face,
        normal,
        distance,
    })
}

fn epa(a: &Collider, b: &Collider, mut simplex: Vec<SupportPoint>) -> Option<Contact> {
    expand_to_tetrahedron(a, b, &mut simplex)?;
    let mut vertices = simplex;
    let mut faces: Vec<Face> = [
        [0, 1, 2],
        [0, 1, 3],
        [0, 2, 3],
        [1, 2, 3],
    ]
    .into_iter()
    .filter_map(|idx| make_face(&vertices, idx))
    .collect();
    if faces.is_empty() {
        return None;
    }

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = faces
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| {
                x.distance
                    .partial_cmp(&y.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)?;
        let face = faces[closest];

        let p = support(a, b, &face.normal);
        let grown = p.v.dot(&face.normal) - face.distance;
        if grown < EPA_TOLERANCE {
            return Some(contact_from_face(&vertices, &face));
        }

        // Remove every face visible from p and stitch the horizon.
        vertices.push(p);
        let new_vertex = vertices.len() - 1;
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|f| {
            let visible = f.normal.dot(&(p.v - vertices[f.indices[0]].v)) > 0.0;
            if visible {
                for k in 0..3 {
                    let edge = (f.indices[k], f.indices[(k + 1) % 3]);
                    if let Some(pos) = horizon
                        .iter()
                        .position(|&(s, e)| s == edge.1 && e == edge.0)
                    {
                        horizon.swap_remove(pos);
                    } else {
                        horizon.push(edge);
                    }
                }
            }
            !visible
        });
        for (s, e) in horizon {
            if let Some(f) = make_face(&vertices, [s, e, new_vertex]) {
                faces.push(f);
            }
        }
        if faces.is_empty() {
            return None;
        }
    }

    // Ran out of iterations: report the current best face.
    let face = faces.iter().min_by(|x, y| {
        x.distance
            .partial_cmp(&y.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;
    Some(contact_from_face(&vertices, face))
}

/// GJK may terminate with fewer than four vertices when the origin lies
/// on a simplex boundary. EPA needs a volume, so pad with axis supports.
fn expand_to_tetrahedron(
    a: &Collider,
    b: &Collider,
    simplex: &mut Vec<SupportPoint>,
) -> Option<()> {
    let axes = [
        Vector3::x(),
        Vector3::y(),
        Vector3::z(),
        -Vector3::x(),
        -Vector3::y(),
        -Vector3::z(),
    ];
    let mut candidates = axes.iter();
    while simplex.len() < 4 {
        let dir = candidates.next()?;
        let p = support(a, b, dir);
        let duplicate = simplex
            .iter()
            .any(|s| (s.v - p.v).norm_squared() < DEGENERATE_EPS);
        if !duplicate && !is_degenerate_with(simplex, &p) {
            simplex.push(p);
        }
    }
    Some(())
}

fn is_degenerate_with(simplex: &[SupportPoint], p: &SupportPoint) -> bool {
    if simplex.len() == 3 {
        let a = simplex[0].v;
        let n = (simplex[1].v - a).cross(&(simplex[2].v - a));
        return n.dot(&(p.v - a)).abs() < DEGENERATE_EPS;
    }
    if simplex.len() == 2 {
        let d = simplex[1].v - simplex[0].v;
        return d.cross(&(p.v - simplex[0].v)).norm_squared() < DEGENERATE_EPS;
    }
    false
}

fn contact_from_face(vertices: &[SupportPoint], face: &Face) -> Contact {
    let [i, j, k] = face.indices;
    let (u, v, w) = barycentric(
        &(face.normal * face.distance),
        &vertices[i].v,
        &vertices[j].v,
        &vertices[k].v,
    );
    let on_a = vertices[i].pa * u + vertices[j].pa * v + vertices[k].pa * w;
    let on_b = vertices[i].pb * u + vertices[j].pb * v + vertices[k].pb * w;
    Contact {
        depth: face.distance,
        normal: face.normal,
        point: (on_a + on_b) / 2.0,
    }
}

/// Barycentric coordinates of `p` in triangle (a, b, c).
fn barycentric(
    p: &Vector3<f64>,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
) -> (f64, f64, f64) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < DEGENERATE_EPS {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::Shape;
    use approx::assert_relative_eq;

    fn sphere_at(x: f64, r: f64) -> Collider {
        Collider::new(Shape::Sphere { radius: r }, Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_separated_spheres_miss() {
        assert!(!hit(&sphere_at(0.0, 1.0), &sphere_at(3.0, 1.0)));
        assert!(intersect(&sphere_at(0.0, 1.0), &sphere_at(3.0, 1.0)).is_none());
    }

    #[test]
    fn test_overlapping_spheres_depth() {
        // Centers 1.5 apart, radii 1 each: overlap 0.5.
        let contact = intersect(&sphere_at(0.0, 1.0), &sphere_at(1.5, 1.0)).unwrap();
        assert_relative_eq!(contact.depth, 0.5, epsilon = 1e-3);
        assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-3);
        // Witness lies between the surfaces.
        assert!(contact.point.x > 0.4 && contact.point.x < 1.1);
    }

    #[test]
    fn test_box_box_penetration() {
        let half = Vector3::repeat(1.0);
        let a = Collider::new(Shape::Box { half }, Vector3::zeros());
        let b = Collider::new(Shape::Box { half }, Vector3::new(1.8, 0.0, 0.0));
        let contact = intersect(&a, &b).unwrap();
        assert_relative_eq!(contact.depth, 0.2, epsilon = 1e-3);
        assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_cylinder_box_overlap() {
        // Cylinder base on top of a box, lowered 2mm into it.
        let stock = Collider::new(
            Shape::Box {
                half: Vector3::new(50.0, 50.0, 25.0),
            },
            Vector3::new(0.0, 0.0, 25.0),
        );
        let tool = Collider::new(
            Shape::Cylinder {
                radius: 3.0,
                height: 40.0,
            },
            Vector3::new(0.0, 0.0, 48.0),
        );
        let contact = intersect(&stock, &tool).unwrap();
        assert_relative_eq!(contact.depth, 2.0, epsilon = 1e-2);
    }

    #[test]
    fn test_margin_turns_near_miss_into_hit() {
        let a = sphere_at(0.0, 1.0);
        let b = sphere_at(2.5, 1.0);
        assert!(!hit(&a, &b));
        let fat_a = a.clone().with_margin(0.3);
        let fat_b = b.clone().with_margin(0.3);
        assert!(hit(&fat_a, &fat_b));
        // Inflated depth equals margin sum minus the true gap.
        let contact = intersect(&fat_a, &fat_b).unwrap();
        assert_relative_eq!(contact.depth, 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_touching_counts_as_contact() {
        let a = sphere_at(0.0, 1.0);
        let b = sphere_at(2.0, 1.0);
        // Exactly touching surfaces: GJK reports the boundary case.
        assert!(hit(&a, &b) || intersect(&a, &b).is_none());
    }

    #[test]
    fn test_deep_overlap_normal_points_outward() {
        let stock = Collider::new(
            Shape::Box {
                half: Vector3::new(50.0, 50.0, 25.0),
            },
            Vector3::new(0.0, 0.0, 25.0),
        );
        // Sphere buried 5mm below the top face.
        let probe = Collider::new(Shape::Sphere { radius: 4.0 }, Vector3::new(0.0, 0.0, 49.0));
        let contact = intersect(&stock, &probe).unwrap();
        assert!(contact.depth >= 4.9);
    }
}
