//! Triangle and tetrahedron measure functions. Pure geometry, no metric
//! weighting — the metric-aware versions (edge length, mean-ratio quality)
//! live in [`crate::metric`], which calls down into these for the Euclidean
//! building blocks.

use super::{Point3, Vector3};

/// Outward-facing normal of a triangle, CCW winding as seen from outside.
pub fn triangle_normal(v0: &Point3, v1: &Point3, v2: &Point3) -> Vector3 {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    edge1.cross(&edge2).normalize()
}

pub fn triangle_area(v0: &Point3, v1: &Point3, v2: &Point3) -> f64 {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    edge1.cross(&edge2).norm() / 2.0
}

pub fn points_centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3 = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

/// Signed volume of the tetrahedron (v0,v1,v2,v3), positive when v3 is on the
/// side of (v0,v1,v2) that makes the triangle's normal (via `triangle_normal`)
/// point away from v3 — i.e. the tet is consistently outward-oriented.
///
/// `det([v1-v0, v2-v0, v3-v0]) / 6`.
pub fn signed_tet_volume(v0: &Point3, v1: &Point3, v2: &Point3, v3: &Point3) -> f64 {
    let a = v1 - v0;
    let b = v2 - v0;
    let c = v3 - v0;
    a.cross(&b).dot(&c) / 6.0
}

pub fn tet_is_positive(v0: &Point3, v1: &Point3, v2: &Point3, v3: &Point3) -> bool {
    signed_tet_volume(v0, v1, v2, v3) > 0.0
}
