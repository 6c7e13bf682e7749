//! Kernel-agnostic 3D primitives shared by the metric algebra, cavity, and
//! operators. Nothing here knows about nodes, cells, or CAD; it is the same
//! small vocabulary (`Point3`, `Vector3`, `ApproxEq`) used throughout, just
//! aimed at tetrahedra instead of sketch curves.

use nalgebra as na;

pub type Point3 = na::Point3<f64>;
pub type Vector3 = na::Vector3<f64>;
pub type Matrix3 = na::Matrix3<f64>;

/// General-purpose float tolerance. Operators that need a CAD-specific or
/// metric-specific tolerance carry their own constant/config field instead of
/// reusing this one.
pub const EPSILON: f64 = 1e-10;

pub trait ApproxEq {
    fn approx_eq(&self, other: &Self) -> bool;
}

impl ApproxEq for f64 {
    fn approx_eq(&self, other: &Self) -> bool {
        (self - other).abs() < EPSILON
    }
}

impl ApproxEq for Point3 {
    fn approx_eq(&self, other: &Self) -> bool {
        na::distance_squared(self, other) < EPSILON * EPSILON
    }
}

impl ApproxEq for Vector3 {
    fn approx_eq(&self, other: &Self) -> bool {
        (self - other).norm_squared() < EPSILON * EPSILON
    }
}

pub mod primitives;
pub use primitives::*;

pub mod tet;
pub use tet::*;

pub fn dist_sq(p1: &Point3, p2: &Point3) -> f64 {
    na::distance_squared(p1, p2)
}
