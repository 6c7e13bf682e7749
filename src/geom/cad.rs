//! CAD facade: the only seam through which the adaptation kernel talks to a
//! geometry kernel. Mirrors the reference product's `GeometryKernel` trait
//! with `TruckKernel` as the production implementation and a lighter
//! in-process stand-in for tests — here `NullCad` (no CAD at all, mesh-only
//! mode) and `AnalyticCad` (closed-form plane/cylinder/sphere primitives).

use crate::error::{AdaptError, AdaptResult};
use crate::geom::types::{Curvature, EntityKind};
use crate::geometry::{Point3, Vector3};

/// Object-safe facade over a CAD kernel. The core never branches on which
/// implementation is active — it only calls through this trait.
pub trait CadQuery: Send + Sync {
    fn eval(&self, kind: EntityKind, id: i32, params: [f64; 2]) -> AdaptResult<Point3>;

    fn inverse_eval(&self, kind: EntityKind, id: i32, xyz: &Point3) -> AdaptResult<[f64; 2]>;

    fn curvature(&self, face_id: i32, params: [f64; 2]) -> AdaptResult<Curvature>;

    fn tolerance(&self, kind: EntityKind, id: i32) -> AdaptResult<f64>;
}

/// No CAD kernel configured: every node is treated as interior. Lets the
/// engine run in mesh-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCad;

impl CadQuery for NullCad {
    fn eval(&self, _kind: EntityKind, _id: i32, _params: [f64; 2]) -> AdaptResult<Point3> {
        Err(AdaptError::implement_missing("no CAD kernel configured"))
    }

    fn inverse_eval(&self, _kind: EntityKind, _id: i32, _xyz: &Point3) -> AdaptResult<[f64; 2]> {
        Err(AdaptError::implement_missing("no CAD kernel configured"))
    }

    fn curvature(&self, _face_id: i32, _params: [f64; 2]) -> AdaptResult<Curvature> {
        Err(AdaptError::implement_missing("no CAD kernel configured"))
    }

    fn tolerance(&self, _kind: EntityKind, _id: i32) -> AdaptResult<f64> {
        Err(AdaptError::implement_missing("no CAD kernel configured"))
    }
}

/// A closed-form test surface: plane, cylinder, or sphere. Entities are
/// addressed by a small integer id the caller assigns when constructing the
/// backend (see [`AnalyticCad::with_face`]).
#[derive(Debug, Clone, Copy)]
pub enum AnalyticSurface {
    Plane { origin: Point3, normal: Vector3, u_axis: Vector3 },
    Cylinder { axis_origin: Point3, axis: Vector3, radius: f64 },
    Sphere { center: Point3, radius: f64 },
}

/// Synthetic CAD backend over a small set of analytic faces, for tests that
/// need real curvature and projection behavior without a real kernel.
/// Mirrors `AnalyticGeometry` in the reference product's topology registry.
#[derive(Debug, Default, Clone)]
pub struct AnalyticCad {
    faces: Vec<(i32, AnalyticSurface)>,
}

impl AnalyticCad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_face(mut self, id: i32, surface: AnalyticSurface) -> Self {
        self.faces.push((id, surface));
        self
    }

    fn surface(&self, id: i32) -> AdaptResult<&AnalyticSurface> {
        self.faces
            .iter()
            .find(|(fid, _)| *fid == id)
            .map(|(_, s)| s)
            .ok_or_else(|| AdaptError::not_found(format!("no analytic face {id}")))
    }
}

impl CadQuery for AnalyticCad {
    fn eval(&self, kind: EntityKind, id: i32, params: [f64; 2]) -> AdaptResult<Point3> {
        if kind != EntityKind::Face {
            return Err(AdaptError::implement_missing("AnalyticCad only models faces"));
        }
        let [u, v] = params;
        match self.surface(id)? {
            AnalyticSurface::Plane { origin, normal, u_axis } => {
                let n = normal.normalize();
                let u_dir = u_axis.normalize();
                let v_dir = n.cross(&u_dir);
                Ok(origin + u_dir * u + v_dir * v)
            }
            AnalyticSurface::Cylinder { axis_origin, axis, radius } => {
                let z = axis.normalize();
                let (x, y) = orthonormal_basis(&z);
                let point_on_axis = axis_origin + z * v;
                Ok(point_on_axis + (x * u.cos() + y * u.sin()) * *radius)
            }
            AnalyticSurface::Sphere { center, radius } => {
                let (theta, phi) = (u, v);
                let dir = Vector3::new(
                    phi.sin() * theta.cos(),
                    phi.sin() * theta.sin(),
                    phi.cos(),
                );
                Ok(center + dir * *radius)
            }
        }
    }

    fn inverse_eval(&self, kind: EntityKind, id: i32, xyz: &Point3) -> AdaptResult<[f64; 2]> {
        if kind != EntityKind::Face {
            return Err(AdaptError::implement_missing("AnalyticCad only models faces"));
        }
        match self.surface(id)? {
            AnalyticSurface::Plane { origin, normal, u_axis } => {
                let n = normal.normalize();
                let u_dir = u_axis.normalize();
                let v_dir = n.cross(&u_dir);
                let d = xyz - origin;
                Ok([d.dot(&u_dir), d.dot(&v_dir)])
            }
            AnalyticSurface::Cylinder { axis_origin, axis, radius: _ } => {
                let z = axis.normalize();
                let (x, y) = orthonormal_basis(&z);
                let d = xyz - axis_origin;
                let v = d.dot(&z);
                let local = d - z * v;
                let u = local.dot(&y).atan2(local.dot(&x));
                Ok([u, v])
            }
            AnalyticSurface::Sphere { center, radius: _ } => {
                let d = (xyz - center).normalize();
                let phi = d.z.clamp(-1.0, 1.0).acos();
                let theta = d.y.atan2(d.x);
                Ok([theta, phi])
            }
        }
    }

    fn curvature(&self, face_id: i32, params: [f64; 2]) -> AdaptResult<Curvature> {
        match self.surface(face_id)? {
            AnalyticSurface::Plane { normal, u_axis, .. } => {
                let n = normal.normalize();
                let u_dir = u_axis.normalize();
                let v_dir = n.cross(&u_dir);
                Ok(Curvature { kr: 0.0, r_hat: u_dir, ks: 0.0, s_hat: v_dir, normal: n })
            }
            AnalyticSurface::Cylinder { axis, radius, .. } => {
                let z = axis.normalize();
                let (x, y) = orthonormal_basis(&z);
                let [u, _v] = params;
                let radial = x * u.cos() + y * u.sin();
                Ok(Curvature { kr: 1.0 / radius, r_hat: radial, ks: 0.0, s_hat: z, normal: radial })
            }
            AnalyticSurface::Sphere { radius, .. } => {
                let eval = self.eval(EntityKind::Face, face_id, params)?;
                let center = match self.surface(face_id)? {
                    AnalyticSurface::Sphere { center, .. } => *center,
                    _ => unreachable!(),
                };
                let normal = (eval - center).normalize();
                let (r_hat, s_hat) = orthonormal_basis(&normal);
                Ok(Curvature { kr: 1.0 / radius, r_hat, ks: 1.0 / radius, s_hat, normal })
            }
        }
    }

    fn tolerance(&self, _kind: EntityKind, _id: i32) -> AdaptResult<f64> {
        Ok(1e-9)
    }
}

fn orthonormal_basis(n: &Vector3) -> (Vector3, Vector3) {
    let helper = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let a = n.cross(&helper).normalize();
    let b = n.cross(&a);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_eval_and_inverse_round_trip() {
        let cad = AnalyticCad::new().with_face(
            1,
            AnalyticSurface::Plane { origin: Point3::origin(), normal: Vector3::z(), u_axis: Vector3::x() },
        );
        let xyz = cad.eval(EntityKind::Face, 1, [2.0, -1.0]).unwrap();
        let uv = cad.inverse_eval(EntityKind::Face, 1, &xyz).unwrap();
        assert!((uv[0] - 2.0).abs() < 1e-9);
        assert!((uv[1] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn sphere_curvature_is_reciprocal_radius() {
        let cad = AnalyticCad::new().with_face(2, AnalyticSurface::Sphere { center: Point3::origin(), radius: 2.0 });
        let c = cad.curvature(2, [0.3, 1.2]).unwrap();
        assert!((c.kr - 0.5).abs() < 1e-9);
        assert!((c.ks - 0.5).abs() < 1e-9);
    }

    #[test]
    fn null_cad_reports_missing() {
        let cad = NullCad;
        assert!(cad.eval(EntityKind::Face, 1, [0.0, 0.0]).is_err());
    }
}
