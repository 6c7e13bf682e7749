//! Association records binding a mesh node to a CAD entity.

use crate::geometry::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
}

/// One (node, cad-entity) binding. Vertices carry no parameter, edges carry
/// `t` in `params[0]`, faces carry `(u, v)` in `params`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeomAssoc {
    pub kind: EntityKind,
    pub cad_id: i32,
    pub params: [f64; 2],
    pub sens: i8,
    pub jump: bool,
    pub degen: bool,
}

impl GeomAssoc {
    pub fn vertex(cad_id: i32) -> Self {
        Self { kind: EntityKind::Vertex, cad_id, params: [0.0, 0.0], sens: 0, jump: false, degen: false }
    }

    pub fn edge(cad_id: i32, t: f64) -> Self {
        Self { kind: EntityKind::Edge, cad_id, params: [t, 0.0], sens: 0, jump: false, degen: false }
    }

    pub fn face(cad_id: i32, u: f64, v: f64) -> Self {
        Self { kind: EntityKind::Face, cad_id, params: [u, v], sens: 0, jump: false, degen: false }
    }

    pub fn with_sens(mut self, sens: i8) -> Self {
        self.sens = sens;
        self
    }

    pub fn with_jump(mut self, jump: bool) -> Self {
        self.jump = jump;
        self
    }

    pub fn with_degen(mut self, degen: bool) -> Self {
        self.degen = degen;
        self
    }

    /// A lower-dimensional entity "outranks" a higher one: vertex < edge <
    /// face < interior (where interior is "no association").
    pub fn rank(kind: EntityKind) -> u8 {
        match kind {
            EntityKind::Vertex => 0,
            EntityKind::Edge => 1,
            EntityKind::Face => 2,
        }
    }
}

/// Principal curvature data at a point on a CAD face, in the form the
/// curvature-to-metric construction in [`crate::metric`] consumes directly.
#[derive(Debug, Clone, Copy)]
pub struct Curvature {
    pub kr: f64,
    pub r_hat: Vector3,
    pub ks: f64,
    pub s_hat: Vector3,
    pub normal: Vector3,
}
