//! A cavity: a set of tets proposed for replacement by an operator, plus its
//! coherent free boundary of triangular faces.

use crate::cell_store::CellIndex;
use crate::error::{AdaptError, AdaptResult};
use crate::geom::{CadQuery, EntityKind};
use crate::geometry::{signed_tet_volume, triangle_normal, Point3};
use crate::mesh::Mesh;
use crate::node_store::NodeIndex;
use std::collections::HashMap;

/// Outward-oriented faces of a positively-oriented tet `(v0,v1,v2,v3)`,
/// opposite vertices 0..3 respectively.
fn outward_faces(nodes: &[NodeIndex]) -> [(NodeIndex, NodeIndex, NodeIndex); 4] {
    let [a, b, c, d] = [nodes[0], nodes[1], nodes[2], nodes[3]];
    [(b, c, d), (a, d, c), (a, b, d), (a, c, b)]
}

fn sorted_key(f: (NodeIndex, NodeIndex, NodeIndex)) -> (NodeIndex, NodeIndex, NodeIndex) {
    let mut v = [f.0, f.1, f.2];
    v.sort_unstable();
    (v[0], v[1], v[2])
}

pub struct Cavity {
    tets: Vec<CellIndex>,
    boundary: Vec<(NodeIndex, NodeIndex, NodeIndex)>,
}

impl Cavity {
    fn from_tets(tets: Vec<CellIndex>, mesh: &Mesh) -> AdaptResult<Self> {
        let mut counts: HashMap<(NodeIndex, NodeIndex, NodeIndex), Vec<(NodeIndex, NodeIndex, NodeIndex)>> =
            HashMap::new();
        for &t in &tets {
            let cell = mesh
                .cells
                .tets
                .get(t)
                .ok_or_else(|| AdaptError::not_found(format!("no tet at {t}")))?;
            for face in outward_faces(&cell.nodes) {
                counts.entry(sorted_key(face)).or_default().push(face);
            }
        }
        let boundary = counts
            .into_values()
            .filter(|faces| faces.len() == 1)
            .map(|faces| faces[0])
            .collect();
        Ok(Self { tets, boundary })
    }

    pub fn seed_edge(n0: NodeIndex, n1: NodeIndex, mesh: &Mesh) -> AdaptResult<Self> {
        let tets = mesh.cells.tets.list_with2(n0, n1, None);
        if tets.is_empty() {
            return Err(AdaptError::not_found(format!("no tets contain edge ({n0},{n1})")));
        }
        Self::from_tets(tets, mesh)
    }

    pub fn seed_face(n0: NodeIndex, n1: NodeIndex, n2: NodeIndex, mesh: &Mesh) -> AdaptResult<Self> {
        let tets: Vec<CellIndex> = mesh
            .cells
            .tets
            .list_with2(n0, n1, None)
            .into_iter()
            .filter(|&t| mesh.cells.tets.get(t).map(|c| c.contains_node(n2)).unwrap_or(false))
            .collect();
        if tets.is_empty() || tets.len() > 2 {
            return Err(AdaptError::invariant_violated(format!(
                "face ({n0},{n1},{n2}) incident to {} tets, expected 1 or 2",
                tets.len()
            )));
        }
        Self::from_tets(tets, mesh)
    }

    pub fn seed_node(n: NodeIndex, mesh: &Mesh) -> AdaptResult<Self> {
        let tets = mesh.cells.tets.adjacency().cells_of(n);
        if tets.is_empty() {
            return Err(AdaptError::not_found(format!("node {n} touches no tets")));
        }
        Self::from_tets(tets, mesh)
    }

    pub fn tets(&self) -> &[CellIndex] {
        &self.tets
    }

    pub fn boundary(&self) -> &[(NodeIndex, NodeIndex, NodeIndex)] {
        &self.boundary
    }

    /// Expand the cavity across `face`, pulling in the tet on the other
    /// side. `face` must currently be a boundary face.
    pub fn grow(&mut self, face: (NodeIndex, NodeIndex, NodeIndex), mesh: &Mesh) -> AdaptResult<()> {
        let pos = self
            .boundary
            .iter()
            .position(|&f| sorted_key(f) == sorted_key(face))
            .ok_or_else(|| AdaptError::invalid_argument("face is not on the cavity boundary"))?;

        let neighbor = mesh
            .cells
            .tets
            .list_with2(face.0, face.1, None)
            .into_iter()
            .find(|t| {
                !self.tets.contains(t)
                    && mesh.cells.tets.get(*t).map(|c| c.contains_node(face.2)).unwrap_or(false)
            });

        let neighbor = match neighbor {
            Some(t) => t,
            None => return Ok(()), // face is a true domain boundary, nothing to grow into
        };

        self.boundary.remove(pos);
        self.tets.push(neighbor);
        let cell = mesh.cells.tets.get(neighbor).expect("just looked up");
        for f in outward_faces(&cell.nodes) {
            if sorted_key(f) == sorted_key(face) {
                continue; // the face we just grew through becomes internal
            }
            self.boundary.push(f);
        }
        Ok(())
    }

    /// Grow through every boundary face not visible from `new_node`
    /// (visibility: the tentative replacement tet would have positive
    /// volume) until every remaining boundary face is visible or no further
    /// growth is possible.
    pub fn enlarge_visible(&mut self, new_node: &Point3, mesh: &Mesh) -> AdaptResult<()> {
        loop {
            let coords = |n: NodeIndex| mesh.nodes.get(n).map(|node| node.xyz);
            let invisible: Vec<_> = self
                .boundary
                .iter()
                .copied()
                .filter(|&(a, b, c)| {
                    match (coords(a), coords(b), coords(c)) {
                        (Some(pa), Some(pb), Some(pc)) => {
                            signed_tet_volume(&pa, &pb, &pc, new_node) <= 0.0
                        }
                        _ => false,
                    }
                })
                .collect();
            if invisible.is_empty() {
                return Ok(());
            }
            let before = self.tets.len();
            for face in invisible {
                self.grow(face, mesh)?;
            }
            if self.tets.len() == before {
                return Err(AdaptError::invariant_violated(
                    "cavity could not be enlarged to full visibility of the new node",
                ));
            }
        }
    }

    /// The tet list that would replace this cavity if `new_node` is
    /// inserted: one tet per boundary face, fan-connected to `new_node`.
    pub fn replace(&self, new_node: NodeIndex) -> Vec<[NodeIndex; 4]> {
        self.boundary
            .iter()
            .map(|&(a, b, c)| [a, b, c, new_node])
            .collect()
    }

    /// Every proposed tet has positive volume, and (for any boundary
    /// triangle that coincides with an existing CAD-face triangle) the new
    /// triangle's normal stays within `normal_tolerance` of the CAD surface
    /// normal at its centroid.
    pub fn valid(
        &self,
        proposed: &[[NodeIndex; 4]],
        new_xyz: &Point3,
        mesh: &Mesh,
        cad: &dyn CadQuery,
        normal_tolerance: f64,
    ) -> bool {
        for tet in proposed {
            let coords: Vec<Point3> = tet
                .iter()
                .map(|&n| if mesh.nodes.contains(n) { mesh.nodes.get(n).unwrap().xyz } else { *new_xyz })
                .collect();
            if signed_tet_volume(&coords[0], &coords[1], &coords[2], &coords[3]) <= 0.0 {
                return false;
            }
        }
        self.surface_alignment_ok(proposed, new_xyz, mesh, cad, normal_tolerance)
    }

    fn surface_alignment_ok(
        &self,
        proposed: &[[NodeIndex; 4]],
        new_xyz: &Point3,
        mesh: &Mesh,
        cad: &dyn CadQuery,
        normal_tolerance: f64,
    ) -> bool {
        for tet in proposed {
            for &(a, b, c) in &outward_faces(tet) {
                let tri = mesh.cells.triangles.list_with2(a, b, None).into_iter().find(|&t| {
                    mesh.cells.triangles.get(t).map(|cell| cell.contains_node(c)).unwrap_or(false)
                });
                let Some(tri_index) = tri else { continue };
                let Some(cad_id) = mesh.cells.triangles.get(tri_index).and_then(|c| c.cad_id) else { continue };

                let xyz_of = |n: NodeIndex| if mesh.nodes.contains(n) { mesh.nodes.get(n).unwrap().xyz } else { *new_xyz };
                let (pa, pb, pc) = (xyz_of(a), xyz_of(b), xyz_of(c));
                let mesh_normal = triangle_normal(&pa, &pb, &pc);
                let centroid = crate::geometry::points_centroid(&[pa, pb, pc]);

                let Some(assoc) = mesh
                    .geom
                    .find(if mesh.nodes.contains(a) { a } else { b }, EntityKind::Face, cad_id)
                    .first()
                    .copied()
                else {
                    continue;
                };
                let Ok(curvature) = cad.curvature(cad_id, assoc.params) else { continue };
                let _ = centroid;
                let cos_angle = mesh_normal.dot(&curvature.normal).clamp(-1.0, 1.0);
                if cos_angle.acos() > normal_tolerance {
                    return false;
                }
            }
        }
        true
    }
}
