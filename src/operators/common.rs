//! Shared helpers the four operators all need: a placeholder index for a
//! not-yet-inserted node (so `Cavity::valid` can check a proposal before any
//! mutation happens), fresh global-id allocation, and CAD-association
//! lookup across an edge's two endpoints.

use crate::geom::{EntityKind, GeomAssoc};
use crate::mesh::Mesh;
use crate::node_store::{GlobalId, NodeIndex};

/// Stands in for "the node this operator would insert" in cavity validity
/// checks run before any mutation. Never a real node index.
pub const PROPOSED_NODE: NodeIndex = NodeIndex::MAX;

/// Allocate a global id guaranteed unused by any node currently in `mesh`.
/// Single-process id allocation; a real multi-partition deployment would
/// draw from a partition-local block instead.
pub fn fresh_global_id(mesh: &Mesh) -> GlobalId {
    let max = mesh.nodes.iter().map(|(_, n)| n.global_id.0).max().unwrap_or(0);
    GlobalId(max + 1)
}

/// The highest-ranked CAD entity both endpoints of an edge share (same kind
/// and id) — "inherit parameter from the higher-dimensional locus": prefer
/// face over edge over vertex, since a shared face gives the most freedom to
/// place an interpolated point.
pub fn shared_entity(mesh: &Mesh, n0: NodeIndex, n1: NodeIndex) -> Option<(EntityKind, i32, GeomAssoc, GeomAssoc)> {
    for kind in [EntityKind::Face, EntityKind::Edge, EntityKind::Vertex] {
        for a0 in mesh.geom.associations(n0).iter().filter(|a| a.kind == kind) {
            if let Some(a1) = mesh.geom.associations(n1).iter().find(|a| a.kind == kind && a.cad_id == a0.cad_id) {
                return Some((kind, a0.cad_id, *a0, *a1));
            }
        }
    }
    None
}
