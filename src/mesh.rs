//! The aggregate the rest of the kernel operates on: nodes, typed cells, and
//! CAD associations for one partition's local mesh (plus its ghost layer).
//! Called "grid" in SPEC_FULL.md §4.9.

use crate::cell_store::CellStore;
use crate::error::AdaptResult;
use crate::geom::GeomStore;
use crate::node_store::NodeStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub nodes: NodeStore,
    pub cells: CellStore,
    pub geom: GeomStore,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compact the node store, then rewrite every cell and geom reference
    /// through the resulting permutation. Cell arenas are compacted too, but
    /// their permutations have no other consumers (nothing indexes cells by
    /// local index across a pack boundary).
    pub fn pack(&mut self) -> AdaptResult<()> {
        let node_permutation = self.nodes.compact();
        self.cells.remap_nodes(&node_permutation)?;
        self.geom.remap_nodes(&node_permutation);
        for kind in crate::cell_store::CellKind::all() {
            self.cells.arena_mut(kind).compact();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::{Cell, CellKind};
    use crate::geom::GeomAssoc;
    use crate::geometry::Point3;
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};

    #[test]
    fn pack_keeps_cells_and_geom_consistent_with_nodes() {
        let mut mesh = Mesh::new();
        let n0 = mesh.nodes.insert(Node::new(GlobalId(0), Point3::new(0.0, 0.0, 0.0), MetricTensor::identity(), 0));
        let n1 = mesh.nodes.insert(Node::new(GlobalId(1), Point3::new(1.0, 0.0, 0.0), MetricTensor::identity(), 0));
        let n2 = mesh.nodes.insert(Node::new(GlobalId(2), Point3::new(0.0, 1.0, 0.0), MetricTensor::identity(), 0));
        let n3 = mesh.nodes.insert(Node::new(GlobalId(3), Point3::new(0.0, 0.0, 1.0), MetricTensor::identity(), 0));
        mesh.geom.add(n1, GeomAssoc::vertex(7));

        mesh.nodes.remove(n0).unwrap();
        let n4 = mesh.nodes.insert(Node::new(GlobalId(4), Point3::new(1.0, 1.0, 1.0), MetricTensor::identity(), 0));
        let real_tet = Cell { nodes: vec![n1, n2, n3, n4], cad_id: None };
        mesh.cells.arena_mut(CellKind::Tetrahedron).insert(real_tet).unwrap();

        mesh.pack().unwrap();

        let new_n1 = mesh.nodes.local_of(GlobalId(1)).unwrap();
        assert_eq!(mesh.geom.associations(new_n1).len(), 1);
        for (_, cell) in mesh.cells.arena(CellKind::Tetrahedron).iter() {
            for &n in &cell.nodes {
                assert!(mesh.nodes.contains(n));
            }
        }
    }
}
