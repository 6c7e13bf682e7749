//! Enumeration of the unique undirected edges of a tetrahedral mesh, plus
//! the owner-partition decision and ghost-exchange support for per-edge
//! scalar data that the sweep orderings in [`crate::pass`] consult.

use crate::cell_store::CellArena;
use crate::node_store::{GlobalId, NodeIndex, NodeStore};
use std::collections::{BTreeSet, HashMap};

/// A canonically-ordered undirected edge: always `.0 < .1`.
pub type EdgeKey = (NodeIndex, NodeIndex);

pub fn canonical(n0: NodeIndex, n1: NodeIndex) -> EdgeKey {
    if n0 < n1 {
        (n0, n1)
    } else {
        (n1, n0)
    }
}

const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Scan every tet, emit its six edges in canonical order, de-duplicating via
/// a sorted set so each undirected edge is visited exactly once.
pub fn unique_edges(tets: &CellArena) -> Vec<EdgeKey> {
    let mut set = BTreeSet::new();
    for (_, cell) in tets.iter() {
        for &(a, b) in &TET_EDGES {
            set.insert(canonical(cell.nodes[a], cell.nodes[b]));
        }
    }
    set.into_iter().collect()
}

/// The partition that owns an edge: the partition of its lowest-global-id
/// endpoint.
pub fn owner(edge: EdgeKey, nodes: &NodeStore) -> Option<i32> {
    let (n0, n1) = edge;
    let a = nodes.get(n0)?;
    let b = nodes.get(n1)?;
    Some(if a.global_id < b.global_id { a.part } else { b.part })
}

/// Stable key for an edge independent of local index renumbering (survives
/// a pack / partition boundary), used when exchanging per-edge data with a
/// ghosting peer.
pub fn global_key(edge: EdgeKey, nodes: &NodeStore) -> Option<(GlobalId, GlobalId)> {
    let (n0, n1) = edge;
    let a = nodes.get(n0)?.global_id;
    let b = nodes.get(n1)?.global_id;
    Some(if a < b { (a, b) } else { (b, a) })
}

/// Per-edge scalar payload (integer or floating-point, caller's choice of
/// `T`) keyed by the edge's global-id pair so it survives a repack, with a
/// trivial merge-from-peer for ghost exchange.
#[derive(Debug, Clone, Default)]
pub struct EdgeGhostChannel<T> {
    values: HashMap<(GlobalId, GlobalId), T>,
}

impl<T: Clone> EdgeGhostChannel<T> {
    pub fn new() -> Self {
        Self { values: HashMap::new() }
    }

    pub fn set(&mut self, key: (GlobalId, GlobalId), value: T) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: (GlobalId, GlobalId)) -> Option<&T> {
        self.values.get(&key)
    }

    /// Adopt every entry from `peer` this channel doesn't already have —
    /// the single-partition-friendly shape of a ghost refresh.
    pub fn merge(&mut self, peer: &Self) {
        for (k, v) in &peer.values {
            self.values.entry(*k).or_insert_with(|| v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::{Cell, CellArena, CellKind};
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node, NodeStore};
    use crate::geometry::Point3;

    fn sample_nodes(n: usize) -> NodeStore {
        let mut store = NodeStore::new();
        for i in 0..n {
            store.insert(Node::new(GlobalId(i as u64), Point3::new(i as f64, 0.0, 0.0), MetricTensor::identity(), 0));
        }
        store
    }

    #[test]
    fn unique_edges_deduplicates_shared_face() {
        let mut tets = CellArena::new(CellKind::Tetrahedron);
        tets.insert(Cell { nodes: vec![0, 1, 2, 3], cad_id: None }).unwrap();
        tets.insert(Cell { nodes: vec![0, 1, 2, 4], cad_id: None }).unwrap();

        let edges = unique_edges(&tets);
        // Shared face (0,1,2) contributes 3 edges once each, plus 3 more per
        // apex (3 and 4): 3 + 3 + 3 = 9 unique edges total.
        assert_eq!(edges.len(), 9);
        assert!(edges.contains(&(0, 1)));
        assert!(!edges.contains(&(1, 0)));
    }

    #[test]
    fn owner_is_lowest_global_id_partition() {
        let mut nodes = sample_nodes(2);
        nodes.get_mut(0).unwrap().part = 3;
        nodes.get_mut(1).unwrap().part = 7;
        assert_eq!(owner((0, 1), &nodes), Some(3));
    }

    #[test]
    fn ghost_channel_merge_fills_missing_entries() {
        let mut nodes = sample_nodes(3);
        nodes.get_mut(0).unwrap().part = 0;
        let key01 = global_key((0, 1), &nodes).unwrap();
        let key12 = global_key((1, 2), &nodes).unwrap();

        let mut mine = EdgeGhostChannel::new();
        mine.set(key01, 1.0);
        let mut peer = EdgeGhostChannel::new();
        peer.set(key01, 99.0);
        peer.set(key12, 2.0);

        mine.merge(&peer);
        assert_eq!(mine.get(key01).copied(), Some(1.0), "local value wins over peer's");
        assert_eq!(mine.get(key12).copied(), Some(2.0));
    }
}
