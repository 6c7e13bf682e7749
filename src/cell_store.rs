//! Typed cell collections plus their owned node->cell adjacency indices.
//!
//! Each supported element kind (triangle, edge-segment, tetrahedron, ...) is
//! a separate [`CellArena`] instance of the same generic layout — a sum type
//! tagged by [`CellKind`] dispatched through [`CellStore`], rather than the
//! original's parallel untyped arrays. The free-list/adjacency pattern is the
//! same one [`crate::node_store::NodeStore`] uses.

use crate::error::{AdaptError, AdaptResult};
use crate::node_store::NodeIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Triangle,
    EdgeSegment,
    Tetrahedron,
    Quadrilateral,
    Pyramid,
    Prism,
    Hexahedron,
}

impl CellKind {
    pub fn node_count(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::EdgeSegment => 2,
            Self::Tetrahedron => 4,
            Self::Quadrilateral => 4,
            Self::Pyramid => 5,
            Self::Prism => 6,
            Self::Hexahedron => 8,
        }
    }

    /// Boundary element kinds carry a trailing CAD-face/edge id; volume
    /// element kinds do not.
    pub fn carries_cad_id(&self) -> bool {
        matches!(self, Self::Triangle | Self::EdgeSegment | Self::Quadrilateral)
    }

    pub fn all() -> [CellKind; 7] {
        [
            Self::Triangle,
            Self::EdgeSegment,
            Self::Tetrahedron,
            Self::Quadrilateral,
            Self::Pyramid,
            Self::Prism,
            Self::Hexahedron,
        ]
    }
}

pub type CellIndex = usize;
type ItemIndex = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub nodes: Vec<NodeIndex>,
    pub cad_id: Option<i32>,
}

impl Cell {
    pub fn contains_node(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum CellSlot {
    Occupied(Cell),
    Free { next: Option<CellIndex> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdjItem {
    cell: CellIndex,
    next: Option<ItemIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ItemSlot {
    Occupied(AdjItem),
    Free { next: Option<ItemIndex> },
}

/// Node->cell adjacency for a single cell arena. Supports the primitive
/// operations listed in SPEC_FULL.md §4.1: `first`, `next`, `cell_of`,
/// `add`, `remove`, `empty`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeCellAdjacency {
    heads: Vec<Option<ItemIndex>>,
    items: Vec<ItemSlot>,
    free_item: Option<ItemIndex>,
}

/// Growth chunk for adjacency backing arrays: 1.5x current size or 1000,
/// whichever is larger, per the memory discipline in SPEC_FULL.md §5.
fn grow_target(current: usize, needed: usize) -> usize {
    let geometric = (current as f64 * 1.5).ceil() as usize;
    needed.max(geometric).max(current + 1000).max(needed)
}

impl NodeCellAdjacency {
    fn ensure_head(&mut self, node: NodeIndex) {
        if node >= self.heads.len() {
            let target = grow_target(self.heads.len(), node + 1);
            self.heads.resize(target, None);
        }
    }

    pub fn first(&self, node: NodeIndex) -> Option<ItemIndex> {
        self.heads.get(node).copied().flatten()
    }

    pub fn next(&self, item: ItemIndex) -> Option<ItemIndex> {
        match self.items.get(item) {
            Some(ItemSlot::Occupied(it)) => it.next,
            _ => None,
        }
    }

    pub fn cell_of(&self, item: ItemIndex) -> CellIndex {
        match &self.items[item] {
            ItemSlot::Occupied(it) => it.cell,
            ItemSlot::Free { .. } => panic!("adjacency item {item} is free"),
        }
    }

    pub fn empty(&self, node: NodeIndex) -> bool {
        self.first(node).is_none()
    }

    pub fn add(&mut self, node: NodeIndex, cell: CellIndex) {
        self.ensure_head(node);
        let new_item = AdjItem { cell, next: self.heads[node] };
        let index = match self.free_item {
            Some(i) => {
                let next_free = match &self.items[i] {
                    ItemSlot::Free { next } => *next,
                    ItemSlot::Occupied(_) => unreachable!(),
                };
                self.free_item = next_free;
                self.items[i] = ItemSlot::Occupied(new_item);
                i
            }
            None => {
                self.items.push(ItemSlot::Occupied(new_item));
                self.items.len() - 1
            }
        };
        self.heads[node] = Some(index);
    }

    pub fn remove(&mut self, node: NodeIndex, cell: CellIndex) {
        let mut cursor = self.heads.get(node).copied().flatten();
        let mut prev: Option<ItemIndex> = None;
        while let Some(cur) = cursor {
            let (cur_cell, cur_next) = match &self.items[cur] {
                ItemSlot::Occupied(it) => (it.cell, it.next),
                ItemSlot::Free { .. } => break,
            };
            if cur_cell == cell {
                match prev {
                    Some(p) => {
                        if let ItemSlot::Occupied(it) = &mut self.items[p] {
                            it.next = cur_next;
                        }
                    }
                    None => self.heads[node] = cur_next,
                }
                self.items[cur] = ItemSlot::Free { next: self.free_item };
                self.free_item = Some(cur);
                return;
            }
            prev = Some(cur);
            cursor = cur_next;
        }
    }

    pub fn cells_of(&self, node: NodeIndex) -> Vec<CellIndex> {
        let mut out = Vec::new();
        let mut item = self.first(node);
        while let Some(i) = item {
            out.push(self.cell_of(i));
            item = self.next(i);
        }
        out
    }
}

/// A dense, free-list-backed arena for one cell kind, with its own node->cell
/// adjacency index maintained in lockstep with insertion/removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellArena {
    kind: CellKind,
    slots: Vec<CellSlot>,
    free_head: Option<CellIndex>,
    count: usize,
    adjacency: NodeCellAdjacency,
}

impl CellArena {
    pub fn new(kind: CellKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free_head: None,
            count: 0,
            adjacency: NodeCellAdjacency::default(),
        }
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn adjacency(&self) -> &NodeCellAdjacency {
        &self.adjacency
    }

    fn validate_arity(&self, cell: &Cell) -> AdaptResult<()> {
        if cell.nodes.len() != self.kind.node_count() {
            return Err(AdaptError::invalid_argument(format!(
                "{:?} expects {} nodes, got {}",
                self.kind,
                self.kind.node_count(),
                cell.nodes.len()
            )));
        }
        if self.kind.carries_cad_id() != cell.cad_id.is_some() {
            return Err(AdaptError::invalid_argument(format!(
                "{:?} cad_id presence mismatch",
                self.kind
            )));
        }
        Ok(())
    }

    /// Insert a new cell, returning its local index. Adjacency is updated for
    /// every referenced node.
    pub fn insert(&mut self, cell: Cell) -> AdaptResult<CellIndex> {
        self.validate_arity(&cell)?;
        let nodes = cell.nodes.clone();
        let index = match self.free_head {
            Some(i) => {
                let next = match &self.slots[i] {
                    CellSlot::Free { next } => *next,
                    CellSlot::Occupied(_) => unreachable!(),
                };
                self.free_head = next;
                self.slots[i] = CellSlot::Occupied(cell);
                i
            }
            None => {
                self.slots.push(CellSlot::Occupied(cell));
                self.slots.len() - 1
            }
        };
        for n in nodes {
            self.adjacency.add(n, index);
        }
        self.count += 1;
        Ok(index)
    }

    pub fn remove(&mut self, index: CellIndex) -> AdaptResult<Cell> {
        match self.slots.get(index) {
            Some(CellSlot::Occupied(_)) => {}
            _ => return Err(AdaptError::not_found(format!("no cell at {index}"))),
        }
        let old = std::mem::replace(&mut self.slots[index], CellSlot::Free { next: self.free_head });
        self.free_head = Some(index);
        self.count -= 1;
        match old {
            CellSlot::Occupied(cell) => {
                for &n in &cell.nodes {
                    self.adjacency.remove(n, index);
                }
                Ok(cell)
            }
            CellSlot::Free { .. } => unreachable!(),
        }
    }

    pub fn get(&self, index: CellIndex) -> Option<&Cell> {
        match self.slots.get(index) {
            Some(CellSlot::Occupied(c)) => Some(c),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: CellIndex) -> Option<&mut Cell> {
        match self.slots.get_mut(index) {
            Some(CellSlot::Occupied(c)) => Some(c),
            _ => None,
        }
    }

    /// Replace every occurrence of `old` with `new` in `cell`'s node list,
    /// keeping the adjacency index consistent. Used by collapse/swap to
    /// retarget a surviving cell without a full remove+insert.
    pub fn substitute_node(&mut self, cell: CellIndex, old: NodeIndex, new: NodeIndex) -> AdaptResult<()> {
        let changed = match self.get_mut(cell) {
            Some(c) => {
                let mut hit = false;
                for n in c.nodes.iter_mut() {
                    if *n == old {
                        *n = new;
                        hit = true;
                    }
                }
                hit
            }
            None => return Err(AdaptError::not_found(format!("no cell at {cell}"))),
        };
        if changed {
            self.adjacency.remove(old, cell);
            self.adjacency.add(new, cell);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellIndex, &Cell)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            CellSlot::Occupied(c) => Some((i, c)),
            CellSlot::Free { .. } => None,
        })
    }

    /// All cells in this arena containing both `node0` and `node1`, capped at
    /// `cap` results (or unbounded if `cap` is `None`). The primitive for
    /// finding faces (2 tets), edges (a ring of tets), and co-boundary
    /// triangles.
    pub fn list_with2(&self, node0: NodeIndex, node1: NodeIndex, cap: Option<usize>) -> Vec<CellIndex> {
        let mut out = Vec::new();
        let mut item = self.adjacency.first(node0);
        while let Some(i) = item {
            let c = self.adjacency.cell_of(i);
            if let Some(cell) = self.get(c) {
                if cell.contains_node(node1) {
                    out.push(c);
                    if cap.map(|cap| out.len() >= cap).unwrap_or(false) {
                        break;
                    }
                }
            }
            item = self.adjacency.next(i);
        }
        out
    }

    /// Compact free-list slots, returning an old->new permutation.
    pub fn compact(&mut self) -> Vec<Option<CellIndex>> {
        let mut permutation = vec![None; self.slots.len()];
        let mut new_slots = Vec::with_capacity(self.count);
        for (old_index, slot) in self.slots.drain(..).enumerate() {
            if let CellSlot::Occupied(cell) = slot {
                let new_index = new_slots.len();
                permutation[old_index] = Some(new_index);
                new_slots.push(CellSlot::Occupied(cell));
            }
        }
        self.slots = new_slots;
        self.free_head = None;

        // Rebuild adjacency from scratch against the new indices; simplest
        // correct approach and only runs between passes.
        let mut adjacency = NodeCellAdjacency::default();
        for (new_index, slot) in self.slots.iter().enumerate() {
            if let CellSlot::Occupied(cell) = slot {
                for &n in &cell.nodes {
                    adjacency.add(n, new_index);
                }
            }
        }
        self.adjacency = adjacency;
        permutation
    }

    /// Rewrite every cell's node references through an old->new node
    /// permutation (as produced by `NodeStore::compact`), dropping cells that
    /// reference a node no longer present (shouldn't happen in practice —
    /// operators must not leave dangling references).
    pub fn remap_nodes(&mut self, permutation: &[Option<NodeIndex>]) -> AdaptResult<()> {
        for slot in self.slots.iter_mut() {
            if let CellSlot::Occupied(cell) = slot {
                for n in cell.nodes.iter_mut() {
                    *n = permutation.get(*n).copied().flatten().ok_or_else(|| {
                        AdaptError::invariant_violated(format!(
                            "cell references node {n} with no entry in permutation"
                        ))
                    })?;
                }
            }
        }
        // Node indices changed; adjacency must be rebuilt.
        let mut adjacency = NodeCellAdjacency::default();
        for (index, slot) in self.slots.iter().enumerate() {
            if let CellSlot::Occupied(cell) = slot {
                for &n in &cell.nodes {
                    adjacency.add(n, index);
                }
            }
        }
        self.adjacency = adjacency;
        Ok(())
    }
}

/// All typed cell collections for one mesh, dispatched by [`CellKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellStore {
    pub triangles: CellArena,
    pub edges: CellArena,
    pub tets: CellArena,
    pub quads: CellArena,
    pub pyramids: CellArena,
    pub prisms: CellArena,
    pub hexes: CellArena,
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CellStore {
    pub fn new() -> Self {
        Self {
            triangles: CellArena::new(CellKind::Triangle),
            edges: CellArena::new(CellKind::EdgeSegment),
            tets: CellArena::new(CellKind::Tetrahedron),
            quads: CellArena::new(CellKind::Quadrilateral),
            pyramids: CellArena::new(CellKind::Pyramid),
            prisms: CellArena::new(CellKind::Prism),
            hexes: CellArena::new(CellKind::Hexahedron),
        }
    }

    pub fn arena(&self, kind: CellKind) -> &CellArena {
        match kind {
            CellKind::Triangle => &self.triangles,
            CellKind::EdgeSegment => &self.edges,
            CellKind::Tetrahedron => &self.tets,
            CellKind::Quadrilateral => &self.quads,
            CellKind::Pyramid => &self.pyramids,
            CellKind::Prism => &self.prisms,
            CellKind::Hexahedron => &self.hexes,
        }
    }

    pub fn arena_mut(&mut self, kind: CellKind) -> &mut CellArena {
        match kind {
            CellKind::Triangle => &mut self.triangles,
            CellKind::EdgeSegment => &mut self.edges,
            CellKind::Tetrahedron => &mut self.tets,
            CellKind::Quadrilateral => &mut self.quads,
            CellKind::Pyramid => &mut self.pyramids,
            CellKind::Prism => &mut self.prisms,
            CellKind::Hexahedron => &mut self.hexes,
        }
    }

    pub fn remap_nodes(&mut self, permutation: &[Option<NodeIndex>]) -> AdaptResult<()> {
        for kind in CellKind::all() {
            self.arena_mut(kind).remap_nodes(permutation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tet(nodes: [NodeIndex; 4]) -> Cell {
        Cell { nodes: nodes.to_vec(), cad_id: None }
    }

    fn tri(nodes: [NodeIndex; 3], cad_id: i32) -> Cell {
        Cell { nodes: nodes.to_vec(), cad_id: Some(cad_id) }
    }

    #[test]
    fn insert_rejects_wrong_arity() {
        let mut arena = CellArena::new(CellKind::Tetrahedron);
        let bad = Cell { nodes: vec![0, 1, 2], cad_id: None };
        assert!(arena.insert(bad).is_err());
    }

    #[test]
    fn insert_rejects_cad_id_mismatch() {
        let mut arena = CellArena::new(CellKind::Tetrahedron);
        let bad = Cell { nodes: vec![0, 1, 2, 3], cad_id: Some(1) };
        assert!(arena.insert(bad).is_err());

        let mut tris = CellArena::new(CellKind::Triangle);
        let bad_tri = Cell { nodes: vec![0, 1, 2], cad_id: None };
        assert!(tris.insert(bad_tri).is_err());
    }

    #[test]
    fn adjacency_round_trips_with_cells() {
        let mut arena = CellArena::new(CellKind::Tetrahedron);
        let c0 = arena.insert(tet([0, 1, 2, 3])).unwrap();
        let c1 = arena.insert(tet([1, 2, 3, 4])).unwrap();

        for (node, cell) in [(0, c0), (1, c0), (1, c1), (4, c1)] {
            let cells = arena.adjacency().cells_of(node);
            assert!(cells.contains(&cell), "node {node} should list cell {cell}");
        }

        arena.remove(c0).unwrap();
        assert!(arena.adjacency().cells_of(0).is_empty());
        assert!(arena.adjacency().cells_of(1).contains(&c1));
    }

    #[test]
    fn list_with2_finds_shared_face_tets() {
        let mut arena = CellArena::new(CellKind::Tetrahedron);
        let c0 = arena.insert(tet([0, 1, 2, 3])).unwrap();
        let c1 = arena.insert(tet([0, 1, 2, 4])).unwrap();
        let _c2 = arena.insert(tet([5, 6, 7, 8])).unwrap();

        let mut shared = arena.list_with2(0, 1, None);
        shared.sort();
        assert_eq!(shared, vec![c0, c1]);
    }

    #[test]
    fn compact_is_idempotent_and_preserves_adjacency() {
        let mut arena = CellArena::new(CellKind::Triangle);
        let c0 = arena.insert(tri([0, 1, 2], 7)).unwrap();
        let _c1 = arena.insert(tri([1, 2, 3], 7)).unwrap();
        arena.remove(c0).unwrap();
        let _c2 = arena.insert(tri([2, 3, 4], 9)).unwrap();

        let perm1 = arena.compact();
        assert_eq!(perm1.iter().filter(|p| p.is_some()).count(), arena.len());

        let perm2 = arena.compact();
        assert!(perm2.iter().all(|p| p.is_some()));

        // Adjacency should reflect the compacted indices.
        for (idx, cell) in arena.iter() {
            for &n in &cell.nodes {
                assert!(arena.adjacency().cells_of(n).contains(&idx));
            }
        }
    }
}
