//! Node storage: a dense, free-list-backed arena indexed by local integer,
//! with a sorted side table for global-id lookup. Mirrors the cell store's
//! layout (see [`crate::cell_store`]) so both stores pack and reallocate the
//! same way.

use crate::error::{AdaptError, AdaptResult};
use crate::geometry::Point3;
use crate::metric::MetricTensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A 64-bit identifier stable across partitions and passes; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId(pub u64);

/// A local array index into [`NodeStore`]; only stable between packs.
pub type NodeIndex = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub global_id: GlobalId,
    pub xyz: Point3,
    pub metric: MetricTensor,
    pub part: i32,
}

impl Node {
    pub fn new(global_id: GlobalId, xyz: Point3, metric: MetricTensor, part: i32) -> Self {
        Self { global_id, xyz, metric, part }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Slot {
    Occupied(Node),
    Free { next: Option<NodeIndex> },
}

/// Dense node arena with O(1) insert/remove and O(log n) global->local
/// lookup through a sorted (`BTreeMap`) side table, as specified: the free
/// list is an explicit chain of `Free { next }` slots, never a sentinel
/// hidden in the public id field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStore {
    slots: Vec<Slot>,
    free_head: Option<NodeIndex>,
    count: usize,
    global_to_local: BTreeMap<GlobalId, NodeIndex>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Capacity of the backing array, including free slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn grow_to(&mut self, index: NodeIndex) {
        while self.slots.len() <= index {
            let next_free = self.free_head;
            self.slots.push(Slot::Free { next: next_free });
            self.free_head = Some(self.slots.len() - 1);
        }
    }

    /// Insert at a caller-supplied local index (the load path). Errors if the
    /// slot is already occupied.
    pub fn insert_at(&mut self, index: NodeIndex, node: Node) -> AdaptResult<()> {
        self.grow_to(index);
        if matches!(self.slots[index], Slot::Occupied(_)) {
            return Err(AdaptError::invalid_argument(format!(
                "node slot {index} already occupied"
            )));
        }
        // Splice this slot out of the free list.
        self.unlink_free_slot(index);
        self.global_to_local.insert(node.global_id, index);
        self.slots[index] = Slot::Occupied(node);
        self.count += 1;
        Ok(())
    }

    fn unlink_free_slot(&mut self, index: NodeIndex) {
        let mut cursor = self.free_head;
        let mut prev: Option<NodeIndex> = None;
        while let Some(cur) = cursor {
            let next = match &self.slots[cur] {
                Slot::Free { next } => *next,
                Slot::Occupied(_) => break,
            };
            if cur == index {
                match prev {
                    Some(p) => {
                        if let Slot::Free { next: pn } = &mut self.slots[p] {
                            *pn = next;
                        }
                    }
                    None => self.free_head = next,
                }
                return;
            }
            prev = Some(cur);
            cursor = next;
        }
    }

    /// Insert at the next free slot (the split path). Returns the new index.
    pub fn insert(&mut self, node: Node) -> NodeIndex {
        let index = match self.free_head {
            Some(i) => {
                let next = match &self.slots[i] {
                    Slot::Free { next } => *next,
                    Slot::Occupied(_) => unreachable!("free_head pointed at occupied slot"),
                };
                self.free_head = next;
                i
            }
            None => {
                self.slots.push(Slot::Free { next: None });
                self.slots.len() - 1
            }
        };
        self.global_to_local.insert(node.global_id, index);
        self.slots[index] = Slot::Occupied(node);
        self.count += 1;
        index
    }

    /// Remove a node, returning it and threading the slot onto the free list.
    pub fn remove(&mut self, index: NodeIndex) -> AdaptResult<Node> {
        match self.slots.get(index) {
            Some(Slot::Occupied(_)) => {}
            _ => return Err(AdaptError::not_found(format!("no node at {index}"))),
        }
        let old = std::mem::replace(&mut self.slots[index], Slot::Free { next: self.free_head });
        self.free_head = Some(index);
        self.count -= 1;
        match old {
            Slot::Occupied(node) => {
                self.global_to_local.remove(&node.global_id);
                Ok(node)
            }
            Slot::Free { .. } => unreachable!(),
        }
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        match self.slots.get(index) {
            Some(Slot::Occupied(n)) => Some(n),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        match self.slots.get_mut(index) {
            Some(Slot::Occupied(n)) => Some(n),
            _ => None,
        }
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        matches!(self.slots.get(index), Some(Slot::Occupied(_)))
    }

    pub fn local_of(&self, global_id: GlobalId) -> Option<NodeIndex> {
        self.global_to_local.get(&global_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(n) => Some((i, n)),
            Slot::Free { .. } => None,
        })
    }

    /// Compact free-list slots, returning an old->new permutation (`None`
    /// entries mark indices that were free and no longer exist). Local
    /// indices are only allowed to move here.
    pub fn compact(&mut self) -> Vec<Option<NodeIndex>> {
        let mut permutation = vec![None; self.slots.len()];
        let mut new_slots = Vec::with_capacity(self.count);
        for (old_index, slot) in self.slots.drain(..).enumerate() {
            if let Slot::Occupied(node) = slot {
                let new_index = new_slots.len();
                permutation[old_index] = Some(new_index);
                new_slots.push(Slot::Occupied(node));
            }
        }
        self.global_to_local = new_slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Occupied(n) => Some((n.global_id, i)),
                Slot::Free { .. } => None,
            })
            .collect();
        self.slots = new_slots;
        self.free_head = None;
        permutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(gid: u64) -> Node {
        Node::new(
            GlobalId(gid),
            Point3::new(gid as f64, 0.0, 0.0),
            MetricTensor::identity(),
            0,
        )
    }

    #[test]
    fn insert_and_lookup() {
        let mut store = NodeStore::new();
        let i0 = store.insert(sample_node(10));
        let i1 = store.insert(sample_node(20));
        assert_eq!(store.len(), 2);
        assert_eq!(store.local_of(GlobalId(10)), Some(i0));
        assert_eq!(store.local_of(GlobalId(20)), Some(i1));
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut store = NodeStore::new();
        let i0 = store.insert(sample_node(1));
        let _i1 = store.insert(sample_node(2));
        store.remove(i0).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.local_of(GlobalId(1)).is_none());

        let i2 = store.insert(sample_node(3));
        assert_eq!(i2, i0, "freed slot should be reused");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn insert_at_arbitrary_index_for_load_path() {
        let mut store = NodeStore::new();
        store.insert_at(5, sample_node(100)).unwrap();
        assert_eq!(store.local_of(GlobalId(100)), Some(5));
        assert_eq!(store.len(), 1);
        // Slots 0..5 are implicitly free and available for future inserts.
        let idx = store.insert(sample_node(101));
        assert!(idx < 5);
    }

    #[test]
    fn insert_at_occupied_slot_errors() {
        let mut store = NodeStore::new();
        store.insert_at(0, sample_node(1)).unwrap();
        assert!(store.insert_at(0, sample_node(2)).is_err());
    }

    #[test]
    fn compact_is_idempotent() {
        let mut store = NodeStore::new();
        let i0 = store.insert(sample_node(1));
        let _i1 = store.insert(sample_node(2));
        store.remove(i0).unwrap();
        let _i2 = store.insert(sample_node(3));
        store.remove(store.local_of(GlobalId(2)).unwrap()).unwrap();

        let perm1 = store.compact();
        let snapshot: Vec<GlobalId> = store.iter().map(|(_, n)| n.global_id).collect();
        assert_eq!(perm1.iter().filter(|p| p.is_some()).count(), 1);

        let perm2 = store.compact();
        let snapshot2: Vec<GlobalId> = store.iter().map(|(_, n)| n.global_id).collect();

        assert_eq!(snapshot, snapshot2);
        assert!(perm2.iter().all(|p| p.is_some()), "already-compact store stays fully occupied");
    }
}
