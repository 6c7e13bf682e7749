//! Per-node CAD associations and the `cell_tuv` disambiguation policy.

use crate::error::{AdaptError, AdaptResult};
use crate::geom::cad::CadQuery;
use crate::geom::types::{EntityKind, GeomAssoc};
use crate::node_store::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeomStore {
    by_node: HashMap<NodeIndex, Vec<GeomAssoc>>,
}

impl GeomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by `(node, kind, cad_id)`: inserting the same key again
    /// overwrites rather than duplicating, *unless* the association is
    /// explicitly flagged as a jump/seam, in which case a second association
    /// on the same key is legitimate (two parameter values for one CAD
    /// vertex shared by a periodic edge, or two UV images at a seam).
    pub fn add(&mut self, node: NodeIndex, assoc: GeomAssoc) {
        let entries = self.by_node.entry(node).or_default();
        if !assoc.jump {
            if let Some(existing) = entries
                .iter_mut()
                .find(|a| a.kind == assoc.kind && a.cad_id == assoc.cad_id)
            {
                *existing = assoc;
                return;
            }
        }
        entries.push(assoc);
    }

    pub fn find(&self, node: NodeIndex, kind: EntityKind, cad_id: i32) -> Vec<&GeomAssoc> {
        self.by_node
            .get(&node)
            .map(|v| v.iter().filter(|a| a.kind == kind && a.cad_id == cad_id).collect())
            .unwrap_or_default()
    }

    pub fn associations(&self, node: NodeIndex) -> &[GeomAssoc] {
        self.by_node.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn remove_node(&mut self, node: NodeIndex) {
        self.by_node.remove(&node);
    }

    /// The highest-ranked (lowest-dimensional) association a node carries,
    /// used by operators deciding whether a node "outranks" another (vertex
    /// beats edge beats face).
    pub fn dominant(&self, node: NodeIndex) -> Option<&GeomAssoc> {
        self.associations(node).iter().min_by_key(|a| GeomAssoc::rank(a.kind))
    }

    pub fn remap_nodes(&mut self, permutation: &[Option<NodeIndex>]) {
        let mut remapped = HashMap::with_capacity(self.by_node.len());
        for (old, assocs) in self.by_node.drain() {
            if let Some(Some(new)) = permutation.get(old) {
                remapped.insert(*new, assocs);
            }
        }
        self.by_node = remapped;
    }

    /// The correct (u,v)-or-(t) parameter and sense for `node` as seen from
    /// `cell_nodes`, resolving UV-jumps and degeneracies per the policy in
    /// SPEC_FULL.md §4.2. `cad_id` identifies which of the node's possibly
    /// several associations of `kind` applies to this cell.
    pub fn cell_tuv(
        &self,
        node: NodeIndex,
        cell_nodes: &[NodeIndex],
        kind: EntityKind,
        cad_id: i32,
    ) -> AdaptResult<([f64; 2], i8)> {
        let candidates = self.find(node, kind, cad_id);
        if candidates.is_empty() {
            return Err(AdaptError::not_found(format!(
                "node {node} has no {kind:?} association with cad id {cad_id}"
            )));
        }

        let plain = candidates.iter().find(|a| !a.jump && !a.degen);
        if let Some(a) = plain {
            if candidates.len() == 1 {
                return Ok((a.params, a.sens));
            }
        }

        match kind {
            EntityKind::Edge => self.resolve_edge_jump(&candidates, cell_nodes, cad_id),
            EntityKind::Face => {
                if candidates.iter().any(|a| a.degen) {
                    self.resolve_face_degeneracy(node, &candidates, cell_nodes, cad_id)
                } else {
                    self.resolve_face_seam(&candidates, cell_nodes, cad_id)
                }
            }
            EntityKind::Vertex => Ok((candidates[0].params, candidates[0].sens)),
        }
    }

    /// Edge cell whose node sits at a CAD vertex shared by more than one
    /// parameter value (periodic curve wraparound): pick the `t` closer to
    /// the other cell node's `t`.
    fn resolve_edge_jump(
        &self,
        candidates: &[&GeomAssoc],
        cell_nodes: &[NodeIndex],
        cad_id: i32,
    ) -> AdaptResult<([f64; 2], i8)> {
        let other = cell_nodes
            .iter()
            .copied()
            .find_map(|n| self.find(n, EntityKind::Edge, cad_id).first().map(|a| a.params[0]))
            .ok_or_else(|| AdaptError::invariant_violated("edge cell has no second edge-associated node"))?;

        let best = candidates
            .iter()
            .min_by(|a, b| (a.params[0] - other).abs().total_cmp(&(b.params[0] - other).abs()))
            .expect("candidates is non-empty");
        Ok((best.params, best.sens))
    }

    /// Tri cell at a UV-seam: pick the sense whose stored UV is nearest the
    /// average UV of the cell's other (unambiguous) nodes.
    fn resolve_face_seam(
        &self,
        candidates: &[&GeomAssoc],
        cell_nodes: &[NodeIndex],
        cad_id: i32,
    ) -> AdaptResult<([f64; 2], i8)> {
        let others: Vec<[f64; 2]> = cell_nodes
            .iter()
            .copied()
            .filter_map(|n| self.find(n, EntityKind::Face, cad_id).first().map(|a| a.params))
            .collect();
        if others.is_empty() {
            return Ok((candidates[0].params, candidates[0].sens));
        }
        let avg = [
            others.iter().map(|p| p[0]).sum::<f64>() / others.len() as f64,
            others.iter().map(|p| p[1]).sum::<f64>() / others.len() as f64,
        ];
        let best = candidates
            .iter()
            .min_by(|a, b| {
                let da = (a.params[0] - avg[0]).powi(2) + (a.params[1] - avg[1]).powi(2);
                let db = (b.params[0] - avg[0]).powi(2) + (b.params[1] - avg[1]).powi(2);
                da.total_cmp(&db)
            })
            .expect("candidates is non-empty");
        Ok((best.params, best.sens))
    }

    /// Degenerate face vertex (a pole): fix the collapsed parameter to its
    /// stored value, average the other parameter across the non-degenerate
    /// cell corners, then clamp it to the incident CAD edge's t-range so the
    /// average can't stray off the parameter domain across a periodic seam.
    fn resolve_face_degeneracy(
        &self,
        node: NodeIndex,
        candidates: &[&GeomAssoc],
        cell_nodes: &[NodeIndex],
        cad_id: i32,
    ) -> AdaptResult<([f64; 2], i8)> {
        let degen = candidates.iter().find(|a| a.degen).expect("checked by caller");
        let others: Vec<[f64; 2]> = cell_nodes
            .iter()
            .copied()
            .filter_map(|n| {
                self.find(n, EntityKind::Face, cad_id)
                    .into_iter()
                    .find(|a| !a.degen)
                    .map(|a| a.params)
            })
            .collect();

        // Determine which parameter is collapsed at the pole: the one degen
        // shares with every non-degenerate corner varying the other.
        let free_param_index = if others.len() > 1
            && others.windows(2).all(|w| (w[0][0] - w[1][0]).abs() < 1e-9)
        {
            1
        } else {
            0
        };

        let mut params = degen.params;
        if !others.is_empty() {
            let mut avg_free = others.iter().map(|p| p[free_param_index]).sum::<f64>() / others.len() as f64;
            if let Some((lo, hi)) = self.incident_edge_t_range(node) {
                avg_free = avg_free.clamp(lo.min(hi), lo.max(hi));
            }
            params[free_param_index] = avg_free;
        }
        Ok((params, degen.sens))
    }

    /// The `t`-range spanned by `node`'s own edge associations, used as the
    /// edge-of-parameter-space bounding box for a degenerate face vertex.
    fn incident_edge_t_range(&self, node: NodeIndex) -> Option<(f64, f64)> {
        let ts: Vec<f64> = self
            .by_node
            .get(&node)?
            .iter()
            .filter(|a| a.kind == EntityKind::Edge)
            .map(|a| a.params[0])
            .collect();
        if ts.is_empty() {
            return None;
        }
        let lo = ts.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = ts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((lo, hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_for_plain_associations() {
        let mut store = GeomStore::new();
        store.add(0, GeomAssoc::face(1, 0.1, 0.2));
        store.add(0, GeomAssoc::face(1, 0.5, 0.6));
        assert_eq!(store.associations(0).len(), 1);
        assert_eq!(store.associations(0)[0].params, [0.5, 0.6]);
    }

    #[test]
    fn jump_associations_both_survive() {
        let mut store = GeomStore::new();
        store.add(0, GeomAssoc::edge(1, 0.0).with_jump(true));
        store.add(0, GeomAssoc::edge(1, 1.0).with_jump(true));
        assert_eq!(store.associations(0).len(), 2);
    }

    #[test]
    fn cell_tuv_plain_case_returns_stored_params() {
        let mut store = GeomStore::new();
        store.add(5, GeomAssoc::face(2, 0.25, 0.75));
        let (params, sens) = store.cell_tuv(5, &[1, 2], EntityKind::Face, 2).unwrap();
        assert_eq!(params, [0.25, 0.75]);
        assert_eq!(sens, 0);
    }

    #[test]
    fn cell_tuv_edge_jump_picks_nearest_t() {
        let mut store = GeomStore::new();
        store.add(0, GeomAssoc::edge(9, 0.0).with_jump(true));
        store.add(0, GeomAssoc::edge(9, 1.0).with_jump(true));
        store.add(1, GeomAssoc::edge(9, 0.9));

        let (params, _) = store.cell_tuv(0, &[1], EntityKind::Edge, 9).unwrap();
        assert!((params[0] - 1.0).abs() < 1e-12, "should pick the t=1.0 branch closer to 0.9");
    }

    #[test]
    fn cell_tuv_face_seam_picks_nearest_sense() {
        let mut store = GeomStore::new();
        store.add(0, GeomAssoc::face(3, 0.0, 0.5).with_sens(-1));
        store.add(0, GeomAssoc::face(3, 1.0, 0.5).with_sens(1));
        store.add(1, GeomAssoc::face(3, 0.95, 0.5));
        store.add(2, GeomAssoc::face(3, 0.9, 0.5));

        let (params, sens) = store.cell_tuv(0, &[1, 2], EntityKind::Face, 3).unwrap();
        assert_eq!(sens, 1);
        assert!((params[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cell_tuv_face_degeneracy_clamps_average_to_incident_edge_t_range() {
        let mut store = GeomStore::new();
        store.add(0, GeomAssoc::face(7, 0.0, 0.0).with_degen(true));
        store.add(0, GeomAssoc::edge(10, 0.0));
        store.add(0, GeomAssoc::edge(11, std::f64::consts::PI));
        store.add(1, GeomAssoc::face(7, 3.0, 0.2));
        store.add(2, GeomAssoc::face(7, 3.4, 0.2));

        let (params, _) = store.cell_tuv(0, &[1, 2], EntityKind::Face, 7).unwrap();
        assert!(
            (params[0] - std::f64::consts::PI).abs() < 1e-9,
            "unclamped average (3.2) exceeds the node's edge t-range [0, pi] and must be clamped to pi"
        );
    }

    #[test]
    fn remap_nodes_rewrites_keys() {
        let mut store = GeomStore::new();
        store.add(3, GeomAssoc::vertex(1));
        let permutation = vec![None, None, None, Some(0)];
        store.remap_nodes(&permutation);
        assert_eq!(store.associations(0).len(), 1);
        assert!(store.associations(3).is_empty());
    }
}
