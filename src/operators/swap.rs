//! Swap: retriangulate a face or an edge's ring with different topology
//! when doing so strictly improves the worst tet quality in the local
//! region. No nodes are created or destroyed; only tet connectivity and the
//! one new/removed diagonal edge change.

use crate::cavity::Cavity;
use crate::cell_store::{Cell, CellIndex};
use crate::config::AdaptConfig;
use crate::error::AdaptResult;
use crate::geom::CadQuery;
use crate::mesh::Mesh;
use crate::metric::tet_quality;
use crate::node_store::NodeIndex;
use std::collections::HashMap;

fn shape_cost(quality: f64) -> f64 {
    if quality <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / quality
    }
}

fn tet_cost(mesh: &Mesh, nodes: [NodeIndex; 4]) -> Option<f64> {
    let n0 = mesh.nodes.get(nodes[0])?;
    let n1 = mesh.nodes.get(nodes[1])?;
    let n2 = mesh.nodes.get(nodes[2])?;
    let n3 = mesh.nodes.get(nodes[3])?;
    let q = tet_quality(
        [&n0.xyz, &n1.xyz, &n2.xyz, &n3.xyz],
        [&n0.metric, &n1.metric, &n2.metric, &n3.metric],
    );
    Some(shape_cost(q))
}

fn worst_cost(mesh: &Mesh, tets: &[[NodeIndex; 4]]) -> f64 {
    tets.iter()
        .filter_map(|&t| tet_cost(mesh, t))
        .fold(f64::NEG_INFINITY, f64::max)
}

fn existing_worst_cost(mesh: &Mesh, tets: &[CellIndex]) -> f64 {
    let nodes: Vec<[NodeIndex; 4]> = tets
        .iter()
        .filter_map(|&t| mesh.cells.tets.get(t))
        .map(|c| [c.nodes[0], c.nodes[1], c.nodes[2], c.nodes[3]])
        .collect();
    worst_cost(mesh, &nodes)
}

/// Attempt a 2-to-3 face swap: the interior face `(n0,n1,n2)` shared by
/// exactly two tets becomes three tets fanned around the segment joining
/// the two tets' apex vertices. Rejected if the face is on the domain
/// boundary (only one incident tet) or the swap does not strictly improve
/// the worst quality among the affected tets.
pub fn try_face_swap(
    mesh: &mut Mesh,
    _config: &AdaptConfig,
    _cad: &dyn CadQuery,
    n0: NodeIndex,
    n1: NodeIndex,
    n2: NodeIndex,
) -> AdaptResult<bool> {
    let cavity = match Cavity::seed_face(n0, n1, n2, mesh) {
        Ok(c) => c,
        Err(_) => return Ok(false),
    };
    if cavity.tets().len() != 2 {
        return Ok(false); // boundary face, nothing to swap against
    }

    let apexes: Vec<NodeIndex> = cavity
        .tets()
        .iter()
        .filter_map(|&t| mesh.cells.tets.get(t))
        .filter_map(|cell| cell.nodes.iter().copied().find(|n| *n != n0 && *n != n1 && *n != n2))
        .collect();
    if apexes.len() != 2 {
        return Ok(false);
    }
    let (a, b) = (apexes[0], apexes[1]);

    let before = existing_worst_cost(mesh, cavity.tets());
    let proposed = [[a, b, n0, n1], [a, b, n1, n2], [a, b, n2, n0]];
    for tet in &proposed {
        if tet_cost(mesh, *tet).is_none() {
            return Ok(false);
        }
    }
    let after = worst_cost(mesh, &proposed);
    if !(after < before) {
        return Ok(false);
    }

    for &t in cavity.tets() {
        mesh.cells.tets.remove(t)?;
    }
    for tet in &proposed {
        mesh.cells.tets.insert(Cell { nodes: tet.to_vec(), cad_id: None })?;
    }
    Ok(true)
}

/// Reconstruct the cyclic order of ring vertices around edge `(n0,n1)` from
/// the cavity's boundary faces: every boundary face touching `n0` is of the
/// form `(n0, v_i, v_{i+1})`, so the `(v_i, v_{i+1})` pairs chain into a
/// single cycle when the ring is manifold.
fn ring_order(cavity: &Cavity, n0: NodeIndex) -> Option<Vec<NodeIndex>> {
    let mut adjacency: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for &(a, b, c) in cavity.boundary() {
        let others: Vec<NodeIndex> = [a, b, c].into_iter().filter(|&x| x != n0).collect();
        if others.len() != 2 {
            continue;
        }
        adjacency.entry(others[0]).or_default().push(others[1]);
        adjacency.entry(others[1]).or_default().push(others[0]);
    }
    let start = *adjacency.keys().next()?;
    let mut order = vec![start];
    let mut prev = None;
    let mut cur = start;
    loop {
        let neighbors = adjacency.get(&cur)?;
        let next = neighbors.iter().copied().find(|&n| Some(n) != prev)?;
        if next == start {
            break;
        }
        order.push(next);
        prev = Some(cur);
        cur = next;
    }
    if order.len() == adjacency.len() {
        Some(order)
    } else {
        None // ring wasn't a single manifold cycle
    }
}

/// Fan-triangulate the polygon `ring` from `hub` (a member of `ring`),
/// producing the `(ring.len()-2)` triangles of the diagonal fan.
fn fan_triangles(ring: &[NodeIndex], hub: NodeIndex) -> Vec<(NodeIndex, NodeIndex, NodeIndex)> {
    let k = ring.len();
    let hub_pos = match ring.iter().position(|&v| v == hub) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let mut tris = Vec::with_capacity(k - 2);
    let mut i = (hub_pos + 1) % k;
    while (i + 1) % k != hub_pos {
        let j = (i + 1) % k;
        tris.push((hub, ring[i], ring[j]));
        i = j;
    }
    tris
}

/// Attempt an N-to-2(N-2) edge swap: retriangulate the ring of tets around
/// `(n0,n1)` by picking the ring vertex that, used as a fan hub, yields the
/// best worst-quality replacement — only committed if strictly better than
/// the current worst quality in the ring.
pub fn try_edge_swap(
    mesh: &mut Mesh,
    _config: &AdaptConfig,
    _cad: &dyn CadQuery,
    n0: NodeIndex,
    n1: NodeIndex,
) -> AdaptResult<bool> {
    // An edge carrying a CAD-edge cell is part of the boundary curve and
    // must not be removed by a swap.
    if !mesh.cells.edges.list_with2(n0, n1, Some(1)).is_empty() {
        return Ok(false);
    }

    let cavity = match Cavity::seed_edge(n0, n1, mesh) {
        Ok(c) => c,
        Err(_) => return Ok(false),
    };
    if cavity.tets().len() < 4 {
        return Ok(false); // too small a ring for a fan-hub swap to help
    }

    let Some(ring) = ring_order(&cavity, n0) else { return Ok(false) };
    if ring.len() != cavity.tets().len() {
        return Ok(false);
    }

    let before = existing_worst_cost(mesh, cavity.tets());

    let mut best: Option<(f64, Vec<[NodeIndex; 4]>)> = None;
    for &hub in &ring {
        let fans = fan_triangles(&ring, hub);
        if fans.is_empty() {
            continue;
        }
        let mut proposed = Vec::with_capacity(fans.len() * 2);
        for (h, vi, vj) in fans {
            proposed.push([n0, h, vi, vj]);
            proposed.push([n1, h, vi, vj]);
        }
        if proposed.iter().any(|&t| tet_cost(mesh, t).is_none()) {
            continue;
        }
        let worst = worst_cost(mesh, &proposed);
        if best.as_ref().map(|(w, _)| worst < *w).unwrap_or(true) {
            best = Some((worst, proposed));
        }
    }

    let Some((worst, proposed)) = best else { return Ok(false) };
    if !(worst < before) {
        return Ok(false);
    }

    for &t in cavity.tets() {
        mesh.cells.tets.remove(t)?;
    }
    for tet in proposed {
        mesh.cells.tets.insert(Cell { nodes: tet.to_vec(), cad_id: None })?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::NullCad;
    use crate::geometry::Point3;
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};

    fn two_tet_sliver_mesh() -> (Mesh, NodeIndex, NodeIndex, NodeIndex) {
        // Two tets sharing face (n0,n1,n2), apexes slightly above/below: a
        // face swap should reconnect through the (a,b) diagonal.
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.3, 1.0),  // a
            Point3::new(0.5, 0.3, -1.0), // b
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        let [n0, n1, n2, a, b] = [idx[0], idx[1], idx[2], idx[3], idx[4]];
        mesh.cells.tets.insert(Cell { nodes: vec![n0, n1, n2, a], cad_id: None }).unwrap();
        mesh.cells.tets.insert(Cell { nodes: vec![n1, n0, n2, b], cad_id: None }).unwrap();
        (mesh, n0, n1, n2)
    }

    #[test]
    fn face_swap_rejects_boundary_face() {
        let (mut mesh, n0, n1, n2) = two_tet_sliver_mesh();
        // Remove one tet so the face is now on the boundary.
        let t = mesh.cells.tets.list_with2(n0, n1, Some(1))[0];
        mesh.cells.tets.remove(t).unwrap();
        let config = AdaptConfig::default();
        let done = try_face_swap(&mut mesh, &config, &NullCad, n0, n1, n2).unwrap();
        assert!(!done);
    }

    #[test]
    fn edge_swap_rejects_small_ring() {
        let (mut mesh, n0, n1, _n2) = two_tet_sliver_mesh();
        let config = AdaptConfig::default();
        // Ring around (n0,n1) only has 2 tets, below the 4-tet minimum.
        let done = try_edge_swap(&mut mesh, &config, &NullCad, n0, n1).unwrap();
        assert!(!done);
    }

    #[test]
    fn edge_swap_rejects_cad_edge() {
        let (mut mesh, n0, n1, _n2) = two_tet_sliver_mesh();
        mesh.cells.edges.insert(Cell { nodes: vec![n0, n1], cad_id: Some(3) }).unwrap();
        let config = AdaptConfig::default();
        let done = try_edge_swap(&mut mesh, &config, &NullCad, n0, n1).unwrap();
        assert!(!done);
    }
}
