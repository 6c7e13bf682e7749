//! Vertex smooth: reposition a node, without changing topology, to lower
//! the worst metric-aware shape cost among its incident tets. CAD-vertex
//! nodes have no freedom; CAD-edge/face nodes search within their
//! parametric entity; interior nodes search in 3-D.

use crate::cavity::Cavity;
use crate::cell_store::CellIndex;
use crate::config::AdaptConfig;
use crate::error::AdaptResult;
use crate::geom::{CadQuery, EntityKind, GeomAssoc};
use crate::geometry::{points_centroid, Point3};
use crate::mesh::Mesh;
use crate::metric::tet_quality;
use crate::node_store::NodeIndex;

fn shape_cost(quality: f64) -> f64 {
    if quality <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / quality
    }
}

/// Quality of `tet` with `n`'s position replaced by `candidate`, `None` if
/// the tet no longer exists or doesn't reference `n`.
fn tet_cost_at(mesh: &Mesh, tet: CellIndex, n: NodeIndex, candidate: &Point3) -> Option<f64> {
    let cell = mesh.cells.tets.get(tet)?;
    if cell.nodes.len() != 4 {
        return None;
    }
    let mut pts = Vec::with_capacity(4);
    let mut mets = Vec::with_capacity(4);
    for &nd in &cell.nodes {
        if nd == n {
            pts.push(*candidate);
            mets.push(mesh.nodes.get(n)?.metric);
        } else {
            let node = mesh.nodes.get(nd)?;
            pts.push(node.xyz);
            mets.push(node.metric);
        }
    }
    Some(tet_quality(
        [&pts[0], &pts[1], &pts[2], &pts[3]],
        [&mets[0], &mets[1], &mets[2], &mets[3]],
    ))
}

fn incident_cost(mesh: &Mesh, tets: &[CellIndex], n: NodeIndex, candidate: &Point3) -> f64 {
    tets.iter()
        .filter_map(|&t| tet_cost_at(mesh, t, n, candidate))
        .map(shape_cost)
        .fold(f64::NEG_INFINITY, f64::max)
}

struct Candidate {
    xyz: Point3,
    assoc: Option<GeomAssoc>,
}

/// Laplacian-direction line search: candidate positions along the segment
/// from the current position toward the centroid of the ring's other
/// nodes, at shrinking step fractions.
fn interior_candidates(mesh: &Mesh, tets: &[CellIndex], n: NodeIndex, current: &Point3) -> Vec<Candidate> {
    let mut neighbors = Vec::new();
    for &t in tets {
        if let Some(cell) = mesh.cells.tets.get(t) {
            for &nd in &cell.nodes {
                if nd != n {
                    if let Some(node) = mesh.nodes.get(nd) {
                        neighbors.push(node.xyz);
                    }
                }
            }
        }
    }
    if neighbors.is_empty() {
        return Vec::new();
    }
    let centroid = points_centroid(&neighbors);
    let direction = centroid - current;
    [1.0, 0.75, 0.5, 0.25, 0.1, 0.05]
        .into_iter()
        .map(|alpha| Candidate { xyz: current + direction * alpha, assoc: None })
        .collect()
}

fn edge_candidates(cad: &dyn CadQuery, assoc: &GeomAssoc) -> Vec<Candidate> {
    let t0 = assoc.params[0];
    let mut out = Vec::new();
    for frac in [0.1, 0.05, 0.02, 0.01, 0.002] {
        let step = t0.abs().max(1.0) * frac;
        for dt in [step, -step] {
            let t_new = t0 + dt;
            if let Ok(xyz) = cad.eval(EntityKind::Edge, assoc.cad_id, [t_new, 0.0]) {
                let new_assoc = GeomAssoc::edge(assoc.cad_id, t_new)
                    .with_sens(assoc.sens)
                    .with_jump(assoc.jump)
                    .with_degen(assoc.degen);
                out.push(Candidate { xyz, assoc: Some(new_assoc) });
            }
        }
    }
    out
}

fn face_candidates(cad: &dyn CadQuery, assoc: &GeomAssoc) -> Vec<Candidate> {
    let [u0, v0] = assoc.params;
    let mut out = Vec::new();
    for frac in [0.1, 0.05, 0.02, 0.01, 0.002] {
        let su = u0.abs().max(1.0) * frac;
        let sv = v0.abs().max(1.0) * frac;
        for (du, dv) in [(su, 0.0), (-su, 0.0), (0.0, sv), (0.0, -sv), (su, sv), (-su, -sv), (su, -sv), (-su, sv)] {
            let (u_new, v_new) = (u0 + du, v0 + dv);
            if let Ok(xyz) = cad.eval(EntityKind::Face, assoc.cad_id, [u_new, v_new]) {
                let new_assoc = GeomAssoc::face(assoc.cad_id, u_new, v_new)
                    .with_sens(assoc.sens)
                    .with_jump(assoc.jump)
                    .with_degen(assoc.degen);
                out.push(Candidate { xyz, assoc: Some(new_assoc) });
            }
        }
    }
    out
}

/// Attempt to smooth node `n`. Returns `Ok(true)` if its position (and, for
/// CAD-constrained nodes, its parameter association) was updated, `Ok(false)`
/// if no candidate strictly improved the worst incident-tet cost.
pub fn try_smooth(mesh: &mut Mesh, _config: &AdaptConfig, cad: &dyn CadQuery, n: NodeIndex) -> AdaptResult<bool> {
    let Some(node) = mesh.nodes.get(n) else { return Ok(false) };
    let current_xyz = node.xyz;

    let dominant = mesh.geom.dominant(n).copied();
    if let Some(assoc) = dominant {
        if assoc.kind == EntityKind::Vertex {
            return Ok(false); // no freedom at a CAD vertex
        }
    }

    let cavity = match Cavity::seed_node(n, mesh) {
        Ok(c) => c,
        Err(_) => return Ok(false),
    };
    let tets = cavity.tets().to_vec();
    if tets.is_empty() {
        return Ok(false);
    }

    let current_cost = incident_cost(mesh, &tets, n, &current_xyz);

    let candidates = match dominant {
        Some(assoc) if assoc.kind == EntityKind::Edge => edge_candidates(cad, &assoc),
        Some(assoc) if assoc.kind == EntityKind::Face => face_candidates(cad, &assoc),
        _ => interior_candidates(mesh, &tets, n, &current_xyz),
    };

    let mut best: Option<(f64, Point3, Option<GeomAssoc>)> = None;
    for cand in candidates {
        let cost = incident_cost(mesh, &tets, n, &cand.xyz);
        if !cost.is_finite() || !(cost < current_cost) {
            continue;
        }
        if best.as_ref().map(|(b, _, _)| cost < *b).unwrap_or(true) {
            best = Some((cost, cand.xyz, cand.assoc));
        }
    }

    let Some((_, xyz, assoc)) = best else { return Ok(false) };
    if let Some(slot) = mesh.nodes.get_mut(n) {
        slot.xyz = xyz;
    }
    if let Some(assoc) = assoc {
        mesh.geom.add(n, assoc);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::Cell;
    use crate::geom::NullCad;
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};

    #[test]
    fn interior_node_moves_toward_neighbor_centroid() {
        let mut mesh = Mesh::new();
        // An off-center apex above a near-regular base triangle: smoothing
        // should pull it toward the base's centroid, improving shape.
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.5, 2.5, 1.0),
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        mesh.cells.tets.insert(Cell { nodes: idx.clone(), cad_id: None }).unwrap();

        let config = AdaptConfig::default();
        let moved = try_smooth(&mut mesh, &config, &NullCad, idx[3]).unwrap();
        assert!(moved);
        let new_xyz = mesh.nodes.get(idx[3]).unwrap().xyz;
        assert!(new_xyz.x < 2.5);
    }

    #[test]
    fn cad_vertex_node_never_moves() {
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.5, 2.5, 1.0),
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        mesh.cells.tets.insert(Cell { nodes: idx.clone(), cad_id: None }).unwrap();
        mesh.geom.add(idx[3], GeomAssoc::vertex(1));

        let config = AdaptConfig::default();
        let moved = try_smooth(&mut mesh, &config, &NullCad, idx[3]).unwrap();
        assert!(!moved);
        assert_eq!(mesh.nodes.get(idx[3]).unwrap().xyz, Point3::new(2.5, 2.5, 1.0));
    }
}
