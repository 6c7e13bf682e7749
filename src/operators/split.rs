//! Edge split: insert a new node at (approximately) an edge's metric
//! midpoint when the edge is too long.

use crate::cavity::Cavity;
use crate::cell_store::Cell;
use crate::config::AdaptConfig;
use crate::error::AdaptResult;
use crate::geom::{CadQuery, EntityKind, GeomAssoc};
use crate::geometry::points_centroid;
use crate::mesh::Mesh;
use crate::metric::edge_length;
use crate::node_store::{Node, NodeIndex};
use crate::operators::common::{fresh_global_id, shared_entity, PROPOSED_NODE};

/// Attempt to split `edge`. Returns `Ok(true)` if the split was committed,
/// `Ok(false)` if it was rejected with no mutation.
pub fn try_split(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery, edge: (NodeIndex, NodeIndex)) -> AdaptResult<bool> {
    let (n0, n1) = edge;
    let (node0, node1) = match (mesh.nodes.get(n0), mesh.nodes.get(n1)) {
        (Some(a), Some(b)) => (a.clone(), b.clone()),
        _ => return Ok(false),
    };

    let length = edge_length(&node0.xyz, &node0.metric, &node1.xyz, &node1.metric);
    if length <= config.split_threshold() {
        return Ok(false);
    }

    let shared = shared_entity(mesh, n0, n1);
    let (new_xyz, new_assoc) = match &shared {
        Some((EntityKind::Face, cad_id, a0, a1)) => {
            let mid = [(a0.params[0] + a1.params[0]) / 2.0, (a0.params[1] + a1.params[1]) / 2.0];
            match cad.eval(EntityKind::Face, *cad_id, mid) {
                Ok(xyz) => (xyz, Some(GeomAssoc::face(*cad_id, mid[0], mid[1]))),
                Err(_) => (points_centroid(&[node0.xyz, node1.xyz]), None),
            }
        }
        Some((EntityKind::Edge, cad_id, a0, a1)) => {
            let mid_t = (a0.params[0] + a1.params[0]) / 2.0;
            match cad.eval(EntityKind::Edge, *cad_id, [mid_t, 0.0]) {
                Ok(xyz) => (xyz, Some(GeomAssoc::edge(*cad_id, mid_t))),
                Err(_) => (points_centroid(&[node0.xyz, node1.xyz]), None),
            }
        }
        _ => (points_centroid(&[node0.xyz, node1.xyz]), None),
    };

    let mut cavity = Cavity::seed_edge(n0, n1, mesh)?;
    cavity.enlarge_visible(&new_xyz, mesh)?;
    let proposed = cavity.replace(PROPOSED_NODE);
    if !cavity.valid(&proposed, &new_xyz, mesh, cad, config.cad_normal_tolerance) {
        return Ok(false);
    }

    let metric_mid = node0.metric.interpolate(&node1.metric, 0.5);
    let new_node = mesh.nodes.insert(Node::new(fresh_global_id(mesh), new_xyz, metric_mid, node0.part));
    if let Some(assoc) = new_assoc {
        mesh.geom.add(new_node, assoc);
    }

    for &t in cavity.tets() {
        mesh.cells.tets.remove(t)?;
    }
    for tet in &proposed {
        let nodes = tet.iter().map(|&n| if n == PROPOSED_NODE { new_node } else { n }).collect();
        mesh.cells.tets.insert(Cell { nodes, cad_id: None })?;
    }

    split_boundary_cells(mesh, n0, n1, new_node)?;

    Ok(true)
}

/// Replace any edge-segment or boundary-triangle cell spanning `(n0,n1)`
/// with two cells through `new_node`, preserving CAD ids.
fn split_boundary_cells(mesh: &mut Mesh, n0: NodeIndex, n1: NodeIndex, new_node: NodeIndex) -> AdaptResult<()> {
    let edge_cells = mesh.cells.edges.list_with2(n0, n1, None);
    for e in edge_cells {
        let cad_id = mesh.cells.edges.get(e).and_then(|c| c.cad_id);
        mesh.cells.edges.remove(e)?;
        if let Some(id) = cad_id {
            mesh.cells.edges.insert(Cell { nodes: vec![n0, new_node], cad_id: Some(id) })?;
            mesh.cells.edges.insert(Cell { nodes: vec![new_node, n1], cad_id: Some(id) })?;
        }
    }

    let tri_cells = mesh.cells.triangles.list_with2(n0, n1, None);
    for t in tri_cells {
        let (cad_id, third) = match mesh.cells.triangles.get(t) {
            Some(cell) => {
                let third = cell.nodes.iter().copied().find(|&n| n != n0 && n != n1);
                (cell.cad_id, third)
            }
            None => continue,
        };
        let Some(third) = third else { continue };
        mesh.cells.triangles.remove(t)?;
        mesh.cells.triangles.insert(Cell { nodes: vec![n0, new_node, third], cad_id })?;
        mesh.cells.triangles.insert(Cell { nodes: vec![new_node, n1, third], cad_id })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::NullCad;
    use crate::geometry::Point3;
    use crate::metric::MetricTensor;
    use crate::node_store::GlobalId;

    fn single_tet_mesh(scale: f64) -> Mesh {
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(scale, 0.0, 0.0),
            Point3::new(0.0, scale, 0.0),
            Point3::new(0.0, 0.0, scale),
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        mesh.cells
            .tets
            .insert(Cell { nodes: idx, cad_id: None })
            .unwrap();
        mesh
    }

    #[test]
    fn long_edge_splits_into_two_tets() {
        let mut mesh = single_tet_mesh(3.0); // edges of length 3 and 3*sqrt(2), all > sqrt(2)
        let config = AdaptConfig::default();
        let committed = try_split(&mut mesh, &config, &NullCad, (0, 1)).unwrap();
        assert!(committed);
        assert_eq!(mesh.cells.tets.len(), 2);
        assert_eq!(mesh.nodes.len(), 5);
        for (_, cell) in mesh.cells.tets.iter() {
            let pts: Vec<Point3> = cell.nodes.iter().map(|&n| mesh.nodes.get(n).unwrap().xyz).collect();
            assert!(crate::geometry::tet_is_positive(&pts[0], &pts[1], &pts[2], &pts[3]));
        }
    }

    #[test]
    fn short_edge_is_rejected_without_mutation() {
        let mut mesh = single_tet_mesh(0.3); // all edges well inside the acceptance band
        let config = AdaptConfig::default();
        let committed = try_split(&mut mesh, &config, &NullCad, (0, 1)).unwrap();
        assert!(!committed);
        assert_eq!(mesh.nodes.len(), 4);
        assert_eq!(mesh.cells.tets.len(), 1);
    }
}
