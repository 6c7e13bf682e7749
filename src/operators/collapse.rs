//! Edge collapse: merge `drop` into `keep` when the edge between them is too
//! short.

use crate::config::AdaptConfig;
use crate::error::AdaptResult;
use crate::geom::{CadQuery, EntityKind};
use crate::geometry::{tet_is_positive, triangle_normal, Point3};
use crate::mesh::Mesh;
use crate::metric::edge_length;
use crate::node_store::NodeIndex;

/// Attempt to collapse the edge `(keep, drop)`, merging `drop` into `keep`.
/// Returns `Ok(true)` if committed, `Ok(false)` if rejected with no
/// mutation.
pub fn try_collapse(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery, keep: NodeIndex, drop: NodeIndex) -> AdaptResult<bool> {
    let (keep_node, drop_node) = match (mesh.nodes.get(keep), mesh.nodes.get(drop)) {
        (Some(a), Some(b)) => (a.clone(), b.clone()),
        _ => return Ok(false),
    };

    let length = edge_length(&keep_node.xyz, &keep_node.metric, &drop_node.xyz, &drop_node.metric);
    if length >= config.collapse_threshold() {
        return Ok(false);
    }

    let keep_rank = mesh.geom.dominant(keep).map(|a| crate::geom::GeomAssoc::rank(a.kind));
    let drop_rank = mesh.geom.dominant(drop).map(|a| crate::geom::GeomAssoc::rank(a.kind));
    // Lower rank number = lower-dimensional = more constrained. Promoting
    // `keep` to a stricter entity than it already sits on is not allowed.
    if let (Some(dr), kr) = (drop_rank, keep_rank.unwrap_or(u8::MAX)) {
        if dr < kr {
            return Ok(false);
        }
    }

    let incident = mesh.cells.tets.adjacency().cells_of(drop);
    let mut to_remove = Vec::new();
    let mut to_modify = Vec::new();
    for t in incident {
        let cell = match mesh.cells.tets.get(t) {
            Some(c) => c,
            None => continue,
        };
        if cell.contains_node(keep) {
            to_remove.push(t);
        } else {
            to_modify.push(t);
        }
    }

    let xyz_after = |n: NodeIndex| -> Point3 {
        if n == drop {
            keep_node.xyz
        } else {
            mesh.nodes.get(n).map(|node| node.xyz).unwrap_or(keep_node.xyz)
        }
    };

    for &t in &to_modify {
        let cell = mesh.cells.tets.get(t).expect("iterated above");
        let pts: Vec<Point3> = cell.nodes.iter().map(|&n| xyz_after(n)).collect();
        if !tet_is_positive(&pts[0], &pts[1], &pts[2], &pts[3]) {
            return Ok(false);
        }
    }

    let tri_remove: Vec<_> = mesh.cells.triangles.list_with2(keep, drop, None);

    if !surface_ok_after_collapse(mesh, drop, keep, &tri_remove, cad, config.cad_normal_tolerance) {
        return Ok(false);
    }

    for &t in &to_remove {
        mesh.cells.tets.remove(t)?;
    }
    for &t in &to_modify {
        mesh.cells.tets.substitute_node(t, drop, keep)?;
    }

    for t in tri_remove {
        mesh.cells.triangles.remove(t)?;
    }
    retarget_boundary_cells(mesh, drop, keep)?;

    mesh.nodes.remove(drop)?;
    mesh.geom.remove_node(drop);

    Ok(true)
}

fn retarget_boundary_cells(mesh: &mut Mesh, drop: NodeIndex, keep: NodeIndex) -> AdaptResult<()> {
    for kind in [crate::cell_store::CellKind::Triangle, crate::cell_store::CellKind::EdgeSegment] {
        let affected: Vec<_> = mesh.cells.arena(kind).adjacency().cells_of(drop);
        for c in affected {
            mesh.cells.arena_mut(kind).substitute_node(c, drop, keep)?;
        }
    }
    Ok(())
}

/// Re-check CAD-normal alignment for every boundary triangle incident to
/// `drop` that survives the collapse (i.e. isn't in `tri_remove`, which spans
/// both `keep` and `drop` and is deleted outright). Mirrors
/// `Cavity::surface_alignment_ok`, substituting `drop -> keep` before
/// recomputing each triangle's normal.
fn surface_ok_after_collapse(
    mesh: &Mesh,
    drop: NodeIndex,
    keep: NodeIndex,
    tri_remove: &[crate::cell_store::CellIndex],
    cad: &dyn CadQuery,
    tolerance: f64,
) -> bool {
    let Some(keep_xyz) = mesh.nodes.get(keep).map(|node| node.xyz) else { return true };
    let xyz_after = |n: NodeIndex| -> Point3 {
        if n == drop {
            keep_xyz
        } else {
            mesh.nodes.get(n).map(|node| node.xyz).unwrap_or(keep_xyz)
        }
    };

    for t in mesh.cells.triangles.adjacency().cells_of(drop) {
        if tri_remove.contains(&t) {
            continue;
        }
        let Some(cell) = mesh.cells.triangles.get(t) else { continue };
        let Some(cad_id) = cell.cad_id else { continue };
        if cell.nodes.len() != 3 {
            continue;
        }
        let nodes = [cell.nodes[0], cell.nodes[1], cell.nodes[2]];
        let (pa, pb, pc) = (xyz_after(nodes[0]), xyz_after(nodes[1]), xyz_after(nodes[2]));
        let mesh_normal = triangle_normal(&pa, &pb, &pc);

        let surviving = nodes.iter().copied().find(|&n| n != drop).unwrap_or(keep);
        let Some(assoc) = mesh.geom.find(surviving, EntityKind::Face, cad_id).first().copied() else {
            continue;
        };
        let Ok(curvature) = cad.curvature(cad_id, assoc.params) else { continue };
        let cos_angle = mesh_normal.dot(&curvature.normal).clamp(-1.0, 1.0);
        if cos_angle.acos() > tolerance {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::Cell;
    use crate::geom::{AnalyticCad, AnalyticSurface, GeomAssoc, NullCad};
    use crate::geometry::{Point3, Vector3};
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};

    fn two_tet_mesh(short_edge: f64) -> (Mesh, NodeIndex, NodeIndex) {
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(short_edge, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        let [n0, n1, n2, n3, n4] = [idx[0], idx[1], idx[2], idx[3], idx[4]];
        mesh.cells.tets.insert(Cell { nodes: vec![n0, n1, n2, n3], cad_id: None }).unwrap();
        mesh.cells.tets.insert(Cell { nodes: vec![n1, n2, n3, n4], cad_id: None }).unwrap();
        (mesh, n0, n1)
    }

    #[test]
    fn short_edge_collapses_and_removes_drop_node() {
        let (mut mesh, keep, drop) = two_tet_mesh(0.01);
        let config = AdaptConfig::default();
        let committed = try_collapse(&mut mesh, &config, &NullCad, keep, drop).unwrap();
        assert!(committed);
        assert!(!mesh.nodes.contains(drop));
        for (_, cell) in mesh.cells.tets.iter() {
            assert!(!cell.nodes.contains(&drop));
        }
    }

    #[test]
    fn long_edge_is_not_collapsed() {
        let (mut mesh, keep, drop) = two_tet_mesh(5.0);
        let config = AdaptConfig::default();
        let committed = try_collapse(&mut mesh, &config, &NullCad, keep, drop).unwrap();
        assert!(!committed);
        assert!(mesh.nodes.contains(drop));
    }

    #[test]
    fn cannot_promote_face_node_into_vertex_node() {
        let (mut mesh, keep, drop) = two_tet_mesh(0.01);
        mesh.geom.add(drop, crate::geom::GeomAssoc::vertex(1));
        let config = AdaptConfig::default();
        let committed = try_collapse(&mut mesh, &config, &NullCad, keep, drop).unwrap();
        assert!(!committed, "collapsing a CAD-vertex node into an unconstrained node must be rejected");
    }

    /// A boundary triangle (`drop`, `b`, `x`) sits flush on a CAD plane
    /// (`z = 0`). `keep` is lifted off the plane; substituting `drop ->
    /// keep` would fold the surviving triangle's normal well past
    /// `cad_normal_tolerance`, so the collapse must be rejected even though
    /// every affected tet keeps positive volume.
    fn tilted_boundary_mesh() -> (Mesh, NodeIndex, NodeIndex) {
        let mut mesh = Mesh::new();
        let drop = mesh.nodes.insert(Node::new(GlobalId(0), Point3::new(0.0, 0.0, 0.0), MetricTensor::identity(), 0));
        let keep = mesh.nodes.insert(Node::new(GlobalId(1), Point3::new(0.0, 0.0, 0.3), MetricTensor::identity(), 0));
        let b = mesh.nodes.insert(Node::new(GlobalId(2), Point3::new(1.0, 0.0, 0.0), MetricTensor::identity(), 0));
        let x = mesh.nodes.insert(Node::new(GlobalId(3), Point3::new(0.0, 1.0, 0.0), MetricTensor::identity(), 0));
        let apex = mesh.nodes.insert(Node::new(GlobalId(4), Point3::new(0.0, 0.0, 1.0), MetricTensor::identity(), 0));

        mesh.cells.tets.insert(Cell { nodes: vec![drop, b, x, apex], cad_id: None }).unwrap();
        mesh.cells.triangles.insert(Cell { nodes: vec![drop, b, x], cad_id: Some(1) }).unwrap();
        mesh.geom.add(b, GeomAssoc::face(1, 0.0, 0.0));

        (mesh, keep, drop)
    }

    #[test]
    fn collapse_rejected_when_surviving_triangle_normal_tilts_past_tolerance() {
        let (mut mesh, keep, drop) = tilted_boundary_mesh();
        let cad = AnalyticCad::new().with_face(
            1,
            AnalyticSurface::Plane { origin: Point3::origin(), normal: Vector3::z(), u_axis: Vector3::x() },
        );
        let config = AdaptConfig::default();
        let committed = try_collapse(&mut mesh, &config, &cad, keep, drop).unwrap();
        assert!(!committed, "folding the boundary triangle past cad_normal_tolerance must reject the collapse");
        assert!(mesh.nodes.contains(drop));
    }

    #[test]
    fn collapse_without_cad_kernel_ignores_surface_check() {
        let (mut mesh, keep, drop) = tilted_boundary_mesh();
        let config = AdaptConfig::default();
        let committed = try_collapse(&mut mesh, &config, &NullCad, keep, drop).unwrap();
        assert!(committed, "NullCad errors on curvature(), so the surface recheck has nothing to reject against");
    }
}
