//! The fixed-point adaptation loop: collapse (shortest-first), split
//! (longest-first), one swap sweep, one smooth sweep, repeated until two
//! consecutive passes make no change or `config.max_passes` is reached.

use crate::config::AdaptConfig;
use crate::edge_iter::unique_edges;
use crate::error::AdaptResult;
use crate::geom::CadQuery;
use crate::mesh::Mesh;
use crate::metric::edge_length;
use crate::node_store::NodeIndex;
use crate::operators::{try_collapse, try_edge_swap, try_face_swap, try_smooth, try_split};
use crate::partition::PartitionService;
use crate::validate::{build_report, PassReport};
use std::collections::HashMap;

/// Every triangular face shared by exactly two tets, as an unordered node
/// triple keyed independent of vertex order — the candidate set for the
/// face-swap half of the swap sweep.
fn interior_faces(mesh: &Mesh) -> Vec<(NodeIndex, NodeIndex, NodeIndex)> {
    let mut counts: HashMap<(NodeIndex, NodeIndex, NodeIndex), (NodeIndex, NodeIndex, NodeIndex)> = HashMap::new();
    let mut seen = HashMap::new();
    for (_, cell) in mesh.cells.tets.iter() {
        let n = &cell.nodes;
        if n.len() != 4 {
            continue;
        }
        for &(a, b, c) in &[(n[0], n[1], n[2]), (n[0], n[1], n[3]), (n[0], n[2], n[3]), (n[1], n[2], n[3])] {
            let mut key = [a, b, c];
            key.sort_unstable();
            let key = (key[0], key[1], key[2]);
            *seen.entry(key).or_insert(0) += 1;
            counts.insert(key, (a, b, c));
        }
    }
    seen.into_iter()
        .filter(|(_, count)| *count == 2)
        .filter_map(|(key, _)| counts.get(&key).copied())
        .collect()
}

fn collapse_sweep(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery) -> AdaptResult<usize> {
    let mut edges = unique_edges(&mesh.cells.tets)
        .into_iter()
        .filter_map(|(n0, n1)| {
            let a = mesh.nodes.get(n0)?;
            let b = mesh.nodes.get(n1)?;
            Some((edge_length(&a.xyz, &a.metric, &b.xyz, &b.metric), n0, n1))
        })
        .collect::<Vec<_>>();
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut count = 0;
    for (_, n0, n1) in edges {
        if !mesh.nodes.contains(n0) || !mesh.nodes.contains(n1) {
            continue;
        }
        if try_collapse(mesh, config, cad, n0, n1)? {
            count += 1;
            continue;
        }
        if mesh.nodes.contains(n0) && mesh.nodes.contains(n1) && try_collapse(mesh, config, cad, n1, n0)? {
            count += 1;
        } else {
            tracing::debug!(edge = ?(n0, n1), "collapse rejected");
        }
    }
    tracing::debug!(count, "collapse sweep");
    Ok(count)
}

fn split_sweep(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery) -> AdaptResult<usize> {
    let mut edges = unique_edges(&mesh.cells.tets)
        .into_iter()
        .filter_map(|(n0, n1)| {
            let a = mesh.nodes.get(n0)?;
            let b = mesh.nodes.get(n1)?;
            Some((edge_length(&a.xyz, &a.metric, &b.xyz, &b.metric), n0, n1))
        })
        .collect::<Vec<_>>();
    edges.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut count = 0;
    for (_, n0, n1) in edges {
        if !mesh.nodes.contains(n0) || !mesh.nodes.contains(n1) {
            continue;
        }
        if try_split(mesh, config, cad, (n0, n1))? {
            count += 1;
        }
    }
    tracing::debug!(count, "split sweep");
    Ok(count)
}

fn swap_sweep(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery) -> AdaptResult<usize> {
    let mut count = 0;
    for (n0, n1) in unique_edges(&mesh.cells.tets) {
        if !mesh.nodes.contains(n0) || !mesh.nodes.contains(n1) {
            continue;
        }
        if try_edge_swap(mesh, config, cad, n0, n1)? {
            count += 1;
        }
    }
    for (a, b, c) in interior_faces(mesh) {
        if ![a, b, c].iter().all(|&n| mesh.nodes.contains(n)) {
            continue;
        }
        if try_face_swap(mesh, config, cad, a, b, c)? {
            count += 1;
        }
    }
    tracing::debug!(count, "swap sweep");
    Ok(count)
}

fn smooth_sweep(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery) -> AdaptResult<usize> {
    let nodes: Vec<NodeIndex> = mesh.nodes.iter().map(|(i, _)| i).collect();
    let mut count = 0;
    for n in nodes {
        if !mesh.nodes.contains(n) {
            continue;
        }
        if try_smooth(mesh, config, cad, n)? {
            count += 1;
        }
    }
    tracing::debug!(count, "smooth sweep");
    Ok(count)
}

/// Run the four sweeps once, in the documented order. Returns the per-sweep
/// counts of committed mutations: `(splits, collapses, swaps, smooths)`.
pub fn run_one_pass(mesh: &mut Mesh, config: &AdaptConfig, cad: &dyn CadQuery) -> AdaptResult<(usize, usize, usize, usize)> {
    let span = tracing::info_span!("pass");
    let _enter = span.enter();

    let collapses = collapse_sweep(mesh, config, cad)?;
    let splits = split_sweep(mesh, config, cad)?;
    let swaps = swap_sweep(mesh, config, cad)?;
    let smooths = smooth_sweep(mesh, config, cad)?;

    Ok((splits, collapses, swaps, smooths))
}

/// Run the fixed-point adaptation loop: balance -> ghost -> one pass -> pack,
/// repeated until two consecutive passes commit no mutations or
/// `config.max_passes` passes have run. Returns one [`PassReport`] per pass.
pub fn run_adaptation(
    mesh: &mut Mesh,
    config: &AdaptConfig,
    cad: &dyn CadQuery,
    partition: &dyn PartitionService,
) -> AdaptResult<Vec<PassReport>> {
    let mut reports = Vec::new();
    let mut quiescent_streak = 0;

    for index in 0..config.max_passes {
        partition.balance(mesh)?;
        partition.ghost(mesh)?;

        let (splits, collapses, swaps, smooths) = run_one_pass(mesh, config, cad)?;

        partition.pack(mesh)?;

        let changed = splits + collapses + swaps + smooths > 0;
        let report = build_report(mesh, cad, index, changed, splits, collapses, swaps, smooths);
        tracing::info!(
            pass = index,
            splits,
            collapses,
            swaps,
            smooths,
            "adaptation pass complete"
        );
        reports.push(report);

        if changed {
            quiescent_streak = 0;
        } else {
            quiescent_streak += 1;
            if quiescent_streak >= 2 {
                break;
            }
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::Cell;
    use crate::geom::NullCad;
    use crate::geometry::Point3;
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};
    use crate::partition::SinglePartition;

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
        mesh.cells.tets.insert(Cell { nodes: idx, cad_id: None }).unwrap();
        mesh
    }

    #[test]
    fn run_adaptation_splits_an_oversized_tet() {
        let mut mesh = single_tet_mesh(3.0);
        let config = AdaptConfig::default().with_max_passes(3);
        let reports = run_adaptation(&mut mesh, &config, &NullCad, &SinglePartition).unwrap();
        assert!(!reports.is_empty());
        assert!(mesh.nodes.len() > 4, "oversized edges should have been split");
    }

    #[test]
    fn run_adaptation_terminates_on_a_converged_mesh() {
        let mut mesh = single_tet_mesh(1.0); // unit edges, already within the acceptance band
        let config = AdaptConfig::default().with_max_passes(10);
        let reports = run_adaptation(&mut mesh, &config, &NullCad, &SinglePartition).unwrap();
        assert!(reports.len() < 10, "a converged mesh should stop well before max_passes");
    }

    #[test]
    fn interior_faces_finds_the_shared_face_of_two_tets() {
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.3, 1.0),
            Point3::new(0.5, 0.3, -1.0),
        ];
        let idx: Vec<NodeIndex> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| mesh.nodes.insert(Node::new(GlobalId(i as u64), *p, MetricTensor::identity(), 0)))
            .collect();
        let [n0, n1, n2, a, b] = [idx[0], idx[1], idx[2], idx[3], idx[4]];
        mesh.cells.tets.insert(Cell { nodes: vec![n0, n1, n2, a], cad_id: None }).unwrap();
        mesh.cells.tets.insert(Cell { nodes: vec![n1, n0, n2, b], cad_id: None }).unwrap();

        let faces = interior_faces(&mesh);
        assert_eq!(faces.len(), 1);
    }
}
