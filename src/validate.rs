//! Invariant checks and the per-pass histograms described in SPEC_FULL.md
//! §4.8: edge-length histogram in metric space, quality histogram, inverted
//! cell count, CAD-parameter residuals. Histograms are logged at `debug`
//! verbosity and also returned as [`PassReport`] so callers can assert on
//! them directly instead of scraping log output.

use crate::cell_store::CellKind;
use crate::edge_iter::unique_edges;
use crate::error::{AdaptError, AdaptResult};
use crate::geom::{CadQuery, EntityKind};
use crate::mesh::Mesh;
use crate::metric::{edge_length, tet_quality};

/// One bin of a histogram: `[lo, hi)` except the last bin, which is
/// `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

/// Logarithmic bin edges centered on 1.0, matching the metric-space
/// acceptance band `[1/sqrt(2), sqrt(2)]`: a mesh that has fully converged
/// puts every edge in the single central bin.
fn log_bin_edges() -> Vec<f64> {
    // 1/8, 1/4, 1/2, 1/sqrt(2), sqrt(2), 2, 4, 8, plus open-ended outer bins.
    vec![
        0.0,
        0.125,
        0.25,
        0.5,
        std::f64::consts::FRAC_1_SQRT_2,
        std::f64::consts::SQRT_2,
        2.0,
        4.0,
        8.0,
        f64::INFINITY,
    ]
}

fn bin_index(edges: &[f64], value: f64) -> usize {
    for i in 0..edges.len() - 1 {
        if value >= edges[i] && value < edges[i + 1] {
            return i;
        }
    }
    edges.len() - 2
}

fn histogram_from_edges(edges: &[f64], values: &[f64]) -> Vec<HistogramBin> {
    let mut counts = vec![0usize; edges.len() - 1];
    for &v in values {
        counts[bin_index(edges, v)] += 1;
    }
    edges
        .windows(2)
        .zip(counts)
        .map(|(w, count)| HistogramBin { lo: w[0], hi: w[1], count })
        .collect()
}

/// Edge-length histogram over every unique tet edge, in metric space.
pub fn length_histogram(mesh: &Mesh) -> Vec<HistogramBin> {
    let edges = unique_edges(&mesh.cells.tets);
    let lengths: Vec<f64> = edges
        .iter()
        .filter_map(|&(n0, n1)| {
            let a = mesh.nodes.get(n0)?;
            let b = mesh.nodes.get(n1)?;
            Some(edge_length(&a.xyz, &a.metric, &b.xyz, &b.metric))
        })
        .collect();
    histogram_from_edges(&log_bin_edges(), &lengths)
}

/// Linear `[0,1]` quality histogram over every tet.
pub fn quality_histogram(mesh: &Mesh) -> Vec<HistogramBin> {
    let edges: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
    let qualities: Vec<f64> = mesh
        .cells
        .tets
        .iter()
        .filter_map(|(_, cell)| {
            let pts: Vec<_> = cell.nodes.iter().map(|&n| mesh.nodes.get(n)).collect::<Option<Vec<_>>>()?;
            let corners = [&pts[0].xyz, &pts[1].xyz, &pts[2].xyz, &pts[3].xyz];
            let metrics = [&pts[0].metric, &pts[1].metric, &pts[2].metric, &pts[3].metric];
            Some(tet_quality(corners, metrics).max(0.0))
        })
        .collect();
    histogram_from_edges(&edges, &qualities)
}

/// Count of tets with non-positive oriented volume.
pub fn inverted_count(mesh: &Mesh) -> usize {
    mesh.cells
        .tets
        .iter()
        .filter(|(_, cell)| {
            let pts: Option<Vec<_>> = cell.nodes.iter().map(|&n| mesh.nodes.get(n)).collect();
            match pts {
                Some(p) if p.len() == 4 => {
                    crate::geometry::signed_tet_volume(&p[0].xyz, &p[1].xyz, &p[2].xyz, &p[3].xyz) <= 0.0
                }
                _ => true,
            }
        })
        .count()
}

/// Maximum CAD-parameter residual: distance between `eval(params)` and the
/// node's stored `xyz`, over every face/edge association the CAD facade can
/// evaluate. `None` if no association evaluated successfully (e.g. running
/// with `NullCad`).
pub fn max_cad_residual(mesh: &Mesh, cad: &dyn CadQuery) -> Option<f64> {
    let mut worst: Option<f64> = None;
    for (node, n) in mesh.nodes.iter() {
        for assoc in mesh.geom.associations(node) {
            let kind = assoc.kind;
            if kind == EntityKind::Vertex {
                continue;
            }
            if let Ok(xyz) = cad.eval(kind, assoc.cad_id, assoc.params) {
                let residual = crate::geometry::dist_sq(&xyz, &n.xyz).sqrt();
                worst = Some(worst.map_or(residual, |w: f64| w.max(residual)));
            }
        }
    }
    worst
}

/// Check every invariant in SPEC_FULL.md §3 that an operator must preserve.
/// Returns the first violation found as an `InvariantViolated` error; callers
/// that want every violation should call the individual `check_*` helpers.
pub fn check_invariants(mesh: &Mesh) -> AdaptResult<()> {
    check_positive_volumes(mesh)?;
    check_boundary_tri_cad_ids(mesh)?;
    check_adjacency_round_trip(mesh)?;
    check_metrics_spd(mesh)?;
    Ok(())
}

fn check_positive_volumes(mesh: &Mesh) -> AdaptResult<()> {
    for (idx, cell) in mesh.cells.tets.iter() {
        let pts: Vec<_> = cell
            .nodes
            .iter()
            .map(|&n| mesh.nodes.get(n))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AdaptError::invariant_violated(format!("tet {idx} references a missing node")))?;
        let vol = crate::geometry::signed_tet_volume(&pts[0].xyz, &pts[1].xyz, &pts[2].xyz, &pts[3].xyz);
        if vol <= 0.0 {
            return Err(AdaptError::invariant_violated(format!(
                "tet {idx} has non-positive oriented volume {vol}"
            )));
        }
    }
    Ok(())
}

fn check_boundary_tri_cad_ids(mesh: &Mesh) -> AdaptResult<()> {
    for (idx, cell) in mesh.cells.triangles.iter() {
        let cad_id = cell
            .cad_id
            .ok_or_else(|| AdaptError::invariant_violated(format!("boundary tri {idx} has no CAD-face id")))?;
        if cad_id < 1 {
            return Err(AdaptError::invariant_violated(format!(
                "boundary tri {idx} has CAD-face id {cad_id} < 1"
            )));
        }
        for &n in &cell.nodes {
            if mesh.geom.find(n, EntityKind::Face, cad_id).is_empty() {
                return Err(AdaptError::invariant_violated(format!(
                    "boundary tri {idx} node {n} has no face association for CAD id {cad_id}"
                )));
            }
        }
    }
    for (idx, cell) in mesh.cells.edges.iter() {
        let cad_id = cell
            .cad_id
            .ok_or_else(|| AdaptError::invariant_violated(format!("edge-segment {idx} has no CAD-edge id")))?;
        for &n in &cell.nodes {
            if mesh.geom.find(n, EntityKind::Edge, cad_id).is_empty() {
                return Err(AdaptError::invariant_violated(format!(
                    "edge-segment {idx} node {n} has no edge association for CAD id {cad_id}"
                )));
            }
        }
    }
    Ok(())
}

fn check_adjacency_round_trip(mesh: &Mesh) -> AdaptResult<()> {
    for kind in CellKind::all() {
        let arena = mesh.cells.arena(kind);
        for (idx, cell) in arena.iter() {
            for &n in &cell.nodes {
                if !arena.adjacency().cells_of(n).contains(&idx) {
                    return Err(AdaptError::invariant_violated(format!(
                        "{kind:?} {idx} references node {n}, but node {n}'s adjacency doesn't list it back"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_metrics_spd(mesh: &Mesh) -> AdaptResult<()> {
    for (idx, node) in mesh.nodes.iter() {
        if !node.metric.is_spd() {
            return Err(AdaptError::invariant_violated(format!("node {idx} metric is not SPD")));
        }
    }
    Ok(())
}

/// Structured result of validating and summarizing one adaptation pass —
/// everything [`crate::pass::run_adaptation`] logs, returned as data so
/// tests and a future CLI can assert on it without scraping log output.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub index: usize,
    pub changed: bool,
    pub split_count: usize,
    pub collapse_count: usize,
    pub swap_count: usize,
    pub smooth_count: usize,
    pub length_histogram: Vec<HistogramBin>,
    pub quality_histogram: Vec<HistogramBin>,
    pub inverted_count: usize,
    pub cad_residual_max: Option<f64>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_report(
    mesh: &Mesh,
    cad: &dyn CadQuery,
    index: usize,
    changed: bool,
    split_count: usize,
    collapse_count: usize,
    swap_count: usize,
    smooth_count: usize,
) -> PassReport {
    let report = PassReport {
        index,
        changed,
        split_count,
        collapse_count,
        swap_count,
        smooth_count,
        length_histogram: length_histogram(mesh),
        quality_histogram: quality_histogram(mesh),
        inverted_count: inverted_count(mesh),
        cad_residual_max: max_cad_residual(mesh, cad),
    };
    tracing::debug!(
        index,
        changed,
        splits = split_count,
        collapses = collapse_count,
        swaps = swap_count,
        smooths = smooth_count,
        inverted = report.inverted_count,
        cad_residual_max = ?report.cad_residual_max,
        "pass summary"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::Cell;
    use crate::geom::NullCad;
    use crate::geometry::Point3;
    use crate::metric::MetricTensor;
    use crate::node_store::{GlobalId, Node};

    fn good_tet_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
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
    fn check_invariants_passes_on_a_clean_mesh() {
        let mesh = good_tet_mesh();
        assert!(check_invariants(&mesh).is_ok());
    }

    #[test]
    fn check_invariants_flags_inverted_tet() {
        let mut mesh = good_tet_mesh();
        let (idx, cell) = mesh.cells.tets.iter().next().unwrap();
        let mut swapped = cell.nodes.clone();
        swapped.swap(0, 1);
        mesh.cells.tets.remove(idx).unwrap();
        mesh.cells.tets.insert(Cell { nodes: swapped, cad_id: None }).unwrap();
        assert!(check_invariants(&mesh).is_err());
    }

    #[test]
    fn inverted_count_matches_manual_check() {
        let mesh = good_tet_mesh();
        assert_eq!(inverted_count(&mesh), 0);
    }

    #[test]
    fn length_histogram_places_unit_edges_in_central_bin() {
        let mesh = good_tet_mesh();
        let hist = length_histogram(&mesh);
        let central = hist
            .iter()
            .find(|b| b.lo <= 1.0 && 1.0 < b.hi)
            .expect("central bin exists");
        assert!(central.count > 0);
    }

    #[test]
    fn max_cad_residual_is_none_without_associations() {
        let mesh = good_tet_mesh();
        assert_eq!(max_cad_residual(&mesh, &NullCad), None);
    }
}
