//! Metric tensor algebra: the log-Euclidean toolkit every operator consults
//! to decide "is this edge too long/short" and "how good is this tet".
//!
//! A metric is a symmetric positive-definite 3x3 tensor defining an inner
//! product; the adaptation target is unit-length edges under that inner
//! product. Stored as six independent entries (upper-triangular order,
//! matching the on-disk `solb`/`metric` layout this crate does not itself
//! read or write — see [`crate::AdaptConfig`] and SPEC_FULL.md §6).

use crate::geometry::{Matrix3, Point3, Vector3};
use nalgebra::linalg::{Cholesky, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// A symmetric positive-definite 3x3 metric tensor, stored as the six
/// independent entries `xx, xy, xz, yy, yz, zz`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTensor {
    pub xx: f64,
    pub xy: f64,
    pub xz: f64,
    pub yy: f64,
    pub yz: f64,
    pub zz: f64,
}

impl MetricTensor {
    pub fn new(xx: f64, xy: f64, xz: f64, yy: f64, yz: f64, zz: f64) -> Self {
        Self { xx, xy, xz, yy, yz, zz }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 1.0)
    }

    /// An isotropic metric requesting edge length `h` in every direction.
    pub fn isotropic(h: f64) -> Self {
        let inv2 = 1.0 / (h * h);
        Self::new(inv2, 0.0, 0.0, inv2, 0.0, inv2)
    }

    pub fn to_matrix3(&self) -> Matrix3 {
        Matrix3::new(
            self.xx, self.xy, self.xz, self.xy, self.yy, self.yz, self.xz, self.yz, self.zz,
        )
    }

    pub fn from_matrix3(m: &Matrix3) -> Self {
        // Symmetrize defensively; callers that already guarantee symmetry
        // (eigenreconstruction) pay a no-op cost here.
        Self::new(
            m[(0, 0)],
            0.5 * (m[(0, 1)] + m[(1, 0)]),
            0.5 * (m[(0, 2)] + m[(2, 0)]),
            m[(1, 1)],
            0.5 * (m[(1, 2)] + m[(2, 1)]),
            m[(2, 2)],
        )
    }

    fn eigen(&self) -> SymmetricEigen<f64, nalgebra::U3> {
        SymmetricEigen::new(self.to_matrix3())
    }

    pub fn smallest_eigenvalue(&self) -> f64 {
        self.eigen().eigenvalues.min()
    }

    pub fn is_spd(&self) -> bool {
        self.smallest_eigenvalue() > 0.0
    }

    /// Symmetric matrix logarithm via eigendecomposition: `V diag(ln λ) V^T`.
    pub fn log_m(&self) -> Matrix3 {
        let eig = self.eigen();
        let log_eigs = eig.eigenvalues.map(|l| l.max(f64::MIN_POSITIVE).ln());
        eig.eigenvectors * Matrix3::from_diagonal(&log_eigs) * eig.eigenvectors.transpose()
    }

    /// Inverse of [`Self::log_m`]: matrix exponential via eigendecomposition
    /// of a symmetric matrix.
    pub fn exp_m(log: &Matrix3) -> Self {
        let symmetrized = Self::from_matrix3(log).to_matrix3();
        let eig = SymmetricEigen::new(symmetrized);
        let exp_eigs = eig.eigenvalues.map(|l| l.exp());
        let m = eig.eigenvectors * Matrix3::from_diagonal(&exp_eigs) * eig.eigenvectors.transpose();
        Self::from_matrix3(&m)
    }

    /// Matrix square root `M^{1/2}` via eigendecomposition, used to transform
    /// a cell into metric space for quality evaluation.
    pub fn sqrt_matrix(&self) -> Matrix3 {
        let eig = self.eigen();
        let sqrt_eigs = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
        eig.eigenvectors * Matrix3::from_diagonal(&sqrt_eigs) * eig.eigenvectors.transpose()
    }

    /// Log-Euclidean interpolation: `exp_m((1-t) log_m(M0) + t log_m(M1))`.
    pub fn interpolate(&self, other: &Self, t: f64) -> Self {
        let blended = (1.0 - t) * self.log_m() + t * other.log_m();
        Self::exp_m(&blended)
    }

    /// Log-Euclidean average of an arbitrary number of metrics (used to get
    /// a single representative metric for a tet's four corner nodes).
    pub fn average(metrics: &[Self]) -> Self {
        debug_assert!(!metrics.is_empty());
        let n = metrics.len() as f64;
        let sum = metrics
            .iter()
            .fold(Matrix3::zeros(), |acc, m| acc + m.log_m());
        Self::exp_m(&(sum / n))
    }

    /// Metric intersection via simultaneous diagonalization (Alauzet's
    /// construction): the tighter of the two metrics along every direction.
    pub fn intersect(&self, other: &Self) -> Self {
        let m1 = self.to_matrix3();
        let m2 = other.to_matrix3();
        let chol = match Cholesky::new(m1) {
            Some(c) => c,
            None => return *self, // self not SPD enough to factor; nothing sane to intersect with
        };
        let l = chol.l();
        let l_inv = match l.try_inverse() {
            Some(inv) => inv,
            None => return *self,
        };
        let n = l_inv * m2 * l_inv.transpose();
        let n = Self::from_matrix3(&n).to_matrix3(); // re-symmetrize for numerical safety
        let eig = SymmetricEigen::new(n);
        let d_prime = eig.eigenvalues.map(|d| d.max(1.0));
        let m = l * eig.eigenvectors * Matrix3::from_diagonal(&d_prime) * eig.eigenvectors.transpose() * l.transpose();
        Self::from_matrix3(&m)
    }
}

/// Metric-aware edge length: `sqrt(d^T M_avg d)` where `M_avg` is the
/// log-Euclidean average of the two endpoint metrics. Symmetric in its two
/// endpoints by construction (`interpolate` at `t=0.5` does not depend on
/// argument order, and the quadratic form is insensitive to the sign of
/// `d`).
pub fn edge_length(p0: &Point3, m0: &MetricTensor, p1: &Point3, m1: &MetricTensor) -> f64 {
    let m_avg = m0.interpolate(m1, 0.5);
    let d: Vector3 = p1 - p0;
    (d.dot(&(m_avg.to_matrix3() * d))).max(0.0).sqrt()
}

/// Mean-ratio shape quality of a tetrahedron under a single representative
/// metric, normalized so a metric-regular tet scores 1.0. Negative or zero
/// for a degenerate/inverted tet (non-positive transformed volume).
///
/// Computed by transforming the four corners into metric space via `M^{1/2}`
/// and applying the standard Euclidean mean-ratio formula there.
pub fn tet_quality_under(cell_metric: &MetricTensor, corners: [&Point3; 4]) -> f64 {
    let s = cell_metric.sqrt_matrix();
    let q: Vec<Point3> = corners.iter().map(|p| Point3::from(s * p.coords)).collect();

    let vol = crate::geometry::signed_tet_volume(&q[0], &q[1], &q[2], &q[3]);
    if vol <= 0.0 {
        return vol.min(0.0);
    }

    let edges = [
        (0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3),
    ];
    let sum_edge_sq: f64 = edges
        .iter()
        .map(|&(i, j)| (q[j] - q[i]).norm_squared())
        .sum();

    // Normalization constant so a regular tet (unit edge length) scores 1.0:
    // k = 6 * (6*sqrt(2))^(2/3).
    const K: f64 = 24.962_048_614_960_87;
    (K * vol.powf(2.0 / 3.0) / sum_edge_sq).min(1.0)
}

/// Mean-ratio quality of a tet given each corner's own metric tensor; the
/// cell metric is the log-Euclidean average of the four corner metrics.
pub fn tet_quality(corners: [&Point3; 4], metrics: [&MetricTensor; 4]) -> f64 {
    let owned: Vec<MetricTensor> = metrics.iter().map(|m| **m).collect();
    let cell_metric = MetricTensor::average(&owned);
    tet_quality_under(&cell_metric, corners)
}

/// Convert two principal curvatures/directions at a boundary point into a
/// 2-D (tangent-plane) metric requesting `segments_per_radian * |k|` edges
/// per unit angle along each principal direction, bounded by `h_max`, then
/// lift to 3-D via the surface normal using `h_min` in the normal direction.
///
/// `kr`, `ks` are the principal curvatures; `r_hat`, `s_hat` their
/// (orthonormal, tangent-plane) directions; `normal` the surface normal.
#[allow(clippy::too_many_arguments)]
pub fn curvature_to_metric(
    kr: f64,
    r_hat: Vector3,
    ks: f64,
    s_hat: Vector3,
    normal: Vector3,
    segments_per_radian: f64,
    h_min: f64,
    h_max: f64,
    curvature_ratio: f64,
) -> MetricTensor {
    let (kr, ks) = {
        let kr = kr.abs().max(curvature_ratio * ks.abs());
        let ks = ks.abs().max(curvature_ratio * kr);
        (kr, ks)
    };

    // Desired edge length along each principal direction: segments_per_radian
    // edges per radian of curvature means edge length = 1/(segments_per_radian*k),
    // clamped to [?, h_max] (h_min applies to the normal direction only).
    let h_r = if kr > f64::EPSILON {
        (1.0 / (segments_per_radian * kr)).min(h_max)
    } else {
        h_max
    };
    let h_s = if ks > f64::EPSILON {
        (1.0 / (segments_per_radian * ks)).min(h_max)
    } else {
        h_max
    };

    let r = r_hat.normalize();
    let s = s_hat.normalize();
    let n = normal.normalize();

    let diag = Matrix3::from_diagonal(&Vector3::new(1.0 / (h_r * h_r), 1.0 / (h_s * h_s), 1.0 / (h_min * h_min)));
    let basis = Matrix3::from_columns(&[r, s, n]);
    let m = basis * diag * basis.transpose();
    MetricTensor::from_matrix3(&m)
}
