//! Tunable constants for the adaptation pass, curvature metric, and operator
//! acceptance checks.
//!
//! The original tool hard-codes most of these (a `1e99` "insertable cost"
//! sentinel that is effectively "always accept", a `1/20` curvature ratio
//! clamp, `gap_protection`/`tolerance_protection` scale factors). Here they
//! are fields with documented defaults rather than magic numbers, following
//! the builder pattern the reference product uses for `ExtrudeParams` and
//! `RevolveParams`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptConfig {
    /// Upper bound on fixed-point passes. Default 15, matching the `-s`
    /// driver flag's default in the reference tool.
    pub max_passes: usize,
    /// Edge length band, in metric space, considered acceptable. An edge
    /// shorter than `1/length_band` is a collapse candidate; one longer than
    /// `length_band` is a split candidate. Default `sqrt(2)`.
    pub length_band: f64,
    /// Minimum tet mean-ratio quality accepted from a proposed cavity
    /// replacement — rejects only obviously inverted/degenerate results, not
    /// a per-step quality floor. Default `1e-3`.
    pub quality_floor: f64,
    /// Maximum angular deviation (radians) a boundary triangle's normal may
    /// have from the CAD surface normal at its centroid and still be
    /// accepted by `Cavity::valid`.
    pub cad_normal_tolerance: f64,
    /// Curvature segment density: edges requested per radian of curvature.
    /// Default 2.0 (`ref_geom`'s default).
    pub segments_per_radian: f64,
    /// Minimum edge length induced by the curvature metric, taken in the
    /// surface normal direction.
    pub h_min: f64,
    /// Maximum edge length the curvature metric will ever request, for flat
    /// or near-flat regions.
    pub h_max: f64,
    /// Clamp on the ratio between the two principal curvatures used when
    /// building the curvature metric, preventing a near-zero curvature
    /// direction from producing an unbounded metric aspect ratio. The
    /// original hard-codes this at `1/20`.
    pub curvature_ratio: f64,
    /// Scale factor applied to a CAD entity's evaluation tolerance before
    /// treating a parameter-space "stuck" surface as acceptable slop, rather
    /// than an invariant violation. Mirrors `tolerance_protection`.
    pub tolerance_protection: f64,
    /// Scale factor applied to a detected surface gap before treating it as
    /// acceptable slop. Mirrors `gap_protection`.
    pub gap_protection: f64,
    /// Explicit override for the "minimum insertable cost" used by `Smooth`
    /// to decide whether a worse-but-close-enough position is still an
    /// improvement. `None` means no floor: acceptance is governed solely by
    /// the monotone-decrease check. The original effectively disables this
    /// check via a `1e99` sentinel; we make that default explicit instead of
    /// encoding it as a magic number.
    pub min_insertable_cost: Option<f64>,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            max_passes: 15,
            length_band: std::f64::consts::SQRT_2,
            quality_floor: 1e-3,
            cad_normal_tolerance: 10f64.to_radians(),
            segments_per_radian: 2.0,
            h_min: 1e-3,
            h_max: 1e9,
            curvature_ratio: 1.0 / 20.0,
            tolerance_protection: 100.0,
            gap_protection: 10.0,
            min_insertable_cost: None,
        }
    }
}

impl AdaptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_segments_per_radian(mut self, segments_per_radian: f64) -> Self {
        self.segments_per_radian = segments_per_radian;
        self
    }

    pub fn with_h_range(mut self, h_min: f64, h_max: f64) -> Self {
        self.h_min = h_min;
        self.h_max = h_max;
        self
    }

    pub fn with_min_insertable_cost(mut self, cost: f64) -> Self {
        self.min_insertable_cost = Some(cost);
        self
    }

    /// Upper bound of the acceptable metric-edge-length band (collapse below
    /// `1/length_band`, split above `length_band`).
    pub fn split_threshold(&self) -> f64 {
        self.length_band
    }

    pub fn collapse_threshold(&self) -> f64 {
        1.0 / self.length_band
    }
}
