//! CAD association storage and the facade through which the kernel queries
//! geometry. See [`cad::CadQuery`] for the trait seam and [`store::GeomStore`]
//! for the per-node association table and `cell_tuv` disambiguation policy.

pub mod cad;
pub mod store;
pub mod types;

pub use cad::{AnalyticCad, AnalyticSurface, CadQuery, NullCad};
pub use store::GeomStore;
pub use types::{Curvature, EntityKind, GeomAssoc};
