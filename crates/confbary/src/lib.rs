//! Monte Carlo sampling of closed random polygons via conformal barycenters.
//!
//! Purpose
//! - Draw large samples of closed equilateral (or weighted) polygons in a
//!   fixed ambient dimension `D`, together with the exact sampling weights
//!   that make expectations unbiased on the edge-length-constrained space
//!   and on its rotational quotient.
//!
//! How it works (per sample)
//! - Draw i.i.d. unit edge directions on S^{D-1}, take their Euclidean
//!   weighted mean as the initial shift `w`, then run a regularized damped
//!   Newton iteration in the Poincaré ball until the Möbius-shifted
//!   directions have barycenter zero. The shifted directions are the edge
//!   vectors of a closed polygon; two Jacobian determinants give the
//!   reweighting densities.
//!
//! Why this design
//! - The ambient dimension is a `const` parameter so all per-sample state
//!   is stack-sized `nalgebra` vectors/matrices and the d∈{2,3} fast paths
//!   in the eigenvalue routines resolve at compile time.
//! - Batch drivers hand each worker thread a private sampler and reduce
//!   only histograms/moments at the end; there is no shared mutable state
//!   in the hot loop.

pub mod linalg;
pub mod mobius;
pub mod observables;
pub mod sampler;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::mobius::{mobius_shift, shift_sphere_points, tanhc};
    pub use crate::observables::{
        BendingEnergy, EdgeSpaceSamplingWeightRV, HydrodynamicRadius, RandomVariable,
        SquaredGyradius,
    };
    pub use crate::sampler::{Sampler, SamplerError, SamplerSettings};
    pub use nalgebra::{SMatrix, SVector};
}
