//! Per-sample sampling weights.
//!
//! After convergence the sample (w, y) carries two Jacobian determinants:
//! the edge-space weight turns uniform sphere-product draws into unbiased
//! samples of the edge-length-constrained polygon space, and the quotient
//! correction additionally accounts for the rotation group. Both are
//! assembled from the *shifted* directions.

use nalgebra::SMatrix;
use nalgebra::linalg::Cholesky;

use super::Sampler;
use crate::linalg;

impl<const D: usize> Sampler<D> {
    /// Edge-space weight
    ///
    /// K = prod^{D−1} · √det Γ / det C̄ with
    /// Γ = Σ (rₖ/ρₖ)²·(I − yₖyₖᵀ), C̄ = Σ rₖ·(I − yₖyₖᵀ),
    /// prod = Πₖ (1 + ‖w‖² + 2 w·yₖ).
    ///
    /// K is finite iff C̄ is positive definite, which holds whenever the
    /// shifted directions span R^D; a degenerate C̄ yields +∞ so the sample
    /// can be filtered rather than silently kept.
    pub fn compute_edge_space_sampling_weight(&mut self) {
        let identity = SMatrix::<f64, D, D>::identity();
        let mut gamma = SMatrix::<f64, D, D>::zeros();
        let mut cbar = SMatrix::<f64, D, D>::zeros();

        let ww = self.w.norm_squared();
        let mut prod = 1.0_f64;

        for (k, yk) in self.y.iter().enumerate() {
            let rk = self.r[k];
            let s = rk / self.rho[k];
            let proj = identity - yk * yk.transpose();

            gamma += proj * (s * s);
            cbar += proj * rk;
            prod *= 1.0 + ww + 2.0 * self.w.dot(yk);
        }

        let det_gamma = Cholesky::new(gamma).map_or(0.0, |c| c.determinant());

        self.edge_space_sampling_weight = match Cholesky::new(cbar) {
            Some(chol) => prod.powi(D as i32 - 1) * det_gamma.sqrt() / chol.determinant(),
            None => f64::INFINITY,
        };
    }

    /// Quotient-space correction
    ///
    /// K_quot = 1 / √∏_{i<j}(λᵢ+λⱼ) for the spectrum of
    /// Σ = Σₖ ρₖ²·yₖyₖᵀ. Closed forms: D=2 gives 1; D=3 uses
    /// (λ₀+λ₁)(λ₀+λ₂)(λ₁+λ₂) = (tr(Σ)² − tr(Σ²))·tr(Σ)/2 − det(Σ),
    /// taken in absolute value to absorb round-off.
    pub fn compute_edge_quotient_space_sampling_correction(&mut self) {
        if D == 2 {
            self.edge_quotient_space_sampling_correction = 1.0;
            return;
        }

        let mut sigma = SMatrix::<f64, D, D>::zeros();
        for (yk, &rho_k) in self.y.iter().zip(&self.rho) {
            sigma += (yk * yk.transpose()) * (rho_k * rho_k);
        }

        if D == 3 {
            let tr = sigma[(0, 0)] + sigma[(1, 1)] + sigma[(2, 2)];
            // Frobenius norm equals tr(Σ²) for symmetric Σ.
            let tr2 = sigma.norm_squared();
            let det = linalg::sym_det3(&sigma);
            let pair_product = ((tr * tr - tr2) * tr * 0.5 - det).abs();
            self.edge_quotient_space_sampling_correction = 1.0 / pair_product.sqrt();
            return;
        }

        let lambda = linalg::sym_eigenvalues(&sigma);
        let mut pair_product = 1.0_f64;
        for i in 0..D {
            for j in (i + 1)..D {
                pair_product *= lambda[i] + lambda[j];
            }
        }
        self.edge_quotient_space_sampling_correction = 1.0 / pair_product.abs().sqrt();
    }
}
