//! Regularized damped Newton iteration in hyperbolic space.
//!
//! Per sample: Shift → DifferentialAndHessian → SearchDirection →
//! loop { LineSearch, DifferentialAndHessian, SearchDirection } until the
//! continue flag drops or `max_iter` is reached. Termination is decided by
//! a Kantorovich test near convergence and a give-up comparison far from
//! it; a `max_iter` exit leaves the continue flag set so callers can tell
//! the cases apart.
//!
//! Merit functions
//! - The default line search descends the log-potential, which is strictly
//!   convex on the ball and monotone even for large steps.
//! - The squared-residual variant has the same critical points but behaves
//!   non-monotonically near saddle neighbourhoods; it is kept for
//!   diagnostics only.

use nalgebra::{SMatrix, SVector};

use super::Sampler;
use crate::linalg;
use crate::mobius::{self, BIG_ONE, G_FACTOR};

impl<const D: usize> Sampler<D> {
    /// Run the Newton iteration from the current `x` and `w`.
    ///
    /// Never fails: convergence failures are reported through
    /// [`succeeded`](Self::succeeded), [`residual`](Self::residual) and
    /// [`error_estimator`](Self::error_estimator).
    pub fn optimize(&mut self) {
        let max_iter = self.settings.max_iter;

        self.iter = 0;
        self.succeeded = false;
        self.continue_iteration = true;
        self.armijo_met = false;
        self.linesearch_enabled =
            self.settings.use_linesearch && self.settings.armijo_slope_factor > 0.0;
        self.lambda_min = f64::EPSILON;
        self.q = 1.0;
        self.error_estimator = f64::INFINITY;

        self.shift();
        self.differential_and_hessian();
        self.search_direction();

        while self.iter < max_iter && self.continue_iteration {
            self.iter += 1;

            self.line_search_potential();
            self.differential_and_hessian();
            self.search_direction();
        }
    }

    /// Transport the input directions by the current shift: y = Φ_w(x).
    pub(crate) fn shift(&mut self) {
        mobius::shift_sphere_points(&self.x, &self.w, &mut self.y);
    }

    /// Residual and Hessian of the barycenter map at the origin:
    ///
    /// F  = −(1/L)·Σ rₖ yₖ   (stored halved after the norm is taken),
    /// DF = I − (1/L)·Σ rₖ yₖ yₖᵀ.
    ///
    /// The identity is added after the scaled sum, which costs nothing and
    /// keeps the diagonal from absorbing the accumulation error.
    pub(crate) fn differential_and_hessian(&mut self) {
        let mut f = SVector::<f64, D>::zeros();
        let mut df = SMatrix::<f64, D, D>::zeros();

        for (yk, &rk) in self.y.iter().zip(&self.r) {
            f -= yk * rk;
            df -= (yk * yk.transpose()) * rk;
        }

        f *= self.total_r_inv;
        self.squared_residual = f.norm_squared();
        self.residual = self.squared_residual.sqrt();
        self.f = f * 0.5;

        df *= self.total_r_inv;
        self.df = df + SMatrix::identity();
    }

    /// Decide whether to keep iterating and compute the Newton direction
    /// u = −A⁻¹F for the regularized system A = DF + (c·‖F‖²)·I.
    pub(crate) fn search_direction(&mut self) {
        let tolerance = self.settings.tolerance;
        let give_up = self.settings.give_up_tolerance;
        let linesearch_wanted =
            self.settings.use_linesearch && self.settings.armijo_slope_factor > 0.0;

        if self.residual < 100.0 * tolerance {
            // The eigenvalue must be taken before regularization.
            self.lambda_min = linalg::smallest_eigenvalue(&self.df);
            self.q = 4.0 * self.residual / (self.lambda_min * self.lambda_min);

            if self.q < 1.0 {
                // Kantorovich: quadratic convergence from here, with a
                // computable error estimate. Line search would only add
                // rounding noise at these step sizes.
                self.error_estimator = 0.5 * self.lambda_min * self.q;
                self.linesearch_enabled = false;
                self.continue_iteration = self.error_estimator > tolerance;
                self.succeeded = !self.continue_iteration;
            } else {
                self.error_estimator = f64::INFINITY;
                self.linesearch_enabled = linesearch_wanted;
                // Residuals this small that still fail Kantorovich are
                // probably not solvable in machine precision.
                self.continue_iteration = self.residual > give_up;
            }
        } else {
            self.q = BIG_ONE;
            self.lambda_min = f64::EPSILON;
            self.error_estimator = f64::INFINITY;
            self.linesearch_enabled = linesearch_wanted;
            self.continue_iteration = self.residual > give_up.max(tolerance);
        }

        let c = self.settings.regularization * self.squared_residual;
        let a = self.df + SMatrix::identity() * c;

        match nalgebra::linalg::Cholesky::new(a) {
            Some(chol) => {
                self.u = chol.solve(&(-self.f));
            }
            None => {
                // The regularized Hessian is SPD by construction; a failed
                // factorization means the residual has gone non-finite.
                // Stop and let downstream filters discard the sample.
                self.u = SVector::zeros();
                self.continue_iteration = false;
            }
        }
    }

    /// Log-potential of the candidate step `z` against the current
    /// directions: φ(z) = (1/L)·Σ rₖ·log|((1+‖z‖²) − 2 yₖ·z)/(1−‖z‖²)|.
    pub(crate) fn potential(&self) -> f64 {
        let zz = self.z.norm_squared();
        let a = BIG_ONE + zz;
        let b = 1.0 / (BIG_ONE - zz);

        let mut value = 0.0;
        for (yk, &rk) in self.y.iter().zip(&self.r) {
            let yz = yk.dot(&self.z);
            value += rk * ((a - 2.0 * yz) * b).abs().ln();
        }
        value * self.total_r_inv
    }

    /// Armijo backtracking on the log-potential (default merit).
    ///
    /// The trial step is the exponential map of τ·u at the origin,
    /// z = τ·tanhc(τ‖u‖)·u; the reference slope is Dφ(0) = 4·F·u and the
    /// quadratic-fit candidate competes with plain shrinking. The accepted
    /// step is folded into the shift parameter and the directions are
    /// re-shifted.
    pub(crate) fn line_search_potential(&mut self) {
        let mut tau = 1.0_f64;
        let u_norm = self.u.norm();

        self.z = self.u * (tau * mobius::tanhc(tau * u_norm));

        if self.linesearch_enabled {
            let gamma = self.settings.armijo_shrink_factor;
            let sigma = self.settings.armijo_slope_factor;

            let dphi_0 = G_FACTOR * self.f.dot(&self.u);

            let mut backtrackings = 0;
            let mut phi_tau = self.potential();

            // φ(0) = 0, so the Armijo reference is just the slope term.
            self.armijo_met = phi_tau - sigma * tau * dphi_0 < 0.0;

            while !self.armijo_met && backtrackings < self.settings.max_backtrackings {
                backtrackings += 1;

                let tau_1 = gamma * tau;
                let tau_2 = -0.5 * sigma * tau * tau * dphi_0 / (phi_tau - tau * dphi_0);
                tau = tau_1.max(tau_2);

                self.z = self.u * (tau * mobius::tanhc(tau * u_norm));
                phi_tau = self.potential();
                self.armijo_met = phi_tau - sigma * tau * dphi_0 < 0.0;
            }
        }

        self.w = mobius::mobius_shift(&self.w, &self.z);
        self.shift();
    }

    /// Armijo backtracking on the squared residual (diagnostic merit).
    ///
    /// Same structure as the potential search with merit ‖F‖² and slope
    /// 2·Fᵀ·DF·u; each trial restarts from the pre-step shift, and the
    /// merit evaluation requires a full re-shift plus Hessian assembly per
    /// trial, which is why the potential variant is the default.
    #[allow(dead_code)]
    pub(crate) fn line_search_residual(&mut self) {
        let mut tau = 1.0_f64;
        let u_norm = self.u.norm();
        let w_0 = self.w;

        let slope = 2.0 * self.f.dot(&(self.df * self.u));

        self.z = self.u * (tau * mobius::tanhc(tau * u_norm));
        self.w = mobius::mobius_shift(&w_0, &self.z);
        self.shift();

        let squared_residual_at_0 = self.squared_residual;
        self.differential_and_hessian();

        if self.linesearch_enabled {
            let gamma = self.settings.armijo_shrink_factor;
            let sigma = self.settings.armijo_slope_factor;

            let mut backtrackings = 0;
            self.armijo_met =
                self.squared_residual - squared_residual_at_0 - sigma * tau * slope < 0.0;

            while !self.armijo_met && backtrackings < self.settings.max_backtrackings {
                backtrackings += 1;

                let tau_1 = gamma * tau;
                let tau_2 = -0.5 * sigma * tau * tau * slope
                    / (self.squared_residual - squared_residual_at_0 - tau * slope);
                tau = tau_1.max(tau_2);

                self.z = self.u * (tau * mobius::tanhc(tau * u_norm));
                self.w = mobius::mobius_shift(&w_0, &self.z);
                self.shift();
                self.differential_and_hessian();

                self.armijo_met =
                    self.squared_residual - squared_residual_at_0 - sigma * tau * slope < 0.0;
            }
        }
    }
}
