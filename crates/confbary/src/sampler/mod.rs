//! Per-sample engine for closed random polygons.
//!
//! Purpose
//! - `Sampler<D>` owns every buffer one sample needs: edge lengths and
//!   quotient weights, the unshifted and shifted direction buffers, the
//!   vertex buffer, the shift vector, and the Newton scratch. Batch
//!   drivers construct one private sampler per worker, so nothing here is
//!   synchronized.
//!
//! Buffer shapes (n = edge count, D = ambient dimension)
//! - `x`, `y`: n unit vectors; `p`: n+1 vertices; `w`, scratch: D.
//! - Flat I/O uses row-major `&[f64]` slices of matching length.

mod batch;
mod settings;
mod solve;
mod weights;


pub use settings::{SamplerError, SamplerSettings};

use nalgebra::{SMatrix, SVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Conformal-barycenter sampler in ambient dimension `D`.
///
/// One instance produces one sample at a time; see the batch methods for
/// the parallel drivers. All allocation happens at construction. Cloning
/// copies every buffer including the generator state; the batch drivers
/// instead build fresh per-worker samplers with their own streams.
#[derive(Clone)]
pub struct Sampler<const D: usize> {
    settings: SamplerSettings,
    edge_count: usize,

    r: Vec<f64>,
    rho: Vec<f64>,
    total_r_inv: f64,

    x: Vec<SVector<f64, D>>,
    y: Vec<SVector<f64, D>>,
    p: Vec<SVector<f64, D>>,

    w: SVector<f64, D>,

    // Newton scratch and loop state.
    f: SVector<f64, D>,
    df: SMatrix<f64, D, D>,
    u: SVector<f64, D>,
    z: SVector<f64, D>,

    iter: usize,
    squared_residual: f64,
    residual: f64,
    lambda_min: f64,
    q: f64,
    error_estimator: f64,

    linesearch_enabled: bool,
    succeeded: bool,
    continue_iteration: bool,
    armijo_met: bool,

    edge_space_sampling_weight: f64,
    edge_quotient_space_sampling_correction: f64,

    master_seed: u64,
    sample_counter: u64,
    rng: StdRng,
}

impl<const D: usize> Sampler<D> {
    /// Sampler with uniform edge lengths rₖ = 1/n and quotient weights
    /// ρₖ = 1.
    pub fn new(edge_count: usize, settings: SamplerSettings) -> Result<Self, SamplerError> {
        Self::validate(edge_count)?;
        Ok(Self::build(edge_count, settings))
    }

    /// Sampler with explicit edge lengths and quotient weights.
    pub fn with_weights(
        r: &[f64],
        rho: &[f64],
        edge_count: usize,
        settings: SamplerSettings,
    ) -> Result<Self, SamplerError> {
        Self::validate(edge_count)?;
        let mut sampler = Self::build(edge_count, settings);
        sampler.read_edge_lengths(r)?;
        sampler.read_rho(rho)?;
        Ok(sampler)
    }

    fn validate(edge_count: usize) -> Result<(), SamplerError> {
        if D < 2 {
            return Err(SamplerError::invalid("ambient dimension must be at least 2"));
        }
        if edge_count == 0 {
            return Err(SamplerError::invalid("edge count must be positive"));
        }
        Ok(())
    }

    /// Infallible body shared by the public constructors and the batch
    /// drivers' per-worker samplers (which reuse already-validated inputs).
    fn build(edge_count: usize, settings: SamplerSettings) -> Self {
        let seed: u64 = rand::random();
        Self {
            settings,
            edge_count,
            r: vec![1.0 / edge_count as f64; edge_count],
            rho: vec![1.0; edge_count],
            total_r_inv: 1.0,
            x: vec![SVector::zeros(); edge_count],
            y: vec![SVector::zeros(); edge_count],
            p: vec![SVector::zeros(); edge_count + 1],
            w: SVector::zeros(),
            f: SVector::zeros(),
            df: SMatrix::zeros(),
            u: SVector::zeros(),
            z: SVector::zeros(),
            iter: 0,
            squared_residual: 1.0,
            residual: 1.0,
            lambda_min: f64::EPSILON,
            q: 1.0,
            error_estimator: f64::INFINITY,
            linesearch_enabled: settings.use_linesearch,
            succeeded: false,
            continue_iteration: true,
            armijo_met: false,
            edge_space_sampling_weight: 0.0,
            edge_quotient_space_sampling_correction: 0.0,
            master_seed: seed,
            sample_counter: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fix the master seed. Resets the sample counter, so batch streams
    /// replay from the beginning; identical seeds and settings reproduce
    /// output buffers bitwise on a single thread.
    pub fn seed(&mut self, seed: u64) {
        self.master_seed = seed;
        self.sample_counter = 0;
        self.rng = StdRng::seed_from_u64(seed);
    }

    // ---- setters ---------------------------------------------------------

    /// Read edge lengths and refresh the stored 1/L.
    pub fn read_edge_lengths(&mut self, r_in: &[f64]) -> Result<(), SamplerError> {
        SamplerError::check_len(self.edge_count, r_in.len())?;
        if r_in.iter().any(|&r| !(r > 0.0) || !r.is_finite()) {
            return Err(SamplerError::invalid("edge lengths must be finite and positive"));
        }
        self.r.copy_from_slice(r_in);
        let total: f64 = self.r.iter().sum();
        self.total_r_inv = 1.0 / total;
        Ok(())
    }

    /// Read the quotient weight density ρ.
    pub fn read_rho(&mut self, rho_in: &[f64]) -> Result<(), SamplerError> {
        SamplerError::check_len(self.edge_count, rho_in.len())?;
        if rho_in.iter().any(|&p| !(p > 0.0) || !p.is_finite()) {
            return Err(SamplerError::invalid("rho weights must be finite and positive"));
        }
        self.rho.copy_from_slice(rho_in);
        Ok(())
    }

    /// Read initial edge directions from a flat row-major buffer of
    /// n·D reals, optionally projecting each group of D onto the sphere.
    pub fn read_initial_edge_coordinates(
        &mut self,
        x_in: &[f64],
        normalize: bool,
    ) -> Result<(), SamplerError> {
        SamplerError::check_len(self.edge_count * D, x_in.len())?;
        for (xk, chunk) in self.x.iter_mut().zip(x_in.chunks_exact(D)) {
            *xk = SVector::from_column_slice(chunk);
        }
        if normalize {
            self.normalize_initial_edge_coordinates();
        }
        Ok(())
    }

    fn normalize_initial_edge_coordinates(&mut self) {
        for xk in &mut self.x {
            xk.normalize_mut();
        }
    }

    /// Read an externally supplied shift vector. A parameter outside the
    /// ball makes no sense as a starting point, so anything with
    /// ‖w‖² > 1 − 16ε falls back to the Euclidean barycenter.
    pub fn read_shift_vector(&mut self, w_in: &[f64]) -> Result<(), SamplerError> {
        SamplerError::check_len(D, w_in.len())?;
        self.w = SVector::from_column_slice(w_in);
        if self.w.norm_squared() > crate::mobius::SMALL_ONE {
            self.compute_shift_vector();
        }
        Ok(())
    }

    // ---- randomization ---------------------------------------------------

    /// Overwrite `x` with i.i.d. uniform points of S^{D−1}, drawn as
    /// normalized Gaussian D-tuples from the sampler's own generator.
    pub fn randomize_initial_edge_coordinates(&mut self) {
        for xk in &mut self.x {
            *xk = random_unit_vector(&mut self.rng);
        }
    }

    /// Euclidean weighted barycenter of the current directions:
    /// w = (1/L)·Σ rₖ xₖ. Always interior to the ball for unit directions.
    pub fn compute_shift_vector(&mut self) {
        let mut w = SVector::<f64, D>::zeros();
        for (xk, &rk) in self.x.iter().zip(&self.r) {
            w += xk * rk;
        }
        self.w = w * self.total_r_inv;
    }

    /// Vertex positions by cumulative sum of rₖ·yₖ, anchored so the mean
    /// of the edge midpoints sits at the origin. For a closed chain that
    /// equals centering the vertex barycenter.
    pub fn compute_space_coordinates(&mut self) {
        let mut barycenter = SVector::<f64, D>::zeros();
        let mut accumulator = SVector::<f64, D>::zeros();

        for (yk, &rk) in self.y.iter().zip(&self.r) {
            let offset = yk * rk;
            barycenter += accumulator + offset * 0.5;
            accumulator += offset;
        }

        self.p[0] = -barycenter / self.edge_count as f64;
        for k in 0..self.edge_count {
            self.p[k + 1] = self.p[k] + self.y[k] * self.r[k];
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn ambient_dimension(&self) -> usize {
        D
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn edge_lengths(&self) -> &[f64] {
        &self.r
    }

    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    /// Total edge length L.
    pub fn total_length(&self) -> f64 {
        1.0 / self.total_r_inv
    }

    pub fn initial_edge_coordinates(&self) -> &[SVector<f64, D>] {
        &self.x
    }

    pub fn edge_coordinates(&self) -> &[SVector<f64, D>] {
        &self.y
    }

    /// Vertex positions (n+1 points; valid after
    /// [`compute_space_coordinates`](Self::compute_space_coordinates)).
    pub fn space_coordinates(&self) -> &[SVector<f64, D>] {
        &self.p
    }

    pub fn vertex_position(&self, k: usize) -> SVector<f64, D> {
        self.p[k]
    }

    pub fn shift_vector(&self) -> &SVector<f64, D> {
        &self.w
    }

    pub fn iteration_count(&self) -> usize {
        self.iter
    }

    pub fn residual(&self) -> f64 {
        self.residual
    }

    pub fn error_estimator(&self) -> f64 {
        self.error_estimator
    }

    /// Whether the last `optimize` call converged inside tolerance.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Whether the loop still wanted more iterations when it stopped
    /// (distinguishes a `max_iter` exit from a converged or given-up one).
    pub fn should_continue(&self) -> bool {
        self.continue_iteration
    }

    pub fn edge_space_sampling_weight(&self) -> f64 {
        self.edge_space_sampling_weight
    }

    pub fn edge_quotient_space_sampling_correction(&self) -> f64 {
        self.edge_quotient_space_sampling_correction
    }

    /// Density for unbiased expectations on the rotational quotient.
    pub fn edge_quotient_space_sampling_weight(&self) -> f64 {
        self.edge_space_sampling_weight * self.edge_quotient_space_sampling_correction
    }

    // ---- flat-buffer I/O -------------------------------------------------

    pub fn write_initial_edge_coordinates(&self, x_out: &mut [f64]) -> Result<(), SamplerError> {
        write_vectors(&self.x, x_out)
    }

    pub fn write_edge_coordinates(&self, y_out: &mut [f64]) -> Result<(), SamplerError> {
        write_vectors(&self.y, y_out)
    }

    pub fn write_space_coordinates(&self, p_out: &mut [f64]) -> Result<(), SamplerError> {
        write_vectors(&self.p, p_out)
    }

    pub fn write_shift_vector(&self, w_out: &mut [f64]) -> Result<(), SamplerError> {
        SamplerError::check_len(D, w_out.len())?;
        w_out.copy_from_slice(self.w.as_slice());
        Ok(())
    }
}

fn write_vectors<const D: usize>(
    src: &[SVector<f64, D>],
    out: &mut [f64],
) -> Result<(), SamplerError> {
    SamplerError::check_len(src.len() * D, out.len())?;
    for (vk, chunk) in src.iter().zip(out.chunks_exact_mut(D)) {
        chunk.copy_from_slice(vk.as_slice());
    }
    Ok(())
}

/// Uniform point of S^{D−1} from normalized Gaussians; the retry guards the
/// measure-zero degenerate draw.
pub(crate) fn random_unit_vector<const D: usize>(rng: &mut StdRng) -> SVector<f64, D> {
    loop {
        let v = SVector::<f64, D>::from_fn(|_, _| rng.sample(StandardNormal));
        let norm = v.norm();
        if norm > 1e-12 {
            return v / norm;
        }
    }
}
