//! Embarrassingly parallel batch drivers.
//!
//! Scheduling
//! - Samples are partitioned into contiguous ranges, one per worker
//!   thread. Every worker owns a private sampler built from the read-only
//!   (r, ρ, settings) triple, plus its own RNG streams and local
//!   histogram/moment tensors; summation after join is the only
//!   synchronization point.
//!
//! Reproducibility
//! - The RNG stream of global sample `k` is derived from
//!   `(master_seed, k)` with a SplitMix64-style mix, so results are
//!   independent of the partition and a fixed seed replays bitwise on a
//!   single thread. The sample counter advances across calls, which makes
//!   accumulation linear: two runs of S samples into the same buffers
//!   equal one run of 2S.

use std::ops::Range;
use std::thread;

use nalgebra::SVector;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{random_unit_vector, Sampler, SamplerError};
use crate::observables::RandomVariable;

/// Balanced contiguous partition of `0..sample_count` into at most
/// `thread_count` non-empty ranges.
pub fn job_ranges(sample_count: usize, thread_count: usize) -> Vec<Range<usize>> {
    let t = thread_count.max(1).min(sample_count.max(1));
    (0..t)
        .map(|i| (sample_count * i / t)..(sample_count * (i + 1) / t))
        .collect()
}

/// Generator for one sample stream, keyed by `(seed, index)`.
fn stream_rng(seed: u64, index: u64) -> StdRng {
    // SplitMix64-style mixing, cheap and stable.
    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }
    let k = mix(seed ^ mix(index.wrapping_add(0x9e3779b97f4a7c15)));
    StdRng::seed_from_u64(k)
}

/// Cut `buf` into per-range chunks of `stride` reals per sample.
fn split_by_ranges<'a>(
    buf: &'a mut [f64],
    ranges: &[Range<usize>],
    stride: usize,
) -> Vec<&'a mut [f64]> {
    let mut parts = Vec::with_capacity(ranges.len());
    let mut rest = buf;
    for range in ranges {
        let (head, tail) = rest.split_at_mut(range.len() * stride);
        parts.push(head);
        rest = tail;
    }
    parts
}

fn copy_out<const D: usize>(src: &[SVector<f64, D>], out: &mut [f64]) {
    debug_assert_eq!(src.len() * D, out.len());
    for (vk, chunk) in src.iter().zip(out.chunks_exact_mut(D)) {
        chunk.copy_from_slice(vk.as_slice());
    }
}

/// Shared binning geometry for `sample_binned` workers.
struct BinGrid<'a> {
    fun_count: usize,
    bin_count: usize,
    moment_count: usize,
    /// Bins per unit value, one entry per observable.
    factor: &'a [f64],
    /// Flat (lo, hi) pairs, one per observable.
    ranges: &'a [f64],
}

impl<const D: usize> Sampler<D> {
    /// Private sampler for one worker, sharing this sampler's read-only
    /// configuration.
    fn worker_clone(&self) -> Sampler<D> {
        let mut worker = Self::build(self.edge_count, self.settings);
        worker.r.copy_from_slice(&self.r);
        worker.rho.copy_from_slice(&self.rho);
        worker.total_r_inv = self.total_r_inv;
        worker
    }

    /// Hot-loop variant of `read_initial_edge_coordinates`: lengths are
    /// validated once per batch, not once per sample.
    fn load_initial_edge_coordinates(&mut self, chunk: &[f64], normalize: bool) {
        debug_assert_eq!(chunk.len(), self.edge_count * D);
        for (xk, c) in self.x.iter_mut().zip(chunk.chunks_exact(D)) {
            *xk = SVector::from_column_slice(c);
        }
        if normalize {
            for xk in &mut self.x {
                xk.normalize_mut();
            }
        }
    }

    /// Solve the conformal-barycenter problem for `sample_count` supplied
    /// direction tuples, writing the shift vectors and shifted directions.
    pub fn optimize_batch(
        &self,
        x_in: &[f64],
        w_out: &mut [f64],
        y_out: &mut [f64],
        sample_count: usize,
        thread_count: usize,
        normalize: bool,
    ) -> Result<(), SamplerError> {
        let n = self.edge_count;
        SamplerError::check_len(sample_count * n * D, x_in.len())?;
        SamplerError::check_len(sample_count * D, w_out.len())?;
        SamplerError::check_len(sample_count * n * D, y_out.len())?;

        let ranges = job_ranges(sample_count, thread_count);
        let w_parts = split_by_ranges(w_out, &ranges, D);
        let y_parts = split_by_ranges(y_out, &ranges, n * D);

        let this = &*self;
        thread::scope(|scope| {
            for ((range, w_part), y_part) in ranges.iter().cloned().zip(w_parts).zip(y_parts) {
                scope.spawn(move || {
                    let mut sampler = this.worker_clone();
                    for (local, k) in range.enumerate() {
                        let x_k = &x_in[k * n * D..(k + 1) * n * D];
                        sampler.load_initial_edge_coordinates(x_k, normalize);
                        sampler.compute_shift_vector();
                        sampler.optimize();
                        w_part[local * D..(local + 1) * D].copy_from_slice(sampler.w.as_slice());
                        copy_out(&sampler.y, &mut y_part[local * n * D..(local + 1) * n * D]);
                    }
                });
            }
        });
        Ok(())
    }

    /// Draw `sample_count` closed polygons with their sampling weights.
    ///
    /// `k_edge_out[k]` receives the edge-space weight, `k_quot_out[k]` the
    /// full edge-quotient weight K_edge·K_quot.
    pub fn random_closed_polygons(
        &mut self,
        x_out: &mut [f64],
        w_out: &mut [f64],
        y_out: &mut [f64],
        k_edge_out: &mut [f64],
        k_quot_out: &mut [f64],
        sample_count: usize,
        thread_count: usize,
    ) -> Result<(), SamplerError> {
        let n = self.edge_count;
        SamplerError::check_len(sample_count * n * D, x_out.len())?;
        SamplerError::check_len(sample_count * D, w_out.len())?;
        SamplerError::check_len(sample_count * n * D, y_out.len())?;
        SamplerError::check_len(sample_count, k_edge_out.len())?;
        SamplerError::check_len(sample_count, k_quot_out.len())?;

        let ranges = job_ranges(sample_count, thread_count);
        let seed = self.master_seed;
        let base = self.sample_counter;

        struct Slot<'a> {
            range: Range<usize>,
            x: &'a mut [f64],
            w: &'a mut [f64],
            y: &'a mut [f64],
            k_edge: &'a mut [f64],
            k_quot: &'a mut [f64],
        }

        let mut slots: Vec<Slot<'_>> = Vec::with_capacity(ranges.len());
        {
            let x_parts = split_by_ranges(x_out, &ranges, n * D);
            let w_parts = split_by_ranges(w_out, &ranges, D);
            let y_parts = split_by_ranges(y_out, &ranges, n * D);
            let ke_parts = split_by_ranges(k_edge_out, &ranges, 1);
            let kq_parts = split_by_ranges(k_quot_out, &ranges, 1);
            for (((((range, x), w), y), k_edge), k_quot) in ranges
                .iter()
                .cloned()
                .zip(x_parts)
                .zip(w_parts)
                .zip(y_parts)
                .zip(ke_parts)
                .zip(kq_parts)
            {
                slots.push(Slot {
                    range,
                    x,
                    w,
                    y,
                    k_edge,
                    k_quot,
                });
            }
        }

        let this = &*self;
        thread::scope(|scope| {
            for slot in slots {
                scope.spawn(move || {
                    let mut sampler = this.worker_clone();
                    for (local, k) in slot.range.clone().enumerate() {
                        sampler.rng = stream_rng(seed, base + k as u64);
                        sampler.randomize_initial_edge_coordinates();
                        copy_out(&sampler.x, &mut slot.x[local * n * D..(local + 1) * n * D]);

                        sampler.compute_shift_vector();
                        sampler.optimize();

                        slot.w[local * D..(local + 1) * D].copy_from_slice(sampler.w.as_slice());
                        copy_out(&sampler.y, &mut slot.y[local * n * D..(local + 1) * n * D]);

                        sampler.compute_edge_space_sampling_weight();
                        sampler.compute_edge_quotient_space_sampling_correction();
                        slot.k_edge[local] = sampler.edge_space_sampling_weight();
                        slot.k_quot[local] = sampler.edge_quotient_space_sampling_weight();
                    }
                });
            }
        });

        self.sample_counter += sample_count as u64;
        Ok(())
    }

    /// Sample, evaluate the observables, and accumulate histograms and
    /// moments *into* the caller's buffers.
    ///
    /// Shapes: `bins` is 3 × F × B, `moments` is 3 × F × M (row-major),
    /// `ranges` holds (lo, hi) per observable. The three leading rows are
    /// the weighting modes {unweighted, K_edge, K_edge·K_quot}. M is
    /// raised to at least 3 and B to at least 1 before validation.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_binned(
        &mut self,
        bins_out: &mut [f64],
        bin_count: usize,
        moments_out: &mut [f64],
        moment_count: usize,
        ranges_in: &[f64],
        observables: &[Box<dyn RandomVariable<D>>],
        sample_count: usize,
        thread_count: usize,
    ) -> Result<(), SamplerError> {
        let fun_count = observables.len();
        let bin_count = bin_count.max(1);
        let moment_count = moment_count.max(3);

        SamplerError::check_len(2 * fun_count, ranges_in.len())?;
        SamplerError::check_len(3 * fun_count * bin_count, bins_out.len())?;
        SamplerError::check_len(3 * fun_count * moment_count, moments_out.len())?;

        let factor: Vec<f64> = (0..fun_count)
            .map(|j| bin_count as f64 / (ranges_in[2 * j + 1] - ranges_in[2 * j]))
            .collect();

        let ranges = job_ranges(sample_count, thread_count);
        let seed = self.master_seed;
        let base = self.sample_counter;

        let this = &*self;
        let grid = BinGrid {
            fun_count,
            bin_count,
            moment_count,
            factor: &factor,
            ranges: ranges_in,
        };

        if let [range] = &ranges[..] {
            // One worker: accumulate straight into the caller's buffers, so
            // a follow-up call continues the identical addition sequence
            // (accumulation stays bitwise linear in the sample count).
            this.bin_range(range.clone(), seed, base, observables, &grid, bins_out, moments_out);
        } else {
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(ranges.len());
                for range in ranges.iter().cloned() {
                    let grid = &grid;
                    handles.push(scope.spawn(move || {
                        let mut bins = vec![0.0_f64; 3 * fun_count * bin_count];
                        let mut moments = vec![0.0_f64; 3 * fun_count * moment_count];
                        this.bin_range(range, seed, base, observables, grid, &mut bins, &mut moments);
                        (bins, moments)
                    }));
                }

                // Reduce in worker order; this is the only synchronization.
                for handle in handles {
                    match handle.join() {
                        Ok((bins, moments)) => {
                            for (dst, src) in bins_out.iter_mut().zip(bins) {
                                *dst += src;
                            }
                            for (dst, src) in moments_out.iter_mut().zip(moments) {
                                *dst += src;
                            }
                        }
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
            });
        }

        self.sample_counter += sample_count as u64;
        Ok(())
    }

    /// Per-worker body of `sample_binned`: draw and solve every sample of
    /// `range`, evaluate the observables, and accumulate into the given
    /// tensors.
    fn bin_range(
        &self,
        range: Range<usize>,
        seed: u64,
        base: u64,
        observables: &[Box<dyn RandomVariable<D>>],
        grid: &BinGrid<'_>,
        bins: &mut [f64],
        moments: &mut [f64],
    ) {
        let mut sampler = self.worker_clone();
        let local_obs: Vec<Box<dyn RandomVariable<D>>> =
            observables.iter().map(|o| o.boxed_clone()).collect();

        let fun_count = grid.fun_count;
        let bin_count = grid.bin_count;
        let moment_count = grid.moment_count;

        for k in range {
            sampler.rng = stream_rng(seed, base + k as u64);
            sampler.randomize_initial_edge_coordinates();
            sampler.compute_shift_vector();
            sampler.optimize();
            sampler.compute_space_coordinates();
            sampler.compute_edge_space_sampling_weight();
            sampler.compute_edge_quotient_space_sampling_correction();

            let k_edge = sampler.edge_space_sampling_weight();
            let k_quot = sampler.edge_quotient_space_sampling_weight();

            for (j, obs) in local_obs.iter().enumerate() {
                let val = obs.evaluate(&sampler);

                let b = (grid.factor[j] * (val - grid.ranges[2 * j])).floor();
                if b >= 0.0 && b < bin_count as f64 {
                    let b = b as usize;
                    bins[j * bin_count + b] += 1.0;
                    bins[(fun_count + j) * bin_count + b] += k_edge;
                    bins[(2 * fun_count + j) * bin_count + b] += k_quot;
                }

                let mut values = [1.0, k_edge, k_quot];
                for (i, &v) in values.iter().enumerate() {
                    moments[(i * fun_count + j) * moment_count] += v;
                }
                for m in 1..moment_count {
                    for (i, v) in values.iter_mut().enumerate() {
                        *v *= val;
                        moments[(i * fun_count + j) * moment_count + m] += *v;
                    }
                }
            }
        }
    }

    /// Divide every (weighting, observable) row by its zeroth moment, which
    /// holds the total mass under that weighting.
    pub fn normalize_binned_samples(
        &self,
        bins: &mut [f64],
        bin_count: usize,
        moments: &mut [f64],
        moment_count: usize,
        fun_count: usize,
    ) -> Result<(), SamplerError> {
        let bin_count = bin_count.max(1);
        let moment_count = moment_count.max(3);
        SamplerError::check_len(3 * fun_count * bin_count, bins.len())?;
        SamplerError::check_len(3 * fun_count * moment_count, moments.len())?;

        for row in 0..3 * fun_count {
            let mass = moments[row * moment_count];
            let factor = 1.0 / mass;
            for b in &mut bins[row * bin_count..(row + 1) * bin_count] {
                *b *= factor;
            }
            for m in &mut moments[row * moment_count..(row + 1) * moment_count] {
                *m *= factor;
            }
        }
        Ok(())
    }

    /// Fill `x_out` with `sample_count` tuples of n uniform sphere points,
    /// using the same per-sample streams as the polygon drivers.
    pub fn random_spherical_points(
        &mut self,
        x_out: &mut [f64],
        sample_count: usize,
        thread_count: usize,
    ) -> Result<(), SamplerError> {
        let n = self.edge_count;
        SamplerError::check_len(sample_count * n * D, x_out.len())?;

        let ranges = job_ranges(sample_count, thread_count);
        let seed = self.master_seed;
        let base = self.sample_counter;

        let parts = split_by_ranges(x_out, &ranges, n * D);
        thread::scope(|scope| {
            for (range, part) in ranges.iter().cloned().zip(parts) {
                scope.spawn(move || {
                    for (local, k) in range.enumerate() {
                        let mut rng = stream_rng(seed, base + k as u64);
                        let chunk = &mut part[local * n * D..(local + 1) * n * D];
                        for point in chunk.chunks_exact_mut(D) {
                            let v: SVector<f64, D> = random_unit_vector(&mut rng);
                            point.copy_from_slice(v.as_slice());
                        }
                    }
                });
            }
        });

        self.sample_counter += sample_count as u64;
        Ok(())
    }
}
