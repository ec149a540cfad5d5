//! Scalar random variables evaluated on a sampler view.
//!
//! An observable maps a converged sample to a real, declares the value
//! range callers should bin over, and clones itself so every batch worker
//! owns a private instance. One level of polymorphism, nothing deeper:
//! concrete observables implement [`RandomVariable`] directly.

use nalgebra::SVector;

use crate::linalg;
use crate::sampler::Sampler;

/// Contract for scalar observables over a sampler view.
///
/// Implementations are stateless or carry immutable parameters only; they
/// may read edge lengths, ρ, coordinates, the shift vector and the
/// sampling weights, but never mutate sampler state.
pub trait RandomVariable<const D: usize>: Send + Sync {
    /// Evaluate on the current sample. Vertex positions are valid only if
    /// the driver ran `compute_space_coordinates` (the batch drivers do).
    fn evaluate(&self, sampler: &Sampler<D>) -> f64;

    /// Lower end of the meaningful value range.
    fn min_value(&self, sampler: &Sampler<D>) -> f64;

    /// Upper end of the meaningful value range.
    fn max_value(&self, sampler: &Sampler<D>) -> f64;

    /// Short identifying label for reports and histograms.
    fn tag(&self) -> String;

    /// Clone into a new boxed instance for a worker thread.
    fn boxed_clone(&self) -> Box<dyn RandomVariable<D>>;
}

/// Squared radius of gyration: (1/n)·Σ‖pₖ − p̄‖² over the n distinct
/// vertices of the closed chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct SquaredGyradius;

impl<const D: usize> RandomVariable<D> for SquaredGyradius {
    fn evaluate(&self, sampler: &Sampler<D>) -> f64 {
        let n = sampler.edge_count();
        let p = &sampler.space_coordinates()[..n];

        let mut mean = SVector::<f64, D>::zeros();
        for pk in p {
            mean += pk;
        }
        mean /= n as f64;

        let mut sum = 0.0;
        for pk in p {
            sum += (pk - mean).norm_squared();
        }
        sum / n as f64
    }

    fn min_value(&self, _sampler: &Sampler<D>) -> f64 {
        0.0
    }

    fn max_value(&self, sampler: &Sampler<D>) -> f64 {
        // No vertex is farther than L/2 from the centroid of a closed chain.
        let l = sampler.total_length();
        0.25 * l * l
    }

    fn tag(&self) -> String {
        "SquaredGyradius".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn RandomVariable<D>> {
        Box::new(*self)
    }
}

/// Hydrodynamic radius n²/Σ_{k<l} 1/‖pₖ−p_l‖, the harmonic-mean analogue
/// of the gyradius used in polymer physics.
#[derive(Clone, Copy, Debug, Default)]
pub struct HydrodynamicRadius;

impl<const D: usize> RandomVariable<D> for HydrodynamicRadius {
    fn evaluate(&self, sampler: &Sampler<D>) -> f64 {
        let n = sampler.edge_count();
        let p = &sampler.space_coordinates()[..n];

        let mut sum = 0.0;
        for k in 0..n {
            for l in (k + 1)..n {
                sum += 1.0 / ((p[k] - p[l]).norm() + f64::MIN_POSITIVE);
            }
        }
        (n * n) as f64 / sum
    }

    fn min_value(&self, _sampler: &Sampler<D>) -> f64 {
        0.0
    }

    fn max_value(&self, sampler: &Sampler<D>) -> f64 {
        sampler.total_length()
    }

    fn tag(&self) -> String {
        "HydrodynamicRadius".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn RandomVariable<D>> {
        Box::new(*self)
    }
}

/// p-th power bending energy Σ (φ/len)^p·len / p over the joints of the
/// closed chain, with len the mean of the two adjacent edge lengths and φ
/// the turning angle between consecutive unit edge vectors.
#[derive(Clone, Copy, Debug)]
pub struct BendingEnergy {
    pub p: f64,
}

impl BendingEnergy {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl<const D: usize> RandomVariable<D> for BendingEnergy {
    fn evaluate(&self, sampler: &Sampler<D>) -> f64 {
        let n = sampler.edge_count();
        let y = sampler.edge_coordinates();
        let r = sampler.edge_lengths();

        // Wrap-around joint between the last and first edge.
        let mut sum = {
            let len = 0.5 * (r[n - 1] + r[0]);
            let phi = linalg::angle_between_unit(&y[n - 1], &y[0]);
            (phi / len).powf(self.p) * len
        };

        for k in 0..n - 1 {
            let len = 0.5 * (r[k] + r[k + 1]);
            let phi = linalg::angle_between_unit(&y[k], &y[k + 1]);
            sum += (phi / len).powf(self.p) * len;
        }

        sum / self.p
    }

    fn min_value(&self, _sampler: &Sampler<D>) -> f64 {
        0.0
    }

    fn max_value(&self, sampler: &Sampler<D>) -> f64 {
        let n = sampler.edge_count();
        let r = sampler.edge_lengths();
        let phi = std::f64::consts::PI;

        let mut sum = {
            let len = 0.5 * (r[n - 1] + r[0]);
            (phi / len).powf(self.p) * len
        };
        for k in 0..n - 1 {
            let len = 0.5 * (r[k] + r[k + 1]);
            sum += (phi / len).powf(self.p) * len;
        }
        sum / self.p
    }

    fn tag(&self) -> String {
        format!("BendingEnergy({})", self.p)
    }

    fn boxed_clone(&self) -> Box<dyn RandomVariable<D>> {
        Box::new(*self)
    }
}

/// The sample's own edge-space sampling weight, exposed as an observable
/// so its distribution can be binned like any other quantity.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeSpaceSamplingWeightRV;

impl<const D: usize> RandomVariable<D> for EdgeSpaceSamplingWeightRV {
    fn evaluate(&self, sampler: &Sampler<D>) -> f64 {
        sampler.edge_space_sampling_weight()
    }

    fn min_value(&self, _sampler: &Sampler<D>) -> f64 {
        0.0
    }

    fn max_value(&self, sampler: &Sampler<D>) -> f64 {
        1.0 / sampler.edge_count() as f64
    }

    fn tag(&self) -> String {
        "EdgeSpaceSamplingWeight".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn RandomVariable<D>> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{Sampler, SamplerSettings};

    /// Unit square in the plane: edges +e₁, +e₂, −e₁, −e₂ of length ¼ each
    /// (total length 1, so the square has side ¼).
    fn unit_square_sampler() -> Sampler<2> {
        let mut sampler = Sampler::<2>::new(4, SamplerSettings::default()).unwrap();
        let dirs = [1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0];
        sampler.read_initial_edge_coordinates(&dirs, false).unwrap();
        // Closed already: the zero shift fixes the directions.
        sampler.read_shift_vector(&[0.0, 0.0]).unwrap();
        sampler.optimize();
        sampler.compute_space_coordinates();
        sampler
    }

    #[test]
    fn gyradius_of_square_is_exact() {
        let sampler = unit_square_sampler();
        // Vertices of a side-s square: Rg² = s²/2 with s = 1/4.
        let rg2 = SquaredGyradius.evaluate(&sampler);
        assert!((rg2 - 0.03125).abs() < 1e-12, "got {rg2}");
    }

    #[test]
    fn bending_energy_of_square_is_exact() {
        let sampler = unit_square_sampler();
        // Four right-angle joints, len = 1/4 each:
        // sum = 4 * (π/2 / len)² * len / 2 = 2 π².
        let e = BendingEnergy::new(2.0).evaluate(&sampler);
        let expected = 2.0 * std::f64::consts::PI * std::f64::consts::PI;
        assert!((e - expected).abs() < 1e-9, "got {e}, want {expected}");
    }

    #[test]
    fn hydrodynamic_radius_of_square_is_positive_and_bounded() {
        let sampler = unit_square_sampler();
        let rh = HydrodynamicRadius.evaluate(&sampler);
        assert!(rh > 0.0);
        let max = <HydrodynamicRadius as RandomVariable<2>>::max_value(&HydrodynamicRadius, &sampler);
        assert!(rh <= max);
    }

    #[test]
    fn observables_clone_into_workers() {
        let list: Vec<Box<dyn RandomVariable<3>>> = vec![
            Box::new(SquaredGyradius),
            Box::new(BendingEnergy::new(2.0)),
        ];
        let cloned: Vec<Box<dyn RandomVariable<3>>> =
            list.iter().map(|o| o.boxed_clone()).collect();
        assert_eq!(cloned[0].tag(), "SquaredGyradius");
        assert_eq!(cloned[1].tag(), "BendingEnergy(2)");
    }
}
