//! Möbius shift kernel for the unit sphere and the Poincaré ball.
//!
//! Purpose
//! - Transport sphere points (edge directions) and ball points (shift
//!   parameters) under the conformal automorphisms of the unit ball. Both
//!   maps are exact rational expressions; the only branch is a re-normalization
//!   of the sphere image once the shift parameter gets close to the boundary.
//!
//! Conventions
//! - `shift_sphere_points` applies the automorphism determined by `w` to
//!   points *on* the sphere; its inverse is the same map with parameter `-w`.
//! - `mobius_shift` is Möbius addition w ⊕ z, used to fold a tangent step
//!   at the origin into the accumulated shift parameter.

use nalgebra::SVector;

/// One plus a few ulps; keeps denominators away from exact cancellation.
pub const BIG_ONE: f64 = 1.0 + 16.0 * f64::EPSILON;
/// One minus a few ulps; the largest squared norm accepted as "inside".
pub const SMALL_ONE: f64 = 1.0 - 16.0 * f64::EPSILON;
/// Squared-norm threshold beyond which sphere images are re-normalized.
pub const NORM_THRESHOLD: f64 = 0.99 * 0.99 + 16.0 * f64::EPSILON;
/// Conformal factor of the hyperbolic metric at the origin.
pub const G_FACTOR: f64 = 4.0;

/// Apply the sphere shift determined by `w` to every point of `x`, writing
/// the images to `y`:
///
/// yₖ = ((1−‖w‖²)·xₖ + (2 w·xₖ − 2)·w) / (1 + ‖w‖² − 2 w·xₖ).
///
/// Near the ball boundary the rational map loses relative accuracy and the
/// images drift off the sphere, so for ‖w‖² above [`NORM_THRESHOLD`] each
/// image is normalized after the formula. This is the only guard.
pub fn shift_sphere_points<const D: usize>(
    x: &[SVector<f64, D>],
    w: &SVector<f64, D>,
    y: &mut [SVector<f64, D>],
) {
    debug_assert_eq!(x.len(), y.len());

    let ww = w.norm_squared();
    let one_minus_ww = 1.0 - ww;
    let one_plus_ww = 1.0 + ww;

    if ww <= NORM_THRESHOLD {
        for (yk, xk) in y.iter_mut().zip(x.iter()) {
            let wx = w.dot(xk);
            let denom = 1.0 / (one_plus_ww - 2.0 * wx);
            *yk = (xk * one_minus_ww + w * (2.0 * wx - 2.0)) * denom;
        }
    } else {
        for (yk, xk) in y.iter_mut().zip(x.iter()) {
            let wx = w.dot(xk);
            let denom = 1.0 / (one_plus_ww - 2.0 * wx);
            *yk = (xk * one_minus_ww + w * (2.0 * wx - 2.0)) * denom;
            yk.normalize_mut();
        }
    }
}

/// Möbius addition w ⊕ z on the open unit ball:
///
/// w' = ((1−‖w‖²)·z + (1+‖z‖²+2 w·z)·w) / (1 + 2 w·z + ‖w‖²·‖z‖²).
///
/// Composes the accumulated shift `w` with a step `z` taken in the tangent
/// space at the origin. `z = 0` returns `w` unchanged.
pub fn mobius_shift<const D: usize>(
    w: &SVector<f64, D>,
    z: &SVector<f64, D>,
) -> SVector<f64, D> {
    let ww = w.norm_squared();
    let zz = z.norm_squared();
    let wz2 = 2.0 * w.dot(z);

    let a = 1.0 - ww;
    let b = 1.0 + zz + wz2;
    let c = BIG_ONE + wz2 + ww * zz;

    (z * a + w * b) / c
}

/// tanh(t)/t, evaluated stably.
///
/// Degree-4/4 Padé approximant for t² ≤ 1, the direct ratio for
/// 1 < t² ≤ 7, and the asymptote 1/|t| beyond. `tanhc(0) == 1` exactly.
pub fn tanhc(t: f64) -> f64 {
    const A0: f64 = 1.0;
    const A1: f64 = 7.0 / 51.0;
    const A2: f64 = 1.0 / 255.0;
    const A3: f64 = 2.0 / 69615.0;
    const A4: f64 = 1.0 / 34459425.0;

    const B0: f64 = 1.0;
    const B1: f64 = 8.0 / 17.0;
    const B2: f64 = 7.0 / 255.0;
    const B3: f64 = 4.0 / 9945.0;
    const B4: f64 = 1.0 / 765765.0;

    let t2 = t * t;

    if t2 <= 1.0 {
        (A0 + t2 * (A1 + t2 * (A2 + t2 * (A3 + t2 * A4))))
            / (B0 + t2 * (B1 + t2 * (B2 + t2 * (B3 + t2 * B4))))
    } else if t2 <= 7.0 {
        t.tanh() / t
    } else {
        1.0 / t.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_unit(rng: &mut StdRng) -> Vector3<f64> {
        loop {
            let v = Vector3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            );
            let n = v.norm();
            if n > 1e-6 && n < 1.0 {
                return v / n;
            }
        }
    }

    #[test]
    fn shift_keeps_points_on_sphere() {
        let mut rng = StdRng::seed_from_u64(11);
        let x: Vec<Vector3<f64>> = (0..32).map(|_| random_unit(&mut rng)).collect();
        let mut y = vec![Vector3::zeros(); 32];
        let w = Vector3::new(0.3, -0.2, 0.1);
        shift_sphere_points(&x, &w, &mut y);
        for yk in &y {
            assert!((yk.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn shift_inverse_is_negated_parameter() {
        // Shift(Shift(x, w), -w) == x for ‖w‖ < 0.95.
        let mut rng = StdRng::seed_from_u64(23);
        let x: Vec<Vector3<f64>> = (0..64).map(|_| random_unit(&mut rng)).collect();
        let mut y = vec![Vector3::zeros(); 64];
        let mut back = vec![Vector3::zeros(); 64];
        for scale in [0.1, 0.5, 0.9, 0.94] {
            let w = random_unit(&mut rng) * scale;
            shift_sphere_points(&x, &w, &mut y);
            shift_sphere_points(&y, &(-w), &mut back);
            for (xk, bk) in x.iter().zip(back.iter()) {
                assert!((xk - bk).norm() < 1e-10, "scale {scale}");
            }
        }
    }

    #[test]
    fn boundary_shift_renormalizes() {
        // ‖w‖ = 0.999 exercises the re-normalization branch.
        let mut rng = StdRng::seed_from_u64(5);
        let x: Vec<Vector3<f64>> = (0..16).map(|_| random_unit(&mut rng)).collect();
        let mut y = vec![Vector3::zeros(); 16];
        let w = random_unit(&mut rng) * 0.999;
        assert!(w.norm_squared() > NORM_THRESHOLD);
        shift_sphere_points(&x, &w, &mut y);
        for yk in &y {
            assert!((yk.norm() - 1.0).abs() <= 4.0 * f64::EPSILON);
        }
    }

    #[test]
    fn mobius_shift_identity_and_inverse() {
        let w = Vector3::new(0.4, 0.1, -0.2);
        let z = Vector3::zeros();
        assert!((mobius_shift(&w, &z) - w).norm() < 1e-15);

        // w ⊕ (-w) = 0.
        let back = mobius_shift(&w, &(-w));
        assert!(back.norm() < 1e-14);
    }

    #[test]
    fn tanhc_stable_across_regimes() {
        assert_eq!(tanhc(0.0), 1.0);
        for t in [1e-10_f64, 0.5, 1.0, 2.6, 50.0] {
            let direct = t.tanh() / t;
            let got = tanhc(t);
            assert!(
                (got - direct).abs() <= 16.0 * f64::EPSILON * got.abs(),
                "t = {t}: got {got}, direct {direct}"
            );
        }
    }
}
