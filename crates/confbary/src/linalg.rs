//! Symmetric fixed-size linear algebra on top of `nalgebra` statics.
//!
//! Purpose
//! - The Newton step and the sampling-weight formulas only ever need small
//!   symmetric matrices of the ambient dimension. Factorizations go through
//!   `nalgebra::linalg::Cholesky`; this module adds the pieces `nalgebra`
//!   does not expose for arbitrary `const D`: closed-form smallest
//!   eigenvalues for d∈{2,3} and a cyclic Jacobi fallback for the rest.
//!
//! Conventions
//! - Matrices passed in are assumed symmetric; both triangles are kept
//!   filled so they remain valid operands for ordinary `nalgebra` ops.

use nalgebra::{SMatrix, SVector};

/// Smallest eigenvalue of a symmetric matrix.
///
/// - d=2: closed form via the quadratic formula.
/// - d=3: Viète/trigonometric solution of the characteristic cubic on the
///   deviator, with a shortcut when the off-diagonal mass is negligible
///   relative to the diagonal.
/// - otherwise: cyclic Jacobi sweeps.
///
/// The d∈{2,3} branches are exact up to floating point; the `match` on the
/// const parameter is resolved at compile time.
pub fn smallest_eigenvalue<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    match D {
        1 => m[(0, 0)],
        2 => {
            let a = m[(0, 0)];
            let d = m[(1, 1)];
            let b = m[(0, 1)];
            0.5 * (a + d - ((a - d) * (a - d) + 4.0 * b * b).abs().sqrt())
        }
        3 => smallest_eigenvalue_3(m),
        _ => sym_eigenvalues(m)[0],
    }
}

fn smallest_eigenvalue_3<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    let m00 = m[(0, 0)];
    let m11 = m[(1, 1)];
    let m22 = m[(2, 2)];
    let m01 = m[(0, 1)];
    let m02 = m[(0, 2)];
    let m12 = m[(1, 2)];

    let p1 = m01 * m01 + m02 * m02 + m12 * m12;
    let diag = (m00 * m00 + m11 * m11 + m22 * m22).sqrt();

    if p1.sqrt() < f64::EPSILON * diag {
        // Effectively diagonal.
        return m00.min(m11.min(m22));
    }

    let q = (m00 + m11 + m22) / 3.0;
    let delta = [m00 - q, m11 - q, m22 - q];
    let p2 = delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2] + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let pinv = 1.0 / p;

    let b11 = delta[0] * pinv;
    let b22 = delta[1] * pinv;
    let b33 = delta[2] * pinv;
    let b12 = m01 * pinv;
    let b13 = m02 * pinv;
    let b23 = m12 * pinv;

    // det(B)/2 for the normalized deviator B.
    let r = 0.5
        * (2.0 * b12 * b23 * b13 - b11 * b23 * b23 - b12 * b12 * b33 + b11 * b22 * b33
            - b13 * b13 * b22);

    let phi = if r <= -1.0 {
        std::f64::consts::PI / 3.0
    } else if r >= 1.0 {
        0.0
    } else {
        r.acos() / 3.0
    };

    // Eigenvalues come out ordered eig2 <= eig1 <= eig0; this is eig2.
    q + 2.0 * p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos()
}

/// All eigenvalues of a symmetric matrix in ascending order, via cyclic
/// Jacobi rotations. Convergence is quadratic; a handful of sweeps reaches
/// machine precision for the small dimensions used here.
pub fn sym_eigenvalues<const D: usize>(m: &SMatrix<f64, D, D>) -> [f64; D] {
    let mut a = *m;
    let max_sweeps = 32;

    for _ in 0..max_sweeps {
        let mut off = 0.0;
        for p in 0..D {
            for q in (p + 1)..D {
                off += a[(p, q)] * a[(p, q)];
            }
        }
        if off <= f64::EPSILON * f64::EPSILON * a.norm_squared() {
            break;
        }
        for p in 0..D {
            for q in (p + 1)..D {
                let apq = a[(p, q)];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;
                for i in 0..D {
                    let aip = a[(i, p)];
                    let aiq = a[(i, q)];
                    a[(i, p)] = c * aip - s * aiq;
                    a[(i, q)] = s * aip + c * aiq;
                }
                for i in 0..D {
                    let api = a[(p, i)];
                    let aqi = a[(q, i)];
                    a[(p, i)] = c * api - s * aqi;
                    a[(q, i)] = s * api + c * aqi;
                }
            }
        }
    }

    let mut ev = [0.0_f64; D];
    for (i, e) in ev.iter_mut().enumerate() {
        *e = a[(i, i)];
    }
    ev.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    ev
}

/// Determinant of a symmetric 3×3 matrix, from the six distinct entries.
pub fn sym_det3<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    let m00 = m[(0, 0)];
    let m11 = m[(1, 1)];
    let m22 = m[(2, 2)];
    let m01 = m[(0, 1)];
    let m02 = m[(0, 2)];
    let m12 = m[(1, 2)];
    m00 * (m11 * m22 - m12 * m12) - m01 * (m01 * m22 - m12 * m02)
        + m02 * (m01 * m12 - m11 * m02)
}

/// Angle between two unit vectors, with the dot product clamped so round-off
/// at (anti)parallel configurations cannot push `acos` out of domain.
pub fn angle_between_unit<const D: usize>(a: &SVector<f64, D>, b: &SVector<f64, D>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, SMatrix, Vector3};

    #[test]
    fn smallest_eigenvalue_2d_closed_form() {
        // Eigenvalues of [[2,1],[1,2]] are 1 and 3.
        let m = SMatrix::<f64, 2, 2>::new(2.0, 1.0, 1.0, 2.0);
        assert!((smallest_eigenvalue(&m) - 1.0).abs() < 1e-14);
    }

    #[test]
    fn smallest_eigenvalue_3d_matches_known_spectrum() {
        // diag(1,2,3) rotated by a Givens rotation keeps the spectrum.
        let th: f64 = 0.7;
        let g = Matrix3::new(
            th.cos(),
            -th.sin(),
            0.0,
            th.sin(),
            th.cos(),
            0.0,
            0.0,
            0.0,
            1.0,
        );
        let d = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 3.0));
        let m = g * d * g.transpose();
        assert!((smallest_eigenvalue(&m) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn smallest_eigenvalue_3d_diagonal_shortcut() {
        let m = Matrix3::from_diagonal(&Vector3::new(0.5, 2.0, 7.0));
        assert!((smallest_eigenvalue(&m) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn jacobi_recovers_full_spectrum() {
        let th: f64 = 1.2;
        let c = th.cos();
        let s = th.sin();
        // 4x4 block-diagonal of two rotated 2x2 blocks with spectra {1,4}, {2,9}.
        let mut m = SMatrix::<f64, 4, 4>::zeros();
        let rot2 = |a: f64, b: f64| {
            SMatrix::<f64, 2, 2>::new(
                c * c * a + s * s * b,
                c * s * (a - b),
                c * s * (a - b),
                s * s * a + c * c * b,
            )
        };
        let b0 = rot2(1.0, 4.0);
        let b1 = rot2(2.0, 9.0);
        for i in 0..2 {
            for j in 0..2 {
                m[(i, j)] = b0[(i, j)];
                m[(2 + i, 2 + j)] = b1[(i, j)];
            }
        }
        let ev = sym_eigenvalues(&m);
        let expected = [1.0, 2.0, 4.0, 9.0];
        for (got, want) in ev.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-10, "got {got}, want {want}");
        }
    }

    #[test]
    fn det3_matches_nalgebra() {
        let m = Matrix3::new(2.0, 0.3, -0.1, 0.3, 1.5, 0.2, -0.1, 0.2, 3.0);
        assert!((sym_det3(&m) - m.determinant()).abs() < 1e-12);
    }

    #[test]
    fn angle_clamps_at_parallel() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(angle_between_unit(&a, &a), 0.0);
        assert!((angle_between_unit(&a, &(-a)) - std::f64::consts::PI).abs() < 1e-15);
    }
}
