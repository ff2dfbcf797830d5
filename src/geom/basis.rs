//! Fourier position basis shared by the strand representation.
//!
//! A strand stores `degree` coefficient rows of an orthonormal cosine
//! series; sampling the path at parameter `t` in `[0, 1]` evaluates
//! `psi_0(t) = 1`, `psi_k(t) = sqrt(2) * cos(k * pi * t)` against the rows.

use glam::DVec3;

use crate::util::{Error, Result};

/// Basis value of term `k` at parameter `t`.
#[inline]
pub fn psi(k: usize, t: f64) -> f64 {
    if k == 0 {
        1.0
    } else {
        std::f64::consts::SQRT_2 * (k as f64 * std::f64::consts::PI * t).cos()
    }
}

/// The parameter samples for `num_points` path points. With endpoints the
/// samples span `[0, 1]` inclusive; without, they are strictly interior.
pub fn timeline(num_points: usize, include_endpoints: bool) -> Vec<f64> {
    let incr = if include_endpoints {
        if num_points > 1 {
            1.0 / (num_points as f64 - 1.0)
        } else {
            0.0
        }
    } else {
        1.0 / (num_points as f64 + 1.0)
    };
    let start = if include_endpoints { 0.0 } else { incr };
    (0..num_points).map(|i| start + i as f64 * incr).collect()
}

/// The `num_points x degree` position matrix, row-major.
pub fn position_matrix(degree: usize, times: &[f64]) -> Result<Vec<f64>> {
    if degree == 0 || times.is_empty() {
        return Err(Error::precondition(
            "position matrix requires a non-zero degree and at least one sample",
        ));
    }
    let mut psi_mat = vec![0.0; times.len() * degree];
    for (row, &t) in times.iter().enumerate() {
        for k in 0..degree {
            psi_mat[row * degree + k] = psi(k, t);
        }
    }
    Ok(psi_mat)
}

/// Evaluate `degree` coefficient rows at every sample of `times`.
pub fn sample_path(coeffs: &[DVec3], times: &[f64]) -> Vec<DVec3> {
    times
        .iter()
        .map(|&t| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| *c * psi(k, t))
                .sum::<DVec3>()
        })
        .collect()
}

/// Least-squares fit of `degree` coefficient rows to a sampled path:
/// solves the normal equations of the position matrix at the path's
/// timeline. When the path has fewer points than the requested degree the
/// trailing coefficients are zero.
pub fn fit_coefficients(points: &[DVec3], degree: usize) -> Result<Vec<DVec3>> {
    if degree == 0 || points.is_empty() {
        return Err(Error::precondition(
            "fit requires a non-zero degree and at least one point",
        ));
    }
    let effective = degree.min(points.len());
    let times = timeline(points.len(), true);
    let psi_mat = position_matrix(effective, &times)?;
    let n = points.len();

    // Normal equations: (Psi^T Psi) X = Psi^T P, one RHS per component.
    let mut ata = vec![0.0; effective * effective];
    let mut atb = vec![DVec3::ZERO; effective];
    for row in 0..n {
        for i in 0..effective {
            let pi = psi_mat[row * effective + i];
            for j in 0..effective {
                ata[i * effective + j] += pi * psi_mat[row * effective + j];
            }
            atb[i] += points[row] * pi;
        }
    }

    let mut coeffs = solve_vec3(&mut ata, &mut atb, effective)?;
    coeffs.resize(degree, DVec3::ZERO);
    Ok(coeffs)
}

/// Gaussian elimination with partial pivoting; `a` is `n x n` row-major,
/// `b` holds one 3-vector RHS per row. Both are consumed as scratch.
fn solve_vec3(a: &mut [f64], b: &mut [DVec3], n: usize) -> Result<Vec<DVec3>> {
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| {
                a[x * n + col]
                    .abs()
                    .partial_cmp(&a[y * n + col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot * n + col].abs() < 1e-12 {
            return Err(Error::precondition("singular basis system"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            let scaled = b[col] * factor;
            b[row] -= scaled;
        }
    }
    let mut x = vec![DVec3::ZERO; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= x[k] * a[row * n + k];
        }
        x[row] = acc / a[row * n + row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::dvec3;

    #[test]
    fn test_psi_orthonormal_terms() {
        assert_eq!(psi(0, 0.3), 1.0);
        assert!((psi(1, 0.0) - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert!(psi(1, 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_timeline_endpoints() {
        let t = timeline(3, true);
        assert!((t[0] - 0.0).abs() < 1e-12);
        assert!((t[1] - 0.5).abs() < 1e-12);
        assert!((t[2] - 1.0).abs() < 1e-12);
        let t = timeline(3, false);
        assert!(t[0] > 0.0 && t[2] < 1.0);
    }

    #[test]
    fn test_sample_fit_round_trip() {
        // A degree-3 strand sampled densely should refit to itself.
        let coeffs = vec![
            dvec3(1.0, 0.0, -2.0),
            dvec3(0.5, 1.5, 0.0),
            dvec3(-0.25, 0.75, 1.0),
        ];
        let times = timeline(50, true);
        let path = sample_path(&coeffs, &times);
        let refit = fit_coefficients(&path, 3).unwrap();
        for (orig, fitted) in coeffs.iter().zip(&refit) {
            assert!((*orig - *fitted).length() < 1e-8);
        }
    }

    #[test]
    fn test_fit_pads_excess_degree() {
        let path = vec![dvec3(0.0, 0.0, 0.0), dvec3(1.0, 0.0, 0.0)];
        let coeffs = fit_coefficients(&path, 4).unwrap();
        assert_eq!(coeffs.len(), 4);
        assert_eq!(coeffs[2], DVec3::ZERO);
        assert_eq!(coeffs[3], DVec3::ZERO);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        assert!(position_matrix(0, &[0.0]).is_err());
        assert!(fit_coefficients(&[], 3).is_err());
    }
}
