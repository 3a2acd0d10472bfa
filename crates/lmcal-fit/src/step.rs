//! Residual and damped least-squares step computations.

use lmcal_core::{CalError, ErrorInfo, TensileTest};
use nalgebra::{DMatrix, DVector};

/// Number of strain points at which curves are compared.
pub const GRID_POINTS: usize = 100;

/// Evenly spaced true-strain points covering the experimental curve.
pub fn strain_grid(experimental: &TensileTest, points: usize) -> Vec<f64> {
    let (lo, hi) = experimental.strain_range();
    if points < 2 || hi <= lo {
        return vec![lo];
    }
    let step = (hi - lo) / (points - 1) as f64;
    (0..points).map(|i| lo + step * i as f64).collect()
}

/// Stress misfit of `simulated` against `experimental`, normalised by the
/// largest experimental stress magnitude.
pub fn residuals(experimental: &TensileTest, simulated: &TensileTest, grid: &[f64]) -> Vec<f64> {
    let scale = experimental
        .true_stress()
        .iter()
        .fold(0.0f64, |acc, s| acc.max(s.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };
    grid.iter()
        .map(|&e| (simulated.true_stress_at(e) - experimental.true_stress_at(e)) / scale)
        .collect()
}

/// Root mean square of `values`.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Forward-difference Jacobian columns, one per parameter.
pub fn jacobian_columns(base: &[f64], perturbed: &[Vec<f64>], deltas: &[f64]) -> Vec<Vec<f64>> {
    perturbed
        .iter()
        .zip(deltas)
        .map(|(r, delta)| {
            r.iter()
                .zip(base)
                .map(|(rp, r0)| (rp - r0) / delta)
                .collect()
        })
        .collect()
}

/// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr` for the parameter update `δ`.
pub fn damped_step(columns: &[Vec<f64>], residual: &[f64], damping: f64) -> Result<Vec<f64>, CalError> {
    let n = columns.len();
    let m = residual.len();
    if columns.iter().any(|col| col.len() != m) {
        return Err(CalError::Fitter(
            ErrorInfo::new("lmcal_fit.jacobian_shape", "jacobian rows differ from residual length")
                .with_context("residuals", m.to_string()),
        ));
    }
    let jac = DMatrix::from_fn(m, n, |i, j| columns[j][i]);
    let r = DVector::from_column_slice(residual);
    let jtj = jac.transpose() * &jac;
    // Zero columns (insensitive parameters) would leave the system singular.
    let diag = jtj.diagonal().map(|d| d.max(f64::EPSILON));
    let lhs = &jtj + DMatrix::from_diagonal(&diag) * damping;
    let rhs = -(jac.transpose() * r);
    let delta = lhs.lu().solve(&rhs).ok_or_else(|| {
        CalError::Fitter(
            ErrorInfo::new("lmcal_fit.singular_step", "damped normal equations are singular")
                .with_context("damping", damping.to_string()),
        )
    })?;
    Ok(delta.iter().copied().collect())
}
