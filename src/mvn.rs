//! Zero-mean multivariate normal deviates with a given coefficient covariance.
//!
//! Band calibration needs `n_reps` independent draws from N(0, Vb). The
//! covariance is factored once into a matrix square root; each draw is then a
//! single GEMV against a standard-normal vector. Smoothing-corrected GAM
//! covariances are frequently rank-deficient, so a plain Cholesky is tried
//! first and a clipped symmetric eigendecomposition is used as the
//! positive-semidefinite fallback.

use crate::band::BandError;
use crate::faer_ndarray::{FaerCholesky, FaerEigh, fast_ab};
use faer::Side;
use ndarray::{Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Eigenvalues below `-REL_EIG_TOL * max_eigenvalue` mark the matrix as
/// indefinite rather than merely rank-deficient.
const REL_EIG_TOL: f64 = 1e-8;

/// Matrix square root of a positive-semidefinite covariance.
#[derive(Debug)]
pub struct MvnFactor {
    root: Array2<f64>,
}

impl MvnFactor {
    /// Factor a p × p coefficient covariance.
    ///
    /// Fails with [`BandError::InvalidCovariance`] when the matrix is not
    /// square, contains non-finite entries, is materially asymmetric, or has
    /// a negative eigenvalue beyond numerical tolerance.
    pub fn new(covariance: &Array2<f64>) -> Result<Self, BandError> {
        let (rows, cols) = covariance.dim();
        if rows != cols || rows == 0 {
            return Err(BandError::InvalidCovariance(format!(
                "coefficient covariance must be square and non-empty, got {rows}x{cols}"
            )));
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(BandError::InvalidCovariance(
                "coefficient covariance contains non-finite values".to_string(),
            ));
        }
        let max_abs = covariance.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let sym_tol = REL_EIG_TOL * max_abs.max(1.0);
        for i in 0..rows {
            for j in (i + 1)..cols {
                if (covariance[[i, j]] - covariance[[j, i]]).abs() > sym_tol {
                    return Err(BandError::InvalidCovariance(format!(
                        "coefficient covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }

        // Strictly positive-definite covariances factor directly.
        if let Ok(factor) = covariance.cholesky(Side::Lower) {
            return Ok(Self {
                root: factor.lower_triangular(),
            });
        }

        // PSD fallback: clip small negative eigenvalues to zero, reject
        // genuinely indefinite matrices.
        let (values, vectors) = covariance.eigh(Side::Lower).map_err(|e| {
            BandError::InvalidCovariance(format!("eigendecomposition failed: {e}"))
        })?;
        let max_eig = values.iter().fold(0.0_f64, |acc, v| acc.max(*v));
        let clip_tol = REL_EIG_TOL * max_eig.max(1.0);
        let mut scaled = vectors;
        for (mut column, &value) in scaled.axis_iter_mut(Axis(1)).zip(values.iter()) {
            if value < -clip_tol {
                return Err(BandError::InvalidCovariance(format!(
                    "coefficient covariance has negative eigenvalue {value:.6e}"
                )));
            }
            let scale = value.max(0.0).sqrt();
            column.mapv_inplace(|v| v * scale);
        }
        Ok(Self { root: scaled })
    }

    pub fn dim(&self) -> usize {
        self.root.nrows()
    }

    /// Draw `n_draws` independent N(0, Vb) vectors as a p × n_draws matrix.
    pub fn sample_matrix<R: Rng + ?Sized>(&self, n_draws: usize, rng: &mut R) -> Array2<f64> {
        let p = self.dim();
        let mut z = Array2::<f64>::zeros((p, n_draws));
        for value in z.iter_mut() {
            *value = StandardNormal.sample(rng);
        }
        fast_ab(&self.root, &z)
    }
}
