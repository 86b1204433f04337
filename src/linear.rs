//! Reference `FittedModel`: ordinary least squares with named covariates.
//!
//! This is deliberately not a GAM engine. It exists so the estimator's
//! capability interface can be exercised end-to-end (tests, demo binary)
//! without an external fitting library: an intercept plus the named covariate
//! columns, solved through the normal equations. A model with no smoothing
//! parameters has identical conditional and unconditional coefficient
//! covariances, so both kinds return the same matrix.

use crate::band::BandError;
use crate::faer_ndarray::FaerCholesky;
use crate::model::{CovarianceKind, FittedModel, PointwisePrediction, QueryTable};
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1};

#[derive(Debug)]
pub struct LinearModel {
    covariates: Vec<String>,
    beta: Array1<f64>,
    covariance: Array2<f64>,
    residual_variance: f64,
}

impl LinearModel {
    /// Fit by ordinary least squares on an intercept plus every column of
    /// `data`, in column order.
    pub fn fit(data: &QueryTable, response: &Array1<f64>) -> Result<Self, BandError> {
        let n = data.n_rows();
        if response.len() != n {
            return Err(BandError::InvalidParameter(format!(
                "response has {} rows but the data table has {n}",
                response.len()
            )));
        }
        if response.iter().any(|v| !v.is_finite()) {
            return Err(BandError::InvalidParameter(
                "response contains non-finite values".to_string(),
            ));
        }
        let covariates = data.names().to_vec();
        let design = build_design(&covariates, data)?;
        let p = design.ncols();
        if n <= p {
            return Err(BandError::InvalidParameter(format!(
                "need more than {p} rows to fit {p} coefficients, got {n}"
            )));
        }

        let xtx = design.t().dot(&design);
        let xty = design.t().dot(response);
        let factor = xtx.cholesky(Side::Lower).map_err(|e| {
            BandError::InvalidParameter(format!(
                "design matrix is singular (collinear covariates?): {e}"
            ))
        })?;
        let beta = factor.solve_vec(&xty);

        let fitted = design.dot(&beta);
        let residual_variance = response
            .iter()
            .zip(fitted.iter())
            .map(|(&y, &f)| (y - f) * (y - f))
            .sum::<f64>()
            / (n - p) as f64;

        let mut covariance = factor.solve_mat(&Array2::<f64>::eye(p));
        covariance.mapv_inplace(|v| v * residual_variance);
        // Symmetrize away factorization round-off.
        let transposed = covariance.t().to_owned();
        covariance += &transposed;
        covariance.mapv_inplace(|v| 0.5 * v);

        Ok(Self {
            covariates,
            beta,
            covariance,
            residual_variance,
        })
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.beta.view()
    }

    pub fn residual_variance(&self) -> f64 {
        self.residual_variance
    }
}

fn build_design(covariates: &[String], query: &QueryTable) -> Result<Array2<f64>, BandError> {
    let n = query.n_rows();
    let mut design = Array2::<f64>::ones((n, covariates.len() + 1));
    for (idx, name) in covariates.iter().enumerate() {
        let column = query.column(name).ok_or_else(|| BandError::SchemaMismatch {
            expected: covariates.to_vec(),
            found: query.names().to_vec(),
        })?;
        design.column_mut(idx + 1).assign(&column);
    }
    Ok(design)
}

impl FittedModel for LinearModel {
    fn covariate_names(&self) -> &[String] {
        &self.covariates
    }

    fn predict(&self, query: &QueryTable) -> Result<PointwisePrediction, BandError> {
        let design = build_design(&self.covariates, query)?;
        let fit = design.dot(&self.beta);
        // Var(fit_i) = x_i^T Var(beta) x_i.
        let xc = design.dot(&self.covariance);
        let mut standard_error = Array1::<f64>::zeros(design.nrows());
        for i in 0..design.nrows() {
            standard_error[i] = design.row(i).dot(&xc.row(i)).max(0.0).sqrt();
        }
        Ok(PointwisePrediction {
            fit,
            standard_error,
        })
    }

    fn linear_predictor_matrix(&self, query: &QueryTable) -> Result<Array2<f64>, BandError> {
        build_design(&self.covariates, query)
    }

    fn coefficient_covariance(&self, _kind: CovarianceKind) -> Result<Array2<f64>, BandError> {
        // No smoothing parameters, so there is no smoothing uncertainty to
        // add: conditional and unconditional covariances coincide.
        Ok(self.covariance.clone())
    }
}
