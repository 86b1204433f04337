//! The fitted-model capability interface consumed by the band estimator.
//!
//! Any regression model with additive smooth terms can drive band estimation
//! as long as it exposes three operations: pointwise prediction with standard
//! errors, the linear predictor matrix at the query points, and a coefficient
//! covariance matrix. The estimator never looks inside the model beyond these.

use crate::band::BandError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Which coefficient covariance the estimator should request from the model.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CovarianceKind {
    /// Covariance conditional on the estimated smoothing parameters.
    Conditional,
    /// Covariance including smoothing-parameter uncertainty
    /// (Marra & Wood 2012). Preferred for band coverage.
    Unconditional,
}

/// Pointwise prediction at a set of query rows.
#[derive(Clone, Debug)]
pub struct PointwisePrediction {
    pub fit: Array1<f64>,
    pub standard_error: Array1<f64>,
}

/// Ordered, immutable table of named f64 covariate columns.
///
/// This is the query set at which bands are requested. Construction validates
/// shape; the table is never mutated by the estimator.
#[derive(Clone, Debug, Serialize)]
pub struct QueryTable {
    names: Vec<String>,
    columns: Vec<Array1<f64>>,
    n_rows: usize,
}

impl QueryTable {
    pub fn new(columns: Vec<(String, Array1<f64>)>) -> Result<Self, BandError> {
        if columns.is_empty() {
            return Err(BandError::InvalidParameter(
                "query table requires at least one column".to_string(),
            ));
        }
        let n_rows = columns[0].1.len();
        if n_rows == 0 {
            return Err(BandError::InvalidParameter(
                "query table requires at least one row".to_string(),
            ));
        }
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if names.contains(&name) {
                return Err(BandError::InvalidParameter(format!(
                    "duplicate query column name: {name}"
                )));
            }
            if column.len() != n_rows {
                return Err(BandError::InvalidParameter(format!(
                    "query column {name} has {} rows but the first column has {n_rows}",
                    column.len()
                )));
            }
            if column.iter().any(|v| !v.is_finite()) {
                return Err(BandError::InvalidParameter(format!(
                    "query column {name} contains non-finite values"
                )));
            }
            names.push(name);
            data.push(column);
        }
        Ok(Self {
            names,
            columns: data,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].view())
    }

    /// True when every requested covariate is present in this table.
    pub fn satisfies_schema(&self, expected: &[String]) -> bool {
        expected.iter().all(|name| self.names.contains(name))
    }
}

/// Capability interface of an already-fitted additive regression model.
///
/// The fitting step is an external collaborator; the estimator requires only
/// these three read-only operations, so any GAM library (or the reference
/// `LinearModel` in this crate) can be substituted without changing the
/// estimator.
pub trait FittedModel {
    /// Covariate column names the model expects in a query table.
    fn covariate_names(&self) -> &[String];

    /// Pointwise fit and standard error at each query row.
    fn predict(&self, query: &QueryTable) -> Result<PointwisePrediction, BandError>;

    /// The n × p matrix mapping model coefficients linearly to predictions
    /// at the query rows.
    fn linear_predictor_matrix(&self, query: &QueryTable) -> Result<Array2<f64>, BandError>;

    /// Square p × p positive-semidefinite covariance of the model
    /// coefficients.
    fn coefficient_covariance(&self, kind: CovarianceKind) -> Result<Array2<f64>, BandError>;
}
