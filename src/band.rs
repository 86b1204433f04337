//! Simultaneous confidence band estimation via posterior resampling.
//!
//! Given a fitted additive model, the band around the predicted curve is
//! calibrated against the Monte Carlo distribution of the maximum absolute
//! standardized deviation across all query rows (Marra & Wood 2012; the
//! approach popularized for mgcv fits by Simpson). A pointwise interval
//! covers the curve at each query row individually; the simultaneous band
//! covers the whole curve jointly, so its critical value is the upper
//! quantile of the max-statistic rather than a single-row normal quantile.

use crate::model::{CovarianceKind, FittedModel, QueryTable};
use crate::mvn::MvnFactor;
use crate::quantile::{empirical_quantile_type8, standard_normal_quantile};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by band estimation. None are recovered internally; a
/// failed computation aborts the whole call and returns no partial result.
#[derive(Debug, Error)]
pub enum BandError {
    #[error("coefficient covariance is invalid: {0}")]
    InvalidCovariance(String),

    #[error("query does not match the model schema: model expects {expected:?}, query has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("degenerate standard error {value} at query row {row}")]
    NumericOverflow { row: usize, value: f64 },
}

/// Multiplier used for the pointwise interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PointwiseMultiplier {
    /// A literal multiplier, independent of the configured confidence level.
    /// `Fixed(2.0)` reproduces the reference analysis, which uses 2 as an
    /// approximate 95% two-sided normal multiplier.
    Fixed(f64),
    /// The exact two-sided normal quantile for the configured confidence
    /// level (1.959964 at 95%).
    FromConfidence,
}

/// Configuration of a band estimation call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandOptions {
    /// Number of Monte Carlo replicates used to calibrate the critical
    /// value. Larger values reduce Monte Carlo noise.
    pub n_reps: usize,
    /// Coverage level in (0, 1) for the simultaneous band.
    pub confidence: f64,
    /// Pointwise interval multiplier policy.
    pub pointwise: PointwiseMultiplier,
    /// Which coefficient covariance to request from the model.
    pub covariance: CovarianceKind,
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            n_reps: 10_000,
            confidence: 0.95,
            pointwise: PointwiseMultiplier::Fixed(2.0),
            covariance: CovarianceKind::Unconditional,
        }
    }
}

/// Band table, row-aligned with the query it was computed for.
#[derive(Clone, Debug, Serialize)]
pub struct BandResult {
    pub query: QueryTable,
    pub fit: Array1<f64>,
    pub se_fit: Array1<f64>,
    pub lower_pointwise: Array1<f64>,
    pub upper_pointwise: Array1<f64>,
    pub lower_simultaneous: Array1<f64>,
    pub upper_simultaneous: Array1<f64>,
    /// Calibrated critical value for the simultaneous band.
    pub critical_value: f64,
    /// Multiplier actually used for the pointwise interval.
    pub pointwise_z: f64,
    pub n_reps: usize,
    pub confidence: f64,
}

impl BandResult {
    pub fn n_rows(&self) -> usize {
        self.fit.len()
    }
}

fn validate_options(options: &BandOptions) -> Result<(), BandError> {
    if options.n_reps < 1 {
        return Err(BandError::InvalidParameter(format!(
            "n_reps must be at least 1, got {}",
            options.n_reps
        )));
    }
    if !(options.confidence.is_finite()
        && options.confidence > 0.0
        && options.confidence < 1.0)
    {
        return Err(BandError::InvalidParameter(format!(
            "confidence must be in (0,1), got {}",
            options.confidence
        )));
    }
    if let PointwiseMultiplier::Fixed(z) = options.pointwise {
        if !(z.is_finite() && z > 0.0) {
            return Err(BandError::InvalidParameter(format!(
                "fixed pointwise multiplier must be finite and positive, got {z}"
            )));
        }
    }
    Ok(())
}

/// Estimate pointwise and simultaneous confidence bands around the model's
/// predicted curve at the query rows.
///
/// The caller supplies the randomness source, so results are deterministic
/// under a fixed seed; [`estimate_simultaneous_band_seeded`] is a convenience
/// wrapper for that case. Inputs are read-only and no state is retained
/// between calls.
pub fn estimate_simultaneous_band<M, R>(
    model: &M,
    query: &QueryTable,
    options: &BandOptions,
    rng: &mut R,
) -> Result<BandResult, BandError>
where
    M: FittedModel + ?Sized,
    R: Rng + ?Sized,
{
    validate_options(options)?;

    let expected = model.covariate_names();
    if !query.satisfies_schema(expected) {
        return Err(BandError::SchemaMismatch {
            expected: expected.to_vec(),
            found: query.names().to_vec(),
        });
    }
    let n = query.n_rows();

    let covariance = model.coefficient_covariance(options.covariance)?;
    let factor = MvnFactor::new(&covariance)?;
    let p = factor.dim();

    let prediction = model.predict(query)?;
    let fit = prediction.fit;
    let se_fit = prediction.standard_error;
    if fit.len() != n || se_fit.len() != n {
        return Err(BandError::InvalidParameter(format!(
            "model returned {} fits and {} standard errors for {n} query rows",
            fit.len(),
            se_fit.len()
        )));
    }
    if fit.iter().any(|v| !v.is_finite()) {
        return Err(BandError::InvalidParameter(
            "model prediction contains non-finite values".to_string(),
        ));
    }
    // Zero or negative standard errors would turn standardization into a
    // division by zero; surface them instead of emitting infinite bounds.
    for (row, &se) in se_fit.iter().enumerate() {
        if !(se.is_finite() && se > 0.0) {
            return Err(BandError::NumericOverflow { row, value: se });
        }
    }

    let design = model.linear_predictor_matrix(query)?;
    if design.dim() != (n, p) {
        return Err(BandError::InvalidParameter(format!(
            "linear predictor matrix has shape {:?}, expected ({n}, {p})",
            design.dim()
        )));
    }
    if design.iter().any(|v| !v.is_finite()) {
        return Err(BandError::InvalidParameter(
            "linear predictor matrix contains non-finite values".to_string(),
        ));
    }

    log::debug!(
        "estimating simultaneous band: {n} query rows, {p} coefficients, {} replicates",
        options.n_reps
    );

    // Coefficient deviates, then their image in prediction space. Each
    // column of sim_dev is one simulated realization of the deviation of the
    // fitted curve from the truth implied by the coefficient uncertainty.
    let deviates = factor.sample_matrix(options.n_reps, rng);
    let sim_dev = crate::faer_ndarray::fast_ab(&design, &deviates);

    // Max absolute standardized deviation per replicate. Replicates are
    // independent given the shared read-only inputs, so the reduction
    // parallelizes across the replicate axis with no locking.
    let mut max_abs_dev: Vec<f64> = sim_dev
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| {
            column
                .iter()
                .zip(se_fit.iter())
                .fold(0.0_f64, |acc, (&dev, &se)| acc.max((dev / se).abs()))
        })
        .collect();

    let crit = empirical_quantile_type8(&mut max_abs_dev, options.confidence)
        .map_err(BandError::InvalidParameter)?;

    let pointwise_z = match options.pointwise {
        PointwiseMultiplier::Fixed(z) => z,
        PointwiseMultiplier::FromConfidence => {
            standard_normal_quantile(0.5 + 0.5 * options.confidence)
                .map_err(BandError::InvalidParameter)?
        }
    };

    log::debug!(
        "simultaneous critical value {crit:.4} at level {} (pointwise multiplier {pointwise_z:.4})",
        options.confidence
    );

    let lower_pointwise = &fit - &se_fit.mapv(|s| pointwise_z * s);
    let upper_pointwise = &fit + &se_fit.mapv(|s| pointwise_z * s);
    let lower_simultaneous = &fit - &se_fit.mapv(|s| crit * s);
    let upper_simultaneous = &fit + &se_fit.mapv(|s| crit * s);

    Ok(BandResult {
        query: query.clone(),
        fit,
        se_fit,
        lower_pointwise,
        upper_pointwise,
        lower_simultaneous,
        upper_simultaneous,
        critical_value: crit,
        pointwise_z,
        n_reps: options.n_reps,
        confidence: options.confidence,
    })
}

/// Band estimation with a deterministically seeded RNG. Identical inputs and
/// seed produce identical critical values.
pub fn estimate_simultaneous_band_seeded<M>(
    model: &M,
    query: &QueryTable,
    options: &BandOptions,
    seed: u64,
) -> Result<BandResult, BandError>
where
    M: FittedModel + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(seed);
    estimate_simultaneous_band(model, query, options, &mut rng)
}
