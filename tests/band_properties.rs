use ndarray::{Array1, Array2, array};
use simband::{
    BandError, BandOptions, CovarianceKind, FittedModel, PointwiseMultiplier,
    PointwisePrediction, QueryTable, estimate_simultaneous_band_seeded,
};

/// Model stub with preset coefficients-to-prediction map and covariance.
/// Standard errors are derived from diag(Cg Vb Cg^T) so standardized
/// deviations are exactly unit-scale, matching what a real fit reports.
struct StubModel {
    names: Vec<String>,
    fit: Array1<f64>,
    design: Array2<f64>,
    covariance: Array2<f64>,
    se_override: Option<Array1<f64>>,
}

impl StubModel {
    fn new(fit: Array1<f64>, design: Array2<f64>, covariance: Array2<f64>) -> Self {
        Self {
            names: vec!["age".to_string()],
            fit,
            design,
            covariance,
            se_override: None,
        }
    }

    fn derived_se(&self) -> Array1<f64> {
        let xc = self.design.dot(&self.covariance);
        let mut se = Array1::<f64>::zeros(self.design.nrows());
        for i in 0..self.design.nrows() {
            se[i] = self.design.row(i).dot(&xc.row(i)).max(0.0).sqrt();
        }
        se
    }
}

impl FittedModel for StubModel {
    fn covariate_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&self, _query: &QueryTable) -> Result<PointwisePrediction, BandError> {
        Ok(PointwisePrediction {
            fit: self.fit.clone(),
            standard_error: self
                .se_override
                .clone()
                .unwrap_or_else(|| self.derived_se()),
        })
    }

    fn linear_predictor_matrix(&self, _query: &QueryTable) -> Result<Array2<f64>, BandError> {
        Ok(self.design.clone())
    }

    fn coefficient_covariance(&self, _kind: CovarianceKind) -> Result<Array2<f64>, BandError> {
        Ok(self.covariance.clone())
    }
}

fn age_query(n: usize) -> QueryTable {
    let ages: Array1<f64> = (0..n).map(|i| i as f64).collect();
    QueryTable::new(vec![("age".to_string(), ages)]).unwrap()
}

/// p = 2 (intercept and slope), Vb = diag(0.01, 0.01), three query rows.
fn three_row_scenario() -> (StubModel, QueryTable) {
    let model = StubModel::new(
        array![1.0, 1.5, 2.0],
        array![[1.0, 0.0], [1.0, 5.0], [1.0, 10.0]],
        Array2::from_diag(&array![0.01, 0.01]),
    );
    (model, age_query(3))
}

#[test]
fn three_row_scenario_critical_value_and_bounds() {
    let (model, query) = three_row_scenario();
    let options = BandOptions::default();
    let result = estimate_simultaneous_band_seeded(&model, &query, &options, 42).unwrap();

    // Row 0 has se = 0.1, so the fixed multiplier of 2 gives 1 +/- 0.2.
    assert!((result.upper_pointwise[0] - 1.2).abs() < 1e-12);
    assert!((result.lower_pointwise[0] - 0.8).abs() < 1e-12);

    // Standard range for a 3-row max-statistic at the 95% level.
    assert!(
        result.critical_value > 2.0 && result.critical_value < 2.6,
        "critical value {} outside [2.0, 2.6]",
        result.critical_value
    );

    for i in 0..result.n_rows() {
        assert!(result.lower_pointwise[i] <= result.fit[i]);
        assert!(result.fit[i] <= result.upper_pointwise[i]);
        assert!(result.lower_simultaneous[i] <= result.fit[i]);
        assert!(result.fit[i] <= result.upper_simultaneous[i]);
        let pointwise_width = result.upper_pointwise[i] - result.lower_pointwise[i];
        let simultaneous_width = result.upper_simultaneous[i] - result.lower_simultaneous[i];
        assert!(simultaneous_width >= pointwise_width);
    }
}

#[test]
fn single_row_critical_value_approximates_normal_quantile() {
    // With one query row the max-statistic is a single |N(0,1)|, so the
    // critical value collapses to the two-sided normal quantile.
    let model = StubModel::new(array![0.0], array![[1.0]], array![[1.0]]);
    let query = age_query(1);
    let options = BandOptions {
        n_reps: 20_000,
        ..BandOptions::default()
    };
    let result = estimate_simultaneous_band_seeded(&model, &query, &options, 9).unwrap();
    assert!(
        result.critical_value > 1.90 && result.critical_value < 2.03,
        "single-row critical value {} not near 1.96",
        result.critical_value
    );
}

#[test]
fn fixed_seed_reproduces_identical_critical_value() {
    let (model, query) = three_row_scenario();
    let options = BandOptions::default();
    let first = estimate_simultaneous_band_seeded(&model, &query, &options, 1234).unwrap();
    let second = estimate_simultaneous_band_seeded(&model, &query, &options, 1234).unwrap();
    assert_eq!(first.critical_value, second.critical_value);
    assert_eq!(first.upper_simultaneous, second.upper_simultaneous);
}

#[test]
fn critical_value_spread_shrinks_with_more_replicates() {
    let (model, query) = three_row_scenario();

    let spread = |n_reps: usize| -> f64 {
        let crits: Vec<f64> = (0..10u64)
            .map(|seed| {
                let options = BandOptions {
                    n_reps,
                    ..BandOptions::default()
                };
                estimate_simultaneous_band_seeded(&model, &query, &options, seed)
                    .unwrap()
                    .critical_value
            })
            .collect();
        let mean = crits.iter().sum::<f64>() / crits.len() as f64;
        let var = crits.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>()
            / (crits.len() - 1) as f64;
        var.sqrt()
    };

    let coarse = spread(2_000);
    let fine = spread(20_000);
    assert!(coarse < 0.12, "spread at 2000 replicates too large: {coarse}");
    assert!(fine < 0.05, "spread at 20000 replicates too large: {fine}");
    assert!(fine < coarse, "spread did not shrink: {coarse} -> {fine}");
}

#[test]
fn zero_standard_error_raises_numeric_overflow() {
    let mut model = StubModel::new(
        array![1.0, 2.0],
        array![[1.0, 0.0], [1.0, 1.0]],
        Array2::from_diag(&array![0.01, 0.01]),
    );
    model.se_override = Some(array![0.1, 0.0]);
    let query = age_query(2);
    let err =
        estimate_simultaneous_band_seeded(&model, &query, &BandOptions::default(), 3).unwrap_err();
    match err {
        BandError::NumericOverflow { row, value } => {
            assert_eq!(row, 1);
            assert_eq!(value, 0.0);
        }
        other => panic!("expected NumericOverflow, got {other}"),
    }
}

#[test]
fn invalid_replicate_count_and_confidence_are_rejected() {
    let (model, query) = three_row_scenario();

    let zero_reps = BandOptions {
        n_reps: 0,
        ..BandOptions::default()
    };
    assert!(matches!(
        estimate_simultaneous_band_seeded(&model, &query, &zero_reps, 0),
        Err(BandError::InvalidParameter(_))
    ));

    for confidence in [0.0, 1.0, -0.5, f64::NAN] {
        let options = BandOptions {
            confidence,
            ..BandOptions::default()
        };
        assert!(matches!(
            estimate_simultaneous_band_seeded(&model, &query, &options, 0),
            Err(BandError::InvalidParameter(_))
        ));
    }
}

#[test]
fn indefinite_covariance_is_rejected() {
    let model = StubModel::new(
        array![1.0, 2.0],
        array![[1.0, 0.0], [1.0, 1.0]],
        array![[1.0, 2.0], [2.0, 1.0]], // eigenvalues 3 and -1
    );
    let query = age_query(2);
    let err =
        estimate_simultaneous_band_seeded(&model, &query, &BandOptions::default(), 5).unwrap_err();
    assert!(matches!(err, BandError::InvalidCovariance(_)));
}

#[test]
fn query_missing_model_covariate_is_a_schema_mismatch() {
    let (model, _) = three_row_scenario();
    let wrong = QueryTable::new(vec![("dose".to_string(), array![1.0, 2.0, 3.0])]).unwrap();
    let err =
        estimate_simultaneous_band_seeded(&model, &wrong, &BandOptions::default(), 0).unwrap_err();
    match err {
        BandError::SchemaMismatch { expected, found } => {
            assert_eq!(expected, vec!["age".to_string()]);
            assert_eq!(found, vec!["dose".to_string()]);
        }
        other => panic!("expected SchemaMismatch, got {other}"),
    }
}

#[test]
fn from_confidence_pointwise_multiplier_uses_normal_quantile() {
    let (model, query) = three_row_scenario();
    let options = BandOptions {
        pointwise: PointwiseMultiplier::FromConfidence,
        ..BandOptions::default()
    };
    let result = estimate_simultaneous_band_seeded(&model, &query, &options, 17).unwrap();
    assert!((result.pointwise_z - 1.959_964).abs() < 1e-4);
    // Fixed(2.0) bands are slightly wider than the exact 95% pointwise band.
    assert!(result.upper_pointwise[0] < 1.2);
}
