#![deny(dead_code)]
#![deny(unused_imports)]

//! Simultaneous confidence bands for additive regression models.
//!
//! The fitting step is external: any model exposing pointwise predictions, a
//! linear predictor matrix, and a coefficient covariance (the [`FittedModel`]
//! trait) can drive band estimation. The simultaneous band is calibrated by
//! resampling coefficient deviates from N(0, Vb) and taking an upper quantile
//! of the maximum absolute standardized deviation over the query rows.

pub mod band;
pub mod faer_ndarray;
pub mod linear;
pub mod model;
pub mod mvn;
pub mod quantile;

pub use band::{
    BandError, BandOptions, BandResult, PointwiseMultiplier, estimate_simultaneous_band,
    estimate_simultaneous_band_seeded,
};
pub use linear::LinearModel;
pub use model::{CovarianceKind, FittedModel, PointwisePrediction, QueryTable};
pub use mvn::MvnFactor;
pub use quantile::{empirical_quantile_type8, standard_normal_quantile};
