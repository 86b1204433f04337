//! Empirical and normal quantiles used for band calibration.

/// Hyndman & Fan type 8 empirical quantile.
///
/// This is the "mixture" piecewise-linear estimator with plotting position
/// h = (n + 1/3) p + 1/3, recommended as approximately median-unbiased
/// regardless of distribution. The choice matters in the low-order digits of
/// the simultaneous critical value, so it is fixed here rather than left to
/// the default linear-interpolation variant.
///
/// `values` must be non-empty with `p` in [0, 1]; the slice is sorted in
/// place.
pub fn empirical_quantile_type8(values: &mut [f64], p: f64) -> Result<f64, String> {
    if values.is_empty() {
        return Err("quantile of an empty sample".to_string());
    }
    if !((0.0..=1.0).contains(&p)) {
        return Err(format!("empirical quantile requires p in [0,1], got {p}"));
    }

    values.sort_unstable_by(f64::total_cmp);
    let n = values.len();
    if n == 1 {
        return Ok(values[0]);
    }

    let h = (n as f64 + 1.0 / 3.0) * p + 1.0 / 3.0;
    if h <= 1.0 {
        return Ok(values[0]);
    }
    if h >= n as f64 {
        return Ok(values[n - 1]);
    }
    let floor = h.floor();
    let lower = values[floor as usize - 1];
    let upper = values[floor as usize];
    Ok(lower + (h - floor) * (upper - lower))
}

/// Quantile of the standard normal distribution via Acklam's rational
/// approximation (relative error below 1.15e-9 over (0, 1)).
pub fn standard_normal_quantile(p: f64) -> Result<f64, String> {
    if !(p.is_finite() && p > 0.0 && p < 1.0) {
        return Err(format!("normal quantile requires p in (0,1), got {p}"));
    }

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    Ok(x)
}
