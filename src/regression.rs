// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Robust Regression

//! Theil–Sen slope estimation with Sen's confidence interval.
//!
//! The slope is the median of all pairwise slopes between points with
//! distinct abscissae. The interval ranks those slopes using the normal
//! approximation of Kendall's statistic, corrected for ties in `x` and `y`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Slope estimate with its confidence bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TheilSenFit {
    pub slope: f64,
    pub intercept: f64,
    pub lo_slope: f64,
    pub hi_slope: f64,
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

fn median(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    median_sorted(&v)
}

/// Sum of `t(t-1)(2t+5)` over every group of tied values.
fn tie_correction(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mut total = 0.0;
    let mut run = 1usize;
    for i in 1..=v.len() {
        if i < v.len() && v[i] == v[i - 1] {
            run += 1;
            continue;
        }
        if run > 1 {
            let t = run as f64;
            total += t * (t - 1.0) * (2.0 * t + 5.0);
        }
        run = 1;
    }
    total
}

/// Fit `y ≈ intercept + slope * x`.
///
/// `confidence` is the two-sided coverage (e.g. 0.95). Returns `None` when
/// the inputs differ in length or no pair of points has distinct `x`.
pub fn theil_sen(x: &[f64], y: &[f64], confidence: f64) -> Option<TheilSenFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len();
    let mut slopes = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in 0..n {
            let dx = x[i] - x[j];
            if dx > 0.0 {
                slopes.push((y[i] - y[j]) / dx);
            }
        }
    }
    if slopes.is_empty() {
        return None;
    }
    slopes.sort_by(|a, b| a.total_cmp(b));

    let slope = median_sorted(&slopes);
    let intercept = median(y) - slope * median(x);

    let alpha = if confidence > 0.5 { 1.0 - confidence } else { confidence };
    let z = Normal::new(0.0, 1.0).ok()?.inverse_cdf(alpha / 2.0);

    let nf = n as f64;
    let sigsq = (nf * (nf - 1.0) * (2.0 * nf + 5.0) - tie_correction(x) - tie_correction(y)) / 18.0;
    let sigma = sigsq.max(0.0).sqrt();
    let nt = slopes.len() as f64;
    let last = slopes.len() as i64 - 1;
    let upper = (((nt - z * sigma) / 2.0).round_ties_even() as i64).min(last);
    let lower = ((((nt + z * sigma) / 2.0).round_ties_even() as i64) - 1).max(0);

    Some(TheilSenFit {
        slope,
        intercept,
        lo_slope: slopes[lower.clamp(0, last) as usize],
        hi_slope: slopes[upper.clamp(0, last) as usize],
    })
}
