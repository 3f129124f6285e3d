// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Pulse Front Speed

//! Wave-front speed extraction.
//!
//! A Gaussian bump is dropped on the (optionally noisy) lattice and the
//! furthest radius at which `q` exceeds a noise-relative threshold is tracked
//! along 16 rays. Each ray's `(time, radius)` series is fitted with a
//! Theil–Sen slope and the per-ray speeds are aggregated into a mean speed,
//! its confidence band and two anisotropy measures.

use ndarray::Array2;
use rand_distr::Normal;
use tracing::debug;

use crate::model::DoftModel;
use crate::regression::{theil_sen, TheilSenFit};
use crate::stepper::ModelError;
use crate::types::PulseMetrics;

pub const NUM_RAYS: usize = 16;
/// Detection thresholds as multiples of the noise floor.
pub const THRESHOLD_MULTIPLES: [f64; 3] = [1.0, 3.0, 5.0];
/// Index into [`THRESHOLD_MULTIPLES`] whose fits produce the headline speed.
pub const PRIMARY_THRESHOLD: usize = 1;
/// Detections a ray needs before it is fitted.
pub const MIN_DETECTIONS: usize = 10;
pub const FIT_CONFIDENCE: f64 = 0.95;
/// Lower bound on the noise floor.
pub const XI_MIN: f64 = 1e-12;

// Rays used for the per-direction speeds.
const RAY_X: usize = 0;
const RAY_Z: usize = NUM_RAYS / 8;
const RAY_Y: usize = NUM_RAYS / 4;
const RAY_DIAG: usize = 3 * NUM_RAYS / 8;

// ─── Front Tracker ──────────────────────────────────────────────────────────

/// Per-ray, per-threshold record of the furthest radius above threshold.
#[derive(Debug, Clone)]
pub struct FrontTracker {
    center: usize,
    directions: Vec<(f64, f64)>,
    thresholds: [f64; 3],
    max_radius: Vec<[usize; 3]>,
    detections: Vec<[Vec<(f64, f64)>; 3]>,
}

impl FrontTracker {
    pub fn new(center: usize, xi_floor: f64) -> Self {
        let directions = (0..NUM_RAYS)
            .map(|i| {
                let theta = 2.0 * std::f64::consts::PI * i as f64 / NUM_RAYS as f64;
                (theta.cos(), theta.sin())
            })
            .collect();
        Self {
            center,
            directions,
            thresholds: THRESHOLD_MULTIPLES.map(|m| m * xi_floor),
            max_radius: vec![[0; 3]; NUM_RAYS],
            detections: vec![Default::default(); NUM_RAYS],
        }
    }

    pub fn thresholds(&self) -> [f64; 3] {
        self.thresholds
    }

    /// Scan every ray from its current maximum outwards and record
    /// `(t, radius)` wherever the maximum advanced.
    pub fn observe(&mut self, q: &Array2<f64>, t: f64) {
        let c = self.center as f64;
        for (ray, &(cos_t, sin_t)) in self.directions.iter().enumerate() {
            for (k, &thr) in self.thresholds.iter().enumerate() {
                let previous = self.max_radius[ray][k];
                let mut furthest = previous;
                for r in previous..self.center {
                    let px = (c + r as f64 * cos_t) as usize;
                    let py = (c + r as f64 * sin_t) as usize;
                    if q.get([py, px]).is_some_and(|&v| v > thr) {
                        furthest = r;
                    }
                }
                if furthest > previous {
                    self.max_radius[ray][k] = furthest;
                    self.detections[ray][k].push((t, furthest as f64));
                }
            }
        }
    }

    pub fn detections(&self, ray: usize, threshold: usize) -> &[(f64, f64)] {
        &self.detections[ray][threshold]
    }

    /// Theil–Sen fit of every ray at one threshold; `None` for rays with too
    /// few detections.
    pub fn fits(&self, threshold: usize) -> Vec<Option<TheilSenFit>> {
        self.detections
            .iter()
            .map(|per_threshold| {
                let series = &per_threshold[threshold];
                if series.len() < MIN_DETECTIONS {
                    return None;
                }
                let (times, radii): (Vec<f64>, Vec<f64>) = series.iter().copied().unzip();
                theil_sen(&times, &radii, FIT_CONFIDENCE)
            })
            .collect()
    }
}

// ─── Aggregation ────────────────────────────────────────────────────────────

fn mean_slope(fits: &[Option<TheilSenFit>]) -> f64 {
    let slopes: Vec<f64> = fits.iter().flatten().map(|f| f.slope).collect();
    if slopes.is_empty() {
        0.0
    } else {
        slopes.iter().sum::<f64>() / slopes.len() as f64
    }
}

/// Fold per-ray fits into the reported pulse statistics.
///
/// `fits` holds one entry per threshold multiple, each with one entry per ray.
pub fn aggregate(xi_floor: f64, fits: &[Vec<Option<TheilSenFit>>; 3]) -> PulseMetrics {
    let primary = &fits[PRIMARY_THRESHOLD];
    let fitted: Vec<&TheilSenFit> = primary.iter().flatten().collect();
    if fitted.is_empty() {
        return PulseMetrics {
            ceff_pulse_1xi: mean_slope(&fits[0]),
            ceff_pulse_5xi: mean_slope(&fits[2]),
            ..PulseMetrics::degenerate(xi_floor)
        };
    }

    let count = fitted.len() as f64;
    let mean_c = fitted.iter().map(|f| f.slope).sum::<f64>() / count;
    let var_c = fitted.iter().map(|f| (f.slope - mean_c).powi(2)).sum::<f64>() / count;
    let max_dev = fitted
        .iter()
        .map(|f| (f.slope - mean_c).abs())
        .fold(0.0, f64::max);
    let (var_c_over_c2, anisotropy_max_pct) = if mean_c > 0.0 {
        (var_c / (mean_c * mean_c), max_dev / mean_c * 100.0)
    } else {
        (1.0, 100.0)
    };
    let axis = |ray: usize| primary[ray].map_or(0.0, |f| f.slope);

    PulseMetrics {
        xi_floor,
        ceff_pulse: mean_c,
        ceff_pulse_ic95_lo: fitted.iter().map(|f| f.lo_slope).sum::<f64>() / count,
        ceff_pulse_ic95_hi: fitted.iter().map(|f| f.hi_slope).sum::<f64>() / count,
        anisotropy_max_pct,
        var_c_over_c2,
        ceff_iso_x: axis(RAY_X),
        ceff_iso_y: axis(RAY_Y),
        ceff_iso_z: axis(RAY_Z),
        ceff_iso_diag: axis(RAY_DIAG),
        ceff_pulse_1xi: mean_slope(&fits[0]),
        ceff_pulse_5xi: mean_slope(&fits[2]),
        pulse_rays_fitted: fitted.len(),
    }
}

// ─── Extractor ──────────────────────────────────────────────────────────────

impl DoftModel {
    /// Run the pulse experiment for `n_steps` indices.
    ///
    /// `noise_std > 0` adds Gaussian noise to `q` before the pulse; the
    /// resulting spread sets the detection thresholds.
    pub fn pulse_metrics(&mut self, n_steps: usize, noise_std: f64) -> Result<PulseMetrics, ModelError> {
        if !noise_std.is_finite() || noise_std < 0.0 {
            return Err(ModelError::InvalidNoise(noise_std));
        }

        self.reset_fields();
        if noise_std > 0.0 {
            let noise = Normal::new(0.0, noise_std).map_err(|_| ModelError::InvalidNoise(noise_std))?;
            self.lattice.add_noise(&mut self.rng, &noise);
        }
        let xi_floor = self.lattice.q_std().max(XI_MIN);
        self.lattice.add_pulse();
        self.rebaseline();

        let mut tracker = FrontTracker::new(self.lattice.center(), xi_floor);
        for index in 0..n_steps {
            self.step(index)?;
            tracker.observe(&self.lattice.q, index as f64 * self.dt());
        }

        let fits = [tracker.fits(0), tracker.fits(1), tracker.fits(2)];
        let metrics = aggregate(xi_floor, &fits);
        debug!(
            n_steps,
            xi_floor,
            rays = metrics.pulse_rays_fitted,
            ceff = metrics.ceff_pulse,
            "pulse metrics computed"
        );
        Ok(metrics)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    /// Square of half-width `half` around the centre set to 1.
    fn square_front(n: usize, half: usize) -> Array2<f64> {
        let c = n / 2;
        Array2::from_shape_fn((n, n), |(y, x)| {
            if y.abs_diff(c) <= half && x.abs_diff(c) <= half {
                1.0
            } else {
                0.0
            }
        })
    }

    fn fit(slope: f64) -> Option<TheilSenFit> {
        Some(TheilSenFit { slope, intercept: 0.0, lo_slope: slope - 0.1, hi_slope: slope + 0.1 })
    }

    #[test]
    fn tracker_records_only_advances() {
        let mut tracker = FrontTracker::new(8, 0.1);
        let q = square_front(16, 2);
        tracker.observe(&q, 0.0);
        tracker.observe(&q, 0.5);
        assert_eq!(tracker.detections(RAY_X, 0), &[(0.0, 2.0)]);

        tracker.observe(&square_front(16, 3), 1.0);
        assert_eq!(tracker.detections(RAY_X, 0), &[(0.0, 2.0), (1.0, 3.0)]);
        assert_eq!(tracker.detections(RAY_Y, 0), &[(0.0, 2.0), (1.0, 3.0)]);
    }

    #[test]
    fn thresholds_scale_with_noise_floor() {
        let mut tracker = FrontTracker::new(8, 0.1);
        assert_eq!(tracker.thresholds(), [0.1, 0.30000000000000004, 0.5]);

        // amplitude 0.2 clears 1xi only
        tracker.observe(&(square_front(16, 4) * 0.2), 0.0);
        assert_eq!(tracker.detections(RAY_X, 0).len(), 1);
        assert!(tracker.detections(RAY_X, 1).is_empty());
        assert!(tracker.detections(RAY_X, 2).is_empty());
    }

    #[test]
    fn steady_front_yields_its_speed() {
        let mut tracker = FrontTracker::new(32, 0.1);
        for t in 0..20 {
            tracker.observe(&square_front(64, 1 + t), t as f64 * 0.5);
        }
        let fits = tracker.fits(PRIMARY_THRESHOLD);
        let x = fits[RAY_X].expect("test: axis ray fitted");
        let y = fits[RAY_Y].expect("test: axis ray fitted");
        assert!((x.slope - 2.0).abs() < 1e-9, "x speed {}", x.slope);
        assert!((y.slope - 2.0).abs() < 1e-9, "y speed {}", y.slope);
    }

    #[test]
    fn short_series_are_not_fitted() {
        let mut tracker = FrontTracker::new(32, 0.1);
        for t in 0..(MIN_DETECTIONS - 1) {
            tracker.observe(&square_front(64, 1 + t), t as f64);
        }
        assert!(tracker.fits(PRIMARY_THRESHOLD).iter().all(Option::is_none));
    }

    #[test]
    fn no_qualifying_ray_gives_degenerate_result() {
        let none = vec![None; NUM_RAYS];
        let m = aggregate(0.25, &[none.clone(), none.clone(), none]);
        assert_eq!(m, PulseMetrics::degenerate(0.25));
    }

    #[test]
    fn isotropic_speeds_have_zero_anisotropy() {
        let all = vec![fit(2.0); NUM_RAYS];
        let m = aggregate(1e-12, &[all.clone(), all.clone(), all]);
        assert_eq!(m.ceff_pulse, 2.0);
        assert_eq!(m.var_c_over_c2, 0.0);
        assert_eq!(m.anisotropy_max_pct, 0.0);
        assert!((m.ceff_pulse_ic95_lo - 1.9).abs() < 1e-12);
        assert!((m.ceff_pulse_ic95_hi - 2.1).abs() < 1e-12);
        assert_eq!(m.pulse_rays_fitted, NUM_RAYS);
    }

    #[test]
    fn anisotropy_and_axis_speeds_use_fixed_rays() {
        let mut primary = vec![None; NUM_RAYS];
        primary[RAY_X] = fit(1.0);
        primary[RAY_Y] = fit(3.0);
        let m = aggregate(1e-12, &[vec![None; NUM_RAYS], primary, vec![None; NUM_RAYS]]);
        assert_eq!(m.ceff_pulse, 2.0);
        assert_eq!(m.anisotropy_max_pct, 50.0);
        assert_eq!(m.var_c_over_c2, 0.25);
        assert_eq!(m.ceff_iso_x, 1.0);
        assert_eq!(m.ceff_iso_y, 3.0);
        assert_eq!(m.ceff_iso_z, 0.0, "unfitted ray reports zero");
        assert_eq!(m.ceff_iso_diag, 0.0);
        assert_eq!(m.ceff_pulse_1xi, 0.0);
        assert_eq!(m.pulse_rays_fitted, 2);
    }

    #[test]
    fn small_grid_run_is_finite() {
        let mut m = DoftModel::new(ModelConfig::new(4, 1.0, 1.0, 0.1, 0)).expect("test: valid config");
        let metrics = m.pulse_metrics(50, 0.0).expect("test: pulse run");
        assert_eq!(metrics.xi_floor, XI_MIN);
        assert!(metrics.ceff_pulse.is_finite());
        assert!(metrics.ceff_pulse_ic95_lo.is_finite());
        assert!(metrics.ceff_pulse_ic95_hi.is_finite());
        assert!(metrics.ceff_iso_diag.is_finite());
    }

    #[test]
    fn noise_floor_grows_with_noise() {
        let cfg = ModelConfig::new(16, 1.0, 1.0, 0.1, 5);
        let low = DoftModel::new(cfg.clone())
            .and_then(|mut m| m.pulse_metrics(20, 0.01))
            .expect("test: pulse run");
        let high = DoftModel::new(cfg)
            .and_then(|mut m| m.pulse_metrics(20, 0.03))
            .expect("test: pulse run");
        assert!(high.xi_floor > low.xi_floor);
        assert!(low.ceff_pulse.is_finite() && high.ceff_pulse.is_finite());
    }

    #[test]
    fn invalid_noise_is_rejected() {
        let mut m = DoftModel::new(ModelConfig::new(4, 1.0, 1.0, 0.1, 0)).expect("test: valid config");
        assert_eq!(m.pulse_metrics(5, -1.0), Err(ModelError::InvalidNoise(-1.0)));
        assert!(matches!(m.pulse_metrics(5, f64::NAN), Err(ModelError::InvalidNoise(_))));
    }
}
