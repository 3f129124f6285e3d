// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Spectral Drift

//! Loss-of-predictive-complexity metric.
//!
//! The centre cell of a noise-seeded lattice is recorded every step. Its
//! series is cut into overlapping windows, each window is scored by its
//! spectral entropy, and the metric is the share of consecutive valid
//! windows whose entropy did not rise.

use rand_distr::Normal;
use tracing::{debug, warn};

use crate::model::DoftModel;
use crate::spectral::spectral_entropy;
use crate::stepper::ModelError;
use crate::types::{BlockRecord, LpcMetrics};

/// Standard deviation of the broadband noise seeded into `q`.
pub const LPC_NOISE_STD: f64 = 0.1;

/// Score every window of `series` and summarise the entropy drift.
///
/// Windows holding a non-finite sample are recorded as skipped with NaN
/// metric and delta, and do not move the "previous valid window" reference.
/// The first valid window has a delta of zero and is not counted as a pair.
pub fn analyze_windows(series: &[f64], window: usize, overlap: usize) -> (LpcMetrics, Vec<BlockRecord>) {
    let hop = window.saturating_sub(overlap).max(1);
    if window == 0 || series.len() < window {
        return (LpcMetrics::default(), Vec::new());
    }

    let num_windows = (series.len() - window) / hop + 1;
    let mut blocks = Vec::with_capacity(num_windows);
    let mut last_valid: Option<f64> = None;
    let mut metrics = LpcMetrics::default();
    let mut non_increasing = 0usize;

    for window_id in 0..num_windows {
        let start = window_id * hop;
        let data = &series[start..start + window];
        if !data.iter().all(|v| v.is_finite()) {
            metrics.block_skipped += 1;
            blocks.push(BlockRecord {
                window_id,
                k_metric: f64::NAN,
                delta_k: f64::NAN,
                block_skipped: 1,
            });
            continue;
        }

        let k = spectral_entropy(data);
        let delta = match last_valid {
            Some(prev) => {
                let d = k - prev;
                if d <= 0.0 {
                    non_increasing += 1;
                } else {
                    metrics.lpc_vcount += 1;
                }
                d
            }
            None => 0.0,
        };
        blocks.push(BlockRecord {
            window_id,
            k_metric: k,
            delta_k: delta,
            block_skipped: 0,
        });
        metrics.lpc_windows_analyzed += 1;
        last_valid = Some(k);
    }

    if metrics.lpc_windows_analyzed > 1 {
        metrics.lpc_ok_frac = non_increasing as f64 / (metrics.lpc_windows_analyzed - 1) as f64;
    }
    (metrics, blocks)
}

impl DoftModel {
    /// Run the spectral-drift experiment for `n_steps` indices.
    pub fn lpc_metrics(&mut self, n_steps: usize) -> Result<(LpcMetrics, Vec<BlockRecord>), ModelError> {
        self.reset_fields();
        let noise = Normal::new(0.0, LPC_NOISE_STD).map_err(|_| ModelError::InvalidNoise(LPC_NOISE_STD))?;
        self.lattice.fill_noise(&mut self.rng, &noise);
        self.rebaseline();

        let c = self.lattice.center();
        let mut series = Vec::with_capacity(n_steps);
        for index in 0..n_steps {
            self.step(index)?;
            series.push(self.lattice.q[[c, c]]);
        }

        let non_finite = series.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            warn!(non_finite, "non-finite values detected in centre time series");
        }

        let (metrics, blocks) = analyze_windows(&series, self.config.lpc_window, self.config.lpc_overlap);
        debug!(
            n_steps,
            windows = blocks.len(),
            analyzed = metrics.lpc_windows_analyzed,
            skipped = metrics.block_skipped,
            ok_frac = metrics.lpc_ok_frac,
            "spectral drift computed"
        );
        Ok((metrics, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::Distribution;

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).expect("test: valid normal");
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn tone(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 16.0).sin())
            .collect()
    }

    #[test]
    fn series_shorter_than_window_yields_nothing() {
        let (m, blocks) = analyze_windows(&[0.0; 100], 128, 64);
        assert_eq!(m, LpcMetrics::default());
        assert!(blocks.is_empty());
    }

    #[test]
    fn window_count_follows_hop() {
        let (m, blocks) = analyze_windows(&white_noise(7000, 1), 4096, 2048);
        assert_eq!(blocks.len(), 2);
        assert_eq!(m.lpc_windows_analyzed, 2);
        assert_eq!(blocks[0].delta_k, 0.0);
        assert_eq!(blocks[1].window_id, 1);
    }

    #[test]
    fn decaying_complexity_is_all_ok() {
        let mut series = white_noise(256, 2);
        series.extend(tone(256));
        let (m, blocks) = analyze_windows(&series, 256, 128);
        assert_eq!(blocks.len(), 3);
        assert_eq!(m.lpc_ok_frac, 1.0);
        assert_eq!(m.lpc_vcount, 0);
        assert!(blocks[2].k_metric < blocks[0].k_metric);
    }

    #[test]
    fn rising_complexity_is_counted() {
        let mut series = tone(256);
        series.extend(white_noise(256, 3));
        let (m, _) = analyze_windows(&series, 256, 128);
        assert_eq!(m.lpc_ok_frac, 0.0);
        assert_eq!(m.lpc_vcount, 2);
    }

    #[test]
    fn non_finite_window_is_skipped() {
        let mut series = white_noise(512, 4);
        series[300] = f64::NAN;
        let (m, blocks) = analyze_windows(&series, 128, 64);
        // windows 3 and 4 cover sample 300
        let skipped: Vec<usize> = blocks.iter().filter(|b| b.is_skipped()).map(|b| b.window_id).collect();
        assert_eq!(skipped, vec![3, 4]);
        assert_eq!(m.block_skipped, 2);
        assert_eq!(m.lpc_windows_analyzed, blocks.len() - 2);
        assert!(blocks[3].k_metric.is_nan() && blocks[3].delta_k.is_nan());
        assert_eq!(
            blocks[5].delta_k,
            blocks[5].k_metric - blocks[2].k_metric,
            "delta is taken against the last valid window"
        );
    }

    #[test]
    fn single_valid_window_reports_zero() {
        let mut series = white_noise(192, 5);
        series[10] = f64::INFINITY;
        let (m, _) = analyze_windows(&series, 128, 64);
        assert_eq!(m.block_skipped, 1);
        assert_eq!(m.lpc_windows_analyzed, 1);
        assert_eq!(m.lpc_ok_frac, 0.0);
    }

    #[test]
    fn extractor_records_centre_series() {
        let mut cfg = ModelConfig::new(8, 1.0, 1.0, 0.1, 9);
        cfg.lpc_window = 64;
        cfg.lpc_overlap = 32;
        let mut m = DoftModel::new(cfg).expect("test: valid config");
        let (metrics, blocks) = m.lpc_metrics(200).expect("test: lpc run");
        assert_eq!(blocks.len(), 5);
        assert_eq!(metrics.block_skipped, 0);
        assert_eq!(metrics.lpc_windows_analyzed, 5);
        assert!((0.0..=1.0).contains(&metrics.lpc_ok_frac));
        assert!(blocks.iter().all(|b| (0.0..=1.0).contains(&b.k_metric)));
    }
}
