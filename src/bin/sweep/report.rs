// Sweep Report Types
// Structured run/window output for independent analysis

use doft_lattice::{BlockRecord, Metrics};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

// ─── Statistics (per-point aggregation over seeds) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let half_width = 1.96 * std_dev / (n as f64).sqrt();
        Self {
            mean,
            std_dev,
            ci_lower: mean - half_width,
            ci_upper: mean + half_width,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }
}

// ─── Rows ───────────────────────────────────────────────────────────────────

/// One completed run: identifiers plus the flat metrics map.
#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub run_id: String,
    pub seed: u64,
    pub a_mean: f64,
    pub tau_mean: f64,
    pub gamma: f64,
    pub param_group: String,
    pub boundary: String,
    pub elapsed_ms: u128,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// One spectral window tagged with its run.
#[derive(Debug, Clone, Serialize)]
pub struct BlockRow {
    pub run_id: String,
    #[serde(flatten)]
    pub block: BlockRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointSummary {
    pub param_group: String,
    pub a_mean: f64,
    pub tau_mean: f64,
    pub n_runs: usize,
    pub n_failed: usize,
    pub ceff_pulse: Stats,
    pub lpc_ok_frac: Stats,
}

// ─── Run Metadata ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FixedParams {
    pub gamma: f64,
    pub grid_size: usize,
    pub boundary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StabilityParams {
    pub dt_logic: &'static str,
    pub a_ref: f64,
    pub tau_ref: f64,
    pub delay_interpolation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub run_directory: String,
    pub timestamp_ms: u128,
    pub total_runs_in_sweep: usize,
    pub failed_runs: usize,
    pub simulation_points: Vec<(f64, f64)>,
    pub seeds_used: Vec<u64>,
    pub fixed_params: FixedParams,
    pub stability_params: StabilityParams,
    pub code_version: String,
    pub front_thresholds: [f64; 3],
    pub point_summaries: Vec<PointSummary>,
}

/// `git rev-parse HEAD`, or `"unknown"` outside a checkout.
pub fn code_version() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|rev| !rev.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

// ─── Writers ────────────────────────────────────────────────────────────────

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
}

/// One JSON object per line.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for row in rows {
        let line = serde_json::to_string(row)?;
        writeln!(file, "{}", line)?;
    }
    file.flush()
}
