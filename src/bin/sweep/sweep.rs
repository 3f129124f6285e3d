// Sweep Plan and Parallel Execution
// Each run is an independent model instance; workers share only the plan.

use doft_lattice::{BoundaryMode, DoftModel, ModelConfig, ModelError, RunOutput};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

// ─── Plan ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub group: String,
    pub a: f64,
    pub tau: f64,
}

impl SweepPoint {
    fn new(group: &str, a: f64, tau: f64) -> Self {
        Self { group: group.to_string(), a, tau }
    }
}

/// Parameter grid, seeds and fixed parameters of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepPlan {
    pub points: Vec<SweepPoint>,
    pub seeds: Vec<u64>,
    pub gamma: f64,
    pub grid_size: usize,
    pub a_ref: f64,
    pub tau_ref: f64,
    pub boundary: BoundaryMode,
    pub pulse_horizon: usize,
    pub lpc_horizon: usize,
    /// Per-run ceiling on the delay history arena.
    pub max_history_bytes: u64,
}

impl Default for SweepPlan {
    /// Phase-1 grid: equal growth (g1), coupling only (g2), delay only (g3).
    fn default() -> Self {
        let model = ModelConfig::default();
        Self {
            points: vec![
                SweepPoint::new("g1", 1.0, 1.0),
                SweepPoint::new("g1", 1.2, 1.2),
                SweepPoint::new("g1", 1.5, 1.5),
                SweepPoint::new("g2", 1.0, 1.0),
                SweepPoint::new("g2", 1.2, 1.0),
                SweepPoint::new("g2", 1.5, 1.0),
                SweepPoint::new("g3", 1.0, 1.0),
                SweepPoint::new("g3", 1.0, 0.8),
                SweepPoint::new("g3", 1.0, 0.67),
            ],
            seeds: vec![42, 123, 456, 789, 1011],
            gamma: model.damping,
            grid_size: model.grid_size,
            a_ref: 1.0,
            tau_ref: 1.0,
            boundary: BoundaryMode::Periodic,
            pulse_horizon: model.pulse_horizon,
            lpc_horizon: model.lpc_horizon,
            max_history_bytes: model.max_history_bytes,
        }
    }
}

// ─── Tasks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunTask {
    pub run_id: String,
    pub point: SweepPoint,
    pub seed: u64,
    pub config: ModelConfig,
}

impl SweepPlan {
    /// Expand into one task per (point, seed), in plan order.
    pub fn tasks(&self, stamp: u128) -> Vec<RunTask> {
        let mut tasks = Vec::with_capacity(self.points.len() * self.seeds.len());
        for point in &self.points {
            for &seed in &self.seeds {
                let mut config = ModelConfig::new(self.grid_size, point.a, point.tau, self.gamma, seed)
                    .with_refs(self.a_ref, self.tau_ref)
                    .with_boundary(self.boundary);
                config.pulse_horizon = self.pulse_horizon;
                config.lpc_horizon = self.lpc_horizon;
                config.max_history_bytes = self.max_history_bytes;
                tasks.push(RunTask {
                    run_id: format!("run_{}_{}", stamp, tasks.len() + 1),
                    point: point.clone(),
                    seed,
                    config,
                });
            }
        }
        tasks
    }
}

/// Build and run one model.
pub fn run_single(task: &RunTask) -> Result<RunOutput, ModelError> {
    let mut model = DoftModel::new(task.config.clone())?;
    model.run()
}

pub struct TaskResult {
    pub task: RunTask,
    pub output: Result<RunOutput, ModelError>,
    pub elapsed_ms: u128,
}

fn metric(output: &RunOutput, key: &str) -> f64 {
    output.metrics.get(key).copied().unwrap_or(f64::NAN)
}

/// Run every task on a pool of `jobs` workers (all cores when `None`).
pub fn execute(tasks: Vec<RunTask>, jobs: Option<usize>) -> Result<Vec<TaskResult>, rayon::ThreadPoolBuildError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;
    let total = tasks.len();

    Ok(pool.install(|| {
        tasks
            .into_par_iter()
            .map(|task| {
                let start = Instant::now();
                let output = run_single(&task);
                let elapsed_ms = start.elapsed().as_millis();
                match &output {
                    Ok(out) => info!(
                        run_id = %task.run_id,
                        a = task.point.a,
                        tau = task.point.tau,
                        seed = task.seed,
                        elapsed_ms,
                        "C-1: ceff_pulse={} ceff_pulse_ic95_lo={} ceff_pulse_ic95_hi={} \
                         C-2: var_c_over_c2={} anisotropy_max_pct={} \
                         C-3: lpc_ok_frac={} lpc_vcount={}",
                        metric(out, "ceff_pulse"),
                        metric(out, "ceff_pulse_ic95_lo"),
                        metric(out, "ceff_pulse_ic95_hi"),
                        metric(out, "var_c_over_c2"),
                        metric(out, "anisotropy_max_pct"),
                        metric(out, "lpc_ok_frac"),
                        metric(out, "lpc_vcount"),
                    ),
                    Err(err) => error!(
                        run_id = %task.run_id,
                        seed = task.seed,
                        total,
                        "run failed: {err}"
                    ),
                }
                TaskResult { task, output, elapsed_ms }
            })
            .collect()
    }))
}
