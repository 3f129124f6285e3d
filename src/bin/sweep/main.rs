// DOFT Phase-1 Sweep Runner
// Parallel (a, tau) x seed sweep with per-run JSON and per-window JSONL output
//
// Usage:
//   cargo run --release --bin sweep                           # Default Phase-1 grid (see below)
//   cargo run --release --bin sweep -- --boundary reflective  # Change edge behaviour
//   cargo run --release --bin sweep -- --jobs 4 --out runs    # Limit workers
//   cargo run --release --bin sweep -- --config plan.json     # Custom points/seeds
//   cargo run --release --bin sweep -- --grid-size 32 --max-history-mib 4096  # Smaller lattice
//
// On the 100x100 grid the step size collapses over the default horizons and
// the delay history outgrows the 1 GiB per-run ceiling; those runs fail with
// HistoryTooLarge. Raise --max-history-mib or shorten --pulse-horizon and
// --lpc-horizon.

mod report;
mod sweep;

use clap::Parser;
use doft_lattice::BoundaryMode;
use report::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use sweep::{SweepPlan, TaskResult};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum SweepError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sweep plan: {0}")]
    Plan(#[from] serde_json::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

// ─── CLI ────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "sweep", about = "Run the DOFT Phase-1 lattice sweep")]
struct Cli {
    /// Boundary condition for lattice interactions
    #[arg(long)]
    boundary: Option<BoundaryMode>,

    /// JSON sweep plan; missing fields take the Phase-1 defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    grid_size: Option<usize>,

    #[arg(long)]
    gamma: Option<f64>,

    /// Comma-separated seeds
    #[arg(long, value_delimiter = ',')]
    seeds: Option<Vec<u64>>,

    #[arg(long)]
    pulse_horizon: Option<usize>,

    #[arg(long)]
    lpc_horizon: Option<usize>,

    /// Per-run delay history ceiling in MiB
    #[arg(long)]
    max_history_mib: Option<u64>,

    /// Worker threads (default: all cores)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Parent directory of the run directory
    #[arg(long, default_value = "runs")]
    out: PathBuf,
}

impl Cli {
    fn plan(&self) -> Result<SweepPlan, SweepError> {
        let mut plan = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => SweepPlan::default(),
        };
        if let Some(boundary) = self.boundary {
            plan.boundary = boundary;
        }
        if let Some(grid_size) = self.grid_size {
            plan.grid_size = grid_size;
        }
        if let Some(gamma) = self.gamma {
            plan.gamma = gamma;
        }
        if let Some(seeds) = &self.seeds {
            plan.seeds = seeds.clone();
        }
        if let Some(h) = self.pulse_horizon {
            plan.pulse_horizon = h;
        }
        if let Some(h) = self.lpc_horizon {
            plan.lpc_horizon = h;
        }
        if let Some(mib) = self.max_history_mib {
            plan.max_history_bytes = mib.saturating_mul(1 << 20);
        }
        Ok(plan)
    }
}

// ─── Aggregation ────────────────────────────────────────────────────────────

fn summarise(plan: &SweepPlan, results: &[TaskResult]) -> Vec<PointSummary> {
    plan.points
        .iter()
        .map(|point| {
            let at_point: Vec<&TaskResult> = results.iter().filter(|r| r.task.point == *point).collect();
            let completed: Vec<_> = at_point.iter().filter_map(|r| r.output.as_ref().ok()).collect();
            let sample = |key: &str| -> Vec<f64> {
                completed.iter().filter_map(|o| o.metrics.get(key).copied()).collect()
            };
            PointSummary {
                param_group: point.group.clone(),
                a_mean: point.a,
                tau_mean: point.tau,
                n_runs: at_point.len(),
                n_failed: at_point.len() - completed.len(),
                ceff_pulse: Stats::from_samples(&sample("ceff_pulse")),
                lpc_ok_frac: Stats::from_samples(&sample("lpc_ok_frac")),
            }
        })
        .collect()
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn run(cli: Cli) -> Result<usize, SweepError> {
    let plan = cli.plan()?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let run_directory = format!("phase1_run_{stamp}");
    let output_dir = cli.out.join(&run_directory);
    std::fs::create_dir_all(&output_dir)?;

    let tasks = plan.tasks(stamp);
    info!(
        points = plan.points.len(),
        seeds = plan.seeds.len(),
        runs = tasks.len(),
        boundary = %plan.boundary,
        out = %output_dir.display(),
        "starting DOFT Phase-1 sweep"
    );

    let suite_start = Instant::now();
    let results = sweep::execute(tasks, cli.jobs)?;

    let mut rows = Vec::new();
    let mut blocks = Vec::new();
    let mut failed = 0;
    for result in &results {
        match &result.output {
            Ok(output) => {
                rows.push(RunRow {
                    run_id: result.task.run_id.clone(),
                    seed: result.task.seed,
                    a_mean: result.task.point.a,
                    tau_mean: result.task.point.tau,
                    gamma: plan.gamma,
                    param_group: result.task.point.group.clone(),
                    boundary: plan.boundary.to_string(),
                    elapsed_ms: result.elapsed_ms,
                    metrics: output.metrics.clone(),
                });
                blocks.extend(output.blocks.iter().map(|block| BlockRow {
                    run_id: result.task.run_id.clone(),
                    block: block.clone(),
                }));
            }
            Err(_) => failed += 1,
        }
    }

    write_json(&output_dir.join("runs.json"), &rows)?;
    info!(rows = rows.len(), "wrote runs.json");
    if blocks.is_empty() {
        warn!("no window data generated; blocks.jsonl left empty");
    }
    write_jsonl(&output_dir.join("blocks.jsonl"), &blocks)?;
    info!(rows = blocks.len(), "wrote blocks.jsonl");

    let meta = RunMeta {
        run_directory,
        timestamp_ms: stamp,
        total_runs_in_sweep: results.len(),
        failed_runs: failed,
        simulation_points: plan.points.iter().map(|p| (p.a, p.tau)).collect(),
        seeds_used: plan.seeds.clone(),
        fixed_params: FixedParams {
            gamma: plan.gamma,
            grid_size: plan.grid_size,
            boundary: plan.boundary.to_string(),
        },
        stability_params: StabilityParams {
            dt_logic: "min(0.02, 0.1, tau_nondim/50, 0.1/(gamma_nondim + |a_nondim| + 1))",
            a_ref: plan.a_ref,
            tau_ref: plan.tau_ref,
            delay_interpolation: true,
        },
        code_version: code_version(),
        front_thresholds: doft_lattice::pulse::THRESHOLD_MULTIPLES,
        point_summaries: summarise(&plan, &results),
    };
    write_json(&output_dir.join("run_meta.json"), &meta)?;

    info!(
        runs = results.len(),
        failed,
        elapsed_s = suite_start.elapsed().as_secs_f64(),
        "sweep finished"
    );
    Ok(failed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match run(Cli::parse()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "sweep completed with failed runs");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
