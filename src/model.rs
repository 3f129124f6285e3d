// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Model Core

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;

use crate::config::ModelConfig;
use crate::energy::{compute_energy, EnergyTrace};
use crate::history::{DelayHistory, HISTORY_MARGIN};
use crate::lattice::LatticeState;
use crate::stepper::{ModelError, StepSizeState};
use crate::types::{Metrics, RunOutput};

/// Step length the pulse/LPC horizons are expressed in.
pub const REFERENCE_DT: f64 = 0.1;

// ─── Nondimensional Parameters ──────────────────────────────────────────────

/// Order-one simulation parameters derived once from the raw physical ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NondimParams {
    pub coupling: f64,
    pub delay: f64,
    pub damping: f64,
}

impl NondimParams {
    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self {
            coupling: cfg.coupling / cfg.coupling_ref,
            delay: cfg.delay / cfg.delay_ref,
            damping: cfg.damping * cfg.delay_ref,
        }
    }

    /// Largest step considered stable for these parameters.
    ///
    /// `min(0.02, 0.1, tau/50, 0.1 / (gamma + |a| + 1))`, the last bound
    /// dropped when its denominator is not positive.
    pub fn safe_step(&self) -> f64 {
        let denom = self.damping + self.coupling.abs() + 1.0;
        let gamma_bound = if denom > 0.0 { 0.1 / denom } else { f64::INFINITY };
        0.02_f64.min(0.1).min(self.delay / 50.0).min(gamma_bound)
    }
}

// ─── DoftModel ──────────────────────────────────────────────────────────────

/// Delay-coupled damped lattice with its stepping state and metric extractors.
///
/// Single-threaded and stateful; independent instances share nothing.
#[wasm_bindgen]
pub struct DoftModel {
    pub(crate) config: ModelConfig,
    pub(crate) params: NondimParams,
    pub(crate) lattice: LatticeState,
    pub(crate) history: DelayHistory,
    pub(crate) step_size: StepSizeState,
    pub(crate) energy: EnergyTrace,
    pub(crate) rng: ChaCha8Rng,
}

impl DoftModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;

        let params = NondimParams::from_config(&config);
        let safe_dt = params.safe_step();
        if let Some(requested) = config.dt_nondim {
            if (requested - safe_dt).abs() > 1e-12 {
                warn!(
                    "requested dt_nondim={requested} replaced by stable dt_nondim={safe_dt}"
                );
            }
        }

        let step_size = StepSizeState::new(safe_dt, config.delay_ref, config.delay);
        let capacity = step_size.required_history() + HISTORY_MARGIN;
        config.check_history_capacity(capacity)?;

        let n = config.grid_size;
        let lattice = LatticeState::zeros(n);
        let energy = EnergyTrace::new(compute_energy(&lattice.q, &lattice.p));
        debug!(
            grid = n,
            dt_nondim = safe_dt,
            history = capacity,
            boundary = %config.boundary,
            "model constructed"
        );

        Ok(Self {
            params,
            lattice,
            history: DelayHistory::new(capacity, n, n),
            step_size,
            energy,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn params(&self) -> NondimParams {
        self.params
    }

    pub fn dt_nondim(&self) -> f64 {
        self.step_size.dt_nondim
    }

    /// Step in physical units.
    pub fn dt(&self) -> f64 {
        self.step_size.dt()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn q(&self) -> &Array2<f64> {
        &self.lattice.q
    }

    pub fn p(&self) -> &Array2<f64> {
        &self.lattice.p
    }

    pub fn energy_trace(&self) -> &EnergyTrace {
        &self.energy
    }

    /// Zero Q, P and the delay history.
    pub(crate) fn reset_fields(&mut self) {
        self.lattice.reset();
        self.history.clear();
    }

    /// Make the current lattice the energy reference of a new experiment.
    pub(crate) fn rebaseline(&mut self) {
        self.energy
            .rebaseline(compute_energy(&self.lattice.q, &self.lattice.p));
    }

    /// Run the pulse and spectral-drift experiments back to back.
    ///
    /// Both horizons are fixed up front from the current step so that a
    /// step reduction during the pulse run does not stretch the drift run.
    pub fn run(&mut self) -> Result<RunOutput, ModelError> {
        let dt = self.dt();
        let pulse_steps = horizon_steps(self.config.pulse_horizon, dt);
        let lpc_steps = horizon_steps(self.config.lpc_horizon, dt);
        debug!(pulse_steps, lpc_steps, dt, "starting run");

        let pulse = self.pulse_metrics(pulse_steps, self.config.pulse_noise_std)?;
        let (lpc, blocks) = self.lpc_metrics(lpc_steps)?;

        let mut metrics = Metrics::new();
        pulse.write_into(&mut metrics);
        lpc.write_into(&mut metrics);
        metrics.insert("dt_nondim_final".to_string(), self.dt_nondim());
        Ok(RunOutput { metrics, blocks })
    }
}

/// Steps needed to cover `horizon` reference steps at physical step `dt`.
pub fn horizon_steps(horizon: usize, dt: f64) -> usize {
    (horizon as f64 * (REFERENCE_DT / dt)) as usize
}

// ===========================================================================
// Tests
// ===========================================================================
