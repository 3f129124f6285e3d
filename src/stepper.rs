// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Adaptive Stepper

//! Self-stabilising integrator for the delayed, damped lattice.
//!
//! One call to [`DoftModel::step`] advances the lattice by one time index:
//!
//! ```text
//! K     = a * laplacian(Q(t - tau))
//! P_new = (P - dt*Q + dt*K) / (1 + dt*gamma)     semi-implicit damping
//! Q_new = Q + dt*P_new                           uses the updated momentum
//! ```
//!
//! A trial is accepted only when both fields are finite and the physical
//! energy did not grow beyond [`ENERGY_TOLERANCE`]. Otherwise the step size
//! is halved, the history is grown if the delay now needs more slots, and the
//! same index is retried. Once the step size would drop below the floor the
//! floor is kept and the index is abandoned with the previous state intact.
//!
//! [`ENERGY_TOLERANCE`]: crate::energy::ENERGY_TOLERANCE

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::energy::compute_energy;
use crate::history::{required_slots, HISTORY_MARGIN};
use crate::lattice::{laplacian, norm};
use crate::model::DoftModel;

/// Lower bound on the dimensionless step; halving stops here.
pub const MIN_DT_NONDIM: f64 = 1e-6;
/// Field norm above which fields and history are rescaled.
pub const OVERFLOW_THRESHOLD: f64 = 1e6;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal errors raised while building or driving a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("noise standard deviation must be finite and non-negative, got {0}")]
    InvalidNoise(f64),
}

// ---------------------------------------------------------------------------
// StepSizeState
// ---------------------------------------------------------------------------

/// Result of one halving request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Halving {
    Halved { from: f64, to: f64 },
    /// The floor was hit; `already` is true when it was hit on an earlier call.
    Floored { already: bool },
}

/// Current dimensionless step size and the quantities derived from it.
///
/// Only ever shrinks over the lifetime of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSizeState {
    pub dt_nondim: f64,
    pub min_dt_nondim: f64,
    delay_ref: f64,
    delay: f64,
}

impl StepSizeState {
    pub fn new(dt_nondim: f64, delay_ref: f64, delay: f64) -> Self {
        Self {
            dt_nondim,
            min_dt_nondim: MIN_DT_NONDIM,
            delay_ref,
            delay,
        }
    }

    /// Step in physical units.
    pub fn dt(&self) -> f64 {
        self.dt_nondim * self.delay_ref
    }

    pub fn delay_in_steps(&self) -> f64 {
        self.delay / self.dt()
    }

    /// History slots needed for the delay at the current step (no margin).
    pub fn required_history(&self) -> usize {
        required_slots(self.delay_in_steps())
    }

    pub fn at_floor(&self) -> bool {
        self.dt_nondim <= self.min_dt_nondim
    }

    pub fn halve(&mut self) -> Halving {
        let from = self.dt_nondim;
        let to = from * 0.5;
        if to < self.min_dt_nondim {
            let already = self.at_floor();
            self.dt_nondim = self.min_dt_nondim;
            return Halving::Floored { already };
        }
        self.dt_nondim = to;
        Halving::Halved { from, to }
    }
}

// ---------------------------------------------------------------------------
// Trial state machine
// ---------------------------------------------------------------------------

/// Why a trial update was thrown away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    NonFinite,
    EnergyGrowth { before: f64, after: f64 },
}

enum Trial {
    Accepted {
        q: Array2<f64>,
        p: Array2<f64>,
        energy: f64,
    },
    Rejected(Rejection),
}

/// How a time index was finally resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Committed after `attempts` trials.
    Accepted { attempts: u32 },
    /// Step floor reached; state left as it was before the index.
    Floored { attempts: u32 },
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

impl DoftModel {
    /// Advance the lattice by one time index, shrinking the step as needed.
    pub fn step(&mut self, index: usize) -> Result<StepOutcome, ModelError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            // A trial never writes Q/P; an overflow rescale changes units but
            // not the physical state, so a rejection needs no explicit rollback.
            let reason = match self.trial(index) {
                Trial::Accepted { q, p, energy } => {
                    self.lattice.q = q;
                    self.lattice.p = p;
                    self.history.record(index, &self.lattice.q);
                    self.energy.commit(energy);
                    return Ok(StepOutcome::Accepted { attempts });
                }
                Trial::Rejected(reason) => reason,
            };

            let dt_before = self.step_size.dt_nondim;
            match self.step_size.halve() {
                Halving::Halved { from, to } => {
                    match reason {
                        Rejection::NonFinite => warn!(
                            step = index,
                            "non-finite values encountered, reducing dt_nondim from {from} to {to}"
                        ),
                        Rejection::EnergyGrowth { before, after } => warn!(
                            step = index,
                            "energy increased from {before} to {after}, reducing dt_nondim from {from} to {to}"
                        ),
                    }
                    self.ensure_history(index)?;
                }
                Halving::Floored { already } => {
                    if already {
                        debug!(step = index, ?reason, "step abandoned at minimum dt_nondim");
                    } else {
                        warn!(
                            step = index,
                            ?reason,
                            "minimum dt_nondim {} reached from {dt_before}, abandoning step",
                            self.step_size.min_dt_nondim
                        );
                    }
                    self.ensure_history(index)?;
                    return Ok(StepOutcome::Floored { attempts });
                }
            }
        }
    }

    fn trial(&mut self, index: usize) -> Trial {
        let dt = self.step_size.dt_nondim;
        let delayed = self.history.lookup(index, self.step_size.delay_in_steps());
        let coupling = laplacian(&delayed, self.config.boundary);
        let a = self.params.coupling;
        let denom = 1.0 + dt * self.params.damping;

        let mut p_new = Array2::<f64>::zeros(self.lattice.q.raw_dim());
        Zip::from(&mut p_new)
            .and(&self.lattice.p)
            .and(&self.lattice.q)
            .and(&coupling)
            .for_each(|pn, &p, &q, &k| *pn = (p - dt * q + dt * a * k) / denom);
        let mut q_new = &self.lattice.q + &(&p_new * dt);

        let scale = norm(&q_new).max(norm(&p_new));
        if scale.is_finite() && scale > OVERFLOW_THRESHOLD {
            self.rescale(scale, &mut q_new, &mut p_new);
        }

        let finite = q_new.iter().chain(p_new.iter()).all(|v| v.is_finite());
        if !finite {
            return Trial::Rejected(Rejection::NonFinite);
        }

        let energy = compute_energy(&q_new, &p_new);
        if !self.energy.admits(energy) {
            return Trial::Rejected(Rejection::EnergyGrowth {
                before: self.energy.last_physical(),
                after: self.energy.physical(energy),
            });
        }

        Trial::Accepted { q: q_new, p: p_new, energy }
    }

    /// Divide trial fields, committed fields and history by `scale`.
    fn rescale(&mut self, scale: f64, q_new: &mut Array2<f64>, p_new: &mut Array2<f64>) {
        *q_new /= scale;
        *p_new /= scale;
        self.lattice.q /= scale;
        self.lattice.p /= scale;
        self.history.rescale(scale);
        self.energy.rescale(scale);
        debug!(scale, accum = self.energy.scale_accum, "overflow guard rescaled fields");
    }

    /// Grow the history when the current step needs more delay slots.
    fn ensure_history(&mut self, index: usize) -> Result<(), ModelError> {
        let required = self.step_size.required_history();
        if self.history.capacity() >= required {
            return Ok(());
        }
        let new_capacity = required + HISTORY_MARGIN;
        self.config.check_history_capacity(new_capacity)?;
        debug!(
            step = index,
            from = self.history.capacity(),
            to = new_capacity,
            "resizing delay history"
        );
        self.history.resize(new_capacity, index);
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::history::DelayHistory;
    use rand_distr::Normal;

    fn model(damping: f64) -> DoftModel {
        let cfg = ModelConfig::new(4, 1.0, 1.0, damping, 0).with_dt(0.1);
        DoftModel::new(cfg).expect("test: valid config")
    }

    fn seed_q(m: &mut DoftModel) {
        let noise = Normal::new(0.0, 0.1).expect("test: valid normal");
        m.lattice.fill_noise(&mut m.rng, &noise);
    }

    #[test]
    fn halving_stops_at_floor() {
        let mut s = StepSizeState::new(4e-6, 1.0, 1.0);
        assert_eq!(s.halve(), Halving::Halved { from: 4e-6, to: 2e-6 });
        assert_eq!(s.halve(), Halving::Halved { from: 2e-6, to: 1e-6 });
        assert_eq!(s.halve(), Halving::Floored { already: true });
        assert_eq!(s.dt_nondim, MIN_DT_NONDIM);

        let mut s = StepSizeState::new(1.5e-6, 1.0, 1.0);
        assert_eq!(s.halve(), Halving::Floored { already: false });
        assert_eq!(s.dt_nondim, MIN_DT_NONDIM);
    }

    #[test]
    fn derived_quantities_follow_step() {
        let s = StepSizeState::new(0.03125, 2.0, 1.0);
        assert_eq!(s.dt(), 0.0625);
        assert_eq!(s.delay_in_steps(), 16.0);
        assert_eq!(s.required_history(), 16);
    }

    #[test]
    fn quiescent_lattice_accepts_immediately() {
        let mut m = model(0.1);
        let outcome = m.step(0).expect("test: step");
        assert_eq!(outcome, StepOutcome::Accepted { attempts: 1 });
        assert_eq!(m.energy.energy_log, vec![0.0]);
        assert_eq!(m.step_size.dt_nondim, 0.02);
    }

    #[test]
    fn destabilising_damping_shrinks_step_and_stays_finite() {
        // Energy reference still describes the all-zero state, so every
        // trial from the noisy field counts as growth.
        let mut m = model(-10.0);
        seed_q(&mut m);
        let q_before = m.lattice.q.clone();

        let outcome = m.step(0).expect("test: step");
        assert!(matches!(outcome, StepOutcome::Floored { .. }));
        assert!(m.lattice.is_finite());
        assert!(m.step_size.dt_nondim < 0.1);
        assert!(m.step_size.dt_nondim < 0.02);
        assert_eq!(m.lattice.q, q_before, "abandoned step must not leak trial state");
        assert!(m.energy.energy_log.is_empty());
    }

    #[test]
    fn energy_growth_triggers_reduction() {
        let mut m = model(-0.1);
        seed_q(&mut m);
        let initial = m.step_size.dt_nondim;
        m.step(0).expect("test: step");
        assert!(m.step_size.dt_nondim < initial);
    }

    #[test]
    fn history_grows_after_multiple_halvings() {
        let mut m = model(-10.0);
        // Start from a deliberately coarse step so several halvings are needed.
        m.step_size = StepSizeState::new(0.5, 1.0, 1.0);
        let capacity = m.step_size.required_history() + HISTORY_MARGIN;
        m.history = DelayHistory::new(capacity, 4, 4);
        seed_q(&mut m);
        m.energy.rebaseline(compute_energy(&m.lattice.q, &m.lattice.p));

        let outcome = m.step(0).expect("test: step");
        assert!(outcome.is_accepted());
        assert!(m.step_size.dt_nondim < 0.25, "expected several halvings");
        assert!(m.history.capacity() >= m.step_size.required_history());
        assert!(m.history.capacity() > capacity);
    }

    #[test]
    fn halving_resize_keeps_recorded_offsets() {
        let mut m = model(0.1);
        seed_q(&mut m);
        m.energy.rebaseline(compute_energy(&m.lattice.q, &m.lattice.p));
        for t in 0..30 {
            assert!(m.step(t).expect("test: step").is_accepted(), "step {t} rejected");
        }
        let capacity = m.history.capacity();
        assert_eq!(capacity, 55);
        let before: Vec<Array2<f64>> = (0..capacity as i64 - 1).map(|b| m.history.at(29 - b)).collect();
        assert!(before[0].iter().any(|&v| v != 0.0), "latest snapshot should hold the field");

        // Nothing can beat a zero reference, so step 30 halves down to the floor.
        m.step_size.min_dt_nondim = 0.0025;
        m.energy.rebaseline(0.0);
        let outcome = m.step(30).expect("test: step");
        assert!(matches!(outcome, StepOutcome::Floored { .. }));
        assert_eq!(m.step_size.dt_nondim, 0.0025);
        assert_eq!(m.history.capacity(), 405);
        for (b, snapshot) in before.iter().enumerate() {
            assert_eq!(&m.history.at(29 - b as i64), snapshot, "offset {b} moved during halving");
        }
    }

    #[test]
    fn accepted_steps_never_gain_energy() {
        let mut m = model(0.1);
        seed_q(&mut m);
        m.energy.rebaseline(compute_energy(&m.lattice.q, &m.lattice.p));
        let mut previous = m.energy.last_physical();
        for t in 0..400 {
            if m.step(t).expect("test: step").is_accepted() {
                let now = m.energy.last_physical();
                assert!(now <= previous + 1e-12, "energy grew at step {t}: {previous} -> {now}");
                previous = now;
            }
            assert!(m.lattice.is_finite());
        }
    }

    #[test]
    fn overflow_guard_rescales_consistently() {
        let mut m = model(0.1);
        m.lattice.q.fill(1e6);
        m.energy.rebaseline(compute_energy(&m.lattice.q, &m.lattice.p));
        let physical_before = m.energy.last_physical();

        let outcome = m.step(0).expect("test: step");
        assert!(outcome.is_accepted());
        assert!(m.energy.scale_accum > 1.0, "rescale should have been applied");
        assert!(norm(&m.lattice.q) <= 1.0 + 1e-9);
        let physical_after = m.energy.last_physical();
        assert!(physical_after <= physical_before * (1.0 + 1e-9));
        assert_eq!(m.energy.scale_log, vec![m.energy.scale_accum]);
    }

    #[test]
    fn history_ceiling_is_fatal() {
        let mut cfg = ModelConfig::new(4, 1.0, 1.0, -10.0, 0).with_dt(0.02);
        cfg.max_history_bytes = DelayHistory::bytes_for(60, 16);
        let mut m = DoftModel::new(cfg).expect("test: initial history fits");
        seed_q(&mut m);
        let err = m.step(0).expect_err("test: growth beyond ceiling");
        assert!(matches!(err, ModelError::Config(ConfigError::HistoryTooLarge { .. })));
    }
}
