// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Energy Monitor

//! Quadratic energy functional and the trace the stepper carries with it.
//!
//! The energy is only an ordering oracle between successive lattice states:
//!
//! ```text
//! E = 0.5 * sum(P^2) + 0.5 * sum(Q^2)
//! ```
//!
//! Coupling terms are not included. After an overflow rescale the
//! fields live in scaled units; `physical = scaled * scale_accum^2`.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Slack allowed when comparing physical energies of successive steps.
pub const ENERGY_TOLERANCE: f64 = 1e-12;

/// Total nondimensional energy of the lattice.
pub fn compute_energy(q: &Array2<f64>, p: &Array2<f64>) -> f64 {
    let kinetic: f64 = p.iter().map(|v| v * v).sum();
    let potential: f64 = q.iter().map(|v| v * v).sum();
    0.5 * kinetic + 0.5 * potential
}

// ---------------------------------------------------------------------------
// EnergyTrace
// ---------------------------------------------------------------------------

/// Energy of the last accepted state plus the cumulative rescale factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyTrace {
    /// Energy in the current (possibly rescaled) units.
    pub last: f64,
    /// Product of every overflow rescale applied so far.
    pub scale_accum: f64,
    /// Physical energy of each accepted step.
    pub energy_log: Vec<f64>,
    /// Cumulative scale at each accepted step.
    pub scale_log: Vec<f64>,
}

impl EnergyTrace {
    pub fn new(initial: f64) -> Self {
        Self {
            last: initial,
            scale_accum: 1.0,
            energy_log: Vec::new(),
            scale_log: Vec::new(),
        }
    }

    /// Physical-unit value of an energy expressed in current units.
    pub fn physical(&self, scaled: f64) -> f64 {
        scaled * self.scale_accum * self.scale_accum
    }

    /// Physical-unit energy of the last accepted state.
    pub fn last_physical(&self) -> f64 {
        self.physical(self.last)
    }

    /// Whether a trial energy (current units) may be accepted.
    pub fn admits(&self, trial: f64) -> bool {
        self.physical(trial) <= self.last_physical() + ENERGY_TOLERANCE
    }

    /// Fields were divided by `norm`: energies shrink by `norm^2`.
    pub fn rescale(&mut self, norm: f64) {
        self.scale_accum *= norm;
        self.last /= norm * norm;
    }

    pub fn commit(&mut self, energy: f64) {
        self.last = energy;
        self.energy_log.push(self.physical(energy));
        self.scale_log.push(self.scale_accum);
    }

    /// Start a fresh experiment from a newly injected state.
    pub fn rebaseline(&mut self, energy: f64) {
        *self = Self::new(energy);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_fields_have_zero_energy() {
        let z = Array2::<f64>::zeros((4, 4));
        assert_eq!(compute_energy(&z, &z), 0.0);
    }

    #[test]
    fn energy_is_half_sum_of_squares() {
        let q = array![[1.0, 2.0], [0.0, -1.0]];
        let p = array![[0.5, 0.0], [0.0, 0.5]];
        // 0.5 * (0.25 + 0.25) + 0.5 * (1 + 4 + 1)
        assert!((compute_energy(&q, &p) - 3.25).abs() < 1e-15);
    }

    #[test]
    fn rescale_preserves_physical_energy() {
        let mut trace = EnergyTrace::new(8.0);
        let before = trace.last_physical();
        trace.rescale(2.0);
        assert_eq!(trace.last, 2.0);
        assert_eq!(trace.scale_accum, 2.0);
        assert!((trace.last_physical() - before).abs() < 1e-12);
    }

    #[test]
    fn admits_within_tolerance_only() {
        let trace = EnergyTrace::new(1.0);
        assert!(trace.admits(1.0));
        assert!(trace.admits(1.0 + 0.5 * ENERGY_TOLERANCE));
        assert!(!trace.admits(1.0 + 1e-9));
        assert!(trace.admits(0.5));
    }

    #[test]
    fn commit_logs_physical_values() {
        let mut trace = EnergyTrace::new(4.0);
        trace.rescale(2.0);
        trace.commit(0.5);
        assert_eq!(trace.energy_log, vec![2.0]);
        assert_eq!(trace.scale_log, vec![2.0]);
    }

    #[test]
    fn rebaseline_clears_logs_and_scale() {
        let mut trace = EnergyTrace::new(1.0);
        trace.rescale(10.0);
        trace.commit(0.001);
        trace.rebaseline(3.0);
        assert_eq!(trace.last, 3.0);
        assert_eq!(trace.scale_accum, 1.0);
        assert!(trace.energy_log.is_empty());
        assert!(trace.scale_log.is_empty());
    }
}
