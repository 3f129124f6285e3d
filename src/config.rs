// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Model Configuration

//! Raw physical parameters of one model instance.
//!
//! Everything here is validated once by [`ModelConfig::validate`] before the
//! model allocates its lattice or history buffer; a malformed configuration
//! is a fatal error and is never retried.

use serde::{Deserialize, Serialize};

use crate::history::DelayHistory;
use crate::types::BoundaryMode;

/// Default ceiling for the delay-history arena: 1 GiB.
pub const DEFAULT_MAX_HISTORY_BYTES: u64 = 1 << 30;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised when a configuration cannot describe a runnable model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid size must be at least {min}, got {got}")]
    GridTooSmall { min: usize, got: usize },

    #[error("parameter `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("parameter `{name}` must be strictly positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("parameter `{name}` must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("spectral window of {window} samples cannot overlap by {overlap}")]
    InvalidWindow { window: usize, overlap: usize },

    #[error("history buffer needs {required_bytes} bytes, ceiling is {ceiling_bytes}")]
    HistoryTooLarge { required_bytes: u64, ceiling_bytes: u64 },
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Construction parameters for [`crate::DoftModel`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Lattice side length `N` (grid is `N×N`).
    pub grid_size: usize,
    /// Coupling strength `a`.
    pub coupling: f64,
    /// Delay time `tau` (physical units).
    pub delay: f64,
    /// Damping `gamma` (may be negative to destabilise).
    pub damping: f64,
    /// Reference coupling scale `a_ref`.
    pub coupling_ref: f64,
    /// Reference time scale `tau_ref`.
    pub delay_ref: f64,
    pub seed: u64,
    pub boundary: BoundaryMode,
    /// Requested dimensionless step; replaced by the safe step when inconsistent.
    pub dt_nondim: Option<f64>,
    /// Pre-pulse noise standard deviation used by `run()`.
    pub pulse_noise_std: f64,
    /// Pulse horizon in reference steps of 0.1.
    pub pulse_horizon: usize,
    /// Spectral-drift horizon in reference steps of 0.1.
    pub lpc_horizon: usize,
    pub lpc_window: usize,
    pub lpc_overlap: usize,
    pub max_history_bytes: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            grid_size: 100,
            coupling: 1.0,
            delay: 1.0,
            damping: 0.05,
            coupling_ref: 1.0,
            delay_ref: 1.0,
            seed: 0,
            boundary: BoundaryMode::Periodic,
            dt_nondim: None,
            pulse_noise_std: 0.0,
            pulse_horizon: 3000,
            lpc_horizon: 30000,
            lpc_window: 4096,
            lpc_overlap: 2048,
            max_history_bytes: DEFAULT_MAX_HISTORY_BYTES,
        }
    }
}

impl ModelConfig {
    /// Convenience constructor for the raw physical parameters.
    pub fn new(grid_size: usize, coupling: f64, delay: f64, damping: f64, seed: u64) -> Self {
        Self {
            grid_size,
            coupling,
            delay,
            damping,
            seed,
            ..Self::default()
        }
    }

    pub fn with_refs(mut self, coupling_ref: f64, delay_ref: f64) -> Self {
        self.coupling_ref = coupling_ref;
        self.delay_ref = delay_ref;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_dt(mut self, dt_nondim: f64) -> Self {
        self.dt_nondim = Some(dt_nondim);
        self
    }

    /// Check every scalar parameter. The history ceiling depends on the
    /// step size and is checked through [`Self::check_history_capacity`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < 2 {
            return Err(ConfigError::GridTooSmall { min: 2, got: self.grid_size });
        }

        let finite = [
            ("coupling", self.coupling),
            ("damping", self.damping),
            ("pulse_noise_std", self.pulse_noise_std),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }

        let positive = [
            ("delay", self.delay),
            ("coupling_ref", self.coupling_ref),
            ("delay_ref", self.delay_ref),
        ];
        for (name, value) in positive {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.pulse_noise_std < 0.0 {
            return Err(ConfigError::Negative {
                name: "pulse_noise_std",
                value: self.pulse_noise_std,
            });
        }

        if let Some(dt) = self.dt_nondim {
            if !dt.is_finite() {
                return Err(ConfigError::NonFinite { name: "dt_nondim", value: dt });
            }
            if dt <= 0.0 {
                return Err(ConfigError::NonPositive { name: "dt_nondim", value: dt });
            }
        }

        if self.lpc_window < 2 || self.lpc_overlap >= self.lpc_window {
            return Err(ConfigError::InvalidWindow {
                window: self.lpc_window,
                overlap: self.lpc_overlap,
            });
        }

        Ok(())
    }

    /// Bytes needed by a history arena of `capacity` snapshots.
    pub fn history_bytes(&self, capacity: usize) -> u64 {
        DelayHistory::bytes_for(capacity, self.grid_size * self.grid_size)
    }

    /// Reject a history capacity above the configured ceiling.
    pub fn check_history_capacity(&self, capacity: usize) -> Result<(), ConfigError> {
        let required_bytes = self.history_bytes(capacity);
        if required_bytes > self.max_history_bytes {
            return Err(ConfigError::HistoryTooLarge {
                required_bytes,
                ceiling_bytes: self.max_history_bytes,
            });
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
