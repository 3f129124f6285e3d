// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Type Definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Flat metrics mapping returned by [`crate::DoftModel::run`].
pub type Metrics = BTreeMap<String, f64>;

// ─── Boundary Mode ──────────────────────────────────────────────────────────

/// Edge behaviour of the 4-neighbour coupling stencil.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Neighbours wrap around the grid (torus).
    #[default]
    Periodic,
    /// Zero-flux edge: a missing neighbour mirrors the centre cell.
    Reflective,
    /// Dirichlet edge: a missing neighbour contributes zero.
    Absorbing,
}

impl BoundaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Reflective => "reflective",
            Self::Absorbing => "absorbing",
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "periodic" => Ok(Self::Periodic),
            "reflective" => Ok(Self::Reflective),
            "absorbing" => Ok(Self::Absorbing),
            other => Err(format!("unknown boundary mode: {other}")),
        }
    }
}

// ─── Per-Window Diagnostics ─────────────────────────────────────────────────

/// One row of the spectral-drift diagnostic table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockRecord {
    pub window_id: usize,
    /// Spectral entropy of the window (NaN when skipped).
    #[serde(rename = "K_metric")]
    pub k_metric: f64,
    /// Change from the last valid window (NaN when skipped).
    #[serde(rename = "deltaK")]
    pub delta_k: f64,
    /// 1 when the window held a non-finite sample, else 0.
    pub block_skipped: u8,
}

impl BlockRecord {
    pub fn is_skipped(&self) -> bool {
        self.block_skipped == 1
    }
}

// ─── Extractor Results ──────────────────────────────────────────────────────

/// Wave-front speed and anisotropy summary from the pulse experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PulseMetrics {
    pub xi_floor: f64,
    pub ceff_pulse: f64,
    pub ceff_pulse_ic95_lo: f64,
    pub ceff_pulse_ic95_hi: f64,
    pub anisotropy_max_pct: f64,
    pub var_c_over_c2: f64,
    pub ceff_iso_x: f64,
    pub ceff_iso_y: f64,
    pub ceff_iso_z: f64,
    pub ceff_iso_diag: f64,
    /// Mean speed fitted against the 1ξ threshold.
    pub ceff_pulse_1xi: f64,
    /// Mean speed fitted against the 5ξ threshold.
    pub ceff_pulse_5xi: f64,
    pub pulse_rays_fitted: usize,
}

impl PulseMetrics {
    /// Canonical result when no ray gathered enough detections.
    pub fn degenerate(xi_floor: f64) -> Self {
        Self {
            xi_floor,
            ceff_pulse: 0.0,
            ceff_pulse_ic95_lo: 0.0,
            ceff_pulse_ic95_hi: 0.0,
            anisotropy_max_pct: 100.0,
            var_c_over_c2: 1.0,
            ceff_iso_x: 0.0,
            ceff_iso_y: 0.0,
            ceff_iso_z: 0.0,
            ceff_iso_diag: 0.0,
            ceff_pulse_1xi: 0.0,
            ceff_pulse_5xi: 0.0,
            pulse_rays_fitted: 0,
        }
    }

    pub fn write_into(&self, metrics: &mut Metrics) {
        let entries = [
            ("xi_floor", self.xi_floor),
            ("ceff_pulse", self.ceff_pulse),
            ("ceff_pulse_ic95_lo", self.ceff_pulse_ic95_lo),
            ("ceff_pulse_ic95_hi", self.ceff_pulse_ic95_hi),
            ("anisotropy_max_pct", self.anisotropy_max_pct),
            ("var_c_over_c2", self.var_c_over_c2),
            ("ceff_iso_x", self.ceff_iso_x),
            ("ceff_iso_y", self.ceff_iso_y),
            ("ceff_iso_z", self.ceff_iso_z),
            ("ceff_iso_diag", self.ceff_iso_diag),
            ("ceff_pulse_1xi", self.ceff_pulse_1xi),
            ("ceff_pulse_5xi", self.ceff_pulse_5xi),
            ("pulse_rays_fitted", self.pulse_rays_fitted as f64),
        ];
        for (key, value) in entries {
            metrics.insert(key.to_string(), value);
        }
    }
}

/// Spectral-drift ("loss of predictive complexity") summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LpcMetrics {
    /// Fraction of valid window pairs where spectral entropy did not rise.
    pub lpc_ok_frac: f64,
    /// Valid window pairs where spectral entropy rose.
    pub lpc_vcount: usize,
    pub lpc_windows_analyzed: usize,
    pub block_skipped: usize,
}

impl LpcMetrics {
    pub fn write_into(&self, metrics: &mut Metrics) {
        metrics.insert("lpc_ok_frac".to_string(), self.lpc_ok_frac);
        metrics.insert("lpc_vcount".to_string(), self.lpc_vcount as f64);
        metrics.insert(
            "lpc_windows_analyzed".to_string(),
            self.lpc_windows_analyzed as f64,
        );
        metrics.insert("block_skipped".to_string(), self.block_skipped as f64);
    }
}

// ─── Run Output ─────────────────────────────────────────────────────────────

/// Everything one `run()` produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub metrics: Metrics,
    pub blocks: Vec<BlockRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_mode_parses_case_insensitively() {
        assert_eq!("Periodic".parse::<BoundaryMode>(), Ok(BoundaryMode::Periodic));
        assert_eq!("reflective".parse::<BoundaryMode>(), Ok(BoundaryMode::Reflective));
        assert_eq!("ABSORBING".parse::<BoundaryMode>(), Ok(BoundaryMode::Absorbing));
        assert!("toroidal".parse::<BoundaryMode>().is_err());
    }

    #[test]
    fn boundary_mode_serde_uses_lowercase() {
        let json = serde_json::to_string(&BoundaryMode::Absorbing).expect("test: serialize");
        assert_eq!(json, "\"absorbing\"");
        let back: BoundaryMode = serde_json::from_str("\"reflective\"").expect("test: deserialize");
        assert_eq!(back, BoundaryMode::Reflective);
    }

    #[test]
    fn degenerate_pulse_metrics_are_canonical() {
        let m = PulseMetrics::degenerate(1e-12);
        assert_eq!(m.ceff_pulse, 0.0);
        assert_eq!(m.anisotropy_max_pct, 100.0);
        assert_eq!(m.var_c_over_c2, 1.0);
        assert_eq!(m.pulse_rays_fitted, 0);
    }

    #[test]
    fn metrics_maps_contain_contract_keys() {
        let mut metrics = Metrics::new();
        PulseMetrics::degenerate(0.5).write_into(&mut metrics);
        LpcMetrics::default().write_into(&mut metrics);
        for key in [
            "ceff_pulse",
            "ceff_pulse_ic95_lo",
            "ceff_pulse_ic95_hi",
            "anisotropy_max_pct",
            "var_c_over_c2",
            "ceff_iso_x",
            "ceff_iso_diag",
            "lpc_ok_frac",
            "lpc_windows_analyzed",
            "block_skipped",
        ] {
            assert!(metrics.contains_key(key), "missing metric {key}");
        }
        assert_eq!(metrics["xi_floor"], 0.5);
    }

    #[test]
    fn block_record_serializes_column_names() {
        let rec = BlockRecord { window_id: 3, k_metric: 0.5, delta_k: -0.1, block_skipped: 0 };
        let json = serde_json::to_string(&rec).expect("test: serialize");
        assert!(json.contains("\"K_metric\""));
        assert!(json.contains("\"deltaK\""));
        assert!(json.contains("\"block_skipped\":0"));
        assert!(!rec.is_skipped());
    }
}
