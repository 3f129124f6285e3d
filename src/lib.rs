// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite

pub mod types;
pub mod config;
pub mod energy;
pub mod history;
pub mod lattice;
pub mod stepper;
pub mod model;

// Metric extraction
pub mod regression;
pub mod spectral;
pub mod pulse;
pub mod lpc;

pub use config::{ConfigError, ModelConfig};
pub use model::{DoftModel, NondimParams};
pub use stepper::{ModelError, StepOutcome};
pub use types::*;

use wasm_bindgen::prelude::*;

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl DoftModel {
    /// Build a model from a plain JS object; missing fields take defaults.
    #[wasm_bindgen(constructor)]
    pub fn create(config: JsValue) -> Result<DoftModel, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config: ModelConfig = if config.is_undefined() || config.is_null() {
            ModelConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        DoftModel::new(config).map_err(to_js_error)
    }

    /// Run both experiments; resolves to `{ metrics, blocks }`.
    #[wasm_bindgen(js_name = run)]
    pub fn run_js(&mut self) -> Result<JsValue, JsValue> {
        let output = self.run().map_err(to_js_error)?;
        Ok(serde_wasm_bindgen::to_value(&output)?)
    }

    pub fn run_pulse(&mut self, n_steps: u32, noise_std: f64) -> Result<JsValue, JsValue> {
        let metrics = self
            .pulse_metrics(n_steps as usize, noise_std)
            .map_err(to_js_error)?;
        Ok(serde_wasm_bindgen::to_value(&metrics)?)
    }

    pub fn run_lpc(&mut self, n_steps: u32) -> Result<JsValue, JsValue> {
        let (lpc, blocks) = self.lpc_metrics(n_steps as usize).map_err(to_js_error)?;
        let mut metrics = Metrics::new();
        lpc.write_into(&mut metrics);
        Ok(serde_wasm_bindgen::to_value(&RunOutput { metrics, blocks })?)
    }

    pub fn get_dt_nondim(&self) -> f64 {
        self.dt_nondim()
    }

    pub fn get_history_capacity(&self) -> u32 {
        self.history_capacity() as u32
    }

    /// Row-major copy of the current field.
    pub fn get_q(&self) -> Vec<f64> {
        self.q().iter().copied().collect()
    }

    pub fn get_energy_trace(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self.energy_trace()).unwrap_or(JsValue::NULL)
    }

    /// Zero the lattice and history, keeping the current step size.
    pub fn reset(&mut self) {
        self.reset_fields();
        self.rebaseline();
    }
}
