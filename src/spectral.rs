// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Spectral Complexity

use rustfft::{num_complex::Complex, FftPlanner};

/// Normalised spectral entropy of a real signal, in `[0, 1]`.
///
/// The mean is removed, the one-sided power spectrum (DC excluded) is
/// normalised to a distribution and its Shannon entropy is divided by the
/// entropy of a flat spectrum. A signal without power scores 0.
pub fn spectral_entropy(signal: &[f64]) -> f64 {
    let n = signal.len();
    if n < 4 {
        return 0.0;
    }

    let mean = signal.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let power: Vec<f64> = buffer[1..=n / 2].iter().map(|c| c.norm_sqr()).collect();
    let total: f64 = power.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = power
        .iter()
        .map(|&pw| pw / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    (entropy / (power.len() as f64).ln()).clamp(0.0, 1.0)
}
