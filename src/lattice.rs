// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Lattice State

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::types::BoundaryMode;

/// Amplitude of the injected Gaussian pulse.
pub const PULSE_AMPLITUDE: f64 = 0.1;
/// Denominator of the pulse exponent, `exp(-r^2 / PULSE_WIDTH)`.
pub const PULSE_WIDTH: f64 = 10.0;

// ─── LatticeState ───────────────────────────────────────────────────────────

/// Field displacement `q` and momentum `p` over an `N×N` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeState {
    pub q: Array2<f64>,
    pub p: Array2<f64>,
}

impl LatticeState {
    pub fn zeros(n: usize) -> Self {
        Self {
            q: Array2::zeros((n, n)),
            p: Array2::zeros((n, n)),
        }
    }

    pub fn size(&self) -> usize {
        self.q.nrows()
    }

    /// Grid centre used for pulse injection and probing.
    pub fn center(&self) -> usize {
        self.size() / 2
    }

    pub fn reset(&mut self) {
        self.q.fill(0.0);
        self.p.fill(0.0);
    }

    pub fn is_finite(&self) -> bool {
        self.q.iter().chain(self.p.iter()).all(|v| v.is_finite())
    }

    /// Add i.i.d. `Normal(0, std)` noise to `q`.
    pub fn add_noise<R: Rng + ?Sized>(&mut self, rng: &mut R, noise: &Normal<f64>) {
        self.q.iter_mut().for_each(|v| *v += noise.sample(rng));
    }

    /// Replace `q` with i.i.d. `Normal(0, std)` samples.
    pub fn fill_noise<R: Rng + ?Sized>(&mut self, rng: &mut R, noise: &Normal<f64>) {
        self.q.iter_mut().for_each(|v| *v = noise.sample(rng));
    }

    /// Add the fixed-amplitude Gaussian bump centred on the grid.
    pub fn add_pulse(&mut self) {
        let c = self.center() as f64;
        for ((y, x), v) in self.q.indexed_iter_mut() {
            let dx = x as f64 - c;
            let dy = y as f64 - c;
            *v += PULSE_AMPLITUDE * (-(dx * dx + dy * dy) / PULSE_WIDTH).exp();
        }
    }

    /// Population standard deviation of `q`.
    pub fn q_std(&self) -> f64 {
        let n = self.q.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let mean = self.q.sum() / n;
        let var = self.q.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        var.sqrt()
    }
}

// ─── Coupling Stencil ───────────────────────────────────────────────────────

fn neighbour(field: &Array2<f64>, row: isize, col: isize, centre: f64, mode: BoundaryMode) -> f64 {
    let (rows, cols) = field.dim();
    let inside = row >= 0 && col >= 0 && (row as usize) < rows && (col as usize) < cols;
    if inside {
        return field[[row as usize, col as usize]];
    }
    match mode {
        BoundaryMode::Periodic => {
            let r = row.rem_euclid(rows as isize) as usize;
            let c = col.rem_euclid(cols as isize) as usize;
            field[[r, c]]
        }
        BoundaryMode::Reflective => centre,
        BoundaryMode::Absorbing => 0.0,
    }
}

/// Discrete 4-neighbour Laplacian `up + down + left + right - 4 * centre`.
pub fn laplacian(field: &Array2<f64>, mode: BoundaryMode) -> Array2<f64> {
    Array2::from_shape_fn(field.dim(), |(r, c)| {
        let centre = field[[r, c]];
        let (r, c) = (r as isize, c as isize);
        neighbour(field, r - 1, c, centre, mode)
            + neighbour(field, r + 1, c, centre, mode)
            + neighbour(field, r, c - 1, centre, mode)
            + neighbour(field, r, c + 1, centre, mode)
            - 4.0 * centre
    })
}

/// Frobenius norm.
pub fn norm(field: &Array2<f64>) -> f64 {
    field.iter().map(|v| v * v).sum::<f64>().sqrt()
}
