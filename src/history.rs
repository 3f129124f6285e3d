// Copyright 2026 Hypermesh Foundation. All rights reserved.
// DOFT Lattice Simulation Suite - Delay History

//! Ring buffer of past `Q` snapshots backing the delay term.
//!
//! Snapshots live in one contiguous arena of `capacity * cells` values.
//! Slot `index mod capacity` holds the snapshot recorded at `index`.
//! Growing the buffer reallocates the arena and remaps every kept snapshot
//! by its offset from the current index, so the ring positions of the new
//! capacity line up with the same time indices as before.

use ndarray::Array2;

/// Extra slots kept on top of `ceil(delay / dt)`.
pub const HISTORY_MARGIN: usize = 5;

/// Slots needed to represent `delay_in_steps` without the safety margin.
pub fn required_slots(delay_in_steps: f64) -> usize {
    delay_in_steps.ceil().max(0.0) as usize
}

#[derive(Debug, Clone)]
pub struct DelayHistory {
    rows: usize,
    cols: usize,
    capacity: usize,
    data: Vec<f64>,
}

impl DelayHistory {
    /// Zero-filled buffer holding `capacity` snapshots of a `rows×cols` field.
    pub fn new(capacity: usize, rows: usize, cols: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows,
            cols,
            capacity,
            data: vec![0.0; capacity * rows * cols],
        }
    }

    /// Arena size in bytes for `capacity` snapshots of `cells` values.
    pub fn bytes_for(capacity: usize, cells: usize) -> u64 {
        (capacity as u64)
            .saturating_mul(cells as u64)
            .saturating_mul(std::mem::size_of::<f64>() as u64)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    fn slot(&self, index: i64) -> usize {
        index.rem_euclid(self.capacity as i64) as usize
    }

    fn snapshot(&self, slot: usize) -> &[f64] {
        let cells = self.cells();
        &self.data[slot * cells..(slot + 1) * cells]
    }

    /// Store `q` at ring slot `index mod capacity`.
    pub fn record(&mut self, index: usize, q: &Array2<f64>) {
        let cells = self.cells();
        let slot = self.slot(index as i64);
        let dst = &mut self.data[slot * cells..(slot + 1) * cells];
        for (d, s) in dst.iter_mut().zip(q.iter()) {
            *d = *s;
        }
    }

    /// Exact snapshot stored for `index` (modulo capacity).
    pub fn at(&self, index: i64) -> Array2<f64> {
        let snap = self.snapshot(self.slot(index));
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| snap[r * self.cols + c])
    }

    /// Field delayed by `delay_in_steps` relative to `index`.
    ///
    /// Integer delays return the stored snapshot untouched; fractional delays
    /// blend the two bracketing snapshots linearly.
    pub fn lookup(&self, index: usize, delay_in_steps: f64) -> Array2<f64> {
        let lo = delay_in_steps.floor();
        let hi = delay_in_steps.ceil();
        let index = index as i64;

        if lo == hi {
            return self.at(index - lo as i64);
        }

        let frac = delay_in_steps - lo;
        let near = self.snapshot(self.slot(index - lo as i64));
        let far = self.snapshot(self.slot(index - hi as i64));
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            let k = r * self.cols + c;
            far[k] * frac + near[k] * (1.0 - frac)
        })
    }

    /// Reallocate to `new_capacity` slots.
    ///
    /// The `min(old, new)` most recent snapshots counted back from
    /// `current_index` keep their offset; new slots start at zero. Callers
    /// must never request fewer slots than the current delay needs.
    pub fn resize(&mut self, new_capacity: usize, current_index: usize) {
        let new_capacity = new_capacity.max(1);
        if new_capacity == self.capacity {
            return;
        }
        let cells = self.cells();
        let mut data = vec![0.0; new_capacity * cells];
        let keep = self.capacity.min(new_capacity);
        let current = current_index as i64;
        for back in 0..keep as i64 {
            let src = self.slot(current - back);
            let dst = (current - back).rem_euclid(new_capacity as i64) as usize;
            data[dst * cells..(dst + 1) * cells].copy_from_slice(self.snapshot(src));
        }
        self.data = data;
        self.capacity = new_capacity;
    }

    /// Divide every stored snapshot by `norm` (overflow protection).
    pub fn rescale(&mut self, norm: f64) {
        for v in self.data.iter_mut() {
            *v /= norm;
        }
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
