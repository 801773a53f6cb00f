//! Convolution smoothing filter
//!
//! Smooths the display window with a raised-cosine (Hanning) kernel. Only the
//! fully-overlapping convolution positions are kept, and the result is scaled
//! by `1 / (window_size / 2)`. The scale is a fixed heuristic that keeps the
//! smoothed trace near the raw amplitude, not an exact energy correction.

use tracing::warn;

/// Smallest window for which the raised-cosine formula is defined
pub const MIN_WINDOW_SIZE: usize = 2;

/// Largest kernel the filter will generate
pub const MAX_WINDOW_SIZE: usize = 65_536;

/// Generate a symmetric Hanning window of `size` coefficients
///
/// Coefficient `i` is `0.5 - 0.5 * cos(2πi / (size - 1))`. Sizes below
/// [`MIN_WINDOW_SIZE`] are raised to it. A two-tap window is all zeros.
pub fn hanning_window(size: usize) -> Vec<f64> {
    let size = size.max(MIN_WINDOW_SIZE);
    let denominator = (size - 1) as f64;

    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denominator).cos())
        .collect()
}

/// Discrete convolution restricted to positions where both inputs fully overlap
///
/// When `kernel` is longer than `signal` the roles swap, so the output always
/// has `|len(signal) - len(kernel)| + 1` values. Empty input yields empty output.
pub fn convolve_valid(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }

    let (long, short) = if signal.len() >= kernel.len() {
        (signal, kernel)
    } else {
        (kernel, signal)
    };
    let taps = short.len();

    long.windows(taps)
        .map(|segment| {
            segment
                .iter()
                .zip(short.iter().rev())
                .map(|(&x, &h)| x * h)
                .sum()
        })
        .collect()
}

/// Filter configuration owned by the stream processor
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    enabled: bool,
    window_size: usize,
    window: Vec<f64>,
}

impl FilterState {
    pub fn new(enabled: bool, window_size: usize) -> Self {
        let mut state = Self {
            enabled,
            window_size: MIN_WINDOW_SIZE,
            window: Vec::new(),
        };
        state.set_window_size(window_size);
        state
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[cfg(test)]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[cfg(test)]
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Regenerate the kernel for a new window size
    ///
    /// Sizes outside `MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE` are a configuration
    /// error and are clamped rather than rejected. Returns the size actually
    /// applied.
    pub fn set_window_size(&mut self, window_size: usize) -> usize {
        let applied = window_size.clamp(MIN_WINDOW_SIZE, MAX_WINDOW_SIZE);
        if applied != window_size {
            warn!(
                requested = window_size,
                applied,
                "Filter window out of range, clamping"
            );
        }

        self.window_size = applied;
        self.window = hanning_window(applied);
        applied
    }

    /// Convolve `samples` with the kernel and apply the `window_size / 2` scale
    pub fn apply(&self, samples: &[f64]) -> Vec<f64> {
        let scale = self.window_size as f64 / 2.0;
        let mut output = convolve_valid(samples, &self.window);
        for value in &mut output {
            *value /= scale;
        }
        output
    }
}
