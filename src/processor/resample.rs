//! Display downsampling

/// Display length the processor aims for when no target has been requested
pub const DEFAULT_RESAMPLE_TARGET: usize = 2048;

/// Stride used to downsample the rolling window for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleState {
    stride: usize,
}

impl ResampleState {
    /// Derive the stride for a window of `window_len` and a requested display length
    ///
    /// The stride is `floor(L / target)` when the window is at least as long as
    /// the target, otherwise 1. A target of zero or below disables downsampling.
    pub fn for_target(window_len: usize, target: i64) -> Self {
        let target = usize::try_from(target).unwrap_or(0);
        if target == 0 {
            return Self::default();
        }

        let stride = if window_len >= target {
            window_len / target
        } else {
            1
        };
        Self {
            stride: stride.max(1),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Default for ResampleState {
    fn default() -> Self {
        Self { stride: 1 }
    }
}
