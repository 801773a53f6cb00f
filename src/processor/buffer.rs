//! Rolling sample window
//!
//! Fixed-length circular buffer holding the most recent `L` samples. Sliding
//! in a chunk overwrites the oldest entries in place instead of shifting the
//! whole window, so an update costs `min(len(chunk), L)` writes.

/// Circular buffer of the newest `L` samples, oldest first when iterated
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: Vec<u16>,
    /// Index of the oldest sample
    head: usize,
}

impl RollingBuffer {
    /// Create a zero-filled window of `len` samples (at least one)
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len.max(1)],
            head: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Slide a chunk into the window
    ///
    /// The oldest `min(len(chunk), L)` samples are discarded and the trailing
    /// `min(len(chunk), L)` samples of the chunk are appended. A chunk longer
    /// than the window replaces it with the chunk's last `L` samples.
    pub fn slide(&mut self, chunk: &[u16]) {
        let len = self.samples.len();
        let incoming = &chunk[chunk.len().saturating_sub(len)..];

        for &sample in incoming {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % len;
        }
    }

    /// Iterate over the window from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        let (newer, older) = self.samples.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    #[cfg(test)]
    pub fn to_vec(&self) -> Vec<u16> {
        self.iter().collect()
    }

    /// Every `stride`-th sample starting from the oldest: `ceil(L / stride)` values
    pub fn strided(&self, stride: usize) -> Vec<u16> {
        self.iter().step_by(stride.max(1)).collect()
    }
}
