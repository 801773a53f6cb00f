//! Stream processor stage
//!
//! Owns the rolling window, the filter configuration and the resample stride.
//! Each incoming chunk drives one cycle: slide the window, pick up at most one
//! pending value per control channel, then emit a display frame.

pub mod buffer;
pub mod filter;
pub mod resample;

use crate::channel::{Closed, Receiver, Sender};
use crate::control::ControlReceivers;
use crate::receiver::SampleChunk;
use buffer::RollingBuffer;
use filter::FilterState;
use resample::{DEFAULT_RESAMPLE_TARGET, ResampleState};
use serde::Serialize;
use tracing::{debug, info, trace};

/// Filter kernel length used until the console requests another
pub const DEFAULT_FILTER_LENGTH: usize = 7;

/// One downsampled (and optionally smoothed) view of the rolling window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    /// Emission counter, starting at 0; gaps mean frames were evicted
    pub seq: u64,
    pub filtered: bool,
    pub samples: Vec<f64>,
}

/// Startup parameters for the stream processor
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub window_len: usize,
    pub filter_enabled: bool,
    pub filter_length: usize,
    pub resample_target: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window_len: 8192,
            filter_enabled: false,
            filter_length: DEFAULT_FILTER_LENGTH,
            resample_target: DEFAULT_RESAMPLE_TARGET as i64,
        }
    }
}

/// Control values applied during one cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlUpdates {
    pub filter_enabled: Option<bool>,
    pub filter_length: Option<usize>,
    pub stride: Option<usize>,
}

impl ControlUpdates {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Build the display samples for the current window
///
/// Pure function of its inputs: the strided window, convolved and scaled when
/// the filter is enabled.
pub fn compute_frame(
    buffer: &RollingBuffer,
    filter: &FilterState,
    resample: &ResampleState,
) -> Vec<f64> {
    let strided: Vec<f64> = buffer
        .strided(resample.stride())
        .into_iter()
        .map(f64::from)
        .collect();

    if filter.enabled() {
        filter.apply(&strided)
    } else {
        strided
    }
}

pub struct StreamProcessor {
    buffer: RollingBuffer,
    filter: FilterState,
    resample: ResampleState,
    next_seq: u64,
}

impl StreamProcessor {
    pub fn new(config: &ProcessorConfig) -> Self {
        let buffer = RollingBuffer::new(config.window_len);
        let resample = ResampleState::for_target(buffer.len(), config.resample_target);

        info!(
            window_len = buffer.len(),
            stride = resample.stride(),
            display_len = buffer.len().div_ceil(resample.stride()),
            "Stream processor ready"
        );

        Self {
            filter: FilterState::new(config.filter_enabled, config.filter_length),
            buffer,
            resample,
            next_seq: 0,
        }
    }

    #[cfg(test)]
    fn filter(&self) -> &FilterState {
        &self.filter
    }

    #[cfg(test)]
    fn resample(&self) -> &ResampleState {
        &self.resample
    }

    /// Take at most one pending value from each control channel
    ///
    /// Later values stay queued for the following cycles.
    pub fn poll_controls(&mut self, controls: &mut ControlReceivers) -> ControlUpdates {
        let mut updates = ControlUpdates::default();

        if let Ok(enabled) = controls.filter_enabled.try_recv() {
            self.filter.set_enabled(enabled);
            updates.filter_enabled = Some(enabled);
        }

        if let Ok(length) = controls.filter_length.try_recv() {
            let applied = self.filter.set_window_size(length);
            updates.filter_length = Some(applied);
        }

        if let Ok(target) = controls.resample_target.try_recv() {
            self.resample = ResampleState::for_target(self.buffer.len(), target);
            updates.stride = Some(self.resample.stride());
        }

        updates
    }

    /// Current display frame, consuming a sequence number
    pub fn next_frame(&mut self) -> DisplayFrame {
        let frame = DisplayFrame {
            seq: self.next_seq,
            filtered: self.filter.enabled(),
            samples: compute_frame(&self.buffer, &self.filter, &self.resample),
        };
        self.next_seq += 1;
        frame
    }

    /// Run one processing cycle for a received chunk
    ///
    /// A frame is emitted on every cycle, including cycles that applied a
    /// resample update.
    pub fn process_chunk(
        &mut self,
        chunk: &[u16],
        controls: &mut ControlReceivers,
        frames: &Sender<DisplayFrame>,
    ) -> Result<ControlUpdates, Closed<DisplayFrame>> {
        self.buffer.slide(chunk);

        if let Some(stale) = frames.evict_if_full() {
            trace!(seq = stale.seq, "Display channel full, dropped oldest frame");
        }

        let updates = self.poll_controls(controls);

        let frame = self.next_frame();
        trace!(seq = frame.seq, len = frame.samples.len(), "Frame emitted");
        frames.push(frame)?;

        Ok(updates)
    }

    /// Process chunks until the ingest channel closes or the sink goes away
    pub async fn run(
        mut self,
        mut chunks: Receiver<SampleChunk>,
        mut controls: ControlReceivers,
        frames: Sender<DisplayFrame>,
    ) {
        while let Some(chunk) = chunks.recv().await {
            match self.process_chunk(chunk.samples(), &mut controls, &frames) {
                Ok(updates) if !updates.is_empty() => info!(
                    filter_enabled = ?updates.filter_enabled,
                    filter_length = ?updates.filter_length,
                    stride = ?updates.stride,
                    "Control update applied"
                ),
                Ok(_) => {}
                Err(Closed(frame)) => {
                    debug!(
                        seq = frame.seq,
                        "Display channel closed, stopping stream processor"
                    );
                    return;
                }
            }
        }
        debug!("Ingest channel closed, stopping stream processor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::control::control_channels;
    use super::filter::MAX_WINDOW_SIZE;

    fn processor(window_len: usize, resample_target: i64) -> StreamProcessor {
        StreamProcessor::new(&ProcessorConfig {
            window_len,
            filter_enabled: false,
            filter_length: DEFAULT_FILTER_LENGTH,
            resample_target,
        })
    }

    #[test]
    fn test_unfiltered_frame_stride_one() {
        let mut processor = processor(8, 8);
        let (_tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        processor
            .process_chunk(&[1, 2, 3, 4], &mut controls, &frames_tx)
            .unwrap();

        let frame = frames_rx.try_recv().unwrap();
        assert_eq!(frame.seq, 0);
        assert!(!frame.filtered);
        assert_eq!(frame.samples, vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_unfiltered_frame_stride_two() {
        let mut processor = processor(8, 4);
        assert_eq!(processor.resample().stride(), 2);
        let (_tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        processor
            .process_chunk(&[1, 2, 3, 4], &mut controls, &frames_tx)
            .unwrap();

        assert_eq!(
            frames_rx.try_recv().unwrap().samples,
            vec![0.0, 0.0, 1.0, 3.0]
        );
    }

    #[test]
    fn test_filtered_frame_with_degenerate_window() {
        let mut processor = processor(4, 4);
        let (mut tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        tx.set_filter_enabled(true);
        tx.set_filter_length(2);
        processor
            .process_chunk(&[1, 1, 1, 1], &mut controls, &frames_tx)
            .unwrap();

        // Both coefficients of a two-tap raised cosine are zero
        let frame = frames_rx.try_recv().unwrap();
        assert!(frame.filtered);
        assert_eq!(frame.samples, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_filtered_frame_scaled_by_half_window() {
        let mut processor = processor(8, 8);
        let (mut tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        tx.set_filter_enabled(true);
        tx.set_filter_length(5);
        processor
            .process_chunk(&[10; 8], &mut controls, &frames_tx)
            .unwrap();

        // Kernel [0, .5, 1, .5, 0] sums to 2, then divided by 5 / 2
        let frame = frames_rx.try_recv().unwrap();
        assert_eq!(frame.samples.len(), 4);
        for value in frame.samples {
            assert!((value - 8.0).abs() < 1e-9, "{value}");
        }
    }

    #[test]
    fn test_compute_frame_is_pure() {
        let mut buffer = RollingBuffer::new(32);
        buffer.slide(&(0..32).map(|i| (i * 7 % 13) as u16).collect::<Vec<_>>());
        let filter = FilterState::new(true, 5);
        let resample = ResampleState::for_target(32, 16);

        let first = compute_frame(&buffer, &filter, &resample);
        let second = compute_frame(&buffer, &filter, &resample);
        assert_eq!(first, second);
        assert_eq!(first.len(), 16 - 5 + 1);
    }

    #[test]
    fn test_one_control_value_per_cycle() {
        let mut processor = processor(8, 8);
        let (mut tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, _frames_rx) = channel::bounded(8);

        tx.set_filter_enabled(true);
        tx.set_filter_enabled(false);

        let updates = processor
            .process_chunk(&[1], &mut controls, &frames_tx)
            .unwrap();
        assert_eq!(updates.filter_enabled, Some(true));
        assert!(processor.filter().enabled());

        let updates = processor
            .process_chunk(&[2], &mut controls, &frames_tx)
            .unwrap();
        assert_eq!(updates.filter_enabled, Some(false));
        assert!(!processor.filter().enabled());

        let updates = processor
            .process_chunk(&[3], &mut controls, &frames_tx)
            .unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_resample_update_still_emits_frame() {
        let mut processor = processor(8, 8);
        let (tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        tx.set_resample_target(2);
        let updates = processor
            .process_chunk(&[1, 2, 3, 4, 5, 6, 7, 8], &mut controls, &frames_tx)
            .unwrap();

        assert_eq!(updates.stride, Some(4));
        assert_eq!(frames_rx.try_recv().unwrap().samples, vec![1.0, 5.0]);
    }

    #[test]
    fn test_non_positive_resample_target_disables_downsampling() {
        let mut processor = processor(8, 2);
        let (tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        for target in [0, -5] {
            tx.set_resample_target(target);
            let updates = processor
                .process_chunk(&[1, 2, 3, 4, 5, 6, 7, 8], &mut controls, &frames_tx)
                .unwrap();

            assert_eq!(updates.stride, Some(1));
            assert_eq!(processor.resample().stride(), 1);
            assert_eq!(frames_rx.try_recv().unwrap().samples.len(), 8);
        }
    }

    #[test]
    fn test_filter_length_one_is_clamped() {
        let mut processor = processor(8, 8);
        let (tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, _frames_rx) = channel::bounded(8);

        tx.set_filter_length(1);
        let updates = processor
            .process_chunk(&[], &mut controls, &frames_tx)
            .unwrap();

        assert_eq!(updates.filter_length, Some(2));
        assert_eq!(processor.filter().window_size(), 2);
    }

    #[test]
    fn test_oversized_filter_length_is_clamped() {
        let mut processor = processor(8, 8);
        let (tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, _frames_rx) = channel::bounded(8);

        tx.set_filter_length(100_000_000_000);
        let updates = processor
            .process_chunk(&[], &mut controls, &frames_tx)
            .unwrap();

        assert_eq!(updates.filter_length, Some(MAX_WINDOW_SIZE));
        assert_eq!(processor.filter().window().len(), MAX_WINDOW_SIZE);
    }

    #[test]
    fn test_full_display_channel_drops_oldest_frame() {
        let mut processor = processor(4, 4);
        let (_tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, mut frames_rx) = channel::bounded(2);
        let stats = frames_tx.stats();

        for sample in 1..=5u16 {
            processor
                .process_chunk(&[sample], &mut controls, &frames_tx)
                .unwrap();
            assert!(stats.len() <= 2);
        }

        let seqs: Vec<u64> = std::iter::from_fn(|| frames_rx.try_recv().ok())
            .map(|frame| frame.seq)
            .collect();
        assert_eq!(seqs, vec![3, 4]);
        assert_eq!(stats.evicted(), 3);
    }

    #[test]
    fn test_closed_display_channel_is_reported() {
        let mut processor = processor(4, 4);
        let (_tx, mut controls, _axis) = control_channels(8, false);
        let (frames_tx, frames_rx) = channel::bounded(2);
        drop(frames_rx);

        assert!(processor
            .process_chunk(&[1], &mut controls, &frames_tx)
            .is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_ingest_closes() {
        let processor = processor(4, 4);
        let (_tx, controls, _axis) = control_channels(8, false);
        let (chunks_tx, chunks_rx) = channel::bounded(8);
        let (frames_tx, mut frames_rx) = channel::bounded(8);

        chunks_tx.push(SampleChunk::from(vec![1, 2])).unwrap();
        chunks_tx.push(SampleChunk::from(vec![3])).unwrap();
        drop(chunks_tx);

        processor.run(chunks_rx, controls, frames_tx).await;

        assert_eq!(frames_rx.recv().await.unwrap().samples, vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(frames_rx.recv().await.unwrap().samples, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames_rx.recv().await, None);
    }
}
