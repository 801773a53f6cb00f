//! Frame sink boundary
//!
//! The sink runs on its own fixed-period timer, independent of how fast frames
//! are produced. On each tick it applies any pending axis-range commands and
//! renders the newest frame available, skipping older ones.

pub mod terminal;

use crate::channel::{Receiver, TryRecvError};
use crate::processor::DisplayFrame;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

pub use terminal::{NdjsonSink, TerminalSink};

/// Vertical plot range, passed through to the renderer without validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: i64,
    pub max: i64,
}

impl Default for AxisRange {
    /// Full scale of a 10-bit ADC
    fn default() -> Self {
        Self { min: 0, max: 1024 }
    }
}

/// A renderer for display frames
pub trait FrameSink: Send {
    fn render(&mut self, frame: &DisplayFrame) -> std::io::Result<()>;

    fn set_axis_range(&mut self, range: AxisRange);
}

/// Interval between render ticks for a target frame rate
pub fn frame_interval(frame_rate: u32) -> Duration {
    let millis = 1000 / u64::from(frame_rate.max(1));
    Duration::from_millis(millis.max(1))
}

/// Drive `sink` at `frame_rate` ticks per second until the frame channel closes
pub async fn run_sink<S: FrameSink>(
    mut frames: Receiver<DisplayFrame>,
    mut axis: Receiver<AxisRange>,
    mut sink: S,
    frame_rate: u32,
) -> std::io::Result<()> {
    let period = frame_interval(frame_rate);
    debug!(interval_ms = period.as_millis() as u64, "Frame sink started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        while let Ok(range) = axis.try_recv() {
            sink.set_axis_range(range);
        }

        let mut newest = None;
        let mut disconnected = false;
        loop {
            match frames.try_recv() {
                Ok(frame) => {
                    if let Some(skipped) = newest.replace(frame) {
                        trace!(seq = skipped.seq, "Skipped stale frame");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if let Some(frame) = newest {
            sink.render(&frame)?;
        }

        if disconnected {
            debug!("Display channel closed, stopping frame sink");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingSink {
        rendered: Arc<Mutex<Vec<u64>>>,
        ranges: Arc<Mutex<Vec<AxisRange>>>,
    }

    impl FrameSink for RecordingSink {
        fn render(&mut self, frame: &DisplayFrame) -> std::io::Result<()> {
            self.rendered.lock().unwrap().push(frame.seq);
            Ok(())
        }

        fn set_axis_range(&mut self, range: AxisRange) {
            self.ranges.lock().unwrap().push(range);
        }
    }

    fn frame(seq: u64) -> DisplayFrame {
        DisplayFrame {
            seq,
            filtered: false,
            samples: vec![seq as f64],
        }
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(60), Duration::from_millis(16));
        assert_eq!(frame_interval(1), Duration::from_millis(1000));
        assert_eq!(frame_interval(0), Duration::from_millis(1000));
        assert_eq!(frame_interval(5000), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_sink_renders_newest_frame_only() {
        let (frames_tx, frames_rx) = channel::bounded(8);
        let (axis_tx, axis_rx) = channel::bounded(8);
        let sink = RecordingSink::default();

        for seq in 0..5 {
            frames_tx.push(frame(seq)).unwrap();
        }
        axis_tx.push(AxisRange { min: -1, max: 1 }).unwrap();
        drop(frames_tx);

        run_sink(frames_rx, axis_rx, sink.clone(), 60).await.unwrap();

        assert_eq!(*sink.rendered.lock().unwrap(), vec![4]);
        assert_eq!(
            *sink.ranges.lock().unwrap(),
            vec![AxisRange { min: -1, max: 1 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_renders_on_each_tick() {
        let (frames_tx, frames_rx) = channel::bounded(8);
        let (_axis_tx, axis_rx) = channel::bounded(8);
        let sink = RecordingSink::default();
        let task = tokio::spawn(run_sink(frames_rx, axis_rx, sink.clone(), 10));

        // Push between ticks so each tick sees exactly one new frame
        for seq in 0..3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            frames_tx.push(frame(seq)).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        drop(frames_tx);
        task.await.unwrap().unwrap();

        assert_eq!(*sink.rendered.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_default_axis_range() {
        assert_eq!(AxisRange::default(), AxisRange { min: 0, max: 1024 });
    }
}
