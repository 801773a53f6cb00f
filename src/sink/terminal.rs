//! Text renderers for display frames
//!
//! `TerminalSink` redraws a single sparkline row in place; `NdjsonSink` emits
//! one JSON object per frame so an external plotter can consume the stream.

use super::{AxisRange, FrameSink};
use crate::processor::DisplayFrame;
use serde::Serialize;
use std::io::Write;

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Default sparkline width in columns
pub const DEFAULT_WIDTH: usize = 96;

/// Collapse `samples` into at most `width` bar glyphs scaled to `range`
///
/// Each column shows the mean of its slice of the frame. Values outside the
/// range pin to the lowest or highest bar.
pub fn sparkline(samples: &[f64], width: usize, range: AxisRange) -> String {
    if samples.is_empty() || width == 0 {
        return String::new();
    }

    let columns = width.min(samples.len());
    let span = range.max as f64 - range.min as f64;

    (0..columns)
        .map(|column| {
            let start = column * samples.len() / columns;
            let end = ((column + 1) * samples.len() / columns).max(start + 1);
            let slice = &samples[start..end];
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;

            let level = if span > 0.0 {
                ((mean - range.min as f64) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };
            BARS[(level * (BARS.len() - 1) as f64).round() as usize]
        })
        .collect()
}

/// Redraws the newest frame as a sparkline on one terminal line
pub struct TerminalSink<W: Write + Send> {
    out: W,
    width: usize,
    range: AxisRange,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, width: usize, range: AxisRange) -> Self {
        Self { out, width, range }
    }
}

impl<W: Write + Send> FrameSink for TerminalSink<W> {
    fn render(&mut self, frame: &DisplayFrame) -> std::io::Result<()> {
        let line = sparkline(&frame.samples, self.width, self.range);
        let marker = if frame.filtered { " filtered" } else { "" };
        write!(
            self.out,
            "\r{} [{}, {}] n={}{}\x1b[K",
            line,
            self.range.min,
            self.range.max,
            frame.samples.len(),
            marker
        )?;
        self.out.flush()
    }

    fn set_axis_range(&mut self, range: AxisRange) {
        self.range = range;
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    seq: u64,
    filtered: bool,
    axis: AxisRange,
    samples: &'a [f64],
}

/// Writes each rendered frame as one line of JSON
pub struct NdjsonSink<W: Write + Send> {
    out: W,
    range: AxisRange,
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(out: W, range: AxisRange) -> Self {
        Self { out, range }
    }
}

impl<W: Write + Send> FrameSink for NdjsonSink<W> {
    fn render(&mut self, frame: &DisplayFrame) -> std::io::Result<()> {
        let record = FrameRecord {
            seq: frame.seq,
            filtered: frame.filtered,
            axis: self.range,
            samples: &frame.samples,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    fn set_axis_range(&mut self, range: AxisRange) {
        self.range = range;
    }
}
