//! Runtime control channels
//!
//! Each reconfigurable parameter travels over its own small drop-oldest
//! channel. The stream processor polls the filter and resample channels once
//! per cycle; axis-range updates bypass the processor and go straight to the
//! frame sink.

pub mod console;

use crate::channel::{self, Receiver, Sender};
use crate::sink::AxisRange;
use tracing::{debug, info};

/// Default capacity of each control channel
pub const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// A parsed console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Flip the convolution filter on or off
    ToggleFilter,
    /// Regenerate the filter kernel with this many coefficients
    FilterLength(usize),
    /// Request a new display length; the processor derives the stride
    ResampleTarget(i64),
    /// Forwarded untouched to the frame sink
    AxisRange(AxisRange),
    Help,
    Quit,
}

/// Producer side of every control channel, held by the console
pub struct ControlSender {
    filter_enabled: Sender<bool>,
    filter_length: Sender<usize>,
    resample_target: Sender<i64>,
    axis_range: Sender<AxisRange>,
    /// Last filter state requested from this side
    filter_toggle: bool,
}

/// Control channels polled by the stream processor
pub struct ControlReceivers {
    pub filter_enabled: Receiver<bool>,
    pub filter_length: Receiver<usize>,
    pub resample_target: Receiver<i64>,
}

/// Create the control channels
///
/// The axis-range receiver belongs to the sink, the rest to the processor.
pub fn control_channels(
    capacity: usize,
    filter_enabled: bool,
) -> (ControlSender, ControlReceivers, Receiver<AxisRange>) {
    let (filter_enabled_tx, filter_enabled_rx) = channel::bounded(capacity);
    let (filter_length_tx, filter_length_rx) = channel::bounded(capacity);
    let (resample_tx, resample_rx) = channel::bounded(capacity);
    let (axis_tx, axis_rx) = channel::bounded(capacity);

    let sender = ControlSender {
        filter_enabled: filter_enabled_tx,
        filter_length: filter_length_tx,
        resample_target: resample_tx,
        axis_range: axis_tx,
        filter_toggle: filter_enabled,
    };
    let receivers = ControlReceivers {
        filter_enabled: filter_enabled_rx,
        filter_length: filter_length_rx,
        resample_target: resample_rx,
    };

    (sender, receivers, axis_rx)
}

impl ControlSender {
    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.filter_toggle = enabled;
        send(&self.filter_enabled, enabled, "filter_enabled");
    }

    /// Flip the locally tracked filter state and send the new value
    pub fn toggle_filter(&mut self) -> bool {
        let enabled = !self.filter_toggle;
        self.set_filter_enabled(enabled);
        enabled
    }

    pub fn set_filter_length(&self, length: usize) {
        send(&self.filter_length, length, "filter_length");
    }

    /// Send a resample target; the processor treats targets below 1 as no downsampling
    pub fn set_resample_target(&self, target: i64) {
        send(&self.resample_target, target, "resample_target");
    }

    pub fn set_axis_range(&self, range: AxisRange) {
        send(&self.axis_range, range, "axis_range");
    }

    pub fn filter_toggle(&self) -> bool {
        self.filter_toggle
    }

    /// Route a state-changing command onto its channel
    ///
    /// `Help` and `Quit` carry no state and are ignored here.
    pub fn dispatch(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::ToggleFilter => {
                let enabled = self.toggle_filter();
                info!(enabled, "Filter toggle requested");
            }
            ControlCommand::FilterLength(length) => {
                self.set_filter_length(length);
                info!(length, "Filter length requested");
            }
            ControlCommand::ResampleTarget(target) => {
                self.set_resample_target(target);
                info!(target, "Resample target requested");
            }
            ControlCommand::AxisRange(range) => {
                self.set_axis_range(range);
                info!(min = range.min, max = range.max, "Axis range requested");
            }
            ControlCommand::Help | ControlCommand::Quit => {}
        }
    }
}

fn send<T>(tx: &Sender<T>, value: T, channel: &'static str) {
    match tx.push(value) {
        Ok(Some(_)) => debug!(channel, "Control channel full, dropped oldest command"),
        Ok(None) => {}
        Err(_) => debug!(channel, "Control channel closed, command discarded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TryRecvError;

    #[test]
    fn test_toggle_sends_flipped_state() {
        let (mut tx, mut rx, _axis) = control_channels(CONTROL_CHANNEL_CAPACITY, false);

        tx.dispatch(ControlCommand::ToggleFilter);
        tx.dispatch(ControlCommand::ToggleFilter);

        assert_eq!(rx.filter_enabled.try_recv(), Ok(true));
        assert_eq!(rx.filter_enabled.try_recv(), Ok(false));
        assert!(!tx.filter_toggle());
    }

    #[test]
    fn test_resample_target_sent_unchanged() {
        let (mut tx, mut rx, _axis) = control_channels(CONTROL_CHANNEL_CAPACITY, false);

        tx.dispatch(ControlCommand::ResampleTarget(-3));
        tx.dispatch(ControlCommand::ResampleTarget(512));

        assert_eq!(rx.resample_target.try_recv(), Ok(-3));
        assert_eq!(rx.resample_target.try_recv(), Ok(512));
    }

    #[test]
    fn test_axis_range_goes_to_sink_channel() {
        let (mut tx, mut rx, mut axis) = control_channels(CONTROL_CHANNEL_CAPACITY, false);

        let range = AxisRange { min: -10, max: 10 };
        tx.dispatch(ControlCommand::AxisRange(range));

        assert_eq!(axis.try_recv(), Ok(range));
        assert_eq!(rx.filter_enabled.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(rx.filter_length.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_full_control_channel_keeps_newest() {
        let (tx, mut rx, _axis) = control_channels(2, false);

        for length in [3, 5, 7] {
            tx.set_filter_length(length);
        }

        assert_eq!(rx.filter_length.try_recv(), Ok(5));
        assert_eq!(rx.filter_length.try_recv(), Ok(7));
    }
}
