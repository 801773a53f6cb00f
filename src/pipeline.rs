//! Stage wiring and lifecycle
//!
//! Binds the receiver, creates the drop-oldest channels between stages and
//! spawns each stage as its own task. Shutdown is abrupt: tasks are aborted
//! without draining in-flight data.

use crate::channel::{self, ChannelStats};
use crate::config::{ChannelSettings, Settings};
use crate::control::{self, ControlSender, console};
use crate::error::{PipelineError, PipelineResult};
use crate::processor::{DisplayFrame, ProcessorConfig, StreamProcessor};
use crate::receiver::{MAX_DATAGRAM_SIZE, SampleChunk, UdpReceiver};
use crate::sink::{self, FrameSink};
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bind_addr: SocketAddr,
    pub max_datagram: usize,
    pub processor: ProcessorConfig,
    pub frame_rate: u32,
    pub channels: ChannelSettings,
    /// Zero disables the statistics task
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], crate::config::DEFAULT_PORT)),
            max_datagram: MAX_DATAGRAM_SIZE,
            processor: ProcessorConfig::default(),
            frame_rate: 60,
            channels: ChannelSettings::default(),
            stats_interval: Duration::ZERO,
        }
    }
}

impl TryFrom<&Settings> for PipelineConfig {
    type Error = PipelineError;

    fn try_from(settings: &Settings) -> PipelineResult<Self> {
        settings.validate()?;
        Ok(Self {
            bind_addr: settings.bind_addr()?,
            max_datagram: settings.max_datagram,
            processor: settings.processor_config(),
            frame_rate: settings.frame_rate,
            channels: settings.channels.clone(),
            stats_interval: Duration::from_secs(settings.stats_interval),
        })
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Bind the socket and spawn all stages
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start<S>(config: PipelineConfig, sink: S) -> PipelineResult<RunningPipeline>
    where
        S: FrameSink + 'static,
    {
        let receiver = UdpReceiver::bind(config.bind_addr, config.max_datagram).await?;
        let local_addr = receiver.local_addr()?;

        let (ingest_tx, ingest_rx) = channel::bounded::<SampleChunk>(config.channels.ingest_capacity);
        let (frames_tx, frames_rx) =
            channel::bounded::<DisplayFrame>(config.channels.display_capacity);
        let (controls, control_rx, axis_rx) = control::control_channels(
            config.channels.control_capacity,
            config.processor.filter_enabled,
        );

        let ingest_stats = ingest_tx.stats();
        let display_stats = frames_tx.stats();
        let processor = StreamProcessor::new(&config.processor);

        let mut tasks = JoinSet::new();
        tasks.spawn(receiver.run(ingest_tx));
        tasks.spawn(async move {
            processor.run(ingest_rx, control_rx, frames_tx).await;
            Ok(())
        });
        tasks.spawn(async move {
            sink::run_sink(frames_rx, axis_rx, sink, config.frame_rate)
                .await
                .map_err(PipelineError::from)
        });

        if !config.stats_interval.is_zero() {
            tasks.spawn(stats_monitor(
                config.stats_interval,
                ingest_stats,
                display_stats,
            ));
        }

        info!(
            %local_addr,
            window_len = config.processor.window_len,
            frame_rate = config.frame_rate,
            "Pipeline started"
        );

        Ok(RunningPipeline {
            controls,
            local_addr,
            tasks,
        })
    }
}

/// Handle to a started pipeline
pub struct RunningPipeline {
    controls: ControlSender,
    local_addr: SocketAddr,
    tasks: JoinSet<PipelineResult<()>>,
}

impl RunningPipeline {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[cfg(test)]
    fn controls(&mut self) -> &mut ControlSender {
        &mut self.controls
    }

    /// Drive the command console until it quits or a stage stops
    ///
    /// Console prompts and acknowledgements are written to `feedback`.
    pub async fn run_console<R, W>(&mut self, input: R, feedback: &mut W) -> PipelineResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        tokio::select! {
            result = console::run_console(input, feedback, &mut self.controls) => {
                result?;
                info!("Console closed");
                Ok(())
            }
            result = first_exit(&mut self.tasks) => {
                warn!("Pipeline stage stopped before the console closed");
                result
            }
        }
    }

    /// Abort every stage
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        info!("Pipeline stopped");
    }
}

async fn first_exit(tasks: &mut JoinSet<PipelineResult<()>>) -> PipelineResult<()> {
    match tasks.join_next().await {
        Some(Ok(result)) => result,
        Some(Err(e)) => Err(e.into()),
        None => std::future::pending().await,
    }
}

async fn stats_monitor(
    period: Duration,
    ingest_stats: ChannelStats<SampleChunk>,
    display_stats: ChannelStats<DisplayFrame>,
) -> PipelineResult<()> {
    loop {
        tokio::time::sleep(period).await;

        info!(
            ingest_len = ingest_stats.len(),
            ingest_capacity = ingest_stats.capacity(),
            ingest_evicted = ingest_stats.evicted(),
            display_len = display_stats.len(),
            display_capacity = display_stats.capacity(),
            display_evicted = display_stats.evicted(),
            "Channel statistics"
        );
    }
}
