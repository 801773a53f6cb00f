mod channel;
mod config;
mod control;
mod error;
mod pipeline;
mod processor;
mod receiver;
mod sink;
mod transmit;

use crate::config::{DEFAULT_ADDRESS, DEFAULT_PORT, Settings};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::sink::terminal::DEFAULT_WIDTH;
use crate::sink::{NdjsonSink, TerminalSink};
use crate::transmit::{
    DEFAULT_RING_CAPACITY, DEFAULT_SEND_EVERY, TransmitConfig, Transmitter, Waveform,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rtplot")]
#[command(about = "Real-time plotter for UDP sample streams")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive samples and render them, reading commands from stdin
    Plot(PlotArgs),

    /// Send a synthetic waveform to a plotter
    Transmit {
        /// Destination IP address
        #[arg(long, default_value = DEFAULT_ADDRESS)]
        dest: IpAddr,

        /// Destination port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long, value_enum, default_value = "sine")]
        waveform: Waveform,

        /// Waveform frequency in Hz
        #[arg(long, default_value = "50")]
        frequency: f64,

        /// Samples generated per second
        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        /// Ring buffer length in samples
        #[arg(long, default_value_t = DEFAULT_RING_CAPACITY)]
        buflen: usize,

        /// Samples per datagram (clamped to the ring length)
        #[arg(long, default_value_t = DEFAULT_SEND_EVERY)]
        send_every: usize,

        /// Stop after this many datagrams
        #[arg(long)]
        count: Option<u64>,
    },
}

/// Flags override values from the config file
#[derive(Args)]
struct PlotArgs {
    /// Config file (default: ~/.config/rtplot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// IP address to bind
    #[arg(long)]
    address: Option<String>,

    /// UDP port to bind
    #[arg(long)]
    port: Option<u16>,

    /// Rolling window length in samples
    #[arg(long)]
    window_len: Option<usize>,

    /// Render ticks per second
    #[arg(long)]
    framerate: Option<u32>,

    /// Initial resample target
    #[arg(long)]
    resample_target: Option<i64>,

    /// Initial filter kernel length
    #[arg(long)]
    filter_length: Option<usize>,

    /// Start with the convolution filter enabled
    #[arg(long)]
    filter: bool,

    /// Seconds between channel statistics log lines (0 = off)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// How frames are rendered
    #[arg(long, value_enum, default_value = "terminal")]
    render: RenderMode,

    /// Sparkline width in columns
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: usize,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RenderMode {
    Terminal,
    Ndjson,
}

impl PlotArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(address) = &self.address {
            settings.address = address.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(window_len) = self.window_len {
            settings.window_len = window_len;
        }
        if let Some(framerate) = self.framerate {
            settings.frame_rate = framerate;
        }
        if let Some(target) = self.resample_target {
            settings.resample_target = target;
        }
        if let Some(length) = self.filter_length {
            settings.filter_length = length;
        }
        if self.filter {
            settings.filter_enabled = true;
        }
        if let Some(interval) = self.stats_interval {
            settings.stats_interval = interval;
        }
    }
}

/// Log level used when `RUST_LOG` is unset
///
/// The terminal renderer redraws its line in place, so routine logs are kept
/// quiet while it is active.
fn default_log_level(command: &Commands) -> &'static str {
    match command {
        Commands::Plot(args) if matches!(args.render, RenderMode::Terminal) => "warn",
        _ => "info",
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn plot(args: PlotArgs) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);

    let config = PipelineConfig::try_from(&settings)?;
    let axis_range = settings.axis_range;

    let mut pipeline = match args.render {
        RenderMode::Terminal => {
            Pipeline::start(config, TerminalSink::new(io::stdout(), args.width, axis_range))
                .await?
        }
        RenderMode::Ndjson => {
            Pipeline::start(config, NdjsonSink::new(io::stdout(), axis_range)).await?
        }
    };

    eprintln!("Listening on {}", pipeline.local_addr());

    let stdin = BufReader::new(tokio::io::stdin());
    let result = pipeline.run_console(stdin, &mut io::stderr()).await;
    pipeline.shutdown().await;
    result.context("Pipeline stopped unexpectedly")
}

async fn transmit(config: TransmitConfig, count: Option<u64>) -> Result<()> {
    let transmitter = Transmitter::connect(&config).await?;

    tokio::select! {
        result = transmitter.run(count) => {
            let sent = result?;
            eprintln!("Sent {} datagrams", sent);
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, stopping transmitter");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(default_log_level(&cli.command));

    let result = match cli.command {
        Commands::Plot(args) => plot(args).await,
        Commands::Transmit {
            dest,
            port,
            waveform,
            frequency,
            sample_rate,
            buflen,
            send_every,
            count,
        } => {
            let config = TransmitConfig {
                dest: SocketAddr::new(dest, port),
                waveform,
                frequency,
                sample_rate,
                ring_capacity: buflen,
                send_every,
            };
            transmit(config, count).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
