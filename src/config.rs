//! Bootstrap settings
//!
//! Loaded once at startup from `~/.config/rtplot/config.toml` (or an explicit
//! path), then overridden by command-line flags. Every field has a default so a
//! partial file is valid.

use crate::control::CONTROL_CHANNEL_CAPACITY;
use crate::error::{PipelineError, PipelineResult};
use crate::processor::resample::DEFAULT_RESAMPLE_TARGET;
use crate::processor::{DEFAULT_FILTER_LENGTH, ProcessorConfig};
use crate::receiver::MAX_DATAGRAM_SIZE;
use crate::sink::AxisRange;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 60288;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChannelSettings {
    /// Receiver to processor; sized to absorb bursts
    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,

    /// Each console to processor/sink control channel
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,

    /// Processor to sink
    #[serde(default = "default_display_capacity")]
    pub display_capacity: usize,
}

fn default_ingest_capacity() -> usize {
    256
}

fn default_control_capacity() -> usize {
    CONTROL_CHANNEL_CAPACITY
}

fn default_display_capacity() -> usize {
    8
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            ingest_capacity: default_ingest_capacity(),
            control_capacity: default_control_capacity(),
            display_capacity: default_display_capacity(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// IP address the receiver binds to
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Rolling window length in samples
    #[serde(default = "default_window_len")]
    pub window_len: usize,

    /// Render ticks per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Display length the window is downsampled towards
    #[serde(default = "default_resample_target")]
    pub resample_target: i64,

    #[serde(default)]
    pub filter_enabled: bool,

    #[serde(default = "default_filter_length")]
    pub filter_length: usize,

    /// Bytes read per datagram
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,

    /// Seconds between channel statistics log lines (0 = disabled)
    #[serde(default)]
    pub stats_interval: u64,

    #[serde(default)]
    pub axis_range: AxisRange,

    #[serde(default)]
    pub channels: ChannelSettings,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_window_len() -> usize {
    8192
}

fn default_frame_rate() -> u32 {
    60
}

fn default_resample_target() -> i64 {
    DEFAULT_RESAMPLE_TARGET as i64
}

fn default_filter_length() -> usize {
    DEFAULT_FILTER_LENGTH
}

fn default_max_datagram() -> usize {
    MAX_DATAGRAM_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            window_len: default_window_len(),
            frame_rate: default_frame_rate(),
            resample_target: default_resample_target(),
            filter_enabled: false,
            filter_length: default_filter_length(),
            axis_range: AxisRange::default(),
            max_datagram: default_max_datagram(),
            stats_interval: 0,
            channels: ChannelSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`
    ///
    /// A missing or unreadable default file falls back to defaults; an explicit
    /// path must exist and parse.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let settings = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            info!(path = %path.display(), "Loaded settings");
            return Ok(settings);
        }

        let Some(path) = config_path() else {
            warn!("Could not determine config directory, using defaults");
            return Ok(Self::default());
        };

        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    info!(path = %path.display(), "Loaded settings");
                    Ok(settings)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Ok(Self::default())
                }
            },
            Err(_) => Ok(Self::default()),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.window_len == 0 {
            return Err(PipelineError::Config(
                "window length must be at least 1".to_string(),
            ));
        }
        if self.frame_rate == 0 {
            return Err(PipelineError::Config(
                "frame rate must be at least 1".to_string(),
            ));
        }
        if self.max_datagram < 2 {
            return Err(PipelineError::Config(format!(
                "datagram limit of {} bytes cannot hold a sample",
                self.max_datagram
            )));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> PipelineResult<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| PipelineError::Address(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            window_len: self.window_len,
            filter_enabled: self.filter_enabled,
            filter_length: self.filter_length,
            resample_target: self.resample_target,
        }
    }
}

/// Get the path to the config file: ~/.config/rtplot/config.toml
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rtplot").map(|dirs| dirs.config_dir().join("config.toml"))
}
