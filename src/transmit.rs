//! Synthetic sample source
//!
//! Stands in for an ADC front end: a waveform generator fills a ring of the
//! newest samples and every `send_every` samples the tail of the ring is sent
//! as one little-endian datagram.

use crate::error::{PipelineError, PipelineResult};
use clap::ValueEnum;
use std::f64::consts::PI;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Full scale of the simulated 10-bit converter
pub const SAMPLE_MAX: u16 = 1023;
pub const DEFAULT_RING_CAPACITY: usize = 4096;
pub const DEFAULT_SEND_EVERY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Square,
}

impl Waveform {
    /// Sample the waveform at `phase` in `[0, 1)`
    pub fn sample(self, phase: f64) -> u16 {
        let level = match self {
            Waveform::Sine => 0.5 + 0.5 * (2.0 * PI * phase).sin(),
            Waveform::Sawtooth => phase,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        (level.clamp(0.0, 1.0) * f64::from(SAMPLE_MAX)).round() as u16
    }
}

/// Produces consecutive samples of a periodic waveform
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    waveform: Waveform,
    /// Cycles per sample
    step: f64,
    index: u64,
}

impl SignalGenerator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: u32) -> Self {
        Self {
            waveform,
            step: frequency / f64::from(sample_rate.max(1)),
            index: 0,
        }
    }

    pub fn next_sample(&mut self) -> u16 {
        let phase = (self.index as f64 * self.step).rem_euclid(1.0);
        self.index += 1;
        self.waveform.sample(phase)
    }
}

/// Fixed-capacity ring of the newest samples
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: Vec<u16>,
    /// Next write position
    head: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity.max(1)],
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn push(&mut self, sample: u16) {
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % self.samples.len();
    }

    /// The newest `n` samples, oldest first; `n` is clamped to the capacity
    pub fn latest(&self, n: usize) -> Vec<u16> {
        let capacity = self.samples.len();
        let n = n.min(capacity);
        let start = (self.head + capacity - n) % capacity;
        (0..n).map(|i| self.samples[(start + i) % capacity]).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TransmitConfig {
    pub dest: SocketAddr,
    pub waveform: Waveform,
    pub frequency: f64,
    pub sample_rate: u32,
    pub ring_capacity: usize,
    pub send_every: usize,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            dest: SocketAddr::from((Ipv4Addr::LOCALHOST, crate::config::DEFAULT_PORT)),
            waveform: Waveform::Sine,
            frequency: 50.0,
            sample_rate: 48_000,
            ring_capacity: DEFAULT_RING_CAPACITY,
            send_every: DEFAULT_SEND_EVERY,
        }
    }
}

pub struct Transmitter {
    socket: UdpSocket,
    generator: SignalGenerator,
    ring: SampleRing,
    send_every: usize,
    period: Duration,
}

impl Transmitter {
    pub async fn connect(config: &TransmitConfig) -> PipelineResult<Self> {
        if config.sample_rate == 0 {
            return Err(PipelineError::Config(
                "sample rate must be at least 1".to_string(),
            ));
        }
        if config.send_every == 0 {
            return Err(PipelineError::Config(
                "send interval must be at least 1 sample".to_string(),
            ));
        }

        let local = if config.dest.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| PipelineError::Bind { addr: local, source })?;
        socket.connect(config.dest).await?;

        let ring = SampleRing::new(config.ring_capacity);
        let send_every = config.send_every.min(ring.capacity());
        let period = Duration::from_secs_f64(send_every as f64 / f64::from(config.sample_rate));

        info!(
            dest = %config.dest,
            waveform = ?config.waveform,
            frequency = config.frequency,
            sample_rate = config.sample_rate,
            ring_capacity = ring.capacity(),
            send_every,
            "Transmitter ready"
        );

        Ok(Self {
            socket,
            generator: SignalGenerator::new(config.waveform, config.frequency, config.sample_rate),
            ring,
            send_every,
            period,
        })
    }

    #[cfg(test)]
    fn send_every(&self) -> usize {
        self.send_every
    }

    /// Generate the next `send_every` samples and encode the newest ones
    pub fn next_payload(&mut self) -> Vec<u8> {
        for _ in 0..self.send_every {
            let sample = self.generator.next_sample();
            self.ring.push(sample);
        }

        self.ring
            .latest(self.send_every)
            .into_iter()
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    /// Send one datagram; a missing listener is not an error
    pub async fn send_next(&mut self) -> PipelineResult<()> {
        let payload = self.next_payload();
        match self.socket.send(&payload).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                debug!("Destination refused datagram");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send at the configured sample rate, `count` datagrams or forever
    pub async fn run(mut self, count: Option<u64>) -> PipelineResult<u64> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sent = 0u64;
        while count.is_none_or(|limit| sent < limit) {
            ticker.tick().await;
            self.send_next().await?;
            sent += 1;
        }

        debug!(sent, "Transmitter finished");
        Ok(sent)
    }
}
