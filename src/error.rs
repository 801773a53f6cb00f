//! Error types shared by the pipeline stages

use std::net::SocketAddr;
use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to bind UDP socket at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid bind address '{0}'")]
    Address(String),
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Pipeline stage failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
