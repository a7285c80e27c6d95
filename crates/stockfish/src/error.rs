//! Error types for engine supervision and evaluation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::provision::ProvisionError;

/// Broad classes of failure, so callers can tell a broken environment from a
/// misbehaving engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Process, pipe, timeout or provisioning failure.
    Infrastructure,
    /// The engine's output was missing or malformed.
    Protocol,
    /// The host platform has no bundled engine.
    Environment,
    /// The caller asked for something that cannot be done.
    Usage,
}

/// Errors that can occur while supervising or querying an engine.
#[derive(Error, Debug)]
pub enum StockfishError {
    /// The engine executable could not be spawned or its pipes opened.
    #[error("Failed to launch engine at {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing a command to the engine's stdin failed.
    #[error("Failed to write to engine: {0}")]
    Write(#[source] std::io::Error),
    /// Reading the engine's stdout failed.
    #[error("Failed to read engine output: {0}")]
    Read(#[source] std::io::Error),
    /// The engine closed its output stream while a response was pending.
    #[error("Engine closed its output unexpectedly")]
    Eof,
    /// The engine is not running (never started, or already closed).
    #[error("Engine is not running")]
    Closed,
    /// The UCI handshake did not complete.
    #[error("Engine handshake failed: {0}")]
    Handshake(String),
    /// The search finished without a single scored info line.
    #[error("No evaluation found in engine output")]
    NoEvaluation,
    /// A scored info line could not be turned into an evaluation.
    #[error("Could not parse score from engine output: {0}")]
    Parse(String),
    /// The engine produced no terminating line within the allowed time.
    #[error("Timed out after {0:?} waiting for engine output")]
    Timeout(Duration),
    /// The engine binary could not be materialized in the cache.
    #[error("Failed to provision engine binary: {0}")]
    Provisioning(#[from] ProvisionError),
    /// No bundled engine exists for this operating system and architecture.
    #[error(
        "Unsupported platform {os}/{arch}: only macOS ARM64 (Apple Silicon) and Linux x86-64 are supported"
    )]
    UnsupportedPlatform { os: String, arch: String },
    /// The query input was rejected before reaching the engine.
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    /// The session configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl StockfishError {
    /// The class of failure this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StockfishError::Launch { .. }
            | StockfishError::Write(_)
            | StockfishError::Read(_)
            | StockfishError::Timeout(_)
            | StockfishError::Provisioning(_) => ErrorCategory::Infrastructure,
            StockfishError::Eof
            | StockfishError::Handshake(_)
            | StockfishError::NoEvaluation
            | StockfishError::Parse(_) => ErrorCategory::Protocol,
            StockfishError::UnsupportedPlatform { .. } => ErrorCategory::Environment,
            StockfishError::Closed
            | StockfishError::InvalidPosition(_)
            | StockfishError::Config(_) => ErrorCategory::Usage,
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, StockfishError>;
