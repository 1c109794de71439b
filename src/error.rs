use thiserror::Error;

/// Errors raised while running a diagnostic command
///
/// These never escape the command runner; they are folded into a
/// [`SampleResult`](crate::events::SampleResult) with the sentinel exit code.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to spawn subprocess: {0}")]
    SubprocessSpawn(String),

    #[error("Failed to wait for subprocess: {0}")]
    SubprocessWait(String),

    #[error("Failed to read {stream} of subprocess: {reason}")]
    StreamRead {
        stream: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur while managing the monitor lifecycle
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to spawn disk monitor worker: {0}")]
    WorkerSpawn(String),

    #[error("Disk monitor worker panicked")]
    WorkerPanicked,
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// A blocking wait was cut short because the monitor is stopping
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait interrupted by stop request")]
pub struct Interrupted;
