/// Error types for the disk monitor
pub mod error;

/// Sample results captured from diagnostic commands
pub mod events;

/// Diagnostic command execution
pub mod collectors;

/// Trigger signal that wakes the sampling worker
pub mod triggers;

/// Background sampling loop
pub mod sampler;

/// Configuration management
pub mod config;

/// Disk monitor lifecycle and trigger entry points
pub mod monitor;

// Re-export commonly used types
pub use error::{CommandError, ConfigError, Interrupted, MonitorError};
pub use events::SampleResult;
pub use monitor::DiskMonitor;
pub use sampler::LoopState;
