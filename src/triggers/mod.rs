/// Counting trigger signal that wakes the sampling worker
pub mod trigger_signal;

pub use trigger_signal::TriggerSignal;
