use crate::collectors::CommandExecutor;
use crate::error::Interrupted;
use crate::triggers::TriggerSignal;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Extended per-device statistics
///
/// Downstream log consumers parse this output; keep the invocation stable.
pub const IOSTAT_COMMAND: &str = "iostat -d -x";

/// Per-process I/O, batch mode, three iterations
///
/// Downstream log consumers parse this output; keep the invocation stable.
pub const IOTOP_COMMAND: &str = "iotop -botq --iter=3";

/// Commands run by each sampling iteration, in order
pub const DIAGNOSTIC_COMMANDS: [&str; 2] = [IOSTAT_COMMAND, IOTOP_COMMAND];

pub const DEFAULT_BURST_ITERATIONS: u32 = 30;
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(800);

/// Lifecycle state of the sampling worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No worker is running
    Idle,
    /// The worker is running diagnostic commands
    Bursting,
    /// The worker is blocked until the next trigger
    Waiting,
}

/// Lock-free holder for a [`LoopState`] shared between the worker and callers
#[derive(Debug)]
pub struct LoopStateCell(AtomicU8);

impl Default for LoopStateCell {
    fn default() -> Self {
        Self::new(LoopState::Idle)
    }
}

impl LoopStateCell {
    pub fn new(state: LoopState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> LoopState {
        match self.0.load(Ordering::SeqCst) {
            1 => LoopState::Bursting,
            2 => LoopState::Waiting,
            _ => LoopState::Idle,
        }
    }

    pub fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// How many iterations a burst runs and how long to pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstSettings {
    pub iterations: u32,
    pub interval: Duration,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_BURST_ITERATIONS,
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// Body of the background worker that turns triggers into sample bursts
///
/// The worker bursts once as soon as it starts, then alternates between
/// waiting on the [`TriggerSignal`] and bursting again, for as long as the
/// shared `started` flag stays set.
pub struct SamplingLoop {
    executor: Arc<dyn CommandExecutor>,
    signal: Arc<TriggerSignal>,
    started: Arc<AtomicBool>,
    state: Arc<LoopStateCell>,
    settings: BurstSettings,
}

/// Puts the state back to `Idle` however the worker exits, panics included
struct IdleOnExit<'a>(&'a LoopStateCell);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.set(LoopState::Idle);
    }
}

impl SamplingLoop {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        signal: Arc<TriggerSignal>,
        started: Arc<AtomicBool>,
        state: Arc<LoopStateCell>,
        settings: BurstSettings,
    ) -> Self {
        Self {
            executor,
            signal,
            started,
            state,
            settings,
        }
    }

    /// Run until the `started` flag is cleared
    pub fn run(self) {
        info!("Begin to run disk monitor log thread.");
        let _idle = IdleOnExit(&self.state);

        while self.started.load(Ordering::SeqCst) {
            self.state.set(LoopState::Bursting);
            if let Err(e) = self.run_burst() {
                error!("Disk monitor burst stopped early: {}", e);
                continue;
            }

            if !self.started.load(Ordering::SeqCst) {
                break;
            }

            self.state.set(LoopState::Waiting);
            debug!("Disk monitor waiting for the next trigger");
            if let Err(e) = self.signal.consume() {
                error!("Disk monitor stopped waiting for triggers: {}", e);
                continue;
            }
            info!("Disk monitor woken up by trigger");
        }

        info!("Disk monitor log thread finished");
    }

    /// Run one burst: every iteration samples both tools and then pauses
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] as soon as a stop has been requested, either
    /// during a pause or between two commands.
    pub fn run_burst(&self) -> Result<(), Interrupted> {
        debug!(
            "Starting disk monitor burst: {} iterations every {:?}",
            self.settings.iterations, self.settings.interval
        );

        for _ in 0..self.settings.iterations {
            for command in DIAGNOSTIC_COMMANDS {
                if self.signal.is_interrupted() {
                    return Err(Interrupted);
                }
                self.sample(command);
            }
            self.signal.pause(self.settings.interval)?;
        }

        Ok(())
    }

    /// Execute one diagnostic command and log what it printed
    fn sample(&self, command: &str) {
        let result = self.executor.execute(command);

        if result.is_success() {
            info!("\n{}\n", result.stdout);
        } else {
            let tool = command.split_whitespace().next().unwrap_or(command);
            error!(
                "execute {} failed. cmd: {}, stdout: {}, stderr: {}",
                tool, command, result.stdout, result.stderr
            );
        }
    }
}
