//! Process-wide coordinator for fsync-stall disk diagnostics
//!
//! A [`DiskMonitor`] is created once, shared by `Arc` with whatever detects
//! slow fsyncs, and driven through `start`/`trigger`/`stop`. All methods take
//! `&self` and may be called from any thread.

use crate::collectors::{CommandExecutor, ShellCommandRunner};
use crate::config::{enabled_flag_from_env, resolve_enabled_flag, MonitorConfig};
use crate::error::MonitorError;
use crate::sampler::{BurstSettings, LoopState, LoopStateCell, SamplingLoop};
use crate::triggers::TriggerSignal;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Name of the background sampling thread
pub const WORKER_THREAD_NAME: &str = "disk-monitor";

/// Captures bursts of disk I/O statistics when told a disk stall happened
pub struct DiskMonitor {
    /// Whether `start` may launch the worker
    enabled: AtomicBool,
    /// Cleared by `stop`; the worker exits once it observes `false`
    started: Arc<AtomicBool>,
    state: Arc<LoopStateCell>,
    signal: Arc<TriggerSignal>,
    executor: Arc<dyn CommandExecutor>,
    settings: BurstSettings,
    /// Serializes start/stop and owns the running worker
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DiskMonitor {
    /// Create a monitor that runs the diagnostic tools through `sh`
    pub fn new(config: &MonitorConfig) -> Self {
        Self::with_executor(config, Arc::new(ShellCommandRunner::new()))
    }

    /// Create a monitor that runs diagnostic commands through `executor`
    pub fn with_executor(config: &MonitorConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            started: Arc::new(AtomicBool::new(false)),
            state: Arc::new(LoopStateCell::default()),
            signal: Arc::new(TriggerSignal::new()),
            executor,
            settings: config.burst_settings(),
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `enabled` from a textual flag
    ///
    /// `None` means enabled. Anything other than `true`/`false` (any case) is
    /// logged as an error and also means enabled. Disabling a running monitor
    /// stops its worker.
    pub fn configure(&self, value: Option<&str>) {
        let enabled = resolve_enabled_flag(value);

        // Held across the store and the check so a concurrent start can't
        // slip in between and leave a worker running while disabled
        let mut worker = self.lock_worker();
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!("Disk monitor enabled={}", enabled);

        if !enabled && self.is_started() {
            info!("Disk monitor disabled while running, stopping worker");
            if let Err(e) = self.stop_locked(&mut worker) {
                error!("Failed to stop disk monitor: {}", e);
            }
        }
    }

    /// Set `enabled` from the `DISKMON_PRINT_ENABLED` environment variable
    pub fn configure_from_env(&self) {
        let value = enabled_flag_from_env();
        self.configure(value.as_deref());
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Launch the sampling worker
    ///
    /// Does nothing (with a warning) when disabled, and nothing when already
    /// started; concurrent calls launch at most one worker. The worker's first
    /// burst begins right away.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::WorkerSpawn` if the OS refuses to create the thread.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut worker = self.lock_worker();

        if !self.is_enabled() {
            warn!("No need to start disk monitor thread.");
            return Ok(());
        }

        if self.started.load(Ordering::SeqCst) {
            debug!("Disk monitor already started, skipping start");
            return Ok(());
        }

        // A worker that died on its own still needs reaping
        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                error!("Previous disk monitor worker panicked");
            }
        }

        self.signal.reset();
        self.started.store(true, Ordering::SeqCst);
        self.state.set(LoopState::Bursting);

        let sampling = SamplingLoop::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.signal),
            Arc::clone(&self.started),
            Arc::clone(&self.state),
            self.settings,
        );

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || sampling.run())
            .map_err(|e| {
                self.started.store(false, Ordering::SeqCst);
                self.state.set(LoopState::Idle);
                error!("Failed to spawn disk monitor thread: {}", e);
                MonitorError::WorkerSpawn(e.to_string())
            })?;

        *worker = Some(handle);
        info!(
            "Disk monitor started: {} iterations per burst every {:?}",
            self.settings.iterations, self.settings.interval
        );
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Wakes the worker from its pacing sleep or trigger wait. A command that
    /// is already running is allowed to finish. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::WorkerPanicked` if the worker thread panicked.
    pub fn stop(&self) -> Result<(), MonitorError> {
        let mut worker = self.lock_worker();
        self.stop_locked(&mut worker)
    }

    /// Body of [`stop`](Self::stop) for callers already holding the worker lock
    fn stop_locked(&self, worker: &mut Option<JoinHandle<()>>) -> Result<(), MonitorError> {
        self.started.store(false, Ordering::SeqCst);
        self.signal.interrupt();

        let Some(handle) = worker.take() else {
            debug!("Disk monitor already stopped");
            return Ok(());
        };

        info!("Stopping disk monitor");
        handle.join().map_err(|_| {
            error!("Failed to join disk monitor thread");
            MonitorError::WorkerPanicked
        })?;

        info!("Disk monitor stopped");
        Ok(())
    }

    /// Same as [`stop`](Self::stop)
    pub fn interrupt(&self) -> Result<(), MonitorError> {
        self.stop()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Request one more diagnostic burst
    ///
    /// Never blocks. Triggers delivered before `start` or during a burst are
    /// kept and each one produces its own burst.
    pub fn trigger(&self) {
        info!("Start to log disk monitor, wake up log thread.");
        self.signal.release();
    }

    /// Triggers not yet turned into bursts
    pub fn pending_triggers(&self) -> u64 {
        self.signal.pending()
    }

    pub fn loop_state(&self) -> LoopState {
        self.state.get()
    }

    pub fn burst_settings(&self) -> BurstSettings {
        self.settings
    }
}

impl Drop for DiskMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop disk monitor on drop: {}", e);
        }
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::sampler::sampling_loop::test_support::{wait_until, RecordingExecutor};
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use std::time::Duration;

    // n triggers delivered while waiting produce exactly n further bursts
    #[quickcheck]
    fn prop_one_burst_per_pending_trigger(triggers: u8) -> TestResult {
        let triggers = (triggers % 6) as usize;
        let config = MonitorConfig {
            enabled: true,
            burst_iterations: 1,
            sample_interval_ms: 0,
        };
        let executor = Arc::new(RecordingExecutor::new());
        let monitor = DiskMonitor::with_executor(&config, executor.clone());

        if monitor.start().is_err() {
            return TestResult::failed();
        }
        let parked = |calls: usize| {
            wait_until(Duration::from_secs(10), || {
                monitor.loop_state() == LoopState::Waiting
                    && monitor.pending_triggers() == 0
                    && executor.call_count() == calls
            })
        };
        if !parked(2) {
            return TestResult::failed();
        }

        for _ in 0..triggers {
            monitor.trigger();
        }
        let expected = 2 * (triggers + 1);
        let settled = parked(expected);
        std::thread::sleep(Duration::from_millis(20));
        let exact = executor.call_count() == expected;

        let stopped = monitor.stop().is_ok();
        TestResult::from_bool(settled && exact && stopped)
    }
}
