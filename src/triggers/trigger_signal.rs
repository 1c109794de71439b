use crate::error::Interrupted;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct SignalState {
    /// Triggers delivered but not yet consumed
    pending: u64,
    /// Set by a stop request, cleared when the monitor starts again
    interrupted: bool,
}

/// Counting wake-up signal shared by the trigger callers and the sampling worker
///
/// Any number of threads may [`release`](Self::release) the signal; the single
/// worker [`consume`](Self::consume)s one pending trigger per burst. Releases
/// accumulate, so triggers that arrive while a burst is running are not lost.
///
/// The same lock also backs the worker's pacing sleep, which lets a stop
/// request wake the worker from either blocking point immediately.
#[derive(Debug, Default)]
pub struct TriggerSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl TriggerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    // No code panics while holding the lock, so a poisoned state is still valid
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one pending trigger and wake the worker if it is waiting
    ///
    /// Never blocks beyond the short critical section.
    pub fn release(&self) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_add(1);
        self.condvar.notify_all();
    }

    /// Block until a trigger is pending, then take exactly one
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] without consuming anything once a stop has been
    /// requested, even if triggers are pending.
    pub fn consume(&self) -> Result<(), Interrupted> {
        let guard = self.lock();
        let mut state = self
            .condvar
            .wait_while(guard, |s| s.pending == 0 && !s.interrupted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.interrupted {
            return Err(Interrupted);
        }

        state.pending -= 1;
        Ok(())
    }

    /// Sleep for `duration` unless a stop request arrives first
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] if a stop was requested before or during the sleep.
    pub fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        let guard = self.lock();
        let (state, _timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |s| !s.interrupted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.interrupted {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Wake every blocked wait and make further waits fail until [`reset`](Self::reset)
    pub fn interrupt(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        self.condvar.notify_all();
    }

    /// Clear a previous stop request so a new worker can block again
    ///
    /// Pending triggers are kept.
    pub fn reset(&self) {
        self.lock().interrupted = false;
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// Number of triggers waiting to be consumed
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_release_then_consume_does_not_block() {
        let signal = TriggerSignal::new();
        signal.release();
        assert_eq!(signal.pending(), 1);
        assert!(signal.consume().is_ok());
        assert_eq!(signal.pending(), 0);
    }

    #[test]
    fn test_releases_accumulate() {
        let signal = TriggerSignal::new();
        signal.release();
        signal.release();
        signal.release();
        assert_eq!(signal.pending(), 3);

        signal.consume().unwrap();
        assert_eq!(signal.pending(), 2);
    }

    #[test]
    fn test_consume_blocks_until_release() {
        let signal = Arc::new(TriggerSignal::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let result = signal.consume();
                tx.send(result).unwrap();
            })
        };

        // Nothing pending yet, so the waiter must still be blocked
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        signal.release();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(()));
        waiter.join().unwrap();
        assert_eq!(signal.pending(), 0);
    }

    #[test]
    fn test_interrupt_wakes_blocked_consume() {
        let signal = Arc::new(TriggerSignal::new());

        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.consume())
        };

        thread::sleep(Duration::from_millis(50));
        signal.interrupt();

        assert_eq!(waiter.join().unwrap(), Err(Interrupted));
    }

    #[test]
    fn test_interrupt_takes_priority_over_pending_triggers() {
        let signal = TriggerSignal::new();
        signal.release();
        signal.interrupt();

        assert_eq!(signal.consume(), Err(Interrupted));
        assert_eq!(signal.pending(), 1);
    }

    #[test]
    fn test_pause_sleeps_full_duration() {
        let signal = TriggerSignal::new();
        let start = Instant::now();
        assert!(signal.pause(Duration::from_millis(50)).is_ok());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pause_is_not_woken_by_release() {
        let signal = Arc::new(TriggerSignal::new());

        let sleeper = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                let result = signal.pause(Duration::from_millis(200));
                (result, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.release();

        let (result, elapsed) = sleeper.join().unwrap();
        assert!(result.is_ok());
        assert!(elapsed >= Duration::from_millis(200));
    }

    #[test]
    fn test_interrupt_cuts_pause_short() {
        let signal = Arc::new(TriggerSignal::new());

        let sleeper = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                let result = signal.pause(Duration::from_secs(30));
                (result, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        signal.interrupt();

        let (result, elapsed) = sleeper.join().unwrap();
        assert_eq!(result, Err(Interrupted));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[test]
    fn test_reset_clears_interrupt_and_keeps_pending() {
        let signal = TriggerSignal::new();
        signal.release();
        signal.interrupt();
        assert!(signal.is_interrupted());

        signal.reset();
        assert!(!signal.is_interrupted());
        assert_eq!(signal.pending(), 1);
        assert!(signal.consume().is_ok());
    }
}
