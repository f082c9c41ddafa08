//! Cooperative stop signal
//!
//! Shared between the thread driving a streaming source and whoever decides
//! to shut it down (a Ctrl+C handler, a GUI). Blocking USB transfers are never
//! interrupted; the signal is observed between handshake attempts and wakes
//! any pending [`StopSignal::wait_timeout`].

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake every waiter
    pub fn stop(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless a stop is requested first
    ///
    /// Returns `true` if the signal is stopped when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_initially_running() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = StopSignal::new();
        let other = signal.clone();
        other.stop();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_wait_runs_full_timeout_when_not_stopped() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_returns_immediately_when_stopped() {
        let signal = StopSignal::new();
        signal.stop();
        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stop_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let stopped = waiter.wait_timeout(Duration::from_secs(10));
            (stopped, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (stopped, elapsed) = handle.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }
}
