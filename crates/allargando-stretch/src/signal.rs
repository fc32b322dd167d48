//! Wake-up signal for consumers waiting on output.
//!
//! The stretcher publishes its availability after every `process` and
//! `retrieve`. A consumer on another thread can block on
//! [`AvailabilitySignal::wait_for`] instead of polling with sleeps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct Snapshot {
    available: usize,
    finished: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<Snapshot>,
    changed: Condvar,
}

/// Cloneable handle on a stretcher's output availability.
#[derive(Debug, Clone, Default)]
pub struct AvailabilitySignal {
    shared: Arc<Shared>,
}

impl AvailabilitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new availability; `None` marks the stream as finished.
    pub fn publish(&self, available: Option<usize>) {
        let mut state = self.shared.state.lock();
        match available {
            Some(frames) => {
                state.available = frames;
                state.finished = false;
            }
            None => {
                state.available = 0;
                state.finished = true;
            }
        }
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Last published availability, `None` once finished.
    pub fn current(&self) -> Option<usize> {
        let state = self.shared.state.lock();
        if state.finished {
            None
        } else {
            Some(state.available)
        }
    }

    /// Block until at least `min_frames` are ready or the stream is finished.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for(&self, min_frames: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.finished || state.available >= min_frames {
                return true;
            }
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.finished || state.available >= min_frames;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_publish_and_current() {
        let signal = AvailabilitySignal::new();
        assert_eq!(signal.current(), Some(0));
        signal.publish(Some(128));
        assert_eq!(signal.current(), Some(128));
        signal.publish(None);
        assert_eq!(signal.current(), None);
    }

    #[test]
    fn test_wait_times_out() {
        let signal = AvailabilitySignal::new();
        assert!(!signal.wait_for(1, Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let signal = AvailabilitySignal::new();
        let producer = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(Some(512));
        });
        assert!(signal.wait_for(256, Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_finished_releases_waiters() {
        let signal = AvailabilitySignal::new();
        signal.publish(None);
        assert!(signal.wait_for(1_000_000, Duration::from_millis(1)));
    }
}
