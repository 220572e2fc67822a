// crates/framepipe-engine/src/sync/latch.rs
//
// SyncLatch: edge-triggered wait/notify primitive every worker thread
// parks on. Modeled on the scrub-decode thread's
// `Arc<(Mutex<Option<T>>, Condvar)>` latest-wins slot, generalized to a
// bare boolean trigger with no payload.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
    Notified,
    TimedOut,
}

/// A `notify()` issued while no waiter is parked is remembered — the next
/// `wait()` returns immediately. Multiple `notify()` calls between two
/// `wait()` calls collapse to one (the trigger is a bool, not a counter).
pub struct SyncLatch {
    triggered: Mutex<bool>,
    cvar: Condvar,
}

impl SyncLatch {
    pub fn new() -> Self {
        Self { triggered: Mutex::new(false), cvar: Condvar::new() }
    }

    pub fn notify(&self) {
        let mut guard = self.triggered.lock();
        *guard = true;
        self.cvar.notify_all();
    }

    /// Block until the trigger is set or `timeout` elapses. `None` means
    /// wait indefinitely. On return, the trigger has been atomically reset.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitResult {
        let mut guard = self.triggered.lock();
        if *guard {
            *guard = false;
            return WaitResult::Notified;
        }
        match timeout {
            None => {
                self.cvar.wait(&mut guard);
                *guard = false;
                WaitResult::Notified
            }
            Some(d) => {
                let timed_out = self.cvar.wait_for(&mut guard, d).timed_out();
                if *guard {
                    *guard = false;
                    WaitResult::Notified
                } else if timed_out {
                    WaitResult::TimedOut
                } else {
                    // Spurious wake with no trigger set: treat as a timeout
                    // from the caller's perspective, it will loop and re-wait.
                    WaitResult::TimedOut
                }
            }
        }
    }
}

impl Default for SyncLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn notify_before_wait_is_remembered() {
        let latch = SyncLatch::new();
        latch.notify();
        assert_eq!(latch.wait(Some(Duration::from_millis(10))), WaitResult::Notified);
    }

    #[test]
    fn multiple_notifies_collapse_to_one() {
        let latch = SyncLatch::new();
        latch.notify();
        latch.notify();
        latch.notify();
        assert_eq!(latch.wait(Some(Duration::from_millis(10))), WaitResult::Notified);
        // Only one pending notification existed; a second wait times out.
        assert_eq!(latch.wait(Some(Duration::from_millis(10))), WaitResult::TimedOut);
    }

    #[test]
    fn wait_times_out_without_notify() {
        let latch = SyncLatch::new();
        assert_eq!(latch.wait(Some(Duration::from_millis(10))), WaitResult::TimedOut);
    }

    #[test]
    fn notify_wakes_a_parked_waiter() {
        let latch = Arc::new(SyncLatch::new());
        let l2 = Arc::clone(&latch);
        let handle = thread::spawn(move || l2.wait(None));
        thread::sleep(Duration::from_millis(20));
        latch.notify();
        assert_eq!(handle.join().unwrap(), WaitResult::Notified);
    }
}
