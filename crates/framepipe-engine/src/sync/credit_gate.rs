// crates/framepipe-engine/src/sync/credit_gate.rs
//
// CreditGate: bounded-credit backpressure counter. A producer checks
// `try_acquire()` before emitting; the returned CreditGuard is attached
// to the emitted unit as its release hook (`Packet::with_release_hook`
// etc.) and, on drop, increments the counter back and notifies the
// gate's SyncLatch. If the gate has been torn down first, the weak
// upgrade fails and the drop is a no-op — per spec.md §9.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use crate::sync::latch::SyncLatch;

struct CreditGateInner {
    credits: AtomicU32,
    latch: SyncLatch,
}

/// A single stream's (audio or video) credit counter.
pub struct CreditGate {
    inner: Arc<CreditGateInner>,
}

impl CreditGate {
    pub fn new(initial: u32) -> Self {
        Self {
            inner: Arc::new(CreditGateInner {
                credits: AtomicU32::new(initial),
                latch: SyncLatch::new(),
            }),
        }
    }

    /// True if credits remain. Does not itself decrement — callers read
    /// this before emitting, then call `acquire()` on the actual emit.
    pub fn has_credits(&self) -> bool {
        self.inner.credits.load(Ordering::Acquire) > 0
    }

    /// Decrement by one and return a release guard to attach to the unit
    /// about to be emitted. Returns `None` if no credits remain.
    pub fn acquire(&self) -> Option<CreditGuard> {
        let mut current = self.inner.credits.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.inner.credits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(CreditGuard { inner: Arc::downgrade(&self.inner) });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// The latch a worker parks on between polls; notified whenever a
    /// credit is released so a backpressured producer can recheck.
    pub fn latch(&self) -> &SyncLatch {
        &self.inner.latch
    }

    pub fn current(&self) -> u32 {
        self.inner.credits.load(Ordering::Acquire)
    }
}

/// RAII credit release. Attach one to every emitted unit via a release
/// hook closure; dropping the unit drops this, restoring the credit.
pub struct CreditGuard {
    inner: Weak<CreditGateInner>,
}

impl CreditGuard {
    /// Wrap this guard as a boxed closure suitable for
    /// `Packet::with_release_hook` / `AudioSamples::with_release_hook` /
    /// `VideoFrame::with_release_hook`.
    pub fn into_release_hook(self) -> Arc<dyn Fn() + Send + Sync> {
        Arc::new(move || self.release())
    }

    fn release(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.credits.fetch_add(1, Ordering::AcqRel);
            inner.latch.notify();
        }
        // Gate already torn down: no-op, per spec.md §9.
    }
}

impl Drop for CreditGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_blocks_once_exhausted() {
        let gate = CreditGate::new(2);
        let g1 = gate.acquire().unwrap();
        let g2 = gate.acquire().unwrap();
        assert!(gate.acquire().is_none());
        drop(g1);
        assert_eq!(gate.current(), 1);
        drop(g2);
        assert_eq!(gate.current(), 2);
    }

    #[test]
    fn release_after_gate_dropped_is_a_no_op() {
        let gate = CreditGate::new(1);
        let guard = gate.acquire().unwrap();
        drop(gate);
        // Must not panic.
        drop(guard);
    }

    #[test]
    fn release_notifies_latch() {
        let gate = CreditGate::new(1);
        let guard = gate.acquire().unwrap();
        drop(guard);
        assert_eq!(
            gate.latch().wait(Some(std::time::Duration::from_millis(10))),
            crate::sync::latch::WaitResult::Notified
        );
    }

    #[test]
    fn credit_count_stays_within_bound() {
        let gate = CreditGate::new(3);
        let guards: Vec<_> = (0..3).map(|_| gate.acquire().unwrap()).collect();
        assert_eq!(gate.current(), 0);
        drop(guards);
        assert_eq!(gate.current(), 3);
    }
}
