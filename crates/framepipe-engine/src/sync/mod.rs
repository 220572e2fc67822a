// crates/framepipe-engine/src/sync/mod.rs
//
// The three leaf concurrency primitives everything else is built from.

pub mod credit_gate;
pub mod latch;
pub mod serial_queue;

pub use credit_gate::{CreditGate, CreditGuard};
pub use latch::{SyncLatch, WaitResult};
pub use serial_queue::SerialTaskQueue;
