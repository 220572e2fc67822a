// crates/framepipe-engine/src/sync/serial_queue.rs
//
// SerialTaskQueue: one worker thread with an unbounded FIFO of closures,
// used to serialize GPU-sensitive cleanup onto the thread holding the
// shared GPU context current. Same shape as the teacher's dedicated
// decode threads (a spawned loop reading from a channel) minus the
// decode-specific payload.

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct SerialTaskQueue {
    tx: Sender<Task>,
    handle: Option<JoinHandle<()>>,
}

impl SerialTaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<Task>();
        let handle = thread::spawn(move || {
            for task in rx {
                task();
            }
        });
        Self { tx, handle: Some(handle) }
    }

    /// Append a task. Never blocks the caller; in-flight work is untouched.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        // The channel only disconnects after `shutdown`, at which point
        // submitting is a documented no-op.
        let _ = self.tx.send(Box::new(task));
    }

    /// Stop accepting new work. In-flight and already-queued work still
    /// completes; this call blocks until the worker thread has drained
    /// its queue and exited.
    pub fn shutdown(self) {
        // `for task in rx` on the worker only ends once every Sender is
        // dropped; drop ours explicitly before joining, since joining
        // first would hang waiting for a loop that never disconnects.
        let SerialTaskQueue { tx, handle } = self;
        drop(tx);
        if let Some(h) = handle {
            let _ = h.join();
        }
    }
}

impl Default for SerialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl framepipe_core::TaskPool for SerialTaskQueue {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) {
        SerialTaskQueue::submit(self, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn tasks_run_in_submission_order() {
        let queue = SerialTaskQueue::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            queue.submit(move || order.lock().unwrap().push(i));
        }
        queue.shutdown();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn submit_never_blocks_caller() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = SerialTaskQueue::new();
        let c = Arc::clone(&counter);
        queue.submit(move || {
            thread::sleep(Duration::from_millis(20));
            c.fetch_add(1, Ordering::SeqCst);
        });
        // submit() returned immediately; the task is still pending here.
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        queue.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
