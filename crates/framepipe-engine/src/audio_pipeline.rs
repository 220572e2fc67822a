// crates/framepipe-engine/src/audio_pipeline.rs
//
// AudioPipeline: a transparent relay today, a stable seam for a future
// effect stage. One worker thread, channel in, channel out — the same
// "listener becomes a channel" substitution used throughout.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use framepipe_core::{AudioSamples, EngineConfig};

use crate::sync::SyncLatch;

pub struct AudioPipeline {
    latch: std::sync::Arc<SyncLatch>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AudioPipeline {
    pub fn new(input: Receiver<AudioSamples>, output: Sender<AudioSamples>, config: EngineConfig) -> Self {
        let latch = std::sync::Arc::new(SyncLatch::new());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle = thread::spawn(move || loop {
            if stop_rx.try_recv().is_ok() {
                return;
            }
            match input.recv_timeout(poll) {
                Ok(unit) => {
                    let _ = output.send(unit);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        });

        Self { latch, stop_tx, handle: Some(handle) }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
        self.latch.notify();
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
