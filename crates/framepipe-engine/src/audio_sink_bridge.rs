// crates/framepipe-engine/src/audio_sink_bridge.rs
//
// AudioSinkBridge: the ring buffer `AudioPipeline`'s decoded output lands
// in, and that a host-owned `AudioSink` trait object calls `pull` against
// from its own platform callback thread. The engine never pushes audio
// (spec.md §4.7/§6): Player's audio relay thread appends decoded bytes
// here as they arrive; the host's audio-out driver drains them on its own
// schedule, which is why the read side tolerates an empty/partial buffer.

use std::collections::VecDeque;

use parking_lot::Mutex;

use framepipe_core::AudioSink;

pub struct AudioSinkBridge {
    buffer: Mutex<VecDeque<u8>>,
}

impl AudioSinkBridge {
    pub fn new() -> Self {
        Self { buffer: Mutex::new(VecDeque::new()) }
    }

    /// Append interleaved S16 samples, little-endian, as the platform
    /// audio format spec.md §6 names.
    pub fn push(&self, samples: &[i16]) {
        let mut buffer = self.buffer.lock();
        buffer.reserve(samples.len() * 2);
        for s in samples {
            buffer.extend(s.to_le_bytes());
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().len()
    }
}

impl Default for AudioSinkBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for AudioSinkBridge {
    fn pull(&self, max_bytes: usize) -> Vec<u8> {
        let mut buffer = self.buffer.lock();
        let n = max_bytes.min(buffer.len());
        buffer.drain(..n).collect()
    }

    fn stop(&self) {
        self.buffer.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_returns_fewer_bytes_than_requested_when_underfull() {
        let bridge = AudioSinkBridge::new();
        bridge.push(&[1, 2, 3]);
        let pulled = bridge.pull(100);
        assert_eq!(pulled.len(), 6);
    }

    #[test]
    fn pull_drains_in_order_across_calls() {
        let bridge = AudioSinkBridge::new();
        bridge.push(&[1, 2]);
        bridge.push(&[3]);
        let first = bridge.pull(2);
        assert_eq!(first, 1i16.to_le_bytes());
        let rest = bridge.pull(100);
        assert_eq!(rest.len(), 4);
    }

    #[test]
    fn stop_clears_backlog() {
        let bridge = AudioSinkBridge::new();
        bridge.push(&[1, 2, 3]);
        bridge.stop();
        assert_eq!(bridge.buffered_bytes(), 0);
    }
}
