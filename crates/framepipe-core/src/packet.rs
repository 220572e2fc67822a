// crates/framepipe-core/src/packet.rs
//
// Packet: an opaque encoded unit for one elementary stream, as emitted by
// the Demuxer. Owned singly by whichever stage currently holds it.

use crate::time::TimeBase;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
}

bitflags::bitflags! {
    /// In-band control signals carried alongside encoded/decoded data.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u8 {
        const KEY_FRAME      = 0b001;
        const FLUSH          = 0b010;
        const END_OF_STREAM  = 0b100;
    }
}

/// A weak release hook fired exactly once when the owning unit is dropped.
/// Upgrading the `Arc` fails (and the drop becomes a no-op) once the
/// credit gate that installed the hook has itself been torn down.
pub type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

/// An encoded unit for one elementary stream.
pub struct Packet {
    pub stream: StreamKind,
    pub data: Vec<u8>,
    pub pts: i64,
    pub time_base: TimeBase,
    pub flags: Flags,
    release: Option<ReleaseHook>,
}

impl Packet {
    pub fn new(stream: StreamKind, data: Vec<u8>, pts: i64, time_base: TimeBase) -> Self {
        Self { stream, data, pts, time_base, flags: Flags::empty(), release: None }
    }

    pub fn flush(stream: StreamKind) -> Self {
        Self {
            stream,
            data: Vec::new(),
            pts: 0,
            time_base: TimeBase::default(),
            flags: Flags::FLUSH,
            release: None,
        }
    }

    pub fn end_of_stream(stream: StreamKind) -> Self {
        Self {
            stream,
            data: Vec::new(),
            pts: 0,
            time_base: TimeBase::default(),
            flags: Flags::END_OF_STREAM,
            release: None,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach a credit-release hook. Called by the producing stage right
    /// before handing the unit to its consumer.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.time_base.to_seconds(self.pts)
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(Flags::KEY_FRAME)
    }

    pub fn is_flush(&self) -> bool {
        self.flags.contains(Flags::FLUSH)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(Flags::END_OF_STREAM)
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn release_hook_fires_exactly_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let hook: ReleaseHook = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let pkt = Packet::new(StreamKind::Audio, vec![1, 2, 3], 0, TimeBase::default())
            .with_release_hook(hook);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(pkt);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flush_and_eos_flags_roundtrip() {
        let flush = Packet::flush(StreamKind::Video);
        assert!(flush.is_flush());
        assert!(!flush.is_end_of_stream());

        let eos = Packet::end_of_stream(StreamKind::Video);
        assert!(eos.is_end_of_stream());
        assert!(!eos.is_flush());
    }
}
