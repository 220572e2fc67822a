// crates/framepipe-core/src/samples.rs
//
// AudioSamples: decoded PCM leaving AudioDecoder, consumed by the
// Synchronizer and ultimately the AudioSink.

use crate::packet::{ReleaseHook, StreamKind};
use crate::time::TimeBase;

/// Decoded, interleaved signed-16 PCM.
pub struct AudioSamples {
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved S16 samples; length is a multiple of `channels`.
    pub data: Vec<i16>,
    /// Index into `data` (in samples, not frames) already consumed by the sink.
    pub read_offset: usize,
    pub pts: i64,
    pub time_base: TimeBase,
    pub end_of_stream: bool,
    pub flush: bool,
    release: Option<ReleaseHook>,
}

impl AudioSamples {
    pub fn new(channels: u16, sample_rate: u32, data: Vec<i16>, pts: i64, time_base: TimeBase) -> Self {
        Self {
            channels,
            sample_rate,
            data,
            read_offset: 0,
            pts,
            time_base,
            end_of_stream: false,
            flush: false,
            release: None,
        }
    }

    pub fn flush(time_base: TimeBase) -> Self {
        Self {
            channels: 0,
            sample_rate: 0,
            data: Vec::new(),
            read_offset: 0,
            pts: 0,
            time_base,
            end_of_stream: false,
            flush: true,
            release: None,
        }
    }

    pub fn end_of_stream(time_base: TimeBase) -> Self {
        Self {
            channels: 0,
            sample_rate: 0,
            data: Vec::new(),
            read_offset: 0,
            pts: 0,
            time_base,
            end_of_stream: true,
            flush: false,
            release: None,
        }
    }

    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.time_base.to_seconds(self.pts)
    }

    /// Remaining unread interleaved samples (all channels).
    pub fn remaining(&self) -> &[i16] {
        &self.data[self.read_offset..]
    }

    pub fn stream_kind(&self) -> StreamKind {
        StreamKind::Audio
    }
}

impl Drop for AudioSamples {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}
