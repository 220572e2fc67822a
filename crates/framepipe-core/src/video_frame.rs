// crates/framepipe-core/src/video_frame.rs
//
// VideoFrame: decoded raster leaving VideoDecoder, pushed through
// Synchronizer, VideoPipeline's filter chain, then to DisplaySurface(s).

use crate::gpu::TextureId;
use crate::packet::ReleaseHook;
use crate::time::TimeBase;

/// Decoded RGBA raster. `texture` is assigned lazily by `VideoPipeline`
/// on first GPU upload; once set it owns a GPU resource that must be
/// released on the GPU thread before the frame is discarded.
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub texture: Option<TextureId>,
    pub pts: i64,
    pub time_base: TimeBase,
    pub end_of_stream: bool,
    pub flush: bool,
    release: Option<ReleaseHook>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, pts: i64, time_base: TimeBase) -> Self {
        Self {
            width,
            height,
            data,
            texture: None,
            pts,
            time_base,
            end_of_stream: false,
            flush: false,
            release: None,
        }
    }

    pub fn flush(time_base: TimeBase) -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            texture: None,
            pts: 0,
            time_base,
            end_of_stream: false,
            flush: true,
            release: None,
        }
    }

    pub fn end_of_stream(time_base: TimeBase) -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            texture: None,
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

    /// Attach the GPU texture `VideoPipeline` rendered this frame's final
    /// result into, for a downstream GPU-context-sharing consumer
    /// (`VideoEncoder`'s readback) to sample from.
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.time_base.to_seconds(self.pts)
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
        // `texture` must already have been released on the GPU thread by
        // whoever last owned it (VideoPipeline's render loop, or the
        // DisplaySurface's clear()); this drop never touches the GPU.
    }
}
