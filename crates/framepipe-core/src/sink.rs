// crates/framepipe-core/src/sink.rs
//
// AudioSink: platform audio output, required from the host. Pull model —
// the sink asks the engine for up to N bytes and gets back what's ready.

/// Platform audio output. The engine never pushes audio; `AudioPipeline`
/// buffers decoded `AudioSamples` and the sink calls `pull` from its own
/// callback thread (owned by the platform, per spec.md §5).
pub trait AudioSink: Send + Sync {
    /// Return up to `max_bytes` of interleaved S16 PCM. May return fewer
    /// bytes (or zero) if that's all that's currently buffered.
    fn pull(&self, max_bytes: usize) -> Vec<u8>;

    /// Clear any backlog the sink itself is holding (not the engine's
    /// buffer) — called on `Pause`/`Stop`/`SeekTo`.
    fn stop(&self);
}
