// crates/framepipe-engine/src/ffi_send.rs
//
// ffmpeg-the-third's codec/context wrapper types hold a raw pointer and
// are therefore `!Send` by default, even though (unlike a GPU context)
// an FFmpeg codec context has no thread affinity — it only requires
// exclusive access, which our one-worker-thread-per-decoder design
// already guarantees. `SendPtr` documents that guarantee at the type
// level so a freshly opened decoder can be moved into its worker
// thread's spawned closure.

pub struct SendPtr<T>(pub T);

// SAFETY: the wrapped value is handed to exactly one worker thread at
// construction time and never touched concurrently from elsewhere.
unsafe impl<T> Send for SendPtr<T> {}
