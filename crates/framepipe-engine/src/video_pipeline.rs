// crates/framepipe-engine/src/video_pipeline.rs
//
// VideoPipeline: the GPU-heavy stage. A dedicated worker thread owns a
// GPU context shared with the host's main context, runs the upload ->
// pre-flip -> filter-chain ping-pong -> fence sequence per frame, and
// fans the finished texture out to every attached DisplaySurface plus an
// optional recording tap.
//
// Filter management is callable from any thread (FilterChain guards
// itself with its own mutex); only `render` and GPU teardown ever touch
// the shared context, and both run exclusively on this worker thread,
// per spec.md §3's invariant 4.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use framepipe_core::{DisplaySurface, EngineConfig, FitMode, GpuContext, PixelFormat, TaskPool, TextureId, VideoFrame};

use crate::filters::{FilterChain, FilterHandle};
use crate::sync::SyncLatch;

enum Command {
    Start,
    Pause,
    Stop,
}

pub struct VideoPipeline {
    cmd_tx: Sender<Command>,
    latch: Arc<SyncLatch>,
    filter_chain: Arc<FilterChain>,
    surfaces: Arc<Mutex<Vec<Arc<dyn DisplaySurface>>>>,
    recording_tap: Arc<Mutex<Option<Sender<VideoFrame>>>>,
    fit_mode: Arc<Mutex<FitMode>>,
    task_pool: Arc<dyn TaskPool>,
    handle: Option<JoinHandle<()>>,
}

impl VideoPipeline {
    pub fn new(
        input: Receiver<VideoFrame>,
        gpu: Box<dyn GpuContext>,
        task_pool: Arc<dyn TaskPool>,
        config: EngineConfig,
    ) -> Self {
        let filter_chain = Arc::new(FilterChain::new());
        let surfaces: Arc<Mutex<Vec<Arc<dyn DisplaySurface>>>> = Arc::new(Mutex::new(Vec::new()));
        let recording_tap: Arc<Mutex<Option<Sender<VideoFrame>>>> = Arc::new(Mutex::new(None));
        let fit_mode = Arc::new(Mutex::new(FitMode::ScaleAspectFit));

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<Command>(8);
        let latch = Arc::new(SyncLatch::new());
        let worker_latch = Arc::clone(&latch);
        let worker_chain = Arc::clone(&filter_chain);
        let worker_surfaces = Arc::clone(&surfaces);
        let worker_tap = Arc::clone(&recording_tap);
        let worker_fit = Arc::clone(&fit_mode);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle = thread::spawn(move || {
            run_worker(
                input,
                gpu,
                worker_chain,
                worker_surfaces,
                worker_tap,
                worker_fit,
                cmd_rx,
                worker_latch,
                poll,
            )
        });

        Self {
            cmd_tx,
            latch,
            filter_chain,
            surfaces,
            recording_tap,
            fit_mode,
            task_pool,
            handle: Some(handle),
        }
    }

    pub fn start(&self) {
        let _ = self.cmd_tx.send(Command::Start);
        self.latch.notify();
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(Command::Pause);
        self.latch.notify();
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
        self.latch.notify();
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    pub fn add_filter(&self, kind: framepipe_core::FilterKind) -> FilterHandle {
        self.filter_chain.add_filter(kind)
    }

    pub fn remove_filter(&self, kind: framepipe_core::FilterKind) {
        self.filter_chain.remove_filter(kind);
    }

    pub fn with_filter_params_mut<R>(
        &self,
        kind: framepipe_core::FilterKind,
        f: impl FnOnce(&mut crate::filters::Filter) -> R,
    ) -> Option<R> {
        self.filter_chain.with_params_mut(kind, f)
    }

    pub fn set_fit_mode(&self, fit: FitMode) {
        *self.fit_mode.lock() = fit;
    }

    /// Bind the surface to the player's serial GPU queue and start
    /// presenting to it on the next rendered frame.
    pub fn attach_surface(&self, surface: Arc<dyn DisplaySurface>) {
        surface.set_task_pool(Arc::clone(&self.task_pool));
        self.surfaces.lock().push(surface);
    }

    /// Removes the surface by pointer identity; does not touch the GPU —
    /// callers that want teardown should call `surface.clear()` first.
    pub fn detach_surface(&self, surface: &Arc<dyn DisplaySurface>) {
        self.surfaces.lock().retain(|s| !Arc::ptr_eq(s, surface));
    }

    /// Start tapping every rendered frame's final texture to `tx`, for
    /// `VideoEncoder` to read back from the shared GPU context.
    pub fn set_recording_tap(&self, tx: Sender<VideoFrame>) {
        *self.recording_tap.lock() = Some(tx);
    }

    pub fn clear_recording_tap(&self) {
        *self.recording_tap.lock() = None;
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    input: Receiver<VideoFrame>,
    gpu: Box<dyn GpuContext>,
    filter_chain: Arc<FilterChain>,
    surfaces: Arc<Mutex<Vec<Arc<dyn DisplaySurface>>>>,
    recording_tap: Arc<Mutex<Option<Sender<VideoFrame>>>>,
    fit_mode: Arc<Mutex<FitMode>>,
    cmd_rx: Receiver<Command>,
    latch: Arc<SyncLatch>,
    poll: Duration,
) {
    let _ = &latch;

    if gpu.make_current().is_err() {
        eprintln!("[video_pipeline] failed to make GPU context current, worker exiting");
        return;
    }

    // A single reused upload/scratch texture pair for the pipeline's
    // lifetime; `upload_texture`/`blit` resize them in place when the
    // incoming frame's dimensions change, so there is nothing to
    // reallocate here beyond the very first frame.
    let mut upload_tex: Option<TextureId> = None;
    let mut scratch_tex: Option<TextureId> = None;
    let mut running = false;
    let mut stopped = false;

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Start => running = true,
                Command::Pause => running = false,
                Command::Stop => stopped = true,
            }
        }

        if stopped {
            break;
        }

        if !running {
            thread::sleep(poll.min(Duration::from_millis(20)));
            continue;
        }

        match input.recv_timeout(poll) {
            Ok(frame) => {
                if frame.flush {
                    // Nothing buffered in this stage to discard; forward
                    // the flush to the recording tap so the encoder resets.
                    if let Some(tx) = recording_tap.lock().clone() {
                        let _ = tx.send(VideoFrame::flush(frame.time_base));
                    }
                    continue;
                }
                if frame.end_of_stream {
                    if let Some(tx) = recording_tap.lock().clone() {
                        let _ = tx.send(VideoFrame::end_of_stream(frame.time_base));
                    }
                    continue;
                }

                filter_chain.drain_pending_destruction(gpu.as_ref());

                if let Some(final_tex) = render_frame(gpu.as_ref(), &filter_chain, &frame, &mut upload_tex, &mut scratch_tex)
                {
                    let fit = *fit_mode.lock();
                    for surface in surfaces.lock().iter() {
                        surface.present(final_tex, frame.width, frame.height, fit);
                    }
                    if let Some(tx) = recording_tap.lock().clone() {
                        let out = VideoFrame::new(frame.width, frame.height, Vec::new(), frame.pts, frame.time_base)
                            .with_texture(final_tex);
                        let _ = tx.send(out);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(t) = upload_tex.take() {
        gpu.destroy_texture(t);
    }
    if let Some(t) = scratch_tex.take() {
        gpu.destroy_texture(t);
    }
    filter_chain.destroy_all(gpu.as_ref());
    let _ = gpu.done_current();
}

/// Upload -> pre-flip -> filter chain -> fence, per spec.md §4.8.
/// Returns the texture holding the final rendered result, or `None` on an
/// unrecoverable GPU error (logged, frame dropped).
fn render_frame(
    gpu: &dyn GpuContext,
    filter_chain: &FilterChain,
    frame: &VideoFrame,
    upload_tex: &mut Option<TextureId>,
    scratch_tex: &mut Option<TextureId>,
) -> Option<TextureId> {
    let (w, h) = (frame.width, frame.height);

    let upload = match upload_tex {
        Some(t) => *t,
        None => {
            let t = gpu.create_texture(w, h, PixelFormat::Rgba8).ok()?;
            *upload_tex = Some(t);
            t
        }
    };
    if let Err(e) = gpu.upload_texture(upload, w, h, &frame.data) {
        eprintln!("[video_pipeline] upload failed: {e}");
        return None;
    }

    let scratch = match scratch_tex {
        Some(t) => *t,
        None => {
            let t = gpu.create_texture(w, h, PixelFormat::Rgba8).ok()?;
            *scratch_tex = Some(t);
            t
        }
    };

    let flipped = filter_chain.flip_vertical(gpu, upload, scratch, w, h).unwrap_or(false);
    let (in_tex, out_tex) = if flipped { (scratch, upload) } else { (upload, scratch) };

    let (final_in, _final_out, _swaps) = filter_chain.render(gpu, in_tex, out_tex, w, h).ok()?;

    if let Err(e) = gpu.fence() {
        eprintln!("[video_pipeline] fence failed: {e}");
        return None;
    }

    Some(final_in)
}
