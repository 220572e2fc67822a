// crates/framepipe-engine/src/player.rs
//
// Player: the single façade a host drives. The demux/decode/sync/present
// graph underneath is wired as channels rather than callbacks; Player is
// what builds that graph on Open, tears it down on the next Open or on
// drop, and is the one place a host-facing PlaybackListener callback
// actually fires. Grounded in the shape of the teacher's top-level
// `AppState`/`media::worker` split — one façade object owning the whole
// pipeline's lifetime behind a single public API surface.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use framepipe_core::{
    AudioSamples, Clock, DisplaySurface, EngineConfig, FilterKind, GpuContext, MediaError,
    PlaybackEvent, PlaybackListener, TimeBase, VideoFrame,
};

use crate::audio_pipeline::AudioPipeline;
use crate::audio_sink_bridge::AudioSinkBridge;
use crate::decode::{AudioDecoder, VideoDecoder};
use crate::demux::Demuxer;
use crate::encode::{AudioEncoder, EncoderOpened, Muxer, VideoEncoder};
use crate::filters::FilterHandle;
use crate::sync::{CreditGate, SerialTaskQueue};
use crate::sync_stage::{SyncPolicy, Synchronizer};
use crate::video_pipeline::VideoPipeline;

/// Target format every `AudioDecoder` resamples to, matching the
/// recording chain's `AudioEncoder` so a tap between the two never needs
/// its own resample step.
const TARGET_CHANNELS: u16 = 2;
const TARGET_RATE: u32 = 44_100;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no file is open")]
    NotOpen,
    #[error("recording flags select no stream")]
    EmptyRecordingFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Closed,
    Paused,
    Playing,
}

bitflags::bitflags! {
    /// Which decoded streams `StartRecording` captures. Defaults to both;
    /// an audio-only or video-only flag set still requires the source
    /// file to actually have that stream.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RecordingFlags: u8 {
        const AUDIO = 0b01;
        const VIDEO = 0b10;
    }
}

impl Default for RecordingFlags {
    fn default() -> Self {
        RecordingFlags::AUDIO | RecordingFlags::VIDEO
    }
}

/// The engine façade. Constructed once around a host-supplied
/// `GpuContext`; `Open` tears down and rebuilds the per-file decode/sync
/// graph underneath the same persisted `VideoPipeline`'s filters and
/// attached surfaces, since every per-file stage's channel endpoints are
/// fixed at construction (spec.md names no reconfigurable "swap the
/// input" operation on any of them).
pub struct Player {
    gpu: Box<dyn GpuContext>,
    config: EngineConfig,
    task_pool: Arc<SerialTaskQueue>,
    clock: Arc<Clock>,
    listener: Arc<Mutex<Option<Box<dyn PlaybackListener>>>>,
    surfaces: Arc<Mutex<Vec<Arc<dyn DisplaySurface>>>>,
    filters: Arc<Mutex<Vec<FilterKind>>>,
    sink_bridge: Arc<AudioSinkBridge>,
    state: Arc<Mutex<PlayerState>>,
    is_recording: AtomicBool,
    graph: Mutex<Option<OpenGraph>>,
    recording: Mutex<Option<RecordingChain>>,
}

struct OpenGraph {
    demuxer: Demuxer,
    audio_decoder: Option<AudioDecoder>,
    video_decoder: Option<VideoDecoder>,
    synchronizer: Synchronizer,
    audio_pipeline: AudioPipeline,
    video_pipeline: VideoPipeline,
    has_audio: bool,
    has_video: bool,
    recording_audio_tap: Arc<Mutex<Option<Sender<AudioSamples>>>>,
    relay_stop: Sender<()>,
    relay_handle: Option<JoinHandle<()>>,
}

impl OpenGraph {
    fn teardown(mut self) {
        let _ = self.relay_stop.send(());
        if let Some(h) = self.relay_handle.take() {
            let _ = h.join();
        }
        self.demuxer.join();
        if let Some(d) = self.audio_decoder {
            d.join();
        }
        if let Some(d) = self.video_decoder {
            d.join();
        }
        self.synchronizer.join();
        self.audio_pipeline.join();
        self.video_pipeline.join();
    }
}

struct RecordingChain {
    audio_samples_tx: Option<Sender<AudioSamples>>,
    video_frame_tx: Option<Sender<VideoFrame>>,
    audio_encoder: Option<AudioEncoder>,
    video_encoder: Option<VideoEncoder>,
    muxer: Muxer,
}

impl Player {
    pub fn new(gpu: Box<dyn GpuContext>) -> Self {
        Self::with_config(gpu, EngineConfig::default())
    }

    pub fn with_config(gpu: Box<dyn GpuContext>, config: EngineConfig) -> Self {
        Self {
            gpu,
            config,
            task_pool: Arc::new(SerialTaskQueue::new()),
            clock: Arc::new(Clock::new()),
            listener: Arc::new(Mutex::new(None)),
            surfaces: Arc::new(Mutex::new(Vec::new())),
            filters: Arc::new(Mutex::new(Vec::new())),
            sink_bridge: Arc::new(AudioSinkBridge::new()),
            state: Arc::new(Mutex::new(PlayerState::Closed)),
            is_recording: AtomicBool::new(false),
            graph: Mutex::new(None),
            recording: Mutex::new(None),
        }
    }

    /// The ring buffer a host registers with its platform audio-out
    /// driver; see `AudioSinkBridge`'s module doc.
    pub fn audio_sink(&self) -> Arc<AudioSinkBridge> {
        Arc::clone(&self.sink_bridge)
    }

    pub fn set_playback_listener(&self, listener: impl PlaybackListener + 'static) {
        *self.listener.lock() = Some(Box::new(listener));
    }

    pub fn clear_playback_listener(&self) {
        *self.listener.lock() = None;
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    pub fn is_playing(&self) -> bool {
        *self.state.lock() == PlayerState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::Acquire)
    }

    /// Tears down any previously open file and recording, opens `path`,
    /// and builds a fresh demux/decode/sync graph feeding the persistent
    /// `VideoPipeline`. Returns `false` (rather than propagating a
    /// `MediaError`) on open failure, per spec.md §6's boolean result.
    pub fn open(&self, path: impl AsRef<Path>) -> bool {
        self.stop_recording_abrupt();
        if let Some(previous) = self.graph.lock().take() {
            previous.teardown();
        }
        self.clock.reset();

        match self.build_graph(path.as_ref()) {
            Ok(graph) => {
                *self.graph.lock() = Some(graph);
                *self.state.lock() = PlayerState::Paused;
                true
            }
            Err(e) => {
                eprintln!("[player] open '{}' failed: {e}", path.as_ref().display());
                *self.state.lock() = PlayerState::Closed;
                false
            }
        }
    }

    fn build_graph(&self, path: &Path) -> Result<OpenGraph, MediaError> {
        let (audio_pkt_tx, audio_pkt_rx) = bounded(16);
        let (video_pkt_tx, video_pkt_rx) = bounded(16);
        let (stream_tx, stream_rx) = unbounded();

        let audio_credits = CreditGate::new(self.config.credit_bound);
        let video_credits = CreditGate::new(self.config.credit_bound);

        let demuxer = Demuxer::open(
            path.to_path_buf(),
            audio_credits,
            video_credits,
            audio_pkt_tx,
            video_pkt_tx,
            stream_tx,
            self.config,
        )?;

        let mut audio_descriptor = None;
        let mut video_descriptor = None;
        while let Ok(opened) = stream_rx.try_recv() {
            match opened.kind {
                framepipe_core::StreamKind::Audio => audio_descriptor = Some(opened.descriptor),
                framepipe_core::StreamKind::Video => video_descriptor = Some(opened.descriptor),
            }
        }
        let has_audio = audio_descriptor.is_some();
        let has_video = video_descriptor.is_some();

        let (audio_dec_out_tx, audio_dec_out_rx) = bounded(16);
        let audio_decoder = audio_descriptor.map(|descriptor| {
            let downstream = CreditGate::new(self.config.credit_bound);
            let decoder = AudioDecoder::new(
                audio_pkt_rx,
                audio_dec_out_tx,
                downstream,
                TARGET_CHANNELS,
                TARGET_RATE,
                self.config,
            );
            decoder.set_stream(descriptor);
            decoder
        });

        let (video_dec_out_tx, video_dec_out_rx) = bounded(16);
        let video_decoder = video_descriptor.map(|descriptor| {
            let downstream = CreditGate::new(self.config.credit_bound);
            let decoder = VideoDecoder::new(video_pkt_rx, video_dec_out_tx, downstream, self.config);
            decoder.set_stream(descriptor);
            decoder
        });

        let (audio_sync_out_tx, audio_sync_out_rx) = bounded(16);
        let (video_sync_out_tx, video_sync_out_rx) = bounded(16);
        let synchronizer = Synchronizer::new(
            audio_dec_out_rx,
            video_dec_out_rx,
            audio_sync_out_tx,
            video_sync_out_tx,
            Arc::clone(&self.clock),
            self.config,
            SyncPolicy::default(),
        );

        let (audio_relay_tx, audio_relay_rx) = bounded(16);
        let audio_pipeline = AudioPipeline::new(audio_sync_out_rx, audio_relay_tx, self.config);

        let gpu_for_pipeline = self.gpu.share().map_err(|e| MediaError::GpuRuntimeError { message: e.to_string() })?;
        let video_pipeline = VideoPipeline::new(
            video_sync_out_rx,
            gpu_for_pipeline,
            Arc::clone(&self.task_pool) as Arc<dyn framepipe_core::TaskPool>,
            self.config,
        );
        for surface in self.surfaces.lock().iter() {
            video_pipeline.attach_surface(Arc::clone(surface));
        }
        for kind in self.filters.lock().iter().copied() {
            video_pipeline.add_filter(kind);
        }

        let recording_audio_tap: Arc<Mutex<Option<Sender<AudioSamples>>>> = Arc::new(Mutex::new(None));
        let duration_secs = demuxer.duration_secs();
        let (relay_stop_tx, relay_stop_rx) = bounded::<()>(1);
        let relay_handle = spawn_audio_relay(
            audio_relay_rx,
            Arc::clone(&self.sink_bridge),
            Arc::clone(&self.listener),
            Arc::clone(&self.clock),
            Arc::clone(&recording_audio_tap),
            Arc::clone(&self.state),
            duration_secs,
            has_audio,
            has_video,
            relay_stop_rx,
        );

        Ok(OpenGraph {
            demuxer,
            audio_decoder,
            video_decoder,
            synchronizer,
            audio_pipeline,
            video_pipeline,
            has_audio,
            has_video,
            recording_audio_tap,
            relay_stop: relay_stop_tx,
            relay_handle: Some(relay_handle),
        })
    }

    fn start_production(&self, g: &OpenGraph) {
        g.demuxer.start();
        if let Some(d) = &g.audio_decoder {
            d.start();
        }
        if let Some(d) = &g.video_decoder {
            d.start();
        }
        g.video_pipeline.start();
    }

    fn pause_production(&self, g: &OpenGraph) {
        g.demuxer.pause();
        if let Some(d) = &g.audio_decoder {
            d.pause();
        }
        if let Some(d) = &g.video_decoder {
            d.pause();
        }
        g.video_pipeline.pause();
    }

    pub fn play(&self) {
        let graph = self.graph.lock();
        let Some(g) = graph.as_ref() else { return };
        self.start_production(g);
        *self.state.lock() = PlayerState::Playing;
        if let Some(l) = self.listener.lock().as_mut() {
            l.on_event(PlaybackEvent::Started);
        }
    }

    pub fn pause(&self) {
        let graph = self.graph.lock();
        let Some(g) = graph.as_ref() else { return };
        self.pause_production(g);
        *self.state.lock() = PlayerState::Paused;
        if let Some(l) = self.listener.lock().as_mut() {
            l.on_event(PlaybackEvent::Paused);
        }
    }

    /// `progress` in `[0, 1]`. Pauses production, seeks the demuxer
    /// (which injects the FLUSH pair spec.md §4.4 describes), resets the
    /// clock, and resumes only if playback was already running — a seek
    /// issued while paused stays paused.
    pub fn seek_to(&self, progress: f64) {
        let graph = self.graph.lock();
        let Some(g) = graph.as_ref() else { return };
        let was_playing = *self.state.lock() == PlayerState::Playing;

        self.pause_production(g);
        g.demuxer.seek_to(progress);
        self.clock.reset();

        if was_playing {
            self.start_production(g);
            *self.state.lock() = PlayerState::Playing;
        } else {
            *self.state.lock() = PlayerState::Paused;
        }
    }

    pub fn attach_display_view(&self, surface: Arc<dyn DisplaySurface>) {
        self.surfaces.lock().push(Arc::clone(&surface));
        if let Some(g) = self.graph.lock().as_ref() {
            g.video_pipeline.attach_surface(surface);
        }
    }

    pub fn detach_display_view(&self, surface: &Arc<dyn DisplaySurface>) {
        self.surfaces.lock().retain(|s| !Arc::ptr_eq(s, surface));
        if let Some(g) = self.graph.lock().as_ref() {
            g.video_pipeline.detach_surface(surface);
        }
    }

    pub fn add_video_filter(&self, kind: FilterKind) -> Option<FilterHandle> {
        if !kind.is_user_addable() {
            return None;
        }
        let mut filters = self.filters.lock();
        if !filters.contains(&kind) {
            filters.push(kind);
        }
        drop(filters);
        Some(self.graph.lock().as_ref().map(|g| g.video_pipeline.add_filter(kind)).unwrap_or(kind))
    }

    pub fn remove_video_filter(&self, kind: FilterKind) {
        self.filters.lock().retain(|k| *k != kind);
        if let Some(g) = self.graph.lock().as_ref() {
            g.video_pipeline.remove_filter(kind);
        }
    }

    /// Opens the recording chain (`AudioEncoder`/`VideoEncoder`/`Muxer`)
    /// and taps the currently-open file's decoded output into it.
    /// Requires a file to be open and no recording already running.
    pub fn start_recording(&self, path: impl AsRef<Path>, flags: RecordingFlags) -> Result<(), PlayerError> {
        if flags.is_empty() {
            return Err(PlayerError::EmptyRecordingFlags);
        }
        if self.is_recording.load(Ordering::Acquire) {
            return Err(PlayerError::AlreadyRecording);
        }
        let graph = self.graph.lock();
        let g = graph.as_ref().ok_or(PlayerError::NotOpen)?;

        let want_audio = flags.contains(RecordingFlags::AUDIO) && g.has_audio;
        let want_video = flags.contains(RecordingFlags::VIDEO) && g.has_video;

        let (ready_tx, ready_rx) = unbounded::<EncoderOpened>();
        let (audio_pkt_tx, audio_pkt_rx) = bounded(32);
        let (video_pkt_tx, video_pkt_rx) = bounded(32);

        let mut audio_samples_tx = None;
        let mut audio_encoder = None;
        if want_audio {
            let (tx, rx) = bounded::<AudioSamples>(32);
            let encoder = AudioEncoder::new(rx, audio_pkt_tx.clone(), ready_tx.clone(), self.config)
                .map_err(|e| PlayerError::Media(MediaError::EncodeFailed {
                    stream: framepipe_core::StreamKind::Audio,
                    message: e.to_string(),
                }))?;
            *g.recording_audio_tap.lock() = Some(tx.clone());
            audio_samples_tx = Some(tx);
            audio_encoder = Some(encoder);
        }

        let mut video_frame_tx = None;
        let mut video_encoder = None;
        if want_video {
            let gpu_for_encoder = self
                .gpu
                .share()
                .map_err(|e| PlayerError::Media(MediaError::GpuRuntimeError { message: e.to_string() }))?;
            let (tx, rx) = bounded::<VideoFrame>(32);
            let encoder = VideoEncoder::new(rx, gpu_for_encoder, video_pkt_tx.clone(), ready_tx, self.config);
            g.video_pipeline.set_recording_tap(tx.clone());
            video_frame_tx = Some(tx);
            video_encoder = Some(encoder);
        }

        let muxer = Muxer::new(
            path.as_ref().to_path_buf(),
            audio_pkt_rx,
            video_pkt_rx,
            ready_rx,
            Duration::from_millis(self.config.latch_poll_ms as u64),
            want_audio,
            want_video,
        )?;

        *self.recording.lock() =
            Some(RecordingChain { audio_samples_tx, video_frame_tx, audio_encoder, video_encoder, muxer });
        self.is_recording.store(true, Ordering::Release);
        Ok(())
    }

    /// Sends `END_OF_STREAM` down each tap so the encoders flush and the
    /// muxer writes its trailer, then joins the chain to completion on a
    /// background thread so the call itself doesn't block.
    pub fn stop_recording(&self) {
        if !self.is_recording.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(g) = self.graph.lock().as_ref() {
            g.recording_audio_tap.lock().take();
            g.video_pipeline.clear_recording_tap();
        }
        let Some(chain) = self.recording.lock().take() else { return };
        let tb = TimeBase::default();
        if let Some(tx) = &chain.audio_samples_tx {
            let _ = tx.send(AudioSamples::end_of_stream(tb));
        }
        if let Some(tx) = &chain.video_frame_tx {
            let _ = tx.send(VideoFrame::end_of_stream(tb));
        }
        thread::spawn(move || {
            if let Some(e) = chain.audio_encoder {
                e.wait_for_completion();
            }
            if let Some(e) = chain.video_encoder {
                e.wait_for_completion();
            }
            chain.muxer.wait_for_completion();
        });
    }

    /// Used on `Open`/`Drop`: there is no more source data to flush
    /// against, so the chain is torn down immediately rather than waited
    /// on for a graceful finish.
    fn stop_recording_abrupt(&self) {
        if !self.is_recording.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(g) = self.graph.lock().as_ref() {
            g.recording_audio_tap.lock().take();
            g.video_pipeline.clear_recording_tap();
        }
        if let Some(chain) = self.recording.lock().take() {
            if let Some(e) = chain.audio_encoder {
                e.join();
            }
            if let Some(e) = chain.video_encoder {
                e.join();
            }
            chain.muxer.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_recording_abrupt();
        if let Some(g) = self.graph.lock().take() {
            g.teardown();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_audio_relay(
    input: Receiver<AudioSamples>,
    sink_bridge: Arc<AudioSinkBridge>,
    listener: Arc<Mutex<Option<Box<dyn PlaybackListener>>>>,
    clock: Arc<Clock>,
    recording_tap: Arc<Mutex<Option<Sender<AudioSamples>>>>,
    state: Arc<Mutex<PlayerState>>,
    duration_secs: f64,
    has_audio: bool,
    has_video: bool,
    stop_rx: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut eof_reported = false;
        loop {
            if stop_rx.try_recv().is_ok() {
                return;
            }
            match input.recv_timeout(Duration::from_millis(100)) {
                Ok(unit) => {
                    if unit.flush {
                        sink_bridge.stop();
                    } else if !unit.end_of_stream {
                        sink_bridge.push(unit.remaining());
                        if let Some(l) = listener.lock().as_mut() {
                            l.on_event(PlaybackEvent::TimeChanged {
                                current_s: unit.timestamp_seconds(),
                                duration_s: duration_secs,
                            });
                        }
                        if let Some(tx) = recording_tap.lock().clone() {
                            let copy = AudioSamples::new(
                                unit.channels,
                                unit.sample_rate,
                                unit.remaining().to_vec(),
                                unit.pts,
                                unit.time_base,
                            );
                            let _ = tx.send(copy);
                        }
                    }
                    // `unit.end_of_stream`: the Synchronizer already marked
                    // `clock.audio_done()`; nothing else to do here.
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }

            let audio_finished = !has_audio || clock.audio_done();
            let video_finished = !has_video || clock.video_done();
            if audio_finished && video_finished && !eof_reported {
                eof_reported = true;
                if let Some(l) = listener.lock().as_mut() {
                    l.on_event(PlaybackEvent::Eof);
                }
                *state.lock() = PlayerState::Paused;
            }
        }
    })
}
