// crates/framepipe-engine/src/demux.rs
//
// Demuxer: reads the container, emits per-stream encoded packets, handles
// seek. Built on the same ffmpeg-the-third idioms as the teacher's
// probe/seek helpers, restructured into the continuous credit-gated
// worker loop spec.md §4.4 describes rather than the teacher's on-demand
// LiveDecoder.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type as MediaType;

use framepipe_core::{EngineConfig, MediaError, Packet, SampleFormat, StreamDescriptor, StreamKind};

use crate::sync::{CreditGate, SyncLatch, WaitResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemuxerState {
    Initial,
    Open,
    Running,
    Paused,
    Seeking,
    Stopped,
}

enum Command {
    Start,
    Pause,
    Stop,
    SeekTo(f64),
}

/// Sent once per stream during `open`, before any `Packet` flows.
pub struct StreamOpened {
    pub kind: StreamKind,
    pub descriptor: StreamDescriptor,
}

pub struct Demuxer {
    cmd_tx: Sender<Command>,
    latch: std::sync::Arc<SyncLatch>,
    state: std::sync::Arc<parking_lot::Mutex<DemuxerState>>,
    handle: Option<JoinHandle<()>>,
    duration_secs: f64,
}

impl Demuxer {
    /// Open `path`, scan streams, and report their descriptors on
    /// `stream_tx`. On success, spawns the worker thread (parked in
    /// `DemuxerState::Open` until `start()` is called) and returns the
    /// handle; the audio/video `CreditGate`s are owned by the caller
    /// (`Player`) so they can be shared with the decoders they gate.
    pub fn open(
        path: PathBuf,
        audio_credits: CreditGate,
        video_credits: CreditGate,
        audio_tx: Sender<Packet>,
        video_tx: Sender<Packet>,
        stream_tx: Sender<StreamOpened>,
        config: EngineConfig,
    ) -> Result<Self, MediaError> {
        let ictx = input(&path).map_err(|e| MediaError::OpenFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let audio_idx = ictx.streams().best(MediaType::Audio).map(|s| s.index());
        let video_idx = ictx.streams().best(MediaType::Video).map(|s| s.index());

        if audio_idx.is_none() && video_idx.is_none() {
            return Err(MediaError::OpenFailed {
                path,
                message: "no audio or video stream found".into(),
            });
        }

        if let Some(idx) = audio_idx {
            let stream = ictx.stream(idx).unwrap();
            let tb = stream.time_base();
            let params = stream.parameters();
            let (codec_id, rate, channels, extradata) = unsafe {
                let p = params.as_ptr();
                let extradata = if (*p).extradata.is_null() || (*p).extradata_size <= 0 {
                    Vec::new()
                } else {
                    std::slice::from_raw_parts((*p).extradata, (*p).extradata_size as usize).to_vec()
                };
                ((*p).codec_id as i32, (*p).sample_rate as u32, (*p).ch_layout.nb_channels as u32, extradata)
            };
            let descriptor = StreamDescriptor::audio(
                framepipe_core::TimeBase::new(tb.numerator(), tb.denominator()),
                codec_id,
                extradata,
                rate,
                channels,
                SampleFormat::S16,
            );
            let _ = stream_tx.send(StreamOpened { kind: StreamKind::Audio, descriptor });
        }

        if let Some(idx) = video_idx {
            let stream = ictx.stream(idx).unwrap();
            let tb = stream.time_base();
            let params = stream.parameters();
            let (codec_id, width, height, extradata) = unsafe {
                let p = params.as_ptr();
                let extradata = if (*p).extradata.is_null() || (*p).extradata_size <= 0 {
                    Vec::new()
                } else {
                    std::slice::from_raw_parts((*p).extradata, (*p).extradata_size as usize).to_vec()
                };
                ((*p).codec_id as i32, (*p).width as u32, (*p).height as u32, extradata)
            };
            let descriptor = framepipe_core::StreamDescriptor::video(
                framepipe_core::TimeBase::new(tb.numerator(), tb.denominator()),
                codec_id,
                extradata,
                width,
                height,
            );
            let _ = stream_tx.send(StreamOpened { kind: StreamKind::Video, descriptor });
        }

        let duration_secs = ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);

        let (cmd_tx, cmd_rx) = bounded::<Command>(8);
        let latch = std::sync::Arc::new(SyncLatch::new());
        let state = std::sync::Arc::new(parking_lot::Mutex::new(DemuxerState::Open));

        let worker_latch = std::sync::Arc::clone(&latch);
        let worker_state = std::sync::Arc::clone(&state);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle = thread::spawn(move || {
            run_worker(
                ictx,
                path,
                duration_secs,
                audio_idx,
                video_idx,
                audio_credits,
                video_credits,
                audio_tx,
                video_tx,
                cmd_rx,
                worker_latch,
                worker_state,
                poll,
            )
        });

        Ok(Self { cmd_tx, latch, state, handle: Some(handle), duration_secs })
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
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

    /// `progress` in `[0, 1]`.
    pub fn seek_to(&self, progress: f64) {
        let _ = self.cmd_tx.send(Command::SeekTo(progress.clamp(0.0, 1.0)));
        self.latch.notify();
    }

    pub fn state(&self) -> DemuxerState {
        *self.state.lock()
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    mut ictx: ffmpeg::format::context::Input,
    path: PathBuf,
    duration_secs: f64,
    audio_idx: Option<usize>,
    video_idx: Option<usize>,
    audio_credits: CreditGate,
    video_credits: CreditGate,
    audio_tx: Sender<Packet>,
    video_tx: Sender<Packet>,
    cmd_rx: crossbeam_channel::Receiver<Command>,
    latch: std::sync::Arc<SyncLatch>,
    state: std::sync::Arc<parking_lot::Mutex<DemuxerState>>,
    poll: Duration,
) {
    let mut pending_seek: Option<f64> = None;
    let mut audio_pending: Option<Packet> = None;
    let mut video_pending: Option<Packet> = None;
    let mut audio_eof = audio_idx.is_none();
    let mut video_eof = video_idx.is_none();

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Start => {
                    if *state.lock() != DemuxerState::Stopped {
                        *state.lock() = DemuxerState::Running;
                    }
                }
                Command::Pause => {
                    if *state.lock() != DemuxerState::Stopped {
                        *state.lock() = DemuxerState::Paused;
                    }
                }
                Command::Stop => {
                    *state.lock() = DemuxerState::Stopped;
                }
                Command::SeekTo(progress) => {
                    pending_seek = Some(progress);
                }
            }
        }

        if *state.lock() == DemuxerState::Stopped {
            return;
        }

        if let Some(progress) = pending_seek.take() {
            *state.lock() = DemuxerState::Seeking;
            let seek_ts = (progress * duration_secs * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
            if let Err(e) = ictx.seek(seek_ts, ..=seek_ts) {
                eprintln!("[demux] seek to {progress}: {e}");
            }
            audio_pending = None;
            video_pending = None;
            audio_eof = audio_idx.is_none();
            video_eof = video_idx.is_none();
            if audio_idx.is_some() {
                let _ = audio_tx.send(Packet::flush(StreamKind::Audio));
            }
            if video_idx.is_some() {
                let _ = video_tx.send(Packet::flush(StreamKind::Video));
            }
            *state.lock() = DemuxerState::Running;
            continue;
        }

        if *state.lock() == DemuxerState::Paused {
            latch.wait(Some(poll));
            continue;
        }

        // Flush anything buffered from a previous credit-exhausted wake
        // before reading further from the container.
        if let Some(pkt) = audio_pending.take() {
            if let Some(guard) = audio_credits.acquire() {
                let pkt = attach_guard(pkt, guard);
                let _ = audio_tx.send(pkt);
            } else {
                audio_pending = Some(pkt);
            }
        }
        if let Some(pkt) = video_pending.take() {
            if let Some(guard) = video_credits.acquire() {
                let pkt = attach_guard(pkt, guard);
                let _ = video_tx.send(pkt);
            } else {
                video_pending = Some(pkt);
            }
        }

        if audio_pending.is_some() || video_pending.is_some() {
            latch.wait(Some(poll));
            continue;
        }

        if audio_eof && video_eof {
            latch.wait(Some(poll));
            continue;
        }

        let has_credit = (!audio_eof && audio_credits.has_credits())
            || (!video_eof && video_credits.has_credits());
        if !has_credit {
            latch.wait(Some(poll));
            continue;
        }

        match ictx.packets().next() {
            Some(Ok((stream, av_packet))) => {
                let idx = stream.index();
                let tb = stream.time_base();
                let time_base = framepipe_core::TimeBase::new(tb.numerator(), tb.denominator());
                let pts = av_packet.pts().unwrap_or(0);
                let data = av_packet.data().unwrap_or(&[]).to_vec();
                let is_key = av_packet.is_key();

                if Some(idx) == audio_idx {
                    let pkt = Packet::new(StreamKind::Audio, data, pts, time_base)
                        .with_flags(if is_key {
                            framepipe_core::Flags::KEY_FRAME
                        } else {
                            framepipe_core::Flags::empty()
                        });
                    match audio_credits.acquire() {
                        Some(guard) => {
                            let _ = audio_tx.send(attach_guard(pkt, guard));
                        }
                        None => audio_pending = Some(pkt),
                    }
                } else if Some(idx) == video_idx {
                    let pkt = Packet::new(StreamKind::Video, data, pts, time_base)
                        .with_flags(if is_key {
                            framepipe_core::Flags::KEY_FRAME
                        } else {
                            framepipe_core::Flags::empty()
                        });
                    match video_credits.acquire() {
                        Some(guard) => {
                            let _ = video_tx.send(attach_guard(pkt, guard));
                        }
                        None => video_pending = Some(pkt),
                    }
                }
                // Packets on any other stream (subtitles, data) are ignored —
                // out of scope per spec.md §1.
            }
            Some(Err(e)) => {
                eprintln!("[demux] read error on '{}': {e}", path.display());
            }
            None => {
                // EOF: set paused and continue to service seek, per spec.md §4.4.
                if !audio_eof {
                    audio_eof = true;
                    let _ = audio_tx.send(Packet::end_of_stream(StreamKind::Audio));
                }
                if !video_eof {
                    video_eof = true;
                    let _ = video_tx.send(Packet::end_of_stream(StreamKind::Video));
                }
                *state.lock() = DemuxerState::Paused;
            }
        }
    }
}

fn attach_guard(pkt: Packet, guard: crate::sync::CreditGuard) -> Packet {
    pkt.with_release_hook(guard.into_release_hook())
}
