// crates/framepipe-engine/src/encode/muxer.rs
//
// Muxer: one output container, two streams. Incoming packets are
// rescaled from the encoder's time base to the stream's time base and
// enqueued per stream; a packet is written only when both queues are
// non-empty, smaller-PTS-first, per spec.md §4.11. Once one stream
// finishes, its queue is drained against the other until that stream
// also finishes. Grounded in the teacher's `open_output`/`add_stream`/
// `write_header`/`rescale_ts`/`write_interleaved`/`write_trailer`
// sequence (`encode.rs`), restructured onto its own worker thread that
// owns the output context exclusively — ffmpeg's output context is not
// safely written from more than one thread, unlike the teacher's
// single-threaded `run_encode`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::context::Output;
use ffmpeg::util::rational::Rational;

use framepipe_core::{MediaError, Packet, StreamDescriptor, StreamKind};

use super::EncoderOpened;
use crate::ffi_send::SendPtr;

pub struct Muxer {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Muxer {
    /// `audio_in` / `video_in` carry encoded `Packet`s from `AudioEncoder`
    /// / `VideoEncoder`; `ready_rx` carries the one `EncoderOpened` each
    /// sends right after opening its codec. `expect_audio`/`expect_video`
    /// come from `StartRecording`'s `RecordingFlags` — a stream that isn't
    /// expected is treated as already finished and never blocks the
    /// header write or the drain-to-completion check, so audio-only or
    /// video-only recordings don't hang waiting for a stream that was
    /// never going to open.
    pub fn new(
        path: PathBuf,
        audio_in: Receiver<Packet>,
        video_in: Receiver<Packet>,
        ready_rx: Receiver<EncoderOpened>,
        poll: Duration,
        expect_audio: bool,
        expect_video: bool,
    ) -> Result<Self, MediaError> {
        let octx = ffmpeg::format::output(&path).map_err(|e| MediaError::MuxerWriteFailed {
            message: format!("could not open output '{}': {e}", path.display()),
        })?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let octx = SendPtr(octx);

        let handle = thread::spawn(move || {
            run_worker(octx.0, path, audio_in, video_in, ready_rx, stop_rx, poll, expect_audio, expect_video)
        });

        Ok(Self { stop_tx, handle: Some(handle) })
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    /// Blocks until the worker exits on its own after both streams report
    /// `END_OF_STREAM` and drain, rather than forcing `stop()` and
    /// possibly truncating the trailing packets still queued. See
    /// `AudioEncoder::wait_for_completion`.
    pub fn wait_for_completion(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

struct StreamState {
    index: usize,
    stream_tb: Rational,
    queue: VecDeque<Packet>,
    finished: bool,
}

impl StreamState {
    fn source_tb(pkt: &Packet) -> Rational {
        Rational::new(pkt.time_base.num, pkt.time_base.den)
    }
}

/// Tracks one of the two possible streams through the muxer's lifecycle.
/// `NotExpected` (the stream was excluded by `RecordingFlags`) and
/// `Pending` (expected but its encoder hasn't reported `EncoderOpened`
/// yet) both read as "nothing to write, not blocking drain" until the
/// stream actually opens.
enum Slot {
    NotExpected,
    Pending,
    Open(StreamState),
}

impl Slot {
    fn is_blocking(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    fn state_mut(&mut self) -> Option<&mut StreamState> {
        match self {
            Slot::Open(s) => Some(s),
            _ => None,
        }
    }

    fn state(&self) -> Option<&StreamState> {
        match self {
            Slot::Open(s) => Some(s),
            _ => None,
        }
    }

    fn finished(&self) -> bool {
        match self {
            Slot::NotExpected => true,
            Slot::Pending => false,
            Slot::Open(s) => s.finished,
        }
    }

    fn queue_empty(&self) -> bool {
        self.state().map(|s| s.queue.is_empty()).unwrap_or(true)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    mut octx: Output,
    path: PathBuf,
    audio_in: Receiver<Packet>,
    video_in: Receiver<Packet>,
    ready_rx: Receiver<EncoderOpened>,
    stop_rx: Receiver<()>,
    poll: Duration,
    expect_audio: bool,
    expect_video: bool,
) {
    let mut audio = if expect_audio { Slot::Pending } else { Slot::NotExpected };
    let mut video = if expect_video { Slot::Pending } else { Slot::NotExpected };

    // avcodec_parameters cannot be copied in until every expected encoder
    // has reported its opened codec state; the container header cannot be
    // written until every expected stream exists.
    while audio.is_blocking() || video.is_blocking() {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        match ready_rx.recv_timeout(poll) {
            Ok(opened) => match add_stream(&mut octx, &opened.descriptor) {
                Ok(state) => match opened.kind {
                    StreamKind::Audio => audio = Slot::Open(state),
                    StreamKind::Video => video = Slot::Open(state),
                },
                Err(e) => eprintln!("[mux] failed to add {:?} stream: {e}", opened.kind),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }

    if let Err(e) = octx.write_header() {
        eprintln!("[mux] write_header failed for '{}': {e}", path.display());
        return;
    }

    loop {
        let stopping = stop_rx.try_recv().is_ok();

        pull_pending(&audio_in, &mut audio);
        pull_pending(&video_in, &mut video);

        let progressed = write_ready(&mut octx, &mut audio, &mut video);

        let drained = audio.finished() && video.finished() && audio.queue_empty() && video.queue_empty();

        if drained || stopping {
            break;
        }
        if !progressed {
            thread::sleep(poll.min(Duration::from_millis(20)));
        }
    }

    if let Err(e) = octx.write_trailer() {
        eprintln!("[mux] write_trailer failed for '{}': {e}", path.display());
    }
}

fn pull_pending(rx: &Receiver<Packet>, slot: &mut Slot) {
    let Some(state) = slot.state_mut() else { return };
    while let Ok(pkt) = rx.try_recv() {
        if pkt.is_flush() {
            state.queue.clear();
            continue;
        }
        if pkt.is_end_of_stream() {
            state.finished = true;
            continue;
        }
        state.queue.push_back(pkt);
    }
}

/// Writes whatever packets can be written right now: both queues
/// non-empty writes the smaller-PTS-first one; once a stream is
/// finished and drained (or was never expected), the other stream's
/// queue is written eagerly with nothing left to compare it against.
fn write_ready(octx: &mut Output, audio: &mut Slot, video: &mut Slot) -> bool {
    let mut progressed = false;
    loop {
        let audio_ts = audio.state().and_then(|s| s.queue.front()).map(Packet::timestamp_seconds);
        let video_ts = video.state().and_then(|s| s.queue.front()).map(Packet::timestamp_seconds);

        let wrote = match (audio_ts, video_ts) {
            (Some(a), Some(v)) => {
                if a <= v {
                    write_from(octx, audio)
                } else {
                    write_from(octx, video)
                }
            }
            (Some(_), None) if video.finished() => write_from(octx, audio),
            (None, Some(_)) if audio.finished() => write_from(octx, video),
            _ => false,
        };
        if !wrote {
            break;
        }
        progressed = true;
    }
    progressed
}

fn write_from(octx: &mut Output, slot: &mut Slot) -> bool {
    let Some(state) = slot.state_mut() else { return false };
    let Some(pkt) = state.queue.pop_front() else { return false };
    write_one(octx, state, pkt);
    true
}

fn write_one(octx: &mut Output, state: &StreamState, pkt: Packet) {
    let src_tb = StreamState::source_tb(&pkt);
    let mut av_pkt = ffmpeg::Packet::copy(&pkt.data);
    av_pkt.set_pts(Some(pkt.pts));
    av_pkt.set_dts(Some(pkt.pts));
    if pkt.is_key_frame() {
        unsafe {
            (*av_pkt.as_mut_ptr()).flags |= ffmpeg::ffi::AV_PKT_FLAG_KEY;
        }
    }
    av_pkt.set_stream(state.index);
    av_pkt.rescale_ts(src_tb, state.stream_tb);
    if let Err(e) = av_pkt.write_interleaved(octx) {
        eprintln!("[mux] write_interleaved failed: {e}");
    }
}

fn add_stream(octx: &mut Output, descriptor: &StreamDescriptor) -> anyhow::Result<StreamState> {
    use ffmpeg::ffi;

    let av_id: ffi::AVCodecID = unsafe { std::mem::transmute(descriptor.codec_id) };
    let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::from(av_id))
        .ok_or_else(|| anyhow::anyhow!("no encoder registered for codec id {}", descriptor.codec_id))?;

    let mut stream = octx.add_stream(codec)?;
    let index = stream.index();
    let tb = Rational::new(descriptor.time_base.num, descriptor.time_base.den);
    stream.set_time_base(tb);

    unsafe {
        let st_ptr = stream.as_mut_ptr();
        let codecpar = (*st_ptr).codecpar;
        (*codecpar).codec_id = av_id;
        (*codecpar).codec_type = codec.medium().into();

        match descriptor.kind {
            StreamKind::Video => {
                (*codecpar).width = descriptor.width as i32;
                (*codecpar).height = descriptor.height as i32;
            }
            StreamKind::Audio => {
                (*codecpar).sample_rate = descriptor.sample_rate as i32;
                ffi::av_channel_layout_default(&mut (*codecpar).ch_layout, descriptor.channels as i32);
            }
        }

        if !descriptor.extradata.is_empty() {
            let size = descriptor.extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffi::av_mallocz(size) as *mut u8;
            std::ptr::copy_nonoverlapping(descriptor.extradata.as_ptr(), buf, descriptor.extradata.len());
            (*codecpar).extradata = buf;
            (*codecpar).extradata_size = descriptor.extradata.len() as i32;
        }
    }

    Ok(StreamState { index, stream_tb: tb, queue: VecDeque::new(), finished: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smaller_pts_first_ordering() {
        // Pure ordering logic, exercised against plain VecDeques rather than
        // a real Output, since a real container needs a real codec.
        use framepipe_core::TimeBase;

        let tb = TimeBase::new(1, 1000);
        let a = Packet::new(StreamKind::Audio, vec![1], tb.to_pts(0.5), tb);
        let v = Packet::new(StreamKind::Video, vec![2], tb.to_pts(0.2), tb);
        assert!(v.timestamp_seconds() < a.timestamp_seconds());
    }
}
