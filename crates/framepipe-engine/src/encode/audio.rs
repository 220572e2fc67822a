// crates/framepipe-engine/src/encode/audio.rs
//
// AudioEncoder: AAC, 44.1 kHz stereo FLTP, grounded in the teacher's
// `AudioFifo`/`AudioEncState` (encode.rs) — exactly `frame_size` samples
// per encoded frame, the remainder carried over, the tail zero-padded on
// flush.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::Sample;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AvAudioFrame;
use ffmpeg::util::rational::Rational;

use framepipe_core::{AudioSamples, EngineConfig, Packet, StreamKind, TimeBase};

use super::{describe_opened_encoder, EncoderOpened, AUDIO_RATE};
use crate::ffi_send::SendPtr;

pub struct AudioEncoder {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AudioEncoder {
    pub fn new(
        input: Receiver<AudioSamples>,
        packet_tx: Sender<Packet>,
        ready_tx: Sender<EncoderOpened>,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let aac = encoder::find(CodecId::AAC).ok_or_else(|| anyhow::anyhow!("AAC encoder not registered"))?;
        let enc_ctx = codec::context::Context::new_with_codec(aac);
        let mut enc = enc_ctx.encoder().audio()?;
        enc.set_rate(AUDIO_RATE as i32);
        enc.set_ch_layout(ChannelLayout::STEREO);
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(128_000);
        let encoder = enc.open_as_with(aac, ffmpeg::Dictionary::new())?;
        let frame_size = (encoder.frame_size() as usize).max(1024);

        let time_base = TimeBase::new(1, AUDIO_RATE as i32);
        let descriptor = describe_opened_encoder(
            encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            StreamKind::Audio,
            time_base,
        );
        let _ = ready_tx.send(EncoderOpened { kind: StreamKind::Audio, descriptor });

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);
        let encoder = SendPtr(encoder);

        let handle = thread::spawn(move || run_worker(input, packet_tx, encoder.0, frame_size, stop_rx, poll));

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

    /// Blocks until the worker exits on its own after processing an
    /// `END_OF_STREAM` unit sent through its input channel, without racing
    /// a `stop()` signal against that unit still sitting in the channel.
    /// Used by `StopRecording`'s graceful flush path; `join` remains the
    /// abrupt path used when the whole player is torn down mid-recording.
    pub fn wait_for_completion(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Stereo FLTP ring buffer; mono sources are duplicated to both channels.
struct AudioFifo {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl AudioFifo {
    fn new() -> Self {
        Self { left: Vec::new(), right: Vec::new() }
    }

    fn len(&self) -> usize {
        self.left.len()
    }

    fn push_interleaved(&mut self, data: &[i16], channels: u16) {
        if channels == 0 || data.is_empty() {
            return;
        }
        let channels = channels as usize;
        let frames = data.len() / channels;
        self.left.reserve(frames);
        self.right.reserve(frames);
        for frame in data.chunks_exact(channels) {
            let l = frame[0] as f32 / i16::MAX as f32;
            let r = if channels >= 2 { frame[1] as f32 / i16::MAX as f32 } else { l };
            self.left.push(l);
            self.right.push(r);
        }
    }

    fn pop_frame(&mut self, n: usize, sample_idx: i64) -> AvAudioFrame {
        let available = self.left.len().min(n);
        let mut frame = AvAudioFrame::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
        frame.set_rate(AUDIO_RATE);
        frame.set_pts(Some(sample_idx));

        unsafe {
            let ldst = std::slice::from_raw_parts_mut(frame.data_mut(0).as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n {
                ldst[available..].fill(0.0);
            }
            let rdst = std::slice::from_raw_parts_mut(frame.data_mut(1).as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n {
                rdst[available..].fill(0.0);
            }
        }

        self.left.drain(..available);
        self.right.drain(..available);
        frame
    }
}

fn run_worker(
    input: Receiver<AudioSamples>,
    packet_tx: Sender<Packet>,
    mut encoder: ffmpeg::encoder::audio::Audio,
    frame_size: usize,
    stop_rx: Receiver<()>,
    poll: Duration,
) {
    let audio_tb = Rational::new(1, AUDIO_RATE as i32);
    let time_base = TimeBase::new(1, AUDIO_RATE as i32);
    let mut fifo = AudioFifo::new();
    let mut out_sample_idx: i64 = 0;

    loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        match input.recv_timeout(poll) {
            Ok(unit) => {
                if unit.flush {
                    continue;
                }
                if unit.end_of_stream {
                    drain_fifo(&mut fifo, &mut encoder, &mut out_sample_idx, frame_size, audio_tb, time_base, &packet_tx, true);
                    let _ = encoder.send_eof();
                    drain_packets(&mut encoder, audio_tb, time_base, &packet_tx);
                    let _ = packet_tx.send(Packet::end_of_stream(StreamKind::Audio));
                    return;
                }
                fifo.push_interleaved(&unit.data, unit.channels);
                drain_fifo(&mut fifo, &mut encoder, &mut out_sample_idx, frame_size, audio_tb, time_base, &packet_tx, false);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn drain_fifo(
    fifo: &mut AudioFifo,
    encoder: &mut ffmpeg::encoder::audio::Audio,
    out_sample_idx: &mut i64,
    frame_size: usize,
    audio_tb: Rational,
    time_base: TimeBase,
    packet_tx: &Sender<Packet>,
    flush: bool,
) {
    while fifo.len() >= frame_size || (flush && fifo.len() > 0) {
        let frame = fifo.pop_frame(frame_size, *out_sample_idx);
        *out_sample_idx += frame_size as i64;
        if encoder.send_frame(&frame).is_err() {
            eprintln!("[encode:audio] send_frame failed");
            return;
        }
        drain_packets(encoder, audio_tb, time_base, packet_tx);
    }
}

fn drain_packets(
    encoder: &mut ffmpeg::encoder::audio::Audio,
    _audio_tb: Rational,
    time_base: TimeBase,
    packet_tx: &Sender<Packet>,
) {
    let mut pkt = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut pkt).is_ok() {
        let data = pkt.data().unwrap_or(&[]).to_vec();
        let pts = pkt.pts().unwrap_or(0);
        let _ = packet_tx.send(Packet::new(StreamKind::Audio, data, pts, time_base));
    }
}
