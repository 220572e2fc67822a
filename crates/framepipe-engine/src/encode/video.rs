// crates/framepipe-engine/src/encode/video.rs
//
// VideoEncoder: H.264 YUV420P, CRF 18 / preset fast, grounded in the
// teacher's `run_encode`/`encode_clip` video setup (encode.rs). Runs on
// its own thread holding a GPU context shared with VideoPipeline's, so it
// can read back the texture VideoPipeline already rendered rather than
// re-decoding or re-filtering anything itself.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video as AvVideoFrame;
use ffmpeg::util::rational::Rational;

use framepipe_core::{EngineConfig, GpuContext, Packet, PixelFormat, StreamKind, TimeBase, VideoFrame};

use super::{describe_opened_encoder, EncoderOpened};
use crate::filters::Filter;

/// Nominal frame-rate used only to give the monotonic PTS counter a
/// sensible time base; spec.md §4.11 only requires the counter be
/// monotonic, not tied to the source's real frame rate.
const VIDEO_FPS: i32 = 30;

pub struct VideoEncoder {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl VideoEncoder {
    pub fn new(
        input: Receiver<VideoFrame>,
        gpu: Box<dyn GpuContext>,
        packet_tx: Sender<Packet>,
        ready_tx: Sender<EncoderOpened>,
        config: EngineConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle = thread::spawn(move || run_worker(input, gpu, packet_tx, ready_tx, stop_rx, poll));

        Self { stop_tx, handle: Some(handle) }
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

    /// See `AudioEncoder::wait_for_completion`.
    pub fn wait_for_completion(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

struct Opened {
    encoder: ffmpeg::encoder::video::Video,
    scaler: SwsContext,
    flip: Filter,
    output_tex: framepipe_core::TextureId,
    width: u32,
    height: u32,
}

fn run_worker(
    input: Receiver<VideoFrame>,
    gpu: Box<dyn GpuContext>,
    packet_tx: Sender<Packet>,
    ready_tx: Sender<EncoderOpened>,
    stop_rx: Receiver<()>,
    poll: Duration,
) {
    if gpu.make_current().is_err() {
        eprintln!("[encode:video] failed to make GPU context current, worker exiting");
        return;
    }

    let time_base = TimeBase::new(1, VIDEO_FPS);
    let frame_tb = Rational::new(1, VIDEO_FPS);
    let mut opened: Option<Opened> = None;
    let mut frame_idx: i64 = 0;

    loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        match input.recv_timeout(poll) {
            Ok(frame) => {
                if frame.flush {
                    continue;
                }
                if frame.end_of_stream {
                    if let Some(mut o) = opened.take() {
                        let _ = o.encoder.send_eof();
                        drain_packets(&mut o.encoder, time_base, &packet_tx);
                        gpu.destroy_texture(o.output_tex);
                        o.flip.destroy(gpu.as_ref());
                    }
                    let _ = packet_tx.send(Packet::end_of_stream(StreamKind::Video));
                    return;
                }

                let Some(texture) = frame.texture else {
                    eprintln!("[encode:video] frame has no GPU texture, dropping");
                    continue;
                };

                if opened.is_none() {
                    match open_encoder(gpu.as_ref(), frame.width, frame.height, frame_tb) {
                        Ok(o) => {
                            let descriptor = describe_opened_encoder(
                                o.encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
                                StreamKind::Video,
                                time_base,
                            );
                            let _ = ready_tx.send(EncoderOpened { kind: StreamKind::Video, descriptor });
                            opened = Some(o);
                        }
                        Err(e) => {
                            eprintln!("[encode:video] failed to open H.264 encoder: {e}");
                            continue;
                        }
                    }
                }

                let o = opened.as_mut().unwrap();
                if let Err(e) = encode_frame(gpu.as_ref(), o, texture, frame_idx, time_base, &packet_tx) {
                    eprintln!("[encode:video] {e}");
                }
                frame_idx += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }

    if let Some(mut o) = opened.take() {
        gpu.destroy_texture(o.output_tex);
        o.flip.destroy(gpu.as_ref());
    }
    let _ = gpu.done_current();
}

fn open_encoder(gpu: &dyn GpuContext, width: u32, height: u32, frame_tb: Rational) -> anyhow::Result<Opened> {
    let h264 = encoder::find(CodecId::H264).ok_or_else(|| anyhow::anyhow!("H.264 encoder not registered"))?;
    let enc_ctx = codec::context::Context::new_with_codec(h264);
    let mut enc = enc_ctx.encoder().video()?;
    enc.set_width(width);
    enc.set_height(height);
    enc.set_format(Pixel::YUV420P);
    enc.set_time_base(frame_tb);
    enc.set_frame_rate(Some(frame_tb.invert()));
    enc.set_bit_rate(0); // CRF controls quality, matching the teacher's VBR setup

    let mut opts = ffmpeg::Dictionary::new();
    opts.set("crf", "18");
    opts.set("preset", "fast");
    let mut encoder = enc.open_as_with(h264, opts)?;
    encoder.set_aspect_ratio(Rational::new(1, 1));

    let scaler = SwsContext::get(Pixel::RGBA, width, height, Pixel::YUV420P, width, height, ScaleFlags::BILINEAR)?;
    let output_tex = gpu.create_texture(width, height, PixelFormat::Rgba8)?;

    Ok(Opened { encoder, scaler, flip: Filter::new(framepipe_core::FilterKind::FlipVertical), output_tex, width, height })
}

fn encode_frame(
    gpu: &dyn GpuContext,
    opened: &mut Opened,
    source_tex: framepipe_core::TextureId,
    frame_idx: i64,
    time_base: TimeBase,
    packet_tx: &Sender<Packet>,
) -> anyhow::Result<()> {
    opened
        .flip
        .render(gpu, source_tex, opened.output_tex, opened.width, opened.height)
        .map_err(|e| anyhow::anyhow!("flip render: {e}"))?;

    let rgba = gpu
        .read_texture(opened.output_tex, opened.width, opened.height)
        .map_err(|e| anyhow::anyhow!("readback: {e}"))?;

    let mut src = AvVideoFrame::new(Pixel::RGBA, opened.width, opened.height);
    let stride = src.stride(0);
    {
        let dst = src.data_mut(0);
        for row in 0..opened.height as usize {
            let row_len = opened.width as usize * 4;
            let src_start = row * row_len;
            let dst_start = row * stride;
            dst[dst_start..dst_start + row_len].copy_from_slice(&rgba[src_start..src_start + row_len]);
        }
    }

    let mut yuv = AvVideoFrame::empty();
    opened.scaler.run(&src, &mut yuv)?;
    yuv.set_pts(Some(frame_idx));
    unsafe {
        (*yuv.as_mut_ptr()).sample_aspect_ratio = ffmpeg::ffi::AVRational { num: 1, den: 1 };
    }

    opened.encoder.send_frame(&yuv)?;
    drain_packets(&mut opened.encoder, time_base, packet_tx);
    Ok(())
}

fn drain_packets(encoder: &mut ffmpeg::encoder::video::Video, time_base: TimeBase, packet_tx: &Sender<Packet>) {
    let mut pkt = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut pkt).is_ok() {
        let data = pkt.data().unwrap_or(&[]).to_vec();
        let pts = pkt.pts().unwrap_or(0);
        let is_key = pkt.is_key();
        let mut unit = Packet::new(StreamKind::Video, data, pts, time_base);
        if is_key {
            unit = unit.with_flags(framepipe_core::Flags::KEY_FRAME);
        }
        let _ = packet_tx.send(unit);
    }
}
