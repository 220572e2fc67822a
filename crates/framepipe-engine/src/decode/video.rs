// crates/framepipe-engine/src/decode/video.rs
//
// VideoDecoder: consumes Packets, emits VideoFrame (RGBA, no GPU work —
// that's VideoPipeline's job). Pixel-format conversion via SwsContext,
// the same idiom as the teacher's LiveDecoder.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video as AvVideoFrame;

use framepipe_core::{EngineConfig, Packet, StreamDescriptor, VideoFrame};

use super::{build_decoder_context, DecoderCommand};
use crate::ffi_send::SendPtr;
use crate::sync::{CreditGate, SyncLatch};

pub struct VideoDecoder {
    cmd_tx: Sender<DecoderCommand>,
    latch: std::sync::Arc<SyncLatch>,
    handle: Option<JoinHandle<()>>,
}

impl VideoDecoder {
    pub fn new(
        packet_rx: Receiver<Packet>,
        output_tx: Sender<VideoFrame>,
        downstream_credits: CreditGate,
        config: EngineConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = bounded::<DecoderCommand>(8);
        let latch = std::sync::Arc::new(SyncLatch::new());
        let worker_latch = std::sync::Arc::clone(&latch);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle =
            thread::spawn(move || run_worker(packet_rx, output_tx, downstream_credits, cmd_rx, worker_latch, poll));

        Self { cmd_tx, latch, handle: Some(handle) }
    }

    pub fn set_stream(&self, descriptor: StreamDescriptor) {
        let _ = self.cmd_tx.send(DecoderCommand::SetStream(descriptor));
        self.latch.notify();
    }

    pub fn start(&self) {
        let _ = self.cmd_tx.send(DecoderCommand::Start);
        self.latch.notify();
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(DecoderCommand::Pause);
        self.latch.notify();
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(DecoderCommand::Stop);
        self.latch.notify();
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

struct OpenedDecoder {
    decoder: ffmpeg::decoder::video::Video,
    scaler: Option<SwsContext>,
    time_base: framepipe_core::TimeBase,
    width: u32,
    height: u32,
}

fn run_worker(
    packet_rx: Receiver<Packet>,
    output_tx: Sender<VideoFrame>,
    downstream_credits: CreditGate,
    cmd_rx: Receiver<DecoderCommand>,
    latch: std::sync::Arc<SyncLatch>,
    poll: Duration,
) {
    let _ = &latch;
    let mut decoder: Option<SendPtr<OpenedDecoder>> = None;
    let mut pending: VecDeque<VideoFrame> = VecDeque::new();
    let mut running = false;
    let mut stopped = false;

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                DecoderCommand::SetStream(descriptor) => {
                    pending.clear();
                    let width = descriptor.width;
                    let height = descriptor.height;
                    let time_base = descriptor.time_base;
                    decoder = build_decoder_context(&descriptor)
                        .ok()
                        .and_then(|ctx| ctx.decoder().video().ok())
                        .map(|dec| SendPtr(OpenedDecoder { decoder: dec, scaler: None, time_base, width, height }));
                    if decoder.is_none() {
                        eprintln!("[decode:video] set_stream: failed to open decoder");
                    }
                }
                DecoderCommand::Start => running = true,
                DecoderCommand::Pause => running = false,
                DecoderCommand::Stop => stopped = true,
            }
        }

        if stopped {
            return;
        }

        while let Some(_front) = pending.front() {
            match downstream_credits.acquire() {
                Some(guard) => {
                    let unit = pending.pop_front().unwrap().with_release_hook(guard.into_release_hook());
                    let _ = output_tx.send(unit);
                }
                None => break,
            }
        }

        if !running || decoder.is_none() {
            thread::sleep(poll.min(Duration::from_millis(20)));
            continue;
        }

        match packet_rx.recv_timeout(poll) {
            Ok(packet) => {
                if packet.is_flush() {
                    pending.clear();
                    let _ = output_tx.send(VideoFrame::flush(packet.time_base));
                    continue;
                }
                if packet.is_end_of_stream() {
                    let _ = output_tx.send(VideoFrame::end_of_stream(packet.time_base));
                    continue;
                }

                let opened = decoder.as_mut().unwrap();
                let units = decode_packet(&mut opened.0, &packet);
                for unit in units {
                    match downstream_credits.acquire() {
                        Some(guard) => {
                            let _ = output_tx.send(unit.with_release_hook(guard.into_release_hook()));
                        }
                        None => pending.push_back(unit),
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn decode_packet(opened: &mut OpenedDecoder, packet: &Packet) -> Vec<VideoFrame> {
    let mut out = Vec::new();

    let mut av_packet = ffmpeg::Packet::copy(&packet.data);
    av_packet.set_pts(Some(packet.pts));

    if opened.decoder.send_packet(&av_packet).is_err() {
        eprintln!("[decode:video] send_packet failed, dropping packet");
        return out;
    }

    let mut decoded = AvVideoFrame::empty();
    while opened.decoder.receive_frame(&mut decoded).is_ok() {
        let scaler = opened.scaler.get_or_insert_with(|| {
            SwsContext::get(
                opened.decoder.format(),
                opened.decoder.width(),
                opened.decoder.height(),
                Pixel::RGBA,
                opened.width.max(1),
                opened.height.max(1),
                ScaleFlags::BILINEAR,
            )
            .expect("create swscale context")
        });

        let mut rgba = AvVideoFrame::empty();
        if scaler.run(&decoded, &mut rgba).is_err() {
            continue;
        }

        let stride = rgba.stride(0);
        let raw = rgba.data(0);
        let data: Vec<u8> = (0..opened.height as usize)
            .flat_map(|row| {
                let start = row * stride;
                &raw[start..start + opened.width as usize * 4]
            })
            .copied()
            .collect();

        let pts = decoded.pts().unwrap_or(packet.pts);
        out.push(VideoFrame::new(opened.width, opened.height, data, pts, opened.time_base));
    }

    out
}
