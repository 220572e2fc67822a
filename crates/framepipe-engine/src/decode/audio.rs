// crates/framepipe-engine/src/decode/audio.rs
//
// AudioDecoder: consumes Packets, emits AudioSamples. Resamples to the
// engine's target channel count/rate via the same
// `ffmpeg::software::resampling::Context` the teacher's encode path uses,
// producing interleaved S16 rather than the encoder's FLTP.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Sample;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AvAudioFrame;

use framepipe_core::{AudioSamples, EngineConfig, Packet, StreamDescriptor};

use super::{build_decoder_context, DecoderCommand};
use crate::ffi_send::SendPtr;
use crate::sync::{CreditGate, SyncLatch};

pub struct AudioDecoder {
    cmd_tx: Sender<DecoderCommand>,
    latch: std::sync::Arc<SyncLatch>,
    handle: Option<JoinHandle<()>>,
}

impl AudioDecoder {
    pub fn new(
        packet_rx: Receiver<Packet>,
        output_tx: Sender<AudioSamples>,
        downstream_credits: CreditGate,
        target_channels: u16,
        target_rate: u32,
        config: EngineConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = bounded::<DecoderCommand>(8);
        let latch = std::sync::Arc::new(SyncLatch::new());
        let worker_latch = std::sync::Arc::clone(&latch);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);

        let handle = thread::spawn(move || {
            run_worker(packet_rx, output_tx, downstream_credits, target_channels, target_rate, cmd_rx, worker_latch, poll)
        });

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
    decoder: ffmpeg::decoder::audio::Audio,
    resampler: Option<resampling::Context>,
    time_base: framepipe_core::TimeBase,
}

fn run_worker(
    packet_rx: Receiver<Packet>,
    output_tx: Sender<AudioSamples>,
    downstream_credits: CreditGate,
    target_channels: u16,
    target_rate: u32,
    cmd_rx: Receiver<DecoderCommand>,
    latch: std::sync::Arc<SyncLatch>,
    poll: Duration,
) {
    let _ = &latch; // the packet channel's recv_timeout is this decoder's wait point
    let mut decoder: Option<SendPtr<OpenedDecoder>> = None;
    let mut pending: VecDeque<AudioSamples> = VecDeque::new();
    let mut running = false;
    let mut stopped = false;

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                DecoderCommand::SetStream(descriptor) => {
                    pending.clear();
                    decoder = build_decoder_context(&descriptor)
                        .ok()
                        .and_then(|ctx| ctx.decoder().audio().ok())
                        .map(|dec| {
                            SendPtr(OpenedDecoder { decoder: dec, resampler: None, time_base: descriptor.time_base })
                        });
                    if decoder.is_none() {
                        eprintln!("[decode:audio] set_stream: failed to open decoder");
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

        // Drain anything buffered behind a previously exhausted credit gate
        // before accepting new packets, to preserve order.
        while let Some(front) = pending.front() {
            let _ = front;
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
                    let _ = output_tx.send(AudioSamples::flush(packet.time_base));
                    continue;
                }
                if packet.is_end_of_stream() {
                    let _ = output_tx.send(AudioSamples::end_of_stream(packet.time_base));
                    continue;
                }

                let opened = decoder.as_mut().unwrap();
                let units = decode_packet(&mut opened.0, &packet, target_channels, target_rate);
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

fn decode_packet(
    opened: &mut OpenedDecoder,
    packet: &Packet,
    target_channels: u16,
    target_rate: u32,
) -> Vec<AudioSamples> {
    let mut out = Vec::new();

    let mut av_packet = ffmpeg::Packet::copy(&packet.data);
    av_packet.set_pts(Some(packet.pts));

    if opened.decoder.send_packet(&av_packet).is_err() {
        eprintln!("[decode:audio] send_packet failed, dropping packet");
        return out;
    }

    let mut raw = AvAudioFrame::empty();
    while opened.decoder.receive_frame(&mut raw).is_ok() {
        let target_fmt = Sample::I16(SampleType::Packed);
        let target_layout = ChannelLayout::default(target_channels as i32);
        let needs_resample =
            raw.format() != target_fmt || raw.rate() != target_rate || raw.ch_layout().channels() != target_channels as i32;

        let interleaved = if needs_resample {
            let rs = opened.resampler.get_or_insert_with(|| {
                resampling::Context::get2(
                    raw.format(),
                    raw.ch_layout(),
                    raw.rate(),
                    target_fmt,
                    target_layout,
                    target_rate,
                )
                .expect("create audio resampler")
            });
            let mut resampled = AvAudioFrame::empty();
            if rs.run(&raw, &mut resampled).is_err() || resampled.samples() == 0 {
                continue;
            }
            samples_to_i16(&resampled, target_channels)
        } else {
            samples_to_i16(&raw, target_channels)
        };

        let pts = raw.pts().unwrap_or(packet.pts);
        out.push(AudioSamples::new(target_channels, target_rate, interleaved, pts, opened.time_base));
    }

    out
}

/// Pull interleaved S16 samples out of an (already-target-format) packed
/// S16 frame. `frame.data(0)` holds the single interleaved plane.
fn samples_to_i16(frame: &AvAudioFrame, channels: u16) -> Vec<i16> {
    let n = frame.samples() * channels as usize;
    let bytes = frame.data(0);
    let mut out = vec![0i16; n];
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const i16, out.as_mut_ptr(), n);
    }
    out
}
