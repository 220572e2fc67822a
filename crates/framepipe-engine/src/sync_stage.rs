// crates/framepipe-engine/src/sync_stage.rs
//
// Synchronizer: audio-master clock. Two input channels, two output
// channels, one worker thread. Channel-based equivalent of spec.md
// §4.6's four-callback listener (`audioSamples`/`videoFrame`/
// `audioFinished`/`videoFinished`): forwarding a unit on `audio_out` /
// `video_out` *is* the callback.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use framepipe_core::{AudioSamples, Clock, EngineConfig, VideoFrame};

use crate::sync::SyncLatch;

/// The spec documents the "video beyond +τ" case as forwarded rather than
/// dropped, flagging the behavioral intent as ambiguous. Both readings
/// are implemented; `ForwardLate` is the default (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPolicy {
    ForwardLate,
    DropLate,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::ForwardLate
    }
}

pub struct Synchronizer {
    latch: Arc<SyncLatch>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Synchronizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        audio_in: Receiver<AudioSamples>,
        video_in: Receiver<VideoFrame>,
        audio_out: Sender<AudioSamples>,
        video_out: Sender<VideoFrame>,
        clock: Arc<Clock>,
        config: EngineConfig,
        policy: SyncPolicy,
    ) -> Self {
        let latch = Arc::new(SyncLatch::new());
        let worker_latch = Arc::clone(&latch);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let poll = Duration::from_millis(config.latch_poll_ms as u64);
        let tau_secs = config.sync_threshold_secs();

        let handle = thread::spawn(move || {
            run_worker(audio_in, video_in, audio_out, video_out, clock, policy, tau_secs, worker_latch, stop_rx, poll)
        });

        Self { latch, stop_tx, handle: Some(handle) }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
        self.latch.notify();
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
    audio_in: Receiver<AudioSamples>,
    video_in: Receiver<VideoFrame>,
    audio_out: Sender<AudioSamples>,
    video_out: Sender<VideoFrame>,
    clock: Arc<Clock>,
    policy: SyncPolicy,
    tau_secs: f64,
    latch: Arc<SyncLatch>,
    stop_rx: Receiver<()>,
    poll: Duration,
) {
    let mut video_buf: VecDeque<VideoFrame> = VecDeque::new();

    'outer: loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }

        // Only a unit actually forwarded, dropped, or flushed counts as
        // progress; merely moving a frame from the channel into
        // `video_buf` does not, or a video frame held back as "too early"
        // would count as progress every wake and this worker would spin
        // the CPU instead of parking on `latch` until audio advances.
        let mut progressed = false;

        // Drain the audio queue head-to-tail.
        loop {
            match audio_in.try_recv() {
                Ok(unit) => {
                    progressed = true;
                    if unit.flush {
                        video_buf.clear();
                        while audio_in.try_recv().is_ok() {}
                        let _ = audio_out.send(AudioSamples::flush(unit.time_base));
                        let _ = video_out.send(VideoFrame::flush(unit.time_base));
                        continue 'outer;
                    }
                    if unit.end_of_stream {
                        clock.set_audio_done(true);
                        let _ = audio_out.send(unit);
                        continue;
                    }
                    clock.set_audio_now(unit.timestamp_seconds());
                    let _ = audio_out.send(unit);
                }
                Err(_) => break,
            }
        }

        // Drain the video queue against the current audio clock.
        loop {
            if video_buf.is_empty() {
                match video_in.try_recv() {
                    Ok(v) => video_buf.push_back(v),
                    Err(_) => break,
                }
            }

            let front = video_buf.front().unwrap();
            if front.flush {
                progressed = true;
                let unit = video_buf.pop_front().unwrap();
                while audio_in.try_recv().is_ok() {}
                video_buf.clear();
                let _ = audio_out.send(AudioSamples::flush(unit.time_base));
                let _ = video_out.send(VideoFrame::flush(unit.time_base));
                continue 'outer;
            }
            if front.end_of_stream {
                progressed = true;
                clock.set_video_done(true);
                let unit = video_buf.pop_front().unwrap();
                let _ = video_out.send(unit);
                continue;
            }

            let delta = clock.audio_now() - front.timestamp_seconds();
            if delta > tau_secs {
                // Video too late.
                progressed = true;
                let unit = video_buf.pop_front().unwrap();
                clock.set_video_now(unit.timestamp_seconds());
                match policy {
                    SyncPolicy::ForwardLate => {
                        let _ = video_out.send(unit);
                    }
                    SyncPolicy::DropLate => drop(unit),
                }
                // Keep draining — the next buffered/incoming frame may
                // also be late.
            } else if delta < -tau_secs {
                // Video too early: leave it queued, stop for this wake
                // without claiming progress — nothing changes until
                // `audio_now` advances, so the wake loop below must
                // actually park instead of spinning on this frame.
                break;
            } else {
                progressed = true;
                let unit = video_buf.pop_front().unwrap();
                clock.set_video_now(unit.timestamp_seconds());
                let _ = video_out.send(unit);
                break;
            }
        }

        if !progressed {
            latch.wait(Some(poll));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framepipe_core::TimeBase;

    fn audio(ts_secs: f64) -> AudioSamples {
        let tb = TimeBase::new(1, 1000);
        AudioSamples::new(2, 48_000, vec![0; 4], tb.to_pts(ts_secs), tb)
    }

    fn video(ts_secs: f64) -> VideoFrame {
        let tb = TimeBase::new(1, 1000);
        VideoFrame::new(2, 2, vec![0; 16], tb.to_pts(ts_secs), tb)
    }

    #[test]
    fn in_threshold_video_is_forwarded_and_audio_ts_matches() {
        let (a_in_tx, a_in_rx) = crossbeam_channel::unbounded();
        let (v_in_tx, v_in_rx) = crossbeam_channel::unbounded();
        let (a_out_tx, a_out_rx) = crossbeam_channel::unbounded();
        let (v_out_tx, v_out_rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(Clock::new());
        let config = EngineConfig::default();

        let sync = Synchronizer::new(a_in_rx, v_in_rx, a_out_tx, v_out_tx, clock, config, SyncPolicy::ForwardLate);

        a_in_tx.send(audio(1.0)).unwrap();
        v_in_tx.send(video(1.01)).unwrap();

        let forwarded_audio = a_out_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!((forwarded_audio.timestamp_seconds() - 1.0).abs() < 1e-9);
        let forwarded_video = v_out_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!((forwarded_video.timestamp_seconds() - 1.01).abs() < 1e-9);

        sync.stop();
    }

    #[test]
    fn drop_late_policy_discards_frames_beyond_threshold() {
        let (a_in_tx, a_in_rx) = crossbeam_channel::unbounded();
        let (v_in_tx, v_in_rx) = crossbeam_channel::unbounded();
        let (a_out_tx, a_out_rx) = crossbeam_channel::unbounded();
        let (v_out_tx, v_out_rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(Clock::new());
        let config = EngineConfig::default();

        let sync = Synchronizer::new(a_in_rx, v_in_rx, a_out_tx, v_out_tx, clock, config, SyncPolicy::DropLate);

        a_in_tx.send(audio(2.0)).unwrap();
        v_in_tx.send(video(1.0)).unwrap(); // 1s late, well beyond default 50ms tau

        let _ = a_out_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(v_out_rx.recv_timeout(Duration::from_millis(200)).is_err());

        sync.stop();
    }

    #[test]
    fn early_video_stays_queued_until_audio_catches_up() {
        let (a_in_tx, a_in_rx) = crossbeam_channel::unbounded();
        let (v_in_tx, v_in_rx) = crossbeam_channel::unbounded();
        let (a_out_tx, a_out_rx) = crossbeam_channel::unbounded();
        let (v_out_tx, v_out_rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(Clock::new());
        let config = EngineConfig::default();

        let sync = Synchronizer::new(a_in_rx, v_in_rx, a_out_tx, v_out_tx, clock, config, SyncPolicy::ForwardLate);

        v_in_tx.send(video(5.0)).unwrap(); // far in the future relative to audio_now() == 0
        assert!(v_out_rx.recv_timeout(Duration::from_millis(200)).is_err());

        a_in_tx.send(audio(5.0)).unwrap();
        let _ = a_out_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        let forwarded = v_out_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!((forwarded.timestamp_seconds() - 5.0).abs() < 1e-9);

        sync.stop();
    }
}
