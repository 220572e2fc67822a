// crates/framepipe-cli/src/main.rs
//
// Headless demo binary: opens a file, plays it against the software
// reference GpuContext, prints each PlaybackEvent, and exits at EOF or
// after an optional duration cap. No window, no eframe/egui — those are
// a host's concern, not the engine's. Grounded in the teacher's
// `ffmpeg_the_third::init()` startup call (src/main.rs), minus its
// eframe/egui windowing.

use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framepipe_core::PlaybackEvent;
use framepipe_engine::player::{Player, RecordingFlags};
use framepipe_engine::refimpl::SoftwareGpuContext;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: framepipe <input> [output.mp4]");
        return ExitCode::FAILURE;
    };
    let record_to = args.next();

    if let Err(e) = ffmpeg_the_third::init() {
        eprintln!("[cli] ffmpeg init failed: {e}");
        return ExitCode::FAILURE;
    }

    let player = Player::new(Box::new(SoftwareGpuContext::new()));

    let eof = Arc::new(AtomicBool::new(false));
    let eof_flag = Arc::clone(&eof);
    player.set_playback_listener(move |event: PlaybackEvent| {
        println!("[cli] {event:?}");
        if matches!(event, PlaybackEvent::Eof) {
            eof_flag.store(true, Ordering::Release);
        }
    });

    if !player.open(&input) {
        eprintln!("[cli] failed to open '{input}'");
        return ExitCode::FAILURE;
    }

    if let Some(output) = &record_to {
        if let Err(e) = player.start_recording(output, RecordingFlags::default()) {
            eprintln!("[cli] failed to start recording to '{output}': {e}");
            return ExitCode::FAILURE;
        }
    }

    player.play();

    while !eof.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }

    if record_to.is_some() {
        player.stop_recording();
        // give the graceful flush a moment to reach the muxer trailer
        // before the process exits out from under it.
        std::thread::sleep(Duration::from_millis(200));
    }

    ExitCode::SUCCESS
}
