// crates/framepipe-core/src/lib.rs
//
// Data types shared between framepipe-engine and any host consumer.
// No threads, no ffmpeg, no GPU calls here. Pure data plus the trait
// contracts that the engine calls into (GpuContext, AudioSink, DisplaySurface)
// and the host callback (PlaybackListener).

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod gpu;
pub mod listener;
pub mod packet;
pub mod samples;
pub mod sink;
pub mod stream;
pub mod surface;
pub mod time;
pub mod video_frame;

pub use clock::Clock;
pub use config::EngineConfig;
pub use error::MediaError;
pub use filter::{FilterKind, FilterParams, STICKER_MODEL_PATH_PARAM, STICKER_PATH_PARAM};
pub use gpu::{GpuContext, GpuError, PixelFormat, ProgramId, TextureId};
pub use listener::{PlaybackEvent, PlaybackListener};
pub use packet::{Flags, Packet, ReleaseHook, StreamKind};
pub use samples::AudioSamples;
pub use sink::AudioSink;
pub use stream::{SampleFormat, StreamDescriptor};
pub use surface::{DisplaySurface, FitMode, TaskPool, Viewport};
pub use time::TimeBase;
pub use video_frame::VideoFrame;
