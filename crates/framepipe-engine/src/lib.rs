// crates/framepipe-engine/src/lib.rs
//
// The pipeline engine: SyncLatch/SerialTaskQueue/CreditGate, the
// per-stage workers (Demuxer, AudioDecoder/VideoDecoder, Synchronizer,
// AudioPipeline, VideoPipeline, FilterChain, the recording chain), and
// the Player façade that wires them together.

pub mod audio_pipeline;
pub mod audio_sink_bridge;
pub mod decode;
pub mod demux;
pub mod encode;
pub mod ffi_send;
pub mod filters;
pub mod player;
pub mod refimpl;
pub mod sync;
pub mod sync_stage;
pub mod video_pipeline;

pub use audio_pipeline::AudioPipeline;
pub use audio_sink_bridge::AudioSinkBridge;
pub use decode::{AudioDecoder, VideoDecoder};
pub use demux::{Demuxer, DemuxerState, StreamOpened};
pub use encode::{AudioEncoder, EncoderOpened, Muxer, VideoEncoder};
pub use filters::{Filter, FilterChain, FilterHandle};
pub use player::{Player, PlayerError, PlayerState, RecordingFlags};
pub use sync::{CreditGate, CreditGuard, SerialTaskQueue, SyncLatch, WaitResult};
pub use sync_stage::{SyncPolicy, Synchronizer};
