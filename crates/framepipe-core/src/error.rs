// crates/framepipe-core/src/error.rs
//
// Structured error taxonomy for the Player/stage boundary. Internal
// ffmpeg/IO failures still propagate as anyhow::Result up to the point
// where a stage decides how to classify them; this enum is what crosses
// into user-observable state.

use std::path::PathBuf;
use thiserror::Error;

use crate::packet::StreamKind;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("open failed for '{path}': {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("decode failed on {stream:?} stream: {message}")]
    DecodeFailed { stream: StreamKind, message: String },

    #[error("decoder fatal on {stream:?} stream: {message}")]
    DecoderFatal { stream: StreamKind, message: String },

    #[error("GPU shader compile failed: {message}")]
    GpuCompileFailed { message: String },

    #[error("GPU runtime error: {message}")]
    GpuRuntimeError { message: String },

    #[error("encode failed on {stream:?} stream: {message}")]
    EncodeFailed { stream: StreamKind, message: String },

    #[error("muxer write failed: {message}")]
    MuxerWriteFailed { message: String },
}
