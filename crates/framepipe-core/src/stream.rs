// crates/framepipe-core/src/stream.rs
//
// StreamDescriptor: what the Demuxer hands decoders during Open, once per
// stream, before the first Packet ever flows.

use crate::packet::StreamKind;
use crate::time::TimeBase;

/// Audio sample format, named rather than left as an ffmpeg enum so
/// framepipe-core stays free of a codec dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    S16,
    Fltp,
}

/// Per-stream parameters discovered during `Demuxer::open`. Carries
/// enough of the container's codec parameters (codec id + extradata) for
/// a decoder running on its own thread to build its own codec context,
/// since an ffmpeg `Stream` handle cannot itself cross threads.
#[derive(Clone, Debug)]
pub struct StreamDescriptor {
    pub kind: StreamKind,
    pub time_base: TimeBase,

    /// Raw `AVCodecID` as reported by the container.
    pub codec_id: i32,
    /// Codec-specific initialization data (e.g. SPS/PPS for H.264, or the
    /// AAC `AudioSpecificConfig`), copied out of `AVCodecParameters`.
    pub extradata: Vec<u8>,

    // Video-only fields; zero/default when `kind == Audio`.
    pub width: u32,
    pub height: u32,

    // Audio-only fields; zero/default when `kind == Video`.
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_format: SampleFormat,
}

impl StreamDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn video(time_base: TimeBase, codec_id: i32, extradata: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            kind: StreamKind::Video,
            time_base,
            codec_id,
            extradata,
            width,
            height,
            sample_rate: 0,
            channels: 0,
            sample_format: SampleFormat::S16,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn audio(
        time_base: TimeBase,
        codec_id: i32,
        extradata: Vec<u8>,
        sample_rate: u32,
        channels: u32,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            kind: StreamKind::Audio,
            time_base,
            codec_id,
            extradata,
            width: 0,
            height: 0,
            sample_rate,
            channels,
            sample_format,
        }
    }
}
