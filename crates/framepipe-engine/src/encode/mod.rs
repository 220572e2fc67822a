// crates/framepipe-engine/src/encode/mod.rs
//
// Recording chain: AudioEncoder / VideoEncoder / Muxer, grounded in the
// teacher's single-threaded `encode_timeline` (AAC FIFO, H.264 CRF/preset,
// `avcodec_parameters_from_context` FFI copy-out, rescale-then-write),
// restructured into three independent worker threads per spec.md §4.11,
// since ffmpeg's output context cannot be safely written from more than
// one thread.

pub mod audio;
pub mod muxer;
pub mod video;

pub use audio::AudioEncoder;
pub use muxer::Muxer;
pub use video::VideoEncoder;

use framepipe_core::{StreamDescriptor, StreamKind, TimeBase};

/// Output sample rate every `AudioEncoder` targets, matching the
/// teacher's `AUDIO_RATE` constant.
pub const AUDIO_RATE: u32 = 44_100;

/// Sent once by each encoder right after it opens its codec. Carries
/// enough raw codec state (codec id, extradata, dimensions/rate) for the
/// `Muxer` to build that stream's `AVCodecParameters` from scratch,
/// without an `!Send` live ffmpeg context ever crossing the encoder →
/// muxer thread boundary — the same `StreamDescriptor` shape the
/// `Demuxer` hands decoders during `Open`.
pub struct EncoderOpened {
    pub kind: StreamKind,
    pub descriptor: StreamDescriptor,
}

/// Read back `codec_id`/`extradata` from a just-opened encoder context via
/// the same FFI round-trip the teacher uses to copy encoder state into a
/// muxer stream's `codecpar` (`avcodec_parameters_from_context`), except
/// here the readback lands in a `StreamDescriptor` instead of directly into
/// an output stream, since the two live on different threads.
pub(crate) fn describe_opened_encoder(
    ctx_ptr: *mut ffmpeg_the_third::ffi::AVCodecContext,
    kind: StreamKind,
    time_base: TimeBase,
) -> StreamDescriptor {
    use ffmpeg_the_third::ffi;

    unsafe {
        let params = ffi::avcodec_parameters_alloc();
        ffi::avcodec_parameters_from_context(params, ctx_ptr);

        let extradata = if (*params).extradata.is_null() || (*params).extradata_size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts((*params).extradata, (*params).extradata_size as usize).to_vec()
        };
        let codec_id = (*params).codec_id as i32;

        let descriptor = match kind {
            StreamKind::Video => StreamDescriptor::video(
                time_base,
                codec_id,
                extradata,
                (*params).width as u32,
                (*params).height as u32,
            ),
            StreamKind::Audio => StreamDescriptor::audio(
                time_base,
                codec_id,
                extradata,
                (*params).sample_rate as u32,
                (*params).ch_layout.nb_channels as u32,
                framepipe_core::SampleFormat::Fltp,
            ),
        };

        ffi::avcodec_parameters_free(&mut (params as *mut _));
        descriptor
    }
}
