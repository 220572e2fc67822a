// crates/framepipe-engine/src/decode/mod.rs
//
// Shared control-plane types for AudioDecoder and VideoDecoder. Both
// share the same queue/worker/latch/credit-gate structure; only the
// codec and converter differ, so those live in audio.rs / video.rs.

pub mod audio;
pub mod video;

pub use audio::AudioDecoder;
pub use video::VideoDecoder;

use framepipe_core::StreamDescriptor;

pub(crate) enum DecoderCommand {
    SetStream(StreamDescriptor),
    Start,
    Pause,
    Stop,
}

/// Build a fresh decoder codec context from a `StreamDescriptor`'s raw
/// codec id and extradata. Mirrors `Stream::parameters()` →
/// `Context::from_parameters()` in spirit; done by hand here because the
/// descriptor crossed a thread boundary as plain data rather than as a
/// live ffmpeg `Parameters` handle borrowed from the demuxer's `Input`.
pub(crate) fn build_decoder_context(
    descriptor: &StreamDescriptor,
) -> anyhow::Result<ffmpeg_the_third::codec::context::Context> {
    use ffmpeg_the_third::ffi;

    unsafe {
        let av_id: ffi::AVCodecID = std::mem::transmute(descriptor.codec_id);
        let codec = ffmpeg_the_third::decoder::find(ffmpeg_the_third::codec::Id::from(av_id))
            .ok_or_else(|| anyhow::anyhow!("no decoder registered for codec id {}", descriptor.codec_id))?;

        let params = ffi::avcodec_parameters_alloc();
        if params.is_null() {
            anyhow::bail!("avcodec_parameters_alloc failed");
        }
        (*params).codec_id = av_id;
        (*params).codec_type = codec.medium().into();
        (*params).width = descriptor.width as i32;
        (*params).height = descriptor.height as i32;
        (*params).sample_rate = descriptor.sample_rate as i32;
        ffi::av_channel_layout_default(&mut (*params).ch_layout, descriptor.channels as i32);

        if !descriptor.extradata.is_empty() {
            let size = descriptor.extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffi::av_mallocz(size) as *mut u8;
            std::ptr::copy_nonoverlapping(descriptor.extradata.as_ptr(), buf, descriptor.extradata.len());
            (*params).extradata = buf;
            (*params).extradata_size = descriptor.extradata.len() as i32;
        }

        let ctx_ptr = ffi::avcodec_alloc_context3(codec.as_ptr());
        if ctx_ptr.is_null() {
            ffi::avcodec_parameters_free(&mut (params as *mut _));
            anyhow::bail!("avcodec_alloc_context3 failed");
        }
        let ret = ffi::avcodec_parameters_to_context(ctx_ptr, params);
        ffi::avcodec_parameters_free(&mut (params as *mut _));
        if ret < 0 {
            ffi::avcodec_free_context(&mut (ctx_ptr as *mut _));
            anyhow::bail!("avcodec_parameters_to_context failed: {ret}");
        }

        Ok(ffmpeg_the_third::codec::context::Context::wrap(ctx_ptr, None))
    }
}
