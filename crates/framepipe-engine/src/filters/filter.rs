// crates/framepipe-engine/src/filters/filter.rs
//
// Filter: one shader stage in the chain. Shader source + compiled
// program handle live here, alongside the parameter bag shipped from
// framepipe-core. Mirrors the WGSL-raw-string-constant idiom used for
// texture shaders in the renderer this GpuContext shape is modeled on.

use framepipe_core::{FilterKind, FilterParams, GpuContext, GpuError, ProgramId, TextureId, STICKER_PATH_PARAM};

const VERTEX_QUAD: &str = r#"
@vertex fn main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    var pos = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0), vec2<f32>(1.0, 1.0));
    return vec4<f32>(pos[idx], 0.0, 1.0);
}"#;

const IDENTITY_FRAG: &str = r#"
@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(frame, frame_sampler, uv);
}"#;

const FLIP_VERTICAL_FRAG: &str = r#"
@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(frame, frame_sampler, vec2<f32>(uv.x, 1.0 - uv.y));
}"#;

const GRAY_FRAG: &str = r#"
@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(frame, frame_sampler, uv);
    let l = dot(c.rgb, vec3<f32>(0.299, 0.587, 0.114));
    return vec4<f32>(l, l, l, c.a);
}"#;

const INVERT_FRAG: &str = r#"
@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(frame, frame_sampler, uv);
    return vec4<f32>(1.0 - c.rgb, c.a);
}"#;

const STICKER_FRAG: &str = r#"
@fragment fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(frame, frame_sampler, uv);
    let m = textureSample(sticker_mask, sticker_sampler, uv);
    return mix(c, m, m.a);
}"#;

fn fragment_source(kind: FilterKind) -> &'static str {
    match kind {
        FilterKind::FlipVertical => FLIP_VERTICAL_FRAG,
        FilterKind::Gray => GRAY_FRAG,
        FilterKind::Invert => INVERT_FRAG,
        FilterKind::Sticker => STICKER_FRAG,
    }
}

/// One stage of the video filter chain. Construction (shader compile) is
/// deferred until the first `render` call on the GPU thread, per
/// VideoPipeline's filter-management contract.
pub struct Filter {
    kind: FilterKind,
    params: FilterParams,
    program: Option<ProgramId>,
    sticker_mask: Option<TextureId>,
}

impl Filter {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind, params: FilterParams::new(), program: None, sticker_mask: None }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut FilterParams {
        &mut self.params
    }

    /// PreRender (lazy compile, cached thereafter) + MainRender (bind and
    /// draw, delegated to the GpuContext's `blit`) + PostRender (unbind,
    /// implicit once `blit` returns). Returns `Ok(true)` on a normal
    /// render, `Ok(false)` on a recoverable setup failure the caller
    /// forwards the input unchanged for, per spec.md §7.
    pub fn render(
        &mut self,
        ctx: &dyn GpuContext,
        input: TextureId,
        output: TextureId,
        width: u32,
        height: u32,
    ) -> Result<bool, GpuError> {
        if self.kind == FilterKind::Sticker {
            self.ensure_sticker_mask(ctx, width, height)?;
        }

        let program = match self.program {
            Some(p) => p,
            None => {
                let compiled = ctx.compile_program(VERTEX_QUAD, fragment_source(self.kind))?;
                self.program = Some(compiled);
                compiled
            }
        };

        ctx.blit(program, input, output, width, height)
    }

    fn ensure_sticker_mask(&mut self, ctx: &dyn GpuContext, width: u32, height: u32) -> Result<(), GpuError> {
        if self.params.get_string(STICKER_PATH_PARAM).is_none() {
            return Ok(());
        }
        if self.sticker_mask.is_none() {
            let tex = ctx.create_texture(width, height, framepipe_core::PixelFormat::Rgba8)?;
            self.sticker_mask = Some(tex);
        }
        Ok(())
    }

    /// Release the GPU resources this filter holds. Must run on the
    /// thread that created them (`VideoPipeline`'s GPU thread).
    pub fn destroy(&mut self, ctx: &dyn GpuContext) {
        if let Some(program) = self.program.take() {
            ctx.destroy_program(program);
        }
        if let Some(tex) = self.sticker_mask.take() {
            ctx.destroy_texture(tex);
        }
    }
}
