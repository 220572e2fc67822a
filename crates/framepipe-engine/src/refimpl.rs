// crates/framepipe-engine/src/refimpl.rs
//
// A CPU-emulated GpuContext and DisplaySurface, shipped so the engine is
// runnable and testable without a host-supplied OpenGL/Metal/Vulkan
// binding. Textures are plain RGBA byte buffers behind a shared,
// lockable table; "shaders" are classified by a keyword in their
// fragment source rather than actually compiled, so `blit` still
// performs the real per-pixel transform the filter is supposed to
// produce. Used by the crate's own tests and by framepipe-cli.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use framepipe_core::{DisplaySurface, FitMode, GpuContext, GpuError, PixelFormat, ProgramId, TextureId, Viewport};

struct Texture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// What a "compiled" program actually does to a pixel, inferred from a
/// keyword in its fragment source. Good enough to exercise the real
/// filter-chain ping-pong logic without a real shader compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProgramKind {
    Identity,
    FlipVertical,
    Gray,
    Invert,
    Sticker,
}

fn classify(fragment_src: &str) -> ProgramKind {
    if fragment_src.contains("1.0 - uv.y") {
        ProgramKind::FlipVertical
    } else if fragment_src.contains("sticker_mask") {
        ProgramKind::Sticker
    } else if fragment_src.contains("0.299") {
        ProgramKind::Gray
    } else if fragment_src.contains("1.0 - c.rgb") {
        ProgramKind::Invert
    } else {
        ProgramKind::Identity
    }
}

struct Inner {
    textures: Mutex<HashMap<TextureId, Texture>>,
    programs: Mutex<HashMap<ProgramId, ProgramKind>>,
    next_texture: AtomicU64,
    next_program: AtomicU64,
}

/// A software framebuffer standing in for a real GPU binding. Cheap to
/// `Clone`/`share()` — every clone points at the same texture/program
/// table, matching the "contexts may share resources" requirement real
/// sibling-thread GPU contexts need.
#[derive(Clone)]
pub struct SoftwareGpuContext {
    inner: Arc<Inner>,
}

impl SoftwareGpuContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                textures: Mutex::new(HashMap::new()),
                programs: Mutex::new(HashMap::new()),
                next_texture: AtomicU64::new(1),
                next_program: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for SoftwareGpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext for SoftwareGpuContext {
    fn make_current(&self) -> Result<(), GpuError> {
        Ok(())
    }

    fn done_current(&self) -> Result<(), GpuError> {
        Ok(())
    }

    fn compile_program(&self, _vertex_src: &str, fragment_src: &str) -> Result<ProgramId, GpuError> {
        let id = ProgramId(self.inner.next_program.fetch_add(1, Ordering::Relaxed));
        self.inner.programs.lock().insert(id, classify(fragment_src));
        Ok(id)
    }

    fn destroy_program(&self, program: ProgramId) {
        self.inner.programs.lock().remove(&program);
    }

    fn create_texture(&self, width: u32, height: u32, _format: PixelFormat) -> Result<TextureId, GpuError> {
        let id = TextureId(self.inner.next_texture.fetch_add(1, Ordering::Relaxed));
        let data = vec![0u8; width as usize * height as usize * 4];
        self.inner.textures.lock().insert(id, Texture { width, height, data });
        Ok(id)
    }

    fn upload_texture(&self, texture: TextureId, width: u32, height: u32, data: &[u8]) -> Result<(), GpuError> {
        let mut textures = self.inner.textures.lock();
        let tex = textures
            .get_mut(&texture)
            .ok_or_else(|| GpuError::RuntimeError(format!("upload: unknown texture {texture:?}")))?;
        tex.width = width;
        tex.height = height;
        tex.data.clear();
        tex.data.extend_from_slice(data);
        tex.data.resize(width as usize * height as usize * 4, 0);
        Ok(())
    }

    fn read_texture(&self, texture: TextureId, width: u32, height: u32) -> Result<Vec<u8>, GpuError> {
        let textures = self.inner.textures.lock();
        let tex = textures
            .get(&texture)
            .ok_or_else(|| GpuError::RuntimeError(format!("read: unknown texture {texture:?}")))?;
        let mut out = tex.data.clone();
        out.resize(width as usize * height as usize * 4, 0);
        Ok(out)
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.inner.textures.lock().remove(&texture);
    }

    fn blit(&self, program: ProgramId, input: TextureId, output: TextureId, width: u32, height: u32) -> Result<bool, GpuError> {
        let kind = match self.inner.programs.lock().get(&program).copied() {
            Some(k) => k,
            None => return Ok(false),
        };

        let src = {
            let textures = self.inner.textures.lock();
            match textures.get(&input) {
                Some(t) => t.data.clone(),
                None => return Ok(false),
            }
        };

        let w = width as usize;
        let h = height as usize;
        let mut dst = vec![0u8; w * h * 4];

        match kind {
            ProgramKind::Identity | ProgramKind::Sticker => {
                let n = src.len().min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
            }
            ProgramKind::FlipVertical => {
                for row in 0..h {
                    let src_row = h - 1 - row;
                    let src_start = src_row * w * 4;
                    let dst_start = row * w * 4;
                    if src_start + w * 4 <= src.len() {
                        dst[dst_start..dst_start + w * 4].copy_from_slice(&src[src_start..src_start + w * 4]);
                    }
                }
            }
            ProgramKind::Gray => {
                for (px_in, px_out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    let l = (0.299 * px_in[0] as f32 + 0.587 * px_in[1] as f32 + 0.114 * px_in[2] as f32) as u8;
                    px_out[0] = l;
                    px_out[1] = l;
                    px_out[2] = l;
                    px_out[3] = px_in[3];
                }
            }
            ProgramKind::Invert => {
                for (px_in, px_out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    px_out[0] = 255 - px_in[0];
                    px_out[1] = 255 - px_in[1];
                    px_out[2] = 255 - px_in[2];
                    px_out[3] = px_in[3];
                }
            }
        }

        let mut textures = self.inner.textures.lock();
        let out_tex = textures
            .get_mut(&output)
            .ok_or_else(|| GpuError::RuntimeError(format!("blit: unknown output texture {output:?}")))?;
        out_tex.width = width;
        out_tex.height = height;
        out_tex.data = dst;
        Ok(true)
    }

    fn fence(&self) -> Result<(), GpuError> {
        Ok(())
    }

    fn share(&self) -> Result<Box<dyn GpuContext>, GpuError> {
        Ok(Box::new(self.clone()))
    }
}

struct PresentedTexture {
    texture: TextureId,
    width: u32,
    height: u32,
    fit: FitMode,
}

/// A reference `DisplaySurface`: stores the latest presented texture and
/// destroys the previous one on replace, via the supplied
/// `SerialTaskQueue`, matching spec.md §4.10's cleanup contract.
pub struct SoftwareDisplaySurface {
    ctx: SoftwareGpuContext,
    pool: Mutex<Option<Arc<dyn framepipe_core::TaskPool>>>,
    current: Mutex<Option<PresentedTexture>>,
}

impl SoftwareDisplaySurface {
    pub fn new(ctx: SoftwareGpuContext) -> Self {
        Self { ctx, pool: Mutex::new(None), current: Mutex::new(None) }
    }

    /// Read back the currently presented texture's pixels, for tests
    /// that assert on what the surface would paint.
    pub fn current_pixels(&self) -> Option<Vec<u8>> {
        let current = self.current.lock();
        let p = current.as_ref()?;
        self.ctx.read_texture(p.texture, p.width, p.height).ok()
    }
}

impl DisplaySurface for SoftwareDisplaySurface {
    fn set_task_pool(&self, pool: Arc<dyn framepipe_core::TaskPool>) {
        *self.pool.lock() = Some(pool);
    }
    fn present(&self, texture: TextureId, width: u32, height: u32, fit: FitMode) {
        let previous = self.current.lock().replace(PresentedTexture { texture, width, height, fit });
        if let (Some(prev), Some(pool)) = (previous, self.pool.lock().clone()) {
            let ctx = self.ctx.clone();
            pool.submit(Box::new(move || ctx.destroy_texture(prev.texture)));
        }
    }

    fn paint(&self, surface_w: u32, surface_h: u32, _clear_rgb: (f32, f32, f32)) {
        // A real implementation binds `current`'s texture and draws a
        // textured quad sized by `Viewport::compute`; there is no window
        // to paint into here, so this only exercises the viewport math.
        if let Some(p) = self.current.lock().as_ref() {
            let _ = Viewport::compute(surface_w, surface_h, p.width, p.height, p.fit);
        }
    }

    fn clear(&self) {
        if let Some(prev) = self.current.lock().take() {
            if let Some(pool) = self.pool.lock().clone() {
                let ctx = self.ctx.clone();
                pool.submit(Box::new(move || ctx.destroy_texture(prev.texture)));
            } else {
                self.ctx.destroy_texture(prev.texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // These deliberately reuse the same substrings `classify()` keys off
    // (0.299 for luma weights, "1.0 - uv.y" for a flipped sample), rather
    // than reaching into `filters::filter`'s private shader constants.
    const GRAY_FRAG_LIKE: &str = "let l = dot(c.rgb, vec3<f32>(0.299, 0.587, 0.114));";
    const FLIP_FRAG_LIKE: &str = "textureSample(frame, frame_sampler, vec2<f32>(uv.x, 1.0 - uv.y));";

    #[test]
    fn gray_blit_produces_luminance_only_pixels() {
        let ctx = SoftwareGpuContext::new();
        let program = ctx.compile_program("", GRAY_FRAG_LIKE).unwrap();
        let input = ctx.create_texture(1, 1, PixelFormat::Rgba8).unwrap();
        ctx.upload_texture(input, 1, 1, &[10, 20, 30, 255]).unwrap();
        let output = ctx.create_texture(1, 1, PixelFormat::Rgba8).unwrap();
        assert!(ctx.blit(program, input, output, 1, 1).unwrap());
        let pixels = ctx.read_texture(output, 1, 1).unwrap();
        assert_eq!(pixels[0], pixels[1]);
        assert_eq!(pixels[1], pixels[2]);
    }

    #[test]
    fn flip_vertical_reverses_row_order() {
        let ctx = SoftwareGpuContext::new();
        let program = ctx.compile_program("", FLIP_FRAG_LIKE).unwrap();
        let input = ctx.create_texture(1, 2, PixelFormat::Rgba8).unwrap();
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&[1, 1, 1, 255]);
        data[4..8].copy_from_slice(&[2, 2, 2, 255]);
        ctx.upload_texture(input, 1, 2, &data).unwrap();
        let output = ctx.create_texture(1, 2, PixelFormat::Rgba8).unwrap();
        assert!(ctx.blit(program, input, output, 1, 2).unwrap());
        let pixels = ctx.read_texture(output, 1, 2).unwrap();
        assert_eq!(&pixels[0..4], &[2, 2, 2, 255]);
        assert_eq!(&pixels[4..8], &[1, 1, 1, 255]);
    }

    #[test]
    fn display_surface_destroys_previous_texture_on_replace() {
        let ctx = SoftwareGpuContext::new();
        let pool: Arc<dyn framepipe_core::TaskPool> = Arc::new(crate::sync::SerialTaskQueue::new());
        let surface = SoftwareDisplaySurface::new(ctx.clone());
        surface.set_task_pool(Arc::clone(&pool));

        let t1 = ctx.create_texture(2, 2, PixelFormat::Rgba8).unwrap();
        surface.present(t1, 2, 2, FitMode::ScaleToFill);
        let t2 = ctx.create_texture(2, 2, PixelFormat::Rgba8).unwrap();
        surface.present(t2, 2, 2, FitMode::ScaleToFill);

        // Give the pool worker a moment to run the destroy task.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(ctx.read_texture(t1, 2, 2).is_err());
        assert!(ctx.read_texture(t2, 2, 2).is_ok());
    }
}
