// crates/framepipe-core/src/gpu.rs
//
// GpuContext: the opaque GPU binding the engine renders through. A host
// supplies a real OpenGL/Metal/Vulkan-backed implementation; the engine
// never assumes which. Shape modeled on a texture/program/FBO renderer
// (upload, compile, blit, fence) rather than a literal GL binding.

use std::fmt;

/// Opaque handle to a GPU texture. Never constructed by engine code —
/// only returned by `GpuContext::create_texture`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque handle to a compiled shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

#[derive(Debug)]
pub enum GpuError {
    CompileFailed(String),
    RuntimeError(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::CompileFailed(m) => write!(f, "shader compile failed: {m}"),
            GpuError::RuntimeError(m) => write!(f, "GPU runtime error: {m}"),
        }
    }
}

impl std::error::Error for GpuError {}

/// Pixel format a texture is allocated/uploaded with. Engine code always
/// uses RGBA8; exposed so a reference backend can pick a concrete layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

/// The opaque GPU binding every GPU-owning stage (`VideoPipeline`,
/// `VideoEncoder`, `DisplaySurface`) renders through. Implementations are
/// expected to be cheap to clone (an `Arc` around a real context) so
/// sibling threads can share resources per spec.md §3's invariant 4 while
/// each destroys only what it created, on the thread that created it.
pub trait GpuContext: Send + Sync {
    /// Make this context current on the calling thread.
    fn make_current(&self) -> Result<(), GpuError>;

    /// Release current-ness on the calling thread.
    fn done_current(&self) -> Result<(), GpuError>;

    /// Compile a vertex+fragment shader pair into a program.
    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, GpuError>;

    /// Destroy a program. Must be called on the thread that compiled it.
    fn destroy_program(&self, program: ProgramId);

    /// Allocate a texture of the given size and pixel format.
    fn create_texture(&self, width: u32, height: u32, format: PixelFormat) -> Result<TextureId, GpuError>;

    /// Upload CPU pixel data into an existing texture, resizing it first
    /// if `width`/`height` differ from its current allocation.
    fn upload_texture(&self, texture: TextureId, width: u32, height: u32, data: &[u8]) -> Result<(), GpuError>;

    /// Read a texture's pixels back to the CPU (used by `VideoEncoder`'s
    /// software color-space converter and by pixel-readback tests).
    fn read_texture(&self, texture: TextureId, width: u32, height: u32) -> Result<Vec<u8>, GpuError>;

    /// Destroy a texture. Must be called on the thread that created it.
    fn destroy_texture(&self, texture: TextureId);

    /// Render `program` sampling `input` into `output`, both bound through
    /// the context's shared framebuffer object. Returns `Ok(true)` on a
    /// normal render, `Ok(false)` on a recoverable setup failure (the
    /// caller forwards the input unchanged per spec.md §7).
    fn blit(&self, program: ProgramId, input: TextureId, output: TextureId, width: u32, height: u32) -> Result<bool, GpuError>;

    /// Flush all prior work so a subsequent consumer sees coherent pixels.
    fn fence(&self) -> Result<(), GpuError>;

    /// Produce a new context instance sharing resources with this one, as
    /// required for the `VideoPipeline`/`VideoEncoder` worker threads to
    /// see textures created by the main context.
    fn share(&self) -> Result<Box<dyn GpuContext>, GpuError>;
}
