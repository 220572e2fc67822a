// crates/framepipe-core/src/surface.rs
//
// DisplaySurface: a handle the host's windowing layer paints through.
// Fit-mode viewport math is grounded in a texture-vs-surface aspect-ratio
// comparison (letterbox vs crop vs stretch), the same shape as a
// wgpu-based renderer's `Viewport::new`.

use std::sync::Arc;

use crate::gpu::TextureId;

/// Abstraction over a serial GPU-cleanup queue. Lives here, rather than
/// naming `framepipe-engine`'s concrete `SerialTaskQueue` directly, so
/// `DisplaySurface` can declare `set_task_pool` without this crate
/// depending on the engine crate that implements it.
pub trait TaskPool: Send + Sync {
    fn submit(&self, task: Box<dyn FnOnce() + Send>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitMode {
    /// Stretch to fill the surface, ignoring aspect ratio.
    ScaleToFill,
    /// Fit entirely inside the surface, letterboxing if aspect differs.
    ScaleAspectFit,
    /// Fill the surface entirely, cropping if aspect differs.
    ScaleAspectFill,
}

/// Computed placement of a `texture_w x texture_h` frame inside a
/// `surface_w x surface_h` viewport under a given `FitMode`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn compute(surface_w: u32, surface_h: u32, texture_w: u32, texture_h: u32, fit: FitMode) -> Self {
        if fit == FitMode::ScaleToFill || texture_w == 0 || texture_h == 0 {
            return Viewport { x: 0, y: 0, width: surface_w, height: surface_h };
        }

        let surface_ratio = surface_w as f64 / surface_h as f64;
        let texture_ratio = texture_w as f64 / texture_h as f64;

        // ScaleAspectFit letterboxes (texture fully visible, padding on the
        // shorter axis); ScaleAspectFill crops (surface fully covered,
        // overflow on the longer axis). Swapping the comparison direction
        // between the two modes is what distinguishes them.
        let texture_wider_than_surface = texture_ratio > surface_ratio;
        let should_fit_width = match fit {
            FitMode::ScaleAspectFit => texture_wider_than_surface,
            FitMode::ScaleAspectFill => !texture_wider_than_surface,
            FitMode::ScaleToFill => unreachable!(),
        };

        if should_fit_width {
            let height = (surface_w as f64 / texture_ratio).round() as u32;
            let y = (surface_h as i64 - height as i64) / 2;
            Viewport { x: 0, y: y as i32, width: surface_w, height }
        } else {
            let width = (surface_h as f64 * texture_ratio).round() as u32;
            let x = (surface_w as i64 - width as i64) / 2;
            Viewport { x: x as i32, y: 0, width, height: surface_h }
        }
    }
}

/// A surface the host's windowing layer paints through. `render(frame, ..)`
/// (the engine-facing setter) and `render(surface_w, surface_h, ..)` (the
/// windowing-layer-facing paint call) are split into two methods here
/// since Rust doesn't overload on arity.
pub trait DisplaySurface: Send + Sync {
    /// Receive the player's serial GPU queue so `clear()` can dispatch
    /// destruction there instead of on whatever thread calls it.
    fn set_task_pool(&self, pool: Arc<dyn TaskPool>);

    /// Store the latest texture for the next paint. Thread-safe replace;
    /// does not block the caller on the windowing layer's paint cadence.
    fn present(&self, texture: TextureId, width: u32, height: u32, fit: FitMode);

    /// Invoked by the windowing layer: clear, compute the viewport from
    /// the stored fit mode, bind the stored texture, draw.
    fn paint(&self, surface_w: u32, surface_h: u32, clear_rgb: (f32, f32, f32));

    /// Submit GPU cleanup (destroying the compiled quad program and
    /// buffers) to the serial task queue and wait for it to complete.
    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_to_fill_ignores_aspect() {
        let vp = Viewport::compute(800, 600, 1920, 1080, FitMode::ScaleToFill);
        assert_eq!(vp, Viewport { x: 0, y: 0, width: 800, height: 600 });
    }

    #[test]
    fn scale_aspect_fit_letterboxes_wide_texture_in_narrow_surface() {
        // 16:9 texture inside a 4:3 surface: letterbox top/bottom.
        let vp = Viewport::compute(800, 600, 1920, 1080, FitMode::ScaleAspectFit);
        assert_eq!(vp.width, 800);
        assert!(vp.height < 600);
        assert!(vp.y > 0);
    }

    #[test]
    fn scale_aspect_fill_crops_wide_texture_in_narrow_surface() {
        let vp = Viewport::compute(800, 600, 1920, 1080, FitMode::ScaleAspectFill);
        assert_eq!(vp.height, 600);
        assert!(vp.width > 800);
        assert!(vp.x < 0);
    }

    #[test]
    fn matching_aspect_produces_full_viewport_under_fit_or_fill() {
        let vp = Viewport::compute(1920, 1080, 1280, 720, FitMode::ScaleAspectFit);
        assert_eq!(vp, Viewport { x: 0, y: 0, width: 1920, height: 1080 });
    }
}
