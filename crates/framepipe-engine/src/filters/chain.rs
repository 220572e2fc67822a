// crates/framepipe-engine/src/filters/chain.rs
//
// FilterChain: the ordered, user-addable filter list plus the internal
// flip-vertical preprocessing step. Filter management is callable from
// any thread (guarded by one mutex, per spec.md §4.8); rendering and
// destruction only ever run on VideoPipeline's GPU thread.

use parking_lot::Mutex;

use framepipe_core::{FilterKind, GpuContext, GpuError, TextureId};

use super::filter::Filter;

pub type FilterHandle = FilterKind;

pub struct FilterChain {
    flip_vertical: Mutex<Filter>,
    filters: Mutex<Vec<Filter>>,
    pending_destruction: Mutex<Vec<Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            flip_vertical: Mutex::new(Filter::new(FilterKind::FlipVertical)),
            filters: Mutex::new(Vec::new()),
            pending_destruction: Mutex::new(Vec::new()),
        }
    }

    /// Idempotent per kind: returns the existing handle if already
    /// present, otherwise appends a new (not-yet-constructed) filter.
    pub fn add_filter(&self, kind: FilterKind) -> FilterHandle {
        debug_assert!(kind.is_user_addable(), "internal filters are not user-addable");
        let mut filters = self.filters.lock();
        if !filters.iter().any(|f| f.kind() == kind) {
            filters.push(Filter::new(kind));
        }
        kind
    }

    /// Moves the filter into the pending-destruction list; the next
    /// render pass releases its GPU resources on the GPU thread.
    pub fn remove_filter(&self, kind: FilterKind) {
        let mut filters = self.filters.lock();
        if let Some(idx) = filters.iter().position(|f| f.kind() == kind) {
            let removed = filters.remove(idx);
            self.pending_destruction.lock().push(removed);
        }
    }

    pub fn with_params_mut<R>(&self, kind: FilterKind, f: impl FnOnce(&mut super::filter::Filter) -> R) -> Option<R> {
        let mut filters = self.filters.lock();
        filters.iter_mut().find(|flt| flt.kind() == kind).map(f)
    }

    /// Release any filters queued for destruction. Must run on the GPU
    /// thread, ahead of the next render pass.
    pub fn drain_pending_destruction(&self, ctx: &dyn GpuContext) {
        let mut pending = self.pending_destruction.lock();
        for mut filter in pending.drain(..) {
            filter.destroy(ctx);
        }
    }

    /// Pre-flip step: apply the internal flip-vertical filter, normalizing
    /// decoder-output origin convention.
    pub fn flip_vertical(
        &self,
        ctx: &dyn GpuContext,
        input: TextureId,
        output: TextureId,
        width: u32,
        height: u32,
    ) -> Result<bool, GpuError> {
        self.flip_vertical.lock().render(ctx, input, output, width, height)
    }

    /// Run every active user filter `in -> out`, ping-ponging on each
    /// successful render. Returns `(final_in, final_out, swap_count)`;
    /// the caller swaps its own persistent texture pair if `swap_count`
    /// is odd, per the filter-chain invariant in spec.md §4.8.
    pub fn render(
        &self,
        ctx: &dyn GpuContext,
        mut in_tex: TextureId,
        mut out_tex: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(TextureId, TextureId, u32), GpuError> {
        let mut filters = self.filters.lock();
        let mut swaps = 0u32;

        for filter in filters.iter_mut() {
            match filter.render(ctx, in_tex, out_tex, width, height)? {
                true => {
                    std::mem::swap(&mut in_tex, &mut out_tex);
                    swaps += 1;
                }
                false => {
                    // Recoverable setup failure: forward input unchanged.
                }
            }
        }

        Ok((in_tex, out_tex, swaps))
    }

    /// Destroy every filter's GPU resources, including the internal
    /// flip-vertical step. Called once on `VideoPipeline` shutdown.
    pub fn destroy_all(&self, ctx: &dyn GpuContext) {
        self.flip_vertical.lock().destroy(ctx);
        for filter in self.filters.lock().iter_mut() {
            filter.destroy(ctx);
        }
        self.drain_pending_destruction(ctx);
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refimpl::SoftwareGpuContext;

    #[test]
    fn add_filter_is_idempotent_per_kind() {
        let chain = FilterChain::new();
        let h1 = chain.add_filter(FilterKind::Gray);
        let h2 = chain.add_filter(FilterKind::Gray);
        assert_eq!(h1, h2);
        assert_eq!(chain.filters.lock().len(), 1);
    }

    #[test]
    fn remove_filter_queues_for_destruction_not_immediate_removal_from_gpu() {
        let chain = FilterChain::new();
        chain.add_filter(FilterKind::Invert);
        chain.remove_filter(FilterKind::Invert);
        assert!(chain.filters.lock().is_empty());
        assert_eq!(chain.pending_destruction.lock().len(), 1);
    }

    #[test]
    fn identity_chain_with_no_filters_leaves_swap_count_zero() {
        let ctx = SoftwareGpuContext::new();
        let chain = FilterChain::new();
        let in_tex = ctx.create_texture(4, 4, framepipe_core::PixelFormat::Rgba8).unwrap();
        let out_tex = ctx.create_texture(4, 4, framepipe_core::PixelFormat::Rgba8).unwrap();
        let (final_in, _final_out, swaps) = chain.render(&ctx, in_tex, out_tex, 4, 4).unwrap();
        assert_eq!(swaps, 0);
        assert_eq!(final_in, in_tex);
    }

    #[test]
    fn two_filter_chain_ping_pongs_back_to_original_slot() {
        let ctx = SoftwareGpuContext::new();
        let chain = FilterChain::new();
        chain.add_filter(FilterKind::Gray);
        chain.add_filter(FilterKind::Invert);
        let in_tex = ctx.create_texture(4, 4, framepipe_core::PixelFormat::Rgba8).unwrap();
        let out_tex = ctx.create_texture(4, 4, framepipe_core::PixelFormat::Rgba8).unwrap();
        let (_final_in, _final_out, swaps) = chain.render(&ctx, in_tex, out_tex, 4, 4).unwrap();
        assert_eq!(swaps, 2);
    }
}
