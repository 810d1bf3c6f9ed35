//! Render Pass Coalescer
//!
//! Turns a contiguous `[start, end)` run of render actions that share one
//! render target into a single [`MainPass`] with the right clear semantics.
//!
//! # Clears
//!
//! If the first action's camera covers the whole target (viewport and
//! scissor both full), its clears become load-time clears of the pass.
//! Otherwise the pass starts without clearing and every action clears its
//! own viewport while the pass runs, so a partial-viewport camera never
//! touches pixels outside its rectangle.
//!
//! # Grabs
//!
//! A grab action always sits alone in its pass. With `grab_copy` the pass is a
//! placeholder that copies the current buffer. Without it the scene is
//! re-rendered into the grab target, cleared with [`GRAB_SENTINEL_CLEAR`].

use crate::renderer::device::{ClearOps, RenderTarget};
use crate::renderer::settings::DeviceCapabilities;
use crate::scene::composition::LayerComposition;
use crate::scene::layer::GrabKind;

/// Clear colour of re-rendered grabs. Distinguishable from any value the
/// depth packing writes, so unwritten texels can be detected.
pub const GRAB_SENTINEL_CLEAR: wgpu::Color = wgpu::Color {
    r: 254.0 / 255.0,
    g: 254.0 / 255.0,
    b: 254.0 / 255.0,
    a: 254.0 / 255.0,
};

/// One physical pass over a run of render actions.
#[derive(Debug, Clone, PartialEq)]
pub struct MainPass {
    /// First render action (inclusive).
    pub start: usize,
    /// One past the last render action.
    pub end: usize,
    /// `None` renders to the backbuffer.
    pub target: Option<RenderTarget>,
    /// `false` for grab placeholders resolved by a direct copy.
    pub requires_render: bool,
    pub grab: Option<GrabKind>,
    /// Load-time clears.
    pub clear: ClearOps,
    /// The load-time clears replace the first action's own clear.
    pub full_size_clear: bool,
    /// Camera whose pre-render hook runs before the pass.
    pub before: Option<usize>,
    /// Camera whose post-render hook runs after the pass.
    pub after: Option<usize>,
}

impl MainPass {
    /// Coalesces `actions[start..end]` into one pass.
    ///
    /// An empty range yields an empty pass on the backbuffer.
    #[must_use]
    pub fn coalesce(
        composition: &LayerComposition,
        start: usize,
        end: usize,
        caps: &DeviceCapabilities,
    ) -> Self {
        if start >= end {
            return Self {
                start,
                end: start,
                target: None,
                requires_render: true,
                grab: None,
                clear: ClearOps::default(),
                full_size_clear: false,
                before: None,
                after: None,
            };
        }

        let actions = &composition.render_actions;
        let first = &actions[start];
        let last = &actions[end - 1];
        let layer = &composition.layers[first.layer];
        let camera = &composition.cameras[first.camera];

        let grab = layer.grab;
        let requires_render = grab.is_none() || !caps.grab_copy;

        let (clear, full_size_clear) = if grab.is_some() {
            if requires_render {
                let sentinel = ClearOps {
                    color: Some(GRAB_SENTINEL_CLEAR),
                    depth: Some(1.0),
                    stencil: None,
                };
                (sentinel, true)
            } else {
                (ClearOps::default(), false)
            }
        } else if camera.full_size_clear_rect() {
            let ops = camera.clear_ops(first.clear_color, first.clear_depth, first.clear_stencil);
            (ops, true)
        } else {
            (ClearOps::default(), false)
        };

        let before = (first.first_camera_use && camera.on_pre_render.is_some()).then_some(first.camera);
        let last_camera = &composition.cameras[last.camera];
        let after = (last.last_camera_use && last_camera.on_post_render.is_some()).then_some(last.camera);

        Self {
            start,
            end,
            target: first.render_target,
            requires_render,
            grab,
            clear,
            full_size_clear,
            before,
            after,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// `true` when `action` is covered by the pass's load-time clear.
    #[inline]
    #[must_use]
    pub fn owns_clear_of(&self, action: usize) -> bool {
        self.full_size_clear && action == self.start
    }
}
