//! Frame Statistics
//!
//! Counters reset at the start of every [`render_frame`] call and readable
//! afterwards for profiling overlays.
//!
//! [`render_frame`]: crate::renderer::ForwardRenderer::render_frame

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::scene::layer::LayerId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Issued draws. Each multi-view sub-draw counts as one.
    pub draw_calls: u32,
    pub material_switches: u32,
    pub shader_compiles: u32,
    /// Mesh draws skipped because their shader failed to compile.
    pub skipped_draws: u32,
    /// Command draw calls that ran.
    pub command_calls: u32,
    /// Physical passes begun (placeholders excluded).
    pub render_passes: u32,
    pub shadow_map_updates: u32,
    /// Accumulated CPU time spent rendering each layer.
    pub layer_times: FxHashMap<LayerId, Duration>,
}

impl FrameStats {
    pub fn reset(&mut self) {
        self.draw_calls = 0;
        self.material_switches = 0;
        self.shader_compiles = 0;
        self.skipped_draws = 0;
        self.command_calls = 0;
        self.render_passes = 0;
        self.shadow_map_updates = 0;
        self.layer_times.clear();
    }

    pub fn add_layer_time(&mut self, layer: LayerId, elapsed: Duration) {
        *self.layer_times.entry(layer).or_default() += elapsed;
    }

    #[must_use]
    pub fn layer_time(&self, layer: LayerId) -> Duration {
        self.layer_times.get(&layer).copied().unwrap_or_default()
    }
}
