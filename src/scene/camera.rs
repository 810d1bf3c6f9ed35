use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::renderer::device::{ClearOps, Rect, RenderTarget};
use crate::scene::layer::LayerId;

/// Stable camera identifier (survives reordering inside the composition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u32);

/// Synchronous camera callback, invoked inline at pass boundaries.
pub type CameraHook = Arc<dyn Fn(&Camera) + Send + Sync>;

/// One eye/view of a multi-view (XR) camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    /// Viewport inside the camera's target.
    pub viewport: Rect,
}

pub struct Camera {
    pub id: CameraId,
    pub name: Cow<'static, str>,
    pub enabled: bool,
    /// Lower priorities render first.
    pub priority: i32,
    /// Layers this camera renders, by id.
    pub layers: Vec<LayerId>,
    /// Draw calls whose mask does not intersect this are culled.
    pub culling_mask: u32,

    // === Projection / view (owned by the scene system, read here) ===
    pub near: f32,
    pub far: f32,
    pub(crate) world_matrix: Mat4,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,

    // === Output ===
    pub render_target: Option<RenderTarget>,
    pub viewport: Rect,
    pub scissor: Rect,
    pub flip_faces: bool,

    // === Clear ===
    pub clear_color: wgpu::Color,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub clear_color_buffer: bool,
    pub clear_depth_buffer: bool,
    pub clear_stencil_buffer: bool,

    /// Extra views for multi-view rendering. Empty for regular cameras.
    pub views: SmallVec<[CameraView; 2]>,

    /// Post-processing runs before this layer (e.g. the UI layer). `None`
    /// means after the camera's last layer.
    pub disable_postprocess_layer: Option<LayerId>,

    // === Hooks ===
    pub on_pre_render: Option<CameraHook>,
    pub on_post_render: Option<CameraHook>,
    pub on_postprocess: Option<CameraHook>,
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("layers", &self.layers)
            .field("render_target", &self.render_target)
            .field("views", &self.views.len())
            .finish_non_exhaustive()
    }
}

impl Camera {
    #[must_use]
    pub fn new(id: CameraId, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            priority: 0,
            layers: Vec::new(),
            culling_mask: u32::MAX,
            near: 0.1,
            far: 1000.0,
            world_matrix: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            render_target: None,
            viewport: Rect::FULL,
            scissor: Rect::FULL,
            flip_faces: false,
            clear_color: wgpu::Color::BLACK,
            clear_depth: 1.0,
            clear_stencil: 0,
            clear_color_buffer: true,
            clear_depth_buffer: true,
            clear_stencil_buffer: true,
            views: SmallVec::new(),
            disable_postprocess_layer: None,
            on_pre_render: None,
            on_post_render: None,
            on_postprocess: None,
        }
    }

    /// Builder-style layer list.
    #[must_use]
    pub fn with_layers(mut self, layers: &[LayerId]) -> Self {
        self.layers = layers.to_vec();
        self
    }

    /// Sets the camera transform and projection (normally done by the scene
    /// system before the frame).
    pub fn set_transforms(&mut self, world: Mat4, projection: Mat4) {
        self.world_matrix = world;
        self.view_matrix = world.inverse();
        self.projection_matrix = projection;
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    /// `true` when both viewport and scissor cover the whole target, so a
    /// clear at pass start touches only this camera's pixels.
    #[must_use]
    pub fn full_size_clear_rect(&self) -> bool {
        self.viewport.is_full() && self.scissor.is_full()
    }

    /// Clear operations for the requested buffers, with this camera's values.
    #[must_use]
    pub fn clear_ops(&self, color: bool, depth: bool, stencil: bool) -> ClearOps {
        ClearOps {
            color: color.then_some(self.clear_color),
            depth: depth.then_some(self.clear_depth),
            stencil: stencil.then_some(self.clear_stencil),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_multiview(&self) -> bool {
        self.views.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_size_clear_rect() {
        let mut camera = Camera::new(CameraId(0), "main");
        assert!(camera.full_size_clear_rect());
        camera.viewport = Rect::new(0.0, 0.0, 0.5, 1.0);
        assert!(!camera.full_size_clear_rect());
    }

    #[test]
    fn test_clear_ops_selects_buffers() {
        let camera = Camera::new(CameraId(0), "main");
        let ops = camera.clear_ops(true, false, true);
        assert_eq!(ops.color, Some(wgpu::Color::BLACK));
        assert_eq!(ops.depth, None);
        assert_eq!(ops.stencil, Some(0));
    }

    #[test]
    fn test_position_from_world() {
        let mut camera = Camera::new(CameraId(0), "main");
        camera.set_transforms(Mat4::from_translation(Vec3::new(0.0, 5.0, 10.0)), Mat4::IDENTITY);
        assert_eq!(camera.position(), Vec3::new(0.0, 5.0, 10.0));
    }
}
