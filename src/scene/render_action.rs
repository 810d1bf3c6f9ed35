use crate::renderer::device::RenderTarget;
use crate::scene::light::LightKey;

/// One `(layer, camera)` unit of rendering work.
///
/// Built by [`LayerComposition::update`](crate::scene::LayerComposition::update)
/// and read-only while a frame renders.
#[derive(Debug, Clone)]
pub struct RenderAction {
    /// Index into the composition's layer list.
    pub layer: usize,
    /// Index into the composition's camera list.
    pub camera: usize,
    /// Resolved target (layer override, else camera target). `None` is the backbuffer.
    pub render_target: Option<RenderTarget>,

    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,

    /// First action of this camera in the frame.
    pub first_camera_use: bool,
    /// Last action of this camera in the frame.
    pub last_camera_use: bool,
    /// Post-processing of the camera runs right after this action.
    pub trigger_postprocess: bool,

    /// Index into the composition's cluster results (clustered lighting only).
    pub light_clusters: Option<usize>,
    /// Directional shadow casters to render for this camera before this action.
    pub directional_lights: Vec<LightKey>,
}

impl RenderAction {
    #[must_use]
    pub fn new(layer: usize, camera: usize, render_target: Option<RenderTarget>) -> Self {
        Self {
            layer,
            camera,
            render_target,
            clear_color: false,
            clear_depth: false,
            clear_stencil: false,
            first_camera_use: false,
            last_camera_use: false,
            trigger_postprocess: false,
            light_clusters: None,
            directional_lights: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn requires_directional_shadows(&self) -> bool {
        !self.directional_lights.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn has_clear(&self) -> bool {
        self.clear_color || self.clear_depth || self.clear_stencil
    }
}
