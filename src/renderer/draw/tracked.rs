//! State-tracking device wrapper
//!
//! Skips redundant shader, cull, buffer and stencil changes within one draw
//! loop. Anything that touches the device behind the tracker's back (command
//! draw calls) must be followed by [`TrackedDevice::invalidate`].

use crate::renderer::device::{
    BufferId, GraphicsDevice, StencilParams, TextureId, reset_gpu_state,
};
use crate::renderer::shader::ShaderProgram;

type IndexBinding = Option<(BufferId, wgpu::IndexFormat)>;
type StencilPair = (Option<StencilParams>, Option<StencilParams>);

pub struct TrackedDevice<'a> {
    device: &'a mut dyn GraphicsDevice,
    current_shader: Option<ShaderProgram>,
    current_cull: Option<Option<wgpu::Face>>,
    current_vertex_buffer: Option<BufferId>,
    current_index_buffer: Option<IndexBinding>,
    current_stencil: Option<StencilPair>,
    current_skinning: Option<Option<TextureId>>,
    current_morphing: Option<Option<TextureId>>,
}

impl<'a> TrackedDevice<'a> {
    #[must_use]
    pub fn new(device: &'a mut dyn GraphicsDevice) -> Self {
        Self {
            device,
            current_shader: None,
            current_cull: None,
            current_vertex_buffer: None,
            current_index_buffer: None,
            current_stencil: None,
            current_skinning: None,
            current_morphing: None,
        }
    }

    /// Direct access for calls that are not tracked.
    #[inline]
    pub fn raw(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    /// Forgets all tracked state.
    pub fn invalidate(&mut self) {
        self.current_shader = None;
        self.current_cull = None;
        self.current_vertex_buffer = None;
        self.current_index_buffer = None;
        self.current_stencil = None;
        self.current_skinning = None;
        self.current_morphing = None;
    }

    /// Binds `program`. Returns `false` if the backend rejected it.
    pub fn set_shader(&mut self, program: ShaderProgram) -> bool {
        if self.current_shader == Some(program) {
            return true;
        }
        let ok = self.device.set_shader(program);
        self.current_shader = ok.then_some(program);
        ok
    }

    pub fn set_cull_mode(&mut self, cull: Option<wgpu::Face>) {
        if self.current_cull != Some(cull) {
            self.device.set_cull_mode(cull);
            self.current_cull = Some(cull);
        }
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferId) {
        if self.current_vertex_buffer != Some(buffer) {
            self.device.set_vertex_buffer(buffer);
            self.current_vertex_buffer = Some(buffer);
        }
    }

    pub fn set_index_buffer(&mut self, buffer: IndexBinding) {
        if self.current_index_buffer != Some(buffer) {
            self.device.set_index_buffer(buffer);
            self.current_index_buffer = Some(buffer);
        }
    }

    pub fn set_stencil_state(&mut self, front: Option<StencilParams>, back: Option<StencilParams>) {
        if self.current_stencil != Some((front, back)) {
            self.device.set_stencil_state(front, back);
            self.current_stencil = Some((front, back));
        }
    }

    pub fn set_skinning(&mut self, bones: Option<TextureId>) {
        if self.current_skinning != Some(bones) {
            self.device.set_skinning(bones);
            self.current_skinning = Some(bones);
        }
    }

    pub fn set_morphing(&mut self, targets: Option<TextureId>) {
        if self.current_morphing != Some(targets) {
            self.device.set_morphing(targets);
            self.current_morphing = Some(targets);
        }
    }

    /// Restores the global defaults and records the disabled stencil.
    pub fn reset_state(&mut self) {
        reset_gpu_state(&mut *self.device);
        self.current_stencil = Some((None, None));
    }
}
