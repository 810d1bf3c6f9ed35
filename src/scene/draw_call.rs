//! Draw Calls
//!
//! The visible-object lists produced by the scene system hold [`DrawCall`]s:
//! either geometry ([`MeshInstance`]) or a deferred callback
//! ([`DrawCommand`]) that runs in draw order with direct device access.

use std::fmt;
use std::sync::Arc;

use glam::Mat4;

use crate::renderer::device::{Geometry, GraphicsDevice, StencilParams, TextureId, UniformValue};
use crate::renderer::shader::{ShaderDefines, ShaderId, ShaderPass};
use crate::scene::light::LightKey;
use crate::scene::material::MaterialKey;

/// Callback of a command draw call.
pub type CommandCallback = Arc<dyn Fn(&mut dyn GraphicsDevice) + Send + Sync>;

/// One entry of a visible list.
#[derive(Debug, Clone)]
pub enum DrawCall {
    Mesh(MeshInstance),
    Command(DrawCommand),
}

impl DrawCall {
    /// Visibility / light mask.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> u32 {
        match self {
            Self::Mesh(mesh) => mesh.mask,
            Self::Command(cmd) => cmd.mask,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_mesh(&self) -> Option<&MeshInstance> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            Self::Command(_) => None,
        }
    }
}

impl From<MeshInstance> for DrawCall {
    fn from(mesh: MeshInstance) -> Self {
        Self::Mesh(mesh)
    }
}

impl From<DrawCommand> for DrawCall {
    fn from(cmd: DrawCommand) -> Self {
        Self::Command(cmd)
    }
}

#[derive(Clone)]
pub struct DrawCommand {
    pub label: String,
    pub mask: u32,
    pub callback: CommandCallback,
}

impl DrawCommand {
    pub fn new(label: &str, callback: impl Fn(&mut dyn GraphicsDevice) + Send + Sync + 'static) -> Self {
        Self {
            label: label.to_string(),
            mask: u32::MAX,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawCommand")
            .field("label", &self.label)
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

/// A shader resolved for one pass, with the inputs it was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedShader {
    pub shader: ShaderId,
    pub cache_id: u32,
    pub defines: ShaderDefines,
    pub light_hash: u64,
    pub material_version: u64,
}

#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub name: String,
    pub material: MaterialKey,
    pub defines: ShaderDefines,
    /// Visibility and light mask.
    pub mask: u32,
    /// Static instances bake a fixed light list and get private variants.
    pub is_static: bool,
    /// Baked local lights of a static instance.
    pub static_lights: Vec<LightKey>,

    pub geometry: Geometry,
    pub instance_count: u32,
    pub world_matrix: Mat4,
    /// Negative-scale transform; flips culling.
    pub flip_faces: bool,

    /// Stencil overrides (take precedence over the material).
    pub stencil_front: Option<StencilParams>,
    pub stencil_back: Option<StencilParams>,

    pub bone_texture: Option<TextureId>,
    pub morph_texture: Option<TextureId>,

    parameters: Vec<(String, UniformValue)>,
    shaders: [Option<CachedShader>; ShaderPass::COUNT],
}

impl MeshInstance {
    #[must_use]
    pub fn new(name: &str, material: MaterialKey, geometry: Geometry) -> Self {
        Self {
            name: name.to_string(),
            material,
            defines: ShaderDefines::empty(),
            mask: u32::MAX,
            is_static: false,
            static_lights: Vec::new(),
            geometry,
            instance_count: 1,
            world_matrix: Mat4::IDENTITY,
            flip_faces: false,
            stencil_front: None,
            stencil_back: None,
            bone_texture: None,
            morph_texture: None,
            parameters: Vec::new(),
            shaders: [None; ShaderPass::COUNT],
        }
    }

    // === Per-instance parameter overrides ===

    pub fn set_parameter(&mut self, name: &str, value: UniformValue) {
        if let Some(slot) = self.parameters.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.parameters.push((name.to_string(), value));
        }
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.parameters.retain(|(n, _)| n != name);
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[(String, UniformValue)] {
        &self.parameters
    }

    // === Per-pass shader slots ===

    #[inline]
    #[must_use]
    pub fn cached_shader(&self, pass: ShaderPass) -> Option<&CachedShader> {
        self.shaders[pass.index()].as_ref()
    }

    pub(crate) fn set_cached_shader(&mut self, pass: ShaderPass, cached: CachedShader) {
        self.shaders[pass.index()] = Some(cached);
    }

    /// Forgets every resolved shader (e.g. after a geometry format change).
    pub fn clear_shaders(&mut self) {
        self.shaders = [None; ShaderPass::COUNT];
    }
}
