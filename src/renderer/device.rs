//! Graphics Device Seam
//!
//! The frame core never talks to a concrete graphics API. Everything it needs
//! from the GPU goes through [`GraphicsDevice`], a command-buffer style
//! interface whose state vocabulary mirrors `wgpu` (`BlendState`,
//! `CompareFunction`, `StencilFaceState`, `Face`, `Color`) so that a wgpu
//! backend is a thin adapter.
//!
//! # Default State
//!
//! After every render action the core restores the documented defaults via
//! [`reset_gpu_state`]:
//!
//! | State               | Default    |
//! |---------------------|------------|
//! | Blend               | `None`     |
//! | Stencil test        | disabled   |
//! | Alpha-to-coverage   | disabled   |
//! | Depth bias          | `None`     |

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::renderer::shader::ShaderProgram;
use crate::scene::layer::GrabKind;

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Backend handle of a resolved uniform binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformId(pub u32);

/// Backend handle of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Backend handle of a vertex or index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Identifier of an off-screen render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub u32);

// ─── Render Targets ──────────────────────────────────────────────────────────

/// An off-screen render surface. `None` in any `Option<RenderTarget>`
/// position means the backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub width: u32,
    pub height: u32,
    /// The target is sampled upside down; flips the cull mode.
    pub flip_y: bool,
}

/// Returns `true` when two optional targets name the same surface.
#[inline]
#[must_use]
pub fn same_target(a: Option<&RenderTarget>, b: Option<&RenderTarget>) -> bool {
    a.map(|t| t.id) == b.map(|t| t.id)
}

/// Normalized rectangle (0..1 on both axes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `true` when the rectangle spans the whole surface.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.width == 1.0 && self.height == 1.0
    }

    /// Converts to a pixel rectangle on a surface of the given size.
    #[must_use]
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let w = width as f32;
        let h = height as f32;
        PixelRect {
            x: (self.x * w).floor() as u32,
            y: (self.y * h).floor() as u32,
            width: (self.width * w).floor() as u32,
            height: (self.height * h).floor() as u32,
        }
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

// ─── Clear ───────────────────────────────────────────────────────────────────

/// Which buffers to clear, and to what.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearOps {
    pub color: Option<wgpu::Color>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl ClearOps {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }
}

// ─── Pipeline State ──────────────────────────────────────────────────────────

/// Depth test/write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare: wgpu::CompareFunction::LessEqual,
        }
    }
}

/// One side of the stencil state, including reference and masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilParams {
    pub face: wgpu::StencilFaceState,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            face: wgpu::StencilFaceState::IGNORE,
            reference: 0,
            read_mask: 0xFF,
            write_mask: 0xFF,
        }
    }
}

/// Flips a cull face (front ↔ back).
#[inline]
#[must_use]
pub fn flip_face(face: Option<wgpu::Face>) -> Option<wgpu::Face> {
    match face {
        Some(wgpu::Face::Back) => Some(wgpu::Face::Front),
        Some(wgpu::Face::Front) => Some(wgpu::Face::Back),
        None => None,
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────────

/// Vertex/index buffers and the draw range of a mesh instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<(BufferId, wgpu::IndexFormat)>,
    /// Vertex range for non-indexed draws, index range otherwise.
    pub range: std::ops::Range<u32>,
}

// ─── Uniform Values ──────────────────────────────────────────────────────────

/// A value written into a uniform slot.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Mat4Array(Vec<Mat4>),
    Texture(TextureId),
}

impl UniformValue {
    /// Raw bytes as they would be uploaded to the GPU.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Float(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Mat4(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Mat4Array(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Texture(t) => bytemuck::bytes_of(&t.0).to_vec(),
        }
    }
}

// ─── Device Trait ────────────────────────────────────────────────────────────

/// Command-buffer style graphics device.
///
/// All calls are synchronous submissions; the core never waits on the GPU.
pub trait GraphicsDevice {
    /// Size of the default (backbuffer) surface in pixels.
    fn backbuffer_size(&self) -> (u32, u32);

    /// Opens a render pass on `target` (`None` = backbuffer) with the given
    /// load-time clears.
    fn begin_pass(&mut self, label: &str, target: Option<&RenderTarget>, clear: &ClearOps);

    fn end_pass(&mut self);

    fn set_viewport(&mut self, rect: PixelRect);

    fn set_scissor(&mut self, rect: PixelRect);

    /// Clears inside the current viewport only.
    fn clear(&mut self, clear: &ClearOps);

    /// Resolves a uniform name into a binding handle. Expected to be
    /// expensive; callers cache the result.
    fn resolve_uniform(&mut self, name: &str) -> UniformId;

    fn set_uniform(&mut self, id: UniformId, value: &UniformValue);

    /// Binds a shader program. Returns `false` if the backend rejected it.
    fn set_shader(&mut self, program: ShaderProgram) -> bool;

    fn set_blend_state(&mut self, blend: Option<wgpu::BlendState>);

    fn set_depth_state(&mut self, depth: DepthState);

    fn set_alpha_to_coverage(&mut self, enabled: bool);

    fn set_depth_bias(&mut self, bias: Option<wgpu::DepthBiasState>);

    /// Sets front/back stencil state. Both `None` disables the stencil test.
    fn set_stencil_state(&mut self, front: Option<StencilParams>, back: Option<StencilParams>);

    fn set_cull_mode(&mut self, cull: Option<wgpu::Face>);

    fn set_vertex_buffer(&mut self, buffer: BufferId);

    fn set_index_buffer(&mut self, buffer: Option<(BufferId, wgpu::IndexFormat)>);

    /// Binds (or unbinds) the skinning bone palette texture.
    fn set_skinning(&mut self, bones: Option<TextureId>);

    /// Binds (or unbinds) the morph target texture.
    fn set_morphing(&mut self, targets: Option<TextureId>);

    fn draw(&mut self, geometry: &Geometry, instances: u32);

    /// Copies the current colour or depth buffer into the grab texture.
    fn copy_grab(&mut self, kind: GrabKind, target: Option<&RenderTarget>);
}

/// Restores the global GPU state defaults listed in the module docs.
pub fn reset_gpu_state(device: &mut dyn GraphicsDevice) {
    device.set_blend_state(None);
    device.set_stencil_state(None, None);
    device.set_alpha_to_coverage(false);
    device.set_depth_bias(None);
}
