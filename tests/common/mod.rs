//! Shared test doubles: a recording graphics device, a scripted shader
//! backend and a shadow renderer that fills shadow data.

#![allow(dead_code)]

use std::sync::Once;

use glam::Mat4;
use slotmap::SlotMap;

use myth_frame::errors::{FrameError, Result};
use myth_frame::renderer::device::{
    BufferId, ClearOps, DepthState, Geometry, GraphicsDevice, PixelRect, RenderTarget,
    RenderTargetId, StencilParams, TextureId, UniformId, UniformValue,
};
use myth_frame::renderer::graph::ShadowRenderer;
use myth_frame::renderer::shader::{ShaderBackend, ShaderProgram, VariantKey, VariantRequest};
use myth_frame::scene::camera::Camera;
use myth_frame::scene::composition::LightClusters;
use myth_frame::scene::layer::GrabKind;
use myth_frame::scene::light::{Light, LightKey, ShadowDataKey};
use myth_frame::scene::material::MaterialKey;
use myth_frame::scene::{DrawCall, MeshInstance};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

// ============================================================================
// Recording Device
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BeginPass {
        label: String,
        target: Option<RenderTargetId>,
        clear: ClearOps,
    },
    EndPass,
    Viewport(PixelRect),
    Scissor(PixelRect),
    Clear(ClearOps),
    Uniform(String, UniformValue),
    Shader(ShaderProgram),
    Blend(Option<wgpu::BlendState>),
    Depth(DepthState),
    AlphaToCoverage(bool),
    DepthBias(Option<wgpu::DepthBiasState>),
    Stencil(Option<StencilParams>, Option<StencilParams>),
    Cull(Option<wgpu::Face>),
    VertexBuffer(BufferId),
    IndexBuffer(Option<(BufferId, wgpu::IndexFormat)>),
    Skinning(Option<TextureId>),
    Morphing(Option<TextureId>),
    Draw { vertex_buffer: BufferId, instances: u32 },
    CopyGrab(GrabKind, Option<RenderTargetId>),
    Marker(String),
}

/// Graphics device that records every call and mirrors the global state.
pub struct RecordingDevice {
    pub calls: Vec<Call>,
    pub size: (u32, u32),
    pub resolves: usize,
    /// Programs `set_shader` refuses.
    pub rejected: Vec<ShaderProgram>,

    pub blend: Option<wgpu::BlendState>,
    pub stencil: (Option<StencilParams>, Option<StencilParams>),
    pub alpha_to_coverage: bool,
    pub depth_bias: Option<wgpu::DepthBiasState>,

    names: Vec<String>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            size: (800, 600),
            resolves: 0,
            rejected: Vec::new(),
            blend: None,
            stencil: (None, None),
            alpha_to_coverage: false,
            depth_bias: None,
            names: Vec::new(),
        }
    }
}

impl RecordingDevice {
    pub fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Draw { .. }))
            .count()
    }

    /// Uniform writes in order, as `(name, value)`.
    pub fn uniform_writes(&self) -> Vec<(String, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Uniform(name, value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last value written to `name`.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Uniform(n, value) if n == name => Some(value.clone()),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn name_of(&self, id: UniformId) -> String {
        self.names
            .get(id.0 as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id.0))
    }
}

impl GraphicsDevice for RecordingDevice {
    fn backbuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_pass(&mut self, label: &str, target: Option<&RenderTarget>, clear: &ClearOps) {
        self.calls.push(Call::BeginPass {
            label: label.to_string(),
            target: target.map(|t| t.id),
            clear: *clear,
        });
    }

    fn end_pass(&mut self) {
        self.calls.push(Call::EndPass);
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.calls.push(Call::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: PixelRect) {
        self.calls.push(Call::Scissor(rect));
    }

    fn clear(&mut self, clear: &ClearOps) {
        self.calls.push(Call::Clear(*clear));
    }

    fn resolve_uniform(&mut self, name: &str) -> UniformId {
        self.resolves += 1;
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return UniformId(index as u32);
        }
        self.names.push(name.to_string());
        UniformId(self.names.len() as u32 - 1)
    }

    fn set_uniform(&mut self, id: UniformId, value: &UniformValue) {
        let name = self.name_of(id);
        self.calls.push(Call::Uniform(name, value.clone()));
    }

    fn set_shader(&mut self, program: ShaderProgram) -> bool {
        self.calls.push(Call::Shader(program));
        !self.rejected.contains(&program)
    }

    fn set_blend_state(&mut self, blend: Option<wgpu::BlendState>) {
        self.blend = blend;
        self.calls.push(Call::Blend(blend));
    }

    fn set_depth_state(&mut self, depth: DepthState) {
        self.calls.push(Call::Depth(depth));
    }

    fn set_alpha_to_coverage(&mut self, enabled: bool) {
        self.alpha_to_coverage = enabled;
        self.calls.push(Call::AlphaToCoverage(enabled));
    }

    fn set_depth_bias(&mut self, bias: Option<wgpu::DepthBiasState>) {
        self.depth_bias = bias;
        self.calls.push(Call::DepthBias(bias));
    }

    fn set_stencil_state(&mut self, front: Option<StencilParams>, back: Option<StencilParams>) {
        self.stencil = (front, back);
        self.calls.push(Call::Stencil(front, back));
    }

    fn set_cull_mode(&mut self, cull: Option<wgpu::Face>) {
        self.calls.push(Call::Cull(cull));
    }

    fn set_vertex_buffer(&mut self, buffer: BufferId) {
        self.calls.push(Call::VertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: Option<(BufferId, wgpu::IndexFormat)>) {
        self.calls.push(Call::IndexBuffer(buffer));
    }

    fn set_skinning(&mut self, bones: Option<TextureId>) {
        self.calls.push(Call::Skinning(bones));
    }

    fn set_morphing(&mut self, targets: Option<TextureId>) {
        self.calls.push(Call::Morphing(targets));
    }

    fn draw(&mut self, geometry: &Geometry, instances: u32) {
        self.calls.push(Call::Draw {
            vertex_buffer: geometry.vertex_buffer,
            instances,
        });
    }

    fn copy_grab(&mut self, kind: GrabKind, target: Option<&RenderTarget>) {
        self.calls.push(Call::CopyGrab(kind, target.map(|t| t.id)));
    }
}

// ============================================================================
// Shader Backend
// ============================================================================

#[derive(Default)]
pub struct MockBackend {
    /// `(material, key, is_static)` of every compile request.
    pub compiles: Vec<(String, VariantKey, bool)>,
    /// Materials whose variants fail to compile.
    pub failing: Vec<String>,
    pub batches: u32,
}

impl MockBackend {
    pub fn failing(material: &str) -> Self {
        Self {
            failing: vec![material.to_string()],
            ..Default::default()
        }
    }
}

impl ShaderBackend for MockBackend {
    fn compile_variant(&mut self, request: &VariantRequest<'_>) -> Result<ShaderProgram> {
        self.compiles.push((
            request.material_name.to_string(),
            request.key,
            request.is_static,
        ));
        if self.failing.iter().any(|m| m == request.material_name) {
            return Err(FrameError::ShaderCompile {
                material: request.material_name.to_string(),
                pass: request.key.pass.name(),
                defines: request.key.defines.bits(),
                reason: "unresolved symbol".to_string(),
            });
        }
        Ok(ShaderProgram(self.compiles.len() as u64))
    }

    fn end_batch(&mut self) {
        self.batches += 1;
    }
}

// ============================================================================
// Shadow Renderer
// ============================================================================

/// Records shadow work and writes a shadow buffer for every light rendered.
#[derive(Default)]
pub struct MockShadows {
    pub log: Vec<String>,
}

impl ShadowRenderer for MockShadows {
    fn render_cookies(
        &mut self,
        device: &mut dyn GraphicsDevice,
        _lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    ) {
        self.log.push(format!("cookies:{}", keys.len()));
        device.begin_pass("cookies", None, &ClearOps::default());
        device.end_pass();
    }

    fn render_local(
        &mut self,
        _device: &mut dyn GraphicsDevice,
        lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    ) {
        self.log.push(format!("local:{}", keys.len()));
        for key in keys {
            if let Some(light) = lights.get_mut(*key) {
                let data = light.shadow_data_mut(ShadowDataKey::face(0));
                data.shadow_buffer = Some(TextureId(500));
                data.shadow_matrix = Mat4::from_scale(glam::Vec3::splat(2.0));
            }
        }
    }

    fn render_directional(
        &mut self,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
        lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    ) {
        self.log.push(format!("directional:{}:{}", camera.name, keys.len()));
        device.begin_pass(&format!("shadow-{}", camera.name), None, &ClearOps::default());
        device.end_pass();
        for key in keys {
            if let Some(light) = lights.get_mut(*key) {
                let data = light.shadow_data_mut(ShadowDataKey::camera(camera.id));
                data.shadow_buffer = Some(TextureId(600 + camera.id.0));
                data.far_clip = 50.0;
            }
        }
    }

    fn update_clusters(
        &mut self,
        _device: &mut dyn GraphicsDevice,
        clusters: &mut [LightClusters],
        _lights: &SlotMap<LightKey, Light>,
    ) {
        self.log.push(format!("clusters:{}", clusters.len()));
        for cluster in clusters {
            cluster.cells = vec![cluster.lights.len() as u32];
        }
    }
}

// ============================================================================
// Scene Helpers
// ============================================================================

pub fn geometry(vertex_buffer: u32) -> Geometry {
    Geometry {
        vertex_buffer: BufferId(vertex_buffer),
        index_buffer: None,
        range: 0..36,
    }
}

pub fn mesh(name: &str, material: MaterialKey) -> MeshInstance {
    MeshInstance::new(name, material, geometry(1))
}

pub fn mesh_call(name: &str, material: MaterialKey) -> DrawCall {
    DrawCall::Mesh(mesh(name, material))
}

pub fn render_target(id: u32) -> RenderTarget {
    RenderTarget {
        id: RenderTargetId(id),
        width: 512,
        height: 512,
        flip_y: false,
    }
}
