//! Draw-Call Execution Tests
//!
//! Tests for:
//! - Failed shaders and removed materials skipping draws without aborting
//! - State restoration after the loop (blend, stencil, alpha-to-coverage, bias)
//! - Per-instance parameter overrides and their restoration
//! - Cull mode flips, stencil precedence, redundant state elision
//! - Multi-view draw counts and command callbacks

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3};
use slotmap::SlotMap;

use myth_frame::renderer::device::{Rect, StencilParams, UniformValue};
use myth_frame::renderer::draw::{
    ExecuteContext, ExecuteParams, PrepareContext, PrepareParams, PreparedCallList, execute,
    prepare,
};
use myth_frame::renderer::lighting::LightDispatcher;
use myth_frame::renderer::shader::{ShaderCache, ShaderPass};
use myth_frame::renderer::stats::FrameStats;
use myth_frame::renderer::uniforms::{MaterialUniformCache, UniformNameCache};
use myth_frame::scene::camera::{CameraId, CameraView};
use myth_frame::scene::draw_call::DrawCommand;
use myth_frame::scene::layer::SplitLights;
use myth_frame::scene::light::LightKey;
use myth_frame::scene::material::MaterialKey;
use myth_frame::{Camera, DrawCall, Light, Material, RendererSettings};

use common::{Call, MockBackend, RecordingDevice, init_logging, mesh, mesh_call, render_target};

struct Harness {
    device: RecordingDevice,
    backend: MockBackend,
    shaders: ShaderCache,
    materials: SlotMap<MaterialKey, Material>,
    material_uniforms: MaterialUniformCache,
    uniform_names: UniformNameCache,
    lights: SlotMap<LightKey, Light>,
    dispatcher: LightDispatcher,
    settings: RendererSettings,
    stats: FrameStats,
    layer_lights: SplitLights,
    camera: Camera,
}

impl Harness {
    fn new() -> Self {
        init_logging();
        Self {
            device: RecordingDevice::default(),
            backend: MockBackend::default(),
            shaders: ShaderCache::new(),
            materials: SlotMap::with_key(),
            material_uniforms: MaterialUniformCache::default(),
            uniform_names: UniformNameCache::default(),
            lights: SlotMap::with_key(),
            dispatcher: LightDispatcher::new(),
            settings: RendererSettings::default(),
            stats: FrameStats::default(),
            layer_lights: SplitLights::default(),
            camera: Camera::new(CameraId(0), "main"),
        }
    }

    fn material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    fn run(&mut self, draw_calls: &mut [DrawCall]) -> PreparedCallList {
        self.run_into(draw_calls, None)
    }

    fn run_into(
        &mut self,
        draw_calls: &mut [DrawCall],
        target: Option<myth_frame::renderer::device::RenderTarget>,
    ) -> PreparedCallList {
        let mut blend_changed = false;
        let mut prepared = PreparedCallList::default();
        let mut ctx = PrepareContext {
            device: &mut self.device,
            shader_backend: &mut self.backend,
            shaders: &mut self.shaders,
            materials: &mut self.materials,
            material_uniforms: &mut self.material_uniforms,
            uniform_names: &mut self.uniform_names,
            lights: &self.lights,
            stats: &mut self.stats,
            blend_changed: &mut blend_changed,
        };
        prepare(
            &mut ctx,
            draw_calls,
            &PrepareParams {
                pass: ShaderPass::Forward,
                culling_mask: self.camera.culling_mask,
                layer_lights: &self.layer_lights,
                clustered: self.settings.clustered_lighting,
            },
            &mut prepared,
        );

        let mut ctx = ExecuteContext {
            device: &mut self.device,
            shaders: &self.shaders,
            materials: &self.materials,
            material_uniforms: &self.material_uniforms,
            uniform_names: &mut self.uniform_names,
            lights: &self.lights,
            light_dispatcher: &mut self.dispatcher,
            settings: &self.settings,
            stats: &mut self.stats,
        };
        execute(
            &mut ctx,
            draw_calls,
            &prepared,
            &ExecuteParams {
                camera: &self.camera,
                target: target.as_ref(),
                pass: ShaderPass::Forward,
                layer_lights: &self.layer_lights,
            },
        );
        prepared
    }
}

fn tinted(name: &str, material: MaterialKey, tint: f32) -> DrawCall {
    let mut m = mesh(name, material);
    m.set_parameter("material_tint", UniformValue::Float(tint));
    m.into()
}

// ============================================================================
// Failure Handling
// ============================================================================

#[test]
fn failed_shader_skips_material_and_continues() {
    let mut h = Harness::new();
    h.backend = MockBackend::failing("broken");
    let broken = h.material(Material::new("broken"));
    let fine = h.material(Material::new("fine"));
    let mut calls = vec![
        mesh_call("a", broken),
        mesh_call("b", broken),
        mesh_call("c", fine),
    ];

    h.run(&mut calls);
    assert_eq!(h.device.draws(), 1);
    assert_eq!(h.stats.draw_calls, 1);
    assert_eq!(h.stats.skipped_draws, 2);
}

#[test]
fn rejected_program_skips_like_failed_compile() {
    let mut h = Harness::new();
    let mat = h.material(Material::new("stone"));
    let mut calls = vec![mesh_call("a", mat)];

    // First compile yields program 1
    h.device.rejected.push(myth_frame::renderer::shader::ShaderProgram(1));
    h.run(&mut calls);
    assert_eq!(h.device.draws(), 0);
    assert_eq!(h.stats.skipped_draws, 1);
}

#[test]
fn draw_with_removed_material_is_skipped() {
    let mut h = Harness::new();
    let gone = h.material(Material::new("gone"));
    let fine = h.material(Material::new("fine"));
    h.materials.remove(gone);
    let mut calls = vec![mesh_call("orphan", gone), mesh_call("b", fine)];

    let prepared = h.run(&mut calls);
    assert_eq!(prepared.len(), 2);
    assert_eq!(h.device.draws(), 1);
    assert_eq!(h.stats.skipped_draws, 1);
    assert_eq!(h.backend.compiles.len(), 1);
}

#[test]
fn skip_ends_at_next_material() {
    let mut h = Harness::new();
    h.backend = MockBackend::failing("broken");
    let broken = h.material(Material::new("broken"));
    let fine = h.material(Material::new("fine"));
    let mut calls = vec![
        mesh_call("a", fine),
        mesh_call("b", broken),
        mesh_call("c", fine),
        mesh_call("d", fine),
    ];

    h.run(&mut calls);
    assert_eq!(h.device.draws(), 3);
}

// ============================================================================
// State Restoration
// ============================================================================

#[test]
fn global_state_is_restored_after_loop() {
    let mut h = Harness::new();
    let mut special = Material::new("special");
    special.set_blend_state(Some(wgpu::BlendState::ALPHA_BLENDING));
    special.alpha_to_coverage = true;
    special.depth_bias = Some(wgpu::DepthBiasState {
        constant: 2,
        slope_scale: 1.5,
        clamp: 0.0,
    });
    special.stencil_front = Some(StencilParams {
        reference: 3,
        ..Default::default()
    });
    let mat = h.material(special);
    let mut calls = vec![mesh_call("a", mat)];

    h.run(&mut calls);
    assert_eq!(h.device.draws(), 1);
    assert_eq!(h.device.blend, None);
    assert_eq!(h.device.stencil, (None, None));
    assert!(!h.device.alpha_to_coverage);
    assert_eq!(h.device.depth_bias, None);
}

#[test]
fn material_state_is_applied_before_draw() {
    let mut h = Harness::new();
    let mut glass = Material::new("glass");
    glass.set_blend_state(Some(wgpu::BlendState::ALPHA_BLENDING));
    let mat = h.material(glass);
    let mut calls = vec![mesh_call("a", mat)];

    h.run(&mut calls);
    let blend = h
        .device
        .calls
        .iter()
        .position(|c| *c == Call::Blend(Some(wgpu::BlendState::ALPHA_BLENDING)))
        .unwrap();
    let draw = h
        .device
        .calls
        .iter()
        .position(|c| matches!(c, Call::Draw { .. }))
        .unwrap();
    assert!(blend < draw);
}

// ============================================================================
// Instance Overrides
// ============================================================================

#[test]
fn instance_override_is_restored_for_next_draw() {
    let mut h = Harness::new();
    let mut stone = Material::new("stone");
    stone.set_parameter("material_tint", UniformValue::Float(1.0));
    let mat = h.material(stone);
    let mut calls = vec![tinted("a", mat, 0.5), mesh_call("b", mat)];

    h.run(&mut calls);
    let writes: Vec<UniformValue> = h
        .device
        .uniform_writes()
        .into_iter()
        .filter(|(name, _)| name == "material_tint")
        .map(|(_, value)| value)
        .collect();
    // Material value, override, restore
    assert_eq!(
        writes,
        vec![
            UniformValue::Float(1.0),
            UniformValue::Float(0.5),
            UniformValue::Float(1.0)
        ]
    );
}

#[test]
fn override_not_restored_before_material_rebind() {
    let mut h = Harness::new();
    let mut stone = Material::new("stone");
    stone.set_parameter("material_tint", UniformValue::Float(1.0));
    let stone = h.material(stone);
    let other = h.material(Material::new("other"));
    let mut calls = vec![tinted("a", stone, 0.5), mesh_call("b", other)];

    h.run(&mut calls);
    let tint_writes = h
        .device
        .uniform_writes()
        .iter()
        .filter(|(name, _)| name == "material_tint")
        .count();
    assert_eq!(tint_writes, 2);
}

// ============================================================================
// Pipeline State
// ============================================================================

#[test]
fn redundant_state_is_elided() {
    let mut h = Harness::new();
    let mat = h.material(Material::new("stone"));
    let mut calls = vec![
        mesh_call("a", mat),
        mesh_call("b", mat),
        mesh_call("c", mat),
    ];

    h.run(&mut calls);
    assert_eq!(h.device.draws(), 3);
    assert_eq!(h.device.count(|c| matches!(c, Call::Shader(_))), 1);
    assert_eq!(h.device.count(|c| matches!(c, Call::VertexBuffer(_))), 1);
    assert_eq!(h.device.count(|c| matches!(c, Call::Cull(_))), 1);
}

#[test]
fn cull_flip_is_xor_of_all_sources() {
    let mut h = Harness::new();
    let mat = h.material(Material::new("stone"));
    let mut flipped = mesh("mirrored", mat);
    flipped.flip_faces = true;
    let mut calls: Vec<DrawCall> = vec![flipped.into()];

    h.run(&mut calls);
    assert!(h.device.calls.contains(&Call::Cull(Some(wgpu::Face::Front))));

    // Camera flip cancels the instance flip
    h.device.clear_calls();
    h.camera.flip_faces = true;
    h.run(&mut calls);
    assert!(h.device.calls.contains(&Call::Cull(Some(wgpu::Face::Back))));

    // Target flip flips again
    h.device.clear_calls();
    let mut target = render_target(2);
    target.flip_y = true;
    h.run_into(&mut calls, Some(target));
    assert!(h.device.calls.contains(&Call::Cull(Some(wgpu::Face::Front))));
}

#[test]
fn instance_stencil_overrides_material() {
    let mut h = Harness::new();
    let material_stencil = StencilParams {
        reference: 1,
        ..Default::default()
    };
    let instance_stencil = StencilParams {
        reference: 9,
        ..Default::default()
    };
    let mut masked = Material::new("masked");
    masked.stencil_front = Some(material_stencil);
    masked.stencil_back = Some(material_stencil);
    let mat = h.material(masked);
    let mut outlined = mesh("outlined", mat);
    outlined.stencil_front = Some(instance_stencil);
    let mut calls: Vec<DrawCall> = vec![outlined.into()];

    h.run(&mut calls);
    assert!(
        h.device
            .calls
            .contains(&Call::Stencil(Some(instance_stencil), Some(material_stencil)))
    );
}

// ============================================================================
// Multi-view & Commands
// ============================================================================

#[test]
fn multiview_draws_once_per_view() {
    let mut h = Harness::new();
    for x in [0.0, 0.5] {
        h.camera.views.push(CameraView {
            view_matrix: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            projection_matrix: Mat4::IDENTITY,
            viewport: Rect::new(x, 0.0, 0.5, 1.0),
        });
    }
    let mat = h.material(Material::new("stone"));
    let mut calls = vec![mesh_call("a", mat), mesh_call("b", mat)];

    h.run(&mut calls);
    assert_eq!(h.device.draws(), 4);
    assert_eq!(h.stats.draw_calls, 4);
    assert_eq!(h.device.count(|c| matches!(c, Call::Viewport(_))), 4);
}

#[test]
fn commands_run_in_draw_order() {
    let mut h = Harness::new();
    let ran = Arc::new(AtomicU32::new(0));
    let seen = ran.clone();
    let mat = h.material(Material::new("stone"));
    let mut calls = vec![
        mesh_call("a", mat),
        DrawCommand::new("marker", move |device| {
            seen.fetch_add(1, Ordering::Relaxed);
            device.set_cull_mode(None);
        })
        .into(),
        mesh_call("b", mat),
    ];

    h.run(&mut calls);
    assert_eq!(ran.load(Ordering::Relaxed), 1);
    assert_eq!(h.stats.command_calls, 1);
    assert_eq!(h.device.draws(), 2);

    // The command's state change is not trusted: cull is re-sent afterwards
    assert_eq!(h.device.count(|c| matches!(c, Call::Cull(Some(_)))), 2);
}

#[test]
fn lights_dispatched_only_when_light_config_changes() {
    let mut h = Harness::new();
    let sun = h.lights.insert(Light::new_directional("sun"));
    h.layer_lights.push(sun, myth_frame::scene::light::LightType::Directional);
    let stone = h.material(Material::new("stone"));
    let glass = h.material(Material::new("glass"));
    let mut masked = mesh("d", glass);
    masked.mask = 0b1;
    let mut calls = vec![
        mesh_call("a", stone),
        mesh_call("b", stone),
        mesh_call("c", glass),
        masked.into(),
        mesh_call("e", stone),
    ];

    h.run(&mut calls);
    let color_writes = h
        .device
        .uniform_writes()
        .iter()
        .filter(|(name, _)| name == "light0_color")
        .count();
    // a (first) and e (new material after a mask change); c keeps the
    // lights of a, d is not a material change
    assert_eq!(color_writes, 2);
}
