//! Draw-Call Execution
//!
//! Second submission phase. Walks a [`PreparedCallList`] and applies GPU
//! state only where the annotations say it changed:
//!
//! - New material: bind the shader (or skip the material for the rest of the
//!   batch if it failed), upload material parameters, re-dispatch lights if
//!   the light configuration changed, then set blend, depth,
//!   alpha-to-coverage and depth bias.
//! - Every mesh entry: stencil, cull mode, buffers, skinning/morphing and
//!   per-instance uniforms, then the draw (once per view for multi-view
//!   cameras).
//!
//! The global defaults are restored when the loop ends.

use glam::Mat4;
use log::warn;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::renderer::device::{
    GraphicsDevice, RenderTarget, UniformId, UniformValue, flip_face,
};
use crate::renderer::draw::prepare::PreparedCallList;
use crate::renderer::draw::tracked::TrackedDevice;
use crate::renderer::lighting::LightDispatcher;
use crate::renderer::settings::RendererSettings;
use crate::renderer::shader::{ShaderCache, ShaderPass};
use crate::renderer::stats::FrameStats;
use crate::renderer::uniforms::{
    MODEL_MATRIX, MaterialUniformCache, NORMAL_MATRIX, PROJECTION_MATRIX, UniformNameCache,
    VIEW_MATRIX, VIEW_POSITION, VIEW_PROJECTION_MATRIX,
};
use crate::scene::camera::Camera;
use crate::scene::draw_call::{DrawCall, MeshInstance};
use crate::scene::layer::SplitLights;
use crate::scene::light::{Light, LightKey};
use crate::scene::material::{Material, MaterialKey};

/// Borrowed renderer state used while executing.
pub struct ExecuteContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub shaders: &'a ShaderCache,
    pub materials: &'a SlotMap<MaterialKey, Material>,
    pub material_uniforms: &'a MaterialUniformCache,
    pub uniform_names: &'a mut UniformNameCache,
    pub lights: &'a SlotMap<LightKey, Light>,
    pub light_dispatcher: &'a mut LightDispatcher,
    pub settings: &'a RendererSettings,
    pub stats: &'a mut FrameStats,
}

/// What is being executed.
pub struct ExecuteParams<'a> {
    pub camera: &'a Camera,
    pub target: Option<&'a RenderTarget>,
    pub pass: ShaderPass,
    pub layer_lights: &'a SplitLights,
}

/// Writes the camera (or one of its views) into the per-view uniforms.
pub fn bind_view(
    device: &mut dyn GraphicsDevice,
    names: &mut UniformNameCache,
    view: &Mat4,
    projection: &Mat4,
    position: glam::Vec3,
) {
    let id = names.resolve(device, VIEW_MATRIX);
    device.set_uniform(id, &UniformValue::Mat4(*view));
    let id = names.resolve(device, PROJECTION_MATRIX);
    device.set_uniform(id, &UniformValue::Mat4(*projection));
    let id = names.resolve(device, VIEW_PROJECTION_MATRIX);
    device.set_uniform(id, &UniformValue::Mat4(*projection * *view));
    let id = names.resolve(device, VIEW_POSITION);
    device.set_uniform(id, &UniformValue::Vec3(position));
}

/// Issues the prepared draw calls.
pub fn execute(
    ctx: &mut ExecuteContext<'_>,
    draw_calls: &[DrawCall],
    prepared: &PreparedCallList,
    params: &ExecuteParams<'_>,
) {
    let target_size = params
        .target
        .map_or_else(|| ctx.device.backbuffer_size(), |t| (t.width, t.height));
    let target_flip = params.target.is_some_and(|t| t.flip_y);

    let mut device = TrackedDevice::new(&mut *ctx.device);
    let mut skip_material = false;
    let mut overridden: SmallVec<[UniformId; 8]> = SmallVec::new();

    for i in 0..prepared.len() {
        let mesh = match &draw_calls[prepared.calls[i]] {
            DrawCall::Command(cmd) => {
                (cmd.callback)(device.raw());
                device.invalidate();
                ctx.stats.command_calls += 1;
                continue;
            }
            DrawCall::Mesh(mesh) => mesh,
        };

        let Some(material) = ctx.materials.get(mesh.material) else {
            warn!("Draw call '{}' skipped: its material no longer exists", mesh.name);
            ctx.stats.skipped_draws += 1;
            continue;
        };

        if prepared.is_new_material[i] {
            let program = mesh
                .cached_shader(params.pass)
                .and_then(|cached| ctx.shaders.program(cached.shader));
            skip_material = match program {
                Some(program) => !device.set_shader(program),
                None => true,
            };
            if skip_material {
                ctx.stats.skipped_draws += 1;
                continue;
            }

            overridden.clear();
            for (id, value) in ctx.material_uniforms.get(mesh.material) {
                device.raw().set_uniform(*id, value);
            }

            if prepared.light_changed[i] {
                dispatch_lights(
                    ctx.light_dispatcher,
                    device.raw(),
                    ctx.lights,
                    ctx.settings,
                    mesh,
                    params,
                );
            }

            let raw = device.raw();
            raw.set_blend_state(material.blend_state());
            raw.set_depth_state(material.depth);
            raw.set_alpha_to_coverage(material.alpha_to_coverage);
            raw.set_depth_bias(material.depth_bias);
        } else if skip_material {
            ctx.stats.skipped_draws += 1;
            continue;
        }

        let front = mesh.stencil_front.or(material.stencil_front);
        let back = mesh.stencil_back.or(material.stencil_back);
        device.set_stencil_state(front, back);

        let flip = ctx.settings.flip_faces ^ params.camera.flip_faces ^ target_flip ^ mesh.flip_faces;
        device.set_cull_mode(if flip { flip_face(material.cull) } else { material.cull });

        device.set_vertex_buffer(mesh.geometry.vertex_buffer);
        device.set_index_buffer(mesh.geometry.index_buffer);
        device.set_skinning(mesh.bone_texture);
        device.set_morphing(mesh.morph_texture);

        bind_instance(device.raw(), ctx.uniform_names, mesh, &mut overridden);

        let camera = params.camera;
        if camera.is_multiview() {
            for view in &camera.views {
                let raw = device.raw();
                let position = view.view_matrix.inverse().w_axis.truncate();
                bind_view(raw, ctx.uniform_names, &view.view_matrix, &view.projection_matrix, position);
                raw.set_viewport(view.viewport.to_pixels(target_size.0, target_size.1));
                raw.draw(&mesh.geometry, mesh.instance_count);
                ctx.stats.draw_calls += 1;
            }
        } else {
            device.raw().draw(&mesh.geometry, mesh.instance_count);
            ctx.stats.draw_calls += 1;
        }

        // Undo instance overrides unless the next entry rebinds the material
        let next_is_new = prepared.is_new_material.get(i + 1).copied().unwrap_or(true);
        if !next_is_new {
            for id in overridden.drain(..) {
                if let Some(value) = ctx.material_uniforms.value_of(mesh.material, id) {
                    device.raw().set_uniform(id, value);
                }
            }
        }
    }

    device.reset_state();
}

fn bind_instance(
    device: &mut dyn GraphicsDevice,
    names: &mut UniformNameCache,
    mesh: &MeshInstance,
    overridden: &mut SmallVec<[UniformId; 8]>,
) {
    let id = names.resolve(device, MODEL_MATRIX);
    device.set_uniform(id, &UniformValue::Mat4(mesh.world_matrix));
    let id = names.resolve(device, NORMAL_MATRIX);
    device.set_uniform(id, &UniformValue::Mat4(mesh.world_matrix.inverse().transpose()));

    for (name, value) in mesh.parameters() {
        let id = names.resolve(device, name);
        device.set_uniform(id, value);
        if !overridden.contains(&id) {
            overridden.push(id);
        }
    }
}

fn dispatch_lights(
    dispatcher: &mut LightDispatcher,
    device: &mut dyn GraphicsDevice,
    lights: &SlotMap<LightKey, Light>,
    settings: &RendererSettings,
    mesh: &MeshInstance,
    params: &ExecuteParams<'_>,
) {
    let layer = params.layer_lights;
    let keys: SmallVec<[LightKey; 16]> = if mesh.is_static {
        layer
            .directional
            .iter()
            .chain(mesh.static_lights.iter())
            .copied()
            .collect()
    } else if settings.clustered_lighting {
        layer.directional.iter().copied().collect()
    } else {
        layer.all().collect()
    };
    dispatcher.dispatch_lights(device, lights, &keys, mesh.mask, params.camera, settings);
}
