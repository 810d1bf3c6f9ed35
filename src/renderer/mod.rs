//! Renderer Module
//!
//! The per-frame orchestration core of the forward renderer:
//!
//! - [`graph`]: frame graph builder and render pass coalescer
//! - [`draw`]: two-phase draw submission (prepare, execute)
//! - [`lighting`]: per-light uniform dispatch
//! - [`shader`]: shader variant keys and the renderer-owned variant cache
//! - [`device`]: the graphics device seam
//!
//! # Frame Flow
//!
//! 1. The layer composition rebuilds its render actions if it changed.
//! 2. The frame graph is rebuilt from the render actions.
//! 3. Passes execute in order. Main passes run their render actions; each
//!    action prepares and executes the visible draw calls of its layer.

pub mod device;
pub mod draw;
pub mod graph;
pub mod lighting;
pub mod settings;
pub mod shader;
pub mod stats;
pub mod uniforms;

use log::{debug, trace};
use web_time::Instant;

use crate::errors::Result;
use crate::scene::composition::LayerComposition;

use self::device::{GraphicsDevice, RenderTarget};
use self::draw::{
    ExecuteContext, ExecuteParams, PrepareContext, PrepareParams, PreparedCallList, execute,
    prepare,
};
use self::graph::{FrameGraph, FramePass, MainPass, ShadowRenderer, assign_cascades};
use self::lighting::LightDispatcher;
use self::shader::{ShaderBackend, ShaderCache, ShaderPass};
use self::stats::FrameStats;
use self::uniforms::{MaterialUniformCache, UniformNameCache};

pub use self::settings::{DeviceCapabilities, RendererSettings};

/// External collaborators used while rendering one frame.
pub struct FrameServices<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub shader_backend: &'a mut dyn ShaderBackend,
    pub shadows: &'a mut dyn ShadowRenderer,
}

/// Forward renderer frame core.
///
/// Owns every cache that outlives a frame (shader variants, resolved
/// uniform handles, light slot handles), so several renderers can coexist
/// without sharing state.
pub struct ForwardRenderer {
    settings: RendererSettings,
    shaders: ShaderCache,
    uniform_names: UniformNameCache,
    material_uniforms: MaterialUniformCache,
    light_dispatcher: LightDispatcher,
    prepared: PreparedCallList,
    frame_graph: FrameGraph,
    stats: FrameStats,
}

impl ForwardRenderer {
    pub fn new(settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            shaders: ShaderCache::new(),
            uniform_names: UniformNameCache::default(),
            material_uniforms: MaterialUniformCache::default(),
            light_dispatcher: LightDispatcher::new(),
            prepared: PreparedCallList::default(),
            frame_graph: FrameGraph::new(),
            stats: FrameStats::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    #[must_use]
    pub fn frame_graph(&self) -> &FrameGraph {
        &self.frame_graph
    }

    #[inline]
    #[must_use]
    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    /// Drops every compiled variant, e.g. after a device loss.
    pub fn clear_shaders(&mut self) {
        self.shaders.clear();
    }

    /// Updates the composition's render actions and rebuilds the frame graph
    /// without rendering.
    pub fn build_frame_graph(&mut self, composition: &mut LayerComposition) -> &FrameGraph {
        composition.update(self.settings.clustered_lighting);
        self.frame_graph.build(composition, &self.settings);
        &self.frame_graph
    }

    /// Renders one frame of `composition`.
    pub fn render_frame(&mut self, composition: &mut LayerComposition, services: FrameServices<'_>) {
        let FrameServices {
            device,
            shader_backend,
            shadows,
        } = services;

        self.stats.reset();
        self.light_dispatcher.begin_frame();

        composition.update(self.settings.clustered_lighting);
        let mut graph = std::mem::take(&mut self.frame_graph);
        graph.build(composition, &self.settings);

        let mut blend_changed = false;
        for pass in graph.passes() {
            trace!("Executing frame pass '{}'", pass.label());
            match pass {
                FramePass::LocalCookies { lights } => {
                    if !lights.is_empty() {
                        shadows.render_cookies(device, &mut composition.lights, lights);
                    }
                }
                FramePass::LocalShadows { lights } => {
                    if !lights.is_empty() {
                        shadows.render_local(device, &mut composition.lights, lights);
                        self.stats.shadow_map_updates += lights.len() as u32;
                    }
                }
                FramePass::UpdateClusters => {
                    shadows.update_clusters(
                        device,
                        &mut composition.light_clusters,
                        &composition.lights,
                    );
                }
                FramePass::LocalShadow { light } => {
                    let keys = std::slice::from_ref(light);
                    shadows.render_local(device, &mut composition.lights, keys);
                    self.stats.shadow_map_updates += 1;
                }
                FramePass::DirectionalShadows { camera, lights, .. } => {
                    let camera = &composition.cameras[*camera];
                    assign_cascades(camera, &mut composition.lights, lights);
                    shadows.render_directional(device, camera, &mut composition.lights, lights);
                    self.stats.shadow_map_updates += lights.len() as u32;
                }
                FramePass::Main(main) => {
                    self.render_main_pass(
                        main,
                        composition,
                        device,
                        shader_backend,
                        &mut blend_changed,
                    );
                }
                FramePass::PostProcess { camera } => {
                    let camera = &composition.cameras[*camera];
                    if let Some(hook) = &camera.on_postprocess {
                        hook(camera);
                    }
                }
            }
        }

        self.frame_graph = graph;
        if blend_changed {
            composition.notify_blend_changed();
        }
    }

    fn render_main_pass(
        &mut self,
        pass: &MainPass,
        composition: &mut LayerComposition,
        device: &mut dyn GraphicsDevice,
        shader_backend: &mut dyn ShaderBackend,
        blend_changed: &mut bool,
    ) {
        if let Some(camera) = pass.before {
            let camera = &composition.cameras[camera];
            if let Some(hook) = &camera.on_pre_render {
                hook(camera);
            }
        }

        if !pass.requires_render {
            // Grab copy placeholder: no pass is opened, hooks still run
            let action = &composition.render_actions[pass.start];
            let camera = &composition.cameras[action.camera];
            if let Some(kind) = pass.grab {
                device.copy_grab(kind, camera.render_target.as_ref());
            }
        } else {
            self.render_pass_actions(pass, composition, device, shader_backend, blend_changed);
        }

        if let Some(camera) = pass.after {
            let camera = &composition.cameras[camera];
            if let Some(hook) = &camera.on_post_render {
                hook(camera);
            }
        }
    }

    fn render_pass_actions(
        &mut self,
        pass: &MainPass,
        composition: &mut LayerComposition,
        device: &mut dyn GraphicsDevice,
        shader_backend: &mut dyn ShaderBackend,
        blend_changed: &mut bool,
    ) {
        let label = if pass.grab.is_some() { "grab" } else { "main" };
        device.begin_pass(label, pass.target.as_ref(), &pass.clear);
        self.stats.render_passes += 1;

        for index in pass.start..pass.end {
            self.render_action(index, pass, composition, device, shader_backend, blend_changed);
        }

        device.end_pass();
    }

    fn render_action(
        &mut self,
        index: usize,
        pass: &MainPass,
        composition: &mut LayerComposition,
        device: &mut dyn GraphicsDevice,
        shader_backend: &mut dyn ShaderBackend,
        blend_changed: &mut bool,
    ) {
        let action = &composition.render_actions[index];
        let (layer_index, camera_index) = (action.layer, action.camera);
        let layer = &composition.layers[layer_index];
        let camera = &composition.cameras[camera_index];
        if !layer.enabled || !camera.enabled {
            debug!(
                "Render action {index} skipped: layer '{}' or camera '{}' disabled",
                layer.name, camera.name
            );
            return;
        }
        let started = Instant::now();

        // Hooks of cameras whose first/last use is inside the pass
        if action.first_camera_use
            && index != pass.start
            && let Some(hook) = &camera.on_pre_render
        {
            hook(camera);
        }

        let (width, height) = action
            .render_target
            .map_or_else(|| device.backbuffer_size(), |t| (t.width, t.height));
        device.set_viewport(camera.viewport.to_pixels(width, height));
        device.set_scissor(camera.scissor.to_pixels(width, height));

        if !pass.owns_clear_of(index) && action.has_clear() {
            let ops = camera.clear_ops(action.clear_color, action.clear_depth, action.clear_stencil);
            device.clear(&ops);
        }

        draw::execute::bind_view(
            device,
            &mut self.uniform_names,
            camera.view_matrix(),
            camera.projection_matrix(),
            camera.position(),
        );

        let layer_id = layer.id;
        let shader_pass = layer.shader_pass;
        let last_camera_use = action.last_camera_use;
        let target = action.render_target;

        if layer.is_grab() {
            // Re-render the camera's earlier layers into the grab target
            let sources: Vec<usize> = composition.render_actions[..index]
                .iter()
                .filter(|a| a.camera == camera_index)
                .map(|a| a.layer)
                .filter(|&l| composition.layers[l].enabled && !composition.layers[l].is_grab())
                .collect();
            for source in sources {
                self.draw_layer(
                    source,
                    camera_index,
                    shader_pass,
                    target,
                    composition,
                    device,
                    shader_backend,
                    blend_changed,
                );
            }
        } else {
            self.draw_layer(
                layer_index,
                camera_index,
                shader_pass,
                target,
                composition,
                device,
                shader_backend,
                blend_changed,
            );
        }

        let camera = &composition.cameras[camera_index];
        if last_camera_use
            && index + 1 != pass.end
            && let Some(hook) = &camera.on_post_render
        {
            hook(camera);
        }

        self.stats.add_layer_time(layer_id, started.elapsed());
    }

    /// Prepares and executes the visible draw calls of one layer for one camera.
    fn draw_layer(
        &mut self,
        layer_index: usize,
        camera_index: usize,
        pass: ShaderPass,
        target: Option<RenderTarget>,
        composition: &mut LayerComposition,
        device: &mut dyn GraphicsDevice,
        shader_backend: &mut dyn ShaderBackend,
        blend_changed: &mut bool,
    ) {
        let LayerComposition {
            layers,
            cameras,
            lights,
            materials,
            ..
        } = composition;
        let camera = &cameras[camera_index];
        let (layer_lights, draw_calls) = layers[layer_index].lights_and_visible_mut(camera.id);
        if draw_calls.is_empty() {
            return;
        }

        let mut prepare_ctx = PrepareContext {
            device: &mut *device,
            shader_backend,
            shaders: &mut self.shaders,
            materials: &mut *materials,
            material_uniforms: &mut self.material_uniforms,
            uniform_names: &mut self.uniform_names,
            lights: &*lights,
            stats: &mut self.stats,
            blend_changed,
        };
        prepare(
            &mut prepare_ctx,
            draw_calls,
            &PrepareParams {
                pass,
                culling_mask: camera.culling_mask,
                layer_lights,
                clustered: self.settings.clustered_lighting,
            },
            &mut self.prepared,
        );

        let mut execute_ctx = ExecuteContext {
            device,
            shaders: &self.shaders,
            materials: &*materials,
            material_uniforms: &self.material_uniforms,
            uniform_names: &mut self.uniform_names,
            lights: &*lights,
            light_dispatcher: &mut self.light_dispatcher,
            settings: &self.settings,
            stats: &mut self.stats,
        };
        execute(
            &mut execute_ctx,
            draw_calls,
            &self.prepared,
            &ExecuteParams {
                camera,
                target: target.as_ref(),
                pass,
                layer_lights,
            },
        );
    }
}
