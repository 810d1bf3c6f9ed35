//! Layer Composition
//!
//! The ordered set of layers and cameras the renderer draws, together with
//! the lights and materials they reference. The composition owns the
//! render-action list and rebuilds it lazily in [`LayerComposition::update`].
//!
//! # Render Action Rules
//!
//! - Cameras render in ascending `priority` (stable for equal priorities);
//!   each camera walks the layers it renders in composition order.
//! - A camera's own clear flags apply to its first action into each target;
//!   a layer's clear flags are OR-ed on top.
//! - Shadow-casting directional lights are attached to the first action of a
//!   camera whose layer holds them, once per camera.
//! - Post-processing triggers on the action right before the camera's
//!   `disable_postprocess_layer`, or on its last action when that layer is
//!   absent, disabled or the camera's first.

use log::debug;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::renderer::device::RenderTargetId;
use crate::scene::camera::{Camera, CameraId};
use crate::scene::layer::{Layer, LayerId};
use crate::scene::light::{Light, LightKey};
use crate::scene::material::{Material, MaterialKey};
use crate::scene::render_action::RenderAction;

/// Result of light clustering for one distinct set of local lights.
#[derive(Debug, Clone, Default)]
pub struct LightClusters {
    /// Local lights assigned to the clusters.
    pub lights: Vec<LightKey>,
    /// Packed cell data, written by the cluster update.
    pub cells: Vec<u32>,
}

#[derive(Default)]
pub struct LayerComposition {
    pub(crate) layers: Vec<Layer>,
    pub(crate) cameras: Vec<Camera>,
    pub(crate) lights: SlotMap<LightKey, Light>,
    pub(crate) materials: SlotMap<MaterialKey, Material>,

    pub(crate) render_actions: Vec<RenderAction>,
    pub(crate) light_clusters: Vec<LightClusters>,

    dirty: bool,
    clustered: bool,
    blend_changed: bool,
}

impl LayerComposition {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dirty: true,
            ..Default::default()
        }
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // === Layers ===

    pub fn push_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.dirty = true;
        self.layers.len() - 1
    }

    pub fn insert_layer(&mut self, index: usize, layer: Layer) {
        self.layers.insert(index.min(self.layers.len()), layer);
        self.dirty = true;
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let index = self.layer_index(id)?;
        self.dirty = true;
        Some(self.layers.remove(index))
    }

    /// Enables or disables a layer and schedules an action rebuild.
    pub fn set_layer_enabled(&mut self, id: LayerId, enabled: bool) {
        if let Some(layer) = self.layer_mut(id)
            && layer.enabled != enabled
        {
            layer.enabled = enabled;
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Mutable access for per-frame data (visible lists, lights). Does not
    /// invalidate the render actions.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    #[inline]
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    // === Cameras ===

    pub fn add_camera(&mut self, camera: Camera) {
        self.cameras.push(camera);
        self.dirty = true;
    }

    pub fn remove_camera(&mut self, id: CameraId) -> Option<Camera> {
        let index = self.cameras.iter().position(|c| c.id == id)?;
        for layer in &mut self.layers {
            layer.forget_camera(id);
        }
        for (_, light) in &mut self.lights {
            light.forget_camera(id);
        }
        self.dirty = true;
        Some(self.cameras.remove(index))
    }

    #[must_use]
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.id == id)
    }

    /// Mutable camera access. Layer list, priority or target may change, so
    /// the render actions are rebuilt on the next update.
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.dirty = true;
        self.cameras.iter_mut().find(|c| c.id == id)
    }

    /// Cameras in render order (valid after [`update`](Self::update)).
    #[inline]
    #[must_use]
    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    // === Lights & materials ===

    pub fn add_light(&mut self, light: Light) -> LightKey {
        self.lights.insert(light)
    }

    /// Removes a light and unlinks it from every layer.
    pub fn remove_light(&mut self, key: LightKey) -> Option<Light> {
        let light = self.lights.remove(key)?;
        for layer in &mut self.layers {
            layer.remove_light(key);
        }
        self.dirty = true;
        Some(light)
    }

    #[must_use]
    pub fn light(&self, key: LightKey) -> Option<&Light> {
        self.lights.get(key)
    }

    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &SlotMap<LightKey, Light> {
        &self.lights
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    #[must_use]
    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    // === Blend notifications ===

    pub(crate) fn notify_blend_changed(&mut self) {
        self.blend_changed = true;
    }

    /// Returns and clears the "a material's blend state changed" flag. The
    /// scene system re-sorts transparent draw calls when it is set.
    pub fn take_blend_changed(&mut self) -> bool {
        std::mem::take(&mut self.blend_changed)
    }

    // === Render actions ===

    #[inline]
    #[must_use]
    pub fn render_actions(&self) -> &[RenderAction] {
        &self.render_actions
    }

    #[inline]
    #[must_use]
    pub fn light_clusters(&self) -> &[LightClusters] {
        &self.light_clusters
    }

    /// Rebuilds the render actions if the composition changed (or the
    /// clustered lighting mode did). Returns `true` when a rebuild happened.
    pub fn update(&mut self, clustered: bool) -> bool {
        if !self.dirty && self.clustered == clustered {
            return false;
        }
        self.dirty = false;
        self.clustered = clustered;

        self.cameras.sort_by_key(|c| c.priority);
        self.render_actions.clear();
        self.light_clusters.clear();

        for (camera_index, camera) in self.cameras.iter().enumerate() {
            if !camera.enabled {
                continue;
            }
            let camera_start = self.render_actions.len();
            let mut cleared_targets: Vec<Option<RenderTargetId>> = Vec::new();
            let mut shadow_lights: FxHashSet<LightKey> = FxHashSet::default();
            let mut postprocess_marked = false;

            for (layer_index, layer) in self.layers.iter().enumerate() {
                if !layer.enabled || !camera.layers.contains(&layer.id) {
                    continue;
                }

                if camera.disable_postprocess_layer == Some(layer.id)
                    && let Some(prev) = self.render_actions[camera_start..].last_mut()
                {
                    prev.trigger_postprocess = true;
                    postprocess_marked = true;
                }

                let target = layer.render_target.or(camera.render_target);
                let mut action = RenderAction::new(layer_index, camera_index, target);

                let target_id = target.map(|t| t.id);
                let first_into_target = !cleared_targets.contains(&target_id);
                if first_into_target {
                    cleared_targets.push(target_id);
                }
                action.clear_color =
                    (first_into_target && camera.clear_color_buffer) || layer.clear_color_buffer;
                action.clear_depth =
                    (first_into_target && camera.clear_depth_buffer) || layer.clear_depth_buffer;
                action.clear_stencil = (first_into_target && camera.clear_stencil_buffer)
                    || layer.clear_stencil_buffer;

                if clustered {
                    action.light_clusters = Some(Self::cluster_slot(
                        &mut self.light_clusters,
                        layer.lights().local().collect(),
                    ));
                }

                for &key in &layer.lights().directional {
                    let casts = self
                        .lights
                        .get(key)
                        .is_some_and(|light| light.enabled && light.cast_shadows);
                    if casts && shadow_lights.insert(key) {
                        action.directional_lights.push(key);
                    }
                }

                self.render_actions.push(action);
            }

            let camera_actions = &mut self.render_actions[camera_start..];
            if let Some(first) = camera_actions.first_mut() {
                first.first_camera_use = true;
            }
            if let Some(last) = camera_actions.last_mut() {
                last.last_camera_use = true;
                // Also covers a disable layer that is missing, disabled or first
                if !postprocess_marked {
                    last.trigger_postprocess = true;
                }
            }
        }

        debug!(
            "Rebuilt {} render actions for {} cameras ({} light cluster sets)",
            self.render_actions.len(),
            self.cameras.len(),
            self.light_clusters.len()
        );
        true
    }

    /// Index of the cluster entry for a local-light set, shared between
    /// layers with identical sets.
    fn cluster_slot(clusters: &mut Vec<LightClusters>, lights: Vec<LightKey>) -> usize {
        if let Some(index) = clusters.iter().position(|c| c.lights == lights) {
            return index;
        }
        clusters.push(LightClusters {
            lights,
            cells: Vec::new(),
        });
        clusters.len() - 1
    }
}
