//! Layers
//!
//! A layer groups draw calls that render with the same shader pass and the
//! same light list. The scene system fills a layer's visible lists (one per
//! camera, already culled and sorted) before each frame.

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::renderer::device::RenderTarget;
use crate::renderer::shader::ShaderPass;
use crate::scene::camera::CameraId;
use crate::scene::draw_call::DrawCall;
use crate::scene::light::{Light, LightKey, LightSignature, LightType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

/// What a grab layer captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabKind {
    Color,
    Depth,
}

/// A layer's lights split by type.
#[derive(Debug, Clone, Default)]
pub struct SplitLights {
    pub directional: Vec<LightKey>,
    pub omni: Vec<LightKey>,
    pub spot: Vec<LightKey>,
}

impl SplitLights {
    pub fn push(&mut self, key: LightKey, light_type: LightType) {
        let list = self.list_mut(light_type);
        if !list.contains(&key) {
            list.push(key);
        }
    }

    pub fn remove(&mut self, key: LightKey) {
        self.directional.retain(|k| *k != key);
        self.omni.retain(|k| *k != key);
        self.spot.retain(|k| *k != key);
    }

    fn list_mut(&mut self, light_type: LightType) -> &mut Vec<LightKey> {
        match light_type {
            LightType::Directional => &mut self.directional,
            LightType::Omni => &mut self.omni,
            LightType::Spot => &mut self.spot,
        }
    }

    /// Local (omni + spot) lights, omni first.
    pub fn local(&self) -> impl Iterator<Item = LightKey> + '_ {
        self.omni.iter().chain(self.spot.iter()).copied()
    }

    /// All lights: directional, omni, spot.
    pub fn all(&self) -> impl Iterator<Item = LightKey> + '_ {
        self.directional
            .iter()
            .chain(&self.omni)
            .chain(&self.spot)
            .copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.omni.is_empty() && self.spot.is_empty()
    }

    /// Signatures of the enabled lights, in dispatch order.
    #[must_use]
    pub fn signatures(&self, lights: &SlotMap<LightKey, Light>) -> Vec<LightSignature> {
        self.all()
            .filter_map(|key| lights.get(key))
            .filter(|light| light.enabled)
            .map(Light::signature)
            .collect()
    }
}

pub struct Layer {
    pub id: LayerId,
    pub name: Cow<'static, str>,
    pub enabled: bool,
    pub shader_pass: ShaderPass,
    /// Set for layers that capture the current colour or depth buffer.
    pub grab: Option<GrabKind>,
    /// Target override; `None` renders into the camera's target.
    pub render_target: Option<RenderTarget>,

    pub clear_color_buffer: bool,
    pub clear_depth_buffer: bool,
    pub clear_stencil_buffer: bool,

    lights: SplitLights,
    visible: FxHashMap<CameraId, Vec<DrawCall>>,
}

impl Layer {
    #[must_use]
    pub fn new(id: LayerId, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            shader_pass: ShaderPass::Forward,
            grab: None,
            render_target: None,
            clear_color_buffer: false,
            clear_depth_buffer: false,
            clear_stencil_buffer: false,
            lights: SplitLights::default(),
            visible: FxHashMap::default(),
        }
    }

    /// A grab layer (no draw calls of its own).
    #[must_use]
    pub fn new_grab(id: LayerId, name: impl Into<Cow<'static, str>>, kind: GrabKind) -> Self {
        let mut layer = Self::new(id, name);
        layer.grab = Some(kind);
        if kind == GrabKind::Depth {
            layer.shader_pass = ShaderPass::Depth;
        }
        layer
    }

    #[inline]
    #[must_use]
    pub fn is_grab(&self) -> bool {
        self.grab.is_some()
    }

    // === Lights ===

    pub fn add_light(&mut self, key: LightKey, light_type: LightType) {
        self.lights.push(key, light_type);
    }

    pub fn remove_light(&mut self, key: LightKey) {
        self.lights.remove(key);
    }

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &SplitLights {
        &self.lights
    }

    // === Visible lists ===

    /// Replaces the visible list for a camera.
    pub fn set_visible(&mut self, camera: CameraId, draw_calls: Vec<DrawCall>) {
        self.visible.insert(camera, draw_calls);
    }

    #[must_use]
    pub fn visible(&self, camera: CameraId) -> &[DrawCall] {
        self.visible.get(&camera).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn visible_mut(&mut self, camera: CameraId) -> &mut [DrawCall] {
        self.visible.get_mut(&camera).map(Vec::as_mut_slice).unwrap_or_default()
    }

    /// The light lists together with a camera's visible list, borrowed
    /// separately.
    pub fn lights_and_visible_mut(&mut self, camera: CameraId) -> (&SplitLights, &mut [DrawCall]) {
        let visible = self.visible.get_mut(&camera).map(Vec::as_mut_slice).unwrap_or_default();
        (&self.lights, visible)
    }

    pub(crate) fn forget_camera(&mut self, camera: CameraId) {
        self.visible.remove(&camera);
    }
}
