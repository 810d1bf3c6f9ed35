//! Lights
//!
//! A [`Light`] is a tagged union over [`LightKind`] (directional / omni /
//! spot) with a shared block of colour, shadow and cookie attributes.
//!
//! # Derived Caches
//!
//! The GPU-facing numbers (final colour in gamma and linear space, world
//! direction, world position) are derived fields. They are recomputed by the
//! setters ([`Light::set_world_transform`], [`Light::set_color`],
//! [`Light::set_intensity`]) and are read-only for the dispatch code.
//!
//! # Shadow Render Data
//!
//! Shadow output is stored per `(camera, face)` pair in
//! [`ShadowRenderData`] records. Directional lights key by camera (their
//! frustum depends on the view); local lights key by face with no camera.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use slotmap::new_key_type;
use xxhash_rust::xxh3::Xxh3;

use crate::renderer::device::TextureId;
use crate::renderer::graph::shadow::{MAX_CASCADES, compute_cascade_splits};
use crate::scene::camera::CameraId;

new_key_type! {
    /// Handle of a light in a [`LayerComposition`](crate::scene::LayerComposition).
    pub struct LightKey;
}

/// Light type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightType {
    Directional,
    Omni,
    Spot,
}

/// Emitter shape. Non-punctual shapes are lit with LTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightShape {
    #[default]
    Punctual,
    Rect,
    Disk,
    Sphere,
}

/// Distance attenuation model for local lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FalloffMode {
    #[default]
    Linear,
    InverseSquared,
}

#[derive(Debug, Clone)]
pub struct ShadowSettings {
    /// Shadow map resolution in texels.
    pub resolution: u32,
    pub bias: f32,
    pub normal_bias: f32,
    pub intensity: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            resolution: 1024,
            bias: 0.05,
            normal_bias: 0.0,
            intensity: 1.0,
        }
    }
}

/// Texture channel a cookie is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookieChannel {
    R,
    G,
    B,
    A,
    #[default]
    Rgb,
}

impl CookieChannel {
    /// Channel selection mask as dispatched to the shader.
    #[must_use]
    pub fn mask(self) -> Vec4 {
        match self {
            Self::R => Vec4::new(1.0, 0.0, 0.0, 0.0),
            Self::G => Vec4::new(0.0, 1.0, 0.0, 0.0),
            Self::B => Vec4::new(0.0, 0.0, 1.0, 0.0),
            Self::A => Vec4::new(0.0, 0.0, 0.0, 1.0),
            Self::Rgb => Vec4::new(1.0, 1.0, 1.0, 0.0),
        }
    }
}

/// Projected texture mask.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub texture: TextureId,
    pub intensity: f32,
    pub channel: CookieChannel,
    /// 2×2 UV transform packed as a `Vec4`.
    pub transform: Option<Vec4>,
    pub offset: Vec2,
    /// Apply the spot cone falloff on top of the cookie.
    pub falloff: bool,
}

impl Cookie {
    #[must_use]
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            intensity: 1.0,
            channel: CookieChannel::default(),
            transform: None,
            offset: Vec2::ZERO,
            falloff: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub cascade_count: u32,
    /// Blend between uniform (`0.0`) and logarithmic (`1.0`) splits.
    pub cascade_distribution: f32,
    pub shadow_distance: f32,
}

impl DirectionalLight {
    /// Cascade split distances for a camera whose near plane is `near`.
    #[must_use]
    pub fn cascade_splits(&self, near: f32) -> [f32; MAX_CASCADES as usize] {
        compute_cascade_splits(
            self.cascade_count,
            near,
            self.shadow_distance,
            self.cascade_distribution,
        )
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            cascade_count: 1,
            cascade_distribution: 0.5,
            shadow_distance: 40.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OmniLight {
    /// Attenuation end.
    pub range: f32,
    pub falloff: FalloffMode,
}

#[derive(Debug, Clone)]
pub struct SpotLight {
    pub range: f32,
    pub falloff: FalloffMode,
    /// Inner cone angle in degrees.
    pub inner_cone: f32,
    /// Outer cone angle in degrees.
    pub outer_cone: f32,
}

#[derive(Debug, Clone)]
pub enum LightKind {
    Directional(DirectionalLight),
    Omni(OmniLight),
    Spot(SpotLight),
}

impl LightKind {
    #[must_use]
    pub fn light_type(&self) -> LightType {
        match self {
            Self::Directional(_) => LightType::Directional,
            Self::Omni(_) => LightType::Omni,
            Self::Spot(_) => LightType::Spot,
        }
    }
}

/// Key of a [`ShadowRenderData`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowDataKey {
    pub camera: Option<CameraId>,
    pub face: u8,
}

impl ShadowDataKey {
    /// Per-camera record (directional lights).
    #[must_use]
    pub fn camera(camera: CameraId) -> Self {
        Self {
            camera: Some(camera),
            face: 0,
        }
    }

    /// Camera-independent record for a cube or planar face (local lights).
    #[must_use]
    pub fn face(face: u8) -> Self {
        Self { camera: None, face }
    }
}

/// Output of the shadow renderer for one `(camera, face)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowRenderData {
    pub shadow_matrix: Mat4,
    pub shadow_buffer: Option<TextureId>,
    /// Far clip of the shadow camera.
    pub far_clip: f32,
    pub cascade_count: u32,
    pub cascade_distances: [f32; MAX_CASCADES as usize],
    pub cascade_palette: [Mat4; MAX_CASCADES as usize],
}

impl Default for ShadowRenderData {
    fn default() -> Self {
        Self {
            shadow_matrix: Mat4::IDENTITY,
            shadow_buffer: None,
            far_clip: 1.0,
            cascade_count: 1,
            cascade_distances: [0.0; MAX_CASCADES as usize],
            cascade_palette: [Mat4::IDENTITY; MAX_CASCADES as usize],
        }
    }
}

/// The part of a light's state that changes generated shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightSignature {
    pub light_type: LightType,
    pub shape: LightShape,
    pub cast_shadows: bool,
    pub has_cookie: bool,
    pub falloff: FalloffMode,
}

#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub enabled: bool,
    pub cast_shadows: bool,
    pub shadow: ShadowSettings,
    pub cookie: Option<Cookie>,
    pub shape: LightShape,
    /// Bitmask of draw calls this light affects.
    pub mask: u32,

    color: Vec3,
    intensity: f32,
    world_matrix: Mat4,

    // Derived, recomputed by the setters
    final_color: Vec3,
    final_color_linear: Vec3,
    direction: Vec3,
    position: Vec3,

    shadow_data: FxHashMap<ShadowDataKey, ShadowRenderData>,
}

impl Light {
    fn with_kind(name: &str, kind: LightKind) -> Self {
        let mut light = Self {
            name: name.to_string(),
            kind,
            enabled: true,
            cast_shadows: false,
            shadow: ShadowSettings::default(),
            cookie: None,
            shape: LightShape::Punctual,
            mask: u32::MAX,
            color: Vec3::ONE,
            intensity: 1.0,
            world_matrix: Mat4::IDENTITY,
            final_color: Vec3::ONE,
            final_color_linear: Vec3::ONE,
            direction: Vec3::NEG_Y,
            position: Vec3::ZERO,
            shadow_data: FxHashMap::default(),
        };
        light.update_derived();
        light
    }

    #[must_use]
    pub fn new_directional(name: &str) -> Self {
        Self::with_kind(name, LightKind::Directional(DirectionalLight::default()))
    }

    #[must_use]
    pub fn new_omni(name: &str, range: f32) -> Self {
        Self::with_kind(
            name,
            LightKind::Omni(OmniLight {
                range,
                falloff: FalloffMode::default(),
            }),
        )
    }

    #[must_use]
    pub fn new_spot(name: &str, range: f32, inner_cone: f32, outer_cone: f32) -> Self {
        Self::with_kind(
            name,
            LightKind::Spot(SpotLight {
                range,
                falloff: FalloffMode::default(),
                inner_cone,
                outer_cone,
            }),
        )
    }

    #[inline]
    #[must_use]
    pub fn light_type(&self) -> LightType {
        self.kind.light_type()
    }

    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        !matches!(self.kind, LightKind::Directional(_))
    }

    /// Attenuation end for local lights, `0.0` for directional ones.
    #[must_use]
    pub fn range(&self) -> f32 {
        match &self.kind {
            LightKind::Directional(_) => 0.0,
            LightKind::Omni(omni) => omni.range,
            LightKind::Spot(spot) => spot.range,
        }
    }

    #[must_use]
    pub fn falloff(&self) -> FalloffMode {
        match &self.kind {
            LightKind::Directional(_) => FalloffMode::Linear,
            LightKind::Omni(omni) => omni.falloff,
            LightKind::Spot(spot) => spot.falloff,
        }
    }

    // === Transform & colour (derived caches) ===

    pub fn set_world_transform(&mut self, world: Mat4) {
        self.world_matrix = world;
        self.update_derived();
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.update_derived();
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.update_derived();
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color
    }

    #[inline]
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Colour × intensity in the colour's own (gamma) space.
    #[inline]
    #[must_use]
    pub fn final_color(&self) -> Vec3 {
        self.final_color
    }

    /// Colour converted to linear space, × intensity.
    #[inline]
    #[must_use]
    pub fn final_color_linear(&self) -> Vec3 {
        self.final_color_linear
    }

    /// World-space direction the light travels (negated local Y axis).
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn update_derived(&mut self) {
        self.final_color = self.color * self.intensity;
        let linear = Vec3::new(
            self.color.x.powf(2.2),
            self.color.y.powf(2.2),
            self.color.z.powf(2.2),
        );
        self.final_color_linear = linear * self.intensity;

        let down = -self.world_matrix.y_axis.truncate();
        self.direction = if down.length_squared() > 1e-12 {
            down.normalize()
        } else {
            Vec3::NEG_Y
        };
        self.position = self.world_matrix.w_axis.truncate();
    }

    // === Shadow render data ===

    #[must_use]
    pub fn shadow_data(&self, key: ShadowDataKey) -> Option<&ShadowRenderData> {
        self.shadow_data.get(&key)
    }

    /// Returns the record for `key`, creating a default one first.
    pub fn shadow_data_mut(&mut self, key: ShadowDataKey) -> &mut ShadowRenderData {
        self.shadow_data.entry(key).or_default()
    }

    /// Drops all shadow records of a camera (camera removed).
    pub fn forget_camera(&mut self, camera: CameraId) {
        self.shadow_data.retain(|key, _| key.camera != Some(camera));
    }

    // === Variants ===

    #[must_use]
    pub fn signature(&self) -> LightSignature {
        LightSignature {
            light_type: self.light_type(),
            shape: self.shape,
            cast_shadows: self.cast_shadows,
            has_cookie: self.cookie.is_some(),
            falloff: self.falloff(),
        }
    }
}

/// Hashes the shader-relevant configuration of a light list.
///
/// With clustered lighting, omni and spot lights are read from the clusters
/// and do not change the generated code; only directional lights, which
/// still occupy light slots, are hashed.
#[must_use]
pub fn light_hash(signatures: &[LightSignature], clustered: bool) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&[u8::from(clustered)]);
    let slotted = signatures
        .iter()
        .filter(|sig| !clustered || sig.light_type == LightType::Directional);
    for sig in slotted {
        hasher.update(&[
            sig.light_type as u8,
            sig.shape as u8,
            u8::from(sig.cast_shadows),
            u8::from(sig.has_cookie),
            sig.falloff as u8,
        ]);
    }
    hasher.digest()
}
