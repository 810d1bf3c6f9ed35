//! Light Uniform Dispatch
//!
//! Packs a light's state into the uniform slots of light `N`
//! (`light{N}_color`, `light{N}_direction`, ...).
//!
//! # Slot Handles
//!
//! The handle set of a slot is resolved the first time the slot is used and
//! kept for the lifetime of the dispatcher. Dispatching only writes values.
//!
//! # Bias Conventions
//!
//! | Type        | `shadowParams.z` (bias)                          | `shadowParams.w` |
//! |-------------|--------------------------------------------------|------------------|
//! | Directional | `bias / far_clip * 100`                          | `0`              |
//! | Omni        | `bias`                                           | `1 / range`      |
//! | Spot        | `bias * SPOT_BIAS_REMAP`                         | `1 / range`      |
//!
//! Directional and spot biases are additionally scaled by
//! [`LEGACY_DERIVATIVE_BIAS_SCALE`] on backends that have neither native
//! shadow compare nor standard derivatives.

use glam::{Vec3, Vec4};
use log::warn;
use slotmap::SlotMap;

use crate::renderer::device::{GraphicsDevice, UniformId, UniformValue};
use crate::renderer::graph::shadow::MAX_CASCADES;
use crate::renderer::lighting::cookie::spot_cookie_matrix;
use crate::renderer::settings::{DeviceCapabilities, RendererSettings};
use crate::scene::camera::Camera;
use crate::scene::light::{
    Cookie, DirectionalLight, FalloffMode, Light, LightKey, LightKind, LightShape, LightType,
    OmniLight, ShadowDataKey, SpotLight,
};

/// Historical spot bias scale.
pub const SPOT_BIAS_REMAP: f32 = 20.0;

/// Bias correction for backends without native shadow compare and without
/// standard derivatives.
pub const LEGACY_DERIVATIVE_BIAS_SCALE: f32 = -100.0;

/// Resolved handles of one light slot.
#[derive(Debug, Clone)]
pub struct LightSlotUniforms {
    pub color: UniformId,
    pub direction: UniformId,
    pub position: UniformId,
    pub radius: UniformId,
    pub inner_cone_angle: UniformId,
    pub outer_cone_angle: UniformId,
    pub falloff_mode: UniformId,
    pub half_width: UniformId,
    pub half_height: UniformId,

    pub shadow_map: UniformId,
    pub shadow_matrix: UniformId,
    pub shadow_params: UniformId,
    pub shadow_intensity: UniformId,
    pub cascade_count: UniformId,
    pub cascade_distances: UniformId,
    pub shadow_matrix_palette: UniformId,

    pub cookie: UniformId,
    pub cookie_matrix: UniformId,
    pub cookie_intensity: UniformId,
    pub cookie_channel: UniformId,
    pub cookie_transform: UniformId,
    pub cookie_offset: UniformId,
}

impl LightSlotUniforms {
    fn resolve(device: &mut dyn GraphicsDevice, index: usize) -> Self {
        let mut id = |suffix: &str| device.resolve_uniform(&format!("light{index}_{suffix}"));
        Self {
            color: id("color"),
            direction: id("direction"),
            position: id("position"),
            radius: id("radius"),
            inner_cone_angle: id("innerConeAngle"),
            outer_cone_angle: id("outerConeAngle"),
            falloff_mode: id("falloffMode"),
            half_width: id("halfWidth"),
            half_height: id("halfHeight"),
            shadow_map: id("shadowMap"),
            shadow_matrix: id("shadowMatrix"),
            shadow_params: id("shadowParams"),
            shadow_intensity: id("shadowIntensity"),
            cascade_count: id("shadowCascadeCount"),
            cascade_distances: id("shadowCascadeDistances"),
            shadow_matrix_palette: id("shadowMatrixPalette"),
            cookie: id("cookie"),
            cookie_matrix: id("cookieMatrix"),
            cookie_intensity: id("cookieIntensity"),
            cookie_channel: id("cookieChannel"),
            cookie_transform: id("cookieMatrixTransform"),
            cookie_offset: id("cookieOffset"),
        }
    }
}

/// Dispatches lights into numbered uniform slots.
#[derive(Debug, Default)]
pub struct LightDispatcher {
    slots: Vec<LightSlotUniforms>,
    overflow_warned: bool,
}

impl LightDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arms the once-per-frame overflow warning.
    pub fn begin_frame(&mut self) {
        self.overflow_warned = false;
    }

    /// Number of slots whose handles have been resolved.
    #[inline]
    #[must_use]
    pub fn resolved_slots(&self) -> usize {
        self.slots.len()
    }

    fn slot(&mut self, device: &mut dyn GraphicsDevice, index: usize) -> &LightSlotUniforms {
        while self.slots.len() <= index {
            let next = LightSlotUniforms::resolve(device, self.slots.len());
            self.slots.push(next);
        }
        &self.slots[index]
    }

    /// Dispatches the lights of `keys` that affect `mask`, directional ones
    /// first, then omni, then spot, up to `max_lights_per_pass` slots.
    /// Returns the number of slots written.
    pub fn dispatch_lights(
        &mut self,
        device: &mut dyn GraphicsDevice,
        lights: &SlotMap<LightKey, Light>,
        keys: &[LightKey],
        mask: u32,
        camera: &Camera,
        settings: &RendererSettings,
    ) -> usize {
        let limit = settings.max_lights_per_pass as usize;
        let mut used = 0;

        for light_type in [LightType::Directional, LightType::Omni, LightType::Spot] {
            let matching = keys
                .iter()
                .filter_map(|key| lights.get(*key))
                .filter(|light| {
                    light.enabled && light.light_type() == light_type && light.mask & mask != 0
                });
            for light in matching {
                if used == limit {
                    if !self.overflow_warned {
                        warn!(
                            "Light '{}' exceeds the {limit} light slots of a draw call and is ignored",
                            light.name
                        );
                        self.overflow_warned = true;
                    }
                    return used;
                }
                self.dispatch_light(device, used, light, camera, settings);
                used += 1;
            }
        }
        used
    }

    /// Writes one light into slot `index`.
    pub fn dispatch_light(
        &mut self,
        device: &mut dyn GraphicsDevice,
        index: usize,
        light: &Light,
        camera: &Camera,
        settings: &RendererSettings,
    ) {
        let slot = self.slot(device, index).clone();
        let color = if settings.gamma_correction {
            light.final_color_linear()
        } else {
            light.final_color()
        };
        device.set_uniform(slot.color, &UniformValue::Vec3(color));

        let caps = &settings.capabilities;
        match &light.kind {
            LightKind::Directional(dir) => dispatch_directional(device, &slot, light, dir, camera, caps),
            LightKind::Omni(omni) => dispatch_omni(device, &slot, light, omni),
            LightKind::Spot(spot) => dispatch_spot(device, &slot, light, spot, caps),
        }
    }
}

fn dispatch_directional(
    device: &mut dyn GraphicsDevice,
    slot: &LightSlotUniforms,
    light: &Light,
    dir: &DirectionalLight,
    camera: &Camera,
    caps: &DeviceCapabilities,
) {
    let direction = light.direction();
    device.set_uniform(slot.direction, &UniformValue::Vec3(direction));

    if light.shape != LightShape::Punctual {
        // No true position: place the emitter behind the camera's far plane
        let position = camera.position() - direction * camera.far;
        device.set_uniform(slot.position, &UniformValue::Vec3(position));
        dispatch_area_basis(device, slot, light);
    }

    if light.cast_shadows
        && let Some(data) = light.shadow_data(ShadowDataKey::camera(camera.id))
    {
        if let Some(map) = data.shadow_buffer {
            device.set_uniform(slot.shadow_map, &UniformValue::Texture(map));
        }
        device.set_uniform(slot.shadow_matrix, &UniformValue::Mat4(data.shadow_matrix));

        let far = if data.far_clip > 0.0 { data.far_clip } else { 1.0 };
        let bias = legacy_bias(light.shadow.bias / far * 100.0, caps);
        let params = Vec4::new(
            light.shadow.resolution as f32,
            light.shadow.normal_bias,
            bias,
            0.0,
        );
        device.set_uniform(slot.shadow_params, &UniformValue::Vec4(params));
        device.set_uniform(slot.shadow_intensity, &UniformValue::Float(light.shadow.intensity));

        let count = data.cascade_count.min(dir.cascade_count).clamp(1, MAX_CASCADES);
        device.set_uniform(slot.cascade_count, &UniformValue::Int(count as i32));
        device.set_uniform(
            slot.cascade_distances,
            &UniformValue::Vec4(Vec4::from_array(data.cascade_distances)),
        );
        device.set_uniform(
            slot.shadow_matrix_palette,
            &UniformValue::Mat4Array(data.cascade_palette.to_vec()),
        );
    }

    if let Some(cookie) = &light.cookie {
        dispatch_cookie(device, slot, cookie);
    }
}

fn dispatch_omni(
    device: &mut dyn GraphicsDevice,
    slot: &LightSlotUniforms,
    light: &Light,
    omni: &OmniLight,
) {
    device.set_uniform(slot.position, &UniformValue::Vec3(light.position()));
    device.set_uniform(slot.radius, &UniformValue::Float(omni.range));
    device.set_uniform(slot.falloff_mode, &UniformValue::Int(falloff_index(omni.falloff)));
    if light.shape != LightShape::Punctual {
        dispatch_area_basis(device, slot, light);
    }

    if light.cast_shadows
        && let Some(data) = light.shadow_data(ShadowDataKey::face(0))
    {
        if let Some(map) = data.shadow_buffer {
            device.set_uniform(slot.shadow_map, &UniformValue::Texture(map));
        }
        let params = Vec4::new(
            light.shadow.resolution as f32,
            light.shadow.normal_bias,
            light.shadow.bias,
            inverse_range(omni.range),
        );
        device.set_uniform(slot.shadow_params, &UniformValue::Vec4(params));
        device.set_uniform(slot.shadow_intensity, &UniformValue::Float(light.shadow.intensity));
    }

    if let Some(cookie) = &light.cookie {
        // Omni cookies are direction-indexed: the world matrix is the projection
        device.set_uniform(slot.cookie_matrix, &UniformValue::Mat4(*light.world_matrix()));
        dispatch_cookie(device, slot, cookie);
    }
}

fn dispatch_spot(
    device: &mut dyn GraphicsDevice,
    slot: &LightSlotUniforms,
    light: &Light,
    spot: &SpotLight,
    caps: &DeviceCapabilities,
) {
    device.set_uniform(slot.position, &UniformValue::Vec3(light.position()));
    device.set_uniform(slot.direction, &UniformValue::Vec3(light.direction()));
    device.set_uniform(slot.radius, &UniformValue::Float(spot.range));
    device.set_uniform(
        slot.inner_cone_angle,
        &UniformValue::Float(spot.inner_cone.to_radians().cos()),
    );
    device.set_uniform(
        slot.outer_cone_angle,
        &UniformValue::Float(spot.outer_cone.to_radians().cos()),
    );
    device.set_uniform(slot.falloff_mode, &UniformValue::Int(falloff_index(spot.falloff)));
    if light.shape != LightShape::Punctual {
        dispatch_area_basis(device, slot, light);
    }

    let shadow = if light.cast_shadows {
        light.shadow_data(ShadowDataKey::face(0))
    } else {
        None
    };

    if let Some(data) = shadow {
        if let Some(map) = data.shadow_buffer {
            device.set_uniform(slot.shadow_map, &UniformValue::Texture(map));
        }
        device.set_uniform(slot.shadow_matrix, &UniformValue::Mat4(data.shadow_matrix));
        let bias = legacy_bias(light.shadow.bias * SPOT_BIAS_REMAP, caps);
        let params = Vec4::new(
            light.shadow.resolution as f32,
            light.shadow.normal_bias,
            bias,
            inverse_range(spot.range),
        );
        device.set_uniform(slot.shadow_params, &UniformValue::Vec4(params));
        device.set_uniform(slot.shadow_intensity, &UniformValue::Float(light.shadow.intensity));
    }

    if let Some(cookie) = &light.cookie {
        // The shadow matrix slot carries the cookie projection
        if shadow.is_none() {
            let projection = spot_cookie_matrix(light, spot);
            device.set_uniform(slot.shadow_matrix, &UniformValue::Mat4(projection));
        }
        dispatch_cookie(device, slot, cookie);
    }
}

fn dispatch_cookie(device: &mut dyn GraphicsDevice, slot: &LightSlotUniforms, cookie: &Cookie) {
    device.set_uniform(slot.cookie, &UniformValue::Texture(cookie.texture));
    device.set_uniform(slot.cookie_intensity, &UniformValue::Float(cookie.intensity));
    device.set_uniform(slot.cookie_channel, &UniformValue::Vec4(cookie.channel.mask()));
    if let Some(transform) = cookie.transform {
        device.set_uniform(slot.cookie_transform, &UniformValue::Vec4(transform));
        device.set_uniform(slot.cookie_offset, &UniformValue::Vec2(cookie.offset));
    }
}

/// LTC half-extents: the light's local X and Z half axes in world space.
fn dispatch_area_basis(device: &mut dyn GraphicsDevice, slot: &LightSlotUniforms, light: &Light) {
    let world = light.world_matrix();
    let half_width = world.transform_vector3(Vec3::new(-0.5, 0.0, 0.0));
    let half_height = world.transform_vector3(Vec3::new(0.0, 0.0, 0.5));
    device.set_uniform(slot.half_width, &UniformValue::Vec3(half_width));
    device.set_uniform(slot.half_height, &UniformValue::Vec3(half_height));
}

fn legacy_bias(bias: f32, caps: &DeviceCapabilities) -> f32 {
    if !caps.native_shadow_compare && !caps.standard_derivatives {
        bias * LEGACY_DERIVATIVE_BIAS_SCALE
    } else {
        bias
    }
}

fn inverse_range(range: f32) -> f32 {
    if range > 0.0 { 1.0 / range } else { 0.0 }
}

fn falloff_index(falloff: FalloffMode) -> i32 {
    match falloff {
        FalloffMode::Linear => 0,
        FalloffMode::InverseSquared => 1,
    }
}
