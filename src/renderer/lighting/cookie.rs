//! Cookie projections

use glam::{Mat4, Vec3};

use crate::scene::light::{Light, SpotLight};

/// Maps clip space `[-1, 1]` to texture space `[0, 1]`.
const CLIP_TO_UV: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.5, 0.5, 0.0, 1.0,
]);

/// Projection of a spot cookie: a perspective frustum along the light
/// direction covering the outer cone, remapped to texture coordinates.
///
/// Used when the spot light renders no shadow map whose matrix could carry
/// the cookie projection instead.
#[must_use]
pub fn spot_cookie_matrix(light: &Light, spot: &SpotLight) -> Mat4 {
    let position = light.position();
    let direction = light.direction();
    let up = if direction.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    let view = Mat4::look_at_rh(position, position + direction, up);

    let fov = (spot.outer_cone.to_radians() * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
    let far = spot.range.max(0.02);
    let projection = Mat4::perspective_rh(fov, 1.0, 0.01, far);

    CLIP_TO_UV * projection * view
}
