//! Shadow Seam & Cascade Helpers
//!
//! The shadow-map renderer is an external collaborator: the frame graph only
//! decides *when* it runs. Its output lands in the light's
//! [`ShadowRenderData`](crate::scene::light::ShadowRenderData) records and is
//! consumed by light dispatch. The cascade layout of directional lights is
//! decided here, from the light's settings and the camera's near plane.

use std::cmp::Ordering;

use glam::FloatExt;
use slotmap::SlotMap;

use crate::renderer::device::GraphicsDevice;
use crate::scene::camera::Camera;
use crate::scene::composition::LightClusters;
use crate::scene::light::{Light, LightKey, LightKind, ShadowDataKey};

/// Maximum cascade count per directional light.
pub const MAX_CASCADES: u32 = 4;

const MIN_SPLIT_NEAR: f32 = 1e-4;

/// Shadow, cookie and cluster rendering.
///
/// Local shadows are written under [`ShadowDataKey::face`]; directional
/// shadows under [`ShadowDataKey::camera`] of the camera passed in.
///
/// [`ShadowDataKey::face`]: crate::scene::light::ShadowDataKey::face
/// [`ShadowDataKey::camera`]: crate::scene::light::ShadowDataKey::camera
pub trait ShadowRenderer {
    /// Renders cookie atlases for the given local lights.
    fn render_cookies(
        &mut self,
        device: &mut dyn GraphicsDevice,
        lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    );

    /// Renders shadow maps of local (omni / spot) lights.
    fn render_local(
        &mut self,
        device: &mut dyn GraphicsDevice,
        lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    );

    /// Renders the cascades of directional lights for one camera.
    fn render_directional(
        &mut self,
        device: &mut dyn GraphicsDevice,
        camera: &Camera,
        lights: &mut SlotMap<LightKey, Light>,
        keys: &[LightKey],
    );

    /// Refreshes cluster data after local shadows were rendered.
    fn update_clusters(
        &mut self,
        device: &mut dyn GraphicsDevice,
        clusters: &mut [LightClusters],
        lights: &SlotMap<LightKey, Light>,
    );
}

/// Far distance of each cascade in view space.
///
/// Each split blends the uniform split towards the logarithmic one by
/// `lambda`. The last used split is pinned to `far` and unused entries stay
/// `0.0`.
#[must_use]
pub fn compute_cascade_splits(
    cascade_count: u32,
    near: f32,
    far: f32,
    lambda: f32,
) -> [f32; MAX_CASCADES as usize] {
    let count = cascade_count.clamp(1, MAX_CASCADES) as usize;
    let near = near.max(MIN_SPLIT_NEAR);
    let ratio = far / near;

    std::array::from_fn(|i| match (i + 1).cmp(&count) {
        Ordering::Greater => 0.0,
        Ordering::Equal => far,
        Ordering::Less => {
            let t = (i + 1) as f32 / count as f32;
            let uniform = near + (far - near) * t;
            uniform.lerp(near * ratio.powf(t), lambda)
        }
    })
}

/// Writes the cascade layout of each directional light into its shadow data
/// for `camera`. Runs before the shadow renderer fills in the maps.
pub fn assign_cascades(camera: &Camera, lights: &mut SlotMap<LightKey, Light>, keys: &[LightKey]) {
    for key in keys {
        let Some(light) = lights.get_mut(*key) else {
            continue;
        };
        let LightKind::Directional(directional) = &light.kind else {
            continue;
        };
        let count = directional.cascade_count.clamp(1, MAX_CASCADES);
        let splits = directional.cascade_splits(camera.near);

        let data = light.shadow_data_mut(ShadowDataKey::camera(camera.id));
        data.cascade_count = count;
        data.cascade_distances = splits;
    }
}
