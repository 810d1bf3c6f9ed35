//! Uniform Handle Caches
//!
//! Resolving a uniform name to a backend handle is expensive, so names are
//! resolved once and the handles reused across frames. Only values change
//! per draw.

use rustc_hash::FxHashMap;

use crate::renderer::device::{GraphicsDevice, UniformId, UniformValue};
use crate::scene::material::{Material, MaterialKey};

// Per-view uniforms
pub const VIEW_MATRIX: &str = "matrix_view";
pub const PROJECTION_MATRIX: &str = "matrix_projection";
pub const VIEW_PROJECTION_MATRIX: &str = "matrix_viewProjection";
pub const VIEW_POSITION: &str = "view_position";

// Per-instance uniforms
pub const MODEL_MATRIX: &str = "matrix_model";
pub const NORMAL_MATRIX: &str = "matrix_normal";

/// Name → handle lookup, filled lazily.
#[derive(Debug, Default)]
pub struct UniformNameCache {
    ids: FxHashMap<String, UniformId>,
}

impl UniformNameCache {
    pub fn resolve(&mut self, device: &mut dyn GraphicsDevice, name: &str) -> UniformId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = device.resolve_uniform(name);
        self.ids.insert(name.to_string(), id);
        id
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
struct MaterialUniforms {
    version: u64,
    list: Vec<(UniformId, UniformValue)>,
}

/// Resolved `(handle, value)` lists of material parameters.
///
/// Synced when a material becomes current during preparation, so execution
/// only walks a flat list. Each cache remembers the parameter version it last
/// resolved; the material itself is never written.
#[derive(Debug, Default)]
pub struct MaterialUniformCache {
    entries: FxHashMap<MaterialKey, MaterialUniforms>,
}

impl MaterialUniformCache {
    /// Re-resolves the parameters of `material` if they changed since the
    /// last sync. Parameters are ordered by name so uploads are
    /// deterministic. Returns `true` when the list was rebuilt.
    pub fn sync(
        &mut self,
        key: MaterialKey,
        material: &Material,
        names: &mut UniformNameCache,
        device: &mut dyn GraphicsDevice,
    ) -> bool {
        let version = material.parameter_version();
        if let Some(entry) = self.entries.get(&key)
            && entry.version == version
        {
            return false;
        }

        let mut params: Vec<(&str, &UniformValue)> = material.parameters().collect();
        params.sort_unstable_by_key(|(name, _)| *name);

        let entry = self.entries.entry(key).or_default();
        entry.version = version;
        entry.list.clear();
        entry.list.extend(
            params
                .into_iter()
                .map(|(name, value)| (names.resolve(device, name), value.clone())),
        );
        true
    }

    #[must_use]
    pub fn get(&self, key: MaterialKey) -> &[(UniformId, UniformValue)] {
        self.entries
            .get(&key)
            .map(|entry| entry.list.as_slice())
            .unwrap_or_default()
    }

    /// Material value currently bound to `id`, if the material sets it.
    #[must_use]
    pub fn value_of(&self, key: MaterialKey, id: UniformId) -> Option<&UniformValue> {
        self.get(key).iter().find(|(u, _)| *u == id).map(|(_, v)| v)
    }
}
