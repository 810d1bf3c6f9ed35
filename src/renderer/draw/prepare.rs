//! Draw-Call Preparation
//!
//! First of the two submission phases. Walks a layer's visible list once,
//! resolves a shader variant for every mesh instance and records which
//! entries start a new material or a new light configuration.
//!
//! # Material Transitions
//!
//! An entry is treated as a new material when the material differs from the
//! previous entry's, when the material is the same but the shader defines
//! differ, or when either entry is static. On a transition the material's
//! resolved uniforms are re-synced if its parameter version moved, and a
//! pending blend change is reported to the scene.
//!
//! # Variant Resolution
//!
//! A draw call's cached shader for the pass is reused while the cache, the
//! defines, the light hash and the material's variant version are unchanged.
//! Otherwise the material's variant for the key is looked up and compiled on
//! a miss. Static draws use a separate map and a light hash that includes
//! their baked lights, so they never share with dynamic draws or with static
//! draws baking other lights.

use slotmap::{Key, SlotMap};
use xxhash_rust::xxh3::Xxh3;

use crate::renderer::device::GraphicsDevice;
use crate::renderer::shader::{
    ShaderBackend, ShaderCache, ShaderDefines, ShaderId, ShaderPass, VariantKey, VariantRequest,
};
use crate::renderer::stats::FrameStats;
use crate::renderer::uniforms::{MaterialUniformCache, UniformNameCache};
use crate::scene::draw_call::{CachedShader, DrawCall, MeshInstance};
use crate::scene::layer::SplitLights;
use crate::scene::light::{Light, LightKey, LightSignature, light_hash};
use crate::scene::material::{Material, MaterialKey};

/// Output of the preparation phase: three parallel sequences.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreparedCallList {
    /// Indices into the prepared draw-call slice.
    pub calls: Vec<usize>,
    pub is_new_material: Vec<bool>,
    pub light_changed: Vec<bool>,
}

impl PreparedCallList {
    pub fn clear(&mut self) {
        self.calls.clear();
        self.is_new_material.clear();
        self.light_changed.clear();
    }

    fn push(&mut self, call: usize, is_new_material: bool, light_changed: bool) {
        self.calls.push(call);
        self.is_new_material.push(is_new_material);
        self.light_changed.push(light_changed);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Borrowed renderer state used while preparing.
pub struct PrepareContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub shader_backend: &'a mut dyn ShaderBackend,
    pub shaders: &'a mut ShaderCache,
    pub materials: &'a mut SlotMap<MaterialKey, Material>,
    pub material_uniforms: &'a mut MaterialUniformCache,
    pub uniform_names: &'a mut UniformNameCache,
    pub lights: &'a SlotMap<LightKey, Light>,
    pub stats: &'a mut FrameStats,
    /// Set when a material with a changed blend state becomes current.
    pub blend_changed: &'a mut bool,
}

/// What is being prepared.
pub struct PrepareParams<'a> {
    pub pass: ShaderPass,
    /// Camera culling mask; `0` disables the filter.
    pub culling_mask: u32,
    /// Lights of the layer.
    pub layer_lights: &'a SplitLights,
    pub clustered: bool,
}

struct ResolveInputs<'a> {
    pass: ShaderPass,
    clustered: bool,
    layer_lights: &'a SplitLights,
    layer_signatures: &'a [LightSignature],
    layer_hash: u64,
}

/// Resolves shaders for `draw_calls` and refills `out`.
pub fn prepare(
    ctx: &mut PrepareContext<'_>,
    draw_calls: &mut [DrawCall],
    params: &PrepareParams<'_>,
    out: &mut PreparedCallList,
) {
    out.clear();

    let layer_signatures = params.layer_lights.signatures(ctx.lights);
    let inputs = ResolveInputs {
        pass: params.pass,
        clustered: params.clustered,
        layer_lights: params.layer_lights,
        layer_hash: light_hash(&layer_signatures, params.clustered),
        layer_signatures: &layer_signatures,
    };

    let mut prev_material: Option<MaterialKey> = None;
    let mut prev_defines: Option<ShaderDefines> = None;
    let mut prev_light_mask: u32 = 0;
    let mut prev_static = false;

    for (index, draw_call) in draw_calls.iter_mut().enumerate() {
        let mask = draw_call.mask();
        if params.culling_mask != 0 && mask != 0 && params.culling_mask & mask == 0 {
            continue;
        }

        let mesh = match draw_call {
            DrawCall::Command(_) => {
                out.push(index, false, false);
                continue;
            }
            DrawCall::Mesh(mesh) => mesh,
        };

        let material_key = mesh.material;
        let force_new =
            prev_defines != Some(mesh.defines) || mesh.is_static || prev_static;
        if force_new {
            prev_material = None;
        }
        let is_new_material = prev_material != Some(material_key);

        if is_new_material {
            ctx.stats.material_switches += 1;
            if let Some(material) = ctx.materials.get_mut(material_key) {
                ctx.material_uniforms.sync(
                    material_key,
                    material,
                    &mut *ctx.uniform_names,
                    &mut *ctx.device,
                );
                if material.take_blend_dirty() {
                    *ctx.blend_changed = true;
                }
            }
        }

        resolve_shader(ctx, mesh, &inputs);

        let light_changed = prev_material.is_none() || mesh.mask != prev_light_mask;
        out.push(index, is_new_material, light_changed);

        prev_material = Some(material_key);
        prev_defines = Some(mesh.defines);
        prev_light_mask = mesh.mask;
        prev_static = mesh.is_static;
    }

    ctx.stats.shader_compiles += ctx.shaders.end_batch(&mut *ctx.shader_backend);
}

fn resolve_shader(ctx: &mut PrepareContext<'_>, mesh: &mut MeshInstance, inputs: &ResolveInputs<'_>) {
    let Some(material) = ctx.materials.get(mesh.material) else {
        return;
    };
    let version = material.variant_version();

    let static_signatures;
    let (signatures, hash) = if mesh.is_static {
        static_signatures = static_light_signatures(mesh, inputs.layer_lights, ctx.lights);
        let hash = static_light_hash(&static_signatures, &mesh.static_lights, inputs.clustered);
        (static_signatures.as_slice(), hash)
    } else {
        (inputs.layer_signatures, inputs.layer_hash)
    };

    if let Some(cached) = mesh.cached_shader(inputs.pass)
        && cached.cache_id == ctx.shaders.id()
        && cached.defines == mesh.defines
        && cached.light_hash == hash
        && cached.material_version == version
    {
        return;
    }

    let key = VariantKey {
        pass: inputs.pass,
        defines: mesh.defines,
        light_hash: hash,
    };
    let request = VariantRequest {
        material_name: &material.name,
        key,
        lights: signatures,
        is_static: mesh.is_static,
    };

    let known = ctx
        .shaders
        .material_variant(mesh.material, version, &key, mesh.is_static);
    let shader: ShaderId = match known {
        Some(id) => id,
        None => {
            let id = ctx.shaders.compile(&mut *ctx.shader_backend, &request);
            ctx.shaders
                .insert_material_variant(mesh.material, version, key, mesh.is_static, id);
            id
        }
    };

    mesh.set_cached_shader(
        inputs.pass,
        CachedShader {
            shader,
            cache_id: ctx.shaders.id(),
            defines: mesh.defines,
            light_hash: hash,
            material_version: version,
        },
    );
}

/// Layer directional lights followed by the instance's baked lights.
fn static_light_signatures(
    mesh: &MeshInstance,
    layer_lights: &SplitLights,
    lights: &SlotMap<LightKey, Light>,
) -> Vec<LightSignature> {
    layer_lights
        .directional
        .iter()
        .chain(mesh.static_lights.iter())
        .filter_map(|key| lights.get(*key))
        .filter(|light| light.enabled)
        .map(Light::signature)
        .collect()
}

/// Light hash of a static draw call. Mixes in the identity of the baked
/// lights so two instances baking different lights never collide.
fn static_light_hash(signatures: &[LightSignature], baked: &[LightKey], clustered: bool) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&light_hash(signatures, clustered).to_le_bytes());
    for key in baked {
        hasher.update(&key.data().as_ffi().to_le_bytes());
    }
    hasher.digest()
}
