//! Shader Variants & Cache
//!
//! A *shader variant* is a compiled program specialised for one
//! `(pass, defines, light configuration)` combination. This module owns:
//!
//! - [`ShaderPass`] / [`ShaderDefines`]: the first two key components
//! - [`VariantKey`]: the full composite key
//! - [`ShaderBackend`]: the compile seam (the shader compiler itself is an
//!   external collaborator)
//! - [`ShaderCache`]: renderer-owned storage of compiled variants plus the
//!   per-material variant maps
//!
//! # Two Sharing Levels
//!
//! Non-static draw calls share variants through the per-material map: every
//! draw call using the same material, defines and light hash resolves to the
//! same [`ShaderId`]. Static draw calls bake a private light list and live in
//! a separate per-material map whose light hash includes the identity of the
//! baked lights, so a static variant is only ever reused by static draws
//! baking the same lights.
//!
//! # Eviction
//!
//! When a material's variant version moves, every variant recorded for it is
//! dropped and its slot is recycled by later compiles. Draw calls still
//! holding an evicted id fail the version check before the id is read.
//!
//! # Failure
//!
//! A failed compile is stored as a failed entry. It is logged once, when the
//! compile happens, and never retried until the material's variants are
//! cleared.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use log::{debug, error};
use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::scene::light::LightSignature;
use crate::scene::material::MaterialKey;

static NEXT_SHADER_CACHE_ID: AtomicU32 = AtomicU32::new(1);

// ─── Pass ────────────────────────────────────────────────────────────────────

/// Shader pass a layer renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShaderPass {
    /// Regular lit forward shading.
    Forward = 0,
    /// Depth (packed into colour on backends without depth copies).
    Depth = 1,
    /// Shadow-map depth rendering.
    Shadow = 2,
}

impl ShaderPass {
    /// Number of passes; sizes the per-draw-call shader slots.
    pub const COUNT: usize = 3;

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Depth => "depth",
            Self::Shadow => "shadow",
        }
    }
}

// ─── Defines ─────────────────────────────────────────────────────────────────

bitflags! {
    /// Per-draw-call feature switches that select a shader variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderDefines: u64 {
        const SKINNING        = 1 << 0;
        const MORPH_POSITION  = 1 << 1;
        const MORPH_NORMAL    = 1 << 2;
        const INSTANCING      = 1 << 3;
        const VERTEX_COLOR    = 1 << 4;
        const LIGHTMAP        = 1 << 5;
        const SCREEN_SPACE    = 1 << 6;
        const CLUSTERED       = 1 << 7;
        const FOG             = 1 << 8;
    }
}

impl Default for ShaderDefines {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Keys & Requests ─────────────────────────────────────────────────────────

/// Composite variant key: `(pass, defines, light hash)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub pass: ShaderPass,
    pub defines: ShaderDefines,
    pub light_hash: u64,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:x}_{:016x}",
            self.pass.name(),
            self.defines.bits(),
            self.light_hash
        )
    }
}

/// Everything a backend needs to generate and compile one variant.
#[derive(Debug, Clone)]
pub struct VariantRequest<'a> {
    pub material_name: &'a str,
    pub key: VariantKey,
    /// Signatures of the lights the variant is specialised for.
    pub lights: &'a [LightSignature],
    /// The variant is compiled for static draw calls.
    pub is_static: bool,
}

/// Opaque backend program handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgram(pub u64);

/// Shader compile seam.
pub trait ShaderBackend {
    /// Generates and compiles the variant described by `request`.
    fn compile_variant(&mut self, request: &VariantRequest<'_>) -> Result<ShaderProgram>;

    /// Signals that a batch of compile requests is complete. Backends with
    /// parallel compilation may start linking here.
    fn end_batch(&mut self) {}
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Index of a compiled (or failed) variant inside a [`ShaderCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(u32);

impl ShaderId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct ShaderEntry {
    program: Option<ShaderProgram>,
    key: VariantKey,
}

#[derive(Default)]
struct MaterialVariants {
    version: u64,
    shared: FxHashMap<VariantKey, ShaderId>,
    statics: FxHashMap<VariantKey, ShaderId>,
}

/// Renderer-owned variant storage.
///
/// Each cache carries a process-unique id so that shader slots cached on a
/// draw call by one renderer are recognised as foreign by another.
pub struct ShaderCache {
    id: u32,
    entries: Vec<Option<ShaderEntry>>,
    free: Vec<u32>,
    materials: FxHashMap<MaterialKey, MaterialVariants>,
    pending_batch: u32,
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SHADER_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            entries: Vec::with_capacity(64),
            free: Vec::new(),
            materials: FxHashMap::default(),
            pending_batch: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of live variants (failed ones included).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: ShaderId) -> Option<&ShaderEntry> {
        self.entries.get(id.index()).and_then(Option::as_ref)
    }

    /// Program of a compiled variant, `None` if the compile failed or the
    /// variant was evicted.
    #[inline]
    #[must_use]
    pub fn program(&self, id: ShaderId) -> Option<ShaderProgram> {
        self.entry(id).and_then(|e| e.program)
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self, id: ShaderId) -> bool {
        self.program(id).is_none()
    }

    #[must_use]
    pub fn variant_key(&self, id: ShaderId) -> Option<VariantKey> {
        self.entry(id).map(|e| e.key)
    }

    /// Variant maps of `material`, evicting everything recorded under an
    /// older version.
    fn variants_mut(&mut self, material: MaterialKey, version: u64) -> &mut MaterialVariants {
        let variants = self.materials.entry(material).or_default();
        if variants.version != version {
            let stale = variants.shared.drain().chain(variants.statics.drain());
            for (_, id) in stale {
                if let Some(slot) = self.entries.get_mut(id.index())
                    && slot.take().is_some()
                {
                    self.free.push(id.0);
                }
            }
            variants.version = version;
        }
        variants
    }

    /// Looks up a material variant.
    ///
    /// `version` is the material's current variant version; variants recorded
    /// under an older version are evicted. Static variants are looked up in
    /// their own map.
    pub fn material_variant(
        &mut self,
        material: MaterialKey,
        version: u64,
        key: &VariantKey,
        is_static: bool,
    ) -> Option<ShaderId> {
        let variants = self.variants_mut(material, version);
        let map = if is_static { &variants.statics } else { &variants.shared };
        map.get(key).copied()
    }

    /// Records a material variant.
    pub fn insert_material_variant(
        &mut self,
        material: MaterialKey,
        version: u64,
        key: VariantKey,
        is_static: bool,
        shader: ShaderId,
    ) {
        let variants = self.variants_mut(material, version);
        let map = if is_static { &mut variants.statics } else { &mut variants.shared };
        map.insert(key, shader);
    }

    /// Number of shared variants recorded for a material.
    #[must_use]
    pub fn material_variant_count(&self, material: MaterialKey) -> usize {
        self.materials.get(&material).map_or(0, |m| m.shared.len())
    }

    /// Number of static variants recorded for a material.
    #[must_use]
    pub fn static_variant_count(&self, material: MaterialKey) -> usize {
        self.materials.get(&material).map_or(0, |m| m.statics.len())
    }

    /// Compiles a new variant into a recycled or fresh slot. Failures are
    /// logged here, once, and stored as a failed entry.
    pub fn compile(
        &mut self,
        backend: &mut dyn ShaderBackend,
        request: &VariantRequest<'_>,
    ) -> ShaderId {
        let program = match backend.compile_variant(request) {
            Ok(program) => {
                debug!(
                    "Compiled shader variant {} for material '{}'{}",
                    request.key,
                    request.material_name,
                    if request.is_static { " (static)" } else { "" }
                );
                Some(program)
            }
            Err(err) => {
                error!("{err}");
                None
            }
        };
        let entry = Some(ShaderEntry {
            program,
            key: request.key,
        });
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot as usize] = entry;
                ShaderId(slot)
            }
            None => {
                self.entries.push(entry);
                ShaderId(self.entries.len() as u32 - 1)
            }
        };
        self.pending_batch += 1;
        id
    }

    /// Ends a compile batch, notifying the backend if anything was compiled
    /// since the previous batch. Returns the number of compiles in the batch.
    pub fn end_batch(&mut self, backend: &mut dyn ShaderBackend) -> u32 {
        let compiled = std::mem::take(&mut self.pending_batch);
        if compiled > 0 {
            backend.end_batch();
        }
        compiled
    }

    /// Drops every variant. Cached slots on draw calls become stale because
    /// their ids no longer resolve.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free.clear();
        self.materials.clear();
        self.id = NEXT_SHADER_CACHE_ID.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FrameError;
    use slotmap::SlotMap;

    struct CountingBackend {
        compiles: u32,
        batches: u32,
        fail: bool,
    }

    impl ShaderBackend for CountingBackend {
        fn compile_variant(&mut self, request: &VariantRequest<'_>) -> Result<ShaderProgram> {
            self.compiles += 1;
            if self.fail {
                return Err(FrameError::ShaderCompile {
                    material: request.material_name.to_string(),
                    pass: request.key.pass.name(),
                    defines: request.key.defines.bits(),
                    reason: "syntax error".to_string(),
                });
            }
            Ok(ShaderProgram(u64::from(self.compiles)))
        }

        fn end_batch(&mut self) {
            self.batches += 1;
        }
    }

    fn key(light_hash: u64) -> VariantKey {
        VariantKey {
            pass: ShaderPass::Forward,
            defines: ShaderDefines::SKINNING,
            light_hash,
        }
    }

    #[test]
    fn test_material_variant_roundtrip() {
        let mut keys: SlotMap<MaterialKey, ()> = SlotMap::with_key();
        let mat = keys.insert(());

        let mut cache = ShaderCache::new();
        let mut backend = CountingBackend {
            compiles: 0,
            batches: 0,
            fail: false,
        };

        assert!(cache.material_variant(mat, 0, &key(1), false).is_none());
        let request = VariantRequest {
            material_name: "mat",
            key: key(1),
            lights: &[],
            is_static: false,
        };
        let id = cache.compile(&mut backend, &request);
        cache.insert_material_variant(mat, 0, key(1), false, id);

        assert_eq!(cache.material_variant(mat, 0, &key(1), false), Some(id));
        assert!(cache.material_variant(mat, 0, &key(1), true).is_none());
        assert!(cache.material_variant(mat, 0, &key(2), false).is_none());
        assert!(!cache.is_failed(id));
    }

    #[test]
    fn test_version_bump_drops_variants() {
        let mut keys: SlotMap<MaterialKey, ()> = SlotMap::with_key();
        let mat = keys.insert(());
        let mut cache = ShaderCache::new();
        let mut backend = CountingBackend {
            compiles: 0,
            batches: 0,
            fail: false,
        };
        let request = VariantRequest {
            material_name: "mat",
            key: key(1),
            lights: &[],
            is_static: false,
        };
        let id = cache.compile(&mut backend, &request);
        cache.insert_material_variant(mat, 0, key(1), false, id);

        assert!(cache.material_variant(mat, 1, &key(1), false).is_none());
        assert_eq!(cache.material_variant_count(mat), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicted_slot_is_reused() {
        let mut keys: SlotMap<MaterialKey, ()> = SlotMap::with_key();
        let mat = keys.insert(());
        let mut cache = ShaderCache::new();
        let mut backend = CountingBackend {
            compiles: 0,
            batches: 0,
            fail: false,
        };
        let request = VariantRequest {
            material_name: "mat",
            key: key(1),
            lights: &[],
            is_static: true,
        };
        let first = cache.compile(&mut backend, &request);
        cache.insert_material_variant(mat, 0, key(1), true, first);
        assert_eq!(cache.static_variant_count(mat), 1);

        assert!(cache.material_variant(mat, 1, &key(1), true).is_none());
        assert_eq!(cache.program(first), None);
        let second = cache.compile(&mut backend, &request);
        cache.insert_material_variant(mat, 1, key(1), true, second);

        assert_eq!(second, first);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.program(second), Some(ShaderProgram(2)));
    }

    #[test]
    fn test_failed_compile_is_recorded() {
        let mut cache = ShaderCache::new();
        let mut backend = CountingBackend {
            compiles: 0,
            batches: 0,
            fail: true,
        };
        let request = VariantRequest {
            material_name: "broken",
            key: key(0),
            lights: &[],
            is_static: false,
        };
        let id = cache.compile(&mut backend, &request);
        assert!(cache.is_failed(id));
        assert_eq!(cache.program(id), None);
    }

    #[test]
    fn test_end_batch_only_after_compiles() {
        let mut cache = ShaderCache::new();
        let mut backend = CountingBackend {
            compiles: 0,
            batches: 0,
            fail: false,
        };
        assert_eq!(cache.end_batch(&mut backend), 0);
        assert_eq!(backend.batches, 0);

        let request = VariantRequest {
            material_name: "mat",
            key: key(0),
            lights: &[],
            is_static: false,
        };
        cache.compile(&mut backend, &request);
        assert_eq!(cache.end_batch(&mut backend), 1);
        assert_eq!(backend.batches, 1);
    }

    #[test]
    fn test_variant_key_display() {
        let text = key(0xAB).to_string();
        assert!(text.starts_with("forward_1_"));
        assert!(text.ends_with("ab"));
    }

    #[test]
    fn test_distinct_cache_ids() {
        assert_ne!(ShaderCache::new().id(), ShaderCache::new().id());
    }
}
