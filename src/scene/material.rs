//! Materials
//!
//! The frame core reads a material's GPU pipeline state and its uniform
//! parameters, and writes two flags:
//!
//! - `blend_dirty`: blend state changed; the owning scene is notified so
//!   that transparency sorting can be redone.
//!
//! Parameter changes bump a version counter instead of setting a flag. A
//! material can be shared by several renderers, and each one refreshes its
//! resolved uniform list when the version it last saw is stale.
//!
//! The shader variant cache itself is *not* stored here; it lives in the
//! renderer's [`ShaderCache`](crate::renderer::shader::ShaderCache), keyed by
//! [`MaterialKey`] and invalidated by [`Material::clear_variants`].

use rustc_hash::FxHashMap;
use slotmap::new_key_type;

use crate::renderer::device::{DepthState, StencilParams, UniformValue};

new_key_type! {
    /// Handle of a material in a [`LayerComposition`](crate::scene::LayerComposition).
    pub struct MaterialKey;
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub depth: DepthState,
    pub alpha_to_coverage: bool,
    pub depth_bias: Option<wgpu::DepthBiasState>,
    pub stencil_front: Option<StencilParams>,
    pub stencil_back: Option<StencilParams>,
    pub cull: Option<wgpu::Face>,

    blend: Option<wgpu::BlendState>,
    blend_dirty: bool,
    parameters: FxHashMap<String, UniformValue>,
    parameter_version: u64,
    variant_version: u64,
}

impl Material {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depth: DepthState::default(),
            alpha_to_coverage: false,
            depth_bias: None,
            stencil_front: None,
            stencil_back: None,
            cull: Some(wgpu::Face::Back),
            blend: None,
            blend_dirty: false,
            parameters: FxHashMap::default(),
            parameter_version: 0,
            variant_version: 0,
        }
    }

    // === Blend ===

    #[inline]
    #[must_use]
    pub fn blend_state(&self) -> Option<wgpu::BlendState> {
        self.blend
    }

    pub fn set_blend_state(&mut self, blend: Option<wgpu::BlendState>) {
        if self.blend != blend {
            self.blend = blend;
            self.blend_dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn is_blend_dirty(&self) -> bool {
        self.blend_dirty
    }

    /// Returns and clears the blend-dirty flag.
    pub fn take_blend_dirty(&mut self) -> bool {
        std::mem::take(&mut self.blend_dirty)
    }

    // === Parameters ===

    pub fn set_parameter(&mut self, name: &str, value: UniformValue) {
        self.parameters.insert(name.to_string(), value);
        self.mark_dirty();
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&UniformValue> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Forces every renderer to re-resolve the parameters.
    pub fn mark_dirty(&mut self) {
        self.parameter_version = self.parameter_version.wrapping_add(1);
    }

    /// Bumped on every parameter change.
    #[inline]
    #[must_use]
    pub fn parameter_version(&self) -> u64 {
        self.parameter_version
    }

    // === Variants ===

    /// Invalidates every shader variant compiled for this material.
    pub fn clear_variants(&mut self) {
        self.variant_version = self.variant_version.wrapping_add(1);
    }

    #[inline]
    #[must_use]
    pub fn variant_version(&self) -> u64 {
        self.variant_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_dirty_only_on_change() {
        let mut mat = Material::new("glass");
        mat.set_blend_state(None);
        assert!(!mat.is_blend_dirty());

        mat.set_blend_state(Some(wgpu::BlendState::ALPHA_BLENDING));
        assert!(mat.take_blend_dirty());
        assert!(!mat.is_blend_dirty());
    }

    #[test]
    fn test_parameters_bump_version() {
        let mut mat = Material::new("m");
        let v = mat.parameter_version();
        mat.set_parameter("material_opacity", UniformValue::Float(0.5));
        assert_ne!(mat.parameter_version(), v);
        assert_eq!(mat.parameter("material_opacity"), Some(&UniformValue::Float(0.5)));
    }

    #[test]
    fn test_clear_variants_bumps_version() {
        let mut mat = Material::new("m");
        let v = mat.variant_version();
        mat.clear_variants();
        assert_ne!(mat.variant_version(), v);
    }
}
