//! Renderer Settings & Backend Capabilities
//!
//! This module defines the configuration consumed by
//! [`ForwardRenderer`](crate::renderer::ForwardRenderer).
//!
//! Two groups of knobs live here:
//!
//! - **Frame topology**: clustered vs. per-light forward lighting, which
//!   decides whether shadow/cookie work is shared across cameras.
//! - **Backend capabilities**: what the graphics backend can do natively,
//!   which decides *how* certain passes are realised (grab copy vs. re-render,
//!   shadow bias conventions).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_frame::renderer::{RendererSettings, DeviceCapabilities};
//!
//! // Clustered lighting on a fully featured backend
//! let settings = RendererSettings {
//!     clustered_lighting: true,
//!     ..Default::default()
//! };
//!
//! // Capability-limited backend: grabs are re-rendered
//! let settings = RendererSettings {
//!     capabilities: DeviceCapabilities::limited(),
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{FrameError, Result};

// ---------------------------------------------------------------------------
// DeviceCapabilities
// ---------------------------------------------------------------------------

/// Feature switches reported by the graphics backend.
///
/// | Field                   | Effect when `false`                                  |
/// |-------------------------|------------------------------------------------------|
/// | `grab_copy`             | Colour/depth grabs re-render the scene               |
/// | `native_shadow_compare` | Shadow bias uses the legacy sign/scale convention    |
/// | `standard_derivatives`  | Together with the above, enables the ×(−100) remap   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCapabilities {
    /// The backend can copy the current colour/depth buffer into a texture.
    pub grab_copy: bool,
    /// Hardware depth-compare sampling is available for shadow maps.
    pub native_shadow_compare: bool,
    /// The standard-derivatives shader extension is available.
    pub standard_derivatives: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            grab_copy: true,
            native_shadow_compare: true,
            standard_derivatives: true,
        }
    }
}

impl DeviceCapabilities {
    /// Capabilities of a minimal backend: no grab copies, no compare
    /// sampling, no derivatives.
    #[must_use]
    pub fn limited() -> Self {
        Self {
            grab_copy: false,
            native_shadow_compare: false,
            standard_derivatives: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration for the frame core.
///
/// | Field                 | Description                                  | Default  |
/// |-----------------------|----------------------------------------------|----------|
/// | `clustered_lighting`  | Shared local lighting via light clusters      | `false`  |
/// | `gamma_correction`    | Dispatch linear light colours                 | `true`   |
/// | `flip_faces`          | Global cull-mode flip                         | `false`  |
/// | `max_lights_per_pass` | Light slots available to a forward draw       | `8`      |
/// | `capabilities`        | Backend feature switches                      | full     |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Assign local lights to screen-space clusters instead of binding them
    /// per draw call.
    pub clustered_lighting: bool,

    /// When `true`, light colours are dispatched in linear space (the shader
    /// performs the gamma conversion on output).
    pub gamma_correction: bool,

    /// Global cull flip, XOR-ed with camera and target flips.
    pub flip_faces: bool,

    /// Number of light uniform slots a single non-clustered draw can use.
    ///
    /// Lights beyond this bound are not dispatched.
    pub max_lights_per_pass: u32,

    /// Backend feature switches.
    pub capabilities: DeviceCapabilities,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clustered_lighting: false,
            gamma_correction: true,
            flip_faces: false,
            max_lights_per_pass: 8,
            capabilities: DeviceCapabilities::default(),
        }
    }
}

impl RendererSettings {
    /// Checks the settings for values the frame core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_lights_per_pass == 0 {
            return Err(FrameError::InvalidSettings(
                "max_lights_per_pass must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
