//! Error Types
//!
//! This module defines the error types used throughout the frame core.
//!
//! # Overview
//!
//! Almost nothing inside a frame is allowed to fail loudly: a shader variant
//! that does not compile degrades a single draw call, and a stale render
//! action is skipped. [`FrameError`] therefore mostly travels *across* the
//! seams (shader backends hand it back from `compile_variant`, settings
//! validation returns it at renderer construction) and is converted into a
//! local decision by the core.
//!
//! ```rust,ignore
//! use myth_frame::errors::{FrameError, Result};
//!
//! fn compile() -> Result<ShaderProgram> {
//!     Err(FrameError::ShaderCompile { /* ... */ })
//! }
//! ```

use thiserror::Error;

/// The main error type for the frame core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader variant failed to build.
    ///
    /// Carries enough context to diagnose the failing combination.
    #[error("Shader compile failed for material '{material}' (pass: {pass}, defines: {defines:#x}): {reason}")]
    ShaderCompile {
        /// Name of the material the variant was requested for
        material: String,
        /// Shader pass name
        pass: &'static str,
        /// Raw shader-define bits
        defines: u64,
        /// Backend-provided reason
        reason: String,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A handle did not resolve to a live resource.
    #[error("Unknown {kind} handle: {handle}")]
    UnknownHandle {
        /// Resource kind (material, light, ...)
        kind: &'static str,
        /// Debug rendering of the handle
        handle: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Renderer settings failed validation.
    #[error("Invalid renderer settings: {0}")]
    InvalidSettings(String),
}

/// Alias for `Result<T, FrameError>`.
pub type Result<T> = std::result::Result<T, FrameError>;
