//! Scene-side data read by the frame core
//!
//! - LayerComposition: ordered layers and cameras, render-action builder
//! - Layer: visible draw-call lists per camera, split light lists
//! - Camera: view, target, clears, hooks
//! - Light: directional / omni / spot with shadow and cookie data
//! - Material: pipeline state, parameters, dirty flags
//! - DrawCall: mesh instance or command

pub mod camera;
pub mod composition;
pub mod draw_call;
pub mod layer;
pub mod light;
pub mod material;
pub mod render_action;

pub use camera::{Camera, CameraHook, CameraId, CameraView};
pub use composition::{LayerComposition, LightClusters};
pub use draw_call::{DrawCall, DrawCommand, MeshInstance};
pub use layer::{GrabKind, Layer, LayerId, SplitLights};
pub use light::{Cookie, Light, LightKey, LightKind, LightShape, LightType, ShadowDataKey};
pub use material::{Material, MaterialKey};
pub use render_action::RenderAction;
