//! Frame Graph
//!
//! Provides:
//! - FrameGraph / FramePass: the ordered pass list of one frame
//! - MainPass: a coalesced run of render actions on one target
//! - ShadowRenderer: the shadow/cookie/cluster seam

pub mod builder;
pub mod pass;
pub mod shadow;

pub use builder::{FrameGraph, FramePass};
pub use pass::{GRAB_SENTINEL_CLEAR, MainPass};
pub use shadow::{MAX_CASCADES, ShadowRenderer, assign_cascades, compute_cascade_splits};
