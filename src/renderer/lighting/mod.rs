//! Light uniform dispatch and cookie projections.

pub mod cookie;
pub mod dispatch;

pub use cookie::spot_cookie_matrix;
pub use dispatch::{LEGACY_DERIVATIVE_BIAS_SCALE, LightDispatcher, LightSlotUniforms, SPOT_BIAS_REMAP};
