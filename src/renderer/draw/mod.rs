//! Two-phase draw submission: preparation resolves shaders and annotates the
//! list, execution applies state and issues draws.

pub mod execute;
pub mod prepare;
pub mod tracked;

pub use execute::{ExecuteContext, ExecuteParams, execute};
pub use prepare::{PrepareContext, PrepareParams, PreparedCallList, prepare};
pub use tracked::TrackedDevice;
