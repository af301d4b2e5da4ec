//! Entity handles and the registry that owns them.

mod handle;
mod registry;

pub use handle::{EntityHandle, EntitySnapshot, Pose};
pub use registry::{EntityRegistry, RefreshOutcome};
