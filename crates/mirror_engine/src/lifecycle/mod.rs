//! Session lifecycle: construction, startup, teardown.

mod controller;

pub use controller::WorldSession;
pub(crate) use controller::SessionGuard;
