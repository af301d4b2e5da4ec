//! The multi-cadence refresh scheduler.
//!
//! Five independently-cadenced loops bound to one session pull work from
//! the registry, batch their remote reads into rounds and write results
//! back onto entity handles. All five share one cancellation signal and are
//! joined together on teardown.

mod loops;
mod scheduler;

pub use scheduler::{RawBlock, WorldState};
pub(crate) use scheduler::{spawn_loops, SyncContext};
