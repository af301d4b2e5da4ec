//! # Mirror Engine - Real-Time Entity Synchronization
//!
//! A real-time entity-synchronization and visibility-scheduling engine that
//! mirrors the live state of a remote process's in-memory world into a
//! local read model, at sub-10ms latencies, while minimizing remote
//! round-trips and tolerating transient read failures without corrupting
//! state.
//!
//! ## Architecture Overview
//!
//! * **Entity Registry** - Concurrent map from stable remote address to
//!   owned entity handle; allocate/refresh/re-allocate-on-fault/remove
//!   lifecycle
//! * **Refresh Scheduler** - Five independently-cadenced loops driving
//!   distinct work categories until the session is disposed or faults
//! * **Visibility Priority Engine** - Tier classification, interval
//!   gating, batched geometric checks, result propagation with skeletal
//!   inheritance
//! * **World Lifecycle Controller** - Owns the fault/cancellation
//!   boundary; detects session end; guarantees no writes after disposal
//!
//! ## Data Flow
//!
//! Scheduler loops pull the live-entity set from the registry, pass
//! candidates to the visibility engine, which emits one batched read round
//! per pass; the round's callback writes results onto entity handles, and
//! consumers read whatever is currently stored.
//!
//! ## Error Handling
//!
//! Transient remote-read faults are caught per-pass, logged and retried on
//! the next iteration. Structural faults (registry count out of range,
//! liveness identity mismatch) and unhandled loop errors end the entire
//! session: partial corruption of the remote layout cannot be safely
//! resolved in place, so teardown converts unknown failures into a clean
//! ended state.

// Re-export core types and functions for easy access
pub use config::MirrorConfig;
pub use entity::{EntityHandle, EntityRegistry, EntitySnapshot};
pub use error::EngineError;
pub use lifecycle::WorldSession;
pub use sync::{RawBlock, WorldState};
pub use visibility::{AimSource, PassStats, PriorityTier, VisRecord, VisibilityEngine};

// Public module declarations
pub mod config;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod visibility;

// Internal modules (not part of public API)
mod sync;
mod tests;
