//! # Mirror Core
//!
//! Shared foundation for the Worldmirror engine: the types, contracts and
//! session state that every component of the synchronization pipeline builds
//! on.
//!
//! ## Key Modules
//!
//! - [`types`] - Core identifiers, 3D math and skeletal attachment points
//! - [`rounds`] - The batched remote-read round contract and its
//!   scatter/gather executor
//! - [`traits`] - Seams for the external collaborators (world source,
//!   line-of-sight, session cleanup)
//! - [`session`] - Session phase tracking and cancellation
//! - [`error`] - Remote-read error taxonomy
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent remote addresses and session IDs
//!   from being confused with plain integers
//! - **Explicit Ownership**: No global state; every piece of shared state is
//!   session-scoped and passed by handle
//! - **Fail Visible**: Remote reads report per-slot failure rather than
//!   fabricating zeroed data

pub mod error;
pub mod rounds;
pub mod session;
pub mod traits;
pub mod types;
pub mod utils;

pub use error::ReadError;
pub use rounds::{BatchExecutor, ReadRequest, ReadRound, RemoteMemory, RoundResults};
pub use session::{SessionPhase, SessionState};
pub use traits::{LineOfSight, SessionCleanup, WorldSource};
pub use types::{BoneId, RemoteAddr, SessionId, Vec3};
pub use utils::current_timestamp_ms;
