//! Utility functions shared across the engine.

/// Returns the current Unix timestamp in milliseconds.
///
/// All consumer-facing snapshots stamp themselves with this function so
/// readers can reason about staleness consistently.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
