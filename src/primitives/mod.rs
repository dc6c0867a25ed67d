//! Low-level primitives shared by the registry and the read paths.

/// Concurrency primitives and synchronization.
///
/// Fair reader/writer coordination guarding the descriptor registry.
pub mod concurrency;
