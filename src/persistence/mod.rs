// src/persistence/mod.rs
//! Offline inspection of generated implementations
//!
//! Nothing here is needed to create or call proxies; a snapshot is a
//! serializable description of what a [`ProxyScope`](crate::generation::ProxyScope)
//! currently holds.

pub mod snapshot;

// Re-export commonly used types
pub use snapshot::{EntrySummary, ImplementationSummary, ScopeSnapshot};
