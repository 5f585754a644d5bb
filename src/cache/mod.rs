//! Cache store and durable session storage.
//!
//! This module provides:
//! - An in-memory store holding one immutable entry per resource
//! - Signature-keyed freshness for list views
//! - Time-keyed freshness for reference data, mirrored to session storage
//! - Session storage backends (SQLite, no-op)

mod storage;
mod store;
mod traits;

pub use storage::{NoopStorage, SessionStorage, SqliteStorage, StoredRecord};
pub use store::{CacheEntry, CacheStore, Payload};
pub use traits::{sort_by_label, Cacheable};
