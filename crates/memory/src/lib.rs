//! Memory for maitre: the short-lived per-user conversation window and the
//! durable profile-store backends.

pub mod context_store;
pub mod file_backend;
pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use context_store::{ContextStore, DEFAULT_MAX_PAIRS, DEFAULT_TTL};
pub use file_backend::FileProfileStore;
pub use in_memory::InMemoryProfileStore;
pub use noop::NoopProfileStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProfileStore;
