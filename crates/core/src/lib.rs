//! # maitre core
//!
//! Domain types, traits, and error definitions for the maitre conversational
//! middleware. This crate has **no runtime dependencies** — it defines the
//! vocabulary every other crate implements against.
//!
//! ## Design Philosophy
//!
//! External collaborators (generation backend, knowledge provider, profile
//! store) are defined as traits here and injected into the pipeline. This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod intent;
pub mod knowledge;
pub mod message;
pub mod profile;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FailureKind, KnowledgeError, ProfileError, ProviderError, Result};
pub use intent::{ChannelKind, Entities, IntentKind, IntentResult};
pub use knowledge::{KnowledgeProvider, NoKnowledge};
pub use message::{ChatMessage, Role, Turn, TurnRole};
pub use profile::{ProfileField, ProfileStore};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
