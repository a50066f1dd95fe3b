//! # maitre pipeline
//!
//! Turns one inbound utterance into one reply. The [`Pipeline`] owns the
//! classifier, the per-user context store, the resilient backend call, the
//! output firewall and the canned fallbacks. Profile updates and telemetry
//! are handed to a bounded [`BackgroundWriter`] so persistence never delays
//! a reply.
//!
//! ```text
//! raw text → sanitize → classify → prompt → backend (retry) → validate
//!                                                  ↓ failure
//!                                               fallback
//! ```

pub mod builder;
pub mod fallback;
pub mod knowledge;
pub mod pipeline;
pub mod profile;
pub mod prompt;
pub mod writer;

pub use builder::{PipelineBuilder, classifier_from_config};
pub use fallback::FallbackCatalog;
pub use knowledge::KeywordKnowledge;
pub use pipeline::{Pipeline, Reply, ReplySource, RespondRequest, SamplingConfig};
pub use profile::{ProfileFacts, ProfileUpdate};
pub use prompt::{PromptBuilder, PromptInput};
pub use writer::{BackgroundWriter, WriteJob};
