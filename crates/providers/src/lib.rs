//! Generation backend access for maitre.
//!
//! [`OpenAiCompatProvider`] implements `maitre_core::Provider` over any
//! OpenAI-compatible `/chat/completions` endpoint. [`call_with_retry`] wraps
//! a single backend call with exponential backoff, a per-attempt timeout and
//! an overall deadline. The router builds providers from configuration.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryAttempt, RetryError, RetryPolicy, call_with_fallback, call_with_retry};
pub use router::{ProviderRouter, build_from_config, model_for};
