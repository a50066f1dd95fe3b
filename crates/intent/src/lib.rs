//! Intent classification for maitre.
//!
//! Two tiers over a static catalog: literal phrase substrings (confidence
//! 0.95) and fuzzy keyword matching that tolerates misspellings. When several
//! intents match, the most urgent one wins. Entities (date, time, party size,
//! location) are extracted per intent with plain patterns and never fail.
//!
//! The classifier holds only configuration, so one instance can be shared
//! across concurrent requests.

pub mod catalog;
pub mod classifier;
pub mod entities;
pub mod fuzzy;

pub use catalog::{CATALOG, IntentRule};
pub use classifier::{Candidate, IntentClassifier, MatchTier, select_best};
pub use entities::EntityExtractor;
pub use fuzzy::similarity;
