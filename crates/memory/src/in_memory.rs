//! In-memory profile store — for tests and ephemeral runs.

use async_trait::async_trait;
use maitre_core::error::ProfileError;
use maitre_core::profile::{ProfileField, ProfileStore};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Profiles held in a process-local map; lost on exit.
#[derive(Default)]
pub struct InMemoryProfileStore {
    fields: RwLock<HashMap<String, HashMap<ProfileField, serde_json::Value>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored field of one user.
    pub fn fields_of(&self, user_id: &str) -> HashMap<ProfileField, serde_json::Value> {
        self.fields.read().get(user_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(
        &self,
        user_id: &str,
        field: ProfileField,
    ) -> Result<Option<serde_json::Value>, ProfileError> {
        Ok(self
            .fields
            .read()
            .get(user_id)
            .and_then(|profile| profile.get(&field))
            .cloned())
    }

    async fn put(
        &self,
        user_id: &str,
        field: ProfileField,
        value: serde_json::Value,
    ) -> Result<(), ProfileError> {
        self.fields
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(field, value);
        Ok(())
    }
}
