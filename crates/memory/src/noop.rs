//! No-op profile store — disables profile persistence entirely.

use async_trait::async_trait;
use maitre_core::error::ProfileError;
use maitre_core::profile::{ProfileField, ProfileStore};

/// A profile store that remembers nothing.
pub struct NoopProfileStore;

#[async_trait]
impl ProfileStore for NoopProfileStore {
    fn name(&self) -> &str { "none" }

    async fn get(
        &self,
        _user_id: &str,
        _field: ProfileField,
    ) -> Result<Option<serde_json::Value>, ProfileError> {
        Ok(None)
    }

    async fn put(
        &self,
        _user_id: &str,
        _field: ProfileField,
        _value: serde_json::Value,
    ) -> Result<(), ProfileError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_forgets_everything() {
        let store = NoopProfileStore;
        store
            .put("u1", ProfileField::Name, serde_json::json!("Анна"))
            .await
            .unwrap();
        assert!(store.get("u1", ProfileField::Name).await.unwrap().is_none());
        assert_eq!(store.name(), "none");
    }
}
