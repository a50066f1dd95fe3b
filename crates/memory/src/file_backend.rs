//! File-based profile store — one JSON document on disk.
//!
//! Layout: `{ "<user_id>": { "<field>": <value>, ... }, ... }`. The document
//! is loaded on creation and rewritten on every `put`, so a crash loses at
//! most the write in flight. Human-inspectable and dependency-free.
//!
//! Storage location: `~/.maitre/profiles.json`

use async_trait::async_trait;
use maitre_core::error::ProfileError;
use maitre_core::profile::{ProfileField, ProfileStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Document = Map<String, Value>;

/// A file-backed profile store.
pub struct FileProfileStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl FileProfileStore {
    /// Open the store at `path`. A missing file starts empty; an unreadable
    /// or corrupted one is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = Self::load_from_disk(&path).await;
        debug!(path = %path.display(), users = doc.len(), "File profile store loaded");
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_from_disk(path: &Path) -> Document {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(_) => return Document::new(),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) => {
                warn!(path = %path.display(), "Profile file is not a JSON object, starting empty");
                Document::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted profile file");
                Document::new()
            }
        }
    }

    async fn flush(&self, doc: &Document) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProfileError::Storage(format!("Failed to create profile directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| ProfileError::Storage(format!("Failed to serialize profiles: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| ProfileError::Storage(format!("Failed to write profile file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ProfileError::Storage(format!("Failed to replace profile file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, user_id: &str, field: ProfileField) -> Result<Option<Value>, ProfileError> {
        let doc = self.doc.lock().await;
        Ok(doc
            .get(user_id)
            .and_then(|profile| profile.get(field.as_str()))
            .cloned())
    }

    async fn put(
        &self,
        user_id: &str,
        field: ProfileField,
        value: Value,
    ) -> Result<(), ProfileError> {
        let mut doc = self.doc.lock().await;
        let profile = doc
            .entry(user_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(fields) = profile else {
            return Err(ProfileError::InvalidValue {
                field: user_id.to_string(),
                reason: "stored profile is not an object".into(),
            });
        };
        fields.insert(field.as_str().to_string(), value);
        self.flush(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profiles.json");

        let store = FileProfileStore::open(&path).await;
        store.put("u1", ProfileField::Name, json!("Анна")).await.unwrap();
        store
            .put("u1", ProfileField::FavoriteItems, json!(["тирамису"]))
            .await
            .unwrap();
        drop(store);

        let reopened = FileProfileStore::open(&path).await;
        assert_eq!(
            reopened.get("u1", ProfileField::Name).await.unwrap(),
            Some(json!("Анна"))
        );
        assert_eq!(
            reopened.get("u1", ProfileField::FavoriteItems).await.unwrap(),
            Some(json!(["тирамису"]))
        );
        assert!(reopened.get("u2", ProfileField::Name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupted_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileProfileStore::open(&path).await;
        assert!(store.get("u1", ProfileField::Name).await.unwrap().is_none());
        store.put("u1", ProfileField::VisitCount, json!(1)).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["u1"]["visitCount"], 1);
    }
}
