//! File-backed issuer key registry.
//!
//! Keys live in a single JSON array under the catalog root directory:
//!
//! ```text
//! <root>/PUBKEYS.json
//! [
//!   {"issuer": "blackbook", "public_key": "...", "expiry": 1798675200}
//! ]
//! ```
//!
//! Every save rewrites the whole file. The new content is written to a
//! sibling temporary file and renamed over the old one, so readers never
//! observe a half-written registry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fail::fail_point;

use crate::{
    error::{StorageError, StorageResult},
    issuer_key::IssuerKey,
    store::IssuerKeyStore,
};

/// File name of the persisted registry inside the catalog root.
pub const PUBKEYS_FILENAME: &str = "PUBKEYS.json";

/// [`IssuerKeyStore`] persisting to a JSON file.
#[derive(Debug, Clone)]
pub struct FileIssuerKeyStore {
    path: PathBuf,
}

impl FileIssuerKeyStore {
    /// Creates a store for an explicit file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store for `<root>/PUBKEYS.json`.
    #[must_use]
    pub fn in_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(PUBKEYS_FILENAME))
    }

    /// Path of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl IssuerKeyStore for FileIssuerKeyStore {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_keys(&self) -> StorageResult<Vec<IssuerKey>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no issuer key registry on disk, starting empty");
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(StorageError::internal_with_source(
                    format!("failed to read {}", self.path.display()),
                    e,
                ));
            },
        };

        let keys: Vec<IssuerKey> = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::serialization_with_source(
                format!("failed to parse {}", self.path.display()),
                e,
            )
        })?;

        tracing::debug!(count = keys.len(), "loaded issuer keys");
        Ok(keys)
    }

    #[tracing::instrument(skip(self, keys), fields(path = %self.path.display(), count = keys.len()))]
    async fn save_keys(&self, keys: &[IssuerKey]) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(keys).map_err(|e| {
            StorageError::serialization_with_source("failed to encode issuer keys", e)
        })?;

        fail_point!("issuer-keys-before-write", |_| {
            Err(StorageError::internal("injected failure before registry write"))
        });

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::internal_with_source(
                    format!("failed to create {}", parent.display()),
                    e,
                )
            })?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await.map_err(|e| {
            StorageError::internal_with_source(format!("failed to write {}", temp.display()), e)
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            StorageError::internal_with_source(
                format!("failed to replace {}", self.path.display()),
                e,
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn make_key(issuer: &str) -> IssuerKey {
        IssuerKey::builder()
            .issuer(issuer)
            .public_key("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")
            .expiry(Utc::now() + Duration::days(30))
            .build()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileIssuerKeyStore::in_root(dir.path());

        assert!(store.load_keys().await.expect("load").is_empty());
        assert!(!store.path().exists(), "loading must not create the file");
    }

    #[tokio::test]
    async fn test_round_trip_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = vec![make_key("blackbook"), make_key("lcacommons")];

        FileIssuerKeyStore::in_root(dir.path()).save_keys(&keys).await.expect("save");

        // A fresh store over the same root simulates a restarted process.
        let reloaded = FileIssuerKeyStore::in_root(dir.path()).load_keys().await.expect("load");
        assert_eq!(reloaded, keys);
    }

    #[tokio::test]
    async fn test_save_rewrites_whole_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileIssuerKeyStore::in_root(dir.path());

        store.save_keys(&[make_key("a"), make_key("b")]).await.expect("first save");
        store.save_keys(&[make_key("c")]).await.expect("second save");

        let keys = store.load_keys().await.expect("load");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].issuer, "c");
        assert!(!store.temp_path().exists(), "temporary file must be renamed away");
    }

    #[tokio::test]
    async fn test_creates_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileIssuerKeyStore::in_root(dir.path().join("nested/catalog"));

        store.save_keys(&[make_key("a")]).await.expect("save");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_reads_legacy_numeric_expiry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PUBKEYS_FILENAME);
        std::fs::write(
            &path,
            r#"[{"issuer": "blackbook", "public_key": "abc", "expiry": 1893456000.0}]"#,
        )
        .expect("write fixture");

        let keys = FileIssuerKeyStore::new(&path).load_keys().await.expect("load");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].expiry.timestamp(), 1_893_456_000);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PUBKEYS_FILENAME);
        std::fs::write(&path, b"{not json").expect("write fixture");

        let result = FileIssuerKeyStore::new(&path).load_keys().await;
        assert!(matches!(result, Err(StorageError::Serialization { .. })), "got {result:?}");
    }
}
