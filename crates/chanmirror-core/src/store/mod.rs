//! Document store layer
//!
//! Whole-document JSON persistence keyed by [`DocumentKey`]. Backends are
//! interchangeable: a local directory, the JSONBin document API, or an
//! R2/S3 bucket.

mod file;
mod jsonbin;
mod r2;

pub use file::FileStore;
pub use jsonbin::JsonBinStore;
pub use r2::R2Store;

use crate::config::{AppSettings, StorageBackend};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Names of the persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    /// Channel identities and static anchor.
    Storage,
    /// Mirror bookkeeping ranges.
    Config,
    /// Attach entries.
    Attach,
    /// Banner image record.
    Image,
    /// Private image channel record.
    Channel,
}

impl DocumentKey {
    /// Every document key.
    pub const ALL: [Self; 5] = [
        Self::Storage,
        Self::Config,
        Self::Attach,
        Self::Image,
        Self::Channel,
    ];

    /// Stable key name, used for file and object names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Attach => "attach",
            Self::Image => "image",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document has been saved under this key yet
    #[error("document `{0}` not found")]
    NotFound(DocumentKey),
    /// HTTP transport failure talking to the document API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Document API answered with a non-success status
    #[error("document API returned {status}: {body}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },
    /// Error retrieving object from S3
    #[error("S3 get error: {0}")]
    S3Get(String),
    /// Error putting object into S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Interface for document store backends
///
/// `save` replaces the whole document. There is no merging and no
/// concurrency control between writers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the latest version of a document.
    ///
    /// Fails with [`StoreError::NotFound`] if it was never saved.
    async fn load(&self, key: DocumentKey) -> Result<Value, StoreError>;
    /// Replace a document.
    async fn save(&self, key: DocumentKey, document: &Value) -> Result<(), StoreError>;
}

/// Load and decode a document, substituting the default shape when it does
/// not exist yet (or is JSON `null`).
///
/// # Errors
///
/// Returns backend errors other than `NotFound`, and decode errors.
pub async fn load_or_default<T>(store: &dyn DocumentStore, key: DocumentKey) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match store.load(key).await {
        Ok(Value::Null) | Err(StoreError::NotFound(_)) => Ok(T::default()),
        Ok(value) => Ok(serde_json::from_value(value)?),
        Err(e) => Err(e),
    }
}

/// Encode and save a document.
///
/// # Errors
///
/// Returns encode or backend errors.
pub async fn save_document<T>(
    store: &dyn DocumentStore,
    key: DocumentKey,
    document: &T,
) -> Result<(), StoreError>
where
    T: Serialize + Sync,
{
    let value = serde_json::to_value(document)?;
    store.save(key, &value).await
}

/// Build the backend selected in settings.
///
/// # Errors
///
/// Returns `StoreError::Config` when the selected backend lacks settings.
pub async fn open_store(settings: &AppSettings) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match settings.storage_backend {
        StorageBackend::File => {
            info!(dir = %settings.data_dir, "Using file document store.");
            Arc::new(FileStore::new(&settings.data_dir).await?)
        }
        StorageBackend::Jsonbin => {
            info!(base_url = %settings.jsonbin_base_url, "Using JSONBin document store.");
            Arc::new(JsonBinStore::from_settings(settings)?)
        }
        StorageBackend::R2 => {
            info!("Using R2 document store.");
            let store = R2Store::new(settings).await?;
            if store.check_connection().await.is_err() {
                error!("R2 Storage connection check returned error.");
            }
            Arc::new(store)
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::StorageDocument;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_or_default_on_missing() -> Result<(), StoreError> {
        let mut store = MockDocumentStore::new();
        store
            .expect_load()
            .returning(|key| Err(StoreError::NotFound(key)));

        let doc: StorageDocument = load_or_default(&store, DocumentKey::Storage).await?;
        assert_eq!(doc, StorageDocument::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_on_null() -> Result<(), StoreError> {
        let mut store = MockDocumentStore::new();
        store.expect_load().returning(|_| Ok(Value::Null));

        let doc: StorageDocument = load_or_default(&store, DocumentKey::Storage).await?;
        assert_eq!(doc, StorageDocument::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_propagates_backend_errors() {
        let mut store = MockDocumentStore::new();
        store
            .expect_load()
            .returning(|_| Err(StoreError::Config("down".into())));

        let res: Result<StorageDocument, _> = load_or_default(&store, DocumentKey::Storage).await;
        assert!(matches!(res, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_save_document_sends_whole_value() -> Result<(), StoreError> {
        let mut store = MockDocumentStore::new();
        store
            .expect_save()
            .withf(|key, doc| {
                *key == DocumentKey::Storage && *doc == json!({ "static_message_id": 7 })
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let doc = StorageDocument {
            static_message_id: Some(7),
            ..StorageDocument::default()
        };
        save_document(&store, DocumentKey::Storage, &doc).await
    }

    #[test]
    fn test_key_names() {
        let names: Vec<_> = DocumentKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["storage", "config", "attach", "image", "channel"]);
    }
}
