use chanmirror_core::documents::{ConfigDocument, IdRange, StorageDocument};
use chanmirror_core::store::{
    load_or_default, save_document, DocumentKey, DocumentStore, FileStore, StoreError,
};
use chanmirror_core::testing::MemoryStore;
use serde_json::json;

async fn exercise(store: &dyn DocumentStore) -> Result<(), StoreError> {
    assert!(matches!(
        store.load(DocumentKey::Config).await,
        Err(StoreError::NotFound(DocumentKey::Config))
    ));
    let config: ConfigDocument = load_or_default(store, DocumentKey::Config).await?;
    assert_eq!(config, ConfigDocument::default());

    store
        .save(
            DocumentKey::Config,
            &json!({ "last_run": "2024-01-01", "extra": true }),
        )
        .await?;
    let config = ConfigDocument {
        main_channel_range: Some(IdRange::new(101, 105)),
        ..ConfigDocument::default()
    };
    save_document(store, DocumentKey::Config, &config).await?;

    // whole-document replace, no merge with the previous save
    assert_eq!(
        store.load(DocumentKey::Config).await?,
        json!({ "main_channel_range": { "start_id": 101, "end_id": 105 } })
    );

    let storage: StorageDocument = load_or_default(store, DocumentKey::Storage).await?;
    assert_eq!(storage, StorageDocument::default());
    Ok(())
}

#[tokio::test]
async fn test_file_store_contract() -> Result<(), StoreError> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::new(dir.path()).await?;
    exercise(&store).await
}

#[tokio::test]
async fn test_memory_store_contract() -> Result<(), StoreError> {
    exercise(&MemoryStore::new()).await
}
