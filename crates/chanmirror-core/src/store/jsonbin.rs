use super::{DocumentKey, DocumentStore, StoreError};
use crate::config::AppSettings;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const ACCESS_KEY_HEADER: &str = "X-Access-Key";

/// JSONBin.io backend: each document lives in its own bin.
pub struct JsonBinStore {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    bins: HashMap<DocumentKey, String>,
}

#[derive(Deserialize)]
struct LatestRecord {
    record: Value,
}

impl JsonBinStore {
    /// Create a store over an explicit key → bin id mapping.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        bins: HashMap<DocumentKey, String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_key: access_key.into(),
            bins,
        }
    }

    /// Create a store from the `jsonbin_*` and `*_bin` settings.
    ///
    /// Documents without a configured bin behave as never saved.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if the access key is missing.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, StoreError> {
        let access_key = settings
            .jsonbin_key
            .as_ref()
            .ok_or_else(|| StoreError::Config("JSONBIN_KEY is missing".into()))?;

        let bins: HashMap<DocumentKey, String> = [
            (DocumentKey::Storage, &settings.storage_bin),
            (DocumentKey::Config, &settings.config_bin),
            (DocumentKey::Attach, &settings.attach_bin),
            (DocumentKey::Image, &settings.image_bin),
            (DocumentKey::Channel, &settings.channel_bin),
        ]
        .into_iter()
        .filter_map(|(key, bin)| bin.clone().map(|bin| (key, bin)))
        .collect();

        for key in DocumentKey::ALL {
            if !bins.contains_key(&key) {
                warn!(key = %key, "No JSONBin bin configured for document.");
            }
        }

        Ok(Self::new(
            settings.jsonbin_base_url.clone(),
            access_key.clone(),
            bins,
        ))
    }

    fn bin_for(&self, key: DocumentKey) -> Result<&str, StoreError> {
        self.bins
            .get(&key)
            .map(String::as_str)
            .ok_or(StoreError::NotFound(key))
    }
}

async fn remote_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Remote { status, body }
}

#[async_trait]
impl DocumentStore for JsonBinStore {
    async fn load(&self, key: DocumentKey) -> Result<Value, StoreError> {
        let bin = self.bin_for(key)?;
        let response = self
            .client
            .get(format!("{}/b/{bin}/latest", self.base_url))
            .header(ACCESS_KEY_HEADER, &self.access_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key));
        }
        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }

        let latest: LatestRecord = response.json().await?;
        debug!(key = %key, bin = %bin, "Document loaded from JSONBin");
        Ok(latest.record)
    }

    async fn save(&self, key: DocumentKey, document: &Value) -> Result<(), StoreError> {
        let bin = self.bin_for(key).map_err(|_| {
            StoreError::Config(format!("no JSONBin bin configured for `{key}`"))
        })?;
        let response = self
            .client
            .put(format!("{}/b/{bin}", self.base_url))
            .header(ACCESS_KEY_HEADER, &self.access_key)
            .json(document)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }
        debug!(key = %key, bin = %bin, "Document saved to JSONBin");
        Ok(())
    }
}
