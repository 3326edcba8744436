use super::{DocumentKey, DocumentStore, StoreError};
use crate::config::AppSettings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use serde_json::Value;
use tracing::{debug, error, info};

/// R2-backed document store, one object per document.
pub struct R2Store {
    client: Client,
    bucket: String,
}

/// Object key for a document.
#[must_use]
pub fn document_object_key(key: DocumentKey) -> String {
    format!("documents/{}.json", key.as_str())
}

impl R2Store {
    /// Create a new R2 store instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &AppSettings) -> Result<Self, StoreError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
        })
    }

    /// Check connection to R2 storage
    ///
    /// # Errors
    ///
    /// Returns the formatted SDK error if the bucket listing fails.
    pub async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for R2Store {
    async fn load(&self, key: DocumentKey) -> Result<Value, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(document_object_key(key))
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
                    .into_bytes();
                debug!(key = %key, "Document loaded from R2");
                Ok(serde_json::from_slice(&data)?)
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                Err(StoreError::NotFound(key))
            }
            Err(e) => Err(StoreError::S3Get(e.to_string())),
        }
    }

    async fn save(&self, key: DocumentKey, document: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(document)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(document_object_key(key))
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StoreError::S3Put(e.to_string()))?;

        debug!(key = %key, "Document saved to R2");
        Ok(())
    }
}
