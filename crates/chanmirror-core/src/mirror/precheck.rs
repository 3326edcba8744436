use super::{Channels, MirrorError, MirrorJob};
use crate::documents::{ConfigDocument, IdRange};
use crate::gateway::GatewayError;
use crate::store::{load_or_default, save_document, DocumentKey};
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of the pre-check scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheckOutcome {
    /// First live post after the anchor; the watermark was saved.
    Found(i32),
    /// The scan cap was reached without finding a post.
    Exhausted,
    /// An unclassified failure stopped the scan; nothing was saved.
    Aborted,
}

impl MirrorJob {
    /// Find the first live post after the static anchor.
    ///
    /// Scans ids `static_message_id + 1, + 2, …` by forwarding each into
    /// the private channel. Not-found ids are skipped, rate limits are
    /// waited out, and the first success stores
    /// `deleted_main_range = {static_message_id, found - 1}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage document is incomplete or a document
    /// cannot be loaded or saved.
    pub async fn pre_check(&self) -> Result<PreCheckOutcome, MirrorError> {
        let channels = self.channels().await?;
        let static_id = channels.static_id;
        let limit = static_id.saturating_add(self.policy.scan_cap);

        info!(static_id, "Checking next message id before backup");

        let mut next_id = static_id.saturating_add(1);
        while next_id < limit {
            match self.try_forward(&channels, next_id).await {
                Ok(_) => {
                    info!(message_id = next_id, "Found next message");
                    let mut config: ConfigDocument =
                        load_or_default(self.store.as_ref(), DocumentKey::Config).await?;
                    config.deleted_main_range = Some(IdRange::new(static_id, next_id - 1));
                    save_document(self.store.as_ref(), DocumentKey::Config, &config).await?;
                    return Ok(PreCheckOutcome::Found(next_id));
                }
                Err(GatewayError::NotFound { .. }) => next_id += 1,
                Err(GatewayError::RateLimited { retry_after_secs }) => {
                    info!(retry_after_secs, "Rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs + 1)).await;
                }
                Err(GatewayError::Other { description }) => {
                    error!(message_id = next_id, error = %description, "Error while checking");
                    return Ok(PreCheckOutcome::Aborted);
                }
            }
        }

        warn!("No next message found after static; backup starts at static + 1");
        Ok(PreCheckOutcome::Exhausted)
    }

    async fn try_forward(&self, channels: &Channels, message_id: i32) -> Result<i32, GatewayError> {
        self.gateway.check_chat(&channels.forward).await?;
        self.gateway
            .forward_message(&channels.forward, &channels.main, message_id)
            .await
    }
}
