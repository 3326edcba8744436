use super::{CopyOutcome, MirrorError, MirrorJob, NotFoundPolicy};
use crate::documents::ConfigDocument;
use crate::gateway::DELETE_NOT_FOUND;
use crate::store::{load_or_default, save_document, DocumentKey};
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// What a repost run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepostReport {
    /// Main-channel ids a delete was attempted for.
    pub deleted_main: Vec<i32>,
    /// Private ids copied back, paired with the new main-channel ids.
    pub reposted: Vec<(i32, i32)>,
    /// Private ids whose copy was given up.
    pub failed: Vec<i32>,
    /// Private ids covered by the final wipe before it stopped.
    pub wiped: Vec<i32>,
}

impl MirrorJob {
    /// Replace the backed-up span of the main channel with the private copy.
    ///
    /// Order is fixed: delete the main range and save it as the new
    /// watermark, copy the backup range back, then wipe the private channel.
    /// Nothing is touched before the first backup has recorded a range.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage document is incomplete or a document
    /// cannot be loaded or saved.
    pub async fn repost(&self) -> Result<RepostReport, MirrorError> {
        info!("Repost started");
        let channels = self.channels().await?;
        let mut config: ConfigDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Config).await?;
        let Some(main_range) = config.main_channel_range else {
            warn!("No backup recorded yet, repost skipped");
            return Ok(RepostReport::default());
        };
        let backup_range = config.backup_channel_range.unwrap_or_default();
        let mut report = RepostReport::default();

        for message_id in main_range.ids() {
            if let Err(e) = self.gateway.delete_message(&channels.main, message_id).await {
                debug!(message_id, error = %e.description(), "Delete skipped");
            }
            report.deleted_main.push(message_id);
        }

        config.deleted_main_range = Some(main_range);
        save_document(self.store.as_ref(), DocumentKey::Config, &config).await?;

        for message_id in backup_range.ids() {
            match self
                .copy_with_retry(
                    &channels.main,
                    &channels.forward,
                    message_id,
                    NotFoundPolicy::Retry,
                )
                .await
            {
                CopyOutcome::Copied(new_id) => report.reposted.push((message_id, new_id)),
                CopyOutcome::Missing | CopyOutcome::GaveUp => {
                    warn!(message_id, "Repost given up");
                    report.failed.push(message_id);
                }
            }
        }
        info!(reposted = report.reposted.len(), "Repost complete");

        let config: ConfigDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Config).await?;
        let span = self.final_wipe_span(&config);
        info!(from = span.start(), to = span.end(), "Final wipe of backup channel");
        for message_id in span {
            report.wiped.push(message_id);
            if let Err(e) = self
                .gateway
                .delete_message(&channels.forward, message_id)
                .await
            {
                if e.description().contains(DELETE_NOT_FOUND) {
                    break;
                }
            }
        }

        Ok(report)
    }

    /// `[max(start - 1, 1), end]`, with `start` defaulting to 2 and `end`
    /// to `from + final_wipe_span` when unset.
    fn final_wipe_span(&self, config: &ConfigDocument) -> RangeInclusive<i32> {
        let range = config.backup_channel_range.unwrap_or_default();
        let start = if range.start_id == 0 { 2 } else { range.start_id };
        let from = (start - 1).max(1);
        let to = if range.end_id == 0 {
            from + self.policy.final_wipe_span
        } else {
            range.end_id
        };
        from..=to
    }
}
