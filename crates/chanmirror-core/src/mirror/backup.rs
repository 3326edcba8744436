use super::{CopyOutcome, MirrorError, MirrorJob, NotFoundPolicy};
use crate::documents::{ConfigDocument, IdRange};
use crate::store::{load_or_default, save_document, DocumentKey};
use chrono::Utc;
use tracing::{debug, info};

/// What a backup run copied, positionally paired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Source ids in the main channel.
    pub main_ids: Vec<i32>,
    /// Created ids in the private channel.
    pub backup_ids: Vec<i32>,
}

impl MirrorJob {
    /// Copy new main-channel posts into the private channel.
    ///
    /// Wipes the private channel's first ids, then walks forward from
    /// `max(static + 1, deleted_main_range.end_id + 1)` until
    /// `skip_threshold` consecutive ids are not found. Only the first and
    /// last id of each side are persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage document is incomplete or a document
    /// cannot be loaded or saved.
    pub async fn backup(&self) -> Result<BackupReport, MirrorError> {
        info!("Backup started");
        let channels = self.channels().await?;
        let mut config: ConfigDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Config).await?;

        for message_id in 1..=self.policy.initial_wipe_upto {
            if let Err(e) = self
                .gateway
                .delete_message(&channels.forward, message_id)
                .await
            {
                debug!(message_id, error = %e.description(), "Wipe skipped");
            }
        }

        let watermark = config.deleted_main_range.map_or(0, |r| r.end_id);
        let mut message_id = channels
            .static_id
            .saturating_add(1)
            .max(watermark.saturating_add(1));
        let mut report = BackupReport::default();
        let mut skipped = 0;

        while skipped < self.policy.skip_threshold {
            match self
                .copy_with_retry(
                    &channels.forward,
                    &channels.main,
                    message_id,
                    NotFoundPolicy::Skip,
                )
                .await
            {
                CopyOutcome::Copied(new_id) => {
                    report.main_ids.push(message_id);
                    report.backup_ids.push(new_id);
                    skipped = 0;
                }
                CopyOutcome::Missing => skipped += 1,
                CopyOutcome::GaveUp => {}
            }
            message_id = message_id.saturating_add(1);
        }

        config.last_run = Some(Utc::now().date_naive().format("%Y-%m-%d").to_string());
        config.main_channel_range = Some(IdRange::bounds_of(&report.main_ids));
        config.backup_channel_range = Some(IdRange::bounds_of(&report.backup_ids));
        save_document(self.store.as_ref(), DocumentKey::Config, &config).await?;

        info!(copied = report.main_ids.len(), "Backup complete");
        Ok(report)
    }
}
