//! Scheduled mirror cycle between the main channel and the private backup
//! channel.
//!
//! Three phases run at distinct times of day:
//!
//! 1. [`MirrorJob::pre_check`] scans for the first live post after the
//!    static anchor and records the resume watermark.
//! 2. [`MirrorJob::backup`] copies new posts from the main channel into the
//!    private channel and records the id bounds on both sides.
//! 3. [`MirrorJob::repost`] deletes the backed-up span from the main
//!    channel, copies the backup back in, and wipes the private channel.
//!
//! There is no phase-status marker: each phase re-derives its position from
//! the ranges last saved in the `config` document.

mod backup;
mod precheck;
mod repost;

pub use backup::BackupReport;
pub use precheck::PreCheckOutcome;
pub use repost::RepostReport;

use crate::documents::{ChannelRef, StorageDocument};
use crate::gateway::{GatewayError, MessagingGateway};
use crate::store::{load_or_default, DocumentKey, DocumentStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Timing and limits of the mirror cycle.
#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    /// Pause after every successful copy.
    pub pacing: Duration,
    /// Pause between attempts after an unclassified failure.
    pub other_backoff: Duration,
    /// Attempts per id before an unclassified failure is given up.
    pub max_other_retries: u32,
    /// Consecutive not-found ids that end the backup walk.
    pub skip_threshold: u32,
    /// Private ids `1..=initial_wipe_upto` are wiped before a backup.
    pub initial_wipe_upto: i32,
    /// Pre-check stops probing after this many ids past the anchor.
    pub scan_cap: i32,
    /// Final wipe length when no backup end id is recorded.
    pub final_wipe_span: i32,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            other_backoff: Duration::from_secs(3),
            max_other_retries: 5,
            skip_threshold: 20,
            initial_wipe_upto: 200,
            scan_cap: 999_999,
            final_wipe_span: 200,
        }
    }
}

/// Errors that abort a mirror phase
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A required field of the `storage` document is unset
    #[error("storage document has no `{0}` yet")]
    NotConfigured(&'static str),
    /// Loading or saving a document failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Channel identities needed by every phase.
#[derive(Debug, Clone)]
pub(crate) struct Channels {
    pub main: ChannelRef,
    pub forward: ChannelRef,
    pub static_id: i32,
}

impl Channels {
    pub(crate) fn from_storage(doc: StorageDocument) -> Result<Self, MirrorError> {
        Ok(Self {
            main: doc
                .static_channel
                .ok_or(MirrorError::NotConfigured("static_channel"))?,
            forward: doc
                .forward_channel_id
                .ok_or(MirrorError::NotConfigured("forward_channel_id"))?,
            static_id: doc
                .static_message_id
                .ok_or(MirrorError::NotConfigured("static_message_id"))?,
        })
    }
}

/// How a copy loop treats a not-found response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NotFoundPolicy {
    /// Stop retrying and report the id as missing.
    Skip,
    /// Count it like any other failure.
    Retry,
}

/// Outcome of copying one id with retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyOutcome {
    Copied(i32),
    Missing,
    GaveUp,
}

/// The three-phase mirror job.
pub struct MirrorJob {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn MessagingGateway>,
    policy: MirrorPolicy,
}

impl MirrorJob {
    /// Create a job with the default policy.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            store,
            gateway,
            policy: MirrorPolicy::default(),
        }
    }

    /// Replace the timing policy.
    #[must_use]
    pub fn with_policy(mut self, policy: MirrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current policy.
    #[must_use]
    pub const fn policy(&self) -> &MirrorPolicy {
        &self.policy
    }

    async fn channels(&self) -> Result<Channels, MirrorError> {
        let doc: StorageDocument = load_or_default(self.store.as_ref(), DocumentKey::Storage).await?;
        Channels::from_storage(doc)
    }

    /// Copy one id, sleeping through rate limits and retrying unclassified
    /// failures up to `max_other_retries` times. A success is followed by
    /// the pacing delay.
    async fn copy_with_retry(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
        not_found: NotFoundPolicy,
    ) -> CopyOutcome {
        let mut retries = 0;
        while retries < self.policy.max_other_retries {
            match self.gateway.copy_message(to, from, message_id).await {
                Ok(new_id) => {
                    info!(from = %from, to = %to, message_id, new_id, "Copied message");
                    tokio::time::sleep(self.policy.pacing).await;
                    return CopyOutcome::Copied(new_id);
                }
                Err(GatewayError::RateLimited { retry_after_secs }) => {
                    info!(message_id, retry_after_secs, "Rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs + 1)).await;
                }
                Err(GatewayError::NotFound { .. }) if not_found == NotFoundPolicy::Skip => {
                    warn!(from = %from, message_id, "Skipped, not found");
                    return CopyOutcome::Missing;
                }
                Err(e) => {
                    retries += 1;
                    warn!(
                        from = %from,
                        message_id,
                        retry = retries,
                        error = %e.description(),
                        "Copy error"
                    );
                    tokio::time::sleep(self.policy.other_backoff).await;
                }
            }
        }
        CopyOutcome::GaveUp
    }
}
