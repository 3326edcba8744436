//! Admin-bot command logic.
//!
//! Each mutation loads the `storage` document, changes one field group and
//! saves the whole document back.

#![allow(clippy::non_std_lazy_statics)]

use crate::documents::{ChannelRef, StorageDocument};
use crate::gateway::{GatewayError, MessagingGateway};
use crate::store::{load_or_default, save_document, DocumentKey, DocumentStore, StoreError};
use lazy_regex::lazy_regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

static RE_POST_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https://t\.me/([\w_]+)/(\d+)");

/// Parse a public post link `https://t.me/<handle>/<id>`.
///
/// # Examples
///
/// ```
/// use chanmirror_core::admin::parse_static_link;
/// use chanmirror_core::documents::ChannelRef;
///
/// assert_eq!(
///     parse_static_link("https://t.me/mychannel/42"),
///     Some((ChannelRef::handle("mychannel"), 42))
/// );
/// assert_eq!(parse_static_link("https://example.com/x"), None);
/// ```
#[must_use]
pub fn parse_static_link(link: &str) -> Option<(ChannelRef, i32)> {
    let caps = RE_POST_LINK.captures(link)?;
    let message_id = caps.get(2)?.as_str().parse().ok()?;
    Some((ChannelRef::handle(caps.get(1)?.as_str()), message_id))
}

/// Admin command failures
#[derive(Debug, Error)]
pub enum AdminError {
    /// No link argument was given
    #[error("no link given")]
    MissingLink,
    /// The argument is not a post link
    #[error("invalid link format")]
    InvalidLink,
    /// A required `storage` field is unset
    #[error("storage document has no `{0}` yet")]
    NotConfigured(&'static str),
    /// Document store failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Platform failure
    #[error("{}", .0.description())]
    Gateway(#[from] GatewayError),
}

/// Static anchor, forward channel and copy test.
pub struct AdminService {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl AdminService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { store, gateway }
    }

    async fn update_storage(
        &self,
        change: impl FnOnce(&mut StorageDocument) + Send,
    ) -> Result<StorageDocument, AdminError> {
        let mut doc: StorageDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Storage).await?;
        change(&mut doc);
        save_document(self.store.as_ref(), DocumentKey::Storage, &doc).await?;
        Ok(doc)
    }

    /// Use a replied-to message as the static anchor.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or saved.
    pub async fn set_static_from_reply(
        &self,
        chat: ChannelRef,
        message_id: i32,
    ) -> Result<(), AdminError> {
        info!(chat = %chat, message_id, "Static message set from reply");
        self.update_storage(|doc| {
            doc.static_channel = Some(chat);
            doc.static_message_id = Some(message_id);
        })
        .await?;
        Ok(())
    }

    /// Use the first argument as a post link for the static anchor.
    ///
    /// Nothing is saved when the link is missing or malformed.
    ///
    /// # Errors
    ///
    /// Returns `MissingLink`, `InvalidLink` or a store error.
    pub async fn set_static_from_link(&self, args: &str) -> Result<(ChannelRef, i32), AdminError> {
        let link = args.split_whitespace().next().ok_or(AdminError::MissingLink)?;
        let (chat, message_id) = parse_static_link(link).ok_or(AdminError::InvalidLink)?;
        info!(chat = %chat, message_id, "Static message set from link");
        let anchor = chat.clone();
        self.update_storage(move |doc| {
            doc.static_channel = Some(anchor);
            doc.static_message_id = Some(message_id);
        })
        .await?;
        Ok((chat, message_id))
    }

    /// Save the backup channel id.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or saved.
    pub async fn set_forward_channel(&self, chat_id: i64) -> Result<(), AdminError> {
        info!(chat_id, "Forward channel saved");
        self.update_storage(|doc| doc.forward_channel_id = Some(ChannelRef::Id(chat_id)))
            .await?;
        Ok(())
    }

    /// Copy the static anchor into `into` once, without retries.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before an anchor is set, or the copy failure.
    pub async fn test_copy(&self, into: &ChannelRef) -> Result<i32, AdminError> {
        let doc: StorageDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Storage).await?;
        let channel = doc
            .static_channel
            .ok_or(AdminError::NotConfigured("static_channel"))?;
        let message_id = doc
            .static_message_id
            .ok_or(AdminError::NotConfigured("static_message_id"))?;
        Ok(self.gateway.copy_message(into, &channel, message_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChannels, MemoryStore};
    use serde_json::json;

    fn service() -> (Arc<MemoryStore>, Arc<FakeChannels>, AdminService) {
        let store = Arc::new(MemoryStore::new());
        let channels = Arc::new(FakeChannels::new());
        let service = AdminService::new(store.clone(), channels.clone());
        (store, channels, service)
    }

    #[tokio::test]
    async fn test_static_from_link() {
        let (store, _, service) = service();
        let parsed = service
            .set_static_from_link("https://t.me/mychannel/42")
            .await
            .expect("link is saved");
        assert_eq!(parsed, (ChannelRef::handle("mychannel"), 42));
        assert_eq!(
            store.get(DocumentKey::Storage),
            Some(json!({ "static_channel": "@mychannel", "static_message_id": 42 }))
        );
    }

    #[tokio::test]
    async fn test_malformed_link_changes_nothing() {
        let (store, _, service) = service();
        store.put(DocumentKey::Storage, json!({ "forward_channel_id": -100 }));

        let err = service.set_static_from_link("https://example.com/x").await;
        assert!(matches!(err, Err(AdminError::InvalidLink)));
        let err = service.set_static_from_link("   ").await;
        assert!(matches!(err, Err(AdminError::MissingLink)));

        assert_eq!(store.save_count(), 0);
        assert_eq!(
            store.get(DocumentKey::Storage),
            Some(json!({ "forward_channel_id": -100 }))
        );
    }

    #[tokio::test]
    async fn test_mutations_keep_other_fields() {
        let (store, _, service) = service();
        service.set_forward_channel(-1_009).await.expect("forward channel is saved");
        service
            .set_static_from_reply(ChannelRef::Id(-1_001), 7)
            .await
            .expect("reply is saved");
        assert_eq!(
            store.get(DocumentKey::Storage),
            Some(json!({
                "static_channel": -1_001,
                "static_message_id": 7,
                "forward_channel_id": -1_009
            }))
        );
    }

    #[tokio::test]
    async fn test_copy_requires_anchor_and_reports_failure() {
        let (_, channels, service) = service();
        let me = ChannelRef::Id(55);
        assert!(matches!(
            service.test_copy(&me).await,
            Err(AdminError::NotConfigured("static_channel"))
        ));

        service.set_static_from_link("https://t.me/main/3").await.expect("link is saved");
        let err = service.test_copy(&me).await.expect_err("test copy without a forward channel fails");
        assert_eq!(err.to_string(), "Bad Request: message to copy not found");

        channels.seed(&ChannelRef::handle("main"), [3]);
        assert!(service.test_copy(&me).await.is_ok());
        assert_eq!(channels.ids(&me).len(), 1);
    }
}
