//! In-memory stand-ins for the document store and the chat platform.
//!
//! Used by the unit and integration tests of every crate; nothing here talks
//! to the network.

use crate::documents::ChannelRef;
use crate::gateway::{classify, CommandSpec, GatewayError, MessagingGateway, SentPhoto};
use crate::store::{DocumentKey, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Document store kept in a map, counting saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<DocumentKey, Value>>,
    saves: Mutex<Vec<DocumentKey>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a save.
    pub fn put(&self, key: DocumentKey, document: Value) {
        lock(&self.documents).insert(key, document);
    }

    /// Current document, if any.
    #[must_use]
    pub fn get(&self, key: DocumentKey) -> Option<Value> {
        lock(&self.documents).get(&key).cloned()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        lock(&self.saves).len()
    }

    /// Keys passed to `save`, in order.
    #[must_use]
    pub fn saves(&self) -> Vec<DocumentKey> {
        lock(&self.saves).clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, key: DocumentKey) -> Result<Value, StoreError> {
        self.get(key).ok_or(StoreError::NotFound(key))
    }

    async fn save(&self, key: DocumentKey, document: &Value) -> Result<(), StoreError> {
        lock(&self.saves).push(key);
        self.put(key, document.clone());
        Ok(())
    }
}

/// Gateway operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    /// `copy_message`, keyed by source chat
    Copy,
    /// `forward_message`, keyed by source chat
    Forward,
    /// `delete_message`
    Delete,
}

/// A recorded gateway call. Failed calls are recorded too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    /// `copy_message`
    Copy {
        /// Target chat
        to: ChannelRef,
        /// Source chat
        from: ChannelRef,
        /// Source id
        message_id: i32,
    },
    /// `forward_message`
    Forward {
        /// Target chat
        to: ChannelRef,
        /// Source chat
        from: ChannelRef,
        /// Source id
        message_id: i32,
    },
    /// `delete_message`
    Delete {
        /// Chat
        chat: ChannelRef,
        /// Deleted id
        message_id: i32,
    },
    /// `send_text`
    SendText {
        /// Chat
        chat: ChannelRef,
        /// Body
        text: String,
    },
    /// `send_photo`
    SendPhoto {
        /// Chat
        chat: ChannelRef,
        /// Photo sent
        file_id: String,
        /// Caption
        caption: String,
    },
    /// `check_chat`
    CheckChat {
        /// Chat
        chat: ChannelRef,
    },
    /// `set_commands`, command names only
    SetCommands(Vec<String>),
}

#[derive(Debug, Default)]
struct FakeState {
    messages: HashMap<ChannelRef, BTreeSet<i32>>,
    next_ids: HashMap<ChannelRef, i32>,
    failures: HashMap<(FakeOp, ChannelRef, i32), VecDeque<GatewayError>>,
    calls: Vec<FakeCall>,
}

impl FakeState {
    fn allocate(&mut self, chat: &ChannelRef) -> i32 {
        let next = self.next_ids.entry(chat.clone()).or_insert(1);
        let id = *next;
        *next += 1;
        self.messages.entry(chat.clone()).or_default().insert(id);
        id
    }

    fn scripted(&mut self, op: FakeOp, chat: &ChannelRef, message_id: i32) -> Option<GatewayError> {
        self.failures
            .get_mut(&(op, chat.clone(), message_id))
            .and_then(VecDeque::pop_front)
    }

    fn exists(&self, chat: &ChannelRef, message_id: i32) -> bool {
        self.messages
            .get(chat)
            .is_some_and(|ids| ids.contains(&message_id))
    }
}

/// Fake chat platform: channels are sets of live message ids, new messages
/// get the next id of their chat, missing ids answer with the platform's
/// not-found descriptions.
#[derive(Debug, Default)]
pub struct FakeChannels {
    state: Mutex<FakeState>,
}

impl FakeChannels {
    /// No channels, no messages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add live messages to a chat. Later sends get higher ids.
    pub fn seed(&self, chat: &ChannelRef, ids: impl IntoIterator<Item = i32>) {
        let mut state = lock(&self.state);
        let existing = state.messages.entry(chat.clone()).or_default();
        existing.extend(ids);
        let floor = existing.last().map_or(1, |last| last.saturating_add(1));
        let next = state.next_ids.entry(chat.clone()).or_insert(floor);
        *next = (*next).max(floor);
    }

    /// Id the next message created in `chat` will get.
    pub fn set_next_id(&self, chat: &ChannelRef, id: i32) {
        lock(&self.state).next_ids.insert(chat.clone(), id);
    }

    /// Make the next calls of `op` on `(chat, message_id)` fail, in order.
    pub fn fail(
        &self,
        op: FakeOp,
        chat: &ChannelRef,
        message_id: i32,
        errors: impl IntoIterator<Item = GatewayError>,
    ) {
        lock(&self.state)
            .failures
            .entry((op, chat.clone(), message_id))
            .or_default()
            .extend(errors);
    }

    /// Live ids of a chat, ascending.
    #[must_use]
    pub fn ids(&self, chat: &ChannelRef) -> Vec<i32> {
        lock(&self.state)
            .messages
            .get(chat)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        lock(&self.state).calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    fn duplicate(
        &self,
        op: FakeOp,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError> {
        let mut state = lock(&self.state);
        let (call, missing) = match op {
            FakeOp::Forward => (
                FakeCall::Forward {
                    to: to.clone(),
                    from: from.clone(),
                    message_id,
                },
                "Bad Request: message to forward not found",
            ),
            _ => (
                FakeCall::Copy {
                    to: to.clone(),
                    from: from.clone(),
                    message_id,
                },
                "Bad Request: message to copy not found",
            ),
        };
        state.calls.push(call);
        if let Some(err) = state.scripted(op, from, message_id) {
            return Err(err);
        }
        if !state.exists(from, message_id) {
            return Err(classify(missing));
        }
        Ok(state.allocate(to))
    }
}

#[async_trait]
impl MessagingGateway for FakeChannels {
    async fn copy_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError> {
        self.duplicate(FakeOp::Copy, to, from, message_id)
    }

    async fn forward_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError> {
        self.duplicate(FakeOp::Forward, to, from, message_id)
    }

    async fn delete_message(&self, chat: &ChannelRef, message_id: i32) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.calls.push(FakeCall::Delete {
            chat: chat.clone(),
            message_id,
        });
        if let Some(err) = state.scripted(FakeOp::Delete, chat, message_id) {
            return Err(err);
        }
        let removed = state
            .messages
            .get_mut(chat)
            .is_some_and(|ids| ids.remove(&message_id));
        if removed {
            Ok(())
        } else {
            Err(classify("Bad Request: message to delete not found"))
        }
    }

    async fn send_text(
        &self,
        chat: &ChannelRef,
        text: &str,
        _entities: &[Value],
    ) -> Result<i32, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.push(FakeCall::SendText {
            chat: chat.clone(),
            text: text.to_string(),
        });
        Ok(state.allocate(chat))
    }

    async fn send_photo(
        &self,
        chat: &ChannelRef,
        file_id: &str,
        caption: &str,
        _caption_entities: &[Value],
    ) -> Result<SentPhoto, GatewayError> {
        let mut state = lock(&self.state);
        state.calls.push(FakeCall::SendPhoto {
            chat: chat.clone(),
            file_id: file_id.to_string(),
            caption: caption.to_string(),
        });
        let message_id = state.allocate(chat);
        Ok(SentPhoto {
            message_id,
            file_id: format!("{file_id}@{chat}/{message_id}"),
        })
    }

    async fn check_chat(&self, chat: &ChannelRef) -> Result<(), GatewayError> {
        lock(&self.state)
            .calls
            .push(FakeCall::CheckChat { chat: chat.clone() });
        Ok(())
    }

    async fn set_commands(&self, commands: &[CommandSpec]) -> Result<(), GatewayError> {
        lock(&self.state).calls.push(FakeCall::SetCommands(
            commands.iter().map(|c| c.command.clone()).collect(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_allocates_after_seeded_ids() {
        let main = ChannelRef::Id(-1);
        let backup = ChannelRef::Id(-2);
        let fake = FakeChannels::new();
        fake.seed(&main, [4, 5]);
        fake.set_next_id(&backup, 300);

        assert_eq!(fake.copy_message(&backup, &main, 4).await, Ok(300));
        assert_eq!(fake.send_text(&main, "x", &[]).await, Ok(6));
        assert!(matches!(
            fake.copy_message(&backup, &main, 9).await,
            Err(GatewayError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fake_scripted_failures_run_out() {
        let main = ChannelRef::Id(-1);
        let fake = FakeChannels::new();
        fake.seed(&main, [1]);
        fake.fail(FakeOp::Delete, &main, 1, [GatewayError::other("boom")]);

        assert_eq!(
            fake.delete_message(&main, 1).await,
            Err(GatewayError::other("boom"))
        );
        assert_eq!(fake.delete_message(&main, 1).await, Ok(()));
        assert!(fake.ids(&main).is_empty());
    }
}
