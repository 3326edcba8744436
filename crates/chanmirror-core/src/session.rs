//! Per-user pending interactions.
//!
//! A command arms a session; the user's next matching message consumes it.
//! Every record expires after the ttl it was armed with, so a stale capture
//! is never acted on.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Upper bound of concurrently pending users per bot.
pub const SESSION_CAPACITY: u64 = 10_000;

/// What the bot expects as the user's next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingInput {
    /// Formatted text to store behind a deep link.
    AttachText,
    /// A photo to use as the permanent banner.
    UploadImage,
    /// A message forwarded from the image-hosting channel.
    PrivateChannel,
    /// A message forwarded from the backup channel.
    ForwardChannel,
}

/// Storage for pending interactions keyed by user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Arm (or replace) the user's pending input for `ttl`.
    async fn arm(&self, user_id: i64, input: PendingInput, ttl: Duration);
    /// The user's live pending input. Expired records are dropped.
    async fn current(&self, user_id: i64) -> Option<PendingInput>;
    /// Drop the user's pending input.
    async fn clear(&self, user_id: i64);
}

#[derive(Debug, Clone, Copy)]
struct Session {
    input: PendingInput,
    ttl: Duration,
}

/// Each session lives for the ttl it was armed with; re-arming restarts it.
struct SessionExpiry;

impl Expiry<i64, Session> for SessionExpiry {
    fn expire_after_create(
        &self,
        _user_id: &i64,
        session: &Session,
        _now: Instant,
    ) -> Option<Duration> {
        Some(session.ttl)
    }

    fn expire_after_update(
        &self,
        _user_id: &i64,
        session: &Session,
        _now: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(session.ttl)
    }
}

/// Process-memory session store on a moka cache. Lost on restart.
#[derive(Clone)]
pub struct InMemorySessionStore {
    cache: Cache<i64, Session>,
}

impl InMemorySessionStore {
    /// Empty store holding up to [`SESSION_CAPACITY`] users.
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(SESSION_CAPACITY)
            .expire_after(SessionExpiry)
            .build();
        Self { cache }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn arm(&self, user_id: i64, input: PendingInput, ttl: Duration) {
        self.cache.insert(user_id, Session { input, ttl }).await;
    }

    async fn current(&self, user_id: i64) -> Option<PendingInput> {
        self.cache.get(&user_id).await.map(|session| session.input)
    }

    async fn clear(&self, user_id: i64) {
        self.cache.invalidate(&user_id).await;
    }
}
