//! Single-active-session bookkeeping and the token blacklist.
//!
//! Every authenticated request consults [`SessionStore::is_revoked`]; issuing
//! a token for a user supersedes (and blacklists) the previous one.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::AppConfig;

/// Blacklist entries outlive the token `exp` by this much. Validation runs
/// with zero leeway, and `exp` is truncated to whole seconds.
pub const BLACKLIST_GRACE_SECS: i64 = 2;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Session backend error: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Records `jti` as the live session of `user_id`, blacklisting the
    /// previous one. Returns the superseded token id, if any.
    async fn issue(
        &self,
        user_id: i32,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, SessionStoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError>;

    /// Blacklists `jti` until `expires_at` and drops it from whichever user
    /// currently holds it.
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), SessionStoreError>;

    /// Blacklists the user's live token and clears their session entry.
    async fn revoke_all(&self, user_id: i32) -> Result<Option<String>, SessionStoreError>;

    async fn ping(&self) -> Result<(), SessionStoreError>;
}

#[derive(Clone, Debug)]
struct ActiveSession {
    jti: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    active: HashMap<i32, ActiveSession>,
    blacklist: HashMap<String, DateTime<Utc>>,
}

impl SessionState {
    fn blacklist(&mut self, jti: String, expires_at: DateTime<Utc>) {
        self.blacklist.insert(jti, expires_at);
        self.clean_blacklist();
    }

    /// Drops blacklist entries whose token would be rejected as expired anyway
    fn clean_blacklist(&mut self) {
        let cutoff = Utc::now() - ChronoDuration::seconds(BLACKLIST_GRACE_SECS);
        self.blacklist.retain(|_, expiry| *expiry > cutoff);
    }
}

/// Process-local store. Both maps sit behind one lock so issue/revoke are
/// atomic with respect to validation.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    state: Arc<RwLock<SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn active_session(&self, user_id: i32) -> Option<String> {
        self.state
            .read()
            .await
            .active
            .get(&user_id)
            .map(|s| s.jti.clone())
    }

    pub async fn blacklist_len(&self) -> usize {
        self.state.read().await.blacklist.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn issue(
        &self,
        user_id: i32,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, SessionStoreError> {
        let mut state = self.state.write().await;
        let previous = state.active.insert(
            user_id,
            ActiveSession {
                jti: jti.to_string(),
                expires_at,
            },
        );

        match previous {
            Some(prev) if prev.jti != jti => {
                let superseded = prev.jti.clone();
                state.blacklist(prev.jti, prev.expires_at);
                Ok(Some(superseded))
            }
            _ => Ok(None),
        }
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError> {
        Ok(self.state.read().await.blacklist.contains_key(jti))
    }

    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), SessionStoreError> {
        let mut state = self.state.write().await;
        state.active.retain(|_, session| session.jti != jti);
        state.blacklist(jti.to_string(), expires_at);
        Ok(())
    }

    async fn revoke_all(&self, user_id: i32) -> Result<Option<String>, SessionStoreError> {
        let mut state = self.state.write().await;
        match state.active.remove(&user_id) {
            Some(session) => {
                let jti = session.jti.clone();
                state.blacklist(session.jti, session.expires_at);
                Ok(Some(jti))
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), SessionStoreError> {
        Ok(())
    }
}

/// Redis-backed store for deployments running more than one API instance.
///
/// Keys (all under `namespace`):
/// - `active:{user_id}` holds the live jti
/// - `owner:{jti}` maps a jti back to its user for logout
/// - `revoked:{jti}` marks a blacklisted jti, expiring with the token
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Arc<redis::Client>,
    namespace: String,
    fallback_ttl: ChronoDuration,
}

impl RedisSessionStore {
    pub async fn new(
        client: Arc<redis::Client>,
        namespace: String,
        fallback_ttl: ChronoDuration,
    ) -> Result<Self, SessionStoreError> {
        let store = Self {
            client,
            namespace,
            fallback_ttl,
        };
        store.ping().await?;
        Ok(store)
    }

    fn active_key(&self, user_id: i32) -> String {
        format!("{}:active:{}", self.namespace, user_id)
    }

    fn owner_key(&self, jti: &str) -> String {
        format!("{}:owner:{}", self.namespace, jti)
    }

    fn revoked_key(&self, jti: &str) -> String {
        format!("{}:revoked:{}", self.namespace, jti)
    }

    fn ttl_until(expires_at: DateTime<Utc>) -> usize {
        ((expires_at - Utc::now()).num_seconds().max(0) + BLACKLIST_GRACE_SECS) as usize
    }

    fn fallback_ttl_secs(&self) -> usize {
        self.fallback_ttl.num_seconds().max(1) as usize
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn issue(
        &self,
        user_id: i32,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, SessionStoreError> {
        let mut conn = self.client.get_async_connection().await?;
        let active_key = self.active_key(user_id);
        let ttl = Self::ttl_until(expires_at);

        let (remaining, previous): (i64, Option<String>) = redis::pipe()
            .atomic()
            .cmd("TTL")
            .arg(&active_key)
            .cmd("GETSET")
            .arg(&active_key)
            .arg(jti)
            .query_async(&mut conn)
            .await?;

        conn.expire::<_, ()>(&active_key, ttl).await?;
        conn.set_ex::<_, _, ()>(self.owner_key(jti), user_id, ttl)
            .await?;

        match previous {
            Some(prev) if prev != jti => {
                let blacklist_ttl = if remaining > 0 {
                    remaining as usize
                } else {
                    self.fallback_ttl_secs()
                };
                conn.set_ex::<_, _, ()>(self.revoked_key(&prev), 1, blacklist_ttl)
                    .await?;
                conn.del::<_, ()>(self.owner_key(&prev)).await?;
                Ok(Some(prev))
            }
            _ => Ok(None),
        }
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError> {
        let mut conn = self.client.get_async_connection().await?;
        let revoked: bool = conn.exists(self.revoked_key(jti)).await?;
        Ok(revoked)
    }

    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), SessionStoreError> {
        let mut conn = self.client.get_async_connection().await?;
        conn.set_ex::<_, _, ()>(self.revoked_key(jti), 1, Self::ttl_until(expires_at))
            .await?;

        let owner: Option<i32> = conn.get(self.owner_key(jti)).await?;
        if let Some(user_id) = owner {
            let active_key = self.active_key(user_id);
            let current: Option<String> = conn.get(&active_key).await?;
            if current.as_deref() == Some(jti) {
                conn.del::<_, ()>(&active_key).await?;
            }
        }
        conn.del::<_, ()>(self.owner_key(jti)).await?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: i32) -> Result<Option<String>, SessionStoreError> {
        let mut conn = self.client.get_async_connection().await?;
        let active_key = self.active_key(user_id);

        let (remaining, current): (i64, Option<String>) = redis::pipe()
            .atomic()
            .cmd("TTL")
            .arg(&active_key)
            .cmd("GET")
            .arg(&active_key)
            .query_async(&mut conn)
            .await?;

        let Some(jti) = current else {
            return Ok(None);
        };

        let blacklist_ttl = if remaining > 0 {
            remaining as usize
        } else {
            self.fallback_ttl_secs()
        };
        conn.set_ex::<_, _, ()>(self.revoked_key(&jti), 1, blacklist_ttl)
            .await?;
        conn.del::<_, ()>(&active_key).await?;
        conn.del::<_, ()>(self.owner_key(&jti)).await?;
        Ok(Some(jti))
    }

    async fn ping(&self) -> Result<(), SessionStoreError> {
        let mut conn = self.client.get_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Builds the configured backend, falling back to in-memory when Redis is
/// selected but unreachable.
pub async fn build_session_store(
    config: &AppConfig,
    token_lifetime: ChronoDuration,
) -> Arc<dyn SessionStore> {
    if !config.uses_redis_sessions() {
        debug!("Using in-memory session store");
        return Arc::new(InMemorySessionStore::new());
    }

    let client = match redis::Client::open(config.redis_url.as_str()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(
                "Invalid Redis URL for session store (falling back to in-memory): {}",
                err
            );
            return Arc::new(InMemorySessionStore::new());
        }
    };

    match RedisSessionStore::new(client, config.session_namespace.clone(), token_lifetime).await {
        Ok(store) => {
            info!(namespace = %config.session_namespace, "Using Redis session store");
            Arc::new(store)
        }
        Err(err) => {
            error!(
                "Failed to initialize Redis session store (falling back to in-memory): {}",
                err
            );
            Arc::new(InMemorySessionStore::new())
        }
    }
}
