//! Session cache mapping opaque tokens to account logins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::SessionToken;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::faults::{FaultPlan, Operation};

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Stores `token -> login` for `ttl`, replacing any previous entry.
    async fn put(&self, token: &SessionToken, login: &str, ttl: Duration) -> Result<()>;

    /// Removes a token. Fails with `NotFound` if it is absent or expired.
    async fn remove(&self, token: &SessionToken) -> Result<()>;

    /// Returns the login behind a live token.
    async fn get(&self, token: &SessionToken) -> Result<Option<String>>;
}

#[derive(Debug)]
struct Entry {
    login: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    entries: HashMap<SessionToken, Entry>,
    faults: FaultPlan,
}

/// Expiring in-process session map.
///
/// Expired entries are treated as absent. They are dropped when read and
/// swept out on every `put`, so tokens that are never presented again do not
/// accumulate.
#[derive(Clone, Default)]
pub struct InMemorySessionCache {
    state: Arc<RwLock<SessionState>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_on(&self, op: Operation, nth: u32) {
        self.state.write().await.faults.fail_on(op, nth);
    }

    pub async fn fail_always(&self, op: Operation) {
        self.state.write().await.faults.fail_always(op);
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.state
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn put(&self, token: &SessionToken, login: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::PutSession)?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| StoreError::Unavailable(format!("session ttl out of range: {ttl:?}")))?;
        let now = Utc::now();
        state.entries.retain(|_, entry| entry.expires_at > now);
        state.entries.insert(
            token.clone(),
            Entry {
                login: login.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, token: &SessionToken) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::RemoveSession)?;
        match state.entries.remove(token) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(()),
            _ => Err(StoreError::not_found("session", "<redacted>")),
        }
    }

    async fn get(&self, token: &SessionToken) -> Result<Option<String>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetSession)?;
        let expired = match state.entries.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => return Ok(Some(entry.login.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(token);
        }
        Ok(None)
    }
}
