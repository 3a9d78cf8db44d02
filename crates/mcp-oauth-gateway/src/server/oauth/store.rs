//! OAuth state stores.
//!
//! Three independent stores, each behind a trait so the authorization server
//! can be built with test doubles or a persistent backend. The in-memory
//! implementations guard a `HashMap` with a `tokio::sync::RwLock` each.
//!
//! Expiry is enforced on read: an expired record found by a lookup is deleted
//! and reported as absent. [`OAuthStores::purge_expired`] is a memory-hygiene
//! sweep only.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{AccessTokenRecord, AuthorizationCode, RegisteredClient};
use crate::error::{OAuthError, OAuthResult};

/// Registered client storage.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Store a client. Returns `false` and leaves the store untouched if the
    /// client id is already taken.
    async fn insert(&self, client: RegisteredClient) -> bool;

    /// Look up a client by id.
    async fn get(&self, client_id: &str) -> Option<RegisteredClient>;

    /// Number of registered clients.
    async fn len(&self) -> usize;

    /// Whether no client is registered.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Authorization code storage.
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Store a freshly issued code.
    async fn insert(&self, code: String, grant: AuthorizationCode);

    /// Redeem a code under a single write lock.
    ///
    /// An unknown code is rejected. An expired code is deleted and rejected.
    /// Otherwise `check` runs against the stored grant: if it fails the code
    /// stays redeemable, if it passes the code is removed and returned. Of
    /// two concurrent redemptions that both pass `check`, exactly one wins.
    async fn redeem(
        &self,
        code: &str,
        now: DateTime<Utc>,
        check: &(dyn for<'a> Fn(&'a AuthorizationCode) -> OAuthResult<()> + Send + Sync),
    ) -> OAuthResult<AuthorizationCode>;

    /// Delete every code expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of stored codes.
    async fn len(&self) -> usize;
}

/// Access token record storage, keyed by the serialized token.
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Store the record for a newly minted token.
    async fn insert(&self, token: String, record: AccessTokenRecord);

    /// Look up a live record. An expired record is deleted and `None` returned.
    async fn get(&self, token: &str, now: DateTime<Utc>) -> Option<AccessTokenRecord>;

    /// Delete a record. Returns whether one existed.
    async fn remove(&self, token: &str) -> bool;

    /// Delete every record expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of stored records.
    async fn len(&self) -> usize;
}

// ─── In-memory implementations ──────────────────────────────────────────────

/// In-memory [`ClientRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryClientRegistry {
    clients: RwLock<HashMap<String, RegisteredClient>>,
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn insert(&self, client: RegisteredClient) -> bool {
        match self.clients.write().await.entry(client.client_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(client);
                true
            }
        }
    }

    async fn get(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients.read().await.get(client_id).cloned()
    }

    async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// In-memory [`AuthorizationCodeStore`].
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

#[async_trait]
impl AuthorizationCodeStore for InMemoryCodeStore {
    async fn insert(&self, code: String, grant: AuthorizationCode) {
        self.codes.write().await.insert(code, grant);
    }

    async fn redeem(
        &self,
        code: &str,
        now: DateTime<Utc>,
        check: &(dyn for<'a> Fn(&'a AuthorizationCode) -> OAuthResult<()> + Send + Sync),
    ) -> OAuthResult<AuthorizationCode> {
        let mut codes = self.codes.write().await;
        let Entry::Occupied(entry) = codes.entry(code.to_string()) else {
            return Err(OAuthError::invalid_grant("invalid or already used authorization code"));
        };

        if entry.get().is_expired(now) {
            entry.remove();
            tracing::debug!("Dropped expired authorization code on redemption");
            return Err(OAuthError::invalid_grant("authorization code expired"));
        }

        check(entry.get())?;
        Ok(entry.remove())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, code| !code.is_expired(now));
        before - codes.len()
    }

    async fn len(&self) -> usize {
        self.codes.read().await.len()
    }
}

/// In-memory [`AccessTokenStore`].
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, AccessTokenRecord>>,
}

#[async_trait]
impl AccessTokenStore for InMemoryTokenStore {
    async fn insert(&self, token: String, record: AccessTokenRecord) {
        self.tokens.write().await.insert(token, record);
    }

    async fn get(&self, token: &str, now: DateTime<Utc>) -> Option<AccessTokenRecord> {
        {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                None => return None,
                Some(record) if !record.is_expired(now) => return Some(record.clone()),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent insert may have
        // replaced the record in between.
        let mut tokens = self.tokens.write().await;
        if tokens.get(token).is_some_and(|r| r.is_expired(now)) {
            tokens.remove(token);
            tracing::debug!("Dropped expired access token on read");
            return None;
        }
        tokens.get(token).cloned()
    }

    async fn remove(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_expired(now));
        before - tokens.len()
    }

    async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }
}

/// The three stores the authorization server runs on.
#[derive(Clone)]
pub struct OAuthStores {
    pub clients: Arc<dyn ClientRegistry>,
    pub codes: Arc<dyn AuthorizationCodeStore>,
    pub tokens: Arc<dyn AccessTokenStore>,
}

impl OAuthStores {
    /// Fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            clients: Arc::new(InMemoryClientRegistry::default()),
            codes: Arc::new(InMemoryCodeStore::default()),
            tokens: Arc::new(InMemoryTokenStore::default()),
        }
    }

    /// Delete expired codes and tokens. Returns `(codes, tokens)` removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> (usize, usize) {
        let codes = self.codes.purge_expired(now).await;
        let tokens = self.tokens.purge_expired(now).await;
        if codes + tokens > 0 {
            tracing::debug!(codes, tokens, "Cleaned up expired OAuth records");
        }
        (codes, tokens)
    }
}

impl Default for OAuthStores {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for OAuthStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStores").finish()
    }
}
