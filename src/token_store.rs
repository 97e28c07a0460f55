//! Bearer token cache with expiry tracking and durable persistence

use crate::storage::{KeyValueStore, MemoryStore};
use crate::types::Token;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Storage key of the token value
pub const TOKEN_KEY: &str = "myagent_token";

/// Storage key of the token expiry (epoch milliseconds)
pub const TOKEN_EXPIRY_KEY: &str = "myagent_token_expiry";

/// Token cache shared by the authenticator and the dispatcher
///
/// Holds at most one token. Callers only ever receive copies. None of the
/// operations fail: persistence problems are logged and otherwise ignored.
#[derive(Clone)]
pub struct TokenCache {
    current: Arc<RwLock<Option<CachedToken>>>,
    store: Arc<dyn KeyValueStore>,
}

struct CachedToken {
    token: Token,
    /// Lifetime the token was issued (or loaded) with; extensions slide by at least this much
    lifetime: Duration,
}

impl TokenCache {
    /// Create a cache over `store`, hydrating a persisted token if it is still valid
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let cache = Self {
            current: Arc::new(RwLock::new(None)),
            store,
        };
        cache.hydrate();
        cache
    }

    /// Cache without durable storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Current token, or `None` if absent or expired. An expired token is dropped.
    pub fn get(&self) -> Option<Token> {
        let now = Utc::now();

        {
            let current = self.read();
            match current.as_ref() {
                None => return None,
                Some(cached) if cached.token.is_valid_at(now) => return Some(cached.token.clone()),
                Some(_) => {}
            }
        }

        let mut current = self.write();
        match current.as_ref() {
            Some(cached) if cached.token.is_valid_at(now) => Some(cached.token.clone()),
            Some(_) => {
                *current = None;
                drop(current);
                debug!("Cached auth token expired");
                self.remove_persisted();
                None
            }
            None => None,
        }
    }

    /// Store a new token valid for `lifetime` from now
    pub fn set(&self, value: impl Into<String>, lifetime: Duration) -> Token {
        let token = Token::new(value, expiry_from(Utc::now(), lifetime));
        *self.write() = Some(CachedToken {
            token: token.clone(),
            lifetime,
        });
        self.persist(&token);
        token
    }

    /// Slide the expiry of a valid token to `now + max(lifetime, issued lifetime)`,
    /// never shortening it.
    ///
    /// Returns the new expiry, or `None` when there is no valid token to extend.
    pub fn extend(&self, lifetime: Duration) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let extended = {
            let mut current = self.write();
            let cached = current.as_mut().filter(|cached| cached.token.is_valid_at(now))?;
            let slide = expiry_from(now, lifetime.max(cached.lifetime));
            cached.token.expires_at = cached.token.expires_at.max(slide);
            cached.token.clone()
        };
        self.persist(&extended);
        Some(extended.expires_at)
    }

    /// Drop the token from memory and from durable storage
    pub fn clear(&self) {
        *self.write() = None;
        self.remove_persisted();
    }

    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    fn hydrate(&self) {
        let persisted = self
            .store
            .get(TOKEN_KEY)
            .and_then(|value| Ok((value, self.store.get(TOKEN_EXPIRY_KEY)?)));

        let (value, expiry) = match persisted {
            Ok((None, None)) => return,
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to load auth token from storage");
                self.remove_persisted();
                return;
            }
        };

        let token = value
            .zip(expiry.as_deref().and_then(parse_expiry))
            .map(|(value, expires_at)| Token::new(value, expires_at));

        match token {
            Some(token) if !token.is_expired() => {
                debug!(expires_at = %token.expires_at, "Auth token loaded from storage");
                let lifetime = token.remaining();
                *self.write() = Some(CachedToken { token, lifetime });
            }
            _ => {
                debug!("Discarding expired or incomplete persisted auth token");
                self.remove_persisted();
            }
        }
    }

    fn persist(&self, token: &Token) {
        let expiry = token.expires_at.timestamp_millis().to_string();
        let result = self
            .store
            .set(TOKEN_KEY, &token.value)
            .and_then(|()| self.store.set(TOKEN_EXPIRY_KEY, &expiry));

        if let Err(e) = result {
            warn!(error = %e, "Failed to save auth token to storage");
        }
    }

    fn remove_persisted(&self) {
        let result = self
            .store
            .remove(TOKEN_KEY)
            .and_then(|()| self.store.remove(TOKEN_EXPIRY_KEY));

        if let Err(e) = result {
            warn!(error = %e, "Failed to clear auth token from storage");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<CachedToken>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<CachedToken>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn expiry_from(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
