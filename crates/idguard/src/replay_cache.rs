//! Token replay caches

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::time::{TimeProvider, system_clock};

/// Remembers tokens until they expire
pub trait TokenReplayCache: Send + Sync + Debug {
    /// Whether the token was already recorded and has not expired
    fn contains(&self, token: &str) -> bool;

    /// Record a token until `expires_on`; `false` when the cache refused it
    fn try_add(&self, token: &str, expires_on: DateTime<Utc>) -> bool;
}

/// In-memory replay cache
///
/// Expired entries are purged whenever the cache is full; an insert into a
/// cache that is still full after purging fails.
#[derive(Debug)]
pub struct InMemoryTokenReplayCache {
    entries: DashMap<String, DateTime<Utc>>,
    capacity: usize,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryTokenReplayCache {
    /// Default capacity
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Cache with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` live tokens
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            time_provider: system_clock(),
        }
    }

    /// Use a different clock
    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Drop expired entries
    pub fn purge_expired(&self) {
        let now = self.time_provider.now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_on| *expires_on > now);
        debug!(
            removed = before.saturating_sub(self.entries.len()),
            "Purged expired replay cache entries"
        );
    }

    /// Number of recorded tokens, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryTokenReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenReplayCache for InMemoryTokenReplayCache {
    fn contains(&self, token: &str) -> bool {
        let now = self.time_provider.now();
        self.entries
            .get(token)
            .is_some_and(|expires_on| *expires_on > now)
    }

    fn try_add(&self, token: &str, expires_on: DateTime<Utc>) -> bool {
        if self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                return false;
            }
        }
        let now = self.time_provider.now();
        match self.entries.entry(token.to_string()) {
            Entry::Occupied(entry) if *entry.get() > now => false,
            Entry::Occupied(mut entry) => {
                entry.insert(expires_on);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_on);
                true
            }
        }
    }
}
