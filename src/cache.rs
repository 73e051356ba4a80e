//! Fast store: in-process key-value cache for live trading state.
//! String keys, JSON string values, optional TTL per entry. No cross-key
//! transactions; the ledger engine treats every multi-field mutation as
//! independent key writes and serializes them per user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Analysis payloads expire after 30 minutes; holdings and cash never do.
pub const ANALYSIS_TTL: Duration = Duration::from_secs(30 * 60);

pub fn holdings_key(user_id: Uuid) -> String {
    format!("holdings:{user_id}")
}

pub fn cash_key(user_id: Uuid) -> String {
    format!("cash:{user_id}")
}

pub fn analysis_key(job_id: Uuid) -> String {
    format!("analysis:{job_id}")
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Clone, Default)]
pub struct FastStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl FastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value for `key`, dropping it if its TTL has lapsed.
    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let guard = self.inner.read().await;
            match guard.get(key) {
                Some(entry) if !entry.expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict lazily under the write lock.
        let mut guard = self.inner.write().await;
        if guard.get(key).is_some_and(|e| e.expired(now)) {
            guard.remove(key);
        }
        None
    }

    /// `ttl: None` means the entry persists until overwritten or removed.
    pub async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.inner.write().await.insert(key.to_string(), entry);
    }

    pub async fn remove(&self, key: &str) {
        self.inner.write().await.remove(key);
    }
}
