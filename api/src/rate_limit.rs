use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use common::error::{self, AddCode};

/// Counts attempts per key inside a rolling window. Swappable so tests can
/// reset state between cases.
pub trait AttemptStore: Send + Sync {
    /// Records one attempt and returns the count inside the current window,
    /// including this one.
    fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> u32;
    fn clear(&self);
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    entries: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
}

impl AttemptStore for MemoryAttemptStore {
    fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> u32 {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert((now, 0));
        if now - entry.0 > window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn AttemptStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAttemptStore::default()))
    }

    fn check(&self, scope: &str, key: &str, max: u32, window: Duration) -> error::Result<()> {
        let count = self.store.hit(&format!("{scope}:{key}"), window, Utc::now());
        if count > max {
            return Err(anyhow::anyhow!(
                "Zu viele Anfragen. Bitte versuchen Sie es später erneut."
            )
            .code(429));
        }
        Ok(())
    }

    pub fn login(&self, ip: &str) -> error::Result<()> {
        self.check("login", ip, 10, Duration::minutes(15))
    }

    pub fn account_creation(&self, ip: &str) -> error::Result<()> {
        self.check("account", ip, 3, Duration::minutes(15))
    }

    pub fn account_creation_per_email(&self, email: &str) -> error::Result<()> {
        self.check("email", email, 2, Duration::hours(1))
    }

    pub fn contact(&self, ip: &str) -> error::Result<()> {
        self.check("contact", ip, 3, Duration::minutes(15))
    }

    pub fn reset(&self) {
        self.store.clear();
    }
}
