use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Source of "now" for everything that expires: sessions, rate-limit buckets
/// and cached responses. Tests swap in a [`MockClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct MockClock {
    current: RwLock<DateTime<Utc>>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        MockClock { current: RwLock::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = to;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        MockClock::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
