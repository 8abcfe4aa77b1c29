use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const SESSION_COOKIE: &str = "session_token";

/// The single admin identity. Only the bcrypt hash is kept in memory.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    password_hash: String,
}

impl AdminCredentials {
    /// Hashes a plain-text password once, at startup.
    pub fn from_password(username: &str, password: &str) -> Result<Self, bcrypt::BcryptError> {
        Self::from_password_with_cost(username, password, bcrypt::DEFAULT_COST)
    }

    pub fn from_password_with_cost(username: &str, password: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        Ok(AdminCredentials {
            username: username.to_string(),
            password_hash: bcrypt::hash(password, cost)?,
        })
    }

    pub fn from_hash(username: &str, password_hash: &str) -> Self {
        AdminCredentials {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username != self.username {
            return false;
        }
        match bcrypt::verify(password, &self.password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                log::error!("Stored admin password hash is unusable: {}", e);
                false
            }
        }
    }
}

/// In-memory map of session token to expiry time.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        SessionStore { sessions: RwLock::new(HashMap::new()), ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            log::error!("RwLock for sessions was poisoned! Recovering.");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for sessions was poisoned! Recovering.");
            poisoned.into_inner()
        })
    }

    /// Issues a fresh 256-bit token and returns it with its expiry.
    pub fn create(&self) -> (String, DateTime<Utc>) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let expires_at = self.clock.now() + self.ttl;
        self.write().insert(token.clone(), expires_at);
        (token, expires_at)
    }

    /// Checks a token and, if it is still live, pushes its expiry out by a full TTL.
    pub fn validate_and_refresh(&self, token: &str) -> bool {
        let now = self.clock.now();
        let mut sessions = self.write();
        match sessions.get(token).copied() {
            Some(expires_at) if expires_at > now => {
                sessions.insert(token.to_string(), now + self.ttl);
                true
            }
            Some(_) => {
                sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, token: &str) {
        self.write().remove(token);
    }

    /// Drops every expired session and returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, expires_at| *expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn store(ttl_hours: i64) -> (Arc<MockClock>, SessionStore) {
        let clock = Arc::new(MockClock::default());
        let store = SessionStore::new(Duration::hours(ttl_hours), clock.clone());
        (clock, store)
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let (_, store) = store(24);
        let (a, _) = store.create();
        let (b, _) = store.create();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn token_is_rejected_after_expiry() {
        let (clock, store) = store(24);
        let (token, _) = store.create();
        clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert!(!store.validate_and_refresh(&token));
        assert!(store.is_empty());
    }

    #[test]
    fn activity_extends_the_window() {
        let (clock, store) = store(24);
        let (token, _) = store.create();
        clock.advance(Duration::hours(20));
        assert!(store.validate_and_refresh(&token));
        clock.advance(Duration::hours(20));
        assert!(store.validate_and_refresh(&token));
    }

    #[test]
    fn sweep_only_removes_expired() {
        let (clock, store) = store(1);
        let (old, _) = store.create();
        clock.advance(Duration::minutes(90));
        let (fresh, _) = store.create();
        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.validate_and_refresh(&old));
        assert!(store.validate_and_refresh(&fresh));
    }

    #[test]
    fn deleted_token_is_invalid() {
        let (_, store) = store(24);
        let (token, _) = store.create();
        store.delete(&token);
        assert!(!store.validate_and_refresh(&token));
        assert!(!store.validate_and_refresh("not-a-token"));
    }

    #[test]
    fn credentials_check_username_and_password() {
        let creds = AdminCredentials::from_password_with_cost("admin", "s3cret", 4).unwrap();
        assert!(creds.verify("admin", "s3cret"));
        assert!(!creds.verify("admin", "wrong"));
        assert!(!creds.verify("root", "s3cret"));

        let broken = AdminCredentials::from_hash("admin", "not-a-bcrypt-hash");
        assert!(!broken.verify("admin", "anything"));
    }
}
