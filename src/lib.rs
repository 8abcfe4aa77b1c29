use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
pub type DbPool = Pool<SqliteConnectionManager>;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::middleware::session_store::{AdminCredentials, SessionStore};

/// Process-wide state shared by every worker.
pub struct AppState {
    pub sessions: SessionStore,
    pub credentials: AdminCredentials,
    pub cache: TtlCache<String, String>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(credentials: AdminCredentials, session_ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        AppState {
            sessions: SessionStore::new(session_ttl, clock.clone()),
            credentials,
            cache: TtlCache::new(clock.clone()),
            clock,
        }
    }
}

pub mod cache;
pub mod clock;
pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
