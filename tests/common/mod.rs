#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App};
use chrono::{TimeZone, Utc};
use homelab_site::clock::MockClock;
use homelab_site::config::{Config, RateLimitConfig, SiteConfig, WebConfig};
use homelab_site::helper::sanitization_helpers::build_tera;
use homelab_site::middleware::{AdminCredentials, RateLimiter};
use homelab_site::models::db_operations::{posts_db_operations, services_db_operations};
use homelab_site::models::{Post, Service};
use homelab_site::setup::db_setup::open_memory_pool;
use homelab_site::{routes, AppState, DbPool};
use std::sync::Arc;
use tera::Tera;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "correct horse";

pub fn test_config() -> Config {
    Config {
        web: WebConfig { host: "127.0.0.1".to_string(), port: 8082 },
        site: SiteConfig {
            title: "Test Lab".to_string(),
            description: "A homelab under test".to_string(),
            url: "http://lab.test".to_string(),
            author_name: "Tester".to_string(),
            author_email: "tester@lab.test".to_string(),
        },
        rate_limit: RateLimitConfig { per_second: 5.0, burst: 10 },
        database_path: ":memory:".to_string(),
        seed_dir: "data".to_string(),
        templates_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/templates").to_string(),
        static_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/static").to_string(),
        allowed_origins: String::new(),
        log_level: "debug".to_string(),
        admin_user: ADMIN_USER.to_string(),
        admin_pass: ADMIN_PASS.to_string(),
        admin_password_hash: None,
        use_secure_cookies: false,
        session_ttl_hours: 24,
    }
}

/// Everything a test app shares: one in-memory database, a manually driven
/// clock, and the limiter wired to it.
pub struct TestSite {
    pub config: Config,
    pub pool: DbPool,
    pub tera: web::Data<Tera>,
    pub state: web::Data<AppState>,
    pub clock: Arc<MockClock>,
    pub limiter: Arc<RateLimiter>,
}

impl TestSite {
    pub fn new() -> Self {
        Self::with_limits(100.0, 100)
    }

    pub fn with_limits(per_second: f64, burst: u32) -> Self {
        let config = test_config();
        let clock = Arc::new(MockClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let credentials = AdminCredentials::from_password_with_cost(ADMIN_USER, ADMIN_PASS, 4).unwrap();
        let state = web::Data::new(AppState::new(credentials, chrono::Duration::hours(24), clock.clone()));
        TestSite {
            tera: web::Data::new(build_tera(&config.templates_dir).unwrap()),
            pool: open_memory_pool().unwrap(),
            limiter: Arc::new(RateLimiter::new(per_second, burst, clock.clone())),
            config,
            state,
            clock,
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let config = self.config.clone();
        let limiter = self.limiter.clone();
        App::new()
            .app_data(web::Data::new(self.config.clone()))
            .app_data(self.tera.clone())
            .app_data(web::Data::new(self.pool.clone()))
            .app_data(self.state.clone())
            .configure(move |cfg| routes::config_routes(cfg, &config, limiter))
    }

    /// A logged-in admin's cookie value.
    pub fn admin_session(&self) -> String {
        self.state.sessions.create().0
    }

    pub fn insert_post(&self, post: &Post) {
        let conn = self.pool.get().unwrap();
        posts_db_operations::save_post(&conn, post).unwrap();
    }

    pub fn insert_service(&self, service: &Service) {
        let conn = self.pool.get().unwrap();
        services_db_operations::save_service(&conn, service).unwrap();
    }
}

pub fn post(id: &str, title: &str, day: u32, tags: &[&str]) -> Post {
    Post {
        id: id.to_string(),
        title: title.to_string(),
        date: Some(Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()),
        category: "Infra".to_string(),
        summary: format!("About {}", title.to_lowercase()),
        content: format!("# {}\n\nSome **markdown** body.", title),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        views: 0,
    }
}

pub fn service(name: &str, status: &str) -> Service {
    Service {
        name: name.to_string(),
        description: format!("{} instance", name),
        url: String::new(),
        tech: "Docker".to_string(),
        status: status.to_string(),
        icon: String::new(),
    }
}
