use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub url: String,
    pub author_name: String,
    pub author_email: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub per_second: f64,
    pub burst: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub site: SiteConfig,
    pub rate_limit: RateLimitConfig,
    pub database_path: String,
    pub seed_dir: String,
    pub templates_dir: String,
    pub static_dir: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub admin_password_hash: Option<String>,
    pub use_secure_cookies: bool,
    pub session_ttl_hours: i64,
}

/// Environment variables that override a config key one-to-one.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "web.host"),
    ("PORT", "web.port"),
    ("SITE_URL", "site.url"),
    ("RATE_LIMIT_PER_SECOND", "rate_limit.per_second"),
    ("RATE_LIMIT_BURST", "rate_limit.burst"),
    ("DB_PATH", "database_path"),
    ("SEED_DIR", "seed_dir"),
    ("TEMPLATES_DIR", "templates_dir"),
    ("STATIC_DIR", "static_dir"),
    ("ALLOWED_ORIGINS", "allowed_origins"),
    ("LOG_LEVEL", "log_level"),
    ("ADMIN_USER", "admin_user"),
    ("ADMIN_PASS", "admin_pass"),
    ("ADMIN_PASSWORD_HASH", "admin_password_hash"),
    ("USE_SECURE_COOKIES", "use_secure_cookies"),
    ("SESSION_TTL_HOURS", "session_ttl_hours"),
];

/// The PVC mount used by the cluster deployment wins when present.
fn default_database_path() -> String {
    if Path::new("/app/data").is_dir() {
        "/app/data/homelab.db".to_string()
    } else {
        "data/homelab.db".to_string()
    }
}

impl Config {
    /// Loads configuration from an optional `.env` file, `config/default.toml`
    /// and the process environment, in increasing order of precedence.
    pub fn from_env(env_path: Option<&Path>) -> Result<Self, config::ConfigError> {
        match env_path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| config::ConfigError::Message(format!(
                    "FATAL: Failed to load .env file from '{}'. Error: {}", path.display(), e
                )))?;
            }
            None => {
                if dotenvy::dotenv().is_err() {
                    log::debug!("No .env file found, using environment variables or defaults");
                }
            }
        }

        let mut builder = Self::defaults()?
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml).required(false));

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                if !value.is_empty() {
                    builder = builder.set_override(*key, value)?;
                }
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("web.host", "0.0.0.0")?
            .set_default("web.port", 8082)?
            .set_default("site.title", "Homelab")?
            .set_default("site.description", "Notes from a homelab")?
            .set_default("site.url", "http://localhost:8082")?
            .set_default("site.author_name", "Homelab Admin")?
            .set_default("site.author_email", "admin@localhost")?
            .set_default("rate_limit.per_second", 5.0)?
            .set_default("rate_limit.burst", 10)?
            .set_default("database_path", default_database_path())?
            .set_default("seed_dir", "data")?
            .set_default("templates_dir", "templates")?
            .set_default("static_dir", "static")?
            .set_default("allowed_origins", "")?
            .set_default("log_level", "info")?
            .set_default("admin_user", "admin")?
            .set_default("admin_pass", "changeme")?
            .set_default("use_secure_cookies", false)?
            .set_default("session_ttl_hours", 24)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.admin_user.trim().is_empty() {
            return Err(config::ConfigError::Message("FATAL: 'ADMIN_USER' must not be empty.".to_string()));
        }
        if self.rate_limit.burst == 0 || !(self.rate_limit.per_second > 0.0) {
            return Err(config::ConfigError::Message(
                "FATAL: rate limit rate and burst must both be greater than zero.".to_string(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_TTL_HOURS' must be greater than zero.".to_string(),
            ));
        }
        if self.site.url.trim().is_empty() {
            return Err(config::ConfigError::Message("FATAL: 'SITE_URL' must not be empty.".to_string()));
        }
        Ok(())
    }

    /// True when the admin password is the shipped default.
    pub fn uses_default_password(&self) -> bool {
        self.admin_password_hash.is_none() && self.admin_pass == "changeme"
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }

    /// Marker written after the one-off YAML import, next to the database file.
    pub fn migration_marker_path(&self) -> PathBuf {
        self.db_path()
            .parent()
            .map(|dir| dir.join(".migrated"))
            .unwrap_or_else(|| PathBuf::from(".migrated"))
    }

    pub fn site_base_url(&self) -> &str {
        self.site.url.trim_end_matches('/')
    }
}
