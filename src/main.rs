use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{rt, web, App, HttpServer};
use clap::Parser;
use homelab_site::{
    clock::{Clock, SystemClock},
    config::Config,
    helper::sanitization_helpers::build_tera,
    middleware::{AdminCredentials, RateLimiter},
    routes,
    setup::{db_setup, seed},
    AppState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Parser, Debug)]
#[command(name = "homelab_server", author, version, about = "Starts the homelab portfolio web server.")]
struct Cli {
    /// Path to a .env file. Without it, `.env` in the working directory is used if present.
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

/// Periodic housekeeping on the actix runtime; each sweep logs only when it removed something.
fn spawn_sweepers(state: web::Data<AppState>, limiter: Arc<RateLimiter>) {
    let sessions_state = state.clone();
    rt::spawn(async move {
        let mut interval = rt::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions_state.sessions.sweep_expired();
            if removed > 0 {
                log::debug!("Removed {} expired admin sessions", removed);
            }
        }
    });

    rt::spawn(async move {
        let mut interval = rt::time::interval(LIMITER_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = limiter.evict_idle();
            if evicted > 0 {
                log::debug!("Evicted {} idle rate limiter entries", evicted);
            }
        }
    });

    rt::spawn(async move {
        let mut interval = rt::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = state.cache.remove_expired();
            if removed > 0 {
                log::debug!("Removed {} expired cache entries", removed);
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(cli.env_file.as_deref())
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    if config.uses_default_password() {
        log::warn!("Admin password is the default 'changeme'. Set ADMIN_PASS or ADMIN_PASSWORD_HASH before exposing this site.");
    }

    let pool = db_setup::open_pool(&config.db_path())
        .expect("FATAL: Failed to open the database. Check DB_PATH and directory permissions.");

    {
        let mut conn = pool.get().expect("FATAL: Failed to get DB connection for initial setup.");
        if let Err(e) = seed::seed_if_needed(&mut conn, Path::new(&config.seed_dir), &config.migration_marker_path()) {
            // The site still serves whatever the database already holds.
            log::error!("YAML import failed: {}", e);
        }
    }

    let tera = build_tera(&config.templates_dir).expect("FATAL: Tera initialization failed");

    let credentials = match &config.admin_password_hash {
        Some(password_hash) => AdminCredentials::from_hash(&config.admin_user, password_hash),
        None => AdminCredentials::from_password(&config.admin_user, &config.admin_pass)
            .expect("FATAL: Failed to hash the admin password."),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = web::Data::new(AppState::new(
        credentials,
        chrono::Duration::hours(config.session_ttl_hours),
        clock.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.per_second, config.rate_limit.burst, clock));

    spawn_sweepers(app_state.clone(), limiter.clone());

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{} (public URL {})", server_address, config.site_base_url());

    let config_data = web::Data::new(config.clone());
    let tera_data = web::Data::new(tera);
    let pool_data = web::Data::new(pool);

    HttpServer::new(move || {
        let limiter = limiter.clone();
        let config = config_data.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .app_data(config.clone())
            .app_data(tera_data.clone())
            .app_data(pool_data.clone())
            .app_data(app_state.clone())
            .service(actix_files::Files::new("/static", &config.static_dir))
            .configure(|cfg| routes::config_routes(cfg, &config, limiter))
    })
    .client_request_timeout(Duration::from_secs(15))
    .keep_alive(Duration::from_secs(60))
    .shutdown_timeout(15)
    .bind(server_address)?
    .run()
    .await?;

    log::info!("Server stopped");
    Ok(())
}
