use bcrypt::{hash, DEFAULT_COST};
use clap::{Parser, Subcommand};
use homelab_site::config::Config;
use homelab_site::setup::{db_setup, seed};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for database setup and admin housekeeping.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a .env file. Without it, `.env` in the working directory is used if present.
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Create the database file if needed and apply pending migrations.
    Setup,
    /// Import posts.yaml and services.yaml into the database.
    Seed {
        /// Directory holding the YAML files (defaults to SEED_DIR).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Print the schema version and row counts.
    Status,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Print a bcrypt hash suitable for ADMIN_PASSWORD_HASH.
    HashPassword {
        #[arg(long)]
        password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(cli.env_file.as_deref())
        .expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_database(&config),
            DbAction::Seed { dir } => {
                let dir = dir.clone().unwrap_or_else(|| PathBuf::from(&config.seed_dir));
                seed_database(&config, &dir);
            }
            DbAction::Status => print_status(&config),
        },
        Commands::Admin { action } => match action {
            AdminAction::HashPassword { password } => match hash(password, DEFAULT_COST) {
                Ok(hashed) => println!("{}", hashed),
                Err(e) => eprintln!("❌ Error hashing password: {}", e),
            },
        },
    }
}

fn setup_database(config: &Config) {
    let db_path = config.db_path();
    println!("\nSetting up database at '{}'...", db_path.display());
    match db_setup::open_pool(&db_path) {
        Ok(pool) => match pool.get().map(|conn| db_setup::schema_version(&conn)) {
            Ok(Ok(version)) => println!("✅ Database ready (schema version {}).", version),
            Ok(Err(e)) => eprintln!("❌ Error reading schema version: {}", e),
            Err(e) => eprintln!("❌ Error getting a database connection: {}", e),
        },
        Err(e) => eprintln!("❌ Error setting up database: {}", e),
    }
}

fn seed_database(config: &Config, dir: &Path) {
    let data = match seed::load_seed_files(dir) {
        Ok(data) if data.is_empty() => {
            println!("ℹ️ No posts.yaml or services.yaml content found in '{}'. Nothing to import.", dir.display());
            return;
        }
        Ok(data) => data,
        Err(e) => {
            eprintln!("❌ Error reading seed files: {}", e);
            return;
        }
    };

    let pool = match db_setup::open_pool(&config.db_path()) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("❌ Error opening database: {}", e);
            return;
        }
    };
    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Error getting a database connection: {}", e);
            return;
        }
    };

    match seed::import_seed_data(&mut conn, &data) {
        Ok((posts, services)) => {
            println!("✅ Imported {} posts and {} services from '{}'.", posts, services, dir.display());
            if let Err(e) = seed::write_marker(&config.migration_marker_path()) {
                eprintln!("⚠️ Import succeeded but the marker could not be written: {}", e);
            }
        }
        Err(e) => eprintln!("❌ Import failed, nothing was written: {}", e),
    }
}

fn print_status(config: &Config) {
    let db_path = config.db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return;
    }
    let conn = match Connection::open(&db_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Error opening database: {}", e);
            return;
        }
    };

    match db_setup::schema_version(&conn) {
        Ok(version) => println!("Schema version: {}", version),
        Err(e) => eprintln!("❌ Error reading schema version: {}", e),
    }
    for table in ["posts", "services", "comments"] {
        match conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get::<_, i64>(0)) {
            Ok(count) => println!("- {}: {}", table, count),
            Err(e) => eprintln!("- {}: unavailable ({})", table, e),
        }
    }
    let pending: rusqlite::Result<i64> =
        conn.query_row("SELECT COUNT(*) FROM comments WHERE approved = 0", [], |row| row.get(0));
    if let Ok(pending) = pending {
        println!("- comments awaiting moderation: {}", pending);
    }
    println!(
        "YAML import marker: {}",
        if config.migration_marker_path().exists() { "present" } else { "absent" }
    );
}
