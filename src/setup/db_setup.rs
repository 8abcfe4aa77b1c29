use crate::DbPool;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Migration = fn(&Transaction) -> RusqliteResult<()>;

/// Ordered schema steps; `PRAGMA user_version` records how many have run.
const MIGRATIONS: &[(&str, Migration)] = &[
    ("create posts and services", create_content_tables),
    ("create comments", create_comments_table),
    ("add post views and unique service names", add_views_and_service_key),
];

/// Per-connection settings. SQLite leaves foreign keys off unless asked, and
/// comment cascades depend on them.
pub fn configure_connection(conn: &mut Connection) -> RusqliteResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

pub fn schema_version(conn: &Connection) -> RusqliteResult<usize> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as usize)
}

/// Applies every migration newer than the database's recorded version.
/// Returns how many steps ran.
pub fn run_migrations(conn: &mut Connection) -> RusqliteResult<usize> {
    let current = schema_version(conn)?;
    let mut applied = 0;
    for (version, (name, migration)) in MIGRATIONS.iter().enumerate().skip(current) {
        let tx = conn.transaction()?;
        log::info!("- Applying migration {}: {}", version + 1, name);
        migration(&tx)?;
        tx.pragma_update(None, "user_version", (version + 1) as i64)?;
        tx.commit()?;
        applied += 1;
    }
    Ok(applied)
}

fn create_content_tables(tx: &Transaction) -> RusqliteResult<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            date TEXT NOT NULL,
            category TEXT NOT NULL,
            summary TEXT NOT NULL,
            content TEXT NOT NULL,
            tags TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_posts_date ON posts(date DESC);
        CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category);

        CREATE TABLE IF NOT EXISTS services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            url TEXT NOT NULL,
            tech TEXT NOT NULL,
            status TEXT NOT NULL,
            icon TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_services_status ON services(status);",
    )
}

fn create_comments_table(tx: &Transaction) -> RusqliteResult<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL,
            parent_id INTEGER DEFAULT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);
        CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id);
        CREATE INDEX IF NOT EXISTS idx_comments_approved ON comments(approved);",
    )
}

fn column_exists(tx: &Transaction, table: &str, column: &str) -> RusqliteResult<bool> {
    let mut stmt = tx.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn add_views_and_service_key(tx: &Transaction) -> RusqliteResult<()> {
    // Databases created by older builds may already carry the column.
    if !column_exists(tx, "posts", "views")? {
        tx.execute("ALTER TABLE posts ADD COLUMN views INTEGER NOT NULL DEFAULT 0", [])?;
    }
    // Keep the newest row per name before enforcing uniqueness.
    tx.execute(
        "DELETE FROM services WHERE id NOT IN (SELECT MAX(id) FROM services GROUP BY name)",
        [],
    )?;
    tx.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_services_name ON services(name)", [])?;
    Ok(())
}

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool, SetupError> {
    let manager = manager.with_init(configure_connection);
    // SQLite serialises writers anyway; one connection keeps that explicit.
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;
    {
        let mut conn = pool.get()?;
        let applied = run_migrations(&mut conn)?;
        if applied > 0 {
            log::info!("Database schema upgraded ({} migration(s) applied)", applied);
        }
    }
    Ok(pool)
}

/// Opens (creating if needed) the database file and brings its schema up to date.
pub fn open_pool(db_path: &Path) -> Result<DbPool, SetupError> {
    if let Some(parent_dir) = db_path.parent() {
        if !parent_dir.as_os_str().is_empty() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    build_pool(SqliteConnectionManager::file(db_path))
}

/// Single-connection in-memory database, used by tests and throwaway previews.
pub fn open_memory_pool() -> Result<DbPool, SetupError> {
    build_pool(SqliteConnectionManager::memory())
}
