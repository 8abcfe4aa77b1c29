use crate::models::db_operations::{posts_db_operations, services_db_operations, DbError};
use crate::models::{Post, Service};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const POSTS_FILE: &str = "posts.yaml";
pub const SERVICES_FILE: &str = "services.yaml";

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("YAML error in {}: {source}", .path.display())]
    Yaml { path: PathBuf, source: serde_yaml::Error },
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

#[derive(Deserialize, Default)]
struct PostsFile {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Deserialize, Default)]
struct ServicesFile {
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Debug, Default)]
pub struct SeedData {
    pub posts: Vec<Post>,
    pub services: Vec<Service>,
}

impl SeedData {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.services.is_empty()
    }
}

fn read_yaml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, SeedError> {
    if !path.exists() {
        log::debug!("Seed file {} not present, skipping", path.display());
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| SeedError::Io { path: path.to_path_buf(), source })?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| SeedError::Yaml { path: path.to_path_buf(), source })
}

/// Reads `posts.yaml` and `services.yaml` from `dir`. Missing files count as empty.
pub fn load_seed_files(dir: &Path) -> Result<SeedData, SeedError> {
    let posts: PostsFile = read_yaml(&dir.join(POSTS_FILE))?;
    let services: ServicesFile = read_yaml(&dir.join(SERVICES_FILE))?;
    Ok(SeedData { posts: posts.posts, services: services.services })
}

/// Imports seed data in a single transaction; nothing is written if any
/// row fails. Returns the number of posts and services stored.
pub fn import_seed_data(conn: &mut Connection, data: &SeedData) -> Result<(usize, usize), SeedError> {
    log::info!(
        "Migrating {} posts and {} services from YAML to database",
        data.posts.len(),
        data.services.len()
    );
    let now = Utc::now();
    let tx = conn.transaction()?;
    for post in &data.posts {
        let mut post = post.clone();
        post.date.get_or_insert(now);
        posts_db_operations::save_post(&tx, &post)?;
    }
    for service in &data.services {
        services_db_operations::save_service(&tx, service)?;
    }
    tx.commit()?;
    Ok((data.posts.len(), data.services.len()))
}

/// First-start import: runs only while the marker is absent, and writes the
/// marker once the import has committed. Returns whether an import ran.
pub fn seed_if_needed(conn: &mut Connection, seed_dir: &Path, marker: &Path) -> Result<bool, SeedError> {
    if marker.exists() {
        log::debug!("Seed marker {} present, skipping YAML import", marker.display());
        return Ok(false);
    }
    let data = load_seed_files(seed_dir)?;
    if data.is_empty() {
        log::info!("No seed data found in {}", seed_dir.display());
        return Ok(false);
    }
    let (posts, services) = import_seed_data(conn, &data)?;
    write_marker(marker)?;
    log::info!("Imported {} posts and {} services from {}", posts, services, seed_dir.display());
    Ok(true)
}

pub fn write_marker(marker: &Path) -> Result<(), SeedError> {
    if let Some(dir) = marker.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|source| SeedError::Io { path: dir.to_path_buf(), source })?;
        }
    }
    fs::write(marker, format!("migrated at {}\n", Utc::now().to_rfc3339()))
        .map_err(|source| SeedError::Io { path: marker.to_path_buf(), source })
}
