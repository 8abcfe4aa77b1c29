use crate::models::db_operations::DbError;
use crate::models::Service;
use rusqlite::{params, Connection, Row};

fn row_to_service(row: &Row) -> rusqlite::Result<Service> {
    Ok(Service {
        name: row.get(0)?,
        description: row.get(1)?,
        url: row.get(2)?,
        tech: row.get(3)?,
        status: row.get(4)?,
        icon: row.get(5)?,
    })
}

/// Services in name order, optionally only those with the given status.
pub fn read_services(conn: &Connection, status: Option<&str>) -> Result<Vec<Service>, DbError> {
    let mut services = Vec::new();
    match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT name, description, url, tech, status, icon FROM services WHERE status = ?1 ORDER BY name",
            )?;
            for service in stmt.query_map([status], row_to_service)? {
                services.push(service?);
            }
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT name, description, url, tech, status, icon FROM services ORDER BY name")?;
            for service in stmt.query_map([], row_to_service)? {
                services.push(service?);
            }
        }
    }
    Ok(services)
}

/// Inserts a service or replaces the one with the same name.
pub fn save_service(conn: &Connection, service: &Service) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO services (name, description, url, tech, status, icon, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
         ON CONFLICT(name) DO UPDATE SET
            description = excluded.description,
            url = excluded.url,
            tech = excluded.tech,
            status = excluded.status,
            icon = excluded.icon,
            updated_at = CURRENT_TIMESTAMP",
        params![
            service.name,
            service.description,
            service.url,
            service.tech,
            service.status,
            service.icon,
        ],
    )?;
    Ok(())
}

pub fn delete_service(conn: &Connection, name: &str) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM services WHERE name = ?1", [name])?)
}
