//! Configuration repository.

use rusqlite::{params, Connection};

use super::parse_datetime;
use crate::error::Result;
use crate::models::Config;

/// Repository for configuration operations.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a configuration value.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<Config>> {
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM config WHERE key = ?1")?;

        let config = stmt
            .query_row([key], |row| {
                let value_str: String = row.get(1)?;
                Ok(Config {
                    key: row.get(0)?,
                    value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
                    updated_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            })
            .ok();

        Ok(config)
    }

    /// Set a configuration value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Returns true if `key` has a value.
    pub fn contains(conn: &Connection, key: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM config WHERE key = ?1",
            [key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_set_and_get() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "enabled", &json!(2)).unwrap();
        let config = ConfigRepo::get(&conn, "enabled").unwrap().unwrap();

        assert_eq!(config.key, "enabled");
        assert_eq!(config.value, json!(2));
    }

    #[test]
    fn test_update_existing() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "enabled", &json!(1)).unwrap();
        ConfigRepo::set(&conn, "enabled", &json!(2)).unwrap();

        let config = ConfigRepo::get(&conn, "enabled").unwrap().unwrap();
        assert_eq!(config.value, json!(2));
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_db();
        assert!(ConfigRepo::get(&conn, "nonexistent").unwrap().is_none());
        assert!(!ConfigRepo::contains(&conn, "nonexistent").unwrap());
    }

    #[test]
    fn test_contains() {
        let conn = setup_db();
        ConfigRepo::set(&conn, "installed_at", &json!("2024-01-01T00:00:00Z")).unwrap();
        assert!(ConfigRepo::contains(&conn, "installed_at").unwrap());
    }

    #[test]
    fn test_unparseable_value_reads_as_null() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('broken', '{not json')",
            [],
        )
        .unwrap();

        let config = ConfigRepo::get(&conn, "broken").unwrap().unwrap();
        assert!(config.value.is_null());
    }
}
