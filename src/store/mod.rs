pub mod app_meta;
pub mod chat;
pub mod hashtags;
pub mod message;
pub mod schema;

use std::path::Path;

use sqlite::Connection;

/// Local sqlite database holding chats, messages and app settings.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, sqlite::Error> {
        if let Some(parent) = db_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Could not create {}: {}", parent.display(), e);
            }
        }
        let conn = sqlite::open(db_path)?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        log::info!("Opened store at {}", db_path.display());
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self, sqlite::Error> {
        let conn = sqlite::open(":memory:")?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Store { conn })
    }

    fn configure(conn: &Connection) -> Result<(), sqlite::Error> {
        conn.execute(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Bind positional values starting at index 1.
pub(crate) fn bind_all(
    stmt: &mut sqlite::Statement,
    values: &[sqlite::Value],
) -> Result<(), sqlite::Error> {
    for (i, value) in values.iter().enumerate() {
        stmt.bind((i + 1, value.clone()))?;
    }
    Ok(())
}

pub(crate) fn optional_int(value: Option<i64>) -> sqlite::Value {
    value.map_or(sqlite::Value::Null, sqlite::Value::Integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        let mut stmt = store.conn().prepare("PRAGMA journal_mode").unwrap();
        stmt.next().unwrap();
        let mode = stmt.read::<String, _>(0).unwrap();
        // In-memory databases use "memory" journal mode, not WAL
        assert!(mode == "wal" || mode == "memory");
    }

    #[test]
    fn test_migrations_idempotent() {
        let store = Store::open_in_memory().unwrap();
        schema::run_migrations(store.conn()).unwrap();
        schema::run_migrations(store.conn()).unwrap();
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("dialogs-search-{}", std::process::id()));
        let path = dir.join("nested").join("store.db");
        let store = Store::open(&path).unwrap();
        assert_eq!(store.chat_count().unwrap(), 0);
        drop(store);
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
