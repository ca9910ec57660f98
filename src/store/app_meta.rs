use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

use super::Store;

impl Store {
    pub fn get_meta(&self, key: &str) -> Result<Option<String>, sqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM app_meta WHERE key = ?")?;
        stmt.bind((1, key))?;
        if let Ok(sqlite::State::Row) = stmt.next() {
            Ok(Some(stmt.read::<String, _>(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), sqlite::Error> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO app_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )?;
        stmt.bind((1, key))?;
        stmt.bind((2, value))?;
        stmt.next()?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> Result<(), sqlite::Error> {
        let mut stmt = self.conn.prepare("DELETE FROM app_meta WHERE key = ?")?;
        stmt.bind((1, key))?;
        stmt.next()?;
        Ok(())
    }

    /// Typed read of a JSON value. Parse failures surface as `AppError::Config`.
    pub fn get_meta_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.get_meta(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_meta_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)?;
        self.set_meta(key, &raw)?;
        Ok(())
    }
}
