use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::Store;

const CONFIG_KEY: &str = "search_config";

/// Search settings, persisted as JSON in `app_meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Delay between the last keystroke and the network request.
    pub debounce_ms: u64,
    pub messages_per_page: usize,
    pub peers_limit: usize,
    /// Leave archived chats out of global search.
    pub skip_archive: bool,
    /// flexi_logger spec, e.g. "info" or "dialogs_search_lib=debug".
    pub log_level: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 900,
            messages_per_page: 50,
            peers_limit: 5,
            skip_archive: false,
            log_level: None,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Read the stored config. A malformed value is logged and replaced by defaults.
    pub fn load(store: &Store) -> Result<Self, AppError> {
        match store.get_meta_json::<SearchConfig>(CONFIG_KEY) {
            Ok(Some(config)) => Ok(config),
            Ok(None) => Ok(Self::default()),
            Err(AppError::Config(e)) => {
                log::warn!("Ignoring malformed {}: {}", CONFIG_KEY, e);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, store: &Store) -> Result<(), AppError> {
        store.set_meta_json(CONFIG_KEY, self)
    }
}

fn data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("dialogs-search");
    path
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("dialogs-search.db")
}

pub fn default_log_dir() -> PathBuf {
    data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_when_missing() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(SearchConfig::load(&store).unwrap(), SearchConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let store = Store::open_in_memory().unwrap();
        let config = SearchConfig {
            debounce_ms: 300,
            skip_archive: true,
            ..SearchConfig::default()
        };
        config.save(&store).unwrap();
        assert_eq!(SearchConfig::load(&store).unwrap(), config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let store = Store::open_in_memory().unwrap();
        store.set_meta(CONFIG_KEY, r#"{"peers_limit": 10}"#).unwrap();
        let config = SearchConfig::load(&store).unwrap();
        assert_eq!(config.peers_limit, 10);
        assert_eq!(config.debounce_ms, 900);
    }

    #[test]
    fn test_malformed_falls_back_to_defaults() {
        let store = Store::open_in_memory().unwrap();
        store.set_meta(CONFIG_KEY, "not json").unwrap();
        assert_eq!(SearchConfig::load(&store).unwrap(), SearchConfig::default());
    }

    #[test]
    fn test_default_paths() {
        assert!(default_db_path()
            .to_string_lossy()
            .contains("dialogs-search.db"));
        assert!(default_log_dir().to_string_lossy().contains("dialogs-search"));
    }
}
