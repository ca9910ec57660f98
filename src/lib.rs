pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod presenter;
pub mod search;
pub mod session;
pub mod store;

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};

use backend::store::StoreBackend;
use config::SearchConfig;
use error::AppError;
use presenter::{Intent, PresentationConfig, Presenter, TextPresenter, UserInput};
use session::{SearchSession, SessionCommand};
use store::Store;

pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub config: SearchConfig,
}

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub chats: i64,
    pub messages: i64,
    pub recent_hashtags: Vec<String>,
}

fn get_db_stats(state: &AppState) -> Result<DbStats, String> {
    let store = state.store.lock().map_err(|e| e.to_string())?;
    Ok(DbStats {
        chats: store.chat_count().map_err(|e| e.to_string())?,
        messages: store.message_count().map_err(|e| e.to_string())?,
        recent_hashtags: store.recent_hashtags(10).map_err(|e| e.to_string())?,
    })
}

/// Parse one console line into presenter input.
fn parse_line(state: &AppState, line: &str) -> Result<UserInput, String> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(UserInput::Typed(line.to_string()));
    };
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    let id = || -> Result<i64, String> {
        arg.ok_or_else(|| format!("usage: :{} <id>", name))?
            .parse::<i64>()
            .map_err(|e| e.to_string())
    };

    match name {
        "more" => Ok(UserInput::ScrolledNearEnd),
        "esc" => Ok(UserInput::Escape),
        "from" => Ok(UserInput::ChooseFrom(id()?)),
        "chat" => {
            let chat_id = id()?;
            let store = state.store.lock().map_err(|e| e.to_string())?;
            let chat = store
                .get_chat(chat_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("unknown chat {}", chat_id))?;
            Ok(UserInput::SearchInChat(chat.chat_ref()))
        }
        _ => Err(format!("unknown command :{}", name)),
    }
}

/// Open the store and read the search config kept in it.
fn open_state(db_path: &Path) -> Result<AppState, AppError> {
    let store = Store::open(db_path)?;
    let config = SearchConfig::load(&store)?;
    log::info!(
        "Search config: debounce {}ms, {} messages per page, {} peers, skip archive {}",
        config.debounce_ms,
        config.messages_per_page,
        config.peers_limit,
        config.skip_archive
    );
    Ok(AppState {
        store: Arc::new(Mutex::new(store)),
        config,
    })
}

/// Interactive console search over the local store.
pub async fn run() -> Result<(), AppError> {
    let logger = match logging::init(&config::default_log_dir(), None) {
        Ok(handle) => Some(handle),
        Err(e) => {
            logging::init_fallback();
            log::warn!("File logging unavailable, using stderr: {}", e);
            None
        }
    };

    let state = open_state(&config::default_db_path())?;
    if let (Some(handle), Some(level)) = (&logger, state.config.log_level.as_deref()) {
        if let Err(e) = logging::apply_level(handle, level) {
            log::warn!("Keeping default log level, {} is invalid: {}", level, e);
        }
    }
    let backend = Arc::new(StoreBackend::new(Arc::clone(&state.store)));
    let session = SearchSession::spawn(backend, &state.config, Some(Arc::clone(&state.store)));
    let mut snapshots = session.subscribe();
    let mut presenter = TextPresenter::new(PresentationConfig::default());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type to search. :chat <id>, :from <id>, :more, :esc, :archive on|off, :stats, :quit");
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                for line in presenter.render(&snapshot) {
                    println!("{}", line);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim_end().to_string();
                match line.as_str() {
                    ":quit" => break,
                    ":stats" => match get_db_stats(&state) {
                        Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                        Err(e) => eprintln!("{}", e),
                    },
                    ":archive on" | ":archive off" => {
                        session.send(SessionCommand::SetSkipArchive(line.ends_with("on")))?;
                    }
                    _ => match parse_line(&state, &line) {
                        Ok(input) => {
                            for intent in presenter.handle_input(input) {
                                match intent {
                                    Intent::Command(command) => session.send(command)?,
                                    Intent::ShowChat(chat_id) => println!("Opening chat {}", chat_id),
                                    Intent::Close => println!("Search closed"),
                                }
                            }
                        }
                        Err(e) => eprintln!("{}", e),
                    },
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ChatKind;
    use crate::store::chat::ChatRow;

    fn state() -> AppState {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_chat(&ChatRow {
                chat_id: 5,
                title: "Team".to_string(),
                kind: ChatKind::Megagroup,
                username: None,
                migrated_to: None,
                migrated_from: None,
                is_member: true,
                is_archived: false,
            })
            .unwrap();
        AppState {
            store: Arc::new(Mutex::new(store)),
            config: SearchConfig::default(),
        }
    }

    #[test]
    fn test_parse_line() {
        let state = state();
        assert_eq!(
            parse_line(&state, "hello").unwrap(),
            UserInput::Typed("hello".to_string())
        );
        assert_eq!(parse_line(&state, ":more").unwrap(), UserInput::ScrolledNearEnd);
        assert_eq!(parse_line(&state, ":from 7").unwrap(), UserInput::ChooseFrom(7));
        match parse_line(&state, ":chat 5").unwrap() {
            UserInput::SearchInChat(chat) => assert_eq!(chat.id, 5),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_line(&state, ":chat 6").is_err());
        assert!(parse_line(&state, ":from").is_err());
        assert!(parse_line(&state, ":bogus").is_err());
    }

    #[test]
    fn test_open_state_reads_saved_config() {
        let dir = std::env::temp_dir().join(format!("dialogs-search-test-{}", std::process::id()));
        let db_path = dir.join("state.db");
        {
            let store = Store::open(&db_path).unwrap();
            SearchConfig {
                messages_per_page: 20,
                log_level: Some("info".to_string()),
                ..SearchConfig::default()
            }
            .save(&store)
            .unwrap();
        }

        let state = open_state(&db_path).unwrap();
        assert_eq!(state.config.messages_per_page, 20);
        assert_eq!(state.config.log_level.as_deref(), Some("info"));
        drop(state);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_db_stats() {
        let stats = get_db_stats(&state()).unwrap();
        assert_eq!(stats.chats, 1);
        assert_eq!(stats.messages, 0);
        assert!(stats.recent_hashtags.is_empty());
    }
}
