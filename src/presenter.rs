use serde::{Deserialize, Serialize};

use crate::search::highlight::{find_highlights, mark, query_words};
use crate::search::{ChatId, ChatRef, PeerId, SearchSnapshot};
use crate::session::SessionCommand;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Narrow window: the chat list and a chat are never shown together.
    OneColumn,
    #[default]
    Normal,
    ThreeColumn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationConfig {
    pub passcode_locked: bool,
    pub layout: LayoutMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Typed(String),
    Escape,
    ScrolledNearEnd,
    SearchInChat(ChatRef),
    ChooseFrom(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Command(SessionCommand),
    /// Leave the search and open this chat.
    ShowChat(ChatId),
    /// Leave the search panel.
    Close,
}

/// A presentation surface for search results.
pub trait Presenter {
    fn render(&mut self, snapshot: &SearchSnapshot) -> Vec<String>;
    fn handle_input(&mut self, input: UserInput) -> Vec<Intent>;
}

/// Plain-text rendering with `[` `]` around matches.
#[derive(Debug, Default)]
pub struct TextPresenter {
    config: PresentationConfig,
    last: SearchSnapshot,
}

impl TextPresenter {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            last: SearchSnapshot::default(),
        }
    }

    pub fn set_config(&mut self, config: PresentationConfig) {
        self.config = config;
    }

    fn escape(&self) -> Vec<Intent> {
        let chat = self.last.scope.chat_id();
        if !self.last.query.is_empty() {
            let mut intents = vec![Intent::Command(SessionCommand::FilterChanged(String::new()))];
            if chat.is_none() {
                intents.push(Intent::Close);
            }
            return intents;
        }

        let mut intents = Vec::new();
        if let Some(chat) = chat {
            if self.config.layout == LayoutMode::OneColumn {
                intents.push(Intent::ShowChat(chat));
            }
            intents.push(Intent::Command(SessionCommand::CancelSearch));
        }
        intents.push(Intent::Close);
        intents
    }
}

impl Presenter for TextPresenter {
    fn render(&mut self, snapshot: &SearchSnapshot) -> Vec<String> {
        self.last = snapshot.clone();
        if self.config.passcode_locked {
            return vec!["(locked)".to_string()];
        }

        let words = query_words(&snapshot.query);
        let highlight = |text: &str| mark(text, &find_highlights(text, &words), "[", "]");

        let mut header = format!("Search: \"{}\"", snapshot.query);
        if let Some(chat) = snapshot.scope.chat_id() {
            header.push_str(&format!(" in chat {}", chat));
        }
        if let Some(from) = snapshot.scope.from {
            header.push_str(&format!(" from {}", from));
        }
        let mut lines = vec![header];

        if !snapshot.peers.is_empty() {
            lines.push("Chats:".to_string());
            for peer in snapshot.peers.my_results.iter().chain(&snapshot.peers.results) {
                match &peer.username {
                    Some(username) => {
                        lines.push(format!("  {} @{}", highlight(&peer.title), username))
                    }
                    None => lines.push(format!("  {}", highlight(&peer.title))),
                }
            }
        }

        if !snapshot.messages.is_empty() {
            lines.push("Messages:".to_string());
            for message in &snapshot.messages {
                lines.push(format!("  {}: {}", message.chat_title, highlight(&message.text)));
            }
        }

        if snapshot.is_loading() {
            lines.push("loading…".to_string());
        } else if snapshot.messages.is_empty() && snapshot.primary.complete {
            lines.push("No messages found".to_string());
        } else if !snapshot.messages.is_empty() {
            lines.push(format!(
                "{} of {} messages",
                snapshot.messages.len(),
                snapshot.total_count.max(snapshot.messages.len())
            ));
        }
        lines
    }

    fn handle_input(&mut self, input: UserInput) -> Vec<Intent> {
        if self.config.passcode_locked {
            log::debug!("Ignoring {:?} while locked", input);
            return Vec::new();
        }
        match input {
            UserInput::Typed(text) => vec![Intent::Command(SessionCommand::FilterChanged(text))],
            UserInput::Escape => self.escape(),
            UserInput::ScrolledNearEnd => {
                let done = self.last.primary.complete
                    && (self.last.migrated_from.is_none() || self.last.migrated.complete);
                if self.last.is_loading() || done {
                    Vec::new()
                } else {
                    vec![Intent::Command(SessionCommand::LoadMore(None))]
                }
            }
            UserInput::SearchInChat(chat) => vec![Intent::Command(SessionCommand::SearchInChat {
                text: self.last.query.clone(),
                chat: Some(chat),
            })],
            UserInput::ChooseFrom(peer) => match self.last.scope.chat {
                Some(_) => vec![Intent::Command(SessionCommand::SetScope(
                    self.last.scope.clone().with_from(Some(peer)),
                ))],
                None => Vec::new(),
            },
        }
    }
}
