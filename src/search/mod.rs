pub mod cache;
pub mod coordinator;
pub mod highlight;

use serde::{Deserialize, Serialize};

use crate::backend::PeersResponse;

pub type ChatId = i64;
pub type PeerId = i64;
pub type MessageId = i64;

/// Identifier of one backend request. Allocated by the coordinator, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    User,
    /// Legacy small group. Can be migrated into a megagroup.
    Group,
    Megagroup,
    Channel,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::User => "user",
            ChatKind::Group => "group",
            ChatKind::Megagroup => "megagroup",
            ChatKind::Channel => "channel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(ChatKind::User),
            "group" => Some(ChatKind::Group),
            "megagroup" => Some(ChatKind::Megagroup),
            "channel" => Some(ChatKind::Channel),
            _ => None,
        }
    }

    pub fn is_channel_backed(&self) -> bool {
        matches!(self, ChatKind::Megagroup | ChatKind::Channel)
    }
}

/// A conversation a search can be restricted to, with its migration links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
    pub migrated_from: Option<ChatId>,
    pub migrated_to: Option<ChatId>,
}

impl ChatRef {
    pub fn new(id: ChatId, kind: ChatKind) -> Self {
        Self {
            id,
            kind,
            migrated_from: None,
            migrated_to: None,
        }
    }

    /// The megagroup a legacy group was upgraded into.
    fn successor(&self) -> Option<ChatRef> {
        self.migrated_to.map(|to| ChatRef {
            id: to,
            kind: ChatKind::Megagroup,
            migrated_from: Some(self.id),
            migrated_to: None,
        })
    }
}

/// Where a search runs: one chat (optionally filtered by sender) or everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
    pub chat: Option<ChatRef>,
    pub from: Option<PeerId>,
}

impl SearchScope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn in_chat(chat: ChatRef) -> Self {
        Self {
            chat: Some(chat),
            from: None,
        }
    }

    pub fn with_from(mut self, from: Option<PeerId>) -> Self {
        self.from = from;
        self
    }

    /// Redirects a migrated legacy group to its successor and drops a
    /// sender filter that has no chat to apply to.
    pub(crate) fn normalized(self) -> Self {
        let chat = self
            .chat
            .map(|chat| chat.successor().unwrap_or(chat));
        let from = if chat.is_some() { self.from } else { None };
        Self { chat, from }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat.as_ref().map(|c| c.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub scope: SearchScope,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, scope: SearchScope) -> Self {
        Self {
            text: text.into(),
            scope,
        }
    }

    pub fn global(text: impl Into<String>) -> Self {
        Self::new(text, SearchScope::global())
    }
}

/// One independently paginated search stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Primary,
    Migrated,
    Peers,
}

/// Continuation point for the next page of a lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Opaque continuation token for global search, 0 on the first page.
    pub rate: i64,
    pub peer: Option<ChatId>,
    pub message_id: MessageId,
}

impl PageCursor {
    pub fn is_start(&self) -> bool {
        self.message_id == 0 && self.rate == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundMessage {
    pub chat_id: ChatId,
    pub chat_title: String,
    pub message_id: MessageId,
    pub sender_id: Option<PeerId>,
    pub timestamp: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundPeer {
    pub peer_id: PeerId,
    pub title: String,
    pub username: Option<String>,
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub loading: bool,
    pub complete: bool,
}

/// Everything the presentation layer needs to draw the search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSnapshot {
    pub query: String,
    pub scope: SearchScope,
    pub migrated_from: Option<ChatId>,
    /// Primary lane results followed by migrated lane results.
    pub messages: Vec<FoundMessage>,
    pub total_count: usize,
    pub peers: PeersResponse,
    pub primary: LaneStatus,
    pub migrated: LaneStatus,
    pub peer_lane: LaneStatus,
}

impl SearchSnapshot {
    pub fn is_loading(&self) -> bool {
        self.primary.loading || self.migrated.loading || self.peer_lane.loading
    }
}

/// Contact search only makes sense for global, non-hashtag queries.
pub fn peer_search_required(query: &str, scope: &SearchScope) -> bool {
    if scope.chat.is_some() || query.is_empty() {
        return false;
    }
    !query.starts_with('#')
}
