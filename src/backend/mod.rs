pub mod store;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::search::{ChatId, FoundMessage, FoundPeer, PageCursor, PeerId};

/// "Search messages in scope X containing text Q, after offset O, up to N results."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSearch {
    /// None searches all chats.
    pub chat: Option<ChatId>,
    pub query: String,
    pub from: Option<PeerId>,
    pub offset: PageCursor,
    pub limit: usize,
    /// Leave archived chats out of a global search.
    pub skip_archive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSearch {
    pub query: String,
    pub limit: usize,
}

/// Shapes a message search can come back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessagesResponse {
    /// The complete result set.
    Messages(Vec<FoundMessage>),
    /// One page of `count` results. `next_rate` continues a global search.
    Slice {
        messages: Vec<FoundMessage>,
        count: usize,
        next_rate: Option<i64>,
    },
    /// One page from a channel-backed chat.
    ChannelMessages {
        messages: Vec<FoundMessage>,
        count: usize,
        pts: i64,
    },
    NotModified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersResponse {
    /// Chats and contacts the user already has.
    pub my_results: Vec<FoundPeer>,
    /// Other public peers.
    pub results: Vec<FoundPeer>,
}

impl PeersResponse {
    pub fn is_empty(&self) -> bool {
        self.my_results.is_empty() && self.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Storage(String),
    FloodWait(u32),
    Rpc { code: i32, name: String },
    Malformed(String),
    Closed,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Storage(e) => write!(f, "storage error: {}", e),
            BackendError::FloodWait(secs) => write!(f, "flood wait for {} secs", secs),
            BackendError::Rpc { code, name } => write!(f, "rpc error {}: {}", code, name),
            BackendError::Malformed(what) => write!(f, "malformed response: {}", what),
            BackendError::Closed => write!(f, "backend closed"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<sqlite::Error> for BackendError {
    fn from(e: sqlite::Error) -> Self {
        BackendError::Storage(e.to_string())
    }
}

/// The messaging backend the search coordinator talks to.
pub trait SearchBackend: Send + Sync + 'static {
    fn search_messages(
        &self,
        search: MessageSearch,
    ) -> impl Future<Output = Result<MessagesResponse, BackendError>> + Send;

    fn search_peers(
        &self,
        search: PeerSearch,
    ) -> impl Future<Output = Result<PeersResponse, BackendError>> + Send;
}
