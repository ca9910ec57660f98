use std::collections::HashSet;

use crate::backend::{BackendError, MessageSearch, MessagesResponse, PeerSearch, PeersResponse};
use crate::config::SearchConfig;

use super::cache::{PendingQueries, PendingRequest, ResultCache};
use super::{
    peer_search_required, ChatId, ChatRef, FoundMessage, Lane, LaneStatus, MessageId, PageCursor,
    PeerId, RequestId, SearchQuery, SearchScope, SearchSnapshot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Messages(MessageSearch),
    Peers(PeerSearch),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Messages(MessagesResponse),
    Peers(PeersResponse),
}

/// Side effects the coordinator asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send {
        id: RequestId,
        lane: Lane,
        request: Request,
    },
    /// Best effort; a late response is dropped by the id check anyway.
    Cancel { id: RequestId, lane: Lane },
    /// Displayed results or loading flags changed.
    Refresh,
}

/// Result of [`Coordinator::search`].
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    /// False when some lane still needs a network request.
    pub served: bool,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    id: RequestId,
    first_page: bool,
}

#[derive(Debug, Default)]
struct MessageLane {
    pending: Option<InFlight>,
    complete: bool,
    cursor: PageCursor,
    total: usize,
    results: Vec<FoundMessage>,
    seen: HashSet<(ChatId, MessageId)>,
}

impl MessageLane {
    /// Forget pagination but keep showing the old results until a first page lands.
    fn restart(&mut self) {
        self.complete = false;
        self.cursor = PageCursor::default();
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.seen.clear();
        self.total = 0;
    }

    /// Appends unseen messages, returns how many were new.
    fn merge(&mut self, messages: Vec<FoundMessage>) -> usize {
        let mut added = 0;
        for message in messages {
            if self.seen.insert((message.chat_id, message.message_id)) {
                self.results.push(message);
                added += 1;
            }
        }
        added
    }

    fn status(&self) -> LaneStatus {
        LaneStatus {
            loading: self.pending.is_some(),
            complete: self.complete,
        }
    }
}

#[derive(Debug, Default)]
struct PeerLane {
    pending: Option<RequestId>,
    complete: bool,
    query: String,
    results: PeersResponse,
    cache: ResultCache<PeersResponse>,
    queries: PendingQueries,
}

/// Tracks the current search and mediates its paginated requests.
///
/// The coordinator performs no I/O. Every operation returns the [`Action`]s
/// the caller must carry out; responses are fed back through
/// [`Coordinator::on_response`] and [`Coordinator::on_error`]. A response is
/// applied only when its id is the one tracked for its lane, so the last
/// query always wins.
#[derive(Debug)]
pub struct Coordinator {
    messages_per_page: usize,
    peers_limit: usize,
    skip_archive: bool,
    /// What the user has typed and where.
    input: SearchQuery,
    migrated: Option<ChatId>,
    /// The message query requests were last issued for.
    active_text: String,
    active_from: Option<PeerId>,
    primary: MessageLane,
    migrated_lane: MessageLane,
    message_cache: ResultCache<MessagesResponse>,
    message_queries: PendingQueries,
    peers: PeerLane,
    last_request: u64,
}

impl Coordinator {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            messages_per_page: config.messages_per_page.max(1),
            peers_limit: config.peers_limit,
            skip_archive: config.skip_archive,
            input: SearchQuery::default(),
            migrated: None,
            active_text: String::new(),
            active_from: None,
            primary: MessageLane::default(),
            migrated_lane: MessageLane::default(),
            message_cache: ResultCache::default(),
            message_queries: PendingQueries::default(),
            peers: PeerLane::default(),
            last_request: 0,
        }
    }

    pub fn input(&self) -> &SearchQuery {
        &self.input
    }

    pub fn pending(&self, lane: Lane) -> Option<RequestId> {
        match lane {
            Lane::Peers => self.peers.pending,
            _ => self.message_lane(lane).pending.map(|p| p.id),
        }
    }

    pub fn is_complete(&self, lane: Lane) -> bool {
        match lane {
            Lane::Peers => self.peers.complete,
            _ => self.message_lane(lane).complete,
        }
    }

    /// Replace the active query and fetch results for it: from the caches when
    /// the exact text was seen before, otherwise from the backend.
    pub fn set_query(&mut self, query: SearchQuery) -> Vec<Action> {
        let query = SearchQuery::new(query.text, query.scope.normalized());
        if query == self.input && self.is_active(&query) {
            return Vec::new();
        }

        let mut actions = self.update_input(query);
        let cached = self.search(true);
        actions.extend(cached.actions);
        if !cached.served {
            actions.extend(self.search(false).actions);
        }
        actions
    }

    /// Record new input without searching. Scope or sender changes drop the
    /// message cache; clearing the text drops the peer cache.
    pub fn update_input(&mut self, query: SearchQuery) -> Vec<Action> {
        let mut actions = Vec::new();
        self.apply_scope(query.scope, &mut actions);
        self.apply_filter_text(query.text, &mut actions);
        actions
    }

    /// Search for the current input. With `use_cache` only cached pages are
    /// served; otherwise requests go out for every lane whose query changed.
    pub fn search(&mut self, use_cache: bool) -> Dispatch {
        let mut actions = Vec::new();
        let query = self.input.text.trim().to_string();
        let from = self.input.scope.from;

        if query.is_empty() && from.is_none() {
            self.cancel_lane(Lane::Primary, &mut actions);
            self.cancel_lane(Lane::Migrated, &mut actions);
            self.cancel_lane(Lane::Peers, &mut actions);
            return Dispatch {
                served: true,
                actions,
            };
        }

        let messages_served = self.search_messages(&query, from, use_cache, &mut actions);
        let peers_served = self.search_peers(&query, use_cache, &mut actions);
        Dispatch {
            served: messages_served && peers_served,
            actions,
        }
    }

    /// Explicit "search in chat": issues immediately. A chat that migrated
    /// into the current scope keeps the scope as it is.
    pub fn search_in_chat(&mut self, text: impl Into<String>, chat: Option<ChatRef>) -> Vec<Action> {
        let text = text.into();
        let current = self.input.scope.chat_id();
        let chat_changed = if chat.as_ref().map(|c| c.id) == current {
            false
        } else {
            !matches!(&chat, Some(c) if c.migrated_to.is_some() && c.migrated_to == current)
        };
        if self.input.text == text && !chat_changed {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(chat) = chat {
            if chat_changed {
                actions.extend(self.cancel_search());
                self.apply_scope(SearchScope::in_chat(chat), &mut actions);
            }
        }
        self.apply_filter_text(text, &mut actions);
        actions.extend(self.search(false).actions);
        actions
    }

    /// Continue a lane from its stored cursor. No-op when the lane is complete
    /// or busy; the migrated lane waits for the primary lane to complete.
    pub fn load_more(&mut self, lane: Lane) -> Vec<Action> {
        let no_input = self.input.text.trim().is_empty() && self.input.scope.from.is_none();
        if no_input || (self.active_text.is_empty() && self.active_from.is_none()) {
            return Vec::new();
        }
        let eligible = match lane {
            Lane::Peers => false,
            Lane::Primary => self.primary.pending.is_none() && !self.primary.complete,
            Lane::Migrated => {
                self.migrated.is_some()
                    && self.primary.complete
                    && self.primary.pending.is_none()
                    && self.migrated_lane.pending.is_none()
                    && !self.migrated_lane.complete
            }
        };
        if !eligible {
            return Vec::new();
        }

        let state = self.message_lane(lane);
        let cursor = state.cursor;
        let first_page = state.results.is_empty() && cursor.is_start();
        let id = self.next_request_id();
        self.message_lane_mut(lane).pending = Some(InFlight { id, first_page });
        if first_page && lane == Lane::Primary {
            self.message_queries.insert(
                id,
                PendingRequest {
                    query: self.active_text.clone(),
                    lane,
                    first_page,
                },
            );
        }
        log::debug!("Loading more for {:?} lane from {:?} ({})", lane, cursor, id);

        vec![
            Action::Send {
                id,
                lane,
                request: Request::Messages(self.message_request(lane, cursor)),
            },
            Action::Refresh,
        ]
    }

    /// Scroll-triggered continuation: primary first, then the legacy chat.
    pub fn load_more_messages(&mut self) -> Vec<Action> {
        if self.primary.complete {
            self.load_more(Lane::Migrated)
        } else {
            self.load_more(Lane::Primary)
        }
    }

    pub fn on_response(&mut self, lane: Lane, id: RequestId, response: Response) -> Vec<Action> {
        match (lane, response) {
            (Lane::Peers, Response::Peers(found)) => self.on_peers_found(id, found),
            (Lane::Primary | Lane::Migrated, Response::Messages(page)) => {
                self.on_messages(lane, id, page)
            }
            (lane, _) => {
                log::error!("Unexpected response shape for {:?} lane ({})", lane, id);
                self.on_error(
                    lane,
                    id,
                    &BackendError::Malformed("response for another lane".to_string()),
                )
            }
        }
    }

    /// A failed request ends its lane; it is never retried.
    pub fn on_error(&mut self, lane: Lane, id: RequestId, error: &BackendError) -> Vec<Action> {
        match lane {
            Lane::Peers => self.peers.queries.take(id),
            _ => self.message_queries.take(id),
        };
        if self.pending(lane) != Some(id) {
            log::debug!("Ignoring error for untracked request {}: {}", id, error);
            return Vec::new();
        }
        log::warn!("Search request {} on {:?} lane failed: {}", id, lane, error);

        match lane {
            Lane::Peers => {
                self.peers.pending = None;
                self.peers.complete = true;
            }
            _ => {
                let state = self.message_lane_mut(lane);
                state.pending = None;
                state.complete = true;
            }
        }
        vec![Action::Refresh]
    }

    /// Stop tracking the lane's request without applying anything.
    pub fn cancel(&mut self, lane: Lane) -> Vec<Action> {
        let mut actions = Vec::new();
        self.cancel_lane(lane, &mut actions);
        if !actions.is_empty() {
            actions.push(Action::Refresh);
        }
        actions
    }

    /// Drop the text, the chat scope and everything cached for them.
    pub fn cancel_search(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.cancel_lane(Lane::Primary, &mut actions);
        self.cancel_lane(Lane::Migrated, &mut actions);
        actions.extend(self.update_input(SearchQuery::default()));
        actions
    }

    /// Toggling archive exclusion re-runs a non-empty search from scratch.
    pub fn set_skip_archive(&mut self, skip: bool) -> Vec<Action> {
        if self.skip_archive == skip {
            return Vec::new();
        }
        self.skip_archive = skip;
        if self.active_text.is_empty() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.clear_search_cache(&mut actions);
        actions.extend(self.search(false).actions);
        actions
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let mut messages = self.primary.results.clone();
        messages.extend(self.migrated_lane.results.iter().cloned());
        SearchSnapshot {
            query: self.input.text.clone(),
            scope: self.input.scope.clone(),
            migrated_from: self.migrated,
            messages,
            total_count: self.primary.total + self.migrated_lane.total,
            peers: self.peers.results.clone(),
            primary: self.primary.status(),
            migrated: self.migrated_lane.status(),
            peer_lane: LaneStatus {
                loading: self.peers.pending.is_some(),
                complete: self.peers.complete,
            },
        }
    }

    fn is_active(&self, query: &SearchQuery) -> bool {
        let text = query.text.trim();
        self.active_text == text && self.active_from == query.scope.from && self.peers.query == text
    }

    fn apply_scope(&mut self, scope: SearchScope, actions: &mut Vec<Action>) {
        let scope = scope.normalized();
        self.migrated = scope.chat.as_ref().and_then(|c| c.migrated_from);
        if scope != self.input.scope {
            log::debug!(
                "Search scope changed to chat {:?} from {:?}",
                scope.chat_id(),
                scope.from
            );
            self.input.scope = scope;
            self.clear_search_cache(actions);
            actions.push(Action::Refresh);
        }
    }

    fn apply_filter_text(&mut self, text: String, actions: &mut Vec<Action>) {
        if text == self.input.text {
            return;
        }
        let cleared = text.trim().is_empty();
        self.input.text = text;
        if cleared {
            if self.input.scope.from.is_none() {
                self.clear_search_cache(actions);
            }
            self.clear_peer_search(actions);
        }
        actions.push(Action::Refresh);
    }

    fn clear_search_cache(&mut self, actions: &mut Vec<Action>) {
        self.cancel_lane(Lane::Primary, actions);
        self.cancel_lane(Lane::Migrated, actions);
        self.message_cache.clear();
        self.message_queries.clear();
        self.active_text.clear();
        self.active_from = None;
        self.primary = MessageLane::default();
        self.migrated_lane = MessageLane::default();
    }

    fn clear_peer_search(&mut self, actions: &mut Vec<Action>) {
        self.cancel_lane(Lane::Peers, actions);
        self.peers.cache.clear();
        self.peers.queries.clear();
        self.peers.query.clear();
        self.peers.results = PeersResponse::default();
        self.peers.complete = false;
    }

    fn search_messages(
        &mut self,
        query: &str,
        from: Option<PeerId>,
        use_cache: bool,
        actions: &mut Vec<Action>,
    ) -> bool {
        let changed = self.active_text != query || self.active_from != from;
        if use_cache {
            return match self.message_cache.get(query) {
                Some(page) => {
                    log::debug!("Serving \"{}\" from the message cache", query);
                    self.start_query(query, from, actions);
                    self.apply_messages(Lane::Primary, true, page);
                    actions.push(Action::Refresh);
                    true
                }
                None => !changed,
            };
        }
        if !changed {
            return true;
        }

        self.start_query(query, from, actions);
        let id = self.next_request_id();
        self.primary.pending = Some(InFlight {
            id,
            first_page: true,
        });
        self.message_queries.insert(
            id,
            PendingRequest {
                query: query.to_string(),
                lane: Lane::Primary,
                first_page: true,
            },
        );
        log::debug!("Searching messages for \"{}\" ({})", query, id);
        actions.push(Action::Send {
            id,
            lane: Lane::Primary,
            request: Request::Messages(self.message_request(Lane::Primary, PageCursor::default())),
        });
        actions.push(Action::Refresh);
        true
    }

    fn search_peers(&mut self, query: &str, use_cache: bool, actions: &mut Vec<Action>) -> bool {
        if !peer_search_required(query, &self.input.scope) {
            self.cancel_lane(Lane::Peers, actions);
            self.peers.query = query.to_string();
            self.peers.complete = true;
            if !self.peers.results.is_empty() {
                self.peers.results = PeersResponse::default();
                actions.push(Action::Refresh);
            }
            return true;
        }

        if use_cache {
            return match self.peers.cache.get(query) {
                Some(found) => {
                    self.supersede_lane(Lane::Peers, actions);
                    self.peers.query = query.to_string();
                    self.peers.results = found;
                    self.peers.complete = true;
                    actions.push(Action::Refresh);
                    true
                }
                None => self.peers.query == query,
            };
        }
        if self.peers.query == query {
            return true;
        }

        self.supersede_lane(Lane::Peers, actions);
        self.peers.query = query.to_string();
        self.peers.complete = false;
        let id = self.next_request_id();
        self.peers.pending = Some(id);
        self.peers.queries.insert(
            id,
            PendingRequest {
                query: query.to_string(),
                lane: Lane::Peers,
                first_page: true,
            },
        );
        actions.push(Action::Send {
            id,
            lane: Lane::Peers,
            request: Request::Peers(PeerSearch {
                query: query.to_string(),
                limit: self.peers_limit,
            }),
        });
        actions.push(Action::Refresh);
        true
    }

    fn start_query(&mut self, query: &str, from: Option<PeerId>, actions: &mut Vec<Action>) {
        self.active_text = query.to_string();
        self.active_from = from;
        self.supersede_lane(Lane::Primary, actions);
        self.supersede_lane(Lane::Migrated, actions);
        self.primary.restart();
        self.migrated_lane = MessageLane::default();
    }

    fn on_messages(&mut self, lane: Lane, id: RequestId, page: MessagesResponse) -> Vec<Action> {
        if let Some(request) = self.message_queries.take(id) {
            if request.first_page && request.lane == Lane::Primary && !self.input.text.is_empty() {
                self.message_cache.insert(request.query, page.clone());
            }
        }

        let first_page = match self.message_lane(lane).pending {
            Some(in_flight) if in_flight.id == id => in_flight.first_page,
            _ => {
                log::debug!("Dropping stale {:?} response {}", lane, id);
                return Vec::new();
            }
        };
        self.message_lane_mut(lane).pending = None;
        self.apply_messages(lane, first_page, page);
        vec![Action::Refresh]
    }

    fn apply_messages(&mut self, lane: Lane, first_page: bool, page: MessagesResponse) {
        let per_page = self.messages_per_page;
        let global = lane == Lane::Primary && self.input.scope.chat.is_none();
        let channel_scope = self
            .input
            .scope
            .chat
            .as_ref()
            .is_some_and(|c| c.kind.is_channel_backed());

        let state = self.message_lane_mut(lane);
        if first_page {
            state.clear_results();
        }

        let complete = match page {
            MessagesResponse::Messages(messages) => {
                state.merge(messages);
                state.total = state.results.len();
                true
            }
            MessagesResponse::Slice {
                messages,
                count,
                next_rate,
            } => {
                let received = messages.len();
                let added = state.merge(messages);
                state.total = count;
                if global {
                    let rate_updated = match next_rate {
                        Some(rate) if rate != state.cursor.rate => {
                            state.cursor.rate = rate;
                            true
                        }
                        _ => false,
                    };
                    !rate_updated || received < per_page
                } else {
                    added == 0 || received < per_page
                }
            }
            MessagesResponse::ChannelMessages {
                messages, count, ..
            } => {
                if !channel_scope {
                    log::error!("Received channel messages for a search without a channel scope");
                }
                let received = messages.len();
                let added = state.merge(messages);
                state.total = count;
                added == 0 || received < per_page
            }
            MessagesResponse::NotModified => {
                log::error!("Received a not-modified answer to a message search");
                true
            }
        };

        if let Some(last) = state.results.last() {
            state.cursor.peer = Some(last.chat_id);
            state.cursor.message_id = last.message_id;
        }
        state.complete = complete;
    }

    fn on_peers_found(&mut self, id: RequestId, found: PeersResponse) -> Vec<Action> {
        if let Some(request) = self.peers.queries.take(id) {
            if !self.input.text.is_empty() {
                self.peers.cache.insert(request.query, found.clone());
            }
        }
        if self.peers.pending != Some(id) {
            log::debug!("Dropping stale peer search response {}", id);
            return Vec::new();
        }
        self.peers.pending = None;
        self.peers.results = found;
        self.peers.complete = true;
        vec![Action::Refresh]
    }

    fn message_request(&self, lane: Lane, offset: PageCursor) -> MessageSearch {
        let chat = match lane {
            Lane::Migrated => self.migrated,
            _ => self.input.scope.chat_id(),
        };
        MessageSearch {
            chat,
            query: self.active_text.clone(),
            from: self.active_from,
            offset,
            limit: self.messages_per_page,
            skip_archive: self.skip_archive && chat.is_none(),
        }
    }

    /// Abort the lane's request. No response will come, so its query entry goes too.
    fn cancel_lane(&mut self, lane: Lane, actions: &mut Vec<Action>) {
        let id = match lane {
            Lane::Peers => self.peers.pending.take(),
            _ => self.message_lane_mut(lane).pending.take().map(|p| p.id),
        };
        if let Some(id) = id {
            match lane {
                Lane::Peers => self.peers.queries.take(id),
                _ => self.message_queries.take(id),
            };
            log::debug!("Cancelling {:?} request {}", lane, id);
            actions.push(Action::Cancel { id, lane });
        }
    }

    /// Stop tracking the lane's request because a newer query replaces it.
    /// A first page keeps running so its late response can fill the cache;
    /// anything else is cancelled.
    fn supersede_lane(&mut self, lane: Lane, actions: &mut Vec<Action>) {
        let cacheable = match lane {
            Lane::Peers => self.peers.pending.is_some_and(|id| self.peers.queries.contains(id)),
            _ => self
                .message_lane(lane)
                .pending
                .is_some_and(|p| self.message_queries.contains(p.id)),
        };
        if !cacheable {
            self.cancel_lane(lane, actions);
            return;
        }
        let outstanding = match lane {
            Lane::Peers => {
                self.peers.pending = None;
                self.peers.queries.len()
            }
            _ => {
                self.message_lane_mut(lane).pending = None;
                self.message_queries.len()
            }
        };
        log::debug!(
            "Leaving superseded {:?} request running for the cache ({} outstanding)",
            lane,
            outstanding
        );
    }

    fn message_lane(&self, lane: Lane) -> &MessageLane {
        match lane {
            Lane::Migrated => &self.migrated_lane,
            _ => &self.primary,
        }
    }

    fn message_lane_mut(&mut self, lane: Lane) -> &mut MessageLane {
        match lane {
            Lane::Migrated => &mut self.migrated_lane,
            _ => &mut self.primary,
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.last_request += 1;
        RequestId(self.last_request)
    }
}
