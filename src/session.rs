use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep_until, Instant};

use crate::backend::{BackendError, SearchBackend};
use crate::config::SearchConfig;
use crate::error::AppError;
use crate::search::coordinator::{Action, Coordinator, Request, Response};
use crate::search::{ChatRef, Lane, RequestId, SearchQuery, SearchScope, SearchSnapshot};
use crate::store::Store;

/// Input events for a running [`SearchSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// A keystroke in the search field. Debounced unless the caches can answer.
    FilterChanged(String),
    SetScope(SearchScope),
    /// Apply a query immediately.
    SetQuery(SearchQuery),
    SearchInChat {
        text: String,
        chat: Option<ChatRef>,
    },
    /// Continue a lane; `None` picks the next message lane.
    LoadMore(Option<Lane>),
    Cancel(Lane),
    CancelSearch,
    SetSkipArchive(bool),
    Shutdown,
}

struct Completed {
    lane: Lane,
    id: RequestId,
    result: Result<Response, BackendError>,
}

/// Handle to the task that owns the search coordinator.
pub struct SearchSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<SearchSnapshot>,
    task: JoinHandle<()>,
}

impl SearchSession {
    /// Start the session on the current tokio runtime.
    pub fn spawn<B: SearchBackend>(
        backend: Arc<B>,
        config: &SearchConfig,
        store: Option<Arc<Mutex<Store>>>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (responses, response_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(SearchSnapshot::default());

        let driver = Driver {
            backend,
            coordinator: Coordinator::new(config),
            debounce: config.debounce(),
            deadline: None,
            in_flight: HashMap::new(),
            responses,
            snapshots: snapshot_tx,
            store,
        };
        let task = tokio::spawn(driver.run(command_rx, response_rx));
        log::info!("Search session started (debounce {:?})", config.debounce());

        Self {
            commands,
            snapshots,
            task,
        }
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .map_err(|_| AppError::SessionClosed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Call `callback` with every new snapshot until the session ends.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&SearchSnapshot) + Send + 'static,
    {
        let mut rx = self.snapshots.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(&snapshot);
            }
        })
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            log::error!("Search session task failed: {}", e);
        }
    }
}

struct Driver<B> {
    backend: Arc<B>,
    coordinator: Coordinator,
    debounce: Duration,
    /// When the debounced network search fires.
    deadline: Option<Instant>,
    in_flight: HashMap<Lane, (RequestId, AbortHandle)>,
    responses: mpsc::UnboundedSender<Completed>,
    snapshots: watch::Sender<SearchSnapshot>,
    store: Option<Arc<Mutex<Store>>>,
}

impl<B: SearchBackend> Driver<B> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut responses: mpsc::UnboundedReceiver<Completed>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(done) = responses.recv() => self.complete(done),
                _ = sleep_until(self.deadline.unwrap_or_else(Instant::now)), if self.deadline.is_some() => {
                    self.deadline = None;
                    let dispatch = self.coordinator.search(false);
                    self.perform(dispatch.actions);
                }
            }
        }

        for (_, (_, handle)) in self.in_flight.drain() {
            handle.abort();
        }
        log::info!("Search session stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        let actions = match command {
            SessionCommand::FilterChanged(text) => {
                let scope = self.coordinator.input().scope.clone();
                let mut actions = self.coordinator.update_input(SearchQuery::new(text, scope));
                let cached = self.coordinator.search(true);
                actions.extend(cached.actions);
                self.deadline = if cached.served {
                    None
                } else {
                    Some(Instant::now() + self.debounce)
                };
                actions
            }
            SessionCommand::SetScope(scope) => {
                self.deadline = None;
                let text = self.coordinator.input().text.clone();
                self.coordinator.set_query(SearchQuery::new(text, scope))
            }
            SessionCommand::SetQuery(query) => {
                self.deadline = None;
                self.remember_hashtags(&query.text);
                self.coordinator.set_query(query)
            }
            SessionCommand::SearchInChat { text, chat } => {
                self.deadline = None;
                self.remember_hashtags(&text);
                self.coordinator.search_in_chat(text, chat)
            }
            SessionCommand::LoadMore(None) => self.coordinator.load_more_messages(),
            SessionCommand::LoadMore(Some(lane)) => self.coordinator.load_more(lane),
            SessionCommand::Cancel(lane) => self.coordinator.cancel(lane),
            SessionCommand::CancelSearch => {
                self.deadline = None;
                self.coordinator.cancel_search()
            }
            SessionCommand::SetSkipArchive(skip) => self.coordinator.set_skip_archive(skip),
            SessionCommand::Shutdown => Vec::new(),
        };
        self.perform(actions);
    }

    fn complete(&mut self, done: Completed) {
        if matches!(self.in_flight.get(&done.lane), Some((id, _)) if *id == done.id) {
            self.in_flight.remove(&done.lane);
        }
        let actions = match done.result {
            Ok(response) => self.coordinator.on_response(done.lane, done.id, response),
            Err(e) => self.coordinator.on_error(done.lane, done.id, &e),
        };
        self.perform(actions);
    }

    fn perform(&mut self, actions: Vec<Action>) {
        let mut refresh = false;
        for action in actions {
            match action {
                Action::Send { id, lane, request } => self.dispatch(id, lane, request),
                Action::Cancel { id, lane } => {
                    if matches!(self.in_flight.get(&lane), Some((tracked, _)) if *tracked == id) {
                        if let Some((_, handle)) = self.in_flight.remove(&lane) {
                            handle.abort();
                        }
                    }
                }
                Action::Refresh => refresh = true,
            }
        }
        if refresh {
            self.snapshots.send_replace(self.coordinator.snapshot());
        }
    }

    fn dispatch(&mut self, id: RequestId, lane: Lane, request: Request) {
        let backend = Arc::clone(&self.backend);
        let responses = self.responses.clone();
        let task = tokio::spawn(async move {
            let result = match request {
                Request::Messages(search) => backend
                    .search_messages(search)
                    .await
                    .map(Response::Messages),
                Request::Peers(search) => backend.search_peers(search).await.map(Response::Peers),
            };
            let _ = responses.send(Completed { lane, id, result });
        });
        self.in_flight.insert(lane, (id, task.abort_handle()));
    }

    fn remember_hashtags(&self, text: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if !text.contains('#') {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        match store.lock() {
            Ok(store) => {
                if let Err(e) = store.save_recent_hashtags(text, now) {
                    log::warn!("Failed to save recent hashtags: {}", e);
                }
            }
            Err(e) => log::error!("Store lock poisoned: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::store::StoreBackend;
    use crate::backend::{MessageSearch, MessagesResponse, PeerSearch, PeersResponse};
    use crate::search::{ChatKind, FoundMessage, FoundPeer};
    use crate::store::chat::ChatRow;
    use crate::store::message::MessageRow;

    /// Answers every query with one message echoing it, after a per-query delay.
    #[derive(Default)]
    struct FakeBackend {
        message_calls: AtomicUsize,
        peer_calls: AtomicUsize,
        delays: HashMap<String, Duration>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn with_delay(mut self, query: &str, delay: Duration) -> Self {
            self.delays.insert(query.to_string(), delay);
            self
        }

        fn delay(&self, query: &str) -> Duration {
            self.delays
                .get(query)
                .copied()
                .unwrap_or(Duration::from_millis(10))
        }
    }

    impl SearchBackend for FakeBackend {
        async fn search_messages(
            &self,
            search: MessageSearch,
        ) -> Result<MessagesResponse, BackendError> {
            self.message_calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(search.query.clone());
            tokio::time::sleep(self.delay(&search.query)).await;
            Ok(MessagesResponse::Messages(vec![FoundMessage {
                chat_id: 1,
                chat_title: "Chat".to_string(),
                message_id: 1,
                sender_id: None,
                timestamp: 1,
                text: search.query,
            }]))
        }

        async fn search_peers(&self, search: PeerSearch) -> Result<PeersResponse, BackendError> {
            self.peer_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay(&search.query)).await;
            Ok(PeersResponse {
                my_results: vec![FoundPeer {
                    peer_id: 2,
                    title: search.query,
                    username: None,
                    kind: ChatKind::User,
                }],
                results: Vec::new(),
            })
        }
    }

    async fn wait_until(
        rx: &mut watch::Receiver<SearchSnapshot>,
        condition: impl FnMut(&SearchSnapshot) -> bool,
    ) -> SearchSnapshot {
        let snapshot = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(condition))
            .await
            .expect("timed out waiting for snapshot")
            .expect("session closed");
        (*snapshot).clone()
    }

    fn settled_on(snapshot: &SearchSnapshot, text: &str) -> bool {
        snapshot.query == text
            && !snapshot.is_loading()
            && snapshot.messages.first().is_some_and(|m| m.text == text)
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_is_debounced_into_one_request() {
        let backend = Arc::new(FakeBackend::default());
        let session = SearchSession::spawn(Arc::clone(&backend), &SearchConfig::default(), None);
        let mut rx = session.subscribe();

        for text in ["r", "ru", "rus", "rust"] {
            session
                .send(SessionCommand::FilterChanged(text.to_string()))
                .unwrap();
        }
        let snapshot = wait_until(&mut rx, |s| settled_on(s, "rust")).await;

        assert_eq!(snapshot.peers.my_results[0].title, "rust");
        assert_eq!(backend.message_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.peer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*backend.queries.lock().unwrap(), vec!["rust".to_string()]);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_query_is_served_without_backend_call() {
        let backend = Arc::new(FakeBackend::default());
        let session = SearchSession::spawn(Arc::clone(&backend), &SearchConfig::default(), None);
        let mut rx = session.subscribe();

        session
            .send(SessionCommand::FilterChanged("rust".to_string()))
            .unwrap();
        wait_until(&mut rx, |s| settled_on(s, "rust")).await;
        session
            .send(SessionCommand::FilterChanged("tokio".to_string()))
            .unwrap();
        wait_until(&mut rx, |s| settled_on(s, "tokio")).await;
        assert_eq!(backend.message_calls.load(Ordering::SeqCst), 2);

        session
            .send(SessionCommand::FilterChanged("rust".to_string()))
            .unwrap();
        let snapshot = wait_until(&mut rx, |s| settled_on(s, "rust")).await;
        assert_eq!(snapshot.peers.my_results[0].title, "rust");
        assert_eq!(backend.message_calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.peer_calls.load(Ordering::SeqCst), 2);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_query_never_shows() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_delay("slow", Duration::from_secs(5))
                .with_delay("fast", Duration::from_millis(100)),
        );
        let session = SearchSession::spawn(Arc::clone(&backend), &SearchConfig::default(), None);
        let mut rx = session.subscribe();

        session
            .send(SessionCommand::SetQuery(SearchQuery::global("slow")))
            .unwrap();
        session
            .send(SessionCommand::SetQuery(SearchQuery::global("fast")))
            .unwrap();
        wait_until(&mut rx, |s| settled_on(s, "fast")).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].text, "fast");
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_in_chat_uses_store_and_remembers_hashtags() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_chat(&ChatRow {
                chat_id: 5,
                title: "Rustaceans".to_string(),
                kind: ChatKind::Group,
                username: None,
                migrated_to: None,
                migrated_from: None,
                is_member: true,
                is_archived: false,
            })
            .unwrap();
        store
            .insert_messages_batch(&[
                MessageRow::new(5, 1, Some(9), 100, "new #release out"),
                MessageRow::new(5, 2, Some(9), 200, "lunch?"),
            ])
            .unwrap();
        let store = Arc::new(Mutex::new(store));
        let backend = Arc::new(StoreBackend::new(Arc::clone(&store)));
        let session =
            SearchSession::spawn(backend, &SearchConfig::default(), Some(Arc::clone(&store)));
        let mut rx = session.subscribe();

        session
            .send(SessionCommand::SearchInChat {
                text: "#release".to_string(),
                chat: Some(ChatRef::new(5, ChatKind::Group)),
            })
            .unwrap();
        let snapshot = wait_until(&mut rx, |s| s.primary.complete && !s.is_loading()).await;

        assert_eq!(snapshot.scope.chat_id(), Some(5));
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].message_id, 1);
        assert!(snapshot.peers.is_empty());
        assert_eq!(
            store.lock().unwrap().recent_hashtags(10).unwrap(),
            vec!["#release".to_string()]
        );
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_search_clears_snapshot() {
        let backend = Arc::new(FakeBackend::default());
        let session = SearchSession::spawn(backend, &SearchConfig::default(), None);
        let mut rx = session.subscribe();

        session
            .send(SessionCommand::SetQuery(SearchQuery::global("rust")))
            .unwrap();
        wait_until(&mut rx, |s| settled_on(s, "rust")).await;
        session.send(SessionCommand::CancelSearch).unwrap();
        let snapshot = wait_until(&mut rx, |s| s.query.is_empty()).await;
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.peers.is_empty());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let session = SearchSession::spawn(
            Arc::new(FakeBackend::default()),
            &SearchConfig::default(),
            None,
        );
        let mut rx = session.subscribe();
        session.shutdown().await;
        assert!(rx.changed().await.is_err());
    }
}
