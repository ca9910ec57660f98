use std::sync::{Arc, Mutex, MutexGuard};

use unicode_segmentation::UnicodeSegmentation;

use crate::search::ChatKind;
use crate::store::chat::ChatRow;
use crate::store::message::{GlobalOffset, TextMatch};
use crate::store::Store;

use super::{BackendError, MessageSearch, MessagesResponse, PeerSearch, PeersResponse, SearchBackend};

/// Answers searches from the local message store.
#[derive(Clone)]
pub struct StoreBackend {
    store: Arc<Mutex<Store>>,
}

impl StoreBackend {
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, BackendError> {
        self.store
            .lock()
            .map_err(|e| BackendError::Storage(e.to_string()))
    }

    fn find_messages(&self, search: &MessageSearch) -> Result<MessagesResponse, BackendError> {
        let store = self.lock()?;
        let text = TextMatch::new(&search.query);
        match search.chat {
            None => global_page(&store, &text, search),
            Some(chat_id) => {
                let chat = store.get_chat(chat_id)?.ok_or_else(|| BackendError::Rpc {
                    code: 400,
                    name: "PEER_ID_INVALID".to_string(),
                })?;
                let offset_id = search.offset.message_id;
                let messages =
                    store.search_in_chat(chat_id, &text, search.from, offset_id, search.limit)?;
                let count = store.count_in_chat(chat_id, &text, search.from)?;

                if chat.kind.is_channel_backed() {
                    Ok(MessagesResponse::ChannelMessages {
                        messages,
                        count,
                        pts: 0,
                    })
                } else if offset_id == 0 && messages.len() == count {
                    Ok(MessagesResponse::Messages(messages))
                } else {
                    Ok(MessagesResponse::Slice {
                        messages,
                        count,
                        next_rate: None,
                    })
                }
            }
        }
    }

    fn find_peers(&self, search: &PeerSearch) -> Result<PeersResponse, BackendError> {
        let store = self.lock()?;
        let words: Vec<String> = search
            .query
            .unicode_words()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Ok(PeersResponse::default());
        }

        let my_results = store
            .get_chats_by_membership(true)?
            .iter()
            .filter(|chat| chat_matches(chat, &words))
            .take(search.limit)
            .map(ChatRow::found_peer)
            .collect();
        let results = store
            .get_chats_by_membership(false)?
            .iter()
            .filter(|chat| username_matches(chat, &words))
            .take(search.limit)
            .map(ChatRow::found_peer)
            .collect();
        Ok(PeersResponse {
            my_results,
            results,
        })
    }
}

impl SearchBackend for StoreBackend {
    async fn search_messages(&self, search: MessageSearch) -> Result<MessagesResponse, BackendError> {
        self.find_messages(&search)
    }

    async fn search_peers(&self, search: PeerSearch) -> Result<PeersResponse, BackendError> {
        self.find_peers(&search)
    }
}

/// One more row than asked for tells whether another page exists. The rate
/// handed back is a page counter; the keyset position comes from the
/// offset message itself, so pages sharing a timestamp still advance.
fn global_page(
    store: &Store,
    text: &TextMatch,
    search: &MessageSearch,
) -> Result<MessagesResponse, BackendError> {
    let after = if search.offset.is_start() {
        None
    } else {
        let anchor = match search.offset.peer {
            Some(chat_id) => store.get_message(chat_id, search.offset.message_id)?,
            None => None,
        };
        let anchor = anchor.ok_or_else(|| BackendError::Rpc {
            code: 400,
            name: "SEARCH_OFFSET_INVALID".to_string(),
        })?;
        Some(GlobalOffset::from(&anchor))
    };
    let mut messages = store.search_global(text, search.skip_archive, after, search.limit + 1)?;
    let more = messages.len() > search.limit;
    messages.truncate(search.limit);
    let count = store.count_global(text, search.skip_archive)?;
    let next_rate = more.then_some(search.offset.rate + 1);
    Ok(MessagesResponse::Slice {
        messages,
        count,
        next_rate,
    })
}

/// Every query word starts some word of the title or the username.
fn chat_matches(chat: &ChatRow, words: &[String]) -> bool {
    let title = chat.title.to_lowercase();
    let title_words: Vec<&str> = title.unicode_words().collect();
    let username = chat.username.as_deref().map(str::to_lowercase);
    words.iter().all(|word| {
        title_words.iter().any(|t| t.starts_with(word.as_str()))
            || username.as_deref().is_some_and(|u| u.starts_with(word.as_str()))
    })
}

/// Public peers are found by username only, and never private chats.
fn username_matches(chat: &ChatRow, words: &[String]) -> bool {
    if chat.kind == ChatKind::Group {
        return false;
    }
    let Some(username) = chat.username.as_deref().map(str::to_lowercase) else {
        return false;
    };
    let joined: String = words.concat();
    username.starts_with(&joined)
}
