use std::collections::HashMap;

use super::{Lane, RequestId};

/// First-page responses keyed by the exact query text that produced them.
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> ResultCache<T> {
    pub fn get(&self, query: &str) -> Option<T> {
        self.entries.get(query).cloned()
    }

    pub fn insert(&mut self, query: String, page: T) {
        self.entries.insert(query, page);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The query a request was sent for, so a late response can still be cached
/// under the right text after the active query has moved on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub query: String,
    pub lane: Lane,
    pub first_page: bool,
}

#[derive(Debug, Default)]
pub struct PendingQueries {
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingQueries {
    pub fn insert(&mut self, id: RequestId, request: PendingRequest) {
        self.entries.insert(id, request);
    }

    pub fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_exact_match_only() {
        let mut cache = ResultCache::default();
        cache.insert("abc".to_string(), 1);
        assert_eq!(cache.get("abc"), Some(1));
        assert_eq!(cache.get("ab"), None);
        assert_eq!(cache.get("ABC"), None);
    }

    #[test]
    fn test_cache_overwrites_and_clears() {
        let mut cache = ResultCache::default();
        cache.insert("abc".to_string(), 1);
        cache.insert("abc".to_string(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("abc"), Some(2));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_pending_take_removes() {
        let mut pending = PendingQueries::default();
        let request = PendingRequest {
            query: "abc".to_string(),
            lane: Lane::Primary,
            first_page: true,
        };
        pending.insert(RequestId(1), request.clone());
        assert!(pending.contains(RequestId(1)));
        assert_eq!(pending.take(RequestId(1)), Some(request));
        assert_eq!(pending.take(RequestId(1)), None);
        assert!(pending.is_empty());
    }
}
