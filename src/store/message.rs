use serde::{Deserialize, Serialize};

use crate::search::{ChatId, FoundMessage, MessageId, PeerId};

use super::{bind_all, optional_int, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender_id: Option<PeerId>,
    pub timestamp: i64,
    pub text_plain: String,
    pub text_stripped: String,
}

impl MessageRow {
    pub fn new(
        chat_id: ChatId,
        message_id: MessageId,
        sender_id: Option<PeerId>,
        timestamp: i64,
        text: &str,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            sender_id,
            timestamp,
            text_plain: text.to_string(),
            text_stripped: strip_whitespace(text),
        }
    }
}

pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Substring patterns for one query: as typed, and with whitespace removed so
/// "삼성 전자" also finds "삼성전자".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    plain: String,
    stripped: String,
}

impl TextMatch {
    pub fn new(query: &str) -> Self {
        let query = query.trim();
        Self {
            plain: like_pattern(query),
            stripped: like_pattern(&strip_whitespace(query)),
        }
    }

    fn clause(&self, values: &mut Vec<sqlite::Value>) -> &'static str {
        values.push(sqlite::Value::String(self.plain.clone()));
        values.push(sqlite::Value::String(self.stripped.clone()));
        r"(m.text_plain LIKE ? ESCAPE '\' OR m.text_stripped LIKE ? ESCAPE '\')"
    }
}

/// Position of the last row of a global page in (timestamp, chat_id, message_id) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalOffset {
    pub timestamp: i64,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl From<&MessageRow> for GlobalOffset {
    fn from(row: &MessageRow) -> Self {
        Self {
            timestamp: row.timestamp,
            chat_id: row.chat_id,
            message_id: row.message_id,
        }
    }
}

fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const FOUND_COLUMNS: &str =
    "m.chat_id, m.message_id, m.sender_id, m.timestamp, m.text_plain, c.title";

impl Store {
    pub fn insert_messages_batch(&self, messages: &[MessageRow]) -> Result<(), sqlite::Error> {
        self.conn.execute("BEGIN")?;
        for msg in messages {
            let mut stmt = self.conn.prepare(
                "INSERT OR IGNORE INTO messages (chat_id, message_id, sender_id, timestamp, text_plain, text_stripped)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            stmt.bind((1, msg.chat_id))?;
            stmt.bind((2, msg.message_id))?;
            stmt.bind((3, optional_int(msg.sender_id)))?;
            stmt.bind((4, msg.timestamp))?;
            stmt.bind((5, msg.text_plain.as_str()))?;
            stmt.bind((6, msg.text_stripped.as_str()))?;
            if let Err(e) = stmt.next() {
                drop(stmt);
                self.conn.execute("ROLLBACK").ok();
                return Err(e);
            }
        }
        self.conn.execute("COMMIT")?;
        Ok(())
    }

    pub fn get_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<MessageRow>, sqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT chat_id, message_id, sender_id, timestamp, text_plain, text_stripped
             FROM messages WHERE chat_id = ? AND message_id = ?",
        )?;
        stmt.bind((1, chat_id))?;
        stmt.bind((2, message_id))?;
        if let Ok(sqlite::State::Row) = stmt.next() {
            Ok(Some(MessageRow {
                chat_id: stmt.read::<i64, _>(0)?,
                message_id: stmt.read::<i64, _>(1)?,
                sender_id: stmt.read::<Option<i64>, _>(2)?,
                timestamp: stmt.read::<i64, _>(3)?,
                text_plain: stmt.read::<String, _>(4)?,
                text_stripped: stmt.read::<String, _>(5)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Matches across all chats, newest first, strictly after `after` when given.
    pub fn search_global(
        &self,
        text: &TextMatch,
        skip_archive: bool,
        after: Option<GlobalOffset>,
        limit: usize,
    ) -> Result<Vec<FoundMessage>, sqlite::Error> {
        let mut values = Vec::new();
        let mut filter = global_filter(text, skip_archive, &mut values);
        if let Some(o) = after {
            filter.push_str(
                " AND (m.timestamp < ?
                  OR (m.timestamp = ? AND m.chat_id > ?)
                  OR (m.timestamp = ? AND m.chat_id = ? AND m.message_id > ?))",
            );
            values.extend([
                sqlite::Value::Integer(o.timestamp),
                sqlite::Value::Integer(o.timestamp),
                sqlite::Value::Integer(o.chat_id),
                sqlite::Value::Integer(o.timestamp),
                sqlite::Value::Integer(o.chat_id),
                sqlite::Value::Integer(o.message_id),
            ]);
        }
        values.push(sqlite::Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {} FROM messages m
             JOIN chats c ON m.chat_id = c.chat_id
             WHERE {}
             ORDER BY m.timestamp DESC, m.chat_id ASC, m.message_id ASC
             LIMIT ?",
            FOUND_COLUMNS, filter
        );
        self.query_found(&sql, &values)
    }

    pub fn count_global(&self, text: &TextMatch, skip_archive: bool) -> Result<usize, sqlite::Error> {
        let mut values = Vec::new();
        let filter = global_filter(text, skip_archive, &mut values);
        let sql = format!(
            "SELECT COUNT(*) FROM messages m JOIN chats c ON m.chat_id = c.chat_id WHERE {}",
            filter
        );
        self.query_count(&sql, &values)
    }

    /// Matches in one chat, highest message id first, below `offset_id` when non-zero.
    pub fn search_in_chat(
        &self,
        chat_id: ChatId,
        text: &TextMatch,
        from: Option<PeerId>,
        offset_id: MessageId,
        limit: usize,
    ) -> Result<Vec<FoundMessage>, sqlite::Error> {
        let mut values = Vec::new();
        let mut filter = chat_filter(chat_id, text, from, &mut values);
        if offset_id > 0 {
            filter.push_str(" AND m.message_id < ?");
            values.push(sqlite::Value::Integer(offset_id));
        }
        values.push(sqlite::Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {} FROM messages m
             JOIN chats c ON m.chat_id = c.chat_id
             WHERE {}
             ORDER BY m.message_id DESC
             LIMIT ?",
            FOUND_COLUMNS, filter
        );
        self.query_found(&sql, &values)
    }

    pub fn count_in_chat(
        &self,
        chat_id: ChatId,
        text: &TextMatch,
        from: Option<PeerId>,
    ) -> Result<usize, sqlite::Error> {
        let mut values = Vec::new();
        let filter = chat_filter(chat_id, text, from, &mut values);
        let sql = format!(
            "SELECT COUNT(*) FROM messages m JOIN chats c ON m.chat_id = c.chat_id WHERE {}",
            filter
        );
        self.query_count(&sql, &values)
    }

    pub fn message_count(&self) -> Result<i64, sqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM messages")?;
        stmt.next()?;
        stmt.read::<i64, _>(0)
    }

    fn query_found(
        &self,
        sql: &str,
        values: &[sqlite::Value],
    ) -> Result<Vec<FoundMessage>, sqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        bind_all(&mut stmt, values)?;
        let mut results = Vec::new();
        while let Ok(sqlite::State::Row) = stmt.next() {
            results.push(FoundMessage {
                chat_id: stmt.read::<i64, _>(0)?,
                message_id: stmt.read::<i64, _>(1)?,
                sender_id: stmt.read::<Option<i64>, _>(2)?,
                timestamp: stmt.read::<i64, _>(3)?,
                text: stmt.read::<String, _>(4)?,
                chat_title: stmt.read::<String, _>(5)?,
            });
        }
        Ok(results)
    }

    fn query_count(&self, sql: &str, values: &[sqlite::Value]) -> Result<usize, sqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        bind_all(&mut stmt, values)?;
        stmt.next()?;
        Ok(stmt.read::<i64, _>(0)?.max(0) as usize)
    }
}

fn global_filter(text: &TextMatch, skip_archive: bool, values: &mut Vec<sqlite::Value>) -> String {
    let mut filter = text.clause(values).to_string();
    if skip_archive {
        filter.push_str(" AND c.is_archived = 0");
    }
    filter
}

fn chat_filter(
    chat_id: ChatId,
    text: &TextMatch,
    from: Option<PeerId>,
    values: &mut Vec<sqlite::Value>,
) -> String {
    values.push(sqlite::Value::Integer(chat_id));
    let mut filter = format!("m.chat_id = ? AND {}", text.clause(values));
    if let Some(sender) = from {
        filter.push_str(" AND m.sender_id = ?");
        values.push(sqlite::Value::Integer(sender));
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ChatKind;
    use crate::store::chat::ChatRow;

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn setup_chat(store: &Store, chat_id: ChatId, archived: bool) {
        store
            .upsert_chat(&ChatRow {
                chat_id,
                title: format!("Chat {}", chat_id),
                kind: ChatKind::Megagroup,
                username: None,
                migrated_to: None,
                migrated_from: None,
                is_member: true,
                is_archived: archived,
            })
            .unwrap();
    }

    fn insert(store: &Store, chat_id: ChatId, msg_id: MessageId, ts: i64, text: &str) {
        store
            .insert_messages_batch(&[MessageRow::new(chat_id, msg_id, Some(chat_id * 10), ts, text)])
            .unwrap();
    }

    #[test]
    fn test_insert_and_get() {
        let store = test_store();
        setup_chat(&store, 1, false);
        insert(&store, 1, 100, 1000, "hello world");

        let fetched = store.get_message(1, 100).unwrap().unwrap();
        assert_eq!(fetched.text_plain, "hello world");
        assert_eq!(fetched.text_stripped, "helloworld");
        assert_eq!(fetched.sender_id, Some(10));
    }

    #[test]
    fn test_duplicate_insert_ignored() {
        let store = test_store();
        setup_chat(&store, 1, false);
        insert(&store, 1, 100, 1000, "hello");
        insert(&store, 1, 100, 1000, "hello");
        assert_eq!(store.message_count().unwrap(), 1);
    }

    #[test]
    fn test_strip_whitespace() {
        assert_eq!(strip_whitespace("삼성 전자 주가"), "삼성전자주가");
        assert_eq!(strip_whitespace("  spaces  "), "spaces");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
    }

    #[test]
    fn test_search_matches_spacing_variants() {
        let store = test_store();
        setup_chat(&store, 1, false);
        insert(&store, 1, 1, 1000, "삼성전자 주가가 상승했다");

        let found = store
            .search_global(&TextMatch::new("삼성 전자"), false, None, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chat_title, "Chat 1");
    }

    #[test]
    fn test_search_is_ascii_case_insensitive() {
        let store = test_store();
        setup_chat(&store, 1, false);
        insert(&store, 1, 1, 1000, "Hello World");
        let found = store
            .search_global(&TextMatch::new("hello"), false, None, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_global_pagination_with_cursor() {
        let store = test_store();
        setup_chat(&store, 1, false);
        setup_chat(&store, 2, false);
        insert(&store, 1, 1, 1000, "test a");
        insert(&store, 2, 1, 1000, "test b");
        insert(&store, 1, 2, 2000, "test c");
        insert(&store, 2, 2, 500, "test d");

        let text = TextMatch::new("test");
        let page1 = store.search_global(&text, false, None, 2).unwrap();
        assert_eq!(
            page1.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["test c", "test a"]
        );

        let last = page1.last().unwrap();
        let anchor = store.get_message(last.chat_id, last.message_id).unwrap().unwrap();
        let page2 = store
            .search_global(&text, false, Some(GlobalOffset::from(&anchor)), 2)
            .unwrap();
        assert_eq!(
            page2.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["test b", "test d"]
        );
        assert_eq!(store.count_global(&text, false).unwrap(), 4);
    }

    #[test]
    fn test_global_pagination_through_equal_timestamps() {
        let store = test_store();
        setup_chat(&store, 1, false);
        for id in 1..=7 {
            insert(&store, 1, id, 1000, "same second");
        }

        let text = TextMatch::new("same");
        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = store.search_global(&text, false, after, 3).unwrap();
            let Some(last) = page.last() else {
                break;
            };
            after = Some(GlobalOffset {
                timestamp: last.timestamp,
                chat_id: last.chat_id,
                message_id: last.message_id,
            });
            seen.extend(page.iter().map(|m| m.message_id));
        }
        assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_global_skips_archived_chats() {
        let store = test_store();
        setup_chat(&store, 1, false);
        setup_chat(&store, 2, true);
        insert(&store, 1, 1, 1000, "news");
        insert(&store, 2, 1, 1000, "news");

        let text = TextMatch::new("news");
        assert_eq!(store.search_global(&text, true, None, 10).unwrap().len(), 1);
        assert_eq!(store.search_global(&text, false, None, 10).unwrap().len(), 2);
        assert_eq!(store.count_global(&text, true).unwrap(), 1);
    }

    #[test]
    fn test_in_chat_offset_and_sender() {
        let store = test_store();
        setup_chat(&store, 1, false);
        for id in 1..=5 {
            insert(&store, 1, id, 1000 + id, "report");
        }
        store
            .insert_messages_batch(&[MessageRow::new(1, 6, Some(99), 2000, "report")])
            .unwrap();

        let text = TextMatch::new("report");
        let page = store.search_in_chat(1, &text, None, 0, 3).unwrap();
        assert_eq!(
            page.iter().map(|m| m.message_id).collect::<Vec<_>>(),
            vec![6, 5, 4]
        );
        let next = store.search_in_chat(1, &text, None, 4, 3).unwrap();
        assert_eq!(
            next.iter().map(|m| m.message_id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );

        let from = store.search_in_chat(1, &text, Some(99), 0, 10).unwrap();
        assert_eq!(from.len(), 1);
        assert_eq!(store.count_in_chat(1, &text, Some(10)).unwrap(), 5);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let store = test_store();
        setup_chat(&store, 1, false);
        insert(&store, 1, 1, 1000, "anything");
        insert(&store, 1, 2, 1001, "else");
        assert_eq!(
            store.count_in_chat(1, &TextMatch::new(""), None).unwrap(),
            2
        );
    }
}
