use serde::{Deserialize, Serialize};

use crate::search::{ChatId, ChatKind, ChatRef, FoundPeer};

use super::{optional_int, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRow {
    pub chat_id: ChatId,
    pub title: String,
    pub kind: ChatKind,
    pub username: Option<String>,
    pub migrated_to: Option<ChatId>,
    pub migrated_from: Option<ChatId>,
    /// False for public peers known only from search.
    pub is_member: bool,
    pub is_archived: bool,
}

impl ChatRow {
    pub fn chat_ref(&self) -> ChatRef {
        ChatRef {
            id: self.chat_id,
            kind: self.kind,
            migrated_from: self.migrated_from,
            migrated_to: self.migrated_to,
        }
    }

    pub fn found_peer(&self) -> FoundPeer {
        FoundPeer {
            peer_id: self.chat_id,
            title: self.title.clone(),
            username: self.username.clone(),
            kind: self.kind,
        }
    }
}

const CHAT_COLUMNS: &str =
    "chat_id, title, kind, username, migrated_to, migrated_from, is_member, is_archived";

impl Store {
    pub fn upsert_chat(&self, chat: &ChatRow) -> Result<(), sqlite::Error> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO chats (chat_id, title, kind, username, migrated_to, migrated_from, is_member, is_archived)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(chat_id) DO UPDATE SET
                title = excluded.title,
                kind = excluded.kind,
                username = excluded.username,
                migrated_to = excluded.migrated_to,
                migrated_from = excluded.migrated_from,
                is_member = excluded.is_member,
                is_archived = excluded.is_archived",
        )?;
        stmt.bind((1, chat.chat_id))?;
        stmt.bind((2, chat.title.as_str()))?;
        stmt.bind((3, chat.kind.as_str()))?;
        match &chat.username {
            Some(u) => stmt.bind((4, u.as_str()))?,
            None => stmt.bind((4, sqlite::Value::Null))?,
        };
        stmt.bind((5, optional_int(chat.migrated_to)))?;
        stmt.bind((6, optional_int(chat.migrated_from)))?;
        stmt.bind((7, chat.is_member as i64))?;
        stmt.bind((8, chat.is_archived as i64))?;
        stmt.next()?;
        Ok(())
    }

    pub fn get_chat(&self, chat_id: ChatId) -> Result<Option<ChatRow>, sqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(format!("SELECT {} FROM chats WHERE chat_id = ?", CHAT_COLUMNS))?;
        stmt.bind((1, chat_id))?;
        if let Ok(sqlite::State::Row) = stmt.next() {
            Ok(Some(read_chat_row(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// Chats the user is in (`true`) or public peers they are not in (`false`).
    pub fn get_chats_by_membership(&self, is_member: bool) -> Result<Vec<ChatRow>, sqlite::Error> {
        let mut stmt = self.conn.prepare(format!(
            "SELECT {} FROM chats WHERE is_member = ? ORDER BY title",
            CHAT_COLUMNS
        ))?;
        stmt.bind((1, is_member as i64))?;
        let mut results = Vec::new();
        while let Ok(sqlite::State::Row) = stmt.next() {
            results.push(read_chat_row(&stmt)?);
        }
        Ok(results)
    }

    /// Record that a legacy group was upgraded into `to`.
    pub fn set_migration(&self, from: ChatId, to: ChatId) -> Result<(), sqlite::Error> {
        self.conn.execute("BEGIN")?;
        let result = (|| -> Result<(), sqlite::Error> {
            let mut stmt = self
                .conn
                .prepare("UPDATE chats SET migrated_to = ? WHERE chat_id = ?")?;
            stmt.bind((1, to))?;
            stmt.bind((2, from))?;
            stmt.next()?;
            let mut stmt = self
                .conn
                .prepare("UPDATE chats SET migrated_from = ? WHERE chat_id = ?")?;
            stmt.bind((1, from))?;
            stmt.bind((2, to))?;
            stmt.next()?;
            Ok(())
        })();
        match result {
            Ok(()) => self.conn.execute("COMMIT"),
            Err(e) => {
                self.conn.execute("ROLLBACK").ok();
                Err(e)
            }
        }
    }

    pub fn set_chat_archived(&self, chat_id: ChatId, archived: bool) -> Result<(), sqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("UPDATE chats SET is_archived = ? WHERE chat_id = ?")?;
        stmt.bind((1, archived as i64))?;
        stmt.bind((2, chat_id))?;
        stmt.next()?;
        Ok(())
    }

    pub fn chat_count(&self) -> Result<i64, sqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM chats")?;
        stmt.next()?;
        stmt.read::<i64, _>(0)
    }
}

fn read_chat_row(stmt: &sqlite::Statement) -> Result<ChatRow, sqlite::Error> {
    let kind = stmt.read::<String, _>("kind")?;
    Ok(ChatRow {
        chat_id: stmt.read::<i64, _>("chat_id")?,
        title: stmt.read::<String, _>("title")?,
        // The CHECK constraint keeps unknown kinds out of the table.
        kind: ChatKind::parse(&kind).unwrap_or(ChatKind::Group),
        username: stmt.read::<Option<String>, _>("username")?,
        migrated_to: stmt.read::<Option<i64>, _>("migrated_to")?,
        migrated_from: stmt.read::<Option<i64>, _>("migrated_from")?,
        is_member: stmt.read::<i64, _>("is_member")? != 0,
        is_archived: stmt.read::<i64, _>("is_archived")? != 0,
    })
}
