use super::Store;

/// Most recent hashtags kept for suggestions.
pub const RECENT_HASHTAGS_LIMIT: usize = 64;

/// Hashtags appearing in `text`, lowercased, in order of first appearance.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for chunk in text.split_whitespace() {
        let Some(body) = chunk.strip_prefix('#') else {
            continue;
        };
        let name: String = body
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            continue;
        }
        let tag = format!("#{}", name.to_lowercase());
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

impl Store {
    /// Remember the hashtags of a submitted query. Returns how many were saved.
    pub fn save_recent_hashtags(&self, query: &str, now: i64) -> Result<usize, sqlite::Error> {
        let tags = extract_hashtags(query);
        if tags.is_empty() {
            return Ok(0);
        }
        self.conn.execute("BEGIN")?;
        let result = (|| -> Result<(), sqlite::Error> {
            for tag in &tags {
                let mut stmt = self.conn.prepare(
                    "INSERT INTO recent_hashtags (tag, last_used, uses) VALUES (?, ?, 1)
                     ON CONFLICT(tag) DO UPDATE SET
                        last_used = excluded.last_used,
                        uses = uses + 1",
                )?;
                stmt.bind((1, tag.as_str()))?;
                stmt.bind((2, now))?;
                stmt.next()?;
            }
            let mut stmt = self.conn.prepare(
                "DELETE FROM recent_hashtags WHERE tag NOT IN (
                    SELECT tag FROM recent_hashtags ORDER BY last_used DESC, tag ASC LIMIT ?
                 )",
            )?;
            stmt.bind((1, RECENT_HASHTAGS_LIMIT as i64))?;
            stmt.next()?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute("COMMIT")?;
                Ok(tags.len())
            }
            Err(e) => {
                self.conn.execute("ROLLBACK").ok();
                Err(e)
            }
        }
    }

    pub fn recent_hashtags(&self, limit: usize) -> Result<Vec<String>, sqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT tag FROM recent_hashtags ORDER BY last_used DESC, tag ASC LIMIT ?",
        )?;
        stmt.bind((1, limit as i64))?;
        let mut tags = Vec::new();
        while let Ok(sqlite::State::Row) = stmt.next() {
            tags.push(stmt.read::<String, _>(0)?);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hashtags() {
        assert_eq!(
            extract_hashtags("#Rust and #tokio, #rust again #"),
            vec!["#rust", "#tokio"]
        );
        assert_eq!(extract_hashtags("#한국어 뉴스"), vec!["#한국어"]);
        assert!(extract_hashtags("no tags here").is_empty());
    }

    #[test]
    fn test_save_and_list_recent() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.save_recent_hashtags("#a #b", 100).unwrap(), 2);
        assert_eq!(store.save_recent_hashtags("#c", 200).unwrap(), 1);
        assert_eq!(store.save_recent_hashtags("plain", 300).unwrap(), 0);
        store.save_recent_hashtags("#a", 400).unwrap();

        assert_eq!(store.recent_hashtags(10).unwrap(), vec!["#a", "#c", "#b"]);
        assert_eq!(store.recent_hashtags(1).unwrap(), vec!["#a"]);
    }

    #[test]
    fn test_recent_hashtags_capped() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..(RECENT_HASHTAGS_LIMIT + 6) {
            store
                .save_recent_hashtags(&format!("#tag{}", i), i as i64)
                .unwrap();
        }
        let tags = store.recent_hashtags(1000).unwrap();
        assert_eq!(tags.len(), RECENT_HASHTAGS_LIMIT);
        assert_eq!(tags[0], format!("#tag{}", RECENT_HASHTAGS_LIMIT + 5));
        assert!(!tags.contains(&"#tag0".to_string()));
    }
}
