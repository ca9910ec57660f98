use sqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<(), sqlite::Error> {
    conn.execute(
        "
        CREATE TABLE IF NOT EXISTS chats (
            chat_id       INTEGER PRIMARY KEY,
            title         TEXT NOT NULL,
            kind          TEXT NOT NULL CHECK (kind IN ('user', 'group', 'megagroup', 'channel')),
            username      TEXT,
            migrated_to   INTEGER,
            migrated_from INTEGER,
            is_member     INTEGER NOT NULL DEFAULT 1,
            is_archived   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS messages (
            chat_id       INTEGER NOT NULL,
            message_id    INTEGER NOT NULL,
            sender_id     INTEGER,
            timestamp     INTEGER NOT NULL,
            text_plain    TEXT NOT NULL,
            text_stripped TEXT NOT NULL,
            PRIMARY KEY (chat_id, message_id),
            FOREIGN KEY (chat_id) REFERENCES chats(chat_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_timestamp
            ON messages (timestamp DESC, chat_id, message_id);
        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages (chat_id, sender_id, message_id DESC);

        CREATE TABLE IF NOT EXISTS app_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recent_hashtags (
            tag        TEXT PRIMARY KEY,
            last_used  INTEGER NOT NULL,
            uses       INTEGER NOT NULL DEFAULT 1
        );
        ",
    )
}
