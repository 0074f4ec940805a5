use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Context, Result};

/// Bumped whenever the DDL below changes shape
pub const SCHEMA_VERSION: i32 = 1;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("read schema version")?;

    if version >= SCHEMA_VERSION {
        debug!("Schema already at version {}", version);
        return Ok(());
    }

    conn.execute_batch("
        CREATE TABLE IF NOT EXISTS accounts (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL,
            name            TEXT,
            color           TEXT,
            enabled         INTEGER NOT NULL DEFAULT 1,
            retention_days  INTEGER,
            created_at      INTEGER NOT NULL    -- unix epoch ms
        );

        -- Counters are owned by the triggers further down; nothing else writes them
        -- except recount_folder.
        CREATE TABLE IF NOT EXISTS folders (
            id              TEXT PRIMARY KEY,
            account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            folder_type     TEXT NOT NULL DEFAULT 'other',
            unread_count    INTEGER NOT NULL DEFAULT 0,
            total_count     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_folders_account ON folders(account_id, folder_type);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,  -- stable rowid for FTS
            id              TEXT NOT NULL UNIQUE,               -- UUID
            account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            folder_id       TEXT NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
            uid             INTEGER NOT NULL,

            message_id          TEXT,
            message_id_norm     TEXT,           -- brackets/whitespace stripped
            in_reply_to         TEXT,
            in_reply_to_norm    TEXT,
            references_ids      TEXT NOT NULL DEFAULT '[]',     -- JSON array
            thread_id           TEXT,

            subject         TEXT,
            from_name       TEXT,
            from_email      TEXT,
            to_addresses    TEXT NOT NULL DEFAULT '[]',         -- JSON array
            cc_addresses    TEXT NOT NULL DEFAULT '[]',
            bcc_addresses   TEXT NOT NULL DEFAULT '[]',
            reply_to        TEXT NOT NULL DEFAULT '[]',
            date            INTEGER,                            -- unix epoch ms
            snippet         TEXT,

            is_read         INTEGER NOT NULL DEFAULT 0,
            is_starred      INTEGER NOT NULL DEFAULT 0,
            is_answered     INTEGER NOT NULL DEFAULT 0,
            is_forwarded    INTEGER NOT NULL DEFAULT 0,
            is_draft        INTEGER NOT NULL DEFAULT 0,
            is_deleted      INTEGER NOT NULL DEFAULT 0,

            size            INTEGER NOT NULL DEFAULT 0,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            body_text       TEXT,
            body_html       TEXT,
            body_fetched    INTEGER NOT NULL DEFAULT 0,

            read_receipt_to         TEXT,
            read_receipt_handled    INTEGER NOT NULL DEFAULT 0,

            smime_status            TEXT,
            smime_signer_email      TEXT,
            smime_signer_subject    TEXT,
            smime_encrypted         INTEGER NOT NULL DEFAULT 0,
            smime_raw_body          BLOB,

            pgp_status              TEXT,
            pgp_signer_email        TEXT,
            pgp_signer_key_id       TEXT,
            pgp_encrypted           INTEGER NOT NULL DEFAULT 0,
            pgp_raw_body            BLOB,

            received_at     INTEGER NOT NULL,                   -- unix epoch ms

            UNIQUE(folder_id, uid)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_folder_date ON messages(folder_id, date);
        CREATE INDEX IF NOT EXISTS idx_messages_thread      ON messages(account_id, thread_id);
        CREATE INDEX IF NOT EXISTS idx_messages_message_id  ON messages(account_id, message_id_norm);
        CREATE INDEX IF NOT EXISTS idx_messages_in_reply_to ON messages(account_id, in_reply_to_norm);
        CREATE INDEX IF NOT EXISTS idx_messages_retention   ON messages(account_id, date);

        -- Folder counters: only live (not deleted-flagged) rows count.
        CREATE TRIGGER IF NOT EXISTS messages_counts_ai AFTER INSERT ON messages BEGIN
            UPDATE folders SET
                total_count  = total_count + (new.is_deleted = 0),
                unread_count = unread_count + (new.is_deleted = 0 AND new.is_read = 0)
            WHERE id = new.folder_id;
        END;

        CREATE TRIGGER IF NOT EXISTS messages_counts_ad AFTER DELETE ON messages BEGIN
            UPDATE folders SET
                total_count  = MAX(0, total_count - (old.is_deleted = 0)),
                unread_count = MAX(0, unread_count - (old.is_deleted = 0 AND old.is_read = 0))
            WHERE id = old.folder_id;
        END;

        CREATE TRIGGER IF NOT EXISTS messages_counts_au
        AFTER UPDATE OF is_read, is_deleted, folder_id ON messages BEGIN
            UPDATE folders SET
                total_count  = MAX(0, total_count - (old.is_deleted = 0)),
                unread_count = MAX(0, unread_count - (old.is_deleted = 0 AND old.is_read = 0))
            WHERE id = old.folder_id;
            UPDATE folders SET
                total_count  = total_count + (new.is_deleted = 0),
                unread_count = unread_count + (new.is_deleted = 0 AND new.is_read = 0)
            WHERE id = new.folder_id;
        END;

        -- Full-text index over the searchable columns
        CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            subject,
            from_name,
            from_email,
            snippet,
            body_text,
            content = 'messages',
            content_rowid = 'seq'
        );

        CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
            INSERT INTO messages_fts(rowid, subject, from_name, from_email, snippet, body_text)
            VALUES (new.seq, new.subject, new.from_name, new.from_email, new.snippet, new.body_text);
        END;

        CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, subject, from_name, from_email, snippet, body_text)
            VALUES ('delete', old.seq, old.subject, old.from_name, old.from_email, old.snippet, old.body_text);
        END;

        CREATE TRIGGER IF NOT EXISTS messages_fts_au
        AFTER UPDATE OF subject, from_name, from_email, snippet, body_text ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, subject, from_name, from_email, snippet, body_text)
            VALUES ('delete', old.seq, old.subject, old.from_name, old.from_email, old.snippet, old.body_text);
            INSERT INTO messages_fts(rowid, subject, from_name, from_email, snippet, body_text)
            VALUES (new.seq, new.subject, new.from_name, new.from_email, new.snippet, new.body_text);
        END;
    ").context("initialize schema")?;

    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
        .context("write schema version")?;

    info!("Initialized mail store schema (version {})", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().expect("Failed to open database");
        initialize_schema(&conn).expect("Failed to initialize schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"folders".to_string()));
        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"messages_fts".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("Failed to open database");
        initialize_schema(&conn).expect("Failed first init");
        initialize_schema(&conn).expect("Failed second init");

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
