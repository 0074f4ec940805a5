use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use super::{from_millis, placeholders, to_millis};
use crate::error::{Context, Result};
use crate::helpers::message_id::normalize_opt;
use crate::types::{
    Address, Message, MessageFlags, MessageHeader, Page, PgpInfo, SmimeInfo, SortOrder,
};

/// Every persisted column except `id` and `seq`, in bind order
pub(crate) const WRITE_COLUMNS: &[&str] = &[
    "account_id", "folder_id", "uid",
    "message_id", "message_id_norm", "in_reply_to", "in_reply_to_norm", "references_ids",
    "thread_id",
    "subject", "from_name", "from_email",
    "to_addresses", "cc_addresses", "bcc_addresses", "reply_to",
    "date", "snippet",
    "is_read", "is_starred", "is_answered", "is_forwarded", "is_draft", "is_deleted",
    "size", "has_attachments",
    "body_text", "body_html", "body_fetched",
    "read_receipt_to", "read_receipt_handled",
    "smime_status", "smime_signer_email", "smime_signer_subject", "smime_encrypted",
    "smime_raw_body",
    "pgp_status", "pgp_signer_email", "pgp_signer_key_id", "pgp_encrypted", "pgp_raw_body",
    "received_at",
];

/// Columns read back into a [`Message`], matching `row_to_message`
const MESSAGE_COLUMNS: &str = "id, account_id, folder_id, uid,
    message_id, in_reply_to, references_ids, thread_id,
    subject, from_name, from_email, to_addresses, cc_addresses, bcc_addresses, reply_to,
    date, snippet,
    is_read, is_starred, is_answered, is_forwarded, is_draft, is_deleted,
    size, has_attachments, body_text, body_html, body_fetched,
    read_receipt_to, read_receipt_handled,
    smime_status, smime_signer_email, smime_signer_subject, smime_encrypted, smime_raw_body,
    pgp_status, pgp_signer_email, pgp_signer_key_id, pgp_encrypted, pgp_raw_body,
    received_at";

/// Header projection over a `messages m` alias, matching `row_to_header`
pub(crate) const HEADER_COLUMNS: &str = "m.id, m.account_id, m.folder_id, m.uid,
    COALESCE(m.thread_id, m.id), m.message_id, m.subject, m.from_name, m.from_email,
    COALESCE(m.date, m.received_at), m.snippet, m.is_read, m.is_starred,
    m.has_attachments, m.size";

/// Effective sort date: the header date, falling back to arrival time
pub(crate) const SORT_DATE: &str = "COALESCE(m.date, m.received_at)";

static INSERT_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "INSERT INTO messages (id, {}) VALUES ({})",
        WRITE_COLUMNS.join(", "),
        placeholders(1, WRITE_COLUMNS.len() + 1)
    )
});

static UPDATE_SQL: Lazy<String> = Lazy::new(|| {
    let assignments: Vec<String> = WRITE_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 2))
        .collect();
    format!("UPDATE messages SET {} WHERE id = ?1", assignments.join(", "))
});

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn millis_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_millis))
}

pub(crate) fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        account_id: row.get(1)?,
        folder_id: row.get(2)?,
        uid: row.get(3)?,
        message_id: row.get(4)?,
        in_reply_to: row.get(5)?,
        references: json_column(row, 6)?,
        thread_id: row.get(7)?,
        subject: row.get(8)?,
        from_name: row.get(9)?,
        from_email: row.get(10)?,
        to: json_column(row, 11)?,
        cc: json_column(row, 12)?,
        bcc: json_column(row, 13)?,
        reply_to: json_column(row, 14)?,
        date: millis_column(row, 15)?,
        snippet: row.get(16)?,
        flags: MessageFlags {
            is_read: row.get(17)?,
            is_starred: row.get(18)?,
            is_answered: row.get(19)?,
            is_forwarded: row.get(20)?,
            is_draft: row.get(21)?,
            is_deleted: row.get(22)?,
        },
        size: row.get(23)?,
        has_attachments: row.get(24)?,
        body_text: row.get(25)?,
        body_html: row.get(26)?,
        body_fetched: row.get(27)?,
        read_receipt_to: row.get(28)?,
        read_receipt_handled: row.get(29)?,
        smime: SmimeInfo {
            status: row.get(30)?,
            signer_email: row.get(31)?,
            signer_subject: row.get(32)?,
            encrypted: row.get(33)?,
            raw_body: row.get(34)?,
        },
        pgp: PgpInfo {
            status: row.get(35)?,
            signer_email: row.get(36)?,
            signer_key_id: row.get(37)?,
            encrypted: row.get(38)?,
            raw_body: row.get(39)?,
        },
        received_at: millis_column(row, 40)?,
    })
}

pub(crate) fn row_to_header(row: &Row) -> rusqlite::Result<MessageHeader> {
    Ok(MessageHeader {
        id: row.get(0)?,
        account_id: row.get(1)?,
        folder_id: row.get(2)?,
        uid: row.get(3)?,
        thread_key: row.get(4)?,
        message_id: row.get(5)?,
        subject: row.get(6)?,
        from_name: row.get(7)?,
        from_email: row.get(8)?,
        date: from_millis(row.get(9)?),
        snippet: row.get(10)?,
        is_read: row.get(11)?,
        is_starred: row.get(12)?,
        has_attachments: row.get(13)?,
        size: row.get(14)?,
    })
}

fn addresses_json(list: &[Address]) -> Result<String> {
    Ok(serde_json::to_string(list)?)
}

/// Bind values for `INSERT_SQL` / `UPDATE_SQL`: `id` first, then `WRITE_COLUMNS`
fn write_values(msg: &Message) -> Result<Vec<Box<dyn ToSql>>> {
    let values: Vec<Box<dyn ToSql>> = vec![
        Box::new(msg.id.clone()),
        Box::new(msg.account_id.clone()),
        Box::new(msg.folder_id.clone()),
        Box::new(msg.uid),
        Box::new(msg.message_id.clone()),
        Box::new(normalize_opt(msg.message_id.as_deref())),
        Box::new(msg.in_reply_to.clone()),
        Box::new(normalize_opt(msg.in_reply_to.as_deref())),
        Box::new(serde_json::to_string(&msg.references)?),
        Box::new(msg.thread_id.clone()),
        Box::new(msg.subject.clone()),
        Box::new(msg.from_name.clone()),
        Box::new(msg.from_email.clone()),
        Box::new(addresses_json(&msg.to)?),
        Box::new(addresses_json(&msg.cc)?),
        Box::new(addresses_json(&msg.bcc)?),
        Box::new(addresses_json(&msg.reply_to)?),
        Box::new(msg.date.as_ref().map(to_millis)),
        Box::new(msg.snippet.clone()),
        Box::new(msg.flags.is_read),
        Box::new(msg.flags.is_starred),
        Box::new(msg.flags.is_answered),
        Box::new(msg.flags.is_forwarded),
        Box::new(msg.flags.is_draft),
        Box::new(msg.flags.is_deleted),
        Box::new(msg.size),
        Box::new(msg.has_attachments),
        Box::new(msg.body_text.clone()),
        Box::new(msg.body_html.clone()),
        Box::new(msg.body_fetched),
        Box::new(msg.read_receipt_to.clone()),
        Box::new(msg.read_receipt_handled),
        Box::new(msg.smime.status.clone()),
        Box::new(msg.smime.signer_email.clone()),
        Box::new(msg.smime.signer_subject.clone()),
        Box::new(msg.smime.encrypted),
        Box::new(msg.smime.raw_body.clone()),
        Box::new(msg.pgp.status.clone()),
        Box::new(msg.pgp.signer_email.clone()),
        Box::new(msg.pgp.signer_key_id.clone()),
        Box::new(msg.pgp.encrypted),
        Box::new(msg.pgp.raw_body.clone()),
        Box::new(msg.received_at.as_ref().map(to_millis)),
    ];
    Ok(values)
}

/// Storage keeps millisecond precision; trim in place so the caller's value
/// equals what a later read returns.
fn truncate_to_millis(dt: &mut Option<DateTime<Utc>>) {
    if let Some(value) = dt {
        *value = from_millis(value.timestamp_millis());
    }
}

/// Insert a new message.
///
/// Assigns a UUID when `id` is empty and stamps `received_at` when unset. The
/// thread id is stored as given; resolution is the caller's job.
pub fn create_message(conn: &Connection, msg: &mut Message) -> Result<()> {
    if msg.id.is_empty() {
        msg.id = Uuid::new_v4().to_string();
    }
    if msg.received_at.is_none() {
        msg.received_at = Some(Utc::now());
    }
    truncate_to_millis(&mut msg.received_at);
    truncate_to_millis(&mut msg.date);

    let values = write_values(msg)?;
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(INSERT_SQL.as_str(), refs.as_slice())
        .with_context(|| format!("insert message uid {} into folder {}", msg.uid, msg.folder_id))?;

    debug!(
        "Stored message {} (uid {}, folder {})",
        msg.id, msg.uid, msg.folder_id
    );
    Ok(())
}

pub fn get_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
        params![id],
        row_to_message,
    )
    .optional()
    .with_context(|| format!("get message {}", id))
}

pub fn get_message_by_uid(conn: &Connection, folder_id: &str, uid: u32) -> Result<Option<Message>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM messages WHERE folder_id = ?1 AND uid = ?2",
            MESSAGE_COLUMNS
        ),
        params![folder_id, uid],
        row_to_message,
    )
    .optional()
    .with_context(|| format!("get message uid {} in folder {}", uid, folder_id))
}

/// Full messages by id, oldest first. Missing ids are skipped.
pub fn get_messages(conn: &Connection, ids: &[String]) -> Result<Vec<Message>> {
    let mut messages = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(super::MAX_IN_PARAMS) {
        let sql = format!(
            "SELECT {} FROM messages WHERE id IN ({})",
            MESSAGE_COLUMNS,
            placeholders(1, chunk.len())
        );
        let mut stmt = conn.prepare(&sql).context("prepare message lookup")?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), row_to_message)
            .context("load messages")?;
        for row in rows {
            messages.push(row.context("read message row")?);
        }
    }
    messages.sort_by(|a, b| {
        let ka = a.date.or(a.received_at);
        let kb = b.date.or(b.received_at);
        ka.cmp(&kb).then_with(|| a.received_at.cmp(&b.received_at))
    });
    Ok(messages)
}

/// Overwrite every stored field of an existing message.
/// Returns false when no row has this id.
pub fn update_message(conn: &Connection, msg: &mut Message) -> Result<bool> {
    truncate_to_millis(&mut msg.received_at);
    truncate_to_millis(&mut msg.date);

    let values = write_values(msg)?;
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let updated = conn
        .execute(UPDATE_SQL.as_str(), refs.as_slice())
        .with_context(|| format!("update message {}", msg.id))?;
    Ok(updated > 0)
}

pub fn delete_message(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM messages WHERE id = ?1", params![id])
        .with_context(|| format!("delete message {}", id))?;
    Ok(deleted > 0)
}

/// Remove every message of a folder, keeping the folder itself
pub fn delete_by_folder(conn: &Connection, folder_id: &str) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("begin folder purge")?;
    let deleted = tx
        .execute("DELETE FROM messages WHERE folder_id = ?1", params![folder_id])
        .with_context(|| format!("delete messages of folder {}", folder_id))?;
    tx.commit().context("commit folder purge")?;

    debug!("Deleted {} messages from folder {}", deleted, folder_id);
    Ok(deleted)
}

/// Retention sweep: drop an account's messages dated before `cutoff`.
/// Returns how many were removed.
pub fn delete_older_than(conn: &Connection, account_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("begin retention sweep")?;
    let deleted = tx
        .execute(
            "DELETE FROM messages
             WHERE account_id = ?1 AND COALESCE(date, received_at) < ?2",
            params![account_id, to_millis(&cutoff)],
        )
        .with_context(|| format!("prune messages of account {}", account_id))?;
    tx.commit().context("commit retention sweep")?;

    info!(
        "Retention sweep removed {} messages from account {} older than {}",
        deleted,
        account_id,
        cutoff.to_rfc3339()
    );
    Ok(deleted)
}

/// All UIDs stored for a folder, ascending
pub fn list_uids(conn: &Connection, folder_id: &str) -> Result<Vec<u32>> {
    let mut stmt = conn
        .prepare("SELECT uid FROM messages WHERE folder_id = ?1 ORDER BY uid ASC")
        .context("prepare uid listing")?;
    let rows = stmt
        .query_map(params![folder_id], |row| row.get::<_, u32>(0))
        .with_context(|| format!("list uids of folder {}", folder_id))?;

    let mut uids = Vec::new();
    for row in rows {
        uids.push(row.context("read uid")?);
    }
    Ok(uids)
}

pub fn highest_uid(conn: &Connection, folder_id: &str) -> Result<Option<u32>> {
    conn.query_row(
        "SELECT MAX(uid) FROM messages WHERE folder_id = ?1",
        params![folder_id],
        |row| row.get(0),
    )
    .with_context(|| format!("get highest uid of folder {}", folder_id))
}

/// UIDs whose body has not been fetched yet, newest first
pub fn uids_missing_body(conn: &Connection, folder_id: &str, limit: usize) -> Result<Vec<u32>> {
    let mut stmt = conn
        .prepare(
            "SELECT uid FROM messages
             WHERE folder_id = ?1 AND body_fetched = 0
             ORDER BY uid DESC LIMIT ?2",
        )
        .context("prepare body backlog query")?;
    let rows = stmt
        .query_map(params![folder_id, limit as i64], |row| row.get::<_, u32>(0))
        .with_context(|| format!("list unfetched uids of folder {}", folder_id))?;

    let mut uids = Vec::new();
    for row in rows {
        uids.push(row.context("read uid")?);
    }
    Ok(uids)
}

/// Header rows of one folder for flat (unthreaded) lists
pub fn list_headers(
    conn: &Connection,
    folder_id: &str,
    order: SortOrder,
    page: Page,
) -> Result<Vec<MessageHeader>> {
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let sql = format!(
        "SELECT {} FROM messages m
         WHERE m.folder_id = ?1 AND m.is_deleted = 0
         ORDER BY {} {}, m.uid {}
         LIMIT ?2 OFFSET ?3",
        HEADER_COLUMNS, SORT_DATE, direction, direction
    );
    let mut stmt = conn.prepare(&sql).context("prepare header listing")?;
    let rows = stmt
        .query_map(
            params![folder_id, page.limit as i64, page.offset as i64],
            row_to_header,
        )
        .with_context(|| format!("list headers of folder {}", folder_id))?;

    let mut headers = Vec::new();
    for row in rows {
        headers.push(row.context("read header row")?);
    }
    Ok(headers)
}

// ========== Raw body accessors ==========

fn get_blob(conn: &Connection, column: &str, id: &str) -> Result<Option<Vec<u8>>> {
    let blob: Option<Option<Vec<u8>>> = conn
        .query_row(
            &format!("SELECT {} FROM messages WHERE id = ?1", column),
            params![id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("read {} of message {}", column, id))?;
    Ok(blob.flatten())
}

fn set_blob(conn: &Connection, column: &str, id: &str, raw: Option<&[u8]>) -> Result<bool> {
    let updated = conn
        .execute(
            &format!("UPDATE messages SET {} = ?1 WHERE id = ?2", column),
            params![raw, id],
        )
        .with_context(|| format!("write {} of message {}", column, id))?;
    Ok(updated > 0)
}

/// Opaque S/MIME payload for on-demand decryption
pub fn get_smime_raw_body(conn: &Connection, id: &str) -> Result<Option<Vec<u8>>> {
    get_blob(conn, "smime_raw_body", id)
}

/// Store or (with `None`) clear the S/MIME payload. The rendered body is untouched.
pub fn set_smime_raw_body(conn: &Connection, id: &str, raw: Option<&[u8]>) -> Result<bool> {
    set_blob(conn, "smime_raw_body", id, raw)
}

pub fn get_pgp_raw_body(conn: &Connection, id: &str) -> Result<Option<Vec<u8>>> {
    get_blob(conn, "pgp_raw_body", id)
}

pub fn set_pgp_raw_body(conn: &Connection, id: &str, raw: Option<&[u8]>) -> Result<bool> {
    set_blob(conn, "pgp_raw_body", id, raw)
}

/// Forget the rendered body so it is fetched again. Raw encrypted payloads
/// and the list snippet stay.
pub fn clear_rendered_body(conn: &Connection, id: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE messages SET body_text = NULL, body_html = NULL, body_fetched = 0
             WHERE id = ?1",
            params![id],
        )
        .with_context(|| format!("clear body of message {}", id))?;
    Ok(updated > 0)
}

pub fn mark_read_receipt_handled(conn: &Connection, id: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE messages SET read_receipt_handled = 1 WHERE id = ?1",
            params![id],
        )
        .with_context(|| format!("mark read receipt handled for message {}", id))?;
    Ok(updated > 0)
}

/// Folder ids currently holding any of `ids`
pub(crate) fn folders_of(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
    let mut folders = Vec::new();
    for chunk in ids.chunks(super::MAX_IN_PARAMS) {
        let sql = format!(
            "SELECT DISTINCT folder_id FROM messages WHERE id IN ({})",
            placeholders(1, chunk.len())
        );
        let mut stmt = conn.prepare(&sql).context("prepare folder lookup")?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))
            .context("look up message folders")?;
        for row in rows {
            folders.push(row.context("read folder id")?);
        }
    }
    folders.sort();
    folders.dedup();
    Ok(folders)
}
