//! Bulk mutations for sync reconciliation and multi-select actions.
//!
//! Failure policy differs per batch kind: flag batches by UID are
//! all-or-nothing, body batches log a failed row and keep going.

use once_cell::sync::Lazy;
use rusqlite::{params, params_from_iter, Connection, ToSql};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::folders::get_folder;
use super::messages::WRITE_COLUMNS;
use super::{dedup_ids, placeholders, MAX_IN_PARAMS};
use crate::error::{Context, Result, StoreError};
use crate::types::{BodyUpdate, CryptoUpdate, RawBodyChange, UidFlags};

/// Apply server flag state to a folder in one transaction. Any failure rolls
/// back the whole batch. Returns how many UIDs matched a stored message.
pub fn update_flags_by_uid(conn: &Connection, folder_id: &str, updates: &[UidFlags]) -> Result<usize> {
    if updates.is_empty() {
        return Ok(0);
    }

    let tx = conn
        .unchecked_transaction()
        .context("begin flag batch")?;
    let mut matched = 0;
    {
        let mut stmt = tx
            .prepare(
                "UPDATE messages SET
                    is_read = ?1, is_starred = ?2, is_answered = ?3,
                    is_forwarded = ?4, is_draft = ?5, is_deleted = ?6
                 WHERE folder_id = ?7 AND uid = ?8",
            )
            .context("prepare flag batch")?;

        for update in updates {
            let f = update.flags;
            matched += stmt
                .execute(params![
                    f.is_read,
                    f.is_starred,
                    f.is_answered,
                    f.is_forwarded,
                    f.is_draft,
                    f.is_deleted,
                    folder_id,
                    update.uid,
                ])
                .with_context(|| format!("update flags of uid {} in folder {}", update.uid, folder_id))?;
        }
    }
    tx.commit().context("commit flag batch")?;

    debug!("Flag batch on folder {}: {}/{} uids matched", folder_id, matched, updates.len());
    Ok(matched)
}

/// Set read and/or starred on a selection of messages. `None` leaves the flag
/// alone. Not transactional: each chunk commits on its own.
pub fn update_flags_by_ids(
    conn: &Connection,
    ids: &[String],
    read: Option<bool>,
    starred: Option<bool>,
) -> Result<usize> {
    let mut assignments = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(read) = read {
        values.push(Box::new(read));
        assignments.push(format!("is_read = ?{}", values.len()));
    }
    if let Some(starred) = starred {
        values.push(Box::new(starred));
        assignments.push(format!("is_starred = ?{}", values.len()));
    }

    let ids = dedup_ids(ids);
    if assignments.is_empty() || ids.is_empty() {
        return Ok(0);
    }

    let mut updated = 0;
    for chunk in ids.chunks(MAX_IN_PARAMS) {
        let sql = format!(
            "UPDATE messages SET {} WHERE id IN ({})",
            assignments.join(", "),
            placeholders(values.len() + 1, chunk.len())
        );
        let mut bind: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        bind.extend(chunk.iter().map(|id| id as &dyn ToSql));
        updated += conn
            .execute(&sql, bind.as_slice())
            .context("update flags by id")?;
    }
    Ok(updated)
}

/// Appends the assignments for one crypto block
fn push_crypto(
    prefix: &str,
    detail_column: &str,
    update: &CryptoUpdate,
    assignments: &mut Vec<String>,
    values: &mut Vec<Box<dyn ToSql>>,
) {
    let mut push = |column: String, value: Box<dyn ToSql>| {
        values.push(value);
        assignments.push(format!("{} = ?{}", column, values.len()));
    };
    push(format!("{}_status", prefix), Box::new(update.status.clone()));
    push(format!("{}_signer_email", prefix), Box::new(update.signer_email.clone()));
    push(format!("{}_{}", prefix, detail_column), Box::new(update.signer_detail.clone()));
    push(format!("{}_encrypted", prefix), Box::new(update.encrypted));
    match &update.raw_body {
        RawBodyChange::Keep => {}
        RawBodyChange::Set(raw) => push(format!("{}_raw_body", prefix), Box::new(raw.clone())),
        RawBodyChange::Clear => {
            push(format!("{}_raw_body", prefix), Box::new(Option::<Vec<u8>>::None))
        }
    }
}

/// Returns false when there was nothing to write or the message is gone
fn apply_body_update(conn: &Connection, update: &BodyUpdate) -> Result<bool> {
    let mut assignments = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(body) = &update.body {
        for (column, value) in [
            ("body_text", &body.body_text),
            ("body_html", &body.body_html),
            ("snippet", &body.snippet),
        ] {
            values.push(Box::new(value.clone()));
            assignments.push(format!("{} = ?{}", column, values.len()));
        }
        assignments.push("body_fetched = 1".to_string());
    }
    if let Some(smime) = &update.smime {
        push_crypto("smime", "signer_subject", smime, &mut assignments, &mut values);
    }
    if let Some(pgp) = &update.pgp {
        push_crypto("pgp", "signer_key_id", pgp, &mut assignments, &mut values);
    }
    if assignments.is_empty() {
        return Ok(false);
    }

    values.push(Box::new(update.id.clone()));
    let sql = format!(
        "UPDATE messages SET {} WHERE id = ?{}",
        assignments.join(", "),
        values.len()
    );
    let bind: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let updated = conn
        .execute(&sql, bind.as_slice())
        .with_context(|| format!("update body of message {}", update.id))?;
    Ok(updated > 0)
}

/// Store fetched bodies and crypto state in one transaction. A row that fails
/// is logged and skipped. Returns how many rows were written.
pub fn update_bodies(conn: &Connection, updates: &[BodyUpdate]) -> Result<usize> {
    if updates.is_empty() {
        return Ok(0);
    }

    let tx = conn
        .unchecked_transaction()
        .context("begin body batch")?;
    let mut written = 0;
    for update in updates {
        match apply_body_update(&tx, update) {
            Ok(true) => written += 1,
            Ok(false) => debug!("Body batch: nothing written for message {}", update.id),
            Err(e) => warn!("Failed to store body of message {}: {}", update.id, e),
        }
    }
    tx.commit().context("commit body batch")?;

    debug!("Body batch: {}/{} messages written", written, updates.len());
    Ok(written)
}

/// Reassign messages to `target_folder_id` (and its account).
///
/// The selection is de-duplicated first. A row whose UID already exists in the
/// target is skipped rather than failing the batch. Returns rows moved.
pub fn move_messages(conn: &Connection, ids: &[String], target_folder_id: &str) -> Result<usize> {
    let ids = dedup_ids(ids);
    if ids.is_empty() {
        return Ok(0);
    }
    if get_folder(conn, target_folder_id)?.is_none() {
        return Err(StoreError::InvalidInput(format!(
            "target folder {} does not exist",
            target_folder_id
        )));
    }

    let tx = conn.unchecked_transaction().context("begin move")?;
    let mut moved = 0;
    for chunk in ids.chunks(MAX_IN_PARAMS) {
        let sql = format!(
            "UPDATE OR IGNORE messages
             SET folder_id = ?1,
                 account_id = (SELECT account_id FROM folders WHERE id = ?1)
             WHERE folder_id != ?1 AND id IN ({})",
            placeholders(2, chunk.len())
        );
        let mut bind: Vec<&str> = vec![target_folder_id];
        bind.extend(chunk.iter().map(String::as_str));
        moved += tx
            .execute(&sql, params_from_iter(bind))
            .with_context(|| format!("move messages to folder {}", target_folder_id))?;
    }
    tx.commit().context("commit move")?;

    info!("Moved {}/{} messages to folder {}", moved, ids.len(), target_folder_id);
    Ok(moved)
}

/// Copy column list: everything except the owner columns and the thread id,
/// which are recomputed for the target
static COPY_COLUMNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    WRITE_COLUMNS
        .iter()
        .copied()
        .filter(|c| !matches!(*c, "account_id" | "folder_id" | "thread_id"))
        .collect()
});

/// Duplicate messages into `target_folder_id` under fresh ids, keeping UIDs.
///
/// The thread id carries over within one account and is dropped across
/// accounts. Copies that would collide on `(folder, uid)` are skipped.
/// Returns the ids of the new rows.
pub fn copy_messages(conn: &Connection, ids: &[String], target_folder_id: &str) -> Result<Vec<String>> {
    let ids = dedup_ids(ids);
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    if get_folder(conn, target_folder_id)?.is_none() {
        return Err(StoreError::InvalidInput(format!(
            "target folder {} does not exist",
            target_folder_id
        )));
    }

    let sql = format!(
        "INSERT OR IGNORE INTO messages (id, account_id, folder_id, thread_id, {})
         SELECT ?1, f.account_id, f.id,
                CASE WHEN m.account_id = f.account_id THEN m.thread_id END,
                {}
         FROM messages m JOIN folders f ON f.id = ?2
         WHERE m.id = ?3",
        COPY_COLUMNS.join(", "),
        COPY_COLUMNS
            .iter()
            .map(|c| format!("m.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let tx = conn.unchecked_transaction().context("begin copy")?;
    let mut created = Vec::new();
    {
        let mut stmt = tx.prepare(&sql).context("prepare copy")?;
        for id in &ids {
            let new_id = Uuid::new_v4().to_string();
            let inserted = stmt
                .execute(params![new_id, target_folder_id, id])
                .with_context(|| format!("copy message {} to folder {}", id, target_folder_id))?;
            if inserted > 0 {
                created.push(new_id);
            }
        }
    }
    tx.commit().context("commit copy")?;

    info!("Copied {}/{} messages to folder {}", created.len(), ids.len(), target_folder_id);
    Ok(created)
}

/// Unconditional delete of a selection. Returns rows removed.
pub fn delete_messages(conn: &Connection, ids: &[String]) -> Result<usize> {
    let ids = dedup_ids(ids);
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction().context("begin delete batch")?;
    let mut deleted = 0;
    for chunk in ids.chunks(MAX_IN_PARAMS) {
        let sql = format!(
            "DELETE FROM messages WHERE id IN ({})",
            placeholders(1, chunk.len())
        );
        deleted += tx
            .execute(&sql, params_from_iter(chunk.iter()))
            .context("delete messages")?;
    }
    tx.commit().context("commit delete batch")?;

    debug!("Deleted {}/{} messages", deleted, ids.len());
    Ok(deleted)
}
