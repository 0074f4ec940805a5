//! Thread resolution at ingest time.
//!
//! Two phases: [`find_thread_id`] picks a thread before the message is stored,
//! then [`reconcile_threads_for_new_message`] fixes up both the newcomer and
//! any earlier arrivals that were threaded before their parent existed.
//!
//! A message whose ancestors are all missing is threaded under a placeholder:
//! the normalized Message-ID of its first reference (or its In-Reply-To). When
//! the message owning that Message-ID arrives, the placeholder is folded into
//! the real thread. Within an account, ingests must be reconciled serially.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use super::placeholders;
use crate::error::{Context, Result, StoreError};
use crate::helpers::message_id::{normalize_message_id, normalize_opt};
use crate::types::Message;

/// What a reconciliation pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Thread the new message ended up in
    pub thread_id: String,
    /// Thread keys that were folded into `thread_id`
    pub merged: Vec<String>,
    /// Rows whose thread id was rewritten
    pub rewritten: usize,
}

/// Thread key of the oldest stored message in `account_id` with this
/// normalized Message-ID, excluding `exclude_id`
fn thread_of_message_id(
    conn: &Connection,
    account_id: &str,
    message_id_norm: &str,
    exclude_id: &str,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT COALESCE(thread_id, id) FROM messages
         WHERE account_id = ?1 AND message_id_norm = ?2 AND id != ?3
         ORDER BY seq ASC LIMIT 1",
        params![account_id, message_id_norm, exclude_id],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("look up thread of message-id {}", message_id_norm))
}

/// Pick the thread for a message that is about to be stored.
///
/// Candidates are In-Reply-To followed by each References entry; the first one
/// naming a stored message of the same account donates its thread. Without a
/// match the first reference, then In-Reply-To, then `own_id` is used.
pub fn find_thread_id(
    conn: &Connection,
    account_id: &str,
    own_id: &str,
    in_reply_to: Option<&str>,
    references: &[String],
) -> Result<String> {
    let in_reply_to = normalize_opt(in_reply_to);
    let references: Vec<String> = references
        .iter()
        .filter_map(|r| normalize_message_id(r))
        .collect();

    let candidates = in_reply_to.iter().chain(references.iter());
    for candidate in candidates {
        if let Some(thread) = thread_of_message_id(conn, account_id, candidate, own_id)? {
            return Ok(thread);
        }
    }

    Ok(references
        .first()
        .or(in_reply_to.as_ref())
        .cloned()
        .unwrap_or_else(|| own_id.to_string()))
}

fn current_thread(conn: &Connection, id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT COALESCE(thread_id, id) FROM messages WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("get thread of message {}", id))
}

/// Distinct thread keys of stored replies whose In-Reply-To names `message_id_norm`
fn reply_threads(
    conn: &Connection,
    account_id: &str,
    message_id_norm: &str,
    exclude_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT COALESCE(thread_id, id) FROM messages
             WHERE account_id = ?1 AND in_reply_to_norm = ?2 AND id != ?3",
        )
        .context("prepare reply lookup")?;
    let rows = stmt
        .query_map(params![account_id, message_id_norm, exclude_id], |row| {
            row.get::<_, String>(0)
        })
        .with_context(|| format!("find replies to {}", message_id_norm))?;

    let mut threads = Vec::new();
    for row in rows {
        threads.push(row.context("read reply thread")?);
    }
    Ok(threads)
}

/// Move every message of `account_id` keyed by one of `stale` into `target`
fn rewrite_threads(
    conn: &Connection,
    account_id: &str,
    stale: &[String],
    target: &str,
) -> Result<usize> {
    if stale.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE messages SET thread_id = ?1
         WHERE account_id = ?2 AND COALESCE(thread_id, id) IN ({})",
        placeholders(3, stale.len())
    );
    let mut values: Vec<&str> = vec![target, account_id];
    values.extend(stale.iter().map(String::as_str));

    conn.execute(&sql, params_from_iter(values))
        .with_context(|| format!("rewrite threads into {}", target))
}

/// Bidirectional correction after `msg` has been stored.
///
/// A stored copy of `msg` with the same Message-ID donates its thread first.
/// Backward: if the parent already sits in another thread, the newcomer (and
/// anything sharing its provisional thread) joins the parent's thread.
/// Forward: stored replies to `msg`, together with their whole threads and any
/// placeholder thread named after `msg`'s Message-ID, are folded into the
/// resolved thread. Running it again on a converged set changes nothing.
pub fn reconcile_threads_for_new_message(
    conn: &Connection,
    account_id: &str,
    msg: &Message,
) -> Result<ReconcileOutcome> {
    let tx = conn
        .unchecked_transaction()
        .context("begin thread reconciliation")?;

    let mut resolved = current_thread(&tx, &msg.id)?.ok_or_else(|| {
        StoreError::InvalidInput(format!("message {} is not stored", msg.id))
    })?;
    let mut merged = Vec::new();
    let mut rewritten = 0;
    let own_mid = normalize_opt(msg.message_id.as_deref());

    // Another copy of the same message (INBOX plus Sent or All Mail) keeps
    // its thread id.
    if let Some(mid) = &own_mid {
        if let Some(twin_thread) = thread_of_message_id(&tx, account_id, mid, &msg.id)? {
            if twin_thread != resolved {
                let stale = vec![resolved.clone()];
                rewritten += rewrite_threads(&tx, account_id, &stale, &twin_thread)?;
                merged.extend(stale);
                resolved = twin_thread;
            }
        }
    }

    if let Some(parent_id) = normalize_opt(msg.in_reply_to.as_deref()) {
        if let Some(parent_thread) = thread_of_message_id(&tx, account_id, &parent_id, &msg.id)? {
            if parent_thread != resolved {
                let stale = vec![resolved.clone()];
                rewritten += rewrite_threads(&tx, account_id, &stale, &parent_thread)?;
                merged.extend(stale);
                resolved = parent_thread;
            }
        }
    }

    if let Some(own_mid) = own_mid {
        let mut stale = reply_threads(&tx, account_id, &own_mid, &msg.id)?;
        stale.push(own_mid);
        stale.sort();
        stale.dedup();
        stale.retain(|t| *t != resolved);

        let count = rewrite_threads(&tx, account_id, &stale, &resolved)?;
        if count > 0 {
            rewritten += count;
            merged.extend(stale);
        }
    }

    tx.commit().context("commit thread reconciliation")?;

    if rewritten > 0 {
        info!(
            "Reconciled message {}: {} rows moved into thread {} (from {:?})",
            msg.id, rewritten, resolved, merged
        );
    } else {
        debug!("Message {} already consistent in thread {}", msg.id, resolved);
    }

    Ok(ReconcileOutcome {
        thread_id: resolved,
        merged,
        rewritten,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::fixtures;
    use crate::adapters::sqlite::messages::{create_message, get_message};

    fn ingest(conn: &Connection, mut msg: Message) -> Message {
        msg.id = uuid::Uuid::new_v4().to_string();
        let thread = find_thread_id(
            conn,
            &msg.account_id,
            &msg.id,
            msg.in_reply_to.as_deref(),
            &msg.references,
        )
        .expect("Failed to find thread");
        msg.thread_id = Some(thread);
        create_message(conn, &mut msg).expect("Failed to create");
        reconcile_threads_for_new_message(conn, &msg.account_id.clone(), &msg)
            .expect("Failed to reconcile");
        msg
    }

    /// A is the root, B replies to A, C replies to B
    fn chain(account: &str, folder: &str) -> Vec<Message> {
        let mut a = fixtures::message(account, folder, 1);
        a.message_id = Some("<m1@example.com>".into());

        let mut b = fixtures::message(account, folder, 2);
        b.message_id = Some("<m2@example.com>".into());
        b.in_reply_to = Some("<m1@example.com>".into());

        let mut c = fixtures::message(account, folder, 3);
        c.message_id = Some("<m3@example.com>".into());
        c.in_reply_to = Some(" m2@example.com ".into());

        vec![a, b, c]
    }

    fn thread_of(conn: &Connection, id: &str) -> String {
        get_message(conn, id).unwrap().unwrap().thread_key().to_string()
    }

    #[test]
    fn test_convergence_in_every_arrival_order() {
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let pool = fixtures::seeded_pool();
            let conn = pool.get().unwrap();
            let messages = chain("acct-a", "a-inbox");

            let mut ids = vec![String::new(); 3];
            for i in order {
                ids[i] = ingest(&conn, messages[i].clone()).id;
            }

            let threads: Vec<String> = ids.iter().map(|id| thread_of(&conn, id)).collect();
            assert_eq!(threads[0], threads[1], "order {:?}", order);
            assert_eq!(threads[1], threads[2], "order {:?}", order);
            // The root's own id is the surviving thread id
            assert_eq!(threads[0], ids[0], "order {:?}", order);
        }
    }

    #[test]
    fn test_convergence_with_references() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let mut messages = chain("acct-a", "a-inbox");
        messages[1].references = vec!["<m1@example.com>".into()];
        messages[2].references = vec!["<m1@example.com>".into(), "<m2@example.com>".into()];

        let c = ingest(&conn, messages[2].clone());
        assert_eq!(thread_of(&conn, &c.id), "m1@example.com");
        let a = ingest(&conn, messages[0].clone());
        let b = ingest(&conn, messages[1].clone());

        assert_eq!(thread_of(&conn, &b.id), a.id);
        assert_eq!(thread_of(&conn, &c.id), a.id);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let messages = chain("acct-a", "a-inbox");
        let c = ingest(&conn, messages[2].clone());
        let b = ingest(&conn, messages[1].clone());
        let a = ingest(&conn, messages[0].clone());

        for msg in [&a, &b, &c] {
            let stored = get_message(&conn, &msg.id).unwrap().unwrap();
            let outcome = reconcile_threads_for_new_message(&conn, "acct-a", &stored)
                .expect("Failed to reconcile");
            assert_eq!(outcome.rewritten, 0);
            assert_eq!(outcome.thread_id, a.id);
        }
    }

    #[test]
    fn test_second_copy_keeps_first_seen_thread() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let messages = chain("acct-a", "a-inbox");
        let b = ingest(&conn, messages[1].clone());
        let a = ingest(&conn, messages[0].clone());
        assert_eq!(thread_of(&conn, &b.id), a.id);

        let mut copy = messages[0].clone();
        copy.folder_id = "a-sent".into();
        let copy = ingest(&conn, copy);

        assert_eq!(thread_of(&conn, &copy.id), a.id);
        assert_eq!(thread_of(&conn, &a.id), a.id);
        assert_eq!(thread_of(&conn, &b.id), a.id);

        let outcome = reconcile_threads_for_new_message(&conn, "acct-a", &copy).unwrap();
        assert_eq!(outcome.rewritten, 0);
    }

    #[test]
    fn test_find_thread_first_match_wins() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut root = fixtures::message("acct-a", "a-inbox", 1);
        root.message_id = Some("<root@example.com>".into());
        root.thread_id = Some("thread-root".into());
        fixtures::insert(&conn, root);

        let mut other = fixtures::message("acct-a", "a-inbox", 2);
        other.message_id = Some("<other@example.com>".into());
        other.thread_id = Some("thread-other".into());
        fixtures::insert(&conn, other);

        let refs = vec!["root@example.com".to_string()];
        let thread = find_thread_id(&conn, "acct-a", "new", Some("<other@example.com>"), &refs)
            .unwrap();
        assert_eq!(thread, "thread-other");

        let thread = find_thread_id(&conn, "acct-a", "new", Some("<missing@x>"), &refs).unwrap();
        assert_eq!(thread, "thread-root");
    }

    #[test]
    fn test_find_thread_fallbacks() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let refs = vec!["<first@x>".to_string(), "<second@x>".to_string()];
        assert_eq!(
            find_thread_id(&conn, "acct-a", "own", Some("<parent@x>"), &refs).unwrap(),
            "first@x"
        );
        assert_eq!(
            find_thread_id(&conn, "acct-a", "own", Some("<parent@x>"), &[]).unwrap(),
            "parent@x"
        );
        assert_eq!(find_thread_id(&conn, "acct-a", "own", None, &[]).unwrap(), "own");
    }

    #[test]
    fn test_find_thread_is_account_scoped() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut foreign = fixtures::message("acct-b", "b-inbox", 1);
        foreign.message_id = Some("<shared@example.com>".into());
        foreign.thread_id = Some("b-thread".into());
        fixtures::insert(&conn, foreign);

        let thread =
            find_thread_id(&conn, "acct-a", "own", Some("<shared@example.com>"), &[]).unwrap();
        assert_eq!(thread, "shared@example.com");
    }

    #[test]
    fn test_message_without_headers_is_own_thread() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let mut lone = fixtures::message("acct-a", "a-inbox", 1);
        lone.message_id = None;

        let lone = ingest(&conn, lone);
        assert_eq!(thread_of(&conn, &lone.id), lone.id);
    }

    #[test]
    fn test_reconcile_unknown_message_is_error() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let mut ghost = fixtures::message("acct-a", "a-inbox", 1);
        ghost.id = "ghost".into();

        let err = reconcile_threads_for_new_message(&conn, "acct-a", &ghost).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
