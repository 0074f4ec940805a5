//! Ingest and retention
//!
//! Ingest is the only path that threads messages: resolve a thread, store the
//! row, then reconcile. Reconciliation failures are logged and the message
//! stays stored under its provisional thread.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::sqlite::{accounts, folders, messages, threads};
use crate::error::Result;
use crate::types::Message;

/// Result of storing one message
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The stored message, carrying its final thread id
    pub message: Message,
    /// Threads folded into the message's thread during reconciliation
    pub merged_threads: Vec<String>,
}

impl IngestOutcome {
    /// Every thread key whose membership changed
    pub fn touched_threads(&self) -> Vec<String> {
        let mut threads = self.merged_threads.clone();
        threads.push(self.message.thread_key().to_string());
        threads
    }
}

pub fn ingest_message(conn: &Connection, mut msg: Message) -> Result<IngestOutcome> {
    if msg.id.is_empty() {
        msg.id = Uuid::new_v4().to_string();
    }

    let thread = threads::find_thread_id(
        conn,
        &msg.account_id,
        &msg.id,
        msg.in_reply_to.as_deref(),
        &msg.references,
    )?;
    msg.thread_id = Some(thread);
    messages::create_message(conn, &mut msg)?;

    let merged_threads = match threads::reconcile_threads_for_new_message(conn, &msg.account_id, &msg) {
        Ok(outcome) => {
            msg.thread_id = Some(outcome.thread_id);
            outcome.merged
        }
        Err(e) => {
            warn!("Thread reconciliation failed for message {}: {}", msg.id, e);
            Vec::new()
        }
    };

    debug!(
        "Ingested message {} into thread {}",
        msg.id,
        msg.thread_key()
    );
    Ok(IngestOutcome {
        message: msg,
        merged_threads,
    })
}

/// Ingest in input order. Threading convergence relies on this being serial
/// per account. Stops at the first message that cannot be stored.
pub fn ingest_messages(conn: &Connection, batch: Vec<Message>) -> Result<Vec<IngestOutcome>> {
    let total = batch.len();
    let mut outcomes = Vec::with_capacity(total);
    for msg in batch {
        outcomes.push(ingest_message(conn, msg)?);
    }
    if total > 0 {
        info!("Ingested {} messages", total);
    }
    Ok(outcomes)
}

/// What a retention sweep removed from one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub account_id: String,
    pub removed: usize,
    pub folder_ids: Vec<String>,
}

/// Apply every account's retention window, falling back to `default_days`.
/// Accounts without a window, or with zero days, are left alone.
pub fn prune_expired(
    conn: &Connection,
    default_days: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Vec<PruneReport>> {
    let mut reports = Vec::new();
    for account in accounts::list_accounts(conn)? {
        let Some(days) = account.retention_days.or(default_days).filter(|d| *d > 0) else {
            continue;
        };

        let cutoff = now - Duration::days(i64::from(days));
        let removed = messages::delete_older_than(conn, &account.id, cutoff)?;
        if removed == 0 {
            continue;
        }

        let folder_ids = folders::list_folders(conn, &account.id)?
            .into_iter()
            .map(|f| f.id)
            .collect();
        reports.push(PruneReport {
            account_id: account.id,
            removed,
            folder_ids,
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::accounts::{get_account, upsert_account};
    use crate::adapters::sqlite::fixtures;
    use crate::adapters::sqlite::messages::{get_message, list_uids};

    #[test]
    fn test_ingest_threads_reply_before_parent() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut reply = fixtures::message("acct-a", "a-inbox", 2);
        reply.message_id = Some("<reply@x>".into());
        reply.in_reply_to = Some("<root@x>".into());
        let reply = ingest_message(&conn, reply).expect("Failed to ingest reply");
        assert_eq!(reply.message.thread_id.as_deref(), Some("root@x"));

        let mut root = fixtures::message("acct-a", "a-sent", 1);
        root.message_id = Some("<root@x>".into());
        let root = ingest_message(&conn, root).expect("Failed to ingest root");

        assert_eq!(root.message.thread_key(), root.message.id);
        assert_eq!(root.merged_threads, vec!["root@x".to_string()]);
        let stored = get_message(&conn, &reply.message.id).unwrap().unwrap();
        assert_eq!(stored.thread_id.as_deref(), Some(root.message.id.as_str()));
    }

    #[test]
    fn test_reconcile_failure_keeps_message() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut reply = fixtures::message("acct-a", "a-inbox", 2);
        reply.message_id = Some("<reply@x>".into());
        reply.in_reply_to = Some("<root@x>".into());
        let reply = ingest_message(&conn, reply).expect("Failed to ingest reply");

        conn.execute_batch(
            "CREATE TEMP TRIGGER freeze_threads BEFORE UPDATE OF thread_id ON messages
             BEGIN SELECT RAISE(ABORT, 'threads frozen'); END;",
        )
        .unwrap();

        let mut root = fixtures::message("acct-a", "a-sent", 1);
        root.message_id = Some("<root@x>".into());
        let root = ingest_message(&conn, root).expect("Reconcile failure must not fail ingest");

        assert!(root.merged_threads.is_empty());
        assert_eq!(root.message.thread_key(), root.message.id);
        let stored = get_message(&conn, &root.message.id).unwrap();
        assert!(stored.is_some());
        let reply = get_message(&conn, &reply.message.id).unwrap().unwrap();
        assert_eq!(reply.thread_id.as_deref(), Some("root@x"));
    }

    #[test]
    fn test_ingest_failure_is_error() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let batch = vec![
            fixtures::message("acct-a", "a-inbox", 1),
            fixtures::message("acct-a", "a-inbox", 1),
        ];
        assert!(ingest_messages(&conn, batch).is_err());
        assert_eq!(list_uids(&conn, "a-inbox").unwrap(), vec![1]);
    }

    #[test]
    fn test_prune_uses_account_window_then_default() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let now = fixtures::base_time();

        let mut account = get_account(&conn, "acct-a").unwrap().unwrap();
        account.retention_days = Some(7);
        upsert_account(&conn, &account).unwrap();

        for (account, folder) in [("acct-a", "a-inbox"), ("acct-b", "b-inbox")] {
            let mut old = fixtures::message(account, folder, 1);
            old.date = Some(now - Duration::days(10));
            fixtures::insert(&conn, old);
        }

        let reports = prune_expired(&conn, None, now).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].account_id, "acct-a");
        assert_eq!(reports[0].removed, 1);
        assert!(reports[0].folder_ids.contains(&"a-inbox".to_string()));
        assert_eq!(list_uids(&conn, "b-inbox").unwrap(), vec![1]);

        let reports = prune_expired(&conn, Some(30), now).unwrap();
        assert!(reports.is_empty());
        let reports = prune_expired(&conn, Some(5), now).unwrap();
        assert_eq!(reports[0].account_id, "acct-b");
    }
}
