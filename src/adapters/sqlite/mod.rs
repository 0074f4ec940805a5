//! SQLite persistence: schema, repository, threading, aggregation, search and
//! batch mutation.
//!
//! Functions here take a borrowed [`rusqlite::Connection`] so callers decide
//! the connection and transaction scope. Pool checkout happens one level up in
//! [`crate::store::MailStore`].

pub mod accounts;
pub mod batch;
pub mod conversations;
pub mod folders;
pub mod messages;
pub mod pool;
pub mod schema;
pub mod search;
pub mod threads;

#[cfg(test)]
pub(crate) mod fixtures;

pub use pool::{create_memory_pool, create_pool, DbConnection, DbPool};

/// Stay well below SQLite's bound-parameter limit when expanding `IN (...)`.
pub(crate) const MAX_IN_PARAMS: usize = 500;

/// Numbered placeholders `?start, ?start+1, ...` for an `IN (...)` list
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sorted, de-duplicated copy of a caller-supplied id selection
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = ids.iter().filter(|id| !id.is_empty()).cloned().collect();
    unique.sort();
    unique.dedup();
    unique
}

pub(crate) fn to_millis(dt: &chrono::DateTime<chrono::Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
