use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::messages::{get_messages, row_to_header, HEADER_COLUMNS, SORT_DATE};
use super::{placeholders, MAX_IN_PARAMS};
use crate::error::{Context, Result};
use crate::types::{
    Account, Conversation, ConversationBuilder, FolderType, Message, MessageHeader, Page,
    SortOrder, UnifiedConversation,
};

/// Upper bound on Message-ID link-following passes in [`get_conversation`]
const MAX_LINK_ROUNDS: usize = 16;

/// Restricts header queries to live messages in enabled accounts' inboxes
pub(crate) const UNIFIED_SCOPE: &str = "JOIN folders f ON f.id = m.folder_id
     JOIN accounts a ON a.id = m.account_id
     WHERE f.folder_type = 'inbox' AND a.enabled = 1 AND m.is_deleted = 0";

/// Header stream, oldest first
pub(crate) fn load_headers(
    conn: &Connection,
    scope: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<MessageHeader>> {
    let sql = format!(
        "SELECT {} FROM messages m {} ORDER BY {} ASC, m.seq ASC",
        HEADER_COLUMNS, scope, SORT_DATE
    );
    let mut stmt = conn.prepare(&sql).context("prepare header stream")?;
    let rows = stmt
        .query_map(params, row_to_header)
        .context("load header stream")?;

    let mut headers = Vec::new();
    for row in rows {
        headers.push(row.context("read header row")?);
    }
    Ok(headers)
}

/// A conversation plus the folder of its newest member
pub(crate) struct Grouped {
    pub conversation: Conversation,
    pub latest_folder_id: String,
}

/// Fold a chronological header stream into conversations.
///
/// Grouping is by `(account, thread key)`, so colliding thread ids from
/// different accounts stay apart.
pub(crate) fn group_headers(headers: &[MessageHeader]) -> Vec<Grouped> {
    let mut builders: HashMap<(String, String), (ConversationBuilder, String)> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();

    for header in headers {
        let key = (header.account_id.clone(), header.thread_key.clone());
        match builders.get_mut(&key) {
            Some((builder, folder)) => {
                builder.push(header);
                *folder = header.folder_id.clone();
            }
            None => {
                order.push(key.clone());
                builders.insert(
                    key,
                    (ConversationBuilder::new(header), header.folder_id.clone()),
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| builders.remove(&key))
        .map(|(builder, latest_folder_id)| Grouped {
            conversation: builder.finish(),
            latest_folder_id,
        })
        .collect()
}

pub(crate) fn sort_and_page(mut grouped: Vec<Grouped>, order: SortOrder, page: Page) -> Vec<Grouped> {
    grouped.sort_by(|a, b| {
        let (a, b) = (&a.conversation, &b.conversation);
        a.latest_date
            .cmp(&b.latest_date)
            .then_with(|| a.thread_id.cmp(&b.thread_id))
            .then_with(|| a.account_id.cmp(&b.account_id))
    });
    if order == SortOrder::Descending {
        grouped.reverse();
    }
    grouped.into_iter().skip(page.offset).take(page.limit).collect()
}

/// `(account, thread key)` pairs of one page, in the same order
/// [`sort_and_page`] produces
fn page_keys(
    conn: &Connection,
    scope: &str,
    params: &[&dyn ToSql],
    order: SortOrder,
    page: Page,
) -> Result<Vec<(String, String)>> {
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let sql = format!(
        "SELECT m.account_id, COALESCE(m.thread_id, m.id) AS thread_key, MAX({date}) AS latest
         FROM messages m {scope}
         GROUP BY m.account_id, thread_key
         ORDER BY latest {dir}, thread_key {dir}, m.account_id {dir}
         LIMIT {limit} OFFSET {offset}",
        date = SORT_DATE,
        scope = scope,
        dir = direction,
        limit = page.limit,
        offset = page.offset,
    );
    let mut stmt = conn.prepare(&sql).context("prepare conversation page")?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("load conversation page")?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row.context("read conversation key")?);
    }
    Ok(keys)
}

/// One page of conversations within `scope`. Only the headers of the paged
/// threads are loaded.
fn load_page(
    conn: &Connection,
    scope: &str,
    params: &[&dyn ToSql],
    order: SortOrder,
    page: Page,
) -> Result<Vec<Grouped>> {
    if page.limit == 0 {
        return Ok(Vec::new());
    }
    let keys = page_keys(conn, scope, params, order, page)?;
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut thread_keys: Vec<String> = keys.iter().map(|(_, t)| t.clone()).collect();
    thread_keys.sort();
    thread_keys.dedup();

    // A thread's headers never straddle two chunks
    let mut grouped = Vec::new();
    for chunk in thread_keys.chunks(MAX_IN_PARAMS - params.len()) {
        let chunk_scope = format!(
            "{} AND COALESCE(m.thread_id, m.id) IN ({})",
            scope,
            placeholders(params.len() + 1, chunk.len())
        );
        let mut bind: Vec<&dyn ToSql> = params.to_vec();
        bind.extend(chunk.iter().map(|t| t as &dyn ToSql));
        grouped.extend(group_headers(&load_headers(conn, &chunk_scope, &bind)?));
    }

    let wanted: HashSet<&(String, String)> = keys.iter().collect();
    grouped.retain(|g| {
        let key = (g.conversation.account_id.clone(), g.conversation.thread_id.clone());
        wanted.contains(&key)
    });
    Ok(sort_and_page(grouped, order, Page::first(keys.len())))
}

/// Conversations of one folder, sorted by latest date and paginated
pub fn list_folder_conversations(
    conn: &Connection,
    folder_id: &str,
    order: SortOrder,
    page: Page,
) -> Result<Vec<Conversation>> {
    let grouped = load_page(
        conn,
        "WHERE m.folder_id = ?1 AND m.is_deleted = 0",
        &[&folder_id as &dyn ToSql],
        order,
        page,
    )
    .with_context(|| format!("list conversations of folder {}", folder_id))?;

    Ok(grouped.into_iter().map(|g| g.conversation).collect())
}

pub fn count_folder_conversations(conn: &Connection, folder_id: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT COALESCE(thread_id, id)) FROM messages
             WHERE folder_id = ?1 AND is_deleted = 0",
            params![folder_id],
            |row| row.get(0),
        )
        .with_context(|| format!("count conversations of folder {}", folder_id))?;
    Ok(count as usize)
}

/// Unified inbox across enabled accounts, one row per `(account, thread)`
pub fn list_unified_conversations(
    conn: &Connection,
    accounts: &[Account],
    order: SortOrder,
    page: Page,
) -> Result<Vec<UnifiedConversation>> {
    let grouped = load_page(conn, UNIFIED_SCOPE, &[], order, page).context("list unified inbox")?;
    let by_id: HashMap<&str, &Account> = accounts.iter().map(|a| (a.id.as_str(), a)).collect();

    let conversations = grouped
        .into_iter()
        .map(|g| {
            let account = by_id.get(g.conversation.account_id.as_str());
            UnifiedConversation {
                account_id: g.conversation.account_id.clone(),
                account_name: account
                    .map(|a| a.display_name().to_string())
                    .unwrap_or_default(),
                account_color: account.and_then(|a| a.color.clone()),
                inbox_folder_id: g.latest_folder_id,
                conversation: g.conversation,
            }
        })
        .collect();
    Ok(conversations)
}

pub fn count_unified_conversations(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM (
                    SELECT DISTINCT m.account_id, COALESCE(m.thread_id, m.id)
                    FROM messages m {})",
                UNIFIED_SCOPE
            ),
            [],
            |row| row.get(0),
        )
        .context("count unified conversations")?;
    Ok(count as usize)
}

struct Link {
    id: String,
    message_id_norm: Option<String>,
    in_reply_to_norm: Option<String>,
}

fn query_links(
    conn: &Connection,
    account_id: &str,
    include_trash: bool,
    condition: &str,
    values: &[String],
) -> Result<Vec<Link>> {
    let trash_filter = if include_trash {
        ""
    } else {
        "AND f.folder_type != 'trash'"
    };
    let sql = format!(
        "SELECT m.id, m.message_id_norm, m.in_reply_to_norm
         FROM messages m JOIN folders f ON f.id = m.folder_id
         WHERE m.account_id = ?1 AND m.is_deleted = 0 {} AND {}",
        trash_filter, condition
    );
    let mut stmt = conn.prepare(&sql).context("prepare thread link query")?;

    let mut bind: Vec<&str> = vec![account_id];
    bind.extend(values.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(bind), |row| {
            Ok(Link {
                id: row.get(0)?,
                message_id_norm: row.get(1)?,
                in_reply_to_norm: row.get(2)?,
            })
        })
        .context("load thread links")?;

    let mut links = Vec::new();
    for row in rows {
        links.push(row.context("read thread link")?);
    }
    Ok(links)
}

/// Links whose `column` is one of `values`, chunked under the parameter limit
fn links_where_in(
    conn: &Connection,
    account_id: &str,
    include_trash: bool,
    column: &str,
    values: &[String],
) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    for chunk in values.chunks(MAX_IN_PARAMS) {
        let condition = format!("m.{} IN ({})", column, placeholders(2, chunk.len()));
        links.extend(query_links(conn, account_id, include_trash, &condition, chunk)?);
    }
    Ok(links)
}

/// Resolve a thread anchor: a message id maps to that message's thread key,
/// anything else is taken as a thread id
fn resolve_anchor(conn: &Connection, account_id: &str, anchor: &str) -> Result<String> {
    let thread: Option<String> = conn
        .query_row(
            "SELECT COALESCE(thread_id, id) FROM messages WHERE account_id = ?1 AND id = ?2",
            params![account_id, anchor],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("resolve thread anchor {}", anchor))?;
    Ok(thread.unwrap_or_else(|| anchor.to_string()))
}

/// Members found by [`thread_member_ids`]
struct ThreadMembers {
    ids: Vec<String>,
    /// Links were still pending when the round cap was hit
    truncated: bool,
}

/// Ids of every message of the thread across the account's folders.
///
/// Starts from the stored thread key, then follows normalized Message-ID and
/// In-Reply-To links so members whose thread id is not reconciled yet still
/// belong.
fn thread_member_ids(
    conn: &Connection,
    account_id: &str,
    anchor: &str,
    include_trash: bool,
) -> Result<ThreadMembers> {
    let thread_key = resolve_anchor(conn, account_id, anchor)?;
    let seed = query_links(
        conn,
        account_id,
        include_trash,
        "COALESCE(m.thread_id, m.id) = ?2",
        &[thread_key],
    )?;

    let mut members: HashSet<String> = HashSet::new();
    let mut ids = Vec::new();
    let mut seen_mids: HashSet<String> = HashSet::new();
    let mut seen_parents: HashSet<String> = HashSet::new();
    let mut frontier = seed;

    for _ in 0..MAX_LINK_ROUNDS {
        let mut mids = Vec::new();
        let mut parents = Vec::new();
        for link in frontier.drain(..) {
            if !members.insert(link.id.clone()) {
                continue;
            }
            ids.push(link.id);
            if let Some(mid) = link.message_id_norm {
                if seen_mids.insert(mid.clone()) {
                    mids.push(mid);
                }
            }
            if let Some(parent) = link.in_reply_to_norm {
                if seen_parents.insert(parent.clone()) {
                    parents.push(parent);
                }
            }
        }
        if mids.is_empty() && parents.is_empty() {
            break;
        }

        // Replies to known members, and parents named by known members
        frontier.extend(links_where_in(conn, account_id, include_trash, "in_reply_to_norm", &mids)?);
        frontier.extend(links_where_in(conn, account_id, include_trash, "message_id_norm", &parents)?);
        frontier.retain(|l| !members.contains(&l.id));
        if frontier.is_empty() {
            break;
        }
    }

    let truncated = !frontier.is_empty();
    if truncated {
        debug!(
            "Thread {} still had {} unvisited links after {} rounds",
            anchor,
            frontier.len(),
            MAX_LINK_ROUNDS
        );
    }
    Ok(ThreadMembers { ids, truncated })
}

/// Full messages of one thread, oldest to newest, across all folders of the
/// account. Trash is left out unless the caller is viewing Trash.
pub fn get_conversation(
    conn: &Connection,
    account_id: &str,
    anchor: &str,
    viewing: Option<FolderType>,
) -> Result<Vec<Message>> {
    let include_trash = viewing == Some(FolderType::Trash);
    let members = thread_member_ids(conn, account_id, anchor, include_trash)
        .with_context(|| format!("resolve conversation {}", anchor))?;
    get_messages(conn, &members.ids)
}

/// Folders holding live messages of an account thread
pub(crate) fn thread_folders(conn: &Connection, account_id: &str, thread_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT folder_id FROM messages
             WHERE account_id = ?1 AND COALESCE(thread_id, id) = ?2",
        )
        .context("prepare thread folder lookup")?;
    let rows = stmt
        .query_map(params![account_id, thread_id], |row| row.get::<_, String>(0))
        .with_context(|| format!("list folders of thread {}", thread_id))?;

    let mut folders = Vec::new();
    for row in rows {
        folders.push(row.context("read folder id")?);
    }
    Ok(folders)
}

/// Mark every message of an account thread read. Returns rows changed.
pub fn mark_conversation_read(conn: &Connection, account_id: &str, thread_id: &str) -> Result<usize> {
    conn.execute(
        "UPDATE messages SET is_read = 1
         WHERE account_id = ?1 AND COALESCE(thread_id, id) = ?2 AND is_read = 0",
        params![account_id, thread_id],
    )
    .with_context(|| format!("mark thread {} read", thread_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::accounts::{list_enabled_accounts, set_account_enabled};
    use crate::adapters::sqlite::fixtures;
    use crate::adapters::sqlite::folders::{get_folder, unified_unread_count};

    fn threaded(account: &str, folder: &str, uid: u32, thread: &str) -> Message {
        let mut msg = fixtures::message(account, folder, uid);
        msg.thread_id = Some(thread.into());
        msg
    }

    #[test]
    fn test_folder_conversations_grouped_and_sorted() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut first = threaded("acct-a", "a-inbox", 1, "t1");
        first.from_email = Some("carol@example.com".into());
        fixtures::insert(&conn, first);
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 2, "t2"));
        let mut latest = threaded("acct-a", "a-inbox", 3, "t1");
        latest.flags.is_read = true;
        fixtures::insert(&conn, latest);

        let convs =
            list_folder_conversations(&conn, "a-inbox", SortOrder::Descending, Page::first(10))
                .unwrap();
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].thread_id, "t1");
        assert_eq!(convs[0].message_count, 2);
        assert_eq!(convs[0].unread_count, 1);
        assert_eq!(convs[0].subject.as_deref(), Some("Subject 1"));
        assert_eq!(convs[0].snippet.as_deref(), Some("Snippet 3"));
        assert_eq!(convs[0].participants.len(), 2);
        assert_eq!(convs[1].thread_id, "t2");

        let asc =
            list_folder_conversations(&conn, "a-inbox", SortOrder::Ascending, Page::new(1, 5))
                .unwrap();
        assert_eq!(asc.len(), 1);
        assert_eq!(asc[0].thread_id, "t1");
        assert_eq!(count_folder_conversations(&conn, "a-inbox").unwrap(), 2);
    }

    #[test]
    fn test_deleted_flagged_messages_are_hidden() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut gone = fixtures::message("acct-a", "a-inbox", 1);
        gone.flags.is_deleted = true;
        fixtures::insert(&conn, gone);

        assert!(
            list_folder_conversations(&conn, "a-inbox", SortOrder::Descending, Page::first(10))
                .unwrap()
                .is_empty()
        );
        assert_eq!(get_folder(&conn, "a-inbox").unwrap().unwrap().total_count, 0);
    }

    #[test]
    fn test_unified_inbox_never_merges_accounts() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 1, "same-thread"));
        fixtures::insert(&conn, threaded("acct-b", "b-inbox", 1, "same-thread"));
        fixtures::insert(&conn, threaded("acct-a", "a-archive", 2, "archived"));

        let accounts = list_enabled_accounts(&conn).unwrap();
        let unified =
            list_unified_conversations(&conn, &accounts, SortOrder::Descending, Page::first(10))
                .unwrap();

        assert_eq!(unified.len(), 2);
        let owners: HashSet<&str> = unified.iter().map(|u| u.account_id.as_str()).collect();
        assert_eq!(owners, HashSet::from(["acct-a", "acct-b"]));
        for row in &unified {
            assert_eq!(row.conversation.thread_id, "same-thread");
            assert_eq!(row.conversation.message_count, 1);
        }
        let personal = unified.iter().find(|u| u.account_id == "acct-a").unwrap();
        assert_eq!(personal.account_name, "Personal");
        assert_eq!(personal.inbox_folder_id, "a-inbox");
        assert_eq!(count_unified_conversations(&conn).unwrap(), 2);
    }

    #[test]
    fn test_unified_skips_disabled_accounts() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, fixtures::message("acct-a", "a-inbox", 1));
        fixtures::insert(&conn, fixtures::message("acct-b", "b-inbox", 1));
        fixtures::insert(&conn, fixtures::message("acct-b", "b-inbox", 2));
        assert_eq!(unified_unread_count(&conn).unwrap(), 3);

        set_account_enabled(&conn, "acct-b", false).unwrap();
        let accounts = list_enabled_accounts(&conn).unwrap();
        let unified =
            list_unified_conversations(&conn, &accounts, SortOrder::Descending, Page::first(10))
                .unwrap();
        assert_eq!(unified.len(), 1);
        assert_eq!(unified_unread_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_get_conversation_spans_folders_but_not_trash() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let root = fixtures::insert(&conn, threaded("acct-a", "a-inbox", 1, "t1"));
        fixtures::insert(&conn, threaded("acct-a", "a-sent", 2, "t1"));
        fixtures::insert(&conn, threaded("acct-a", "a-trash", 3, "t1"));
        fixtures::insert(&conn, threaded("acct-b", "b-inbox", 4, "t1"));

        let view = get_conversation(&conn, "acct-a", "t1", Some(FolderType::Inbox)).unwrap();
        let uids: Vec<u32> = view.iter().map(|m| m.uid).collect();
        assert_eq!(uids, vec![1, 2]);

        let from_trash = get_conversation(&conn, "acct-a", &root.id, Some(FolderType::Trash)).unwrap();
        let uids: Vec<u32> = from_trash.iter().map(|m| m.uid).collect();
        assert_eq!(uids, vec![1, 2, 3]);
    }

    #[test]
    fn test_get_conversation_follows_unreconciled_links() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let mut root = threaded("acct-a", "a-inbox", 1, "t-root");
        root.message_id = Some("<root@x>".into());
        let root = fixtures::insert(&conn, root);

        // Stored without reconciliation: own thread id, linked only by headers
        let mut reply = threaded("acct-a", "a-sent", 2, "stray");
        reply.message_id = Some("<reply@x>".into());
        reply.in_reply_to = Some("root@x".into());
        fixtures::insert(&conn, reply);

        let mut nested = threaded("acct-a", "a-archive", 3, "stray-2");
        nested.in_reply_to = Some("<reply@x>".into());
        fixtures::insert(&conn, nested);

        let view = get_conversation(&conn, "acct-a", &root.id, None).unwrap();
        let uids: Vec<u32> = view.iter().map(|m| m.uid).collect();
        assert_eq!(uids, vec![1, 2, 3]);
    }

    fn reply_chain(conn: &Connection, length: u32) -> Message {
        let mut first = None;
        for uid in 1..=length {
            let mut msg = threaded("acct-a", "a-inbox", uid, &format!("chain-{}", uid));
            msg.message_id = Some(format!("<c{}@x>", uid));
            if uid > 1 {
                msg.in_reply_to = Some(format!("<c{}@x>", uid - 1));
            }
            let stored = fixtures::insert(conn, msg);
            first.get_or_insert(stored);
        }
        first.unwrap()
    }

    #[test]
    fn test_link_walk_reports_round_cap() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let first = reply_chain(&conn, MAX_LINK_ROUNDS as u32 + 4);

        let members = thread_member_ids(&conn, "acct-a", &first.id, false).unwrap();
        assert!(members.truncated);
        assert_eq!(members.ids.len(), MAX_LINK_ROUNDS);
    }

    #[test]
    fn test_link_walk_within_cap_is_complete() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let first = reply_chain(&conn, MAX_LINK_ROUNDS as u32);

        let members = thread_member_ids(&conn, "acct-a", &first.id, false).unwrap();
        assert!(!members.truncated);
        assert_eq!(members.ids.len(), MAX_LINK_ROUNDS);
    }

    #[test]
    fn test_folder_page_loads_whole_threads() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 1, "t1"));
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 2, "t2"));
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 3, "t3"));
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 4, "t1"));

        let page = |order, offset, limit| {
            list_folder_conversations(&conn, "a-inbox", order, Page::new(offset, limit))
                .unwrap()
                .into_iter()
                .map(|c| (c.thread_id, c.message_count))
                .collect::<Vec<_>>()
        };
        assert_eq!(page(SortOrder::Descending, 0, 1), vec![("t1".to_string(), 2)]);
        assert_eq!(page(SortOrder::Descending, 1, 1), vec![("t3".to_string(), 1)]);
        assert_eq!(
            page(SortOrder::Ascending, 0, 2),
            vec![("t2".to_string(), 1), ("t3".to_string(), 1)]
        );
        assert!(page(SortOrder::Descending, 3, 5).is_empty());
        assert!(page(SortOrder::Descending, 0, 0).is_empty());
    }

    #[test]
    fn test_unified_page_splits_shared_thread_key() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 1, "shared"));
        fixtures::insert(&conn, threaded("acct-b", "b-inbox", 2, "shared"));
        let accounts = list_enabled_accounts(&conn).unwrap();

        let first =
            list_unified_conversations(&conn, &accounts, SortOrder::Descending, Page::first(1))
                .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].account_id, "acct-b");
        assert_eq!(first[0].conversation.message_count, 1);

        let second =
            list_unified_conversations(&conn, &accounts, SortOrder::Descending, Page::new(1, 1))
                .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].account_id, "acct-a");
        assert_eq!(second[0].inbox_folder_id, "a-inbox");
    }

    #[test]
    fn test_get_conversation_unknown_anchor_is_empty() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        assert!(get_conversation(&conn, "acct-a", "nope", None).unwrap().is_empty());
    }

    #[test]
    fn test_mark_conversation_read_updates_counters() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 1, "t1"));
        fixtures::insert(&conn, threaded("acct-a", "a-archive", 2, "t1"));
        fixtures::insert(&conn, threaded("acct-a", "a-inbox", 3, "t2"));

        assert_eq!(mark_conversation_read(&conn, "acct-a", "t1").unwrap(), 2);
        assert_eq!(mark_conversation_read(&conn, "acct-a", "t1").unwrap(), 0);
        assert_eq!(get_folder(&conn, "a-inbox").unwrap().unwrap().unread_count, 1);
        assert_eq!(get_folder(&conn, "a-archive").unwrap().unwrap().unread_count, 0);

        let mut folders = thread_folders(&conn, "acct-a", "t1").unwrap();
        folders.sort();
        assert_eq!(folders, vec!["a-archive", "a-inbox"]);
    }
}
