use rusqlite::{Connection, ToSql};
use std::collections::HashMap;
use tracing::debug;

use super::conversations::{group_headers, load_headers, sort_and_page, Grouped, UNIFIED_SCOPE};
use super::folders::get_folder;
use crate::error::{Context, Result};
use crate::helpers::highlight::{query_terms, Highlighter};
use crate::types::{Account, Folder, Page, SearchResult, SortOrder};

/// FTS5 expression for free-text input: every term quoted (inner quotes
/// doubled) as a prefix match, implicitly ANDed. `None` when there is nothing
/// to search for.
pub fn build_fts_query(input: &str) -> Option<String> {
    let terms = query_terms(input);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn to_results(
    grouped: Vec<Grouped>,
    folders: &HashMap<String, Folder>,
    accounts: Option<&[Account]>,
    highlighter: &Highlighter,
) -> Vec<SearchResult> {
    grouped
        .into_iter()
        .map(|g| {
            let folder = folders.get(&g.latest_folder_id);
            let account = accounts
                .and_then(|list| list.iter().find(|a| a.id == g.conversation.account_id));
            let sender = g
                .conversation
                .participants
                .first()
                .map(|p| p.label().to_string())
                .unwrap_or_default();

            SearchResult {
                highlighted_subject: highlighter
                    .highlight(g.conversation.subject.as_deref().unwrap_or_default()),
                highlighted_snippet: highlighter
                    .highlight(g.conversation.snippet.as_deref().unwrap_or_default()),
                highlighted_sender: highlighter.highlight(&sender),
                folder_name: folder.map(|f| f.name.clone()).unwrap_or_default(),
                folder_type: folder.map(|f| f.folder_type).unwrap_or_default(),
                folder_id: g.latest_folder_id,
                account_name: account.map(|a| a.display_name().to_string()),
                account_color: account.and_then(|a| a.color.clone()),
                conversation: g.conversation,
            }
        })
        .collect()
}

fn load_folders(conn: &Connection, grouped: &[Grouped]) -> Result<HashMap<String, Folder>> {
    let mut folders = HashMap::new();
    for g in grouped {
        if folders.contains_key(&g.latest_folder_id) {
            continue;
        }
        if let Some(folder) = get_folder(conn, &g.latest_folder_id)? {
            folders.insert(folder.id.clone(), folder);
        }
    }
    Ok(folders)
}

/// Search one folder. Whole conversations are returned for every thread with
/// at least one matching message, newest first, with the total match count.
pub fn search_folder(
    conn: &Connection,
    folder_id: &str,
    query: &str,
    page: Page,
) -> Result<(Vec<SearchResult>, usize)> {
    let Some(fts) = build_fts_query(query) else {
        return Ok((Vec::new(), 0));
    };
    debug!("FTS folder search: '{}' -> '{}' (folder {})", query, fts, folder_id);

    let headers = load_headers(
        conn,
        "WHERE m.folder_id = ?1 AND m.is_deleted = 0
           AND COALESCE(m.thread_id, m.id) IN (
             SELECT COALESCE(x.thread_id, x.id)
             FROM messages_fts JOIN messages x ON x.seq = messages_fts.rowid
             WHERE messages_fts MATCH ?2 AND x.folder_id = ?1 AND x.is_deleted = 0)",
        &[&folder_id as &dyn ToSql, &fts],
    )
    .with_context(|| format!("search folder {}", folder_id))?;

    let grouped = group_headers(&headers);
    let total = grouped.len();
    let grouped = sort_and_page(grouped, SortOrder::Descending, page);

    let folders = load_folders(conn, &grouped)?;
    let highlighter = Highlighter::new(&query_terms(query));
    Ok((to_results(grouped, &folders, None, &highlighter), total))
}

/// Search every enabled account's inbox. Threads stay per account.
pub fn search_unified(
    conn: &Connection,
    accounts: &[Account],
    query: &str,
    page: Page,
) -> Result<(Vec<SearchResult>, usize)> {
    let Some(fts) = build_fts_query(query) else {
        return Ok((Vec::new(), 0));
    };
    debug!("FTS unified search: '{}' -> '{}'", query, fts);

    let scope = format!(
        "{} AND COALESCE(m.thread_id, m.id) IN (
           SELECT COALESCE(x.thread_id, x.id)
           FROM messages_fts JOIN messages x ON x.seq = messages_fts.rowid
           WHERE messages_fts MATCH ?1
             AND x.account_id = m.account_id
             AND x.folder_id = m.folder_id
             AND x.is_deleted = 0)",
        UNIFIED_SCOPE
    );
    let headers = load_headers(conn, &scope, &[&fts as &dyn ToSql]).context("search unified inbox")?;

    let grouped = group_headers(&headers);
    let total = grouped.len();
    let grouped = sort_and_page(grouped, SortOrder::Descending, page);

    let folders = load_folders(conn, &grouped)?;
    let highlighter = Highlighter::new(&query_terms(query));
    Ok((to_results(grouped, &folders, Some(accounts), &highlighter), total))
}
