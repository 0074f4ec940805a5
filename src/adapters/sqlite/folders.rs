use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Context, Result};
use crate::types::{Folder, FolderType};

const FOLDER_COLUMNS: &str = "id, account_id, name, folder_type, unread_count, total_count";

fn row_to_folder(row: &Row) -> rusqlite::Result<Folder> {
    let folder_type: String = row.get(3)?;
    Ok(Folder {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        folder_type: folder_type.parse().unwrap_or_default(),
        unread_count: row.get(4)?,
        total_count: row.get(5)?,
    })
}

/// Insert or rename/retype a folder. Counters are left alone on conflict since
/// the message triggers own them.
pub fn upsert_folder(conn: &Connection, folder: &Folder) -> Result<()> {
    conn.execute(
        "INSERT INTO folders (id, account_id, name, folder_type)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            name = excluded.name,
            folder_type = excluded.folder_type",
        params![
            folder.id,
            folder.account_id,
            folder.name,
            folder.folder_type.as_str(),
        ],
    )
    .with_context(|| format!("upsert folder {}", folder.id))?;
    Ok(())
}

pub fn get_folder(conn: &Connection, folder_id: &str) -> Result<Option<Folder>> {
    conn.query_row(
        &format!("SELECT {} FROM folders WHERE id = ?1", FOLDER_COLUMNS),
        params![folder_id],
        row_to_folder,
    )
    .optional()
    .with_context(|| format!("get folder {}", folder_id))
}

pub fn list_folders(conn: &Connection, account_id: &str) -> Result<Vec<Folder>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM folders WHERE account_id = ?1 ORDER BY name ASC",
            FOLDER_COLUMNS
        ))
        .context("prepare folder listing")?;

    let rows = stmt
        .query_map(params![account_id], row_to_folder)
        .with_context(|| format!("list folders of account {}", account_id))?;

    let mut folders = Vec::new();
    for row in rows {
        folders.push(row.context("read folder row")?);
    }
    Ok(folders)
}

/// First folder of the given role for an account
pub fn find_folder_by_type(
    conn: &Connection,
    account_id: &str,
    folder_type: FolderType,
) -> Result<Option<Folder>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM folders WHERE account_id = ?1 AND folder_type = ?2
             ORDER BY name ASC LIMIT 1",
            FOLDER_COLUMNS
        ),
        params![account_id, folder_type.as_str()],
        row_to_folder,
    )
    .optional()
    .with_context(|| format!("find {} folder of account {}", folder_type, account_id))
}

pub fn folder_type_of(conn: &Connection, folder_id: &str) -> Result<Option<FolderType>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT folder_type FROM folders WHERE id = ?1",
            params![folder_id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("get type of folder {}", folder_id))?;
    Ok(raw.map(|t| t.parse().unwrap_or_default()))
}

/// Drops the folder and, by cascade, its messages
pub fn delete_folder(conn: &Connection, folder_id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM folders WHERE id = ?1", params![folder_id])
        .with_context(|| format!("delete folder {}", folder_id))?;
    Ok(deleted > 0)
}

/// Recompute a folder's counters from its rows.
///
/// The triggers keep counters exact; this exists to repair databases written
/// before they were installed.
pub fn recount_folder(conn: &Connection, folder_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE folders SET
            unread_count = (SELECT COUNT(*) FROM messages
                            WHERE folder_id = ?1 AND is_deleted = 0 AND is_read = 0),
            total_count  = (SELECT COUNT(*) FROM messages
                            WHERE folder_id = ?1 AND is_deleted = 0)
         WHERE id = ?1",
        params![folder_id],
    )
    .with_context(|| format!("recount folder {}", folder_id))?;
    Ok(())
}

/// Sum of the cached unread counters of every enabled account's inbox
pub fn unified_unread_count(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(SUM(f.unread_count), 0)
         FROM folders f
         JOIN accounts a ON a.id = f.account_id
         WHERE f.folder_type = 'inbox' AND a.enabled = 1",
        [],
        |row| row.get(0),
    )
    .context("sum unified unread count")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::fixtures;

    #[test]
    fn test_upsert_preserves_counters() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, fixtures::message("acct-a", "a-inbox", 1));

        let mut folder = get_folder(&conn, "a-inbox").unwrap().expect("Missing folder");
        assert_eq!(folder.unread_count, 1);

        folder.name = "Renamed".into();
        folder.unread_count = 0;
        upsert_folder(&conn, &folder).expect("Failed to upsert");

        let stored = get_folder(&conn, "a-inbox").unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.unread_count, 1);
        assert_eq!(stored.total_count, 1);
    }

    #[test]
    fn test_find_by_type() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();

        let trash = find_folder_by_type(&conn, "acct-a", FolderType::Trash)
            .unwrap()
            .expect("Missing trash");
        assert_eq!(trash.id, "a-trash");
        assert!(find_folder_by_type(&conn, "acct-a", FolderType::Spam).unwrap().is_none());
        assert_eq!(folder_type_of(&conn, "b-inbox").unwrap(), Some(FolderType::Inbox));
    }

    #[test]
    fn test_recount_repairs_counters() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        fixtures::insert(&conn, fixtures::message("acct-a", "a-inbox", 1));
        fixtures::insert(&conn, fixtures::message("acct-a", "a-inbox", 2));
        conn.execute("UPDATE folders SET unread_count = 99 WHERE id = 'a-inbox'", [])
            .unwrap();

        recount_folder(&conn, "a-inbox").expect("Failed to recount");
        assert_eq!(get_folder(&conn, "a-inbox").unwrap().unwrap().unread_count, 2);
    }

    #[test]
    fn test_delete_folder_cascades() {
        let pool = fixtures::seeded_pool();
        let conn = pool.get().unwrap();
        let msg = fixtures::insert(&conn, fixtures::message("acct-a", "a-archive", 7));

        assert!(delete_folder(&conn, "a-archive").unwrap());
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages WHERE id = ?1", params![msg.id], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
