use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Context, Result};
use crate::types::Account;

const ACCOUNT_COLUMNS: &str = "id, email, name, color, enabled, retention_days";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        enabled: row.get(4)?,
        retention_days: row.get(5)?,
    })
}

/// Insert or update an account, keeping its original `created_at`
pub fn upsert_account(conn: &Connection, account: &Account) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO accounts (id, email, name, color, enabled, retention_days, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            color = excluded.color,
            enabled = excluded.enabled,
            retention_days = excluded.retention_days",
        params![
            account.id,
            account.email,
            account.name,
            account.color,
            account.enabled,
            account.retention_days,
            now,
        ],
    )
    .with_context(|| format!("upsert account {}", account.id))?;
    Ok(())
}

pub fn get_account(conn: &Connection, account_id: &str) -> Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
        params![account_id],
        row_to_account,
    )
    .optional()
    .with_context(|| format!("get account {}", account_id))
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    query_accounts(conn, "")
}

/// Accounts that participate in unified views
pub fn list_enabled_accounts(conn: &Connection) -> Result<Vec<Account>> {
    query_accounts(conn, "WHERE enabled = 1")
}

fn query_accounts(conn: &Connection, filter: &str) -> Result<Vec<Account>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM accounts {} ORDER BY created_at ASC, id ASC",
            ACCOUNT_COLUMNS, filter
        ))
        .context("prepare account listing")?;

    let rows = stmt
        .query_map([], row_to_account)
        .context("list accounts")?;

    let mut accounts = Vec::new();
    for row in rows {
        accounts.push(row.context("read account row")?);
    }
    Ok(accounts)
}

/// Returns false when the account does not exist
pub fn set_account_enabled(conn: &Connection, account_id: &str, enabled: bool) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE accounts SET enabled = ?1 WHERE id = ?2",
            params![enabled, account_id],
        )
        .with_context(|| format!("set enabled on account {}", account_id))?;
    Ok(updated > 0)
}

/// Removes the account with its folders and messages (cascade)
pub fn delete_account(conn: &Connection, account_id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM accounts WHERE id = ?1", params![account_id])
        .with_context(|| format!("delete account {}", account_id))?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::schema::initialize_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to open database");
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        initialize_schema(&conn).expect("Failed to initialize schema");
        conn
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = conn();
        let mut account = Account::new("a1", "me@example.com");
        account.color = Some("#ff0000".into());
        upsert_account(&conn, &account).expect("Failed to upsert");

        account.name = Some("Work".into());
        upsert_account(&conn, &account).expect("Failed to update");

        let stored = get_account(&conn, "a1").expect("Failed to get").expect("Missing account");
        assert_eq!(stored, account);
        assert_eq!(stored.display_name(), "Work");
        assert!(get_account(&conn, "nope").expect("Failed to get").is_none());
    }

    #[test]
    fn test_enabled_filter() {
        let conn = conn();
        upsert_account(&conn, &Account::new("a1", "one@example.com")).unwrap();
        upsert_account(&conn, &Account::new("a2", "two@example.com")).unwrap();

        assert!(set_account_enabled(&conn, "a2", false).unwrap());
        assert!(!set_account_enabled(&conn, "missing", false).unwrap());

        let enabled: Vec<String> = list_enabled_accounts(&conn)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(enabled, vec!["a1"]);
        assert_eq!(list_accounts(&conn).unwrap().len(), 2);
    }
}
