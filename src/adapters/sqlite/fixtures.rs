//! Shared test seeding: two accounts, a handful of folders and a message factory.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;

use super::accounts::upsert_account;
use super::folders::upsert_folder;
use super::messages::create_message;
use super::pool::{create_memory_pool, DbPool};
use super::schema::initialize_schema;
use crate::types::{Account, Folder, FolderType, Message};

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub(crate) fn seed(conn: &Connection) {
    initialize_schema(conn).expect("Failed to initialize schema");

    let mut personal = Account::new("acct-a", "alice@example.com");
    personal.name = Some("Personal".into());
    personal.color = Some("#3366ff".into());
    upsert_account(conn, &personal).expect("Failed to seed account");

    let mut work = Account::new("acct-b", "alice@work.example");
    work.name = Some("Work".into());
    work.color = Some("#ff6633".into());
    upsert_account(conn, &work).expect("Failed to seed account");

    for folder in [
        Folder::new("a-inbox", "acct-a", "INBOX", FolderType::Inbox),
        Folder::new("a-sent", "acct-a", "Sent", FolderType::Sent),
        Folder::new("a-trash", "acct-a", "Trash", FolderType::Trash),
        Folder::new("a-archive", "acct-a", "Archive", FolderType::Archive),
        Folder::new("b-inbox", "acct-b", "INBOX", FolderType::Inbox),
        Folder::new("b-trash", "acct-b", "Trash", FolderType::Trash),
    ] {
        upsert_folder(conn, &folder).expect("Failed to seed folder");
    }
}

pub(crate) fn seeded_pool() -> DbPool {
    let pool = create_memory_pool().expect("Failed to create pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        seed(&conn);
    }
    pool
}

/// Unread, unthreaded message dated `uid` minutes after [`base_time`]
pub(crate) fn message(account_id: &str, folder_id: &str, uid: u32) -> Message {
    let date = base_time() + Duration::minutes(i64::from(uid));
    Message {
        account_id: account_id.into(),
        folder_id: folder_id.into(),
        uid,
        message_id: Some(format!("<{}-{}@example.com>", uid, folder_id)),
        subject: Some(format!("Subject {}", uid)),
        from_name: Some("Bob Sender".into()),
        from_email: Some("bob@example.com".into()),
        date: Some(date),
        snippet: Some(format!("Snippet {}", uid)),
        size: 1024,
        received_at: Some(date + Duration::seconds(5)),
        ..Default::default()
    }
}

pub(crate) fn insert(conn: &Connection, mut msg: Message) -> Message {
    create_message(conn, &mut msg).expect("Failed to insert message");
    msg
}
