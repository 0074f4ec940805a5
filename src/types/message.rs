use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single mailbox in an address list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    pub fn new(name: Option<&str>, email: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            email: email.to_string(),
        }
    }
}

/// The six protocol flags tracked per message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub is_read: bool,
    pub is_starred: bool,
    pub is_answered: bool,
    pub is_forwarded: bool,
    pub is_draft: bool,
    pub is_deleted: bool,
}

/// Cached S/MIME state. The engine never verifies or decrypts; it only keeps
/// what the crypto layer handed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmimeInfo {
    pub status: Option<String>,
    pub signer_email: Option<String>,
    pub signer_subject: Option<String>,
    pub encrypted: bool,
    #[serde(skip)]
    pub raw_body: Option<Vec<u8>>,
}

/// Cached PGP state, same contract as [`SmimeInfo`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpInfo {
    pub status: Option<String>,
    pub signer_email: Option<String>,
    pub signer_key_id: Option<String>,
    pub encrypted: bool,
    #[serde(skip)]
    pub raw_body: Option<Vec<u8>>,
}

/// A stored message
///
/// An empty `id` or a missing `received_at` are filled in by `create_message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub account_id: String,
    pub folder_id: String,
    pub uid: u32,

    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub thread_id: Option<String>,

    pub subject: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub date: Option<DateTime<Utc>>,
    pub snippet: Option<String>,

    pub flags: MessageFlags,
    pub size: u32,
    pub has_attachments: bool,

    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub body_fetched: bool,

    pub read_receipt_to: Option<String>,
    pub read_receipt_handled: bool,

    pub smime: SmimeInfo,
    pub pgp: PgpInfo,

    pub received_at: Option<DateTime<Utc>>,
}

impl Message {
    /// The grouping key used by every conversation view
    pub fn thread_key(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.id)
    }
}

/// Lightweight projection used for list views and aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: String,
    pub account_id: String,
    pub folder_id: String,
    pub uid: u32,
    /// `coalesce(thread_id, id)`
    pub thread_key: String,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    /// Header date, or received-at when the message carried none
    pub date: DateTime<Utc>,
    pub snippet: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub size: u32,
}

/// Flag state reported by the server for one UID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidFlags {
    pub uid: u32,
    pub flags: MessageFlags,
}

/// Rendered body produced by a body fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedBody {
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub snippet: Option<String>,
}

/// What to do with a stored raw encrypted payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawBodyChange {
    #[default]
    Keep,
    Set(Vec<u8>),
    Clear,
}

/// Cached crypto status written by a body batch. `raw_body` is independent of
/// the status fields so a status refresh never drops the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoUpdate {
    pub status: Option<String>,
    pub signer_email: Option<String>,
    /// Signer subject for S/MIME, key id for PGP
    pub signer_detail: Option<String>,
    pub encrypted: bool,
    pub raw_body: RawBodyChange,
}

/// One row of a body batch. `None` parts are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyUpdate {
    pub id: String,
    pub body: Option<RenderedBody>,
    pub smime: Option<CryptoUpdate>,
    pub pgp: Option<CryptoUpdate>,
}
