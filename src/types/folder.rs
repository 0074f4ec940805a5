use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a folder, as reported by the sync layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    #[default]
    Other,
}

impl FolderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderType::Inbox => "inbox",
            FolderType::Sent => "sent",
            FolderType::Drafts => "drafts",
            FolderType::Trash => "trash",
            FolderType::Spam => "spam",
            FolderType::Archive => "archive",
            FolderType::Other => "other",
        }
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FolderType {
    type Err = std::convert::Infallible;

    /// Unknown roles map to `Other` rather than failing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "inbox" => FolderType::Inbox,
            "sent" => FolderType::Sent,
            "drafts" => FolderType::Drafts,
            "trash" => FolderType::Trash,
            "spam" | "junk" => FolderType::Spam,
            "archive" => FolderType::Archive,
            _ => FolderType::Other,
        })
    }
}

/// A folder and its cached counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub folder_type: FolderType,
    /// Maintained by the store on every message insert, delete, move and
    /// read/deleted flag change.
    pub unread_count: u32,
    pub total_count: u32,
}

impl Folder {
    pub fn new(id: &str, account_id: &str, name: &str, folder_type: FolderType) -> Self {
        Self {
            id: id.to_string(),
            account_id: account_id.to_string(),
            name: name.to_string(),
            folder_type,
            unread_count: 0,
            total_count: 0,
        }
    }
}

/// Minimal account record: enough for unified views and retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub enabled: bool,
    /// Messages older than this many days are pruned
    pub retention_days: Option<u32>,
}

impl Account {
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            name: None,
            color: None,
            enabled: true,
            retention_days: None,
        }
    }

    /// Name shown next to unified-inbox rows
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}
