use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{FolderType, MessageHeader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: Option<String>,
    pub email: String,
}

impl Participant {
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Aggregate of one thread within a view. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// `coalesce(thread_id, id)` shared by every member
    pub thread_id: String,
    pub account_id: String,
    /// Subject of the earliest message
    pub subject: Option<String>,
    /// Most recent non-empty snippet
    pub snippet: Option<String>,
    pub message_count: u32,
    pub unread_count: u32,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub latest_date: DateTime<Utc>,
    /// Senders in order of first appearance, deduplicated by email
    pub participants: Vec<Participant>,
    /// Members, oldest first
    pub message_ids: Vec<String>,
}

/// A unified-inbox row: a conversation plus the account that owns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConversation {
    pub conversation: Conversation,
    pub account_id: String,
    pub account_name: String,
    pub account_color: Option<String>,
    pub inbox_folder_id: String,
}

/// A search hit with its highlighted display fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub conversation: Conversation,
    pub folder_id: String,
    pub folder_name: String,
    pub folder_type: FolderType,
    /// Present for unified search only
    pub account_name: Option<String>,
    pub account_color: Option<String>,
    pub highlighted_subject: String,
    pub highlighted_snippet: String,
    pub highlighted_sender: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Page window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// Folds a chronological run of headers into a [`Conversation`].
///
/// Headers must be pushed oldest first; the subject and participant order
/// depend on it.
#[derive(Debug)]
pub struct ConversationBuilder {
    conversation: Conversation,
    seen_emails: HashSet<String>,
}

impl ConversationBuilder {
    pub fn new(first: &MessageHeader) -> Self {
        let mut builder = Self {
            conversation: Conversation {
                thread_id: first.thread_key.clone(),
                account_id: first.account_id.clone(),
                subject: first.subject.clone(),
                snippet: None,
                message_count: 0,
                unread_count: 0,
                is_starred: false,
                has_attachments: false,
                latest_date: first.date,
                participants: Vec::new(),
                message_ids: Vec::new(),
            },
            seen_emails: HashSet::new(),
        };
        builder.push(first);
        builder
    }

    pub fn push(&mut self, header: &MessageHeader) {
        let conv = &mut self.conversation;
        conv.message_count += 1;
        if !header.is_read {
            conv.unread_count += 1;
        }
        conv.is_starred |= header.is_starred;
        conv.has_attachments |= header.has_attachments;
        if header.date > conv.latest_date {
            conv.latest_date = header.date;
        }
        if let Some(snippet) = header.snippet.as_deref().filter(|s| !s.trim().is_empty()) {
            conv.snippet = Some(snippet.to_string());
        }
        if conv.subject.is_none() {
            conv.subject = header.subject.clone();
        }
        if let Some(email) = header.from_email.as_deref().filter(|e| !e.is_empty()) {
            if self.seen_emails.insert(email.to_lowercase()) {
                conv.participants.push(Participant {
                    name: header.from_name.clone(),
                    email: email.to_string(),
                });
            }
        }
        conv.message_ids.push(header.id.clone());
    }

    pub fn finish(self) -> Conversation {
        self.conversation
    }
}
