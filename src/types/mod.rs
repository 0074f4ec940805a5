//! Data structures shared by the store and its callers

pub mod conversation;
pub mod folder;
pub mod message;

pub use conversation::{
    Conversation, ConversationBuilder, Page, Participant, SearchResult, SortOrder,
    UnifiedConversation,
};
pub use folder::{Account, Folder, FolderType};
pub use message::{
    Address, BodyUpdate, CryptoUpdate, Message, MessageFlags, MessageHeader, PgpInfo,
    RawBodyChange, RenderedBody, SmimeInfo, UidFlags,
};
