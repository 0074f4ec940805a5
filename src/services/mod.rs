//! Store-level logic built on the SQLite adapters
//!
//! No pool handling here: functions take a connection and the
//! [`crate::store::MailStore`] facade supplies it.

mod events;
mod message_service;

pub use events::*;
pub use message_service::*;
