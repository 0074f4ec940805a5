//! Pure string helpers used by the store

pub mod address;
pub mod highlight;
pub mod message_id;
