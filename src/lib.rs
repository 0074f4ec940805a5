//! mailstore - local-first message persistence and conversation threading
//!
//! Stores synchronized mail in SQLite, threads messages as they arrive in any
//! order, keeps a full-text index and serves per-folder, per-thread and
//! unified-inbox views.
//!
//! ## Module Organization
//!
//! - `adapters/sqlite/`: schema, repositories, threading, aggregation, search, batches
//! - `services/`: ingest, retention and invalidation events
//! - `store`: the [`MailStore`] facade most callers use
//! - `types/`: data structures shared with callers
//! - `helpers/`: identifier canonicalization, address parsing, highlighting
//! - `config/`: TOML configuration

pub mod adapters;
pub mod config;
pub mod error;
pub mod helpers;
pub mod services;
pub mod store;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use services::{IngestOutcome, PruneReport, StoreEvent};
pub use store::MailStore;

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber for binaries and tests that embed the store.
///
/// `RUST_LOG` wins when set. Otherwise `default_directive` is used, or debug
/// logs for this crate in debug builds and info elsewhere. Calling it twice is
/// harmless.
pub fn init_tracing(default_directive: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match default_directive {
        Some(directive) => EnvFilter::new(directive),
        None if cfg!(debug_assertions) => EnvFilter::new("mailstore=debug,info"),
        None => EnvFilter::new("info"),
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
