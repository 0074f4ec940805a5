use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::time::Duration;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Open (creating if needed) the database file named by `config`.
///
/// Pragmas are connection-scoped in SQLite, so they run on every connection
/// the pool opens rather than once.
pub fn create_pool(config: &StoreConfig) -> Result<DbPool> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let pragmas = format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -{};
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;",
        config.cache_size_kib
    );

    let manager = SqliteConnectionManager::file(&config.database_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(&pragmas)
    });

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .map_err(|e| StoreError::Database(format!("Failed to create database pool: {}", e)))?;

    info!(
        "Opened mail store at {} (pool size {})",
        config.database_path.display(),
        config.pool_size
    );
    Ok(pool)
}

/// Single-connection in-memory pool.
///
/// Every SQLite memory connection is its own database, so the pool must never
/// grow past one and its connection must never be recycled.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .map_err(|e| StoreError::Database(format!("Failed to create database pool: {}", e)))
}
