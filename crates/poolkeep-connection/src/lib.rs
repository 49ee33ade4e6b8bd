//! Poolkeep Connection - Keyed connection pooling
//!
//! This crate caches live database connections per logical target so
//! repeated requests reuse a connection instead of reconnecting. It bounds
//! the number of cached connections, evicts idle and dead ones, and retries
//! connection creation with exponential backoff and jitter.
//!
//! # Example
//!
//! ```ignore
//! use poolkeep_connection::{PoolManager, PoolOptions};
//! use poolkeep_core::ConnectionConfig;
//!
//! let manager = PoolManager::new(connector, PoolOptions::default());
//! manager.start_auto_cleanup(None)?;
//!
//! let config = ConnectionConfig::new("db.internal").with_credentials("app", "secret");
//! let conn = manager.get_or_create(&config).await?;
//! // ... use conn; the pool keeps ownership ...
//!
//! manager.close_all().await;
//! ```

mod key;
mod manager;
mod options;
pub mod pool;
pub mod retry;

#[cfg(test)]
mod testing;

pub use key::PoolKey;
pub use manager::PoolManager;
pub use options::{PoolOptions, PoolOptionsUpdate};
pub use pool::{EntrySnapshot, PoolStats};
pub use retry::{BackoffStrategy, RetryPolicy, connect_with_retry};
