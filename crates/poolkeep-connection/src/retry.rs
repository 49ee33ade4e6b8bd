//! Connection creation with retry
//!
//! This module creates connections through a [`Connector`](poolkeep_core::Connector),
//! retrying failed attempts with exponential backoff and jitter.
//!
//! # Example
//!
//! ```ignore
//! use poolkeep_connection::retry::{BackoffStrategy, RetryPolicy, connect_with_retry};
//!
//! let backoff = BackoffStrategy::new(1000).with_factor(2.0).with_jitter(0.3);
//! let policy = RetryPolicy::new(3, backoff);
//!
//! let conn = connect_with_retry(&connector, &config, &key, &policy).await?;
//! ```

mod backoff;
mod connect;

#[cfg(test)]
mod tests;

pub use backoff::BackoffStrategy;
pub use connect::{RetryPolicy, connect_with_retry};
