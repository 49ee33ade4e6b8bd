//! Poolkeep Core - Core abstractions shared by the pool manager and drivers
//!
//! This crate provides the vocabulary every other Poolkeep crate depends on:
//!
//! - `Connection` - Trait for a live, pooled database connection
//! - `Connector` - Trait for establishing new connections
//! - `ConnectionConfig` - The target description a caller hands to the pool
//! - `ConnectionFault` - Asynchronous failure raised by a live connection
//! - `PoolkeepError` - The error taxonomy and `Result` alias

mod config;
mod connection;
mod error;


pub use config::{ConnectionConfig, DEFAULT_DATABASE, DEFAULT_PORT, TransportOptions};
pub use connection::{Connection, ConnectionFault, Connector, FaultSignal};
pub use error::{PoolkeepError, Result};
