//! MS SQL Server connector for Poolkeep
//!
//! This crate provides a [`Connector`](poolkeep_core::Connector) that opens
//! SQL Server connections with tiberius over a Tokio TCP stream. Transport
//! failures on a live connection are raised through its fault signal so the
//! pool evicts it.

mod connection;
mod driver;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod driver_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
pub use driver::MssqlConnector;
