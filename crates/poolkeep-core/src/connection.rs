//! Connection and connector traits

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{ConnectionConfig, Result};

/// An asynchronous failure reported by a connection that was healthy when it
/// was handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFault {
    pub message: String,
}

impl ConnectionFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConnectionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Broadcast point for [`ConnectionFault`]s.
///
/// Drivers embed one of these and call [`FaultSignal::raise`] when the
/// transport fails underneath them. Observers obtain receivers through
/// [`Connection::subscribe_faults`]. Closing the signal wakes every observer
/// with a closed channel so they can stop watching.
#[derive(Debug)]
pub struct FaultSignal {
    sender: Mutex<Option<broadcast::Sender<ConnectionFault>>>,
}

impl FaultSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(4);
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Notify every current observer. Returns how many observers received it.
    pub fn raise(&self, fault: ConnectionFault) -> usize {
        tracing::debug!(fault = %fault, "raising connection fault");
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(fault).unwrap_or(0),
            None => 0,
        }
    }

    /// A receiver for future faults, or `None` once the signal is closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ConnectionFault>> {
        self.sender.lock().as_ref().map(|sender| sender.subscribe())
    }

    /// Drop the sender; observers see a closed channel.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for FaultSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A live database connection held by the pool
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mssql")
    fn driver_name(&self) -> &str;

    /// Whether the connection still reports itself usable
    fn is_connected(&self) -> bool;

    /// Execute a statement, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Round-trip a trivial statement to verify the connection
    async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Close the underlying transport
    async fn close(&self) -> Result<()>;

    /// Subscribe to asynchronous failures of this connection.
    ///
    /// Returns `None` when the driver cannot report faults or the
    /// connection is already closed.
    fn subscribe_faults(&self) -> Option<broadcast::Receiver<ConnectionFault>> {
        None
    }
}

/// Establishes new connections for a target.
///
/// Every call must produce a fresh, independent connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Create and connect a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        (**self).connect(config).await
    }
}
