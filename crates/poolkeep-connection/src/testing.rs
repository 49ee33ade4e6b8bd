//! Mock connections and connectors shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use poolkeep_core::{
    Connection, ConnectionConfig, ConnectionFault, Connector, FaultSignal, PoolkeepError, Result,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Mock connection that can be killed, faulted, or made to fail on close
pub(crate) struct MockConnection {
    pub(crate) id: usize,
    pub(crate) server: String,
    connected: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_close: bool,
    faults: FaultSignal,
}

impl MockConnection {
    pub(crate) fn new(id: usize, server: &str) -> Self {
        Self {
            id,
            server: server.to_string(),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            fail_close: false,
            faults: FaultSignal::new(),
        }
    }

    pub(crate) fn failing_close(id: usize, server: &str) -> Self {
        Self {
            fail_close: true,
            ..Self::new(id, server)
        }
    }

    /// Simulate the server dropping the connection without notice
    pub(crate) fn kill(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Simulate an asynchronous transport failure
    pub(crate) fn raise_fault(&self, message: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.faults.raise(ConnectionFault::new(message));
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        if !self.is_connected() {
            return Err(PoolkeepError::Closed);
        }
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.faults.close();
        if self.fail_close {
            return Err(PoolkeepError::Connection("mock close failure".into()));
        }
        Ok(())
    }

    fn subscribe_faults(&self) -> Option<broadcast::Receiver<ConnectionFault>> {
        self.faults.subscribe()
    }
}

/// Mock connector with scripted failures and a record of every attempt
pub(crate) struct MockConnector {
    attempts: AtomicUsize,
    fail_remaining: AtomicU32,
    hang_remaining: AtomicU32,
    fail_all: bool,
    fail_close: bool,
    dead_on_arrival: AtomicU32,
    connect_delay: Option<Duration>,
    attempt_times: Mutex<Vec<Instant>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            fail_remaining: AtomicU32::new(0),
            hang_remaining: AtomicU32::new(0),
            fail_all: false,
            fail_close: false,
            dead_on_arrival: AtomicU32::new(0),
            connect_delay: None,
            attempt_times: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// The first `failures` attempts return an error
    pub(crate) fn failing_first(failures: u32) -> Self {
        let connector = Self::new();
        connector.fail_remaining.store(failures, Ordering::SeqCst);
        connector
    }

    /// Every attempt returns an error
    pub(crate) fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// The first `hangs` attempts never complete
    pub(crate) fn hanging_first(hangs: u32) -> Self {
        let connector = Self::new();
        connector.hang_remaining.store(hangs, Ordering::SeqCst);
        connector
    }

    /// The first `count` attempts succeed with an already dead connection
    pub(crate) fn dead_on_arrival_first(count: u32) -> Self {
        let connector = Self::new();
        connector.dead_on_arrival.store(count, Ordering::SeqCst);
        connector
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }

    /// Connections handed out, in creation order
    pub(crate) fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().clone()
    }

    pub(crate) fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.connections.lock()[index].clone()
    }

    pub(crate) fn connections_for(&self, server: &str) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .iter()
            .filter(|conn| conn.server == server)
            .cloned()
            .collect()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempt_times.lock().push(Instant::now());

        if take_one(&self.hang_remaining) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_all || take_one(&self.fail_remaining) {
            return Err(PoolkeepError::Connection(format!("attempt {} refused", attempt)));
        }
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let connection = Arc::new(if self.fail_close {
            MockConnection::failing_close(attempt, &config.server)
        } else {
            MockConnection::new(attempt, &config.server)
        });
        if take_one(&self.dead_on_arrival) {
            connection.kill();
        }
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Shorthand for a config targeting `server` with a fixed user
pub(crate) fn config(server: &str) -> ConnectionConfig {
    ConnectionConfig::new(server).with_credentials("app", "secret")
}

/// Let spawned close and fault tasks run
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
