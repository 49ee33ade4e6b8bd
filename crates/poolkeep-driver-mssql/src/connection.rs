//! MS SQL Server connection implementation using tiberius

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use poolkeep_core::{
    Connection, ConnectionConfig, ConnectionFault, FaultSignal, PoolkeepError, Result,
};
use tiberius::error::Error as TiberiusError;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Login timed out after {0:?}")]
    LoginTimeout(Duration),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] TiberiusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MssqlConnectionError {
    /// The host and port of a server-issued routing redirect, if this is one
    pub fn redirect_target(&self) -> Option<(&str, u16)> {
        match self {
            MssqlConnectionError::Tiberius(TiberiusError::Routing { host, port }) => {
                Some((host.as_str(), *port))
            }
            _ => None,
        }
    }
}

impl From<MssqlConnectionError> for PoolkeepError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionClosed => PoolkeepError::Closed,
            MssqlConnectionError::LoginTimeout(_) => PoolkeepError::Timeout(err.to_string()),
            MssqlConnectionError::ConnectionFailed(message) => PoolkeepError::Connection(message),
            MssqlConnectionError::Io(e) => PoolkeepError::from(e),
            MssqlConnectionError::Tiberius(ref e) if is_transport_error(e) => {
                PoolkeepError::Connection(err.to_string())
            }
            MssqlConnectionError::AuthenticationFailed(_) | MssqlConnectionError::Tiberius(_) => {
                PoolkeepError::Driver(err.to_string())
            }
        }
    }
}

/// Whether a tiberius error means the transport underneath is unusable
pub(crate) fn is_transport_error(err: &TiberiusError) -> bool {
    matches!(
        err,
        TiberiusError::Io { .. } | TiberiusError::Tls(_) | TiberiusError::Protocol(_)
    )
}

/// Build the tiberius configuration for a target
pub(crate) fn build_config(
    config: &ConnectionConfig,
) -> std::result::Result<Config, MssqlConnectionError> {
    let mut tds = Config::new();
    tds.host(&config.server);
    tds.port(config.effective_port());
    tds.database(config.effective_database());

    if let Some(name) = &config.transport.application_name {
        tds.application_name(name);
    }
    if config.transport.trust_server_certificate {
        tds.trust_cert();
    }
    tds.encryption(if config.transport.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    match config.user.as_deref() {
        Some(user) if !user.is_empty() => {
            let password = config.password.as_deref().unwrap_or("");
            tds.authentication(AuthMethod::sql_server(user, password));
        }
        _ => {
            return Err(MssqlConnectionError::AuthenticationFailed(
                "a SQL login user is required".to_string(),
            ));
        }
    }

    Ok(tds)
}

/// Liveness flags and fault signal for one connection.
///
/// A connection stops being live once it is closed or once a transport
/// failure has been observed; the first transport failure is raised as a
/// [`ConnectionFault`].
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    closed: AtomicBool,
    broken: AtomicBool,
    faults: FaultSignal,
}

impl LinkState {
    pub(crate) fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.broken.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark closed and end fault delivery. Returns `false` if already closed.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.faults.close();
        true
    }

    /// Record a failed operation, raising a fault for transport failures
    pub(crate) fn record_failure(&self, err: &TiberiusError) {
        if !is_transport_error(err) {
            return;
        }
        if !self.broken.swap(true, Ordering::SeqCst) {
            tracing::error!(error = %err, "SQL Server transport failed");
            self.faults.raise(ConnectionFault::new(err.to_string()));
        }
    }

    pub(crate) fn subscribe(&self) -> Option<broadcast::Receiver<ConnectionFault>> {
        self.faults.subscribe()
    }
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    client: Mutex<Option<TdsClient>>,
    state: LinkState,
    server: String,
    database: String,
}

impl MssqlConnection {
    /// Open a connection to the target described by `config`.
    ///
    /// Follows at most one routing redirect issued by the server during
    /// login. `transport.login_timeout_ms` bounds the whole login.
    #[tracing::instrument(skip(config), fields(server = %config.server, port = config.effective_port()))]
    pub async fn connect(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server");

        let login = login(config);
        let client = match config.transport.login_timeout_ms {
            Some(ms) if ms > 0 => {
                let limit = Duration::from_millis(ms);
                tokio::time::timeout(limit, login)
                    .await
                    .map_err(|_| MssqlConnectionError::LoginTimeout(limit))??
            }
            _ => login.await?,
        };

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            client: Mutex::new(Some(client)),
            state: LinkState::default(),
            server: config.server.clone(),
            database: config.effective_database().to_string(),
        })
    }

    /// Run a batch and return the rows of its first result set
    pub async fn simple_query(&self, sql: &str) -> Result<Vec<Row>> {
        let mut guard = self.client.lock().await;
        let client = self.live_client(&mut guard)?;

        let result = match client.simple_query(sql).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.failed(e))
    }

    fn live_client<'a>(&self, slot: &'a mut Option<TdsClient>) -> Result<&'a mut TdsClient> {
        if !self.state.is_live() {
            return Err(MssqlConnectionError::ConnectionClosed.into());
        }
        slot.as_mut()
            .ok_or_else(|| MssqlConnectionError::ConnectionClosed.into())
    }

    fn failed(&self, err: TiberiusError) -> PoolkeepError {
        self.state.record_failure(&err);
        MssqlConnectionError::Tiberius(err).into()
    }
}

async fn login(config: &ConnectionConfig) -> std::result::Result<TdsClient, MssqlConnectionError> {
    match handshake(build_config(config)?).await {
        Err(err) => match err.redirect_target() {
            Some((host, port)) => {
                tracing::info!(host, port, "following server routing redirect");
                let mut tds = build_config(config)?;
                tds.host(host);
                tds.port(port);
                match handshake(tds).await {
                    Err(e) if e.redirect_target().is_some() => {
                        Err(MssqlConnectionError::ConnectionFailed(
                            "server redirected the login more than once".to_string(),
                        ))
                    }
                    other => other,
                }
            }
            None => Err(err),
        },
        ok => ok,
    }
}

async fn handshake(tds: Config) -> std::result::Result<TdsClient, MssqlConnectionError> {
    let addr = tds.get_addr();
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| MssqlConnectionError::ConnectionFailed(format!("{}: {}", addr, e)))?;
    tcp.set_nodelay(true)?;

    Ok(Client::connect(tds, tcp.compat_write()).await?)
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn is_connected(&self) -> bool {
        self.state.is_live()
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut guard = self.client.lock().await;
        let client = self.live_client(&mut guard)?;

        match client.execute(sql, &[]).await {
            Ok(result) => Ok(result.total()),
            Err(e) => {
                tracing::error!(error = %e, "execute failed");
                Err(self.failed(e))
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.simple_query("SELECT 1").await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if !self.state.mark_closed() {
            return Ok(());
        }
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .close()
                .await
                .map_err(|e| PoolkeepError::Driver(format!("close failed: {}", e)))?;
        }
        tracing::debug!(server = %self.server, "MS SQL Server connection closed");
        Ok(())
    }

    fn subscribe_faults(&self) -> Option<broadcast::Receiver<ConnectionFault>> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("live", &self.state.is_live())
            .field("closed", &self.state.is_closed())
            .finish()
    }
}
