//! Connection target configuration

use serde::{Deserialize, Serialize};

/// Port used when a configuration does not name one
pub const DEFAULT_PORT: u16 = 1433;

/// Database used when a configuration does not name one
pub const DEFAULT_DATABASE: &str = "master";

/// Transport settings passed through to the underlying connection.
///
/// These never affect which pool entry a configuration maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Require an encrypted channel
    pub encrypt: bool,
    /// Accept any server certificate (development servers)
    pub trust_server_certificate: bool,
    /// Application name reported to the server
    pub application_name: Option<String>,
    /// Driver-level login timeout in milliseconds
    pub login_timeout_ms: Option<u64>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            trust_server_certificate: false,
            application_name: None,
            login_timeout_ms: None,
        }
    }
}

/// Describes one logical database target.
///
/// `server` is required; `port` and `database` fall back to
/// [`DEFAULT_PORT`] and [`DEFAULT_DATABASE`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub server: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub transport: TransportOptions,
}

impl ConnectionConfig {
    /// Create a configuration for the given server with every other field defaulted
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: None,
            database: None,
            user: None,
            password: None,
            transport: TransportOptions::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set SQL login credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Port with the default applied
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port > 0 => port,
            _ => DEFAULT_PORT,
        }
    }

    /// Database with the default applied
    pub fn effective_database(&self) -> &str {
        match self.database.as_deref() {
            Some(db) if !db.is_empty() => db,
            _ => DEFAULT_DATABASE,
        }
    }

    /// User name, empty when absent
    pub fn effective_user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("transport", &self.transport)
            .finish()
    }
}
