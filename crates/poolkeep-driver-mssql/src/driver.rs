//! MS SQL Server connector implementation

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use poolkeep_core::{Connection, ConnectionConfig, Connector, Result};

use crate::connection::MssqlConnection;

/// Opens MS SQL Server connections for the pool
#[derive(Debug, Clone, Default)]
pub struct MssqlConnector {
    /// Reported to the server when a target does not name its own
    application_name: Option<String>,
}

impl MssqlConnector {
    /// Create a new MS SQL Server connector
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server connector initialized");
        Self::default()
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// The configuration actually used for `config`, with connector defaults applied
    pub(crate) fn prepare<'a>(&self, config: &'a ConnectionConfig) -> Cow<'a, ConnectionConfig> {
        match (&self.application_name, &config.transport.application_name) {
            (Some(name), None) => {
                let mut config = config.clone();
                config.transport.application_name = Some(name.clone());
                Cow::Owned(config)
            }
            _ => Cow::Borrowed(config),
        }
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    #[tracing::instrument(skip(self, config), fields(server = %config.server, database = %config.effective_database()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let config = self.prepare(config);
        let connection = MssqlConnection::connect(&config).await?;
        Ok(Arc::new(connection))
    }
}
