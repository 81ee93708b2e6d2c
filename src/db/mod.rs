pub mod http;
pub mod sql;
pub mod value;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpDriver;
pub use value::{CellValue, Column, QueryResult};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Validated parameters for opening a session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl ConnectParams {
    /// Checks the resolved credentials before any network I/O happens.
    pub fn validate(creds: &Credentials) -> Result<Self> {
        let host = creds.host.trim();
        let port = creds.port.trim();
        let username = creds.username.trim();
        let database = creds.database.trim();

        let missing: Vec<&str> = [
            ("host", host),
            ("port", port),
            ("username", username),
            ("database", database),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "All fields except password must be filled (missing: {})",
                missing.join(", ")
            )));
        }

        let port = match port.parse::<i64>() {
            Ok(p) if (1..=65535).contains(&p) => p as u16,
            Ok(_) => {
                return Err(Error::Validation(
                    "Port must be between 1 and 65535".to_string(),
                ));
            }
            Err(_) => {
                return Err(Error::Validation(format!(
                    "Port must be a number, got: {}",
                    port
                )));
            }
        };

        Ok(ConnectParams {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: creds.password.clone(),
            database: database.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Opens sessions against a server.
#[allow(async_fn_in_trait)]
pub trait Driver {
    type Session: Session;

    async fn open(&self, params: &ConnectParams) -> Result<Self::Session>;
}

/// A live session able to run statements.
///
/// Implementations report a rejected statement as [`Error::Query`] and a
/// broken transport as [`Error::Connection`].
#[allow(async_fn_in_trait)]
pub trait Session {
    async fn query(&self, sql: &str) -> Result<QueryResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Live<S> {
    session: S,
    endpoint: String,
}

/// Owns the single active session.
pub struct ConnectionManager<D: Driver> {
    driver: D,
    live: Option<Live<D::Session>>,
    state: ConnectionState,
}

impl<D: Driver> ConnectionManager<D> {
    pub fn new(driver: D) -> Self {
        ConnectionManager {
            driver,
            live: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// `host:port/database` of the live session.
    pub fn endpoint(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.endpoint.as_str())
    }

    pub async fn connect(&mut self, creds: &Credentials) -> Result<()> {
        let params = ConnectParams::validate(creds)?;

        self.disconnect();
        self.state = ConnectionState::Connecting;
        info!(
            host = %params.host,
            port = params.port,
            database = %params.database,
            user = %params.username,
            "connecting"
        );

        match self.open_and_probe(&params).await {
            Ok(session) => {
                self.live = Some(Live {
                    session,
                    endpoint: params.endpoint(),
                });
                self.state = ConnectionState::Connected;
                info!(endpoint = %params.endpoint(), "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!(endpoint = %params.endpoint(), error = %e, "connection attempt failed");
                Err(e)
            }
        }
    }

    async fn open_and_probe(&self, params: &ConnectParams) -> Result<D::Session> {
        let session = self.driver.open(params).await?;
        // Authentication is only checked once a statement reaches the server
        match session.query(sql::PING).await {
            Ok(_) => Ok(session),
            Err(Error::Query(message)) => Err(Error::Connection(message)),
            Err(e) => Err(e),
        }
    }

    pub async fn execute(&mut self, query: &str) -> Result<QueryResult> {
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| Error::Connection("Not connected to database".to_string()))?;

        debug!(query, "executing query");
        let outcome = live.session.query(query).await;
        match outcome {
            Ok(result) => {
                debug!(rows = result.rows.len(), "query finished");
                Ok(result)
            }
            Err(e @ Error::Connection(_)) => {
                warn!(error = %e, "connection lost, dropping session");
                self.disconnect();
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "query rejected");
                Err(e)
            }
        }
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let result = self.execute(sql::SHOW_TABLES).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(|cell| cell.to_string())
            .collect())
    }

    /// Ordered `(name, type)` pairs of a table's columns.
    pub async fn get_columns(&mut self, table: &str) -> Result<Vec<(String, String)>> {
        if table.trim().is_empty() {
            return Err(Error::Validation("Table name must not be empty".to_string()));
        }
        let result = self.execute(&sql::describe_table(table)).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.first()?.to_string();
                let type_name = row.get(1).map(|c| c.to_string()).unwrap_or_default();
                Some((name, type_name))
            })
            .collect())
    }

    /// Drops the session if there is one. Returns whether anything was dropped.
    pub fn disconnect(&mut self) -> bool {
        self.state = ConnectionState::Disconnected;
        match self.live.take() {
            Some(live) => {
                info!(endpoint = %live.endpoint, "disconnected");
                true
            }
            None => false,
        }
    }
}
