//! Application context tying the credential store and the connection manager
//! to a status callback.
//!
//! Every operation here reports its outcome through the callback as a
//! `(message, is_error)` pair and hands back a plain value, so front ends never
//! have to deal with [`crate::Error`] themselves.

use crate::config::Settings;
use crate::credentials::{CredentialStore, Credentials};
use crate::db::sql::{self, TableFilter};
use crate::db::{ConnectionManager, ConnectionState, Driver, QueryResult};
use std::borrow::Cow;
use tracing::warn;

pub type StatusCallback = Box<dyn FnMut(&str, bool)>;

/// Limits applied to statements issued from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_rows: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            default_limit: 100,
            max_rows: 1000,
        }
    }
}

impl From<&Settings> for QueryLimits {
    fn from(settings: &Settings) -> Self {
        QueryLimits {
            default_limit: settings.default_limit,
            max_rows: settings.max_rows_limit,
        }
    }
}

pub struct Workbench<D: Driver> {
    store: CredentialStore,
    manager: ConnectionManager<D>,
    limits: QueryLimits,
    status: StatusCallback,
}

impl<D: Driver> Workbench<D> {
    pub fn new(
        store: CredentialStore,
        manager: ConnectionManager<D>,
        limits: QueryLimits,
        status: StatusCallback,
    ) -> Self {
        Workbench {
            store,
            manager,
            limits,
            status,
        }
    }

    fn report(&mut self, message: &str, is_error: bool) {
        (self.status)(message, is_error);
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.manager.endpoint()
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.store.names()
    }

    /// Loads saved profiles. A broken credentials file leaves the store empty.
    pub fn load_profiles(&mut self) -> Vec<String> {
        match self.store.load() {
            Ok(profiles) if profiles.is_empty() => {
                self.report(
                    "No saved credentials found. Please enter connection details.",
                    false,
                );
            }
            Ok(profiles) => {
                let message = format!("Loaded {} saved connection(s)", profiles.len());
                self.report(&message, false);
            }
            Err(e) => {
                warn!(error = %e, "starting without stored profiles");
                let message = format!(
                    "Failed to load credentials: {}. Starting with no stored profiles.",
                    e
                );
                self.report(&message, true);
            }
        }
        self.store.names()
    }

    /// Decrypted copy of a saved profile, e.g. to prefill an edit form.
    pub fn profile(&mut self, name: &str) -> Option<Credentials> {
        match self.store.get(name) {
            Ok(creds) => Some(creds),
            Err(e) => {
                let message = format!("Failed to load credentials: {}", e);
                self.report(&message, true);
                None
            }
        }
    }

    pub fn save_profile(&mut self, creds: &Credentials) -> bool {
        match self.store.save(creds) {
            Ok(()) => {
                let message = format!("Credentials '{}' saved successfully", creds.name.trim());
                self.report(&message, false);
                true
            }
            Err(e) => {
                let message = format!("Failed to save credentials: {}", e);
                self.report(&message, true);
                false
            }
        }
    }

    pub fn delete_profile(&mut self, name: &str) -> bool {
        match self.store.delete(name) {
            Ok(()) => {
                let message = format!("Credentials '{}' deleted successfully", name);
                self.report(&message, false);
                true
            }
            Err(e) => {
                let message = format!("Failed to delete credentials: {}", e);
                self.report(&message, true);
                false
            }
        }
    }

    pub async fn connect_profile(&mut self, name: &str) -> bool {
        match self.store.get(name) {
            Ok(creds) => self.connect(&creds).await,
            Err(e) => {
                let message = format!("Connection failed: {}", e);
                self.report(&message, true);
                false
            }
        }
    }

    pub async fn connect(&mut self, creds: &Credentials) -> bool {
        self.report("Connecting... Please wait", false);
        match self.manager.connect(creds).await {
            Ok(()) => {
                let endpoint = self.manager.endpoint().unwrap_or_default().to_string();
                let message = format!("Connected successfully to {}", endpoint);
                self.report(&message, false);
                true
            }
            Err(e) => {
                let message = match e {
                    crate::Error::Connection(_) => e.to_string(),
                    _ => format!("Connection failed: {}", e),
                };
                self.report(&message, true);
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.manager.disconnect() {
            self.report("Disconnected from database", false);
        } else {
            self.report("Not connected to database", false);
        }
    }

    /// Connects to a saved profile, counts its tables and disconnects again.
    pub async fn ping(&mut self, name: &str) -> Option<usize> {
        if !self.connect_profile(name).await {
            return None;
        }
        let outcome = self.manager.list_tables().await;
        self.manager.disconnect();

        match outcome {
            Ok(tables) => {
                let message = format!("Ping successful. {} tables found.", tables.len());
                self.report(&message, false);
                Some(tables.len())
            }
            Err(e) => {
                let message = format!("Ping failed: {}", e);
                self.report(&message, true);
                None
            }
        }
    }

    /// Runs a statement typed by the user, adding the default `LIMIT` to bare
    /// `SELECT`s.
    pub async fn run_query(&mut self, query: &str) -> Option<QueryResult> {
        let query = query.trim();
        if query.is_empty() {
            self.report("Query is empty", true);
            return None;
        }
        if !self.manager.is_connected() {
            self.report("Not connected to database", true);
            return None;
        }

        let limit = self.limits.default_limit;
        let statement = sql::with_default_limit(query, limit);
        if matches!(statement, Cow::Owned(_)) {
            let message = format!("Added default LIMIT {} to query", limit);
            self.report(&message, false);
        }

        let result = self.execute(&statement).await?;
        if result.is_empty() {
            self.report("Query executed successfully (no results)", false);
        } else {
            let message = format!(
                "Query executed successfully. Rows returned: {}.",
                result.rows.len()
            );
            self.report(&message, false);
        }
        Some(result)
    }

    /// Loads rows of `table` for the explorer view.
    pub async fn browse_table(&mut self, table: &str, filter: &TableFilter) -> Option<QueryResult> {
        let explore = sql::explore_query(
            table,
            filter,
            self.limits.default_limit,
            self.limits.max_rows,
        );
        if explore.capped {
            let message = format!(
                "Limit capped at {} rows for performance",
                self.limits.max_rows
            );
            self.report(&message, false);
        }

        let result = self.execute(&explore.sql).await?;
        let message = format!("Loaded {} row(s) from {}", result.rows.len(), table);
        self.report(&message, false);
        Some(result)
    }

    pub async fn list_tables(&mut self) -> Vec<String> {
        match self.manager.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                let message = format!("Failed to list tables: {}", e);
                self.report(&message, true);
                Vec::new()
            }
        }
    }

    pub async fn columns(&mut self, table: &str) -> Vec<(String, String)> {
        match self.manager.get_columns(table).await {
            Ok(columns) => columns,
            Err(e) => {
                let message = format!("Failed to load columns of {}: {}", table, e);
                self.report(&message, true);
                Vec::new()
            }
        }
    }

    async fn execute(&mut self, statement: &str) -> Option<QueryResult> {
        match self.manager.execute(statement).await {
            Ok(result) => Some(result),
            Err(e) => {
                let message = e.to_string();
                self.report(&message, true);
                None
            }
        }
    }
}
