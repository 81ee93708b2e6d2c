//! # clickdeck
//!
//! clickdeck is a terminal client for browsing and querying ClickHouse. It keeps
//! a set of named connection profiles with encrypted passwords, connects to one
//! server at a time over the ClickHouse HTTP interface, and shows tables,
//! columns and query results in a terminal user interface (TUI).
//!
//! ## Features
//!
//! - **Saved connections**: add, list, edit and remove named profiles stored in
//!   `~/.clickhouse_credentials.json`, passwords encrypted with AES-256-GCM
//! - **Schema browsing**: list tables of the connected database and the ordered
//!   columns of each table
//! - **Table explorer**: rows of a table with an optional filter, sort column and
//!   row limit (capped to keep the UI responsive)
//! - **Query editor**: run arbitrary statements; bare `SELECT`s get a default
//!   `LIMIT`
//!
//! ## Modules
//!
//! - `credentials`: credential store and encryption key
//! - `db`: connection manager, the HTTP driver and result types
//! - `app`: the workbench reporting every outcome to a status callback
//! - `config`: layered application settings
//! - `tui`: TUI rendering and interaction logic

pub mod app;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod tui;

pub use app::Workbench;
pub use config::Settings;
pub use credentials::{CredentialStore, Credentials, EncryptionKey};
pub use db::{ConnectionManager, HttpDriver};
pub use error::{Error, ErrorKind, Result};
