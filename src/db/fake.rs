//! In-memory driver standing in for a server in tests.

use super::value::{CellValue, Column, QueryResult};
use super::{ConnectParams, Driver, Session};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct FakeDriver {
    pub(crate) log: Arc<Mutex<Vec<String>>>,
    /// Fail every `open` as if the host were unreachable.
    pub refuse: bool,
    /// Accept only this password when set.
    pub password: Option<String>,
    pub tables: Vec<String>,
    pub columns: Vec<(String, String)>,
    /// Reject `SHOW TABLES` as a user without the privilege would see.
    pub deny_show_tables: bool,
}

impl FakeDriver {
    /// Everything the driver saw: `open <endpoint>` entries and raw statements.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Driver for FakeDriver {
    type Session = FakeSession;

    async fn open(&self, params: &ConnectParams) -> Result<FakeSession> {
        self.record(format!("open {}", params.endpoint()));
        if self.refuse {
            return Err(Error::Connection(format!(
                "cannot reach {}:{}: connection refused",
                params.host, params.port
            )));
        }
        let authenticated = self
            .password
            .as_ref()
            .is_none_or(|expected| *expected == params.password);
        Ok(FakeSession {
            driver: self.clone(),
            authenticated,
        })
    }
}

pub struct FakeSession {
    driver: FakeDriver,
    authenticated: bool,
}

fn single_column(name: &str, type_name: &str, rows: Vec<CellValue>) -> QueryResult {
    QueryResult {
        columns: vec![Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }],
        rows: rows.into_iter().map(|cell| vec![cell]).collect(),
        ..Default::default()
    }
}

impl Session for FakeSession {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.driver.record(sql.to_string());
        if !self.authenticated {
            return Err(Error::Query(
                "Code: 516. DB::Exception: default: Authentication failed".to_string(),
            ));
        }

        // Reading rows of a DROP_LINK table kills the link, describing it does not
        if sql.contains("DROP_LINK") && !sql.starts_with("DESCRIBE") {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }
        if sql.contains("BROKEN") {
            return Err(Error::Query(
                "Code: 62. DB::Exception: Syntax error: failed at position 1".to_string(),
            ));
        }

        if self.driver.deny_show_tables && sql == "SHOW TABLES" {
            return Err(Error::Query(
                "Code: 497. DB::Exception: default: Not enough privileges".to_string(),
            ));
        }

        let result = match sql {
            "SELECT 1" => single_column("1", "UInt8", vec![CellValue::UInt(1)]),
            "SHOW TABLES" => single_column(
                "name",
                "String",
                self.driver
                    .tables
                    .iter()
                    .map(|t| CellValue::Text(t.clone()))
                    .collect(),
            ),
            s if s.starts_with("DESCRIBE TABLE") => QueryResult {
                columns: vec![
                    Column {
                        name: "name".to_string(),
                        type_name: "String".to_string(),
                    },
                    Column {
                        name: "type".to_string(),
                        type_name: "String".to_string(),
                    },
                ],
                rows: self
                    .driver
                    .columns
                    .iter()
                    .map(|(name, ty)| {
                        vec![CellValue::Text(name.clone()), CellValue::Text(ty.clone())]
                    })
                    .collect(),
                ..Default::default()
            },
            s if s.contains("EMPTY") => QueryResult::default(),
            // Anything else echoes the statement back so callers can see what was sent
            other => single_column("query", "String", vec![CellValue::Text(other.to_string())]),
        };
        Ok(result)
    }
}
