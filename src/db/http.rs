//! ClickHouse HTTP interface driver.
//!
//! Statements are POSTed as the request body. Results come back in the
//! `JSONCompact` format unless the statement names its own `FORMAT`, in which
//! case the raw text is returned as a single `result` column.

use super::value::{CellValue, Column, QueryResult};
use super::{ConnectParams, Driver, Session};
use crate::config::Settings;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

const FORMAT_PARAMS: [(&str, &str); 3] = [
    ("default_format", "JSONCompact"),
    ("output_format_json_quote_64bit_integers", "0"),
    ("output_format_json_validate_utf8", "1"),
];

#[derive(Debug, Clone)]
pub struct HttpDriver {
    secure: bool,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl HttpDriver {
    pub fn new(secure: bool, connect_timeout: Duration, query_timeout: Duration) -> Self {
        HttpDriver {
            secure,
            connect_timeout,
            query_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.secure,
            settings.connect_timeout(),
            settings.query_timeout(),
        )
    }

    fn base_url(&self, params: &ConnectParams) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}:{}/", scheme, params.host, params.port))
            .map_err(|e| Error::Validation(format!("Invalid host '{}': {}", params.host, e)))
    }
}

impl Driver for HttpDriver {
    type Session = HttpSession;

    async fn open(&self, params: &ConnectParams) -> Result<HttpSession> {
        let url = self.base_url(params)?;

        // Credentials ride along on every request, so they live in the client
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, header_value("Username", &params.username)?);
        let mut key = header_value("Password", &params.password)?;
        key.set_sensitive(true);
        headers.insert(KEY_HEADER, key);

        let client = Client::builder()
            .user_agent(concat!("clickdeck/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(self.connect_timeout)
            .timeout(self.query_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Connection(describe(&e)))?;

        Ok(HttpSession {
            client,
            url,
            database: params.database.clone(),
        })
    }
}

pub struct HttpSession {
    client: Client,
    url: Url,
    database: String,
}

impl Session for HttpSession {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let response = self
            .client
            .post(self.url.clone())
            .query(&[("database", self.database.as_str())])
            .query(&FORMAT_PARAMS)
            .body(sql.to_string())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let message = String::from_utf8_lossy(&body).trim().to_string();
            return Err(Error::Query(if message.is_empty() {
                format!("server returned {}", status)
            } else {
                message
            }));
        }

        Ok(decode_body(&body))
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        Error::Validation(format!("{} contains characters that cannot be sent", field))
    })
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Connection(format!("request timed out: {}", describe(&e)))
    } else {
        Error::Connection(describe(&e))
    }
}

/// Error message with its whole source chain, reqwest's own text is terse.
fn describe(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[derive(Deserialize)]
struct CompactResponse {
    meta: Vec<CompactMeta>,
    data: Vec<Vec<Value>>,
    #[serde(default)]
    statistics: Option<CompactStatistics>,
}

#[derive(Deserialize)]
struct CompactMeta {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Deserialize)]
struct CompactStatistics {
    #[serde(default)]
    elapsed: f64,
    #[serde(default)]
    rows_read: u64,
}

fn decode_body(body: &[u8]) -> QueryResult {
    if body.iter().all(u8::is_ascii_whitespace) {
        return QueryResult::default();
    }

    match serde_json::from_slice::<CompactResponse>(body) {
        Ok(compact) => QueryResult {
            columns: compact
                .meta
                .into_iter()
                .map(|m| Column {
                    name: m.name,
                    type_name: m.type_name,
                })
                .collect(),
            rows: compact
                .data
                .into_iter()
                .map(|row| row.into_iter().map(CellValue::from_json).collect())
                .collect(),
            elapsed: compact
                .statistics
                .as_ref()
                .and_then(|s| Duration::try_from_secs_f64(s.elapsed).ok()),
            rows_read: compact.statistics.map(|s| s.rows_read),
        },
        Err(_) => raw_text(body),
    }
}

fn raw_text(body: &[u8]) -> QueryResult {
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    QueryResult {
        columns: vec![Column {
            name: "result".to_string(),
            type_name: "String".to_string(),
        }],
        rows: body
            .split(|b| *b == b'\n')
            .map(|line| match std::str::from_utf8(line) {
                Ok(text) => vec![CellValue::Text(text.to_string())],
                Err(_) => vec![CellValue::Binary(line.to_vec())],
            })
            .collect(),
        ..Default::default()
    }
}
