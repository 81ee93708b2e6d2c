//! Small helpers for building the statements the browser issues itself.

use std::borrow::Cow;

pub const SHOW_TABLES: &str = "SHOW TABLES";
pub const PING: &str = "SELECT 1";

/// Quotes an identifier with backticks, escaping embedded backticks and
/// backslashes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.trim().replace('\\', "\\\\").replace('`', "\\`");
    format!("`{}`", escaped)
}

pub fn describe_table(table: &str) -> String {
    format!("DESCRIBE TABLE {}", quote_identifier(table))
}

/// Appends `LIMIT limit` to a bare `SELECT` that has none.
///
/// Statements that are not `SELECT`s, already carry a `LIMIT n`, or look like a
/// parenthesised compound query are returned untouched.
pub fn with_default_limit(query: &str, limit: u32) -> Cow<'_, str> {
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();

    if !lower.starts_with("select") || has_limit_clause(&lower) {
        return Cow::Borrowed(query);
    }
    let body = trimmed.trim_end_matches(';').trim_end();
    if lower.matches("select").count() > 1 && body.ends_with(')') {
        return Cow::Borrowed(query);
    }

    match trimmed.strip_suffix(';') {
        Some(body) => Cow::Owned(format!("{} LIMIT {};", body.trim_end(), limit)),
        None => Cow::Owned(format!("{} LIMIT {}", trimmed, limit)),
    }
}

fn has_limit_clause(lower: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ';' || c == ',' || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .collect();
    tokens.windows(2).any(|pair| {
        pair[0] == "limit" && pair[1].chars().next().is_some_and(|c| c.is_ascii_digit())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options of the table explorer view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    pub where_clause: Option<String>,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreQuery {
    pub sql: String,
    pub limit: u32,
    /// Set when the requested limit was above `max_rows` and got lowered.
    pub capped: bool,
}

pub fn explore_query(
    table: &str,
    filter: &TableFilter,
    default_limit: u32,
    max_rows: u32,
) -> ExploreQuery {
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table));

    if let Some(clause) = filter.where_clause.as_deref().map(str::trim)
        && !clause.is_empty()
    {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }

    if let Some((column, order)) = &filter.sort {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {} {}", quote_identifier(column), direction));
    }

    let requested = filter.limit.unwrap_or(default_limit);
    let capped = requested > max_rows;
    let limit = requested.min(max_rows);
    sql.push_str(&format!(" LIMIT {}", limit));

    ExploreQuery { sql, limit, capped }
}
