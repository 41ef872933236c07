//! The command language accepted by `execute_query`.
//!
//! ```text
//! GET    <table> <key>
//! PUT    <table> <key> <json>
//! DELETE <table> <key>
//! SCAN   <table> [prefix]
//! TABLES
//! ```
//!
//! Keywords are case-insensitive. Everything after the key of a `PUT` is
//! parsed as one JSON document, so it may contain spaces.

use super::types::{DatabaseError, DbResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Get { table: String, key: String },
    Put { table: String, key: String, value: serde_json::Value },
    Delete { table: String, key: String },
    Scan { table: String, prefix: String },
    Tables,
}

/// Split off the next whitespace-delimited word.
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

fn required<'a>(input: &'a str, what: &str, command: &str) -> DbResult<(&'a str, &'a str)> {
    let (word, rest) = next_word(input);
    if word.is_empty() {
        return Err(DatabaseError::InvalidQuery(format!(
            "{command} needs a {what}"
        )));
    }
    Ok((word, rest))
}

fn no_trailing(rest: &str, command: &str) -> DbResult<()> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(DatabaseError::InvalidQuery(format!(
            "unexpected input after {command}: {}",
            rest.trim()
        )))
    }
}

impl Query {
    pub fn parse(input: &str) -> DbResult<Self> {
        let (command, rest) = next_word(input);
        let upper = command.to_ascii_uppercase();
        match upper.as_str() {
            "GET" | "DELETE" => {
                let (table, rest) = required(rest, "table", &upper)?;
                let (key, rest) = required(rest, "key", &upper)?;
                no_trailing(rest, &upper)?;
                let (table, key) = (table.to_string(), key.to_string());
                Ok(if upper == "GET" {
                    Query::Get { table, key }
                } else {
                    Query::Delete { table, key }
                })
            }
            "PUT" => {
                let (table, rest) = required(rest, "table", &upper)?;
                let (key, rest) = required(rest, "key", &upper)?;
                let json = rest.trim();
                if json.is_empty() {
                    return Err(DatabaseError::InvalidQuery("PUT needs a JSON value".into()));
                }
                let value = serde_json::from_str(json)
                    .map_err(|e| DatabaseError::InvalidQuery(format!("bad JSON value: {e}")))?;
                Ok(Query::Put {
                    table: table.to_string(),
                    key: key.to_string(),
                    value,
                })
            }
            "SCAN" => {
                let (table, rest) = required(rest, "table", &upper)?;
                let (prefix, rest) = next_word(rest);
                no_trailing(rest, &upper)?;
                Ok(Query::Scan {
                    table: table.to_string(),
                    prefix: prefix.to_string(),
                })
            }
            "TABLES" => {
                no_trailing(rest, &upper)?;
                Ok(Query::Tables)
            }
            "" => Err(DatabaseError::InvalidQuery("empty query".into())),
            other => Err(DatabaseError::InvalidQuery(format!(
                "unknown command {other}"
            ))),
        }
    }
}
