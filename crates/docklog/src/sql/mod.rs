//! SQL statement extraction and grouping.
//!
//! Entries whose message carries the `[sql]:` sentinel are SQL records. The
//! statement text is normalized to a fingerprint and aggregated per request
//! scope for per-request performance analysis (N+1 detection).

pub mod aggregate;
pub mod fingerprint;

pub use aggregate::{QueryAggregator, QueryReport, N_PLUS_ONE_THRESHOLD};

use serde::Serialize;

use crate::parser::LogEntry;

/// Sentinel marking an entry as a SQL statement log.
pub const SQL_SENTINEL: &str = "[sql]:";

/// Field-name synonyms carrying the request correlation id.
const REQUEST_ID_KEYS: [&str; 4] = ["request_id", "requestId", "requestID", "req_id"];

/// One extracted SQL statement with its interpreted fields.
#[derive(Debug, Clone, Serialize)]
pub struct SqlRecord {
    pub raw: String,
    pub normalized: String,
    pub fingerprint: String,
    pub duration_ms: Option<f64>,
    pub table: Option<String>,
    pub operation: Option<String>,
    pub row_count: Option<i64>,
    pub variables: Vec<serde_json::Value>,
    pub request_id: Option<String>,
}

impl SqlRecord {
    /// Extract a SQL record from a parsed entry, if it carries the sentinel.
    pub fn from_entry(entry: &LogEntry) -> Option<SqlRecord> {
        let at = entry.message.find(SQL_SENTINEL)?;
        let raw = entry.message[at + SQL_SENTINEL.len()..].trim().to_string();
        let normalized = fingerprint::normalize(&raw);
        let fp = fingerprint::hash(&normalized);

        let duration_ms = entry.fields.get("duration").and_then(|v| v.parse().ok());
        let row_count = entry.fields.get("db.rows").and_then(|v| v.parse().ok());
        let variables = entry
            .fields
            .get("db.vars")
            .and_then(|v| serde_json::from_str::<serde_json::Value>(v).ok())
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();
        let request_id = REQUEST_ID_KEYS
            .iter()
            .find_map(|key| entry.fields.get(*key))
            .cloned();

        Some(SqlRecord {
            raw,
            normalized,
            fingerprint: fp,
            duration_ms,
            table: entry.fields.get("db.table").cloned(),
            operation: entry.fields.get("db.operation").cloned(),
            row_count,
            variables,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn test_from_entry_full_record() {
        let entry = parser::parse(
            "DBG db/query.go:45 > [sql]: SELECT * FROM users WHERE id = $1\n    duration=1.234 db.table=users db.operation=select db.rows=1 db.vars=[\"42\"] request_id=abc",
        );
        let record = SqlRecord::from_entry(&entry).expect("sql record");
        assert_eq!(record.raw, "SELECT * FROM users WHERE id = $1");
        assert_eq!(record.normalized, "SELECT * FROM users WHERE id = ?");
        assert_eq!(record.fingerprint.len(), 64);
        assert_eq!(record.duration_ms, Some(1.234));
        assert_eq!(record.table.as_deref(), Some("users"));
        assert_eq!(record.operation.as_deref(), Some("select"));
        assert_eq!(record.row_count, Some(1));
        assert_eq!(record.variables, vec![serde_json::json!("42")]);
        assert_eq!(record.request_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_non_sql_entry_is_none() {
        let entry = parser::parse("INF plain message duration=5");
        assert!(SqlRecord::from_entry(&entry).is_none());
    }

    #[test]
    fn test_request_id_synonyms() {
        for key in ["request_id", "requestId", "requestID", "req_id"] {
            let entry = parser::parse(&format!("[sql]: SELECT 1 {key}=r7"));
            let record = SqlRecord::from_entry(&entry).unwrap();
            assert_eq!(record.request_id.as_deref(), Some("r7"), "key {key}");
        }
    }

    #[test]
    fn test_missing_fields_are_none() {
        let entry = parser::parse("[sql]: SELECT 1");
        let record = SqlRecord::from_entry(&entry).unwrap();
        assert!(record.duration_ms.is_none());
        assert!(record.table.is_none());
        assert!(record.variables.is_empty());
        assert!(record.request_id.is_none());
    }
}
