//! WebSocket wire protocol types.
//!
//! Server → client frames carry a `type` tag: `log` (single entry), `logs`
//! (batch), `logs_initial` (snapshot on subscribe / filter change) and
//! `containers` (container-set snapshot). The single client → server frame
//! kind is `filter`, replacing the subscription's filter spec.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::docker::ContainerInfo;
use crate::filter::FilterSpec;
use crate::hub::Frame;
use crate::store::StoredMessage;

#[derive(Debug, Serialize)]
pub struct WireEntry {
    /// Verbatim timestamp text (empty when absent).
    pub timestamp: String,
    /// Level short code (empty when absent).
    pub level: String,
    pub file: String,
    pub message: String,
    pub fields: HashMap<String, String>,
    pub raw: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub container_id: String,
    /// Event time, ISO-8601.
    pub timestamp: String,
    pub entry: WireEntry,
}

impl From<&StoredMessage> for WireMessage {
    fn from(msg: &StoredMessage) -> Self {
        WireMessage {
            container_id: msg.container_id.clone(),
            timestamp: msg.timestamp.to_rfc3339(),
            entry: WireEntry {
                timestamp: msg.entry.timestamp_text.clone(),
                level: msg.entry.level_code().to_string(),
                file: msg.entry.file.clone().unwrap_or_default(),
                message: msg.entry.message.clone(),
                fields: msg.entry.fields.clone(),
                raw: msg.entry.raw.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Log {
        message: WireMessage,
    },
    Logs {
        messages: Vec<WireMessage>,
    },
    LogsInitial {
        messages: Vec<WireMessage>,
    },
    Containers {
        containers: Vec<ContainerInfo>,
    },
    Error {
        message: String,
    },
}

impl From<Frame> for ServerFrame {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Log(msg) => ServerFrame::Log {
                message: WireMessage::from(msg.as_ref()),
            },
            Frame::Logs(msgs) => ServerFrame::Logs {
                messages: msgs.iter().map(|m| WireMessage::from(m.as_ref())).collect(),
            },
            Frame::Initial(msgs) => ServerFrame::LogsInitial {
                messages: msgs.iter().map(|m| WireMessage::from(m.as_ref())).collect(),
            },
            Frame::Containers(containers) => ServerFrame::Containers { containers },
        }
    }
}

/// A `{type, value}` pair from the client; becomes a field-equality filter
/// with `type` as the field name.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Filter {
        #[serde(default)]
        selected_containers: Vec<String>,
        #[serde(default)]
        selected_levels: Vec<String>,
        #[serde(default)]
        search_query: String,
        #[serde(default)]
        trace_filters: Vec<TraceFilter>,
    },
}

impl ClientFrame {
    /// Build a [`FilterSpec`], resolving container names to ids through the
    /// given lookup.
    pub fn into_spec<F>(self, resolve_names: F) -> FilterSpec
    where
        F: FnOnce(&[String]) -> Vec<String>,
    {
        let ClientFrame::Filter {
            selected_containers,
            selected_levels,
            search_query,
            trace_filters,
        } = self;
        FilterSpec::match_all()
            .with_containers(resolve_names(&selected_containers))
            .with_levels(selected_levels)
            .with_search_query(&search_query)
            .with_field_filters(
                trace_filters
                    .into_iter()
                    .map(|t| (t.filter_type, t.value)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use chrono::Utc;
    use std::sync::Arc;

    fn stored(line: &str) -> Arc<StoredMessage> {
        Arc::new(StoredMessage::new("c1", parser::parse(line), Utc::now()))
    }

    #[test]
    fn test_wire_entry_shape() {
        let msg = stored(
            "Oct  3 19:57:52.076536 DBG pkg/handlers/stripe.go:85 > received stripe event request_id=b465d1eb",
        );
        let json = serde_json::to_value(ServerFrame::from(Frame::Log(msg))).unwrap();

        assert_eq!(json["type"], "log");
        let wire = &json["message"];
        assert_eq!(wire["containerId"], "c1");
        assert!(wire["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(wire["entry"]["timestamp"], "Oct  3 19:57:52.076536");
        assert_eq!(wire["entry"]["level"], "DBG");
        assert_eq!(wire["entry"]["file"], "pkg/handlers/stripe.go:85");
        assert_eq!(wire["entry"]["message"], "received stripe event");
        assert_eq!(wire["entry"]["fields"]["request_id"], "b465d1eb");
        // Synthetic store fields stay out of the wire entry.
        assert!(wire["entry"]["fields"].get("_raw").is_none());
    }

    #[test]
    fn test_frame_tags() {
        let batch = ServerFrame::from(Frame::Logs(vec![stored("a"), stored("b")]));
        let json = serde_json::to_value(batch).unwrap();
        assert_eq!(json["type"], "logs");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);

        let initial = ServerFrame::from(Frame::Initial(vec![]));
        assert_eq!(serde_json::to_value(initial).unwrap()["type"], "logs_initial");

        let containers = ServerFrame::from(Frame::Containers(vec![]));
        assert_eq!(serde_json::to_value(containers).unwrap()["type"], "containers");
    }

    #[test]
    fn test_client_filter_frame_parses() {
        let text = r#"{
            "type": "filter",
            "selectedContainers": ["web", "db"],
            "selectedLevels": ["err", "NONE"],
            "searchQuery": "Timeout Upstream",
            "traceFilters": [{"type": "request_id", "value": "r1"}]
        }"#;
        let frame: ClientFrame = serde_json::from_str(text).unwrap();
        let spec = frame.into_spec(|names| {
            assert_eq!(names, ["web", "db"]);
            vec!["c-web".to_string(), "c-db".to_string()]
        });

        assert!(spec.containers.contains("c-web"));
        assert!(spec.containers.contains("c-db"));
        assert!(spec.levels.contains("ERR"));
        assert!(spec.levels.contains("NONE"));
        assert_eq!(spec.search_terms, vec!["timeout", "upstream"]);
        assert_eq!(
            spec.field_filters,
            vec![("request_id".to_string(), "r1".to_string())]
        );
    }

    #[test]
    fn test_client_filter_defaults_to_match_all() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type": "filter"}"#).unwrap();
        let spec = frame.into_spec(|_| Vec::new());
        assert_eq!(spec, FilterSpec::match_all());
    }

    #[test]
    fn test_malformed_client_frame_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type": "bogus"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }
}
