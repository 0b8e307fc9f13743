use serde::{Deserialize, Serialize};

/// Messages a time-based policy always keeps per container, regardless of
/// age. The floor wins over the time bound.
pub const TIME_RETENTION_FLOOR: usize = 100;

/// Per-container retention policy.
///
/// Containers without an explicit policy fall back to the store-wide
/// `max_per_container` count bound. Wire shape: `{"type": "count", "value":
/// 500}` or `{"type": "time", "value": 60}` (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Keep at most this many messages; evict oldest.
    Count(usize),
    /// Evict messages older than this many seconds, but never below the
    /// floor.
    Time(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagged_form() {
        let count: RetentionPolicy = serde_json::from_value(serde_json::json!({
            "type": "count", "value": 500
        }))
        .unwrap();
        assert_eq!(count, RetentionPolicy::Count(500));

        let time: RetentionPolicy = serde_json::from_value(serde_json::json!({
            "type": "time", "value": 60
        }))
        .unwrap();
        assert_eq!(time, RetentionPolicy::Time(60));

        let json = serde_json::to_value(RetentionPolicy::Time(60)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "time", "value": 60}));
    }
}
