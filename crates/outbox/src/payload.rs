//! Payload builders for the sync feed.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

/// Wrap entity fields in the envelope downstream sync clients consume:
/// `{id, status, ...fields, updatedAt}` with an RFC 3339 timestamp.
///
/// `fields` must be a JSON object; its keys are merged between `status` and
/// `updatedAt` and stay camelCase on the wire.
pub fn entity_payload(
    id: i64,
    status: &str,
    fields: Value,
    updated_at: DateTime<Utc>,
) -> Value {
    let mut object = Map::new();
    object.insert("id".into(), json!(id));
    object.insert("status".into(), json!(status));
    if let Value::Object(extra) = fields {
        for (key, value) in extra {
            object.insert(key, value);
        }
    }
    object.insert("updatedAt".into(), json!(updated_at.to_rfc3339()));
    Value::Object(object)
}
