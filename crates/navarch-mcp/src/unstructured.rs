//! Presence-aware field access for dynamic objects
//!
//! CRD payloads are summarized without typed bindings; every lookup
//! distinguishes "absent" from "wrong type" by returning `None` for both
//! rather than panicking or defaulting silently at the wrong layer.

use serde_json::Value;

/// Walk a path of object keys, returning the value at the end if every
/// segment exists
pub fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

pub fn nested_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    nested(value, path)?.as_str()
}

pub fn nested_bool(value: &Value, path: &[&str]) -> Option<bool> {
    nested(value, path)?.as_bool()
}

pub fn nested_i64(value: &Value, path: &[&str]) -> Option<i64> {
    nested(value, path)?.as_i64()
}

/// Find the `status.conditions` entry with the given `type`
///
/// Returns `(status, reason, message)`; missing fields come back empty.
pub fn condition(value: &Value, condition_type: &str) -> Option<(String, String, String)> {
    let conditions = nested(value, &["status", "conditions"])?.as_array()?;
    let found = conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))?;

    let field = |name: &str| {
        found
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some((field("status"), field("reason"), field("message")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rollout() -> Value {
        json!({
            "spec": { "replicas": 5, "paused": false },
            "status": {
                "phase": "Progressing",
                "conditions": [
                    { "type": "Available", "status": "True", "reason": "AvailableReason" },
                    { "type": "Progressing", "status": "False", "reason": "RolloutPaused", "message": "paused" },
                ],
            },
        })
    }

    #[test]
    fn nested_walks_present_paths() {
        let value = rollout();
        assert_eq!(nested_str(&value, &["status", "phase"]), Some("Progressing"));
        assert_eq!(nested_i64(&value, &["spec", "replicas"]), Some(5));
        assert_eq!(nested_bool(&value, &["spec", "paused"]), Some(false));
    }

    #[test]
    fn absent_and_mistyped_fields_are_none() {
        let value = rollout();
        assert_eq!(nested(&value, &["spec", "missing"]), None);
        assert_eq!(nested(&value, &["status", "phase", "deeper"]), None);
        assert_eq!(nested_i64(&value, &["status", "phase"]), None);
    }

    #[test]
    fn condition_lookup_by_type() {
        let value = rollout();
        let (status, reason, message) = condition(&value, "Progressing").unwrap();
        assert_eq!(status, "False");
        assert_eq!(reason, "RolloutPaused");
        assert_eq!(message, "paused");

        assert!(condition(&value, "Degraded").is_none());
        assert!(condition(&json!({}), "Available").is_none());
    }
}
