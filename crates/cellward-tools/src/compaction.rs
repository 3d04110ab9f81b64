//! Audit-visible tool-result compaction (spec §4.4): every tool result
//! that reaches an audit event is bounded and redacted first so a
//! single oversized or secret-laden result can't blow up the audit
//! pipeline or leak a credential into a SIEM.

use serde_json::{Map, Value};

const DEFAULT_MAX_CHARS: usize = 20_000;
const MAX_DEPTH: usize = 8;
const MAX_ARRAY_ITEMS: usize = 50;
const MAX_OBJECT_KEYS: usize = 50;

fn is_sensitive_header_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(lower.as_str(), "authorization" | "proxy-authorization" | "cookie" | "set-cookie")
        || lower.contains("token")
        || lower.contains("secret")
        || lower.contains("signature")
        || lower.contains("api-key")
        || lower.contains("apikey")
        || lower.ends_with("key")
}

/// Recursively truncates `value` to at most `max_chars` characters of
/// rendered content, bounding depth and fan-out along the way, and
/// redacts any object key that looks like a credential header.
pub fn compact_for_audit(value: &Value, max_chars: usize) -> Value {
    let truncated = truncate_recursive(value, max_chars, 0);
    let rendered = serde_json::to_string(&truncated).unwrap_or_default();
    if rendered.chars().count() > max_chars {
        let original_chars = serde_json::to_string(value).map(|s| s.chars().count()).unwrap_or(0);
        let mut obj = Map::new();
        obj.insert("truncated".to_string(), Value::Bool(true));
        obj.insert("original_chars".to_string(), Value::from(original_chars));
        let prefix: String = rendered.chars().take(max_chars.min(rendered.len())).collect();
        obj.insert("preview".to_string(), Value::String(prefix));
        Value::Object(obj)
    } else {
        truncated
    }
}

pub fn compact_for_audit_default(value: &Value) -> Value {
    compact_for_audit(value, DEFAULT_MAX_CHARS)
}

fn truncate_recursive(value: &Value, max_chars: usize, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return Value::String("[truncated: max depth]".to_string());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (i, (key, val)) in map.iter().enumerate() {
                if i >= MAX_OBJECT_KEYS {
                    out.insert(
                        "__truncated_keys".to_string(),
                        Value::from(map.len() - MAX_OBJECT_KEYS),
                    );
                    break;
                }
                let redacted_val = if is_sensitive_header_name(key) {
                    Value::String("[REDACTED]".to_string())
                } else {
                    truncate_recursive(val, max_chars, depth + 1)
                };
                out.insert(key.clone(), redacted_val);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|v| truncate_recursive(v, max_chars, depth + 1))
                .collect();
            if items.len() > MAX_ARRAY_ITEMS {
                out.push(Value::String(format!(
                    "[truncated: {} more items]",
                    items.len() - MAX_ARRAY_ITEMS
                )));
            }
            Value::Array(out)
        }
        Value::String(s) if s.chars().count() > max_chars => {
            let preview: String = s.chars().take(max_chars).collect();
            Value::String(format!("{preview}\u{2026}"))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_header_keys() {
        let v = json!({"headers": {"Authorization": "Bearer abc", "Content-Type": "text/plain"}});
        let compacted = compact_for_audit_default(&v);
        assert_eq!(compacted["headers"]["Authorization"], json!("[REDACTED]"));
        assert_eq!(compacted["headers"]["Content-Type"], json!("text/plain"));
    }

    #[test]
    fn truncates_long_arrays() {
        let items: Vec<Value> = (0..200).map(Value::from).collect();
        let v = json!({ "rows": items });
        let compacted = compact_for_audit_default(&v);
        let rows = compacted["rows"].as_array().unwrap();
        assert_eq!(rows.len(), MAX_ARRAY_ITEMS + 1);
    }

    #[test]
    fn oversized_value_gets_preview_envelope() {
        let big = "x".repeat(DEFAULT_MAX_CHARS * 3);
        let v = json!({ "blob": big });
        let compacted = compact_for_audit_default(&v);
        assert_eq!(compacted["truncated"], json!(true));
        assert!(compacted["original_chars"].as_u64().unwrap() > DEFAULT_MAX_CHARS as u64);
    }
}
