use regex::Regex;
use serde_json::Value;

/// Replacement placed over any field classified as sensitive.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Recursively redacts sensitive keys/values out of a JSON value
/// (spec §4.2). Applied before any event leaves the process, whether
/// to disk or over the wire to a SIEM.
pub struct RedactionEngine {
    sensitive_key: Regex,
    bearer_or_splunk: Regex,
    jwt_shape: Regex,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionEngine {
    /// Compiles every redaction pattern once; the engine is cheap to
    /// clone-by-reference and intended to be built a single time and
    /// shared (an `Arc<RedactionEngine>` in practice).
    pub fn new() -> Self {
        Self {
            sensitive_key: Regex::new(
                r"(?i)^(pass(word)?|secret|token|api[-_]?key|authorization|cookie|set[-_]?cookie|private[-_]?key|client[-_]?secret|refresh[-_]?token|access[-_]?token)$",
            )
            .expect("static redaction key regex is valid"),
            bearer_or_splunk: Regex::new(r"(?i)^(Bearer|Splunk) (.+)$")
                .expect("static bearer/splunk regex is valid"),
            jwt_shape: Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$")
                .expect("static jwt regex is valid"),
        }
    }

    /// Redact an entire JSON value in place, recursing into arrays and
    /// objects. `Date`-like (already-string) timestamps are preserved
    /// unless they happen to match a sensitive key name.
    pub fn redact(&self, value: &Value) -> Value {
        self.redact_value(None, value)
    }

    fn redact_value(&self, key: Option<&str>, value: &Value) -> Value {
        if let Some(k) = key {
            if self.sensitive_key.is_match(k) {
                return Value::String(REDACTED_MARKER.to_string());
            }
        }
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.redact_value(Some(k), v));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_value(None, v)).collect())
            }
            Value::String(s) => Value::String(self.redact_string(s)),
            other => other.clone(),
        }
    }

    /// Redact a bare string value: scheme-prefixed credentials keep
    /// their scheme (`Bearer xyz` -> `Bearer [REDACTED]`), JWT-shaped
    /// strings (3 base64url segments, total length >= 40) are replaced
    /// wholesale.
    pub fn redact_string(&self, s: &str) -> String {
        if let Some(caps) = self.bearer_or_splunk.captures(s) {
            let scheme = &caps[1];
            return format!("{scheme} {REDACTED_MARKER}");
        }
        if s.len() >= 40 && self.jwt_shape.is_match(s) {
            return REDACTED_MARKER.to_string();
        }
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys_case_insensitively() {
        let engine = RedactionEngine::new();
        let v = json!({ "Password": "hunter2", "nested": { "API_KEY": "abc" } });
        let redacted = engine.redact(&v);
        assert_eq!(redacted["Password"], json!(REDACTED_MARKER));
        assert_eq!(redacted["nested"]["API_KEY"], json!(REDACTED_MARKER));
    }

    #[test]
    fn preserves_non_sensitive_fields() {
        let engine = RedactionEngine::new();
        let v = json!({ "city": "berlin", "count": 3 });
        let redacted = engine.redact(&v);
        assert_eq!(redacted, v);
    }

    #[test]
    fn redacts_bearer_token_keeping_scheme() {
        let engine = RedactionEngine::new();
        let v = json!({ "header": "Bearer sk-abcdef0123456789" });
        let redacted = engine.redact(&v);
        assert_eq!(redacted["header"], json!("Bearer [REDACTED]"));
    }

    #[test]
    fn redacts_jwt_shaped_strings() {
        let engine = RedactionEngine::new();
        let jwt = format!(
            "{}.{}.{}",
            "a".repeat(20),
            "b".repeat(20),
            "c".repeat(20)
        );
        let v = json!({ "raw": jwt });
        let redacted = engine.redact(&v);
        assert_eq!(redacted["raw"], json!(REDACTED_MARKER));
    }

    #[test]
    fn redaction_is_idempotent() {
        let engine = RedactionEngine::new();
        let v = json!({ "secret": "x", "list": ["Bearer abc", "plain"] });
        let once = engine.redact(&v);
        let twice = engine.redact(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn short_triple_segment_string_is_not_treated_as_jwt() {
        let engine = RedactionEngine::new();
        let v = json!({ "version": "a.b.c" });
        let redacted = engine.redact(&v);
        assert_eq!(redacted["version"], json!("a.b.c"));
    }
}
