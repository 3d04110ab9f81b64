use super::{flatten_event, severity};
use crate::redact::RedactionEngine;
use cellward_protocol::AuditEvent;

const VENDOR: &str = "Cellward";
const PRODUCT: &str = "SecuritySubstrate";
const VERSION: &str = "1.0";

/// Escape pipes, backslashes, and newlines in a CEF header field.
fn escape_header(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Escape `=`, backslashes, and embedded control whitespace in a CEF
/// extension value.
fn escape_extension_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('=', "\\=")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn redact_event_fields(engine: &RedactionEngine, event: &AuditEvent) -> AuditEvent {
    let redacted_value = engine.redact(&event.to_value());
    serde_json::from_value(redacted_value).expect("redaction preserves the event shape")
}

/// Encode one event as a single CEF line (spec §4.2, §6.4):
/// `CEF:0|vendor|product|version|signature|name|severity|ext-kv…`.
pub fn encode_cef_line(engine: &RedactionEngine, event: &AuditEvent) -> String {
    let redacted = redact_event_fields(engine, event);
    let sev = severity(&redacted);
    let signature = escape_header(&redacted.event_type);
    let name = escape_header(&redacted.event_type.replace('.', " "));

    let extension: Vec<String> = flatten_event(&redacted)
        .into_iter()
        .filter(|(k, _)| k != "eventType")
        .map(|(k, v)| format!("{}={}", escape_header(&k), escape_extension_value(&v)))
        .collect();

    format!(
        "CEF:0|{VENDOR}|{PRODUCT}|{VERSION}|{signature}|{name}|{sev}|{ext}",
        ext = extension.join(" ")
    )
}

/// Encode a batch of events as newline-separated CEF lines.
pub fn serialize_cef(engine: &RedactionEngine, events: &[AuditEvent]) -> String {
    events
        .iter()
        .map(|e| encode_cef_line(engine, e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::EventActor;
    use serde_json::Map;

    fn event(success: bool, event_type: &str) -> AuditEvent {
        AuditEvent::builder(event_type, EventActor { kind: "ai".into(), id: "s1".into() }, success).build()
    }

    #[test]
    fn header_has_seven_pipe_delimited_fields_before_extension() {
        let engine = RedactionEngine::new();
        let line = encode_cef_line(&engine, &event(true, "security.network.request"));
        let parts: Vec<&str> = line.splitn(8, '|').collect();
        assert_eq!(parts[0], "CEF:0");
        assert_eq!(parts[1], VENDOR);
    }

    #[test]
    fn failure_events_get_severity_eight() {
        let engine = RedactionEngine::new();
        let line = encode_cef_line(&engine, &event(false, "security.test"));
        let parts: Vec<&str> = line.splitn(8, '|').collect();
        assert_eq!(parts[6], "8");
    }

    #[test]
    fn denied_event_type_gets_severity_eight_even_on_success_flag() {
        let engine = RedactionEngine::new();
        let line = encode_cef_line(&engine, &event(true, "security.permission.denied"));
        let parts: Vec<&str> = line.splitn(8, '|').collect();
        assert_eq!(parts[6], "8");
    }

    #[test]
    fn redacts_sensitive_details_before_encoding() {
        let engine = RedactionEngine::new();
        let mut details = Map::new();
        details.insert("token".to_string(), serde_json::json!("sekrit"));
        let mut ev = event(true, "security.test");
        ev.details = details;
        let line = encode_cef_line(&engine, &ev);
        assert!(!line.contains("sekrit"));
        assert!(line.contains("[REDACTED]"));
    }

    #[test]
    fn escapes_pipes_in_header_fields() {
        let engine = RedactionEngine::new();
        let line = encode_cef_line(&engine, &event(true, "a|b"));
        let parts: Vec<&str> = line.splitn(8, '|').collect();
        assert_eq!(parts[4], "a\\|b");
    }
}
