use super::flatten_event;
use crate::redact::RedactionEngine;
use cellward_protocol::AuditEvent;

const VENDOR: &str = "Cellward";
const PRODUCT: &str = "SecuritySubstrate";
const VERSION: &str = "1.0";
const DEFAULT_DELIMITER: char = '\t';

fn escape(delimiter: char, s: &str) -> String {
    s.replace('\\', "\\\\").replace(delimiter, &format!("\\{delimiter}"))
}

fn redact_event_fields(engine: &RedactionEngine, event: &AuditEvent) -> AuditEvent {
    let redacted_value = engine.redact(&event.to_value());
    serde_json::from_value(redacted_value).expect("redaction preserves the event shape")
}

/// Encode one event as a single LEEF line (spec §4.2, §6.4):
/// `LEEF:2.0|vendor|product|version|eventId|<delim>|k=v<delim>…`.
pub fn encode_leef_line(engine: &RedactionEngine, event: &AuditEvent, delimiter: char) -> String {
    let redacted = redact_event_fields(engine, event);
    let event_id = escape(delimiter, &redacted.event_type);

    let segments: Vec<String> = flatten_event(&redacted)
        .into_iter()
        .filter(|(k, _)| k != "eventType")
        .map(|(k, v)| format!("{}={}", escape(delimiter, &k), escape(delimiter, &v)))
        .collect();

    let delim_repr = if delimiter == '\t' { "x09".to_string() } else { delimiter.to_string() };

    format!(
        "LEEF:2.0|{VENDOR}|{PRODUCT}|{VERSION}|{event_id}|{delim_repr}|{body}",
        body = segments.join(&delimiter.to_string())
    )
}

/// Encode a batch of events as newline-separated LEEF lines. Delimiter
/// defaults to tab (spec §4.2).
pub fn serialize_leef(engine: &RedactionEngine, events: &[AuditEvent], delimiter: Option<char>) -> String {
    let delim = delimiter.unwrap_or(DEFAULT_DELIMITER);
    events
        .iter()
        .map(|e| encode_leef_line(engine, e, delim))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::EventActor;

    fn event() -> AuditEvent {
        AuditEvent::builder(
            "security.network.request",
            EventActor { kind: "ai".into(), id: "s1".into() },
            true,
        )
        .build()
    }

    #[test]
    fn header_has_leef_version_and_vendor() {
        let engine = RedactionEngine::new();
        let line = encode_leef_line(&engine, &event(), '\t');
        assert!(line.starts_with("LEEF:2.0|Cellward|SecuritySubstrate|1.0|"));
    }

    #[test]
    fn default_delimiter_is_tab_marker() {
        let engine = RedactionEngine::new();
        let line = serialize_leef(&engine, &[event()], None);
        assert!(line.contains("|x09|"));
    }

    #[test]
    fn redacts_before_encoding() {
        let engine = RedactionEngine::new();
        let mut ev = event();
        ev.details.insert("secret".to_string(), serde_json::json!("shh"));
        let line = encode_leef_line(&engine, &ev, '\t');
        assert!(!line.contains("shh"));
    }
}
