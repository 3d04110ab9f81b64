use crate::redact::RedactionEngine;
use cellward_protocol::AuditEvent;

/// JSON serialization: a redacted array of events (spec §4.2, §6.4).
/// `Content-Type: application/json`.
pub fn serialize_json(engine: &RedactionEngine, events: &[AuditEvent]) -> String {
    let values: Vec<_> = events
        .iter()
        .map(|e| engine.redact(&e.to_value()))
        .collect();
    serde_json::to_string(&values).expect("redacted audit events always serialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::EventActor;

    #[test]
    fn produces_json_array() {
        let engine = RedactionEngine::new();
        let event = AuditEvent::builder(
            "security.test",
            EventActor { kind: "ai".into(), id: "s1".into() },
            true,
        )
        .build();
        let json = serialize_json(&engine, &[event]);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }
}
