use crate::error::CellwardError;
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Schema version pinned to 1 for every event this crate emits (spec §3).
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventResource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventCorrelation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActor {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl From<&Principal> for EventActor {
    fn from(p: &Principal) -> Self {
        Self {
            kind: p.kind.to_string(),
            id: p.id.clone(),
        }
    }
}

/// The canonical audit event (spec §3). `deny_unknown_fields` enforces
/// the validator's rejection of legacy fields (`ts`, `metadata`) and of
/// any other unrecognized top-level key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditEvent {
    pub schema_version: u32,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor: EventActor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<EventResource>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<EventCorrelation>,
}

/// Builder-style constructor mirroring the "fill id/timestamp if absent,
/// then assert validity" rule from spec §4.2.
pub struct AuditEventBuilder {
    event_type: String,
    actor: EventActor,
    success: bool,
    context: Option<EventContext>,
    resource: Option<EventResource>,
    error: Option<EventError>,
    details: Map<String, Value>,
    correlation: Option<EventCorrelation>,
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl AuditEventBuilder {
    pub fn new(event_type: impl Into<String>, actor: EventActor, success: bool) -> Self {
        Self {
            event_type: event_type.into(),
            actor,
            success,
            context: None,
            resource: None,
            error: None,
            details: Map::new(),
            correlation: None,
            id: None,
            timestamp: None,
        }
    }

    pub fn context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn resource(mut self, resource: EventResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn error(mut self, error: EventError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn correlation(mut self, correlation: EventCorrelation) -> Self {
        self.correlation = Some(correlation);
        self
    }

    /// Override the id; only used by tests needing deterministic ids.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the timestamp; only used by tests needing a fixed clock.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            schema_version: SCHEMA_VERSION,
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            event_type: self.event_type,
            actor: self.actor,
            context: self.context,
            resource: self.resource,
            success: self.success,
            error: self.error,
            details: self.details,
            correlation: self.correlation,
        }
    }
}

impl AuditEvent {
    pub fn builder(event_type: impl Into<String>, actor: EventActor, success: bool) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type, actor, success)
    }

    /// Parse and validate an event from raw JSON, rejecting legacy
    /// fields and anything not in the canonical shape (spec §3).
    pub fn from_value(value: Value) -> Result<Self, CellwardError> {
        serde_json::from_value(value)
            .map_err(|e| CellwardError::validation(format!("invalid audit event: {e}")))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("AuditEvent always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_legacy_fields() {
        let mut v = serde_json::json!({
            "schemaVersion": 1,
            "id": "x",
            "timestamp": "2024-01-01T00:00:00Z",
            "eventType": "security.test",
            "actor": {"type": "ai", "id": "s1"},
            "success": true,
            "details": {},
        });
        v.as_object_mut().unwrap().insert("ts".into(), serde_json::json!(123));
        assert!(AuditEvent::from_value(v).is_err());
    }

    #[test]
    fn builder_fills_id_and_timestamp() {
        let actor = EventActor {
            kind: "ai".into(),
            id: "s1".into(),
        };
        let event = AuditEvent::builder("security.test", actor, true).build();
        assert!(!event.id.is_empty());
        assert_eq!(event.schema_version, SCHEMA_VERSION);
    }
}
