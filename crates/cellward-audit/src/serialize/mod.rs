//! Event wire serializers (spec §4.2, §6.4). JSON, CEF, and LEEF all
//! carry identical informational content after redaction — they only
//! differ in framing.

pub mod cef;
pub mod json;
pub mod leef;

use cellward_protocol::AuditEvent;
use serde_json::Value;

/// Flatten an event into an ordered list of `(key, value)` string
/// pairs shared by the CEF and LEEF extension/segment encoders, so
/// both formats carry exactly the same fields.
pub fn flatten_event(event: &AuditEvent) -> Vec<(String, String)> {
    let mut out = Vec::new();
    out.push(("schemaVersion".to_string(), event.schema_version.to_string()));
    out.push(("id".to_string(), event.id.clone()));
    out.push(("timestamp".to_string(), event.timestamp.to_rfc3339()));
    out.push(("eventType".to_string(), event.event_type.clone()));
    out.push(("actorType".to_string(), event.actor.kind.clone()));
    out.push(("actorId".to_string(), event.actor.id.clone()));
    out.push(("success".to_string(), event.success.to_string()));

    if let Some(ctx) = &event.context {
        push_opt(&mut out, "orgId", &ctx.org_id);
        push_opt(&mut out, "userId", &ctx.user_id);
        push_opt(&mut out, "userEmail", &ctx.user_email);
        push_opt(&mut out, "ipAddress", &ctx.ip_address);
        push_opt(&mut out, "userAgent", &ctx.user_agent);
        push_opt(&mut out, "sessionId", &ctx.session_id);
    }
    if let Some(res) = &event.resource {
        out.push(("resourceType".to_string(), res.kind.clone()));
        push_opt(&mut out, "resourceId", &res.id);
        push_opt(&mut out, "resourceName", &res.name);
    }
    if let Some(err) = &event.error {
        push_opt(&mut out, "errorCode", &err.code);
        push_opt(&mut out, "errorMessage", &err.message);
    }
    if let Some(corr) = &event.correlation {
        push_opt(&mut out, "requestId", &corr.request_id);
        push_opt(&mut out, "traceId", &corr.trace_id);
    }
    for (k, v) in &event.details {
        flatten_value(&mut out, &format!("details.{k}"), v);
    }
    out
}

fn push_opt(out: &mut Vec<(String, String)>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.push((key.to_string(), v.clone()));
    }
}

fn flatten_value(out: &mut Vec<(String, String)>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(out, &format!("{prefix}.{k}"), v);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(out, &format!("{prefix}.{i}"), v);
            }
        }
        Value::Null => {}
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
    }
}

/// Severity shared by CEF and LEEF (spec §4.2): 8 for failures or
/// event types matching `failed|denied|blocked`, 6 for admin events,
/// else 5.
pub fn severity(event: &AuditEvent) -> u8 {
    let lowered = event.event_type.to_ascii_lowercase();
    if !event.success || ["failed", "denied", "blocked"].iter().any(|kw| lowered.contains(kw)) {
        8
    } else if lowered.contains("admin") {
        6
    } else {
        5
    }
}
