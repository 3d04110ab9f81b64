//! Audit core (redaction, JSON/CEF/LEEF serializers) and the Durable
//! Audit Pipeline (spec §4.2, §4.5): the canonical path every security
//! decision in the workspace is recorded through.

pub mod pipeline;
pub mod redact;
pub mod serialize;
pub mod url_redact;

pub use pipeline::{
    AuditFormat, AuditPipeline, ExportError, ExporterConfig, FsAuditQueue, FsQueueConfig, HttpExporter,
    KvAuditQueue, KvQueueConfig, SiemAuth,
};
pub use redact::RedactionEngine;
pub use url_redact::redact_url;
