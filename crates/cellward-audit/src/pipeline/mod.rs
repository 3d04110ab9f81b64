//! Durable Audit Pipeline (spec §4.5): two interoperable backends
//! behind one contract — `enqueue`, `read_all`, `clear`,
//! `flush_to_exporter` — plus the HTTP exporter they flush through.

pub mod cursor;
pub mod exporter;
pub mod fs_backend;
pub mod kv_backend;
pub mod lock;
pub mod segment;

pub use exporter::{AuditFormat, ExportError, ExporterConfig, HttpExporter, SiemAuth};
pub use fs_backend::{FsAuditQueue, FsQueueConfig};
pub use kv_backend::{KvAuditQueue, KvQueueConfig};

use cellward_protocol::{AuditEvent, AuditSink, CellwardError};

/// Either backend behind the same contract, so the rest of the
/// workspace can depend on `AuditPipeline` without caring which
/// storage is configured.
pub enum AuditPipeline {
    Fs(FsAuditQueue),
    Kv(KvAuditQueue),
}

impl AuditPipeline {
    pub fn enqueue(&self, event: AuditEvent) -> Result<(), CellwardError> {
        match self {
            AuditPipeline::Fs(queue) => queue.enqueue(event),
            AuditPipeline::Kv(queue) => queue.enqueue(event),
        }
    }

    pub fn read_all(&self) -> Result<Vec<serde_json::Value>, CellwardError> {
        match self {
            AuditPipeline::Fs(queue) => queue.read_all(),
            AuditPipeline::Kv(queue) => queue.read_all(),
        }
    }

    pub fn clear(&self) -> Result<(), CellwardError> {
        match self {
            AuditPipeline::Fs(queue) => queue.clear(),
            AuditPipeline::Kv(queue) => queue.clear(),
        }
    }

    pub async fn flush_to_exporter(&self, exporter: &HttpExporter) -> Result<(), CellwardError> {
        match self {
            AuditPipeline::Fs(queue) => queue.flush_to_exporter(exporter).await,
            AuditPipeline::Kv(queue) => queue.flush_to_exporter(exporter).await,
        }
    }
}

impl AuditSink for AuditPipeline {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.enqueue(event) {
            tracing::warn!(error = %e, "failed to enqueue audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::EventActor;

    #[test]
    fn fs_backend_dispatches_through_the_shared_contract() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = AuditPipeline::Fs(FsAuditQueue::new(dir.path(), FsQueueConfig::default()).unwrap());
        let event = AuditEvent::builder("security.test", EventActor { kind: "ai".into(), id: "s1".into() }, true).build();
        pipeline.enqueue(event).unwrap();
        assert_eq!(pipeline.read_all().unwrap().len(), 1);
        pipeline.clear().unwrap();
        assert!(pipeline.read_all().unwrap().is_empty());
    }
}
