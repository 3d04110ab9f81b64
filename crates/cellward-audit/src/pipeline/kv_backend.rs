use super::exporter::HttpExporter;
use crate::redact::RedactionEngine;
use cellward_protocol::{AuditEvent, AuditSink, CellwardError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RecordStatus {
    Pending,
    Inflight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    event: serde_json::Value,
    status: RecordStatus,
    bytes: u64,
    created_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FlushLockRecord {
    owner: String,
    created_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Meta {
    bytes_used: u64,
}

const META_BYTES_KEY: &str = "bytes_used";
const META_LOCK_KEY: &str = "flush_lock";

#[derive(Debug, Clone)]
pub struct KvQueueConfig {
    pub max_bytes: u64,
    pub flush_batch_size: usize,
    pub flush_lock_stale: Duration,
    pub flush_lock_poll_base: Duration,
    pub flush_lock_timeout: Duration,
}

impl Default for KvQueueConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            flush_batch_size: 50,
            flush_lock_stale: Duration::from_secs(5 * 60),
            flush_lock_poll_base: Duration::from_millis(50),
            flush_lock_timeout: Duration::from_secs(2),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Embedded key-value-store-backed offline queue (spec §4.5), using
/// `sled` as the nearest embeddable analogue of the spec's IndexedDB
/// backend: an `events` keyspace keyed by sequence number plus a
/// `meta` keyspace holding byte usage and the flush lock record.
pub struct KvAuditQueue {
    events: sled::Tree,
    meta: sled::Tree,
    next_seq: AtomicU64,
    config: KvQueueConfig,
    redaction: RedactionEngine,
    owner_id: String,
}

impl KvAuditQueue {
    pub fn open(db: &sled::Db, config: KvQueueConfig) -> Result<Self, CellwardError> {
        let events = db.open_tree("events").map_err(sled_err)?;
        let meta = db.open_tree("meta").map_err(sled_err)?;
        let next_seq = events
            .iter()
            .keys()
            .last()
            .and_then(|k| k.ok())
            .map(|k| u64::from_be_bytes(k.as_ref().try_into().unwrap_or([0; 8])) + 1)
            .unwrap_or(0);
        Ok(Self {
            events,
            meta,
            next_seq: AtomicU64::new(next_seq),
            config,
            redaction: RedactionEngine::new(),
            owner_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    fn key_for(seq: u64) -> [u8; 8] {
        seq.to_be_bytes()
    }

    fn bytes_used(&self) -> u64 {
        self.meta
            .get(META_BYTES_KEY)
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_slice::<Meta>(&v).ok())
            .map(|m| m.bytes_used)
            .unwrap_or(0)
    }

    fn set_bytes_used(&self, value: u64) -> Result<(), CellwardError> {
        let meta = Meta { bytes_used: value };
        self.meta
            .insert(META_BYTES_KEY, serde_json::to_vec(&meta).unwrap())
            .map_err(sled_err)?;
        Ok(())
    }

    /// Write one record transactionally: asserts capacity, inserts the
    /// `pending` record, bumps the byte meter (spec §4.5 kv enqueue).
    pub fn enqueue(&self, event: AuditEvent) -> Result<(), CellwardError> {
        let redacted_value = self.redaction.redact(&event.to_value());
        let bytes = serde_json::to_vec(&redacted_value).map(|v| v.len() as u64).unwrap_or(0);

        let current = self.bytes_used();
        if current + bytes > self.config.max_bytes {
            return Err(CellwardError::QueueFull { capacity_bytes: self.config.max_bytes });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = StoredRecord {
            seq,
            event: redacted_value,
            status: RecordStatus::Pending,
            bytes,
            created_at_ms: now_ms(),
        };
        self.events
            .insert(Self::key_for(seq), serde_json::to_vec(&record).unwrap())
            .map_err(sled_err)?;
        self.set_bytes_used(current + bytes)?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<serde_json::Value>, CellwardError> {
        let mut out = Vec::new();
        for item in self.events.iter() {
            let (_, value) = item.map_err(sled_err)?;
            if let Ok(record) = serde_json::from_slice::<StoredRecord>(&value) {
                out.push(record.event);
            }
        }
        Ok(out)
    }

    pub fn clear(&self) -> Result<(), CellwardError> {
        self.events.clear().map_err(sled_err)?;
        self.meta.clear().map_err(sled_err)?;
        self.next_seq.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn try_acquire_flush_lock(&self) -> Result<bool, CellwardError> {
        let existing = self
            .meta
            .get(META_LOCK_KEY)
            .map_err(sled_err)?
            .and_then(|v| serde_json::from_slice::<FlushLockRecord>(&v).ok());

        if let Some(record) = &existing {
            let age_ms = now_ms() - record.created_at_ms;
            if age_ms < self.config.flush_lock_stale.as_millis() as i64 && record.owner != self.owner_id {
                return Ok(false);
            }
            // stale or self-owned: take over, re-owning any inflight
            // records back to pending first.
            self.requeue_inflight_to_pending()?;
        }

        let record = FlushLockRecord { owner: self.owner_id.clone(), created_at_ms: now_ms() };
        self.meta
            .insert(META_LOCK_KEY, serde_json::to_vec(&record).unwrap())
            .map_err(sled_err)?;
        Ok(true)
    }

    fn renew_flush_lock(&self) -> Result<(), CellwardError> {
        let record = FlushLockRecord { owner: self.owner_id.clone(), created_at_ms: now_ms() };
        self.meta
            .insert(META_LOCK_KEY, serde_json::to_vec(&record).unwrap())
            .map_err(sled_err)?;
        Ok(())
    }

    fn release_flush_lock(&self) -> Result<(), CellwardError> {
        self.meta.remove(META_LOCK_KEY).map_err(sled_err)?;
        Ok(())
    }

    fn requeue_inflight_to_pending(&self) -> Result<(), CellwardError> {
        for item in self.events.iter() {
            let (key, value) = item.map_err(sled_err)?;
            if let Ok(mut record) = serde_json::from_slice::<StoredRecord>(&value) {
                if record.status == RecordStatus::Inflight {
                    record.status = RecordStatus::Pending;
                    self.events.insert(key, serde_json::to_vec(&record).unwrap()).map_err(sled_err)?;
                }
            }
        }
        Ok(())
    }

    fn pending_batch(&self, limit: usize) -> Result<Vec<StoredRecord>, CellwardError> {
        let mut out = Vec::new();
        for item in self.events.iter() {
            let (_, value) = item.map_err(sled_err)?;
            if let Ok(record) = serde_json::from_slice::<StoredRecord>(&value) {
                if record.status == RecordStatus::Pending {
                    out.push(record);
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    fn mark_inflight(&self, records: &[StoredRecord]) -> Result<(), CellwardError> {
        for record in records {
            let mut updated = record.clone();
            updated.status = RecordStatus::Inflight;
            self.events
                .insert(Self::key_for(record.seq), serde_json::to_vec(&updated).unwrap())
                .map_err(sled_err)?;
        }
        Ok(())
    }

    fn delete_and_decrement(&self, records: &[StoredRecord]) -> Result<(), CellwardError> {
        let mut freed = 0u64;
        for record in records {
            self.events.remove(Self::key_for(record.seq)).map_err(sled_err)?;
            freed += record.bytes;
        }
        let current = self.bytes_used();
        self.set_bytes_used(current.saturating_sub(freed))?;
        Ok(())
    }

    fn requeue_as_pending(&self, records: &[StoredRecord]) -> Result<(), CellwardError> {
        for record in records {
            let mut updated = record.clone();
            updated.status = RecordStatus::Pending;
            self.events
                .insert(Self::key_for(record.seq), serde_json::to_vec(&updated).unwrap())
                .map_err(sled_err)?;
        }
        Ok(())
    }

    /// Flush every pending record through `exporter` (spec §4.5 kv
    /// flush path): claim a batch `pending -> inflight`, send it,
    /// delete on success or requeue to `pending` on failure.
    pub async fn flush_to_exporter(&self, exporter: &HttpExporter) -> Result<(), CellwardError> {
        let deadline = tokio::time::Instant::now() + self.config.flush_lock_timeout;
        let mut backoff = self.config.flush_lock_poll_base;
        loop {
            if self.try_acquire_flush_lock()? {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CellwardError::QueueLocked);
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(1));
        }

        let result = self.drain_pending(exporter).await;
        self.release_flush_lock()?;
        result
    }

    async fn drain_pending(&self, exporter: &HttpExporter) -> Result<(), CellwardError> {
        loop {
            let batch = self.pending_batch(self.config.flush_batch_size)?;
            if batch.is_empty() {
                return Ok(());
            }
            self.mark_inflight(&batch)?;

            let events: Vec<AuditEvent> = batch
                .iter()
                .filter_map(|r| AuditEvent::from_value(r.event.clone()).ok())
                .collect();
            let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();

            match exporter.send_batch(&ids, &events).await {
                Ok(()) => self.delete_and_decrement(&batch)?,
                Err(err) => {
                    self.requeue_as_pending(&batch)?;
                    return Err(CellwardError::runtime(err.to_string()));
                }
            }
            self.renew_flush_lock()?;
        }
    }
}

fn sled_err(e: sled::Error) -> CellwardError {
    CellwardError::runtime(format!("kv queue error: {e}"))
}

impl AuditSink for KvAuditQueue {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.enqueue(event) {
            tracing::warn!(error = %e, "failed to enqueue audit event to kv queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::EventActor;

    fn event(id: &str) -> AuditEvent {
        AuditEvent::builder("security.test", EventActor { kind: "ai".into(), id: "s1".into() }, true)
            .id(id)
            .build()
    }

    fn open_db(dir: &std::path::Path) -> sled::Db {
        sled::open(dir).unwrap()
    }

    #[test]
    fn enqueue_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let queue = KvAuditQueue::open(&db, KvQueueConfig::default()).unwrap();
        queue.enqueue(event("a")).unwrap();
        queue.enqueue(event("b")).unwrap();
        assert_eq!(queue.read_all().unwrap().len(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let config = KvQueueConfig { max_bytes: 5, ..KvQueueConfig::default() };
        let queue = KvAuditQueue::open(&db, config).unwrap();
        assert!(matches!(queue.enqueue(event("a")), Err(CellwardError::QueueFull { .. })));
    }

    #[test]
    fn clear_empties_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        let queue = KvAuditQueue::open(&db, KvQueueConfig::default()).unwrap();
        queue.enqueue(event("a")).unwrap();
        queue.clear().unwrap();
        assert!(queue.read_all().unwrap().is_empty());
    }
}
