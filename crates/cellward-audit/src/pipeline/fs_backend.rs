use super::cursor::{Cursor, CursorFile};
use super::exporter::HttpExporter;
use super::lock::{self, FileLock};
use super::segment::{list_segment_bases, Segment, SegmentState};
use crate::redact::RedactionEngine;
use cellward_protocol::{AuditEvent, AuditSink, CellwardError};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FsQueueConfig {
    pub max_bytes: u64,
    pub max_segment_bytes: u64,
    pub max_segment_age_ms: i64,
    pub flush_batch_size: usize,
    pub enqueue_lock_stale: Duration,
    pub enqueue_lock_timeout: Duration,
    pub flush_lock_stale: Duration,
    pub flush_lock_timeout: Duration,
}

impl Default for FsQueueConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_segment_bytes: 4 * 1024 * 1024,
            max_segment_age_ms: 5 * 60 * 1000,
            flush_batch_size: 50,
            enqueue_lock_stale: Duration::from_secs(60),
            enqueue_lock_timeout: Duration::from_secs(5),
            flush_lock_stale: Duration::from_secs(5 * 60),
            flush_lock_timeout: Duration::from_secs(2),
        }
    }
}

fn io_err(e: io::Error) -> CellwardError {
    CellwardError::runtime(e.to_string())
}

/// Filesystem-backed segmented offline queue (spec §4.5, §6.6).
pub struct FsAuditQueue {
    dir: PathBuf,
    segments_dir: PathBuf,
    config: FsQueueConfig,
    redaction: RedactionEngine,
}

impl FsAuditQueue {
    pub fn new(dir: impl Into<PathBuf>, config: FsQueueConfig) -> io::Result<Self> {
        let dir = dir.into();
        let segments_dir = dir.join("segments");
        fs::create_dir_all(&segments_dir)?;
        Ok(Self { dir, segments_dir, config, redaction: RedactionEngine::new() })
    }

    fn enqueue_lock_path(&self) -> PathBuf {
        self.dir.join("queue.enqueue.lock")
    }

    fn flush_lock_path(&self) -> PathBuf {
        self.dir.join("queue.flush.lock")
    }

    fn open_or_create_segment(&self) -> io::Result<Segment> {
        for base in list_segment_bases(&self.segments_dir)? {
            let segment = Segment::from_base(&self.segments_dir, base);
            if segment.exists(SegmentState::Open) {
                if !lock::is_orphaned(&segment.lock_path(), self.config.enqueue_lock_stale) {
                    return Ok(segment);
                }
                segment.rotate_open_to_pending()?;
                let _ = fs::remove_file(segment.lock_path());
            }
        }
        let segment = Segment::new_open(&self.segments_dir);
        lock::write_owner_record(&segment.lock_path());
        Ok(segment)
    }

    fn non_acked_bytes(&self) -> io::Result<u64> {
        let mut total = 0u64;
        for base in list_segment_bases(&self.segments_dir)? {
            let segment = Segment::from_base(&self.segments_dir, base);
            for state in [SegmentState::Open, SegmentState::Pending, SegmentState::Inflight] {
                total += segment.size_bytes(state);
            }
        }
        Ok(total)
    }

    /// Append one event to the queue (spec §4.5 enqueue path): acquire
    /// the pipeline-wide enqueue lock, redact, enforce the byte
    /// budget, append to the current open segment, rotate if the
    /// segment is past its size or age budget.
    pub fn enqueue(&self, event: AuditEvent) -> Result<(), CellwardError> {
        let _guard = FileLock::new(self.enqueue_lock_path())
            .acquire_blocking(self.config.enqueue_lock_stale, self.config.enqueue_lock_timeout)
            .ok_or(CellwardError::QueueLocked)?;

        let redacted_value = self.redaction.redact(&event.to_value());
        let line = serde_json::to_string(&redacted_value).map_err(|e| CellwardError::runtime(e.to_string()))?;
        let line_bytes = line.len() as u64 + 1;

        let current_bytes = self.non_acked_bytes().map_err(io_err)?;
        if current_bytes + line_bytes > self.config.max_bytes {
            return Err(CellwardError::QueueFull { capacity_bytes: self.config.max_bytes });
        }

        let segment = self.open_or_create_segment().map_err(io_err)?;
        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(segment.path(SegmentState::Open))
                .map_err(io_err)?;
            writeln!(file, "{line}").map_err(io_err)?;
            file.sync_data().map_err(io_err)?;
        }

        let past_size = segment.size_bytes(SegmentState::Open) >= self.config.max_segment_bytes;
        let past_age = segment.age_ms() >= self.config.max_segment_age_ms;
        if past_size || past_age {
            segment.rotate_open_to_pending().map_err(io_err)?;
            let _ = fs::remove_file(segment.lock_path());
        }
        Ok(())
    }

    /// Diagnostic read of every line currently on disk, across every
    /// segment state, in creation order.
    pub fn read_all(&self) -> Result<Vec<serde_json::Value>, CellwardError> {
        let mut out = Vec::new();
        for base in list_segment_bases(&self.segments_dir).map_err(io_err)? {
            let segment = Segment::from_base(&self.segments_dir, base);
            for state in [SegmentState::Open, SegmentState::Pending, SegmentState::Inflight, SegmentState::Acked] {
                if segment.exists(state) {
                    for line in read_lines(&segment.path(state)).map_err(io_err)? {
                        if let Ok(value) = serde_json::from_str(&line) {
                            out.push(value);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Discard every segment, cursor, and lock file.
    pub fn clear(&self) -> Result<(), CellwardError> {
        fs::remove_dir_all(&self.segments_dir).map_err(io_err)?;
        fs::create_dir_all(&self.segments_dir).map_err(io_err)?;
        let _ = fs::remove_file(self.enqueue_lock_path());
        let _ = fs::remove_file(self.flush_lock_path());
        Ok(())
    }

    /// Flush every non-acked segment through `exporter` (spec §4.5
    /// flush path). Idempotent under replay: cursors prevent
    /// re-sending an already-acked prefix, and a crash mid-flush
    /// leaves a segment `.inflight` for the next flush to resume.
    pub async fn flush_to_exporter(&self, exporter: &HttpExporter) -> Result<(), CellwardError> {
        let flush_lock = FileLock::new(self.flush_lock_path());
        let guard = flush_lock
            .acquire_blocking(self.config.flush_lock_stale, self.config.flush_lock_timeout)
            .ok_or(CellwardError::QueueLocked)?;

        self.seal_open_segments().map_err(io_err)?;

        for base in list_segment_bases(&self.segments_dir).map_err(io_err)? {
            let segment = Segment::from_base(&self.segments_dir, base);
            if segment.exists(SegmentState::Acked) {
                continue;
            }
            if segment.exists(SegmentState::Pending) {
                segment.promote_pending_to_inflight().map_err(io_err)?;
            } else if !segment.exists(SegmentState::Inflight) {
                continue;
            }
            self.flush_segment(&segment, exporter).await?;
            guard.touch();
        }
        Ok(())
    }

    fn seal_open_segments(&self) -> io::Result<()> {
        for base in list_segment_bases(&self.segments_dir)? {
            let segment = Segment::from_base(&self.segments_dir, &base);
            if segment.exists(SegmentState::Open) {
                segment.rotate_open_to_pending()?;
                let _ = fs::remove_file(segment.lock_path());
            }
        }
        Ok(())
    }

    async fn flush_segment(&self, segment: &Segment, exporter: &HttpExporter) -> Result<(), CellwardError> {
        let lines = read_lines(&segment.path(SegmentState::Inflight)).map_err(io_err)?;
        let cursor_file = CursorFile::new(segment.cursor_path());
        let mut cursor = cursor_file.load();

        while (cursor.acked_lines as usize) < lines.len() {
            let start = cursor.acked_lines as usize;
            let end = (start + self.config.flush_batch_size).min(lines.len());
            let batch: Vec<AuditEvent> = lines[start..end]
                .iter()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter_map(|value| AuditEvent::from_value(value).ok())
                .collect();
            let ids: Vec<String> = batch.iter().map(|e| e.id.clone()).collect();

            match exporter.send_batch(&ids, &batch).await {
                Ok(()) => {
                    cursor = Cursor { acked_lines: end as u64 };
                    cursor_file.store(cursor).map_err(io_err)?;
                }
                Err(export_err) => {
                    segment.demote_inflight_to_pending().map_err(io_err)?;
                    return Err(CellwardError::runtime(export_err.to_string()));
                }
            }
        }

        segment.promote_inflight_to_acked().map_err(io_err)?;
        cursor_file.drop_file();
        Ok(())
    }
}

fn read_lines(path: &std::path::Path) -> io::Result<Vec<String>> {
    let mut content = String::new();
    match fs::File::open(path) {
        Ok(mut file) => {
            file.read_to_string(&mut content)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }
    Ok(content.lines().filter(|l| !l.is_empty()).map(|l| l.to_string()).collect())
}

impl AuditSink for FsAuditQueue {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.enqueue(event) {
            tracing::warn!(error = %e, "failed to enqueue audit event to filesystem queue");
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

    #[test]
    fn enqueue_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsAuditQueue::new(dir.path(), FsQueueConfig::default()).unwrap();
        queue.enqueue(event("a")).unwrap();
        queue.enqueue(event("b")).unwrap();
        let all = queue.read_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn enqueue_redacts_before_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsAuditQueue::new(dir.path(), FsQueueConfig::default()).unwrap();
        let mut ev = event("a");
        ev.details.insert("token".into(), serde_json::json!("shh"));
        queue.enqueue(ev).unwrap();
        let all = queue.read_all().unwrap();
        assert_eq!(all[0]["details"]["token"], serde_json::json!("[REDACTED]"));
    }

    #[test]
    fn capacity_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let config = FsQueueConfig { max_bytes: 10, ..FsQueueConfig::default() };
        let queue = FsAuditQueue::new(dir.path(), config).unwrap();
        let result = queue.enqueue(event("a"));
        assert!(matches!(result, Err(CellwardError::QueueFull { .. })));
    }

    #[test]
    fn clear_removes_all_segments() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsAuditQueue::new(dir.path(), FsQueueConfig::default()).unwrap();
        queue.enqueue(event("a")).unwrap();
        queue.clear().unwrap();
        assert!(queue.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_with_no_segments_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsAuditQueue::new(dir.path(), FsQueueConfig::default()).unwrap();
        let exporter = HttpExporter::new(super::super::exporter::ExporterConfig {
            endpoint: "http://127.0.0.1:1/unreachable".into(),
            ..Default::default()
        });
        queue.flush_to_exporter(&exporter).await.unwrap();
    }
}
