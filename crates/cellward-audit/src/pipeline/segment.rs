use chrono::Utc;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Segment lifecycle states, driven entirely by file suffix (spec
/// §4.5, §6.6): `<base>.open.jsonl` → `<base>.jsonl` (pending) →
/// `<base>.inflight.jsonl` → `<base>.acked.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentState {
    Open,
    Pending,
    Inflight,
    Acked,
}

impl SegmentState {
    fn suffix(self) -> &'static str {
        match self {
            SegmentState::Open => "open.jsonl",
            SegmentState::Pending => "jsonl",
            SegmentState::Inflight => "inflight.jsonl",
            SegmentState::Acked => "acked.jsonl",
        }
    }
}

/// A segment's base id plus the directory it lives in. The base id is
/// a sortable `<millis>-<rand>` token so segments naturally order by
/// creation time.
#[derive(Debug, Clone)]
pub struct Segment {
    dir: PathBuf,
    base: String,
}

impl Segment {
    pub fn new_open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let base = format!("{}-{:06x}", Utc::now().timestamp_millis(), rand::thread_rng().gen::<u32>() & 0xff_ffff);
        Self { dir, base }
    }

    pub fn from_base(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self { dir: dir.into(), base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn path(&self, state: SegmentState) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, state.suffix()))
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.dir.join(format!("{}.cursor.json", self.base))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.open.lock", self.base))
    }

    pub fn size_bytes(&self, state: SegmentState) -> u64 {
        fs::metadata(self.path(state)).map(|m| m.len()).unwrap_or(0)
    }

    pub fn exists(&self, state: SegmentState) -> bool {
        self.path(state).exists()
    }

    /// `age` of the segment, derived from the base id's embedded
    /// timestamp, in milliseconds.
    pub fn age_ms(&self) -> i64 {
        let created_ms: i64 = self
            .base
            .split('-')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Utc::now().timestamp_millis() - created_ms
    }

    pub fn rotate_open_to_pending(&self) -> std::io::Result<()> {
        fs::rename(self.path(SegmentState::Open), self.path(SegmentState::Pending))
    }

    pub fn promote_pending_to_inflight(&self) -> std::io::Result<()> {
        fs::rename(self.path(SegmentState::Pending), self.path(SegmentState::Inflight))
    }

    pub fn promote_inflight_to_acked(&self) -> std::io::Result<()> {
        fs::rename(self.path(SegmentState::Inflight), self.path(SegmentState::Acked))
    }

    /// Demote an inflight segment back to pending — used when an
    /// exporter batch fails (spec §4.5: "restore the batch to the
    /// pending state").
    pub fn demote_inflight_to_pending(&self) -> std::io::Result<()> {
        fs::rename(self.path(SegmentState::Inflight), self.path(SegmentState::Pending))
    }

    pub fn promote_open_to_acked(&self) -> std::io::Result<()> {
        fs::rename(self.path(SegmentState::Open), self.path(SegmentState::Acked))
    }
}

/// Enumerate every distinct segment base id present under `dir`, in
/// creation order.
pub fn list_segment_bases(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut bases = std::collections::BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        for suffix in [".open.jsonl", ".jsonl", ".inflight.jsonl", ".acked.jsonl"] {
            if let Some(base) = name.strip_suffix(suffix) {
                if !base.is_empty() && !name.ends_with(".cursor.json") {
                    bases.insert(base.to_string());
                }
            }
        }
    }
    Ok(bases.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_renames_through_expected_states() {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment::new_open(dir.path());
        fs::write(segment.path(SegmentState::Open), b"{}\n").unwrap();
        segment.rotate_open_to_pending().unwrap();
        assert!(segment.exists(SegmentState::Pending));
        segment.promote_pending_to_inflight().unwrap();
        assert!(segment.exists(SegmentState::Inflight));
        segment.promote_inflight_to_acked().unwrap();
        assert!(segment.exists(SegmentState::Acked));
    }

    #[test]
    fn list_segment_bases_excludes_cursor_files() {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment::new_open(dir.path());
        fs::write(segment.path(SegmentState::Open), b"{}\n").unwrap();
        fs::write(segment.cursor_path(), b"{}").unwrap();
        let bases = list_segment_bases(dir.path()).unwrap();
        assert_eq!(bases, vec![segment.base().to_string()]);
    }
}
