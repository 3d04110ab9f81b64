use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resumable read position into a sealed segment (spec §3, §4.5,
/// §6.6). `acked_lines` is the count of lines already confirmed
/// delivered; a flush resumes from that offset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Cursor {
    pub acked_lines: u64,
}

pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Cursor {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    /// Atomically persist the cursor via a `.tmp` sibling and rename
    /// (spec §6.6).
    pub fn store(&self, cursor: Cursor) -> io::Result<()> {
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, serde_json::to_vec(&cursor)?)?;
        fs::rename(&tmp_path, &self.path)
    }

    pub fn drop_file(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cursor_file_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = CursorFile::new(dir.path().join("seg-1.cursor.json"));
        assert_eq!(cursor.load(), Cursor { acked_lines: 0 });
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg-1.cursor.json");
        let cursor = CursorFile::new(&path);
        cursor.store(Cursor { acked_lines: 7 }).unwrap();
        assert_eq!(cursor.load(), Cursor { acked_lines: 7 });
        assert!(!path.with_extension("json.tmp").exists());
    }
}
