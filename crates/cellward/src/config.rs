//! `~/.cellward/config.toml`: queue backend, SIEM exporter, and tool
//! executor budgets. Every field has a safe, locked-down default so a
//! fresh install with no config file still runs with no external
//! data access and a modest offline queue.

use cellward_audit::{AuditFormat, ExporterConfig, FsQueueConfig, SiemAuth};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub backend: QueueBackend,
    pub dir: Option<PathBuf>,
    pub max_bytes: u64,
    pub max_segment_bytes: u64,
    pub max_segment_age_ms: i64,
    pub flush_batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Filesystem,
    KeyValue,
}

impl Default for QueueSection {
    fn default() -> Self {
        let d = FsQueueConfig::default();
        Self {
            backend: QueueBackend::default(),
            dir: None,
            max_bytes: d.max_bytes,
            max_segment_bytes: d.max_segment_bytes,
            max_segment_age_ms: d.max_segment_age_ms,
            flush_batch_size: d.flush_batch_size,
        }
    }
}

impl QueueSection {
    pub fn as_fs_config(&self) -> FsQueueConfig {
        FsQueueConfig {
            max_bytes: self.max_bytes,
            max_segment_bytes: self.max_segment_bytes,
            max_segment_age_ms: self.max_segment_age_ms,
            flush_batch_size: self.flush_batch_size,
            ..FsQueueConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiemSection {
    pub endpoint: Option<String>,
    pub format: SiemFormat,
    pub bearer_token: Option<String>,
    pub idempotency_header: Option<String>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SiemFormat {
    #[default]
    Json,
    Cef,
    Leef,
}

impl SiemSection {
    pub fn as_exporter_config(&self) -> Option<ExporterConfig> {
        let endpoint = self.endpoint.clone()?;
        let mut config = ExporterConfig {
            endpoint,
            format: match self.format {
                SiemFormat::Json => AuditFormat::Json,
                SiemFormat::Cef => AuditFormat::Cef,
                SiemFormat::Leef => AuditFormat::Leef,
            },
            auth: self.bearer_token.clone().map(SiemAuth::Bearer),
            idempotency_header: self.idempotency_header.clone(),
            ..ExporterConfig::default()
        };
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        Some(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub allow_external_data: bool,
    pub allowed_external_hosts: Vec<String>,
    pub max_external_bytes: Option<u64>,
    pub max_read_range_cells: Option<u64>,
    pub max_read_range_chars: Option<u64>,
}

/// Top-level `~/.cellward/config.toml` shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellwardConfig {
    pub queue: QueueSection,
    pub siem: SiemSection,
    pub tools: ToolsSection,
}

impl CellwardConfig {
    /// Load `path`, falling back to defaults when the file is absent.
    /// A present-but-malformed file is a hard error — silently running
    /// with defaults after the operator wrote a config they expect to
    /// take effect would be worse than refusing to start.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.queue.dir.clone().unwrap_or_else(|| cellward_logging::cellward_home().join("queue"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = CellwardConfig::load(std::path::Path::new("/nonexistent/cellward/config.toml")).unwrap();
        assert!(!config.tools.allow_external_data);
        assert!(config.siem.as_exporter_config().is_none());
    }

    #[test]
    fn parses_a_partial_toml_document() {
        let toml = r#"
            [siem]
            endpoint = "https://siem.example.com/ingest"
            format = "cef"
            bearer_token = "secret-token"

            [tools]
            allow_external_data = true
            allowed_external_hosts = ["api.example.com:443"]
        "#;
        let config: CellwardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.siem.endpoint.as_deref(), Some("https://siem.example.com/ingest"));
        let exporter = config.siem.as_exporter_config().unwrap();
        assert_eq!(exporter.format, AuditFormat::Cef);
        assert!(config.tools.allow_external_data);
    }
}
