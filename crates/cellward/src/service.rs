//! The process-wide object graph: one [`PermissionAuthority`], one
//! [`AuditPipeline`], one [`SandboxSupervisor`], and a fresh
//! [`ToolExecutor`] per document. Nothing here is a singleton — a test
//! or an embedding host can construct as many `Service`s as it likes,
//! each with its own queue directory (spec §9 "Global state").

use crate::config::CellwardConfig;
use cellward_audit::pipeline::{AuditPipeline, FsAuditQueue};
use cellward_permission::PermissionAuthority;
use cellward_protocol::AuditSink;
use cellward_sandbox::SandboxSupervisor;
use cellward_tools::{InMemorySpreadsheet, ToolExecutor, ToolExecutorConfig};
use std::sync::Arc;

/// Owns the long-lived components shared across every request the
/// embedding host makes: grants, the offline audit queue, and the
/// sandbox supervisor. Short-lived per-call state (a `ToolExecutor`'s
/// pivot registry, a sandbox run's worker) is created fresh each time.
pub struct Service {
    pub permission: Arc<PermissionAuthority>,
    pub audit: Arc<AuditPipeline>,
    pub sandbox: Arc<SandboxSupervisor>,
    config: CellwardConfig,
}

impl Service {
    /// Build a service rooted at `config.queue_dir()`, creating the
    /// directory if it doesn't exist yet.
    pub fn new(config: CellwardConfig) -> anyhow::Result<Self> {
        let queue = FsAuditQueue::new(config.queue_dir(), config.queue.as_fs_config())?;
        let audit: Arc<AuditPipeline> = Arc::new(AuditPipeline::Fs(queue));
        let permission = Arc::new(PermissionAuthority::new(audit.clone() as Arc<dyn AuditSink>));
        let sandbox = Arc::new(SandboxSupervisor::new(permission.clone(), audit.clone() as Arc<dyn AuditSink>));
        Ok(Self { permission, audit, sandbox, config })
    }

    pub fn config(&self) -> &CellwardConfig {
        &self.config
    }

    /// A [`ToolExecutor`] over a fresh in-memory document, wired to
    /// this service's audit sink and the tool budgets from config.
    /// Production hosts construct their own `ToolExecutor` directly
    /// over their real `SpreadsheetApi`; this is the entry point the
    /// CLI's `tool` subcommand uses.
    pub fn in_memory_tool_executor(&self, fixture: &serde_json::Value) -> ToolExecutor {
        let sheet = InMemorySpreadsheet::from_fixture(fixture);
        let mut tool_config = ToolExecutorConfig::default();
        tool_config.allow_external_data = self.config.tools.allow_external_data;
        tool_config.allowed_external_hosts = self
            .config
            .tools
            .allowed_external_hosts
            .iter()
            .map(|entry| parse_allowed_host(entry))
            .collect();
        if let Some(max) = self.config.tools.max_external_bytes {
            tool_config.max_external_bytes = max;
        }
        if let Some(max) = self.config.tools.max_read_range_cells {
            tool_config.max_read_range_cells = max;
        }
        if let Some(max) = self.config.tools.max_read_range_chars {
            tool_config.max_read_range_chars = max;
        }
        ToolExecutor::new(Box::new(sheet), tool_config, self.audit.clone() as Arc<dyn AuditSink>)
    }
}

fn parse_allowed_host(entry: &str) -> cellward_tools::AllowedHost {
    match entry.split_once(':') {
        Some((host, port)) => cellward_tools::AllowedHost { host: host.to_string(), port: port.parse().ok() },
        None => cellward_tools::AllowedHost { host: entry.to_string(), port: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_service_has_a_locked_down_default_grant() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CellwardConfig::default();
        config.queue.dir = Some(dir.path().to_path_buf());
        let service = Service::new(config).unwrap();
        let principal = cellward_protocol::Principal::new(cellward_protocol::PrincipalKind::Ai, "s1");
        let grant = service.permission.get_grant(&principal);
        assert_eq!(grant.network.mode, cellward_protocol::NetworkMode::None);
        assert!(!grant.clipboard);
    }
}
