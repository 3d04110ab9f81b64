use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error taxonomy shared across every cellward crate (spec §7).
///
/// Each variant carries a `details` payload so callers can serialize the
/// error directly into an audit event or a tool result without losing
/// context.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "details", rename_all = "snake_case")]
pub enum CellwardError {
    #[error("permission denied: {0}")]
    PermissionDenied(PermissionDenied),

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("not implemented: {message}")]
    NotImplemented { message: String },

    #[error("runtime error: {message}")]
    RuntimeError { message: String },

    #[error("sandbox timed out after {timeout_ms}ms")]
    SandboxTimeout { timeout_ms: u64 },

    #[error("sandbox exceeded memory budget of {memory_mb}MB")]
    SandboxMemoryLimit { memory_mb: u64, used_mb: Option<u64> },

    #[error("sandbox exceeded output budget of {max_output_bytes} bytes")]
    SandboxOutputLimit { max_output_bytes: u64 },

    #[error("sandbox worker exited unexpectedly: {detail}")]
    SandboxWorkerExit { detail: String },

    #[error("audit queue is full")]
    QueueFull { capacity_bytes: u64 },

    #[error("audit queue flush lock is held by another flusher")]
    QueueLocked,
}

/// Payload for [`CellwardError::PermissionDenied`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDenied {
    pub principal_key: String,
    pub request: Value,
    pub reason: String,
}

impl CellwardError {
    /// Dotted-snake code string used in audit events and tool results.
    pub fn code(&self) -> &'static str {
        match self {
            CellwardError::PermissionDenied(_) => "permission_denied",
            CellwardError::ValidationError { .. } => "validation_error",
            CellwardError::NotImplemented { .. } => "not_implemented",
            CellwardError::RuntimeError { .. } => "runtime_error",
            CellwardError::SandboxTimeout { .. } => "sandbox_timeout",
            CellwardError::SandboxMemoryLimit { .. } => "sandbox_memory_limit",
            CellwardError::SandboxOutputLimit { .. } => "sandbox_output_limit",
            CellwardError::SandboxWorkerExit { .. } => "sandbox_worker_exit",
            CellwardError::QueueFull { .. } => "queue_full",
            CellwardError::QueueLocked => "queue_locked",
        }
    }

    pub fn permission_denied(
        principal_key: impl Into<String>,
        request: Value,
        reason: impl Into<String>,
    ) -> Self {
        CellwardError::PermissionDenied(PermissionDenied {
            principal_key: principal_key.into(),
            request,
            reason: reason.into(),
        })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CellwardError::ValidationError {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        CellwardError::RuntimeError {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        CellwardError::NotImplemented {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CellwardError>;
