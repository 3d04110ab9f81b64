use crate::grant::Grant;
use crate::principal::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Guest language flavor (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestLanguage {
    SpreadsheetJs,
    TranspiledJs,
    Python,
}

/// Which standard stream an `output` message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Which resource a `limit` message concerns. Only `memory` exists
/// today; kept as an enum so the wire format doesn't need to change if
/// a second budget is added later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Memory,
}

/// First message the supervisor posts to a freshly spawned worker
/// (spec §4.3 step 3). Never includes live handles to parent
/// resources, only a deep-copied grant snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub principal: Principal,
    pub language_flavor: GuestLanguage,
    pub source: String,
    pub permission_snapshot: Grant,
    pub timeout_ms: u64,
    pub memory_mb: u64,
    pub max_output_bytes: u64,
    pub label: String,
}

/// A serialized guest-side error, re-inflated by the supervisor into a
/// `CellwardError` (spec §4.3 "error" message).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuestError {
    PermissionDenied { reason: String, request: Value },
    Timeout,
    OutputLimit,
    MemoryLimit,
    Generic { message: String },
}

/// Messages the guest worker sends to the host supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Audit { event: Value },
    Output { stream: StreamKind, text: String },
    Limit { limit: LimitKind, used_mb: u64 },
    Result { value: Value },
    Error { error: GuestError },
    Rpc { id: u64, method: String, params: Value },
}

/// Messages the host supervisor sends to the guest worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Run(Box<RunRequest>),
    RpcResult { id: u64, value: Value },
    RpcError { id: u64, error: GuestError },
    Event { name: String, payload: Value },
}
