use crate::adapters::SandboxAdapters;
use crate::guest::materialized_guest_path;
use cellward_permission::{evaluate, PermissionAuthority};
use cellward_protocol::{
    AuditEvent, AuditSink, CapabilityRequest, CellwardError, EventActor, FsAccess, Grant, GuestError,
    GuestLanguage, HostMessage, Principal, RunRequest, WorkerMessage,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::warn;

/// Parameters for one sandboxed run (spec §4.3 `run(...)`).
pub struct RunParams {
    pub principal: Principal,
    pub language_flavor: GuestLanguage,
    pub source: String,
    pub timeout_ms: u64,
    pub memory_mb: u64,
    pub max_output_bytes: u64,
    pub label: String,
}

/// Executes untrusted guest source as a genuine OS child process with
/// no ambient authority; the supervisor is the sole capability broker
/// (spec §4.3).
pub struct SandboxSupervisor {
    permission: Arc<PermissionAuthority>,
    audit: Arc<dyn AuditSink>,
    adapters: SandboxAdapters,
    interpreter: String,
}

impl SandboxSupervisor {
    pub fn new(permission: Arc<PermissionAuthority>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            permission,
            audit,
            adapters: SandboxAdapters::default(),
            interpreter: "python3".to_string(),
        }
    }

    pub fn with_adapters(mut self, adapters: SandboxAdapters) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Run one guest program to settlement: a result value, or a typed
    /// sandbox/permission error (spec §4.3 lifecycle).
    pub async fn run(&self, params: RunParams) -> Result<Value, CellwardError> {
        let snapshot = self.permission.get_snapshot(&params.principal);
        let run_label = format!("security.{}.run", params.label);
        self.emit(&run_label, &params.principal, true, json!({ "phase": "start" }));

        let request = RunRequest {
            principal: params.principal.clone(),
            language_flavor: params.language_flavor,
            source: params.source.clone(),
            permission_snapshot: snapshot.clone(),
            timeout_ms: params.timeout_ms,
            memory_mb: params.memory_mb,
            max_output_bytes: params.max_output_bytes,
            label: params.label.clone(),
        };

        let guest_path = materialized_guest_path().map_err(|e| CellwardError::runtime(e.to_string()))?;

        let mut child = Command::new(&self.interpreter)
            .arg(&guest_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CellwardError::SandboxWorkerExit { detail: e.to_string() })?;

        let mut stdin = child.stdin.take().expect("stdin piped at spawn");
        if let Err(e) = self.write_host_message(&mut stdin, &HostMessage::Run(Box::new(request))).await {
            let _ = child.start_kill();
            return Err(e);
        }

        let stdout = child.stdout.take().expect("stdout piped at spawn");
        let stderr = child.stderr.take().expect("stderr piped at spawn");

        let outcome = match tokio::time::timeout(
            Duration::from_millis(params.timeout_ms),
            self.drive(&mut child, &mut stdin, stdout, stderr, &params, &snapshot),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(CellwardError::SandboxTimeout { timeout_ms: params.timeout_ms })
            }
        };

        match &outcome {
            Ok(_) => self.emit(&run_label, &params.principal, true, json!({ "phase": "success" })),
            Err(e) => self.emit(&run_label, &params.principal, false, json!({ "phase": "error", "code": e.code() })),
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        child: &mut Child,
        stdin: &mut ChildStdin,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        params: &RunParams,
        snapshot: &Grant,
    ) -> Result<Value, CellwardError> {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut output_bytes: u64 = 0;
        let mut settled: Option<Result<Value, CellwardError>> = None;

        while settled.is_none() {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(text)) => match serde_json::from_str::<WorkerMessage>(&text) {
                            Ok(message) => {
                                settled = self
                                    .handle_message(message, stdin, params, snapshot, &mut output_bytes)
                                    .await;
                            }
                            Err(e) => warn!(error = %e, line = %text, "unparseable worker message"),
                        },
                        Ok(None) => {
                            settled = Some(Err(CellwardError::SandboxWorkerExit {
                                detail: "worker closed stdout before settling".into(),
                            }));
                        }
                        Err(e) => settled = Some(Err(CellwardError::runtime(e.to_string()))),
                    }
                }
                line = stderr_lines.next_line() => {
                    if let Ok(Some(text)) = line {
                        tracing::debug!(stderr = %text, label = %params.label, "sandbox stderr");
                    }
                }
            }
        }

        let _ = child.start_kill();
        let _ = child.wait().await;
        settled.unwrap_or_else(|| Err(CellwardError::SandboxWorkerExit { detail: "no settlement".into() }))
    }

    async fn handle_message(
        &self,
        message: WorkerMessage,
        stdin: &mut ChildStdin,
        params: &RunParams,
        snapshot: &Grant,
        output_bytes: &mut u64,
    ) -> Option<Result<Value, CellwardError>> {
        match message {
            WorkerMessage::Audit { event } => {
                if let Ok(audit_event) = AuditEvent::from_value(event) {
                    self.audit.emit(audit_event);
                }
                None
            }
            WorkerMessage::Output { stream: _, text } => {
                *output_bytes += text.len() as u64;
                if *output_bytes > params.max_output_bytes {
                    Some(Err(CellwardError::SandboxOutputLimit { max_output_bytes: params.max_output_bytes }))
                } else {
                    None
                }
            }
            WorkerMessage::Limit { limit: _, used_mb } => {
                Some(Err(CellwardError::SandboxMemoryLimit { memory_mb: params.memory_mb, used_mb: Some(used_mb) }))
            }
            WorkerMessage::Result { value } => Some(Ok(value)),
            WorkerMessage::Error { error } => Some(Err(self.map_guest_error(error, &params.principal))),
            WorkerMessage::Rpc { id, method, params: rpc_params } => {
                self.handle_rpc(id, method, rpc_params, stdin, &params.principal, snapshot).await;
                None
            }
        }
    }

    fn map_guest_error(&self, error: GuestError, principal: &Principal) -> CellwardError {
        match error {
            GuestError::PermissionDenied { reason, request } => {
                CellwardError::permission_denied(principal.key(), request, reason)
            }
            GuestError::Timeout => CellwardError::SandboxTimeout { timeout_ms: 0 },
            GuestError::OutputLimit => CellwardError::SandboxOutputLimit { max_output_bytes: 0 },
            GuestError::MemoryLimit => CellwardError::SandboxMemoryLimit { memory_mb: 0, used_mb: None },
            GuestError::Generic { message } => CellwardError::runtime(message),
        }
    }

    async fn handle_rpc(
        &self,
        id: u64,
        method: String,
        rpc_params: Value,
        stdin: &mut ChildStdin,
        principal: &Principal,
        snapshot: &Grant,
    ) {
        let request = match method.as_str() {
            "fs.read" => CapabilityRequest::Filesystem { access: FsAccess::Read, path: path_from(&rpc_params) },
            "fs.write" => CapabilityRequest::Filesystem { access: FsAccess::ReadWrite, path: path_from(&rpc_params) },
            "fetch" => CapabilityRequest::Network {
                url: rpc_params.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
            "clipboard.read" | "clipboard.write" => CapabilityRequest::Clipboard,
            "notifications.notify" => CapabilityRequest::Notifications,
            "automation.invoke" => CapabilityRequest::Automation,
            other => {
                self.send_rpc_error(stdin, id, GuestError::Generic { message: format!("unknown capability method {other}") }).await;
                return;
            }
        };

        let check = evaluate(snapshot, &request);
        self.emit_rpc_audit(&request, principal, check.allowed, check.reason.clone());

        if !check.allowed {
            let reason = check.reason.unwrap_or_else(|| "denied".to_string());
            let request_value = serde_json::to_value(&request).unwrap_or(json!({}));
            self.send_rpc_error(stdin, id, GuestError::PermissionDenied { reason, request: request_value }).await;
            return;
        }

        match self.perform_capability(&method, rpc_params).await {
            Ok(value) => self.send_rpc_result(stdin, id, value).await,
            Err(error) => self.send_rpc_error(stdin, id, error).await,
        }
    }

    async fn perform_capability(&self, method: &str, params: Value) -> Result<Value, GuestError> {
        match method {
            "fs.read" => {
                let path = params.get("path").and_then(Value::as_str).unwrap_or_default();
                tokio::fs::read_to_string(path)
                    .await
                    .map(Value::String)
                    .map_err(|e| GuestError::Generic { message: e.to_string() })
            }
            "fs.write" => {
                let path = params.get("path").and_then(Value::as_str).unwrap_or_default();
                let data = params.get("data").and_then(Value::as_str).unwrap_or_default();
                tokio::fs::write(path, data)
                    .await
                    .map(|_| json!({ "bytesWritten": data.len() }))
                    .map_err(|e| GuestError::Generic { message: e.to_string() })
            }
            "fetch" => {
                let url = params.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
                let response = reqwest::get(&url).await.map_err(|e| GuestError::Generic { message: e.to_string() })?;
                let status = response.status().as_u16();
                let ok = response.status().is_success();
                let headers: serde_json::Map<String, Value> = response
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
                    .collect();
                let text = response.text().await.unwrap_or_default();
                Ok(json!({ "ok": ok, "status": status, "url": url, "headers": headers, "text": text }))
            }
            "clipboard.read" => self
                .adapters
                .clipboard
                .as_ref()
                .map(|a| json!(a.read()))
                .ok_or_else(unavailable),
            "clipboard.write" => {
                let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
                match &self.adapters.clipboard {
                    Some(a) => {
                        a.write(text);
                        Ok(Value::Null)
                    }
                    None => Err(unavailable()),
                }
            }
            "notifications.notify" => {
                let title = params.get("title").and_then(Value::as_str).unwrap_or_default();
                let body = params.get("body").and_then(Value::as_str).unwrap_or_default();
                match &self.adapters.notifications {
                    Some(a) => {
                        a.notify(title, body);
                        Ok(Value::Null)
                    }
                    None => Err(unavailable()),
                }
            }
            "automation.invoke" => {
                let action = params.get("action").and_then(Value::as_str).unwrap_or_default();
                let inner = params.get("params").cloned().unwrap_or(json!({}));
                match &self.adapters.automation {
                    Some(a) => Ok(a.invoke(action, inner)),
                    None => Err(unavailable()),
                }
            }
            other => Err(GuestError::Generic { message: format!("unknown capability method {other}") }),
        }
    }

    async fn send_rpc_result(&self, stdin: &mut ChildStdin, id: u64, value: Value) {
        let _ = self.write_host_message(stdin, &HostMessage::RpcResult { id, value }).await;
    }

    async fn send_rpc_error(&self, stdin: &mut ChildStdin, id: u64, error: GuestError) {
        let _ = self.write_host_message(stdin, &HostMessage::RpcError { id, error }).await;
    }

    async fn write_host_message(&self, stdin: &mut ChildStdin, message: &HostMessage) -> Result<(), CellwardError> {
        let mut line = serde_json::to_string(message).map_err(|e| CellwardError::runtime(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(|e| CellwardError::runtime(e.to_string()))
    }

    fn emit(&self, event_type: &str, principal: &Principal, success: bool, details: Value) {
        let details_map = details.as_object().cloned().unwrap_or_default();
        let event = AuditEvent::builder(event_type, EventActor::from(principal), success).details(details_map).build();
        self.audit.emit(event);
    }

    fn emit_rpc_audit(&self, request: &CapabilityRequest, principal: &Principal, allowed: bool, reason: Option<String>) {
        let mut details = serde_json::Map::new();
        details.insert("kind".to_string(), json!(request.kind_str()));
        if let Some(reason) = reason {
            details.insert("reason".to_string(), json!(reason));
        }
        let event = AuditEvent::builder("security.sandbox.rpc", EventActor::from(principal), allowed)
            .details(details)
            .build();
        self.audit.emit(event);
    }
}

fn path_from(params: &Value) -> PathBuf {
    PathBuf::from(params.get("path").and_then(Value::as_str).unwrap_or_default())
}

fn unavailable() -> GuestError {
    GuestError::Generic { message: "secure_api_unavailable".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::{NullAuditSink, PrincipalKind};

    fn supervisor() -> SandboxSupervisor {
        let permission = Arc::new(PermissionAuthority::new(Arc::new(NullAuditSink)));
        SandboxSupervisor::new(permission, Arc::new(NullAuditSink))
    }

    fn principal() -> Principal {
        Principal::new(PrincipalKind::Ai, "s1")
    }

    #[tokio::test]
    #[ignore = "requires a python3 interpreter on PATH"]
    async fn settles_with_result_value() {
        let supervisor = supervisor();
        let params = RunParams {
            principal: principal(),
            language_flavor: GuestLanguage::Python,
            source: "result = 1 + 1".to_string(),
            timeout_ms: 5_000,
            memory_mb: 128,
            max_output_bytes: 65_536,
            label: "test".to_string(),
        };
        let value = supervisor.run(params).await.unwrap();
        assert_eq!(value, json!(2));
    }

    #[tokio::test]
    #[ignore = "requires a python3 interpreter on PATH"]
    async fn denies_filesystem_access_by_default() {
        let supervisor = supervisor();
        let params = RunParams {
            principal: principal(),
            language_flavor: GuestLanguage::Python,
            source: "result = fs['read_file']('/etc/hostname')".to_string(),
            timeout_ms: 5_000,
            memory_mb: 128,
            max_output_bytes: 65_536,
            label: "test".to_string(),
        };
        let result = supervisor.run(params).await;
        assert!(matches!(result, Err(CellwardError::PermissionDenied(_))));
    }

    #[test]
    fn unknown_rpc_method_maps_to_generic_guest_error() {
        let err = unavailable();
        assert!(matches!(err, GuestError::Generic { .. }));
    }
}
