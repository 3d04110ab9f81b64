use crate::fs_match;
use crate::net_match;
use crate::store::GrantStore;
use cellward_protocol::{
    AuditEvent, AuditSink, CapabilityRequest, CellwardError, EventActor, FsAccess, Grant,
    GrantUpdate, NetworkGrant, NetworkMode, Principal,
};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Result of a pure [`evaluate`] call (spec §4.1 `check`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl CheckResult {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// Pure evaluator: given a grant and a request, decide allow/deny.
/// Never fails, never performs I/O — a function of its two arguments
/// only (spec §8 "check is a pure function of the current grant").
pub fn evaluate(grant: &Grant, request: &CapabilityRequest) -> CheckResult {
    match request {
        CapabilityRequest::Filesystem { access, path } => {
            let target = fs_match::normalize(path);
            let scopes: Vec<&std::path::PathBuf> = match access {
                FsAccess::Read => grant
                    .filesystem_read
                    .iter()
                    .chain(grant.filesystem_readwrite.iter())
                    .collect(),
                FsAccess::ReadWrite => grant.filesystem_readwrite.iter().collect(),
            };
            if scopes.iter().any(|scope| fs_match::is_within(scope, &target)) {
                CheckResult::allow()
            } else {
                CheckResult::deny(format!(
                    "no {:?} scope covers {}",
                    access,
                    target.display()
                ))
            }
        }
        CapabilityRequest::Network { url } => {
            let parsed = match Url::parse(url) {
                Ok(u) => u,
                Err(e) => return CheckResult::deny(format!("invalid url: {e}")),
            };
            match grant.network.mode {
                NetworkMode::Full => CheckResult::allow(),
                NetworkMode::None => CheckResult::deny("network access is disabled"),
                NetworkMode::Allowlist => {
                    if net_match::allowlist_matches(&grant.network.allowlist, &parsed) {
                        CheckResult::allow()
                    } else {
                        CheckResult::deny(format!("{url} is not on the network allowlist"))
                    }
                }
            }
        }
        CapabilityRequest::Clipboard => {
            bool_check(grant.clipboard, "clipboard")
        }
        CapabilityRequest::Notifications => {
            bool_check(grant.notifications, "notifications")
        }
        CapabilityRequest::Automation => {
            bool_check(grant.automation, "automation")
        }
    }
}

fn bool_check(flag: bool, name: &str) -> CheckResult {
    if flag {
        CheckResult::allow()
    } else {
        CheckResult::deny(format!("{name} capability not granted"))
    }
}

/// Callback invoked by `ensure` when a request is denied and the
/// caller opted into interactive widening. Returns `true` to widen the
/// grant for exactly the requested scope and retry.
pub trait Prompter: Send + Sync {
    fn prompt<'a>(
        &'a self,
        principal: &'a Principal,
        request: &'a CapabilityRequest,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// The process-wide permission authority: owns the grant store and
/// emits canonical audit events on every decision (spec §4.1).
pub struct PermissionAuthority {
    store: GrantStore,
    audit: Arc<dyn AuditSink>,
}

impl PermissionAuthority {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { store: GrantStore::new(), audit }
    }

    pub fn get_grant(&self, principal: &Principal) -> Grant {
        self.store.get_grant(principal)
    }

    pub fn get_snapshot(&self, principal: &Principal) -> Grant {
        self.store.get_snapshot(principal)
    }

    /// Merge `update` into the principal's grant and emit
    /// `security.permission.granted`.
    pub fn grant(&self, principal: &Principal, update: &GrantUpdate) -> Grant {
        let result = self.store.grant(principal, update);
        info!(principal = %principal, "grant widened");
        self.emit("security.permission.granted", principal, true, None, json!({ "update": update_summary(update) }));
        result
    }

    /// Pure check, but audited: emits `security.permission.checked`
    /// regardless of outcome.
    pub fn check(&self, principal: &Principal, request: &CapabilityRequest) -> CheckResult {
        let grant = self.store.get_grant(principal);
        let result = evaluate(&grant, request);
        self.emit(
            "security.permission.checked",
            principal,
            result.allowed,
            result.reason.clone(),
            request_details(request),
        );
        result
    }

    /// `check`, optionally prompting on denial and narrowly widening
    /// the grant for the exact requested scope before retrying (spec
    /// §4.1). Fails with `permission_denied` if the (possibly
    /// prompted) request is still denied.
    pub async fn ensure(
        &self,
        principal: &Principal,
        request: &CapabilityRequest,
        prompt_if_denied: bool,
        prompter: Option<&dyn Prompter>,
    ) -> Result<(), CellwardError> {
        let grant = self.store.get_grant(principal);
        let mut result = evaluate(&grant, request);

        if result.allowed {
            self.emit("security.permission.checked", principal, true, None, request_details(request));
            return Ok(());
        }

        if !prompt_if_denied || prompter.is_none() {
            self.emit(
                "security.permission.denied",
                principal,
                false,
                result.reason.clone(),
                request_details(request),
            );
            return Err(CellwardError::permission_denied(
                principal.key(),
                request_details(request),
                result.reason.unwrap_or_else(|| "denied".to_string()),
            ));
        }

        self.emit("security.permission.prompted", principal, false, None, request_details(request));
        let approved = prompter.unwrap().prompt(principal, request).await;

        if approved {
            let update = narrow_widening(request);
            self.store.grant(principal, &update);
            let widened = self.store.get_grant(principal);
            result = evaluate(&widened, request);
        }

        if result.allowed {
            self.emit("security.permission.granted", principal, true, None, request_details(request));
            Ok(())
        } else {
            warn!(principal = %principal, "request denied after prompt");
            self.emit(
                "security.permission.denied",
                principal,
                false,
                result.reason.clone(),
                request_details(request),
            );
            Err(CellwardError::permission_denied(
                principal.key(),
                request_details(request),
                result.reason.unwrap_or_else(|| "denied after prompt".to_string()),
            ))
        }
    }

    fn emit(
        &self,
        event_type: &str,
        principal: &Principal,
        success: bool,
        reason: Option<String>,
        mut details: serde_json::Value,
    ) {
        if let (Some(obj), Some(reason)) = (details.as_object_mut(), reason) {
            obj.insert("reason".to_string(), json!(reason));
        }
        let details_map = details.as_object().cloned().unwrap_or_default();
        let event = AuditEvent::builder(event_type, EventActor::from(principal), success)
            .details(details_map)
            .build();
        self.audit.emit(event);
    }
}

/// The exact-scope widening applied when a prompt is approved (spec
/// §4.1 `ensure`): filesystem widens to exactly the requested path,
/// network widens to exactly the requested origin, boolean flags flip
/// to true.
fn narrow_widening(request: &CapabilityRequest) -> GrantUpdate {
    let mut update = GrantUpdate::default();
    match request {
        CapabilityRequest::Filesystem { access, path } => {
            let normalized = fs_match::normalize(path);
            match access {
                FsAccess::Read => {
                    update.filesystem_read.insert(normalized);
                }
                FsAccess::ReadWrite => {
                    update.filesystem_readwrite.insert(normalized);
                }
            }
        }
        CapabilityRequest::Network { url } => {
            if let Ok(parsed) = Url::parse(url) {
                if let Some(host) = parsed.host_str() {
                    let entry = match parsed.port() {
                        Some(p) => format!("{}://{}:{}", parsed.scheme(), host, p),
                        None => format!("{}://{}", parsed.scheme(), host),
                    };
                    update.network = Some(NetworkGrant {
                        mode: NetworkMode::Allowlist,
                        allowlist: [entry].into_iter().collect(),
                    });
                }
            }
        }
        CapabilityRequest::Clipboard => update.clipboard = Some(true),
        CapabilityRequest::Notifications => update.notifications = Some(true),
        CapabilityRequest::Automation => update.automation = Some(true),
    }
    update
}

fn request_details(request: &CapabilityRequest) -> serde_json::Value {
    match request {
        CapabilityRequest::Filesystem { access, path } => json!({
            "kind": "filesystem",
            "access": format!("{:?}", access).to_lowercase(),
            "path": path.display().to_string(),
        }),
        CapabilityRequest::Network { url } => json!({ "kind": "network", "url": url }),
        CapabilityRequest::Clipboard => json!({ "kind": "clipboard" }),
        CapabilityRequest::Notifications => json!({ "kind": "notifications" }),
        CapabilityRequest::Automation => json!({ "kind": "automation" }),
    }
}

fn update_summary(update: &GrantUpdate) -> serde_json::Value {
    json!({
        "filesystem_read_added": update.filesystem_read.len(),
        "filesystem_readwrite_added": update.filesystem_readwrite.len(),
        "network": update.network.as_ref().map(|n| format!("{:?}", n.mode)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::{NullAuditSink, PrincipalKind};
    use std::path::PathBuf;

    fn authority() -> PermissionAuthority {
        PermissionAuthority::new(Arc::new(NullAuditSink))
    }

    fn principal() -> Principal {
        Principal::new(PrincipalKind::Ai, "s1")
    }

    #[test]
    fn check_is_pure_given_grant() {
        let grant = Grant::locked_down();
        let req = CapabilityRequest::Clipboard;
        let r1 = evaluate(&grant, &req);
        let r2 = evaluate(&grant, &req);
        assert_eq!(r1, r2);
        assert!(!r1.allowed);
    }

    #[tokio::test]
    async fn ensure_denies_filesystem_write_by_default() {
        let auth = authority();
        let req = CapabilityRequest::Filesystem {
            access: FsAccess::ReadWrite,
            path: PathBuf::from("/tmp/x/out.txt"),
        };
        let result = auth.ensure(&principal(), &req, false, None).await;
        assert!(matches!(result, Err(CellwardError::PermissionDenied(_))));
    }

    #[test]
    fn readwrite_scope_implies_read() {
        let mut update = GrantUpdate::default();
        update.filesystem_readwrite.insert(PathBuf::from("/tmp/x"));
        let store = GrantStore::new();
        let grant = store.grant(&principal(), &update);
        let read_req = CapabilityRequest::Filesystem {
            access: FsAccess::Read,
            path: PathBuf::from("/tmp/x/out.txt"),
        };
        assert!(evaluate(&grant, &read_req).allowed);
    }

    struct AlwaysApprove;
    impl Prompter for AlwaysApprove {
        fn prompt<'a>(
            &'a self,
            _principal: &'a Principal,
            _request: &'a CapabilityRequest,
        ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
            Box::pin(async { true })
        }
    }

    #[tokio::test]
    async fn ensure_widens_narrowly_on_approved_prompt() {
        let auth = authority();
        let req = CapabilityRequest::Filesystem {
            access: FsAccess::Read,
            path: PathBuf::from("/tmp/only-this/file.txt"),
        };
        let prompter = AlwaysApprove;
        auth.ensure(&principal(), &req, true, Some(&prompter)).await.unwrap();

        let other_req = CapabilityRequest::Filesystem {
            access: FsAccess::Read,
            path: PathBuf::from("/tmp/other/file.txt"),
        };
        let result = auth.ensure(&principal(), &other_req, false, None).await;
        assert!(result.is_err(), "widening must be scoped to exactly the approved path");
    }
}
