//! Canonical types shared by every crate in the cellward security
//! substrate: principals, capability grants/requests, the audit event
//! envelope, spreadsheet value types, and the sandbox wire protocol.

pub mod audit_event;
pub mod error;
pub mod grant;
pub mod principal;
pub mod sink;
pub mod spreadsheet;
pub mod wire;

pub use audit_event::{AuditEvent, AuditEventBuilder, EventActor, EventContext, EventCorrelation, EventError, EventResource};
pub use error::{CellwardError, PermissionDenied, Result};
pub use grant::{CapabilityRequest, FsAccess, Grant, GrantUpdate, NetworkGrant, NetworkMode};
pub use principal::{Principal, PrincipalKind};
pub use sink::{AuditSink, NullAuditSink};
pub use spreadsheet::{Cell, CellValue, Range, Scalar, SheetId};
pub use wire::{GuestError, GuestLanguage, HostMessage, LimitKind, RunRequest, StreamKind, WorkerMessage};
