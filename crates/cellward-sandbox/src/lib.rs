//! Sandbox Supervisor (spec §4.3): runs untrusted guest source as an
//! isolated child process with no ambient authority, brokering every
//! capability call through the Permission Authority.

pub mod adapters;
pub mod guest;
pub mod supervisor;

pub use adapters::{AutomationAdapter, ClipboardAdapter, NotificationsAdapter, SandboxAdapters};
pub use supervisor::{RunParams, SandboxSupervisor};
