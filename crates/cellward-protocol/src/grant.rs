use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Network access mode for a grant (spec §3). Ordered so that
/// `full > allowlist > none`; a `none` update can never demote a
/// stronger existing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    None,
    Allowlist,
    Full,
}

/// Filesystem access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsAccess {
    Read,
    ReadWrite,
}

/// Network capability: a mode plus the allowlist entries that apply
/// when the mode is `Allowlist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkGrant {
    pub mode: NetworkMode,
    #[serde(default)]
    pub allowlist: BTreeSet<String>,
}

/// The full set of capabilities held by one principal (spec §3).
///
/// Grants only ever widen: `grant()` merges an update into the stored
/// value using the monotonic rules documented on each field's setter
/// in `cellward-permission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Grant {
    #[serde(default)]
    pub filesystem_read: BTreeSet<PathBuf>,
    #[serde(default)]
    pub filesystem_readwrite: BTreeSet<PathBuf>,
    #[serde(default)]
    pub network: NetworkGrant,
    #[serde(default)]
    pub clipboard: bool,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default)]
    pub automation: bool,
}

impl Grant {
    /// The locked-down default: every scope empty, network denied, all
    /// flags false (spec §4.1).
    pub fn locked_down() -> Self {
        Self::default()
    }
}

/// A capability grant update as supplied to `grant()`. Every field is
/// optional/additive; omitted fields leave the stored grant untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantUpdate {
    #[serde(default)]
    pub filesystem_read: BTreeSet<PathBuf>,
    #[serde(default)]
    pub filesystem_readwrite: BTreeSet<PathBuf>,
    #[serde(default)]
    pub network: Option<NetworkGrant>,
    #[serde(default)]
    pub clipboard: Option<bool>,
    #[serde(default)]
    pub notifications: Option<bool>,
    #[serde(default)]
    pub automation: Option<bool>,
}

/// A tagged-union capability request (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityRequest {
    Filesystem { access: FsAccess, path: PathBuf },
    Network { url: String },
    Clipboard,
    Notifications,
    Automation,
}

impl CapabilityRequest {
    /// Human-readable kind string, used in audit `details` and error
    /// messages.
    pub fn kind_str(&self) -> &'static str {
        match self {
            CapabilityRequest::Filesystem { .. } => "filesystem",
            CapabilityRequest::Network { .. } => "network",
            CapabilityRequest::Clipboard => "clipboard",
            CapabilityRequest::Notifications => "notifications",
            CapabilityRequest::Automation => "automation",
        }
    }
}
