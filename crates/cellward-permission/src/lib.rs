//! Principal & grant store plus the permission authority that
//! evaluates capability requests against grants (spec §4.1).

pub mod authority;
pub mod fs_match;
pub mod net_match;
pub mod store;

pub use authority::{evaluate, CheckResult, PermissionAuthority, Prompter};
pub use store::GrantStore;
