use cellward_protocol::{Grant, GrantUpdate, NetworkGrant, NetworkMode, Principal};
use std::collections::HashMap;
use std::sync::Mutex;

/// Exclusive owner of every principal's grant (spec §3 "Ownership").
/// Callers never get a mutable handle into the store; they get
/// deep-copied, immutable snapshots safe to hand across a sandbox
/// isolation boundary.
#[derive(Default)]
pub struct GrantStore {
    grants: Mutex<HashMap<String, Grant>>,
}

/// Merge `update` into `current` using the monotonically-widening
/// rules of spec §3/§4.1: scopes only grow, `network.mode = full`
/// supersedes `allowlist` supersedes `none`, and a `none` update is a
/// no-op against a stronger existing mode.
pub fn merge_update(current: &mut Grant, update: &GrantUpdate) {
    current.filesystem_read.extend(update.filesystem_read.iter().cloned());
    current.filesystem_readwrite.extend(update.filesystem_readwrite.iter().cloned());

    if let Some(net) = &update.network {
        merge_network(&mut current.network, net);
    }
    if let Some(true) = update.clipboard {
        current.clipboard = true;
    }
    if let Some(true) = update.notifications {
        current.notifications = true;
    }
    if let Some(true) = update.automation {
        current.automation = true;
    }
}

fn merge_network(current: &mut NetworkGrant, update: &NetworkGrant) {
    // Allowlist entries only ever accumulate, regardless of mode
    // transitions, so that widening the mode later doesn't lose
    // previously granted hosts.
    current.allowlist.extend(update.allowlist.iter().cloned());
    if update.mode > current.mode {
        current.mode = update.mode;
    }
    // `NetworkMode::None` in an update is always a no-op here because
    // `None` can never be greater than an existing stronger mode, and
    // if the current mode is also `None` the comparison is a no-op.
    let _ = NetworkMode::None;
}

impl GrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The grant currently on file for `principal`, or the locked-down
    /// default if none has ever been created.
    pub fn get_grant(&self, principal: &Principal) -> Grant {
        let grants = self.grants.lock().expect("grant store mutex poisoned");
        grants.get(&principal.key()).cloned().unwrap_or_else(Grant::locked_down)
    }

    /// A deep-copied, immutable snapshot suitable for handing to a
    /// sandboxed worker (spec §4.3 step 3).
    pub fn get_snapshot(&self, principal: &Principal) -> Grant {
        self.get_grant(principal)
    }

    /// Merge `update` into the stored grant for `principal`, creating
    /// it from the locked-down default if absent. Returns the grant
    /// after the merge.
    pub fn grant(&self, principal: &Principal, update: &GrantUpdate) -> Grant {
        let mut grants = self.grants.lock().expect("grant store mutex poisoned");
        let entry = grants.entry(principal.key()).or_insert_with(Grant::locked_down);
        merge_update(entry, update);
        entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::PrincipalKind;
    use std::path::PathBuf;

    fn principal() -> Principal {
        Principal::new(PrincipalKind::Ai, "s1")
    }

    #[test]
    fn absent_principal_gets_locked_down_default() {
        let store = GrantStore::new();
        let grant = store.get_grant(&principal());
        assert_eq!(grant, Grant::locked_down());
    }

    #[test]
    fn grant_widens_filesystem_scopes() {
        let store = GrantStore::new();
        let mut update = GrantUpdate::default();
        update.filesystem_read.insert(PathBuf::from("/tmp/a"));
        store.grant(&principal(), &update);

        let mut update2 = GrantUpdate::default();
        update2.filesystem_read.insert(PathBuf::from("/tmp/b"));
        let grant = store.grant(&principal(), &update2);

        assert!(grant.filesystem_read.contains(&PathBuf::from("/tmp/a")));
        assert!(grant.filesystem_read.contains(&PathBuf::from("/tmp/b")));
    }

    #[test]
    fn network_none_update_never_demotes() {
        let store = GrantStore::new();
        let mut update = GrantUpdate::default();
        update.network = Some(NetworkGrant { mode: NetworkMode::Full, allowlist: Default::default() });
        store.grant(&principal(), &update);

        let mut update2 = GrantUpdate::default();
        update2.network = Some(NetworkGrant { mode: NetworkMode::None, allowlist: Default::default() });
        let grant = store.grant(&principal(), &update2);

        assert_eq!(grant.network.mode, NetworkMode::Full);
    }

    #[test]
    fn network_mode_only_widens() {
        let store = GrantStore::new();
        let mut update = GrantUpdate::default();
        update.network = Some(NetworkGrant { mode: NetworkMode::Allowlist, allowlist: ["a.com".to_string()].into_iter().collect() });
        let grant = store.grant(&principal(), &update);
        assert_eq!(grant.network.mode, NetworkMode::Allowlist);

        let mut update2 = GrantUpdate::default();
        update2.network = Some(NetworkGrant { mode: NetworkMode::Full, allowlist: Default::default() });
        let grant2 = store.grant(&principal(), &update2);
        assert_eq!(grant2.network.mode, NetworkMode::Full);
        // allowlist entries accumulate even though mode moved past allowlist
        assert!(grant2.network.allowlist.contains("a.com"));
    }

    #[test]
    fn boolean_flags_only_ever_turn_on() {
        let store = GrantStore::new();
        let mut update = GrantUpdate::default();
        update.clipboard = Some(true);
        let grant = store.grant(&principal(), &update);
        assert!(grant.clipboard);

        let mut update2 = GrantUpdate::default();
        update2.clipboard = Some(false);
        let grant2 = store.grant(&principal(), &update2);
        assert!(grant2.clipboard, "explicit false must not be accepted as a demotion path");
    }
}
