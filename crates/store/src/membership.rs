//! Grant-table membership provider.

use std::collections::HashSet;

use telstock_core::{StoreId, UserId};
use telstock_transfers::{Membership, StoreAction};

/// [`Membership`] backed by an explicit grant table.
///
/// Grants are fixed at construction. The permissive variant answers yes to
/// everything and suits tests that are not about permissions.
#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    grants: HashSet<(UserId, StoreId, StoreAction)>,
    allow_all: bool,
}

impl StaticMembership {
    /// No grants at all; every check fails until [`grant`](Self::grant) adds one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every check passes.
    pub fn permissive() -> Self {
        Self {
            grants: HashSet::new(),
            allow_all: true,
        }
    }

    /// Allow `user` to perform `action` on `store`.
    pub fn grant(mut self, user: UserId, store: StoreId, action: StoreAction) -> Self {
        self.grants.insert((user, store, action));
        self
    }
}

impl Membership for StaticMembership {
    fn has_permission(&self, user: UserId, store: StoreId, action: StoreAction) -> bool {
        self.allow_all || self.grants.contains(&(user, store, action))
    }
}
