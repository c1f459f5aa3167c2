//! Per-store permission checks, delegated to an external provider.

use std::sync::Arc;

use telstock_core::{StoreId, UserId};

/// The grants the coordinator consults. `CreateTransfer` covers the origin
/// side of the workflow (create, dispatch, reject, cancel);
/// `ReceiveTransfer` covers receiving at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreAction {
    CreateTransfer,
    ReceiveTransfer,
}

impl StoreAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateTransfer => "create_transfer",
            Self::ReceiveTransfer => "receive_transfer",
        }
    }
}

impl std::fmt::Display for StoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External membership provider. The coordinator asks before every
/// transition and never caches answers.
pub trait Membership: Send + Sync {
    fn has_permission(&self, user: UserId, store: StoreId, action: StoreAction) -> bool;
}

impl<M> Membership for Arc<M>
where
    M: Membership + ?Sized,
{
    fn has_permission(&self, user: UserId, store: StoreId, action: StoreAction) -> bool {
        (**self).has_permission(user, store, action)
    }
}
