//! Inter-store transfers: the request/dispatch/receive/reject/cancel
//! state machine.
//!
//! Stock leaves the origin at dispatch and lands at the destination on
//! receipt; rejecting an in-transit order restores whatever never arrived.
//! Permission checks go through the external [`Membership`] provider.

pub mod coordinator;
pub mod membership;
pub mod order;

pub use coordinator::{ReceiveLine, TransferCoordinator, TransferOrderRepository};
pub use membership::{Membership, StoreAction};
pub use order::{
    NewTransferOrder, TransferAction, TransferDraft, TransferOrder, TransferOrderId,
    TransferOrderItem, TransferRequest, TransferStatus, transition,
};
