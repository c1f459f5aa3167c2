//! `telstock-outbox` — at-least-once propagation of domain changes.

pub mod dispatcher;
pub mod entry;
pub mod payload;

pub use dispatcher::{OutboxDispatcher, OutboxRepository, OutboxStats};
pub use entry::{
    EntityType, NewOutboxEntry, Operation, OutboxEntry, OutboxEntryId, OutboxStatus,
};
pub use payload::entity_payload;
