//! `telstock-store` — in-memory persistence wiring the domain crates together.
//!
//! [`MemoryStore`] implements every repository trait behind a transactional
//! unit of work: clone on begin, swap on commit, drop on rollback. The
//! integration tests here exercise the full workflows end to end, so this
//! crate doubles as the executable reference for how the engines compose.

pub mod audit;
pub mod membership;
pub mod memory;

pub use audit::{NullAuditSink, RecordingAuditSink};
pub use membership::StaticMembership;
pub use memory::{MemoryStore, Txn};
