//! `telstock-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no storage concerns).

pub mod audit;
pub mod config;
pub mod error;
pub mod id;
pub mod money;

pub use audit::{AuditLog, AuditRecord, AuditSink};
pub use config::LedgerConfig;
pub use error::{DomainError, DomainResult, ValidationCode};
pub use id::{StoreId, UserId};
