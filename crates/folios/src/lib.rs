//! Fiscal numbering (DTE folios) and document delivery.
//!
//! Authorizations own disjoint folio ranges per (document type, series);
//! the allocator hands out numbers sequentially and never reuses one.
//! Issued documents queue for delivery through a dedicated DTE queue that
//! stamps `sent_at` on confirmation.

pub mod allocator;
pub mod authorization;
pub mod dispatch;
pub mod document;

pub use allocator::{AuthorizationRepository, FolioAllocator};
pub use authorization::{
    AuthorizationId, DteAuthorization, DteDocumentType, NewAuthorization,
};
pub use dispatch::{
    DteDispatchQueue, DteQueueEntry, DteQueueEntryId, DteQueueRepository, NewDteQueueEntry,
};
pub use document::{
    DteDocument, DteDocumentId, DteDocumentRepository, DteDocumentStatus, NewDteDocument,
};
