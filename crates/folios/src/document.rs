//! Fiscal documents issued against an authorization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use telstock_core::{DomainResult, StoreId};

use crate::authorization::DteDocumentType;

telstock_core::entity_id! {
    /// Identifier of an issued fiscal document.
    pub struct DteDocumentId
}

/// Delivery state of a fiscal document toward the tax authority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DteDocumentStatus {
    Registrado,
    Enviado,
}

/// Insert payload; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDteDocument {
    pub document_type: DteDocumentType,
    pub series: String,
    pub folio: i64,
    pub store_id: StoreId,
    /// The sale this document bills, when there is one.
    pub sale_id: Option<i64>,
}

impl NewDteDocument {
    pub fn into_document(self, id: DteDocumentId) -> DteDocument {
        DteDocument {
            id,
            document_type: self.document_type,
            series: self.series,
            folio: self.folio,
            store_id: self.store_id,
            sale_id: self.sale_id,
            status: DteDocumentStatus::Registrado,
            sent_at: None,
            created_at: Utc::now(),
        }
    }
}

/// One issued fiscal document. `sent_at` is stamped when the dispatch queue
/// records a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteDocument {
    pub id: DteDocumentId,
    pub document_type: DteDocumentType,
    pub series: String,
    pub folio: i64,
    pub store_id: StoreId,
    pub sale_id: Option<i64>,
    pub status: DteDocumentStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DteDocument {
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.status = DteDocumentStatus::Enviado;
        self.sent_at = Some(at);
    }
}

/// Access to fiscal documents within one unit of work.
pub trait DteDocumentRepository {
    fn dte_document(&self, id: DteDocumentId) -> DomainResult<DteDocument>;
    fn insert_dte_document(&mut self, document: NewDteDocument) -> DteDocument;
    fn update_dte_document(&mut self, document: &DteDocument) -> DomainResult<()>;
}
