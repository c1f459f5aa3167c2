//! Sequential folio reservation.

use serde_json::{Value, json};
use tracing::{debug, info};

use telstock_core::{AuditLog, AuditRecord, DomainError, DomainResult, UserId};

use crate::authorization::{
    AuthorizationId, DteAuthorization, DteDocumentType, NewAuthorization,
};
use crate::dispatch::{DteDispatchQueue, DteQueueEntry, DteQueueRepository};
use crate::document::{DteDocument, DteDocumentRepository, NewDteDocument};

/// Access to numbering authorizations within one unit of work.
pub trait AuthorizationRepository {
    /// Load an authorization or fail with `NotFound`.
    fn authorization(&self, id: AuthorizationId) -> DomainResult<DteAuthorization>;

    fn insert_authorization(&mut self, authorization: NewAuthorization) -> DteAuthorization;

    fn update_authorization(&mut self, authorization: &DteAuthorization) -> DomainResult<()>;

    /// Every authorization sharing (document type, series), any scope or
    /// state; the allocator filters.
    fn authorizations_for(
        &self,
        document_type: DteDocumentType,
        series: &str,
    ) -> Vec<DteAuthorization>;
}

/// Owner of folio ranges: creates authorizations and hands out numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolioAllocator;

impl FolioAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Register a numbering range, rejecting overlaps with any active range
    /// for the same (document type, series) whose scope intersects. Global
    /// ranges are checked against every store-scoped one and vice versa.
    pub fn create_authorization<S>(
        &self,
        store: &mut S,
        input: NewAuthorization,
        actor: UserId,
    ) -> DomainResult<DteAuthorization>
    where
        S: AuthorizationRepository + AuditLog,
    {
        input.validate()?;

        let conflict = store
            .authorizations_for(input.document_type, &input.series)
            .into_iter()
            .find(|existing| existing.active && existing.conflicts_with(&input));
        if let Some(existing) = conflict {
            return Err(DomainError::authorization_conflict(format!(
                "range [{}, {}] overlaps authorization {} ([{}, {}])",
                input.range_start,
                input.range_end,
                existing.id,
                existing.range_start,
                existing.range_end
            )));
        }

        let authorization = store.insert_authorization(input);
        info!(
            authorization_id = %authorization.id,
            document_type = %authorization.document_type,
            series = %authorization.series,
            "authorization created"
        );
        store.record_audit(AuditRecord::new(
            "create",
            "dte_authorization",
            authorization.id.value(),
            actor,
            authorization.payload(),
        ));
        Ok(authorization)
    }

    /// Reserve the next folio: `max(current_number, range_start)`, failing
    /// once past `range_end`. The cursor advance persists in the same unit
    /// of work, so two concurrent reservations can never return one number.
    pub fn reserve_folio<S: AuthorizationRepository>(
        &self,
        store: &mut S,
        id: AuthorizationId,
    ) -> DomainResult<i64> {
        let mut authorization = store.authorization(id)?;
        let folio = authorization.reserve_next()?;
        store.update_authorization(&authorization)?;
        debug!(authorization_id = %id, folio, "folio reserved");
        Ok(folio)
    }

    /// Retire a range from service; it stops participating in conflict
    /// checks and should no longer be drawn from.
    pub fn deactivate_authorization<S>(
        &self,
        store: &mut S,
        id: AuthorizationId,
        actor: UserId,
    ) -> DomainResult<DteAuthorization>
    where
        S: AuthorizationRepository + AuditLog,
    {
        let mut authorization = store.authorization(id)?;
        if authorization.active {
            authorization.active = false;
            store.update_authorization(&authorization)?;
            store.record_audit(AuditRecord::new(
                "deactivate",
                "dte_authorization",
                id.value(),
                actor,
                json!({ "active": false }),
            ));
        }
        Ok(authorization)
    }

    /// Persist an issued document and queue it for delivery to the tax
    /// authority.
    pub fn register_document<S>(
        &self,
        store: &mut S,
        document: NewDteDocument,
        delivery_payload: Value,
        actor: UserId,
    ) -> DomainResult<(DteDocument, DteQueueEntry)>
    where
        S: DteDocumentRepository + DteQueueRepository + AuditLog,
    {
        let document = store.insert_dte_document(document);
        let entry =
            DteDispatchQueue::new().enqueue_document(store, document.id, delivery_payload)?;
        store.record_audit(AuditRecord::new(
            "register",
            "dte_document",
            document.id.value(),
            actor,
            json!({ "serie": document.series, "folio": document.folio }),
        ));
        Ok((document, entry))
    }
}
