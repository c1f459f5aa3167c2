//! In-memory unit-of-work store.
//!
//! [`MemoryStore`] holds every table behind one mutex. A transaction locks
//! the state, clones it into a [`Txn`], runs the caller's closure against
//! the clone, and on `Ok` swaps the clone back in. On `Err` the clone is
//! dropped, so a failed multi-step operation never becomes visible; that is
//! the rollback the engines rely on. The mutex is also what serializes
//! concurrent writers on device rows, order rows, and authorization
//! cursors: two reservations of the same folio queue on the lock and see
//! each other's commit.
//!
//! Intended for tests/dev and as the reference implementation of the
//! repository traits. Not optimized for performance.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use telstock_core::{AuditLog, AuditRecord, AuditSink, DomainError, DomainResult, StoreId};
use telstock_folios::{
    AuthorizationId, AuthorizationRepository, DteAuthorization, DteDocument, DteDocumentId,
    DteDocumentRepository, DteDocumentType, DteQueueEntry, DteQueueEntryId, DteQueueRepository,
    NewAuthorization, NewDteDocument, NewDteQueueEntry,
};
use telstock_ledger::{
    Device, DeviceId, DeviceRepository, Movement, MovementDraft, MovementId, MovementRepository,
    NewDevice,
};
use telstock_outbox::{
    EntityType, NewOutboxEntry, OutboxEntry, OutboxEntryId, OutboxRepository, OutboxStatus,
};
use telstock_purchasing::{NewPurchaseOrder, PurchaseOrder, PurchaseOrderId, PurchaseOrderRepository};
use telstock_transfers::{TransferDraft, TransferOrder, TransferOrderId, TransferOrderRepository};

use crate::audit::NullAuditSink;

/// Every table plus its id sequence, cloneable as one snapshot.
#[derive(Debug, Clone, Default)]
struct StoreState {
    devices: BTreeMap<DeviceId, Device>,
    movements: Vec<Movement>,
    transfers: BTreeMap<TransferOrderId, TransferOrder>,
    purchases: BTreeMap<PurchaseOrderId, PurchaseOrder>,
    authorizations: BTreeMap<AuthorizationId, DteAuthorization>,
    documents: BTreeMap<DteDocumentId, DteDocument>,
    outbox: BTreeMap<OutboxEntryId, OutboxEntry>,
    dte_queue: BTreeMap<DteQueueEntryId, DteQueueEntry>,
    sequences: Sequences,
}

/// Per-table id counters. Ids start at 1; 0 is never handed out.
#[derive(Debug, Clone, Copy, Default)]
struct Sequences {
    devices: i64,
    movements: i64,
    transfers: i64,
    purchases: i64,
    authorizations: i64,
    documents: i64,
    outbox: i64,
    dte_queue: i64,
}

fn bump(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

/// Single-writer store with transactional snapshots.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    sink: Arc<dyn AuditSink>,
}

impl MemoryStore {
    /// A store that drops audit records.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NullAuditSink))
    }

    /// A store forwarding committed audit records to `sink`.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            sink,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Run `f` inside one unit of work.
    ///
    /// The closure sees a private clone of the state. `Ok` commits the clone
    /// and flushes the audit records buffered during the transaction, in
    /// order, exactly once; `Err` discards everything. Transactions must not
    /// nest, since the inner one would deadlock on the mutex.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Txn) -> DomainResult<T>) -> DomainResult<T> {
        // Commit swaps in a fully built clone, so even a poisoned lock
        // still guards the last committed, consistent state.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = Txn {
            state: state.clone(),
            audits: Vec::new(),
        };
        match f(&mut txn) {
            Ok(value) => {
                *state = txn.state;
                debug!(audit_records = txn.audits.len(), "transaction committed");
                for record in txn.audits {
                    self.sink.record(record);
                }
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Read-only view over the committed state.
    pub fn view<T>(&self, f: impl FnOnce(&Txn) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let txn = Txn {
            state: state.clone(),
            audits: Vec::new(),
        };
        f(&txn)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

/// One in-flight unit of work over a cloned [`StoreState`].
///
/// Implements every repository trait plus [`AuditLog`]; engines stay
/// generic over the traits and never see this type by name.
pub struct Txn {
    state: StoreState,
    audits: Vec<AuditRecord>,
}

impl DeviceRepository for Txn {
    fn device(&self, id: DeviceId) -> DomainResult<Device> {
        self.state
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("device", id.value()))
    }

    fn find_device_by_sku(&self, store_id: StoreId, sku: &str) -> Option<Device> {
        self.state
            .devices
            .values()
            .find(|device| device.store_id == store_id && device.sku == sku)
            .cloned()
    }

    fn insert_device(&mut self, device: NewDevice) -> DomainResult<Device> {
        let clash = self.state.devices.values().find(|existing| {
            existing.store_id == device.store_id
                && (existing.sku == device.sku
                    || (existing.imei.is_some() && existing.imei == device.imei))
        });
        if let Some(existing) = clash {
            return Err(DomainError::duplicate_device(format!(
                "store {} already holds sku {} as device {}",
                device.store_id, existing.sku, existing.id
            )));
        }

        let id = DeviceId::new(bump(&mut self.state.sequences.devices));
        let device = device.into_device(id);
        self.state.devices.insert(id, device.clone());
        Ok(device)
    }

    fn update_device(&mut self, device: &Device) -> DomainResult<()> {
        if !self.state.devices.contains_key(&device.id) {
            return Err(DomainError::not_found("device", device.id.value()));
        }
        self.state.devices.insert(device.id, device.clone());
        Ok(())
    }

    fn devices_in_store(&self, store_id: StoreId) -> Vec<Device> {
        self.state
            .devices
            .values()
            .filter(|device| device.store_id == store_id)
            .cloned()
            .collect()
    }
}

impl MovementRepository for Txn {
    fn append_movement(&mut self, draft: MovementDraft) -> Movement {
        let id = MovementId::new(bump(&mut self.state.sequences.movements));
        let movement = Movement::from_draft(id, draft);
        self.state.movements.push(movement.clone());
        movement
    }

    fn movements_for_device(&self, device_id: DeviceId) -> Vec<Movement> {
        self.state
            .movements
            .iter()
            .filter(|movement| movement.device_id == device_id)
            .cloned()
            .collect()
    }
}

impl TransferOrderRepository for Txn {
    fn transfer_order(&self, id: TransferOrderId) -> DomainResult<TransferOrder> {
        self.state
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("transfer order", id.value()))
    }

    fn insert_transfer_order(&mut self, draft: TransferDraft) -> TransferOrder {
        let id = TransferOrderId::new(bump(&mut self.state.sequences.transfers));
        let order = draft.into_order(id);
        self.state.transfers.insert(id, order.clone());
        order
    }

    fn update_transfer_order(&mut self, order: &TransferOrder) -> DomainResult<()> {
        if !self.state.transfers.contains_key(&order.id) {
            return Err(DomainError::not_found("transfer order", order.id.value()));
        }
        self.state.transfers.insert(order.id, order.clone());
        Ok(())
    }
}

impl PurchaseOrderRepository for Txn {
    fn purchase_order(&self, id: PurchaseOrderId) -> DomainResult<PurchaseOrder> {
        self.state
            .purchases
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("purchase order", id.value()))
    }

    fn insert_purchase_order(&mut self, order: NewPurchaseOrder) -> PurchaseOrder {
        let id = PurchaseOrderId::new(bump(&mut self.state.sequences.purchases));
        let order = order.into_order(id);
        self.state.purchases.insert(id, order.clone());
        order
    }

    fn update_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()> {
        if !self.state.purchases.contains_key(&order.id) {
            return Err(DomainError::not_found("purchase order", order.id.value()));
        }
        self.state.purchases.insert(order.id, order.clone());
        Ok(())
    }

    fn purchase_orders_for_store(&self, store_id: StoreId) -> Vec<PurchaseOrder> {
        self.state
            .purchases
            .values()
            .filter(|order| order.store_id == store_id)
            .cloned()
            .collect()
    }
}

impl AuthorizationRepository for Txn {
    fn authorization(&self, id: AuthorizationId) -> DomainResult<DteAuthorization> {
        self.state
            .authorizations
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("authorization", id.value()))
    }

    fn insert_authorization(&mut self, authorization: NewAuthorization) -> DteAuthorization {
        let id = AuthorizationId::new(bump(&mut self.state.sequences.authorizations));
        let authorization = authorization.into_authorization(id);
        self.state.authorizations.insert(id, authorization.clone());
        authorization
    }

    fn update_authorization(&mut self, authorization: &DteAuthorization) -> DomainResult<()> {
        if !self.state.authorizations.contains_key(&authorization.id) {
            return Err(DomainError::not_found(
                "authorization",
                authorization.id.value(),
            ));
        }
        self.state
            .authorizations
            .insert(authorization.id, authorization.clone());
        Ok(())
    }

    fn authorizations_for(
        &self,
        document_type: DteDocumentType,
        series: &str,
    ) -> Vec<DteAuthorization> {
        self.state
            .authorizations
            .values()
            .filter(|a| a.document_type == document_type && a.series == series)
            .cloned()
            .collect()
    }
}

impl DteDocumentRepository for Txn {
    fn dte_document(&self, id: DteDocumentId) -> DomainResult<DteDocument> {
        self.state
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("dte document", id.value()))
    }

    fn insert_dte_document(&mut self, document: NewDteDocument) -> DteDocument {
        let id = DteDocumentId::new(bump(&mut self.state.sequences.documents));
        let document = document.into_document(id);
        self.state.documents.insert(id, document.clone());
        document
    }

    fn update_dte_document(&mut self, document: &DteDocument) -> DomainResult<()> {
        if !self.state.documents.contains_key(&document.id) {
            return Err(DomainError::not_found("dte document", document.id.value()));
        }
        self.state.documents.insert(document.id, document.clone());
        Ok(())
    }
}

impl OutboxRepository for Txn {
    fn outbox_entry(&self, id: OutboxEntryId) -> DomainResult<OutboxEntry> {
        self.state
            .outbox
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("outbox entry", id.value()))
    }

    fn find_outbox_by_key(&self, entity_type: EntityType, entity_id: i64) -> Option<OutboxEntry> {
        self.state
            .outbox
            .values()
            .find(|entry| entry.entity_type == entity_type && entry.entity_id == entity_id)
            .cloned()
    }

    fn insert_outbox(&mut self, entry: NewOutboxEntry) -> OutboxEntry {
        let id = OutboxEntryId::new(bump(&mut self.state.sequences.outbox));
        let entry = entry.into_entry(id);
        self.state.outbox.insert(id, entry.clone());
        entry
    }

    fn update_outbox(&mut self, entry: &OutboxEntry) -> DomainResult<()> {
        if !self.state.outbox.contains_key(&entry.id) {
            return Err(DomainError::not_found("outbox entry", entry.id.value()));
        }
        self.state.outbox.insert(entry.id, entry.clone());
        Ok(())
    }

    fn list_outbox(&self, statuses: Option<&[OutboxStatus]>, limit: usize) -> Vec<OutboxEntry> {
        let mut entries: Vec<OutboxEntry> = self
            .state
            .outbox
            .values()
            .filter(|entry| statuses.is_none_or(|wanted| wanted.contains(&entry.status)))
            .cloned()
            .collect();
        // Most recently updated first; ties break toward the newer row.
        entries.sort_by_key(|entry| std::cmp::Reverse((entry.updated_at, entry.id)));
        entries.truncate(limit);
        entries
    }
}

impl DteQueueRepository for Txn {
    fn dte_queue_entry(&self, id: DteQueueEntryId) -> DomainResult<DteQueueEntry> {
        self.state
            .dte_queue
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("dte queue entry", id.value()))
    }

    fn find_dte_queue_by_document(&self, document_id: DteDocumentId) -> Option<DteQueueEntry> {
        self.state
            .dte_queue
            .values()
            .find(|entry| entry.document_id == document_id)
            .cloned()
    }

    fn insert_dte_queue(&mut self, entry: NewDteQueueEntry) -> DteQueueEntry {
        let id = DteQueueEntryId::new(bump(&mut self.state.sequences.dte_queue));
        let entry = entry.into_entry(id);
        self.state.dte_queue.insert(id, entry.clone());
        entry
    }

    fn update_dte_queue(&mut self, entry: &DteQueueEntry) -> DomainResult<()> {
        if !self.state.dte_queue.contains_key(&entry.id) {
            return Err(DomainError::not_found("dte queue entry", entry.id.value()));
        }
        self.state.dte_queue.insert(entry.id, entry.clone());
        Ok(())
    }

    fn list_dte_queue(
        &self,
        statuses: Option<&[OutboxStatus]>,
        limit: usize,
    ) -> Vec<DteQueueEntry> {
        let mut entries: Vec<DteQueueEntry> = self
            .state
            .dte_queue
            .values()
            .filter(|entry| statuses.is_none_or(|wanted| wanted.contains(&entry.status)))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| std::cmp::Reverse((entry.updated_at, entry.id)));
        entries.truncate(limit);
        entries
    }
}

impl AuditLog for Txn {
    fn record_audit(&mut self, record: AuditRecord) {
        self.audits.push(record);
    }
}
