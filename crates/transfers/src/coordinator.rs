//! The transfer workflow: request, dispatch, receive, reject, cancel.
//!
//! Stock leaves the origin when an order is dispatched and lands on the
//! destination when it is received; rejecting an in-transit order restores
//! whatever never arrived. Receiving straight from SOLICITADA is the
//! shortcut for same-moment handovers: the origin issue and the destination
//! receipt happen together in the receive call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use telstock_core::{AuditLog, AuditRecord, DomainError, DomainResult, StoreId, UserId};
use telstock_ledger::{
    DeviceId, DeviceRepository, MovementInput, MovementRepository, StockLedger,
};
use telstock_outbox::{
    EntityType, Operation, OutboxDispatcher, OutboxRepository, entity_payload,
};

use crate::membership::{Membership, StoreAction};
use crate::order::{
    NewTransferOrder, TransferAction, TransferDraft, TransferOrder, TransferOrderId,
    TransferOrderItem, TransferStatus, transition,
};

/// Access to transfer orders within one unit of work. Orders load and save
/// with their lines.
pub trait TransferOrderRepository {
    /// Load an order or fail with `NotFound`.
    fn transfer_order(&self, id: TransferOrderId) -> DomainResult<TransferOrder>;

    fn insert_transfer_order(&mut self, draft: TransferDraft) -> TransferOrder;

    fn update_transfer_order(&mut self, order: &TransferOrder) -> DomainResult<()>;
}

/// One line of a transfer receipt.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveLine {
    pub device_id: DeviceId,
    pub quantity: i64,
}

/// Orchestrates the transfer state machine over the ledger, the outbox, and
/// the membership provider. Every operation belongs inside one unit of work;
/// on error the caller rolls back and no item is left half-moved.
pub struct TransferCoordinator<M> {
    ledger: StockLedger,
    membership: M,
    outbox: OutboxDispatcher,
}

impl<M: Membership> TransferCoordinator<M> {
    pub fn new(ledger: StockLedger, membership: M) -> Self {
        Self {
            ledger,
            membership,
            outbox: OutboxDispatcher::new(),
        }
    }

    fn ensure(&self, user: UserId, store: StoreId, action: StoreAction) -> DomainResult<()> {
        if !self.membership.has_permission(user, store, action) {
            return Err(DomainError::permission_denied(user, store, action.as_str()));
        }
        Ok(())
    }

    /// Register a SOLICITADA order. Reserves intent only; no stock moves.
    pub fn create<S>(
        &self,
        store: &mut S,
        input: NewTransferOrder,
        actor: UserId,
    ) -> DomainResult<TransferOrder>
    where
        S: TransferOrderRepository + DeviceRepository + OutboxRepository + AuditLog,
    {
        input.validate()?;
        self.ensure(actor, input.origin_store, StoreAction::CreateTransfer)?;

        let mut items = Vec::with_capacity(input.items.len());
        for request in &input.items {
            let device = store.device(request.device_id)?;
            if device.store_id != input.origin_store {
                return Err(DomainError::invalid_movement(format!(
                    "device {} belongs to store {}, not {}",
                    device.id, device.store_id, input.origin_store
                )));
            }
            items.push(TransferOrderItem {
                device_id: device.id,
                sku: device.sku,
                requested_quantity: request.quantity,
                dispatched_quantity: 0,
                received_quantity: 0,
                unit_cost: rust_decimal::Decimal::ZERO,
            });
        }

        let order = store.insert_transfer_order(TransferDraft {
            origin_store: input.origin_store,
            destination_store: input.destination_store,
            reason: input.reason,
            items,
            requested_by: actor,
            requested_at: Utc::now(),
        });
        info!(
            order_id = %order.id,
            origin = %order.origin_store,
            destination = %order.destination_store,
            "transfer requested"
        );
        self.outbox.enqueue(
            store,
            EntityType::TransferOrder,
            order.id.value(),
            Operation::Upsert,
            transfer_payload(&order, order.requested_at),
        )?;
        store.record_audit(AuditRecord::new(
            "create",
            "transfer_order",
            order.id.value(),
            actor,
            json!({
                "status": order.status.as_str(),
                "originStoreId": order.origin_store.value(),
                "destinationStoreId": order.destination_store.value(),
            }),
        ));
        Ok(order)
    }

    /// Move every requested unit out of the origin. Atomic: the first line
    /// without stock fails the whole call and the caller rolls back.
    pub fn dispatch<S>(
        &self,
        store: &mut S,
        order_id: TransferOrderId,
        actor: UserId,
    ) -> DomainResult<TransferOrder>
    where
        S: TransferOrderRepository
            + DeviceRepository
            + MovementRepository
            + OutboxRepository
            + AuditLog,
    {
        let mut order = store.transfer_order(order_id)?;
        self.ensure(actor, order.origin_store, StoreAction::CreateTransfer)?;
        let next = transition(order.status, TransferAction::Dispatch)
            .ok_or_else(|| transition_error(&order, TransferAction::Dispatch))?;

        let now = Utc::now();
        let reason = format!("transfer {} dispatch", order.id);
        for item in &mut order.items {
            let mut device = store.device(item.device_id)?;
            // Snapshot before the issue: draining the row to zero resets its
            // average, and the units in transit still carry this cost.
            item.unit_cost = device.average_cost;
            let draft = self.ledger.apply_movement(
                &mut device,
                MovementInput::issue(item.requested_quantity, actor, reason.clone()),
            )?;
            store.update_device(&device)?;
            store.append_movement(draft);
            item.dispatched_quantity = item.requested_quantity;
        }

        order.status = next;
        order.dispatched_by = Some(actor);
        order.dispatched_at = Some(now);
        store.update_transfer_order(&order)?;
        info!(order_id = %order.id, "transfer dispatched");

        self.outbox.enqueue(
            store,
            EntityType::TransferOrder,
            order.id.value(),
            Operation::StatusUpdate,
            transfer_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "dispatch",
            "transfer_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str() }),
        ));
        Ok(order)
    }

    /// Land received units on the destination, merging into the row with the
    /// same sku or cloning the origin catalog row. Lines accumulate across
    /// calls; the order closes once every item has received at least one
    /// unit.
    ///
    /// From SOLICITADA the origin issue happens here too, line by line, so
    /// the shelves stay conserved without a separate dispatch.
    pub fn receive<S>(
        &self,
        store: &mut S,
        order_id: TransferOrderId,
        lines: &[ReceiveLine],
        actor: UserId,
    ) -> DomainResult<TransferOrder>
    where
        S: TransferOrderRepository
            + DeviceRepository
            + MovementRepository
            + OutboxRepository
            + AuditLog,
    {
        let mut order = store.transfer_order(order_id)?;
        self.ensure(actor, order.destination_store, StoreAction::ReceiveTransfer)?;
        let completed = transition(order.status, TransferAction::Receive)
            .ok_or_else(|| transition_error(&order, TransferAction::Receive))?;
        if lines.is_empty() {
            return Err(DomainError::invalid_quantity(
                "a receipt needs at least one line",
            ));
        }

        let direct = order.status == TransferStatus::Solicitada;
        let destination = order.destination_store;
        let id = order.id;
        let now = Utc::now();
        let reason = format!("transfer {} receipt", id);

        for line in lines {
            let item = order
                .items
                .iter_mut()
                .find(|item| item.device_id == line.device_id)
                .ok_or_else(|| {
                    DomainError::not_found("transfer order line", line.device_id.value())
                })?;

            // With dispatch skipped the requested quantity is the bound.
            let limit = if direct {
                item.requested_quantity
            } else {
                item.dispatched_quantity
            };
            if line.quantity <= 0 || item.received_quantity + line.quantity > limit {
                return Err(DomainError::invalid_quantity(format!(
                    "device {}: receiving {} with {} receivable",
                    line.device_id,
                    line.quantity,
                    limit - item.received_quantity
                )));
            }

            let mut origin_device = store.device(item.device_id)?;
            if origin_device.is_serialized() && item.received_quantity + line.quantity != limit {
                return Err(DomainError::requires_full_unit(format!(
                    "device {} is serialized and must move whole",
                    origin_device.id
                )));
            }

            if direct {
                item.unit_cost = origin_device.average_cost;
                let draft = self.ledger.apply_movement(
                    &mut origin_device,
                    MovementInput::issue(line.quantity, actor, reason.clone()),
                )?;
                store.update_device(&origin_device)?;
                store.append_movement(draft);
                item.dispatched_quantity += line.quantity;
            }

            let mut destination_device = match store.find_device_by_sku(destination, &item.sku) {
                Some(device) => device,
                None => store.insert_device(origin_device.clone_into_store(destination))?,
            };
            let draft = self.ledger.apply_movement(
                &mut destination_device,
                MovementInput::receipt(line.quantity, item.unit_cost, actor, reason.clone()),
            )?;
            store.update_device(&destination_device)?;
            store.append_movement(draft);

            item.received_quantity += line.quantity;
        }

        if order.all_items_received() {
            order.status = completed;
            order.received_by = Some(actor);
            order.received_at = Some(now);
        }
        store.update_transfer_order(&order)?;
        info!(order_id = %order.id, status = %order.status, "transfer receipt applied");

        self.outbox.enqueue(
            store,
            EntityType::TransferOrder,
            order.id.value(),
            Operation::StatusUpdate,
            transfer_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "receive",
            "transfer_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str(), "lines": lines }),
        ));
        Ok(order)
    }

    /// Refuse an in-transit order: every undelivered unit returns to the
    /// origin at the cost it left with. Quantities already received stay at
    /// the destination.
    pub fn reject<S>(
        &self,
        store: &mut S,
        order_id: TransferOrderId,
        actor: UserId,
    ) -> DomainResult<TransferOrder>
    where
        S: TransferOrderRepository
            + DeviceRepository
            + MovementRepository
            + OutboxRepository
            + AuditLog,
    {
        let mut order = store.transfer_order(order_id)?;
        self.ensure(actor, order.origin_store, StoreAction::CreateTransfer)?;
        let next = transition(order.status, TransferAction::Reject)
            .ok_or_else(|| transition_error(&order, TransferAction::Reject))?;

        let now = Utc::now();
        let reason = format!("transfer {} rejected", order.id);
        for item in &mut order.items {
            let undelivered = item.in_transit();
            if undelivered > 0 {
                let mut device = store.device(item.device_id)?;
                let draft = self.ledger.apply_movement(
                    &mut device,
                    MovementInput::receipt(undelivered, item.unit_cost, actor, reason.clone()),
                )?;
                store.update_device(&device)?;
                store.append_movement(draft);
            }
            // Keeps received ≤ dispatched once the restored units are back.
            item.dispatched_quantity = item.received_quantity;
        }

        order.status = next;
        order.closed_by = Some(actor);
        order.closed_at = Some(now);
        store.update_transfer_order(&order)?;
        info!(order_id = %order.id, "transfer rejected");

        self.outbox.enqueue(
            store,
            EntityType::TransferOrder,
            order.id.value(),
            Operation::StatusUpdate,
            transfer_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "reject",
            "transfer_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str() }),
        ));
        Ok(order)
    }

    /// Withdraw a never-dispatched order. Nothing to restore.
    pub fn cancel<S>(
        &self,
        store: &mut S,
        order_id: TransferOrderId,
        actor: UserId,
    ) -> DomainResult<TransferOrder>
    where
        S: TransferOrderRepository + OutboxRepository + AuditLog,
    {
        let mut order = store.transfer_order(order_id)?;
        self.ensure(actor, order.origin_store, StoreAction::CreateTransfer)?;
        let next = transition(order.status, TransferAction::Cancel)
            .ok_or_else(|| transition_error(&order, TransferAction::Cancel))?;

        let now = Utc::now();
        order.status = next;
        order.closed_by = Some(actor);
        order.closed_at = Some(now);
        store.update_transfer_order(&order)?;
        info!(order_id = %order.id, "transfer cancelled");

        self.outbox.enqueue(
            store,
            EntityType::TransferOrder,
            order.id.value(),
            Operation::StatusUpdate,
            transfer_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "cancel",
            "transfer_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str() }),
        ));
        Ok(order)
    }
}

fn transition_error(order: &TransferOrder, action: TransferAction) -> DomainError {
    DomainError::invalid_transition(format!(
        "transfer {}: {} not allowed from {}",
        order.id, action, order.status
    ))
}

fn transfer_payload(order: &TransferOrder, at: DateTime<Utc>) -> Value {
    entity_payload(
        order.id.value(),
        order.status.as_str(),
        json!({
            "originStoreId": order.origin_store.value(),
            "destinationStoreId": order.destination_store.value(),
        }),
        at,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use telstock_core::{LedgerConfig, StoreId, ValidationCode};
    use telstock_ledger::{Device, Movement, MovementDraft, MovementId, NewDevice};
    use telstock_outbox::{NewOutboxEntry, OutboxEntry, OutboxEntryId, OutboxStatus};

    use super::*;

    #[derive(Default)]
    struct FakeStore {
        devices: HashMap<DeviceId, Device>,
        movements: Vec<Movement>,
        orders: HashMap<TransferOrderId, TransferOrder>,
        outbox: HashMap<OutboxEntryId, OutboxEntry>,
        audits: Vec<AuditRecord>,
        next_id: i64,
    }

    impl FakeStore {
        fn next_id(&mut self) -> i64 {
            self.next_id += 1;
            self.next_id
        }

        fn seed_device(
            &mut self,
            store_id: StoreId,
            sku: &str,
            quantity: i64,
            average_cost: &str,
        ) -> DeviceId {
            let id = DeviceId::new(self.next_id());
            let mut device = NewDevice::new(store_id, sku, sku).into_device(id);
            device.quantity = quantity;
            device.average_cost = average_cost.parse().unwrap();
            self.devices.insert(id, device);
            id
        }

        fn seed_serialized(
            &mut self,
            store_id: StoreId,
            sku: &str,
            imei: &str,
            quantity: i64,
        ) -> DeviceId {
            let id = DeviceId::new(self.next_id());
            let mut device = NewDevice::new(store_id, sku, sku)
                .with_imei(imei)
                .into_device(id);
            device.quantity = quantity;
            self.devices.insert(id, device);
            id
        }
    }

    impl DeviceRepository for FakeStore {
        fn device(&self, id: DeviceId) -> DomainResult<Device> {
            self.devices
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("device", id.value()))
        }

        fn find_device_by_sku(&self, store_id: StoreId, sku: &str) -> Option<Device> {
            self.devices
                .values()
                .find(|d| d.store_id == store_id && d.sku == sku)
                .cloned()
        }

        fn insert_device(&mut self, device: NewDevice) -> DomainResult<Device> {
            let device = device.into_device(DeviceId::new(self.next_id()));
            self.devices.insert(device.id, device.clone());
            Ok(device)
        }

        fn update_device(&mut self, device: &Device) -> DomainResult<()> {
            self.devices.insert(device.id, device.clone());
            Ok(())
        }

        fn devices_in_store(&self, store_id: StoreId) -> Vec<Device> {
            self.devices
                .values()
                .filter(|d| d.store_id == store_id)
                .cloned()
                .collect()
        }
    }

    impl MovementRepository for FakeStore {
        fn append_movement(&mut self, draft: MovementDraft) -> Movement {
            let movement = Movement::from_draft(MovementId::new(self.next_id()), draft);
            self.movements.push(movement.clone());
            movement
        }

        fn movements_for_device(&self, device_id: DeviceId) -> Vec<Movement> {
            self.movements
                .iter()
                .filter(|m| m.device_id == device_id)
                .cloned()
                .collect()
        }
    }

    impl TransferOrderRepository for FakeStore {
        fn transfer_order(&self, id: TransferOrderId) -> DomainResult<TransferOrder> {
            self.orders
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("transfer order", id.value()))
        }

        fn insert_transfer_order(&mut self, draft: TransferDraft) -> TransferOrder {
            let order = draft.into_order(TransferOrderId::new(self.next_id()));
            self.orders.insert(order.id, order.clone());
            order
        }

        fn update_transfer_order(&mut self, order: &TransferOrder) -> DomainResult<()> {
            self.orders.insert(order.id, order.clone());
            Ok(())
        }
    }

    impl OutboxRepository for FakeStore {
        fn outbox_entry(&self, id: OutboxEntryId) -> DomainResult<OutboxEntry> {
            self.outbox
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("outbox entry", id.value()))
        }

        fn find_outbox_by_key(&self, entity_type: EntityType, entity_id: i64) -> Option<OutboxEntry> {
            self.outbox
                .values()
                .find(|e| e.entity_type == entity_type && e.entity_id == entity_id)
                .cloned()
        }

        fn insert_outbox(&mut self, entry: NewOutboxEntry) -> OutboxEntry {
            let entry = entry.into_entry(OutboxEntryId::new(self.next_id()));
            self.outbox.insert(entry.id, entry.clone());
            entry
        }

        fn update_outbox(&mut self, entry: &OutboxEntry) -> DomainResult<()> {
            self.outbox.insert(entry.id, entry.clone());
            Ok(())
        }

        fn list_outbox(
            &self,
            statuses: Option<&[OutboxStatus]>,
            limit: usize,
        ) -> Vec<OutboxEntry> {
            let mut entries: Vec<OutboxEntry> = self
                .outbox
                .values()
                .filter(|e| statuses.map_or(true, |s| s.contains(&e.status)))
                .cloned()
                .collect();
            entries.sort_by_key(|e| std::cmp::Reverse(e.updated_at));
            entries.truncate(limit);
            entries
        }
    }

    impl AuditLog for FakeStore {
        fn record_audit(&mut self, record: AuditRecord) {
            self.audits.push(record);
        }
    }

    #[derive(Default)]
    struct FakeMembership {
        grants: HashSet<(UserId, StoreId, StoreAction)>,
    }

    impl FakeMembership {
        fn grant(mut self, user: UserId, store: StoreId, action: StoreAction) -> Self {
            self.grants.insert((user, store, action));
            self
        }
    }

    impl Membership for FakeMembership {
        fn has_permission(&self, user: UserId, store: StoreId, action: StoreAction) -> bool {
            self.grants.contains(&(user, store, action))
        }
    }

    const ORIGIN: StoreId = StoreId::new(1);
    const DESTINATION: StoreId = StoreId::new(2);

    fn actor() -> UserId {
        UserId::new(9)
    }

    /// A coordinator whose actor holds every grant on both stores.
    fn coordinator() -> TransferCoordinator<FakeMembership> {
        let membership = FakeMembership::default()
            .grant(actor(), ORIGIN, StoreAction::CreateTransfer)
            .grant(actor(), DESTINATION, StoreAction::ReceiveTransfer);
        TransferCoordinator::new(StockLedger::new(LedgerConfig::default()), membership)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn request(device_id: DeviceId, quantity: i64) -> NewTransferOrder {
        NewTransferOrder::new(ORIGIN, DESTINATION, "rebalance").with_item(device_id, quantity)
    }

    #[test]
    fn dispatch_moves_stock_out_of_the_origin() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        let order = coordinator.dispatch(&mut store, order.id, actor()).unwrap();

        assert_eq!(order.status, TransferStatus::EnTransito);
        assert_eq!(order.items[0].dispatched_quantity, 2);
        assert_eq!(order.items[0].unit_cost, dec("10.00"));
        assert_eq!(order.dispatched_by, Some(actor()));
        assert_eq!(store.device(device_id).unwrap().quantity, 3);
    }

    #[test]
    fn receive_lands_stock_on_a_new_destination_row() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        let order = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 2 }],
                actor(),
            )
            .unwrap();

        assert_eq!(order.status, TransferStatus::Recibida);
        assert_eq!(order.received_by, Some(actor()));
        assert_eq!(store.device(device_id).unwrap().quantity, 3, "origin keeps the rest");

        let landed = store.find_device_by_sku(DESTINATION, "SKU-1").unwrap();
        assert_eq!(landed.quantity, 2);
        assert_eq!(landed.average_cost, dec("10.00"));
    }

    #[test]
    fn receive_merges_into_the_existing_destination_row() {
        let mut store = FakeStore::default();
        let origin_id = store.seed_device(ORIGIN, "SKU-1", 4, "20.00");
        let existing_id = store.seed_device(DESTINATION, "SKU-1", 2, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(origin_id, 4), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id: origin_id, quantity: 4 }],
                actor(),
            )
            .unwrap();

        // 2 @ 10.00 plus 4 @ 20.00 is 6 @ 16.67.
        let merged = store.device(existing_id).unwrap();
        assert_eq!(merged.quantity, 6);
        assert_eq!(merged.average_cost, dec("16.67"));
    }

    #[test]
    fn reject_restores_undelivered_stock_at_the_transit_cost() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 2, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        // The dispatch drained the row; its average reset to zero.
        assert_eq!(store.device(device_id).unwrap().average_cost, Decimal::ZERO);

        let order = coordinator.reject(&mut store, order.id, actor()).unwrap();

        assert_eq!(order.status, TransferStatus::Rechazada);
        assert_eq!(order.items[0].dispatched_quantity, 0, "reset to the received count");
        assert_eq!(order.closed_by, Some(actor()));
        let restored = store.device(device_id).unwrap();
        assert_eq!(restored.quantity, 2);
        assert_eq!(restored.average_cost, dec("10.00"), "the snapshot cost came back");
    }

    #[test]
    fn reject_after_partial_receive_keeps_delivered_units() {
        let mut store = FakeStore::default();
        let first = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let second = store.seed_device(ORIGIN, "SKU-2", 5, "30.00");
        let coordinator = coordinator();

        let input = NewTransferOrder::new(ORIGIN, DESTINATION, "rebalance")
            .with_item(first, 3)
            .with_item(second, 2);
        let order = coordinator.create(&mut store, input, actor()).unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        let order = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id: first, quantity: 3 }],
                actor(),
            )
            .unwrap();
        assert_eq!(order.status, TransferStatus::EnTransito, "second line still in transit");

        let order = coordinator.reject(&mut store, order.id, actor()).unwrap();

        assert_eq!(order.status, TransferStatus::Rechazada);
        assert_eq!(order.item(first).unwrap().dispatched_quantity, 3, "delivered stays delivered");
        assert_eq!(order.item(second).unwrap().dispatched_quantity, 0);
        assert_eq!(store.device(second).unwrap().quantity, 5, "undelivered restored");
        assert_eq!(
            store.find_device_by_sku(DESTINATION, "SKU-1").unwrap().quantity,
            3,
            "the destination keeps what arrived"
        );
    }

    #[test]
    fn receive_directly_from_solicitada_issues_and_lands_together() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        let order = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 2 }],
                actor(),
            )
            .unwrap();

        assert_eq!(order.status, TransferStatus::Recibida);
        assert_eq!(order.items[0].dispatched_quantity, 2);
        assert_eq!(order.items[0].received_quantity, 2);
        assert_eq!(store.device(device_id).unwrap().quantity, 3);
        assert_eq!(
            store.find_device_by_sku(DESTINATION, "SKU-1").unwrap().quantity,
            2
        );
    }

    #[test]
    fn serialized_units_cannot_be_split() {
        let mut store = FakeStore::default();
        let device_id = store.seed_serialized(ORIGIN, "SKU-S", "356938035643809", 2);
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();

        let err = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 1 }],
                actor(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::RequiresFullUnit));
    }

    #[test]
    fn serialized_unit_moves_whole_with_its_imei() {
        let mut store = FakeStore::default();
        let device_id = store.seed_serialized(ORIGIN, "SKU-S", "356938035643809", 1);
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 1), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 1 }],
                actor(),
            )
            .unwrap();

        let landed = store.find_device_by_sku(DESTINATION, "SKU-S").unwrap();
        assert_eq!(landed.quantity, 1);
        assert_eq!(landed.imei.as_deref(), Some("356938035643809"));
    }

    #[test]
    fn dispatch_without_stock_fails() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 1, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        let err = coordinator.dispatch(&mut store, order.id, actor()).unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InsufficientStock));
    }

    #[test]
    fn over_receiving_is_rejected() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        let err = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 3 }],
                actor(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidQuantity));
    }

    #[test]
    fn cancel_is_blocked_after_dispatch() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();

        let err = coordinator.cancel(&mut store, order.id, actor()).unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidTransition));
    }

    #[test]
    fn cancel_from_solicitada_moves_no_stock() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        let order = coordinator.cancel(&mut store, order.id, actor()).unwrap();

        assert_eq!(order.status, TransferStatus::Cancelada);
        assert_eq!(order.closed_by, Some(actor()));
        assert_eq!(store.device(device_id).unwrap().quantity, 5);
        assert!(store.movements.is_empty());
    }

    #[test]
    fn terminal_orders_refuse_every_action() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.cancel(&mut store, order.id, actor()).unwrap();

        let err = coordinator.dispatch(&mut store, order.id, actor()).unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidTransition));
        let err = coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 1 }],
                actor(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidTransition));
    }

    #[test]
    fn missing_grants_deny_each_side() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");

        // Can create but not receive.
        let origin_only = TransferCoordinator::new(
            StockLedger::new(LedgerConfig::default()),
            FakeMembership::default().grant(actor(), ORIGIN, StoreAction::CreateTransfer),
        );
        let order = origin_only
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        let err = origin_only
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 2 }],
                actor(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied { .. }));

        // No grant at all cannot even create.
        let stranger = TransferCoordinator::new(
            StockLedger::new(LedgerConfig::default()),
            FakeMembership::default(),
        );
        let err = stranger
            .create(&mut store, request(device_id, 1), actor())
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied { .. }));
    }

    #[test]
    fn devices_outside_the_origin_store_are_rejected() {
        let mut store = FakeStore::default();
        let foreign = store.seed_device(DESTINATION, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let err = coordinator
            .create(&mut store, request(foreign, 1), actor())
            .unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::InvalidMovement));
    }

    #[test]
    fn the_whole_lifecycle_coalesces_into_one_outbox_row() {
        let mut store = FakeStore::default();
        let device_id = store.seed_device(ORIGIN, "SKU-1", 5, "10.00");
        let coordinator = coordinator();

        let order = coordinator
            .create(&mut store, request(device_id, 2), actor())
            .unwrap();
        coordinator.dispatch(&mut store, order.id, actor()).unwrap();
        coordinator
            .receive(
                &mut store,
                order.id,
                &[ReceiveLine { device_id, quantity: 2 }],
                actor(),
            )
            .unwrap();

        let entries = store.list_outbox(None, usize::MAX);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["status"], "RECIBIDA");
        assert_eq!(entries[0].attempt_count, 0);

        let actions: Vec<&str> = store.audits.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["create", "dispatch", "receive"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        /// However a transfer ends, no unit appears or vanishes: origin
        /// stock, destination stock, and units in transit always total the
        /// seeded quantity.
        #[test]
        fn transfers_conserve_total_stock(
            seed in 1i64..40,
            requested in 1i64..40,
            first_receipt in 0i64..40,
            ending in 0u8..3,
        ) {
            let requested = requested.min(seed);
            let mut store = FakeStore::default();
            let device_id = store.seed_device(ORIGIN, "SKU-1", seed, "10.00");
            let coordinator = coordinator();

            let order = coordinator
                .create(&mut store, request(device_id, requested), actor())
                .unwrap();
            coordinator.dispatch(&mut store, order.id, actor()).unwrap();

            let first_receipt = first_receipt.min(requested);
            if first_receipt > 0 {
                coordinator
                    .receive(
                        &mut store,
                        order.id,
                        &[ReceiveLine { device_id, quantity: first_receipt }],
                        actor(),
                    )
                    .unwrap();
            }
            // A receipt on a single-line order completes it, so the second
            // action only applies while the order is still in transit.
            let open = store.transfer_order(order.id).unwrap().status == TransferStatus::EnTransito;
            match ending {
                0 if open => {
                    coordinator.reject(&mut store, order.id, actor()).unwrap();
                }
                1 if open => {
                    coordinator
                        .receive(
                            &mut store,
                            order.id,
                            &[ReceiveLine { device_id, quantity: requested - first_receipt }],
                            actor(),
                        )
                        .unwrap();
                }
                _ => {}
            }

            let origin_total: i64 = store
                .devices_in_store(ORIGIN)
                .iter()
                .map(|device| device.quantity)
                .sum();
            let destination_total: i64 = store
                .devices_in_store(DESTINATION)
                .iter()
                .map(|device| device.quantity)
                .sum();
            let order = store.transfer_order(order.id).unwrap();
            let in_transit: i64 = order.items.iter().map(TransferOrderItem::in_transit).sum();

            prop_assert_eq!(origin_total + destination_total + in_transit, seed);
        }
    }
}
