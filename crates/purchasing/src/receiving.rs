//! Supplier receiving against purchase orders.

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

use crate::order::{NewPurchaseOrder, PurchaseOrder, PurchaseOrderId, PurchaseStatus};

/// Access to purchase orders within one unit of work. Orders load and save
/// with their lines.
pub trait PurchaseOrderRepository {
    /// Load an order or fail with `NotFound`.
    fn purchase_order(&self, id: PurchaseOrderId) -> DomainResult<PurchaseOrder>;

    fn insert_purchase_order(&mut self, order: NewPurchaseOrder) -> PurchaseOrder;

    fn update_purchase_order(&mut self, order: &PurchaseOrder) -> DomainResult<()>;

    fn purchase_orders_for_store(&self, store_id: StoreId) -> Vec<PurchaseOrder>;
}

/// One line of a supplier delivery.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub device_id: DeviceId,
    pub quantity: i64,
}

/// Applies supplier deliveries, cancellations, and returns to purchase
/// orders, keeping device stock and the outbox in step. Every operation
/// belongs inside one unit of work; on error the caller rolls back and no
/// partial receipt survives.
pub struct PurchaseReceivingEngine {
    ledger: StockLedger,
    outbox: OutboxDispatcher,
}

impl PurchaseReceivingEngine {
    pub fn new(ledger: StockLedger) -> Self {
        Self {
            ledger,
            outbox: OutboxDispatcher::new(),
        }
    }

    /// Register a PENDIENTE order. Moves no stock; every line must point at
    /// a device of the ordering store.
    pub fn create_order<S>(
        &self,
        store: &mut S,
        input: NewPurchaseOrder,
        actor: UserId,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchaseOrderRepository + DeviceRepository + OutboxRepository + AuditLog,
    {
        input.validate()?;
        for line in &input.items {
            let device = store.device(line.device_id)?;
            if device.store_id != input.store_id {
                return Err(DomainError::invalid_movement(format!(
                    "device {} belongs to store {}, not {}",
                    device.id, device.store_id, input.store_id
                )));
            }
        }

        let order = store.insert_purchase_order(input);
        info!(
            order_id = %order.id,
            store_id = %order.store_id,
            supplier = %order.supplier,
            "purchase order created"
        );
        self.outbox.enqueue(
            store,
            EntityType::PurchaseOrder,
            order.id.value(),
            Operation::Upsert,
            order_payload(&order, order.created_at),
        )?;
        store.record_audit(AuditRecord::new(
            "create",
            "purchase_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str(), "supplier": order.supplier }),
        ));
        Ok(order)
    }

    /// Apply a supplier delivery. Lines accumulate across calls; the order
    /// completes once every line reaches its ordered quantity, and stays
    /// PARCIAL until then.
    pub fn receive<S>(
        &self,
        store: &mut S,
        order_id: PurchaseOrderId,
        lines: &[ReceiptLine],
        actor: UserId,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchaseOrderRepository
            + DeviceRepository
            + MovementRepository
            + OutboxRepository
            + AuditLog,
    {
        let mut order = store.purchase_order(order_id)?;
        if order.status.is_terminal() {
            return Err(DomainError::purchase_not_receivable(format!(
                "purchase order {} is {}",
                order.id, order.status
            )));
        }
        if lines.is_empty() {
            return Err(DomainError::invalid_quantity(
                "a receipt needs at least one line",
            ));
        }

        let now = Utc::now();
        for line in lines {
            let item = order.item_mut(line.device_id).ok_or_else(|| {
                DomainError::not_found("purchase order line", line.device_id.value())
            })?;
            if line.quantity <= 0 || line.quantity > item.remaining() {
                return Err(DomainError::invalid_quantity(format!(
                    "device {}: received {} with {} outstanding",
                    line.device_id,
                    line.quantity,
                    item.remaining()
                )));
            }
            let unit_cost = item.unit_cost;
            item.quantity_received += line.quantity;

            let mut device = store.device(line.device_id)?;
            let draft = self.ledger.apply_movement(
                &mut device,
                MovementInput::receipt(
                    line.quantity,
                    unit_cost,
                    actor,
                    format!("purchase order {} receipt", order.id),
                ),
            )?;
            store.update_device(&device)?;
            store.append_movement(draft);
        }

        order.status = if order.is_fully_received() {
            order.closed_at = Some(now);
            PurchaseStatus::Completada
        } else {
            PurchaseStatus::Parcial
        };
        store.update_purchase_order(&order)?;
        info!(order_id = %order.id, status = %order.status, "purchase receipt applied");

        self.outbox.enqueue(
            store,
            EntityType::PurchaseOrder,
            order.id.value(),
            Operation::StatusUpdate,
            order_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "receive",
            "purchase_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str(), "lines": lines }),
        ));
        Ok(order)
    }

    /// Close the order without the outstanding remainder. Receipts already
    /// applied stay on the shelf.
    pub fn cancel<S>(
        &self,
        store: &mut S,
        order_id: PurchaseOrderId,
        actor: UserId,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchaseOrderRepository + OutboxRepository + AuditLog,
    {
        let mut order = store.purchase_order(order_id)?;
        if order.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "purchase order {} is already {}",
                order.id, order.status
            )));
        }

        let now = Utc::now();
        order.status = PurchaseStatus::Cancelada;
        order.closed_at = Some(now);
        store.update_purchase_order(&order)?;
        info!(order_id = %order.id, "purchase order cancelled");

        self.outbox.enqueue(
            store,
            EntityType::PurchaseOrder,
            order.id.value(),
            Operation::StatusUpdate,
            order_payload(&order, now),
        )?;
        store.record_audit(AuditRecord::new(
            "cancel",
            "purchase_order",
            order.id.value(),
            actor,
            json!({ "status": order.status.as_str() }),
        ));
        Ok(order)
    }

    /// Send previously received units back to the supplier. The order status
    /// does not change; the stock leaves through a regular OUT movement.
    pub fn register_return<S>(
        &self,
        store: &mut S,
        order_id: PurchaseOrderId,
        device_id: DeviceId,
        quantity: i64,
        actor: UserId,
    ) -> DomainResult<PurchaseOrder>
    where
        S: PurchaseOrderRepository
            + DeviceRepository
            + MovementRepository
            + OutboxRepository
            + AuditLog,
    {
        let mut order = store.purchase_order(order_id)?;
        let item = order
            .item_mut(device_id)
            .ok_or_else(|| DomainError::not_found("purchase order line", device_id.value()))?;
        if quantity <= 0 || quantity > item.returnable() {
            return Err(DomainError::invalid_quantity(format!(
                "device {}: returning {} with {} returnable",
                device_id,
                quantity,
                item.returnable()
            )));
        }
        item.quantity_returned += quantity;

        let mut device = store.device(device_id)?;
        let draft = self.ledger.apply_movement(
            &mut device,
            MovementInput::issue(
                quantity,
                actor,
                format!("purchase order {} return", order.id),
            ),
        )?;
        store.update_device(&device)?;
        store.append_movement(draft);
        store.update_purchase_order(&order)?;
        info!(order_id = %order.id, device_id = %device_id, quantity, "supplier return registered");

        let now = Utc::now();
        self.outbox.enqueue(
            store,
            EntityType::PurchaseOrder,
            order.id.value(),
            Operation::Return,
            entity_payload(
                order.id.value(),
                order.status.as_str(),
                json!({
                    "storeId": order.store_id.value(),
                    "supplier": order.supplier,
                    "deviceId": device_id.value(),
                    "quantity": quantity,
                }),
                now,
            ),
        )?;
        store.record_audit(AuditRecord::new(
            "return",
            "purchase_order",
            order.id.value(),
            actor,
            json!({ "deviceId": device_id.value(), "quantity": quantity }),
        ));
        Ok(order)
    }
}

fn order_payload(order: &PurchaseOrder, at: DateTime<Utc>) -> Value {
    entity_payload(
        order.id.value(),
        order.status.as_str(),
        json!({
            "storeId": order.store_id.value(),
            "supplier": order.supplier,
        }),
        at,
    )
}
