//! Supplier purchasing: orders, receiving, cancellation, returns.
//!
//! Receipts flow through the stock ledger at the ordered unit cost, so the
//! weighted average on the shelf always reflects what was actually paid.

pub mod order;
pub mod receiving;

pub use order::{
    NewPurchaseLine, NewPurchaseOrder, PurchaseOrder, PurchaseOrderId, PurchaseOrderItem,
    PurchaseStatus,
};
pub use receiving::{PurchaseOrderRepository, PurchaseReceivingEngine, ReceiptLine};
