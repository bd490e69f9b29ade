//! Stock ledger: authoritative stock levels derived from two append-only
//! fact streams (purchase lines in, sale lines out).
//!
//! The core invariant — `current_stock == quantity_in - quantity_out` after
//! every successful mutation — is enforced here. Batch corrections (merge,
//! reconcile) live in `threadstock-reconcile` and drive the store through
//! [`AdminOps`].

pub mod facts;
pub mod ledger;
pub mod store;
pub mod variant;

pub use facts::{FactLog, InMemoryFactLog, PurchaseLine, SaleLine};
pub use ledger::{
    AdminOps, InboundLine, InboundReceipt, OutboundLine, OutboundReceipt, StockLedger, StockMode,
    VariantRef,
};
pub use store::{InMemoryVariantStore, VariantStore};
pub use variant::{InventoryVariant, MarkupPolicy, StockSnapshot};
