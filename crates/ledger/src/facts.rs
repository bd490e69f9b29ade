//! Append-only transaction facts.
//!
//! Facts are immutable once recorded and are the source of truth the
//! reconciler replays. The mapping from a fact to a variant is inferred via
//! the matcher, never stored on the fact itself.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadstock_core::{PurchaseOrderId, SaleId, VariantId};

/// One incoming purchase-order line; source of truth for `quantity_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub purchase_order_id: PurchaseOrderId,
    pub product_name_raw: String,
    pub fabric_type: Option<String>,
    pub sizes: BTreeSet<String>,
    pub quantity: i64,
    /// Unit cost in minor currency units.
    pub unit_cost: i64,
    pub occurred_at: DateTime<Utc>,
}

/// One outgoing sale line; source of truth for `quantity_out`.
///
/// References a variant by id when the sale was entered against a resolved
/// variant; legacy rows carry only the raw product name and need matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub sale_id: SaleId,
    pub variant_id: Option<VariantId>,
    pub product_name_raw: Option<String>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only storage for the two fact streams.
///
/// Implementations backed by a real database must make `append_*` part of
/// the same transaction as the variant mutation it accompanies.
pub trait FactLog: Send + Sync {
    fn append_purchase(&self, line: PurchaseLine);
    fn append_sale(&self, line: SaleLine);
    /// Full purchase history, oldest first.
    fn purchases(&self) -> Vec<PurchaseLine>;
    /// Full sale history, oldest first.
    fn sales(&self) -> Vec<SaleLine>;
}

impl<L> FactLog for Arc<L>
where
    L: FactLog + ?Sized,
{
    fn append_purchase(&self, line: PurchaseLine) {
        (**self).append_purchase(line)
    }

    fn append_sale(&self, line: SaleLine) {
        (**self).append_sale(line)
    }

    fn purchases(&self) -> Vec<PurchaseLine> {
        (**self).purchases()
    }

    fn sales(&self) -> Vec<SaleLine> {
        (**self).sales()
    }
}

/// In-memory fact log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFactLog {
    purchases: RwLock<Vec<PurchaseLine>>,
    sales: RwLock<Vec<SaleLine>>,
}

impl InMemoryFactLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FactLog for InMemoryFactLog {
    fn append_purchase(&self, line: PurchaseLine) {
        if let Ok(mut log) = self.purchases.write() {
            log.push(line);
        }
    }

    fn append_sale(&self, line: SaleLine) {
        if let Ok(mut log) = self.sales.write() {
            log.push(line);
        }
    }

    fn purchases(&self) -> Vec<PurchaseLine> {
        match self.purchases.read() {
            Ok(log) => log.clone(),
            Err(_) => vec![],
        }
    }

    fn sales(&self) -> Vec<SaleLine> {
        match self.sales.read() {
            Ok(log) => log.clone(),
            Err(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_append_in_order() {
        let log = InMemoryFactLog::new();
        for qty in [3, 7] {
            log.append_purchase(PurchaseLine {
                purchase_order_id: PurchaseOrderId::new(),
                product_name_raw: "Plain Kurta".to_string(),
                fabric_type: Some("Cotton".to_string()),
                sizes: BTreeSet::new(),
                quantity: qty,
                unit_cost: 500,
                occurred_at: Utc::now(),
            });
        }

        let purchases = log.purchases();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].quantity, 3);
        assert_eq!(purchases[1].quantity, 7);
        assert!(log.sales().is_empty());
    }
}
