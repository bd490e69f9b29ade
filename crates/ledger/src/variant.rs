//! The inventory variant record: one stocked product/fabric combination.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadstock_catalog::VariantKey;
use threadstock_core::{LedgerError, LedgerResult, VariantId};

/// Sell-price policy: configurable markup over the latest inbound cost.
///
/// External to the ledger arithmetic; injected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupPolicy {
    pub markup_percent: u32,
}

impl MarkupPolicy {
    pub fn new(markup_percent: u32) -> Self {
        Self { markup_percent }
    }

    /// Sell price for a unit cost, both in minor currency units.
    pub fn sell_price(&self, unit_cost: i64) -> i64 {
        unit_cost + unit_cost * i64::from(self.markup_percent) / 100
    }
}

impl Default for MarkupPolicy {
    fn default() -> Self {
        Self { markup_percent: 50 }
    }
}

/// Read-only counter view of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub quantity_in: i64,
    pub quantity_out: i64,
    pub current_stock: i64,
}

/// One stocked SKU, derived from the purchase and sale fact streams.
///
/// `quantity_in`/`quantity_out` are cumulative append-only counters; normal
/// operations only ever increase them. Reconciliation alone may rewrite them,
/// and only to the values implied by replaying the fact streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryVariant {
    pub id: VariantId,
    /// First-seen casing/spacing preserved for display.
    pub display_name: String,
    /// Derived `NAME_FABRIC` key; best-effort index, not a uniqueness
    /// guarantee. May go stale relative to the display fields on legacy rows.
    pub variant_code: String,
    pub fabric_type: Option<String>,
    /// Union of all sizes ever seen on inbound lines.
    pub sizes: BTreeSet<String>,
    /// Latest inbound cost, minor currency units (last-write-wins).
    pub unit_cost_price: i64,
    pub unit_sell_price: i64,
    pub quantity_in: i64,
    pub quantity_out: i64,
    /// Negative only as a detected anomaly, never a valid steady state.
    pub current_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryVariant {
    /// Create the variant for a first, unmatched inbound line.
    pub fn from_inbound(
        key: &VariantKey,
        display_name: &str,
        fabric_type: Option<&str>,
        sizes: BTreeSet<String>,
        quantity: i64,
        unit_cost: i64,
        policy: &MarkupPolicy,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: VariantId::new(),
            display_name: VariantKey::canonical_display(display_name),
            variant_code: key.variant_code.clone(),
            fabric_type: fabric_type
                .map(VariantKey::canonical_display)
                .filter(|f| !f.is_empty()),
            sizes,
            unit_cost_price: unit_cost,
            unit_sell_price: policy.sell_price(unit_cost),
            quantity_in: quantity,
            quantity_out: 0,
            current_stock: quantity,
            created_at: occurred_at,
            updated_at: occurred_at,
        }
    }

    /// Matching key: normalized fields derived fresh from the display fields,
    /// paired with the *stored* code (which legacy rows may have let drift).
    pub fn match_key(&self) -> VariantKey {
        let mut key = VariantKey::derive(&self.display_name, self.fabric_type.as_deref());
        key.variant_code = self.variant_code.clone();
        key
    }

    /// Grouping key for duplicate detection and reconciliation, derived from
    /// the display fields only.
    pub fn normalized_pair(&self) -> (String, String) {
        let key = VariantKey::derive(&self.display_name, self.fabric_type.as_deref());
        (key.normalized_name, key.normalized_fabric)
    }

    /// Fold a matched inbound line into the counters; cost fields follow the
    /// latest inbound price.
    pub fn record_inbound(
        &mut self,
        sizes: &BTreeSet<String>,
        quantity: i64,
        unit_cost: i64,
        policy: &MarkupPolicy,
        occurred_at: DateTime<Utc>,
    ) {
        self.quantity_in += quantity;
        self.current_stock += quantity;
        self.sizes.extend(sizes.iter().cloned());
        self.unit_cost_price = unit_cost;
        self.unit_sell_price = policy.sell_price(unit_cost);
        self.updated_at = occurred_at;
    }

    /// Fold an outbound line into the counters. The strict-mode stock check
    /// happens before this is called; here the arithmetic is unconditional.
    pub fn record_outbound(&mut self, quantity: i64, occurred_at: DateTime<Utc>) {
        self.quantity_out += quantity;
        self.current_stock -= quantity;
        self.updated_at = occurred_at;
    }

    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            quantity_in: self.quantity_in,
            quantity_out: self.quantity_out,
            current_stock: self.current_stock,
        }
    }

    /// Verify `current_stock == quantity_in - quantity_out`.
    pub fn check_invariant(&self) -> LedgerResult<()> {
        if self.current_stock != self.quantity_in - self.quantity_out {
            return Err(LedgerError::invariant(format!(
                "variant {}: stock {} != in {} - out {}",
                self.id, self.current_stock, self.quantity_in, self.quantity_out
            )));
        }
        Ok(())
    }
}
