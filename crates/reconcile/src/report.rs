//! Structured reports for batch operations.
//!
//! Operators run merge/reconcile out-of-band; the reports are their whole
//! view of what happened, so every group/variant outcome is listed rather
//! than only the failures.

use serde::{Deserialize, Serialize};

use threadstock_catalog::MatchStrategy;
use threadstock_core::{SaleId, VariantId};
use threadstock_ledger::StockSnapshot;

/// Soft observability note. None of these abort a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyNote {
    /// Replaying the authoritative facts still leaves this variant oversold:
    /// a genuine business-data problem, surfaced but not auto-hidden.
    NegativeStock {
        variant_id: VariantId,
        variant_code: String,
        current_stock: i64,
    },
    /// A sale line could not be related to any variant or fact pair.
    UnmatchedSale {
        sale_id: SaleId,
        product_name_raw: Option<String>,
        quantity: i64,
    },
    /// A fact was related to a variant by a fuzzy strategy. Correctness is
    /// probabilistic by design; recorded for audit.
    FuzzyMatch {
        variant_id: VariantId,
        strategy: MatchStrategy,
        product_name_raw: String,
    },
}

/// One merged duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub survivor: VariantId,
    pub absorbed: Vec<VariantId>,
    pub normalized_name: String,
    pub normalized_fabric: String,
    /// Survivor counters after the merge (= group sums).
    pub quantity_in: i64,
    pub quantity_out: i64,
    pub current_stock: i64,
}

/// Outcome of one duplicate-merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub groups_merged: usize,
    pub variants_removed: usize,
    pub merged: Vec<MergedGroup>,
    pub anomalies: Vec<AnomalyNote>,
}

/// Per-pair outcome of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No variant existed for the pair; one was created from the facts.
    Created,
    /// Stored counters disagreed with the replayed facts and were rewritten.
    Corrected,
    /// Stored counters already matched.
    Consistent,
}

/// One reconciled `(normalized_name, normalized_fabric)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileEntry {
    pub variant_id: VariantId,
    pub normalized_name: String,
    pub normalized_fabric: String,
    pub outcome: ReconcileOutcome,
    /// Counters implied by replaying the fact streams.
    pub expected: StockSnapshot,
    /// Stored counters before correction; absent for created rows.
    pub stored: Option<StockSnapshot>,
}

impl ReconcileEntry {
    /// Correction delta on `quantity_in` (zero for created/consistent rows).
    pub fn delta_in(&self) -> i64 {
        self.stored
            .map(|s| self.expected.quantity_in - s.quantity_in)
            .unwrap_or(0)
    }

    /// Correction delta on `quantity_out`.
    pub fn delta_out(&self) -> i64 {
        self.stored
            .map(|s| self.expected.quantity_out - s.quantity_out)
            .unwrap_or(0)
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub created: usize,
    pub corrected: usize,
    pub consistent: usize,
    pub entries: Vec<ReconcileEntry>,
    pub anomalies: Vec<AnomalyNote>,
}

impl ReconciliationReport {
    /// True when the run found nothing to fix (the idempotence signal).
    pub fn is_clean(&self) -> bool {
        self.created == 0 && self.corrected == 0
    }
}
