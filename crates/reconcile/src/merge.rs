//! Duplicate detection and merging.
//!
//! Inconsistent free-text spellings accumulate duplicate variant rows over
//! time. Merging is destructive to the non-survivor rows but lossless with
//! respect to counters: facts are counted, not individually re-attributed.

use std::collections::BTreeMap;

use chrono::Utc;

use threadstock_catalog::VariantKey;
use threadstock_ledger::{FactLog, InventoryVariant, StockLedger, VariantStore};

use crate::report::{AnomalyNote, MergeReport, MergedGroup};

/// Fold all variants that normalize to the same `(name, fabric)` pair into
/// their oldest member, summing counters.
///
/// Holds the ledger's admin lock for the whole run, so a concurrent
/// purchase/sale can neither observe nor produce a half-merged group.
pub fn merge_duplicates<S, L>(ledger: &StockLedger<S, L>) -> MergeReport
where
    S: VariantStore,
    L: FactLog,
{
    let admin = ledger.admin();
    let mut report = MergeReport::default();

    let mut groups: BTreeMap<(String, String), Vec<InventoryVariant>> = BTreeMap::new();
    for variant in admin.variants() {
        groups
            .entry(variant.normalized_pair())
            .or_default()
            .push(variant);
    }

    for ((normalized_name, normalized_fabric), mut members) in groups {
        if members.len() < 2 {
            continue;
        }

        // Oldest row survives; ids are time-ordered.
        members.sort_by_key(|v| v.id);
        let mut survivor = members[0].clone();
        let absorbed: Vec<_> = members[1..].iter().map(|v| v.id).collect();

        let sum_in: i64 = members.iter().map(|v| v.quantity_in).sum();
        let sum_out: i64 = members.iter().map(|v| v.quantity_out).sum();

        survivor.quantity_in = sum_in;
        survivor.quantity_out = sum_out;
        survivor.current_stock = sum_in - sum_out;
        for member in &members[1..] {
            survivor.sizes.extend(member.sizes.iter().cloned());
        }
        // Rewrite identity to the canonical form of the surviving row.
        survivor.display_name = VariantKey::canonical_display(&survivor.display_name);
        survivor.variant_code =
            VariantKey::derive(&survivor.display_name, survivor.fabric_type.as_deref())
                .variant_code;
        survivor.updated_at = Utc::now();

        for id in &absorbed {
            admin.remove_variant(*id);
        }
        admin.upsert_variant(survivor.clone());

        tracing::info!(
            survivor = %survivor.id,
            absorbed = absorbed.len(),
            code = %survivor.variant_code,
            quantity_in = sum_in,
            quantity_out = sum_out,
            "merged duplicate variants"
        );

        if survivor.current_stock < 0 {
            report.anomalies.push(AnomalyNote::NegativeStock {
                variant_id: survivor.id,
                variant_code: survivor.variant_code.clone(),
                current_stock: survivor.current_stock,
            });
        }

        report.groups_merged += 1;
        report.variants_removed += absorbed.len();
        report.merged.push(MergedGroup {
            survivor: survivor.id,
            absorbed,
            normalized_name,
            normalized_fabric,
            quantity_in: sum_in,
            quantity_out: sum_out,
            current_stock: sum_in - sum_out,
        });
    }

    report
}
