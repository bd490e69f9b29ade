//! Reconciliation: replay the fact streams, rebuild the derived counters.
//!
//! The canonical "replay the log to rebuild state" pass. Preferred over
//! ad-hoc incremental patches whenever drift is suspected: it is idempotent,
//! converges after a crash, and is the only operation permitted to decrease
//! the cumulative counters (it replaces stored state with recomputed truth).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;

use threadstock_catalog::{match_variant, MatchCandidate, MatchStrategy, VariantKey};
use threadstock_core::VariantId;
use threadstock_ledger::{
    FactLog, InventoryVariant, SaleLine, StockLedger, StockSnapshot, VariantStore,
};

use crate::report::{AnomalyNote, ReconcileEntry, ReconcileOutcome, ReconciliationReport};

/// Expected state for one `(normalized_name, normalized_fabric)` pair,
/// accumulated from the fact streams.
#[derive(Debug, Default)]
struct PairState {
    expected_in: i64,
    expected_out: i64,
    /// First-seen raw name/fabric, used when the pair needs a new variant.
    display_name: String,
    fabric_type: Option<String>,
    sizes: BTreeSet<String>,
    last_unit_cost: i64,
}

type Pair = (String, String);

/// Replay all purchase and sale lines and correct every variant whose stored
/// counters disagree with the replayed totals; create variants for pairs
/// that have facts but no row.
///
/// Holds the ledger's admin lock for the whole run. Per-pair outcomes are
/// reported; one bad pair never aborts the run.
pub fn reconcile<S, L>(ledger: &StockLedger<S, L>) -> ReconciliationReport
where
    S: VariantStore,
    L: FactLog,
{
    let admin = ledger.admin();
    let mut report = ReconciliationReport::default();
    let mut pairs: BTreeMap<Pair, PairState> = BTreeMap::new();

    // Pass 1: expected quantity_in from the purchase stream.
    for line in admin.purchases() {
        let key = VariantKey::derive(&line.product_name_raw, line.fabric_type.as_deref());
        let state = pairs
            .entry((key.normalized_name, key.normalized_fabric))
            .or_default();
        if state.display_name.is_empty() {
            state.display_name = VariantKey::canonical_display(&line.product_name_raw);
            state.fabric_type = line
                .fabric_type
                .as_deref()
                .map(VariantKey::canonical_display)
                .filter(|f| !f.is_empty());
        }
        state.expected_in += line.quantity;
        state.sizes.extend(line.sizes.iter().cloned());
        state.last_unit_cost = line.unit_cost;
    }

    // Pass 2: expected quantity_out from the sale stream, joined by variant
    // id when present, else by best-effort matching.
    let variants = admin.variants();
    let by_id: HashMap<VariantId, &InventoryVariant> =
        variants.iter().map(|v| (v.id, v)).collect();

    // Purchase pairs may not have a row yet (pass 3 creates them), so they
    // join the candidate list under synthetic ids. Real rows keep their own
    // ids, which are older and so also win matcher tie-breaks.
    let mut candidates: Vec<MatchCandidate> = variants
        .iter()
        .map(|v| MatchCandidate {
            id: v.id,
            key: v.match_key(),
        })
        .collect();
    let mut pair_candidates: HashMap<VariantId, Pair> = HashMap::new();
    for (pair, state) in &pairs {
        let id = VariantId::new();
        let name = if state.display_name.is_empty() {
            &pair.0
        } else {
            &state.display_name
        };
        candidates.push(MatchCandidate {
            id,
            key: VariantKey::derive(name, state.fabric_type.as_deref()),
        });
        pair_candidates.insert(id, pair.clone());
    }

    // Fuzzy-match audit notes are deferred: a pair matched before its row
    // exists only gets a variant id in pass 3.
    let mut fuzzy_pending: Vec<(Pair, MatchStrategy, String)> = Vec::new();

    for sale in admin.sales() {
        match sale_pair(
            &sale,
            &by_id,
            &candidates,
            &pair_candidates,
            &pairs,
            &mut fuzzy_pending,
        ) {
            Some(pair) => {
                let state = pairs.entry(pair).or_default();
                state.expected_out += sale.quantity;
            }
            None => {
                report.anomalies.push(AnomalyNote::UnmatchedSale {
                    sale_id: sale.sale_id,
                    product_name_raw: sale.product_name_raw.clone(),
                    quantity: sale.quantity,
                });
                tracing::warn!(
                    sale_id = %sale.sale_id,
                    name = sale.product_name_raw.as_deref().unwrap_or(""),
                    "sale line could not be reconciled to any variant"
                );
            }
        }
    }

    // Pass 3: compare expected state against stored rows, pair by pair.
    let mut rows_by_pair: BTreeMap<Pair, Vec<&InventoryVariant>> = BTreeMap::new();
    for v in &variants {
        rows_by_pair.entry(v.normalized_pair()).or_default().push(v);
    }

    for ((name, fabric), state) in &pairs {
        let expected = StockSnapshot {
            quantity_in: state.expected_in,
            quantity_out: state.expected_out,
            current_stock: state.expected_in - state.expected_out,
        };
        let pair = (name.clone(), fabric.clone());

        // Oldest row for the pair is authoritative; extra rows are the
        // merger's concern, not ours.
        let existing = rows_by_pair
            .get(&pair)
            .and_then(|rows| rows.iter().min_by_key(|v| v.id))
            .copied();

        let entry = match existing {
            None => {
                let variant = create_variant(&admin, state, &pair, expected);
                report.created += 1;
                tracing::info!(
                    variant_id = %variant.id,
                    code = %variant.variant_code,
                    quantity_in = expected.quantity_in,
                    quantity_out = expected.quantity_out,
                    "reconcile created missing variant"
                );
                ReconcileEntry {
                    variant_id: variant.id,
                    normalized_name: name.clone(),
                    normalized_fabric: fabric.clone(),
                    outcome: ReconcileOutcome::Created,
                    expected,
                    stored: None,
                }
            }
            Some(row) if row.snapshot() == expected => {
                report.consistent += 1;
                ReconcileEntry {
                    variant_id: row.id,
                    normalized_name: name.clone(),
                    normalized_fabric: fabric.clone(),
                    outcome: ReconcileOutcome::Consistent,
                    expected,
                    stored: Some(expected),
                }
            }
            Some(row) => {
                let stored = row.snapshot();
                let mut corrected = row.clone();
                corrected.quantity_in = expected.quantity_in;
                corrected.quantity_out = expected.quantity_out;
                corrected.current_stock = expected.current_stock;
                corrected.updated_at = Utc::now();
                admin.upsert_variant(corrected);

                report.corrected += 1;
                tracing::info!(
                    variant_id = %row.id,
                    delta_in = expected.quantity_in - stored.quantity_in,
                    delta_out = expected.quantity_out - stored.quantity_out,
                    "reconcile corrected drifted counters"
                );
                ReconcileEntry {
                    variant_id: row.id,
                    normalized_name: name.clone(),
                    normalized_fabric: fabric.clone(),
                    outcome: ReconcileOutcome::Corrected,
                    expected,
                    stored: Some(stored),
                }
            }
        };

        if expected.current_stock < 0 {
            let variant_code = admin
                .variant(entry.variant_id)
                .map(|v| v.variant_code)
                .unwrap_or_default();
            report.anomalies.push(AnomalyNote::NegativeStock {
                variant_id: entry.variant_id,
                variant_code,
                current_stock: expected.current_stock,
            });
        }

        report.entries.push(entry);
    }

    for (pair, strategy, product_name_raw) in fuzzy_pending {
        if let Some(entry) = report
            .entries
            .iter()
            .find(|e| e.normalized_name == pair.0 && e.normalized_fabric == pair.1)
        {
            report.anomalies.push(AnomalyNote::FuzzyMatch {
                variant_id: entry.variant_id,
                strategy,
                product_name_raw,
            });
        }
    }

    report
}

/// Resolve the pair a sale line contributes to: by referenced variant, then
/// by exact pair key against the purchase stream, then by an unambiguous
/// name-only pair hit, then by the match cascade over rows and purchase
/// pairs alike.
fn sale_pair(
    sale: &SaleLine,
    by_id: &HashMap<VariantId, &InventoryVariant>,
    candidates: &[MatchCandidate],
    pair_candidates: &HashMap<VariantId, Pair>,
    pairs: &BTreeMap<Pair, PairState>,
    fuzzy_pending: &mut Vec<(Pair, MatchStrategy, String)>,
) -> Option<Pair> {
    if let Some(id) = sale.variant_id {
        if let Some(variant) = by_id.get(&id) {
            return Some(variant.normalized_pair());
        }
        // Dangling reference (e.g. the row was merged away); fall through to
        // the name-based paths.
        tracing::warn!(
            sale_id = %sale.sale_id,
            variant_id = %id,
            "sale references a variant that no longer exists"
        );
    }

    let name = sale.product_name_raw.as_deref()?;
    let key = VariantKey::derive(name, None);

    let direct = (key.normalized_name.clone(), key.normalized_fabric.clone());
    if pairs.contains_key(&direct) {
        return Some(direct);
    }

    // Sale lines rarely carry a fabric, so their derived pair lands on
    // "standard" even when the purchase pair has a real fabric. An
    // unambiguous name-only hit among the purchase pairs is exact enough
    // to take silently.
    let mut same_name = pairs
        .keys()
        .filter(|(pair_name, _)| *pair_name == key.normalized_name);
    if let (Some(pair), None) = (same_name.next(), same_name.next()) {
        return Some(pair.clone());
    }

    let outcome = match_variant(&key, candidates)?;
    let pair = match pair_candidates.get(&outcome.variant_id) {
        Some(pair) => pair.clone(),
        None => by_id.get(&outcome.variant_id)?.normalized_pair(),
    };
    if outcome.strategy.is_fuzzy() {
        fuzzy_pending.push((pair.clone(), outcome.strategy, name.to_string()));
    }
    Some(pair)
}

fn create_variant<S, L>(
    admin: &threadstock_ledger::AdminOps<'_, S, L>,
    state: &PairState,
    pair: &Pair,
    expected: StockSnapshot,
) -> InventoryVariant
where
    S: VariantStore,
    L: FactLog,
{
    // Sale-only pairs have no purchase line to name them; fall back to the
    // normalized name itself.
    let display_name = if state.display_name.is_empty() {
        pair.0.clone()
    } else {
        state.display_name.clone()
    };
    let key = VariantKey::derive(&display_name, state.fabric_type.as_deref());
    let now = Utc::now();

    let variant = InventoryVariant {
        id: VariantId::new(),
        display_name,
        variant_code: key.variant_code,
        fabric_type: state.fabric_type.clone(),
        sizes: state.sizes.clone(),
        unit_cost_price: state.last_unit_cost,
        unit_sell_price: admin.policy().sell_price(state.last_unit_cost),
        quantity_in: expected.quantity_in,
        quantity_out: expected.quantity_out,
        current_stock: expected.current_stock,
        created_at: now,
        updated_at: now,
    };
    admin.upsert_variant(variant.clone());
    variant
}
