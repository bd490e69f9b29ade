//! The authoritative mutation API over the variant table.
//!
//! Every mutation is one serializable read-modify-write unit: concurrent
//! purchase and sale events touching the same variant must not interleave,
//! or the counters drift (lost update). In-process this is a single mutation
//! mutex; multi-instance deployments need row-level locking or a
//! serializable isolation level at the storage layer instead, with an
//! idempotent `reconcile` as the convergence story after a crash.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadstock_catalog::{match_variant, MatchCandidate, MatchOutcome, MatchStrategy, VariantKey};
use threadstock_core::{LedgerError, LedgerResult, PurchaseOrderId, SaleId, VariantId};

use crate::facts::{FactLog, PurchaseLine, SaleLine};
use crate::store::VariantStore;
use crate::variant::{InventoryVariant, MarkupPolicy, StockSnapshot};

/// One incoming purchase-order line submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundLine {
    pub purchase_order_id: PurchaseOrderId,
    pub product_name: String,
    pub fabric_type: Option<String>,
    pub sizes: BTreeSet<String>,
    pub quantity: i64,
    pub unit_cost: i64,
    pub occurred_at: DateTime<Utc>,
}

/// One outgoing sale line submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundLine {
    pub sale_id: SaleId,
    pub target: VariantRef,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// How an outbound line names its variant: by id (preferred) or by raw
/// product name (legacy fallback, requires matching).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantRef {
    Id(VariantId),
    Name(String),
}

/// Outbound stock-check mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMode {
    /// Interactive sale entry: reject anything that would oversell.
    Strict,
    /// Backfill/replay of historical data: allow negative stock and surface
    /// it as an anomaly instead of rejecting.
    Backfill,
}

/// Result of a successful inbound application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReceipt {
    pub variant_id: VariantId,
    /// True when no existing variant matched and one was created.
    pub created: bool,
    /// Which cascade strategy resolved the match, when one did.
    pub matched_by: Option<MatchStrategy>,
    pub stock: StockSnapshot,
}

/// Result of a successful outbound application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReceipt {
    pub variant_id: VariantId,
    pub stock: StockSnapshot,
    /// Set in backfill mode when the resulting stock went negative.
    pub anomaly: bool,
}

/// The stock ledger service.
pub struct StockLedger<S, L>
where
    S: VariantStore,
    L: FactLog,
{
    store: S,
    facts: L,
    policy: MarkupPolicy,
    /// Serializes mutations; batch operations hold it for their whole run.
    mutation: Mutex<()>,
}

impl<S, L> StockLedger<S, L>
where
    S: VariantStore,
    L: FactLog,
{
    pub fn new(store: S, facts: L, policy: MarkupPolicy) -> Self {
        Self {
            store,
            facts,
            policy,
            mutation: Mutex::new(()),
        }
    }

    /// Apply one purchase-order line: resolve or create the variant, bump
    /// `quantity_in`, record the fact.
    pub fn apply_inbound(&self, line: InboundLine) -> LedgerResult<InboundReceipt> {
        if line.quantity <= 0 {
            return Err(LedgerError::invalid_quantity(line.quantity));
        }

        let _guard = self.mutation_guard();

        let key = VariantKey::derive(&line.product_name, line.fabric_type.as_deref());
        let receipt = match self.resolve(&key) {
            Some(outcome) => {
                let mut variant = self
                    .store
                    .get(outcome.variant_id)
                    .ok_or_else(|| LedgerError::invariant("matched variant vanished"))?;
                variant.record_inbound(
                    &line.sizes,
                    line.quantity,
                    line.unit_cost,
                    &self.policy,
                    line.occurred_at,
                );
                variant.check_invariant()?;
                let stock = variant.snapshot();
                self.store.upsert(variant);

                tracing::info!(
                    variant_id = %outcome.variant_id,
                    strategy = outcome.strategy.as_str(),
                    quantity = line.quantity,
                    "inbound applied to matched variant"
                );

                InboundReceipt {
                    variant_id: outcome.variant_id,
                    created: false,
                    matched_by: Some(outcome.strategy),
                    stock,
                }
            }
            None => {
                let variant = InventoryVariant::from_inbound(
                    &key,
                    &line.product_name,
                    line.fabric_type.as_deref(),
                    line.sizes.clone(),
                    line.quantity,
                    line.unit_cost,
                    &self.policy,
                    line.occurred_at,
                );
                let variant_id = variant.id;
                let stock = variant.snapshot();
                self.store.upsert(variant);

                tracing::info!(
                    variant_id = %variant_id,
                    code = %key.variant_code,
                    quantity = line.quantity,
                    "inbound created new variant"
                );

                InboundReceipt {
                    variant_id,
                    created: true,
                    matched_by: None,
                    stock,
                }
            }
        };

        self.facts.append_purchase(PurchaseLine {
            purchase_order_id: line.purchase_order_id,
            product_name_raw: line.product_name,
            fabric_type: line.fabric_type,
            sizes: line.sizes,
            quantity: line.quantity,
            unit_cost: line.unit_cost,
            occurred_at: line.occurred_at,
        });

        Ok(receipt)
    }

    /// Apply one sale line: resolve the variant, bump `quantity_out`, record
    /// the fact. Strict mode rejects oversells before any mutation.
    pub fn apply_outbound(
        &self,
        line: OutboundLine,
        mode: StockMode,
    ) -> LedgerResult<OutboundReceipt> {
        if line.quantity <= 0 {
            return Err(LedgerError::invalid_quantity(line.quantity));
        }

        let _guard = self.mutation_guard();

        let mut variant = match &line.target {
            VariantRef::Id(id) => self.store.get(*id).ok_or(LedgerError::VariantNotFound)?,
            VariantRef::Name(name) => {
                let key = VariantKey::derive(name, None);
                let outcome = self.resolve(&key).ok_or(LedgerError::VariantNotFound)?;
                self.store
                    .get(outcome.variant_id)
                    .ok_or(LedgerError::VariantNotFound)?
            }
        };

        if mode == StockMode::Strict && variant.current_stock - line.quantity < 0 {
            return Err(LedgerError::insufficient_stock(
                variant.current_stock,
                line.quantity,
            ));
        }

        variant.record_outbound(line.quantity, line.occurred_at);
        variant.check_invariant()?;

        let variant_id = variant.id;
        let stock = variant.snapshot();
        let anomaly = stock.current_stock < 0;
        self.store.upsert(variant);

        if anomaly {
            tracing::warn!(
                variant_id = %variant_id,
                stock = stock.current_stock,
                "backfill outbound drove stock negative"
            );
        } else {
            tracing::info!(
                variant_id = %variant_id,
                quantity = line.quantity,
                "outbound applied"
            );
        }

        self.facts.append_sale(SaleLine {
            sale_id: line.sale_id,
            variant_id: Some(variant_id),
            product_name_raw: match line.target {
                VariantRef::Name(name) => Some(name),
                VariantRef::Id(_) => None,
            },
            quantity: line.quantity,
            occurred_at: line.occurred_at,
        });

        Ok(OutboundReceipt {
            variant_id,
            stock,
            anomaly,
        })
    }

    /// Current counters for one variant. Read-only; consistent with the core
    /// invariant by construction.
    pub fn stock(&self, variant_id: VariantId) -> LedgerResult<StockSnapshot> {
        self.store
            .get(variant_id)
            .map(|v| v.snapshot())
            .ok_or(LedgerError::VariantNotFound)
    }

    /// All variant rows, oldest first (read-only).
    pub fn variants(&self) -> Vec<InventoryVariant> {
        self.store.list()
    }

    /// Resolve a key against the store: secondary code index first (the
    /// exact-code fast path), then the full cascade over all rows.
    fn resolve(&self, key: &VariantKey) -> Option<MatchOutcome> {
        if let Some(id) = self.store.find_by_code(&key.variant_code).first().copied() {
            return Some(MatchOutcome {
                variant_id: id,
                strategy: MatchStrategy::ExactCode,
            });
        }

        let candidates: Vec<MatchCandidate> = self
            .store
            .list()
            .into_iter()
            .map(|v| MatchCandidate {
                id: v.id,
                key: v.match_key(),
            })
            .collect();

        match_variant(key, &candidates)
    }

    /// Enter administrative mode: the returned handle holds the mutation
    /// lock for its whole lifetime, giving merge/reconcile one broad
    /// critical section.
    pub fn admin(&self) -> AdminOps<'_, S, L> {
        AdminOps {
            ledger: self,
            _guard: self.mutation_guard(),
        }
    }

    fn mutation_guard(&self) -> MutexGuard<'_, ()> {
        // A poisoned mutex only means another mutation panicked; the store
        // itself is still coherent, so continue.
        self.mutation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Administrative access for batch operations (merge, reconcile).
///
/// This is the only surface allowed to rewrite counters or remove rows, and
/// it blocks normal mutations while held.
pub struct AdminOps<'a, S, L>
where
    S: VariantStore,
    L: FactLog,
{
    ledger: &'a StockLedger<S, L>,
    _guard: MutexGuard<'a, ()>,
}

impl<S, L> AdminOps<'_, S, L>
where
    S: VariantStore,
    L: FactLog,
{
    pub fn variants(&self) -> Vec<InventoryVariant> {
        self.ledger.store.list()
    }

    pub fn variant(&self, id: VariantId) -> Option<InventoryVariant> {
        self.ledger.store.get(id)
    }

    pub fn purchases(&self) -> Vec<PurchaseLine> {
        self.ledger.facts.purchases()
    }

    pub fn sales(&self) -> Vec<SaleLine> {
        self.ledger.facts.sales()
    }

    pub fn policy(&self) -> MarkupPolicy {
        self.ledger.policy
    }

    pub fn upsert_variant(&self, variant: InventoryVariant) {
        self.ledger.store.upsert(variant);
    }

    pub fn remove_variant(&self, id: VariantId) -> bool {
        self.ledger.store.remove(id)
    }
}
