//! Batch correction operations over the stock ledger.
//!
//! Two operator-invocable passes that do not run inline with normal traffic:
//!
//! - [`merge_duplicates`]: folds inventory rows that normalize to the same
//!   key into one survivor, conserving counters.
//! - [`reconcile`]: replays the purchase and sale fact streams and corrects
//!   any variant whose stored counters disagree (or that is missing).
//!
//! Both run inside one broad critical section (the ledger's admin handle)
//! and report per-group/per-variant outcomes instead of failing the whole
//! run on one bad group.

pub mod merge;
pub mod reconcile;
pub mod report;

pub use merge::merge_duplicates;
pub use reconcile::reconcile;
pub use report::{
    AnomalyNote, MergeReport, MergedGroup, ReconcileEntry, ReconcileOutcome, ReconciliationReport,
};

#[cfg(test)]
mod integration_tests;
