//! `threadstock-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{LedgerError, LedgerResult};
pub use id::{PurchaseOrderId, SaleId, VariantId};
