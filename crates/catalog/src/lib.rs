//! Product key normalization and matching.
//!
//! This crate contains the business rules that relate free-text purchase and
//! sale lines to canonical inventory variants, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod matcher;
pub mod normalize;

pub use matcher::{match_variant, MatchCandidate, MatchOutcome, MatchStrategy};
pub use normalize::{VariantKey, FABRIC_FALLBACK};
