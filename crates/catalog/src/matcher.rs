//! Product matcher: ordered cascade of resolution strategies.
//!
//! The mapping from a free-text line to an inventory variant is inferred,
//! not keyed. The cascade tries cheap/exact checks first and fuzzy checks
//! last, and the first strategy with a hit wins — later strategies are never
//! consulted, even if they would have produced a "better" match
//! (precision-over-recall policy).

use serde::{Deserialize, Serialize};

use threadstock_core::VariantId;

use crate::normalize::VariantKey;

/// Tag identifying which cascade strategy resolved a match.
///
/// Carried on [`MatchOutcome`] and logged so suspect fuzzy matches can be
/// audited after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact `variant_code` equality.
    ExactCode,
    /// Exact normalized name AND normalized fabric equality.
    ExactNameFabric,
    /// All name tokens longer than two chars contained in the candidate name
    /// (or candidate name contained in the query name).
    TokenSubstring,
    /// First two words of the query name as a prefix of the candidate name.
    WordPrefix,
    /// Non-alphanumerics stripped from both sides, equality or mutual
    /// containment; only when both stripped strings are longer than five.
    AlphanumericFold,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::ExactCode => "exact_code",
            MatchStrategy::ExactNameFabric => "exact_name_fabric",
            MatchStrategy::TokenSubstring => "token_substring",
            MatchStrategy::WordPrefix => "word_prefix",
            MatchStrategy::AlphanumericFold => "alphanumeric_fold",
        }
    }

    /// True for the strategies whose hits are probabilistic rather than exact.
    pub fn is_fuzzy(&self) -> bool {
        !matches!(
            self,
            MatchStrategy::ExactCode | MatchStrategy::ExactNameFabric
        )
    }
}

impl core::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One existing variant offered to the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub id: VariantId,
    pub key: VariantKey,
}

/// Result of a successful cascade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub variant_id: VariantId,
    pub strategy: MatchStrategy,
}

type StrategyFn = fn(&VariantKey, &[MatchCandidate]) -> Option<VariantId>;

/// Cascade order is load-bearing; see module docs.
const CASCADE: &[(MatchStrategy, StrategyFn)] = &[
    (MatchStrategy::ExactCode, exact_code),
    (MatchStrategy::ExactNameFabric, exact_name_fabric),
    (MatchStrategy::TokenSubstring, token_substring),
    (MatchStrategy::WordPrefix, word_prefix),
    (MatchStrategy::AlphanumericFold, alphanumeric_fold),
];

/// Resolve `key` against `candidates`, returning the first cascade hit.
pub fn match_variant(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<MatchOutcome> {
    for (strategy, resolve) in CASCADE {
        if let Some(variant_id) = resolve(key, candidates) {
            tracing::debug!(
                strategy = strategy.as_str(),
                variant_id = %variant_id,
                code = %key.variant_code,
                "product matched"
            );
            return Some(MatchOutcome {
                variant_id,
                strategy: *strategy,
            });
        }
    }

    tracing::debug!(code = %key.variant_code, "no product match");
    None
}

/// Deterministic tie-break within one strategy: oldest variant wins
/// (ids are time-ordered).
fn pick_oldest(matches: impl Iterator<Item = VariantId>) -> Option<VariantId> {
    matches.min()
}

fn exact_code(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<VariantId> {
    pick_oldest(
        candidates
            .iter()
            .filter(|c| c.key.variant_code == key.variant_code)
            .map(|c| c.id),
    )
}

fn exact_name_fabric(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<VariantId> {
    pick_oldest(
        candidates
            .iter()
            .filter(|c| {
                c.key.normalized_name == key.normalized_name
                    && c.key.normalized_fabric == key.normalized_fabric
            })
            .map(|c| c.id),
    )
}

fn token_substring(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<VariantId> {
    let tokens: Vec<&str> = key
        .normalized_name
        .split(' ')
        .filter(|t| t.len() > 2)
        .collect();
    if tokens.is_empty() {
        return None;
    }

    pick_oldest(
        candidates
            .iter()
            .filter(|c| {
                let name = c.key.normalized_name.as_str();
                if name.is_empty() {
                    return false;
                }
                tokens.iter().all(|t| name.contains(t))
                    || key.normalized_name.contains(name)
            })
            .map(|c| c.id),
    )
}

fn word_prefix(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<VariantId> {
    let words: Vec<&str> = key.normalized_name.split(' ').collect();
    if words.len() < 2 {
        return None;
    }
    let prefix = format!("{} {}", words[0], words[1]);

    pick_oldest(
        candidates
            .iter()
            .filter(|c| c.key.normalized_name.starts_with(&prefix))
            .map(|c| c.id),
    )
}

fn alphanumeric_fold(key: &VariantKey, candidates: &[MatchCandidate]) -> Option<VariantId> {
    let stripped = strip_non_alphanumeric(&key.normalized_name);
    // Short stripped names over-match; skip the strategy entirely.
    if stripped.len() <= 5 {
        return None;
    }

    pick_oldest(
        candidates
            .iter()
            .filter(|c| {
                let other = strip_non_alphanumeric(&c.key.normalized_name);
                other.len() > 5
                    && (other == stripped
                        || other.contains(&stripped)
                        || stripped.contains(&other))
            })
            .map(|c| c.id),
    )
}

fn strip_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}
