//! Product key normalization.
//!
//! Purchase lines carry free-text product names ("Mustard  Yellow Kurta") and
//! fabric types that may be missing or inconsistently cased. Normalization
//! turns them into a comparison key and a display-safe code so the matcher
//! and the storage index can relate facts to canonical variants.

use serde::{Deserialize, Serialize};

/// Fabric token used when a line carries no usable fabric type.
pub const FABRIC_FALLBACK: &str = "standard";

/// Canonical matching key for one name/fabric combination.
///
/// `variant_code` is a display/debug key, not a uniqueness guarantee:
/// distinct products whose folded name+fabric concatenation coincides will
/// collide. Comparison logic must use the normalized fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    /// Trimmed, whitespace-collapsed, lowercased product name.
    pub normalized_name: String,
    /// Trimmed, lowercased fabric type; [`FABRIC_FALLBACK`] when absent/empty.
    pub normalized_fabric: String,
    /// Uppercase `NAME_FABRIC` built from the original-cased trimmed inputs,
    /// whitespace runs replaced by a single underscore.
    pub variant_code: String,
}

impl VariantKey {
    /// Derive the key for a raw name and optional fabric type.
    ///
    /// Pure function; never fails. Empty names produce an empty normalized
    /// name (and a code of just `_FABRIC`), which downstream matching treats
    /// like any other key.
    pub fn derive(name: &str, fabric: Option<&str>) -> Self {
        let display_name = collapse_whitespace(name);
        let display_fabric = fabric
            .map(collapse_whitespace)
            .filter(|f| !f.is_empty());

        let normalized_name = display_name.to_lowercase();
        let normalized_fabric = display_fabric
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| FABRIC_FALLBACK.to_string());

        let code_fabric = display_fabric.as_deref().unwrap_or(FABRIC_FALLBACK);
        let variant_code = format!("{display_name}_{code_fabric}")
            .replace(' ', "_")
            .to_uppercase();

        Self {
            normalized_name,
            normalized_fabric,
            variant_code,
        }
    }

    /// Canonical display name for this key's inputs: trimmed and
    /// whitespace-collapsed, original casing preserved.
    pub fn canonical_display(name: &str) -> String {
        collapse_whitespace(name)
    }
}

/// Trim and collapse internal whitespace runs to a single space.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_builds_code_from_original_casing() {
        let key = VariantKey::derive("Mustard Yellow Kurta", Some("Cotton"));
        assert_eq!(key.normalized_name, "mustard yellow kurta");
        assert_eq!(key.normalized_fabric, "cotton");
        assert_eq!(key.variant_code, "MUSTARD_YELLOW_KURTA_COTTON");
    }

    #[test]
    fn whitespace_runs_collapse() {
        let key = VariantKey::derive("  Saree   Mul\tCotton ", None);
        assert_eq!(key.normalized_name, "saree mul cotton");
        assert_eq!(key.variant_code, "SAREE_MUL_COTTON_STANDARD");
    }

    #[test]
    fn absent_or_blank_fabric_falls_back_to_standard() {
        let none = VariantKey::derive("Dress Material", None);
        let blank = VariantKey::derive("Dress Material", Some("   "));
        assert_eq!(none.normalized_fabric, FABRIC_FALLBACK);
        assert_eq!(blank.normalized_fabric, FABRIC_FALLBACK);
        assert_eq!(none.variant_code, "DRESS_MATERIAL_STANDARD");
        assert_eq!(none, blank);
    }

    #[test]
    fn case_and_spacing_variants_normalize_identically() {
        let a = VariantKey::derive("mustard yellow kurta", Some("cotton"));
        let b = VariantKey::derive("MUSTARD  Yellow   KURTA", Some(" Cotton"));
        assert_eq!(a.normalized_name, b.normalized_name);
        assert_eq!(a.normalized_fabric, b.normalized_fabric);
        assert_eq!(a.variant_code, b.variant_code);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: derivation is idempotent — re-deriving from the
            /// normalized name/fabric yields the same normalized fields.
            #[test]
            fn derive_is_idempotent(
                name in "[A-Za-z0-9 ]{0,40}",
                fabric in proptest::option::of("[A-Za-z ]{0,12}")
            ) {
                let first = VariantKey::derive(&name, fabric.as_deref());
                let again = VariantKey::derive(
                    &first.normalized_name,
                    Some(first.normalized_fabric.as_str()),
                );
                prop_assert_eq!(&first.normalized_name, &again.normalized_name);
                prop_assert_eq!(&first.normalized_fabric, &again.normalized_fabric);
            }

            /// Property: normalized name never carries doubled spaces or
            /// leading/trailing whitespace.
            #[test]
            fn normalized_name_is_collapsed(name in "\\PC{0,60}") {
                let key = VariantKey::derive(&name, None);
                prop_assert!(!key.normalized_name.contains("  "));
                prop_assert_eq!(key.normalized_name.trim(), key.normalized_name.as_str());
            }
        }
    }
}
