//! Variant storage abstractions.
//!
//! One table of variant rows keyed by a stable id, with a secondary
//! non-unique index on `variant_code` for fast-path matching. The in-memory
//! implementation serves tests/dev; a database-backed implementation must
//! provide per-row transactional semantics (see `StockLedger` docs).

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use threadstock_core::VariantId;

use crate::variant::InventoryVariant;

/// Storage for inventory variant rows.
pub trait VariantStore: Send + Sync {
    fn get(&self, id: VariantId) -> Option<InventoryVariant>;
    /// Ids of all variants carrying this code, oldest first. Non-unique:
    /// code collisions are a documented property of the scheme.
    fn find_by_code(&self, code: &str) -> Vec<VariantId>;
    /// All variants, oldest first.
    fn list(&self) -> Vec<InventoryVariant>;
    fn upsert(&self, variant: InventoryVariant);
    /// Remove a row (merge support); returns whether it existed.
    fn remove(&self, id: VariantId) -> bool;
}

impl<S> VariantStore for Arc<S>
where
    S: VariantStore + ?Sized,
{
    fn get(&self, id: VariantId) -> Option<InventoryVariant> {
        (**self).get(id)
    }

    fn find_by_code(&self, code: &str) -> Vec<VariantId> {
        (**self).find_by_code(code)
    }

    fn list(&self) -> Vec<InventoryVariant> {
        (**self).list()
    }

    fn upsert(&self, variant: InventoryVariant) {
        (**self).upsert(variant)
    }

    fn remove(&self, id: VariantId) -> bool {
        (**self).remove(id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<VariantId, InventoryVariant>,
    by_code: HashMap<String, BTreeSet<VariantId>>,
}

/// In-memory variant store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryVariantStore {
    inner: RwLock<Inner>,
}

impl InMemoryVariantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariantStore for InMemoryVariantStore {
    fn get(&self, id: VariantId) -> Option<InventoryVariant> {
        let inner = self.inner.read().ok()?;
        inner.records.get(&id).cloned()
    }

    fn find_by_code(&self, code: &str) -> Vec<VariantId> {
        let inner = match self.inner.read() {
            Ok(i) => i,
            Err(_) => return vec![],
        };
        inner
            .by_code
            .get(code)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn list(&self) -> Vec<InventoryVariant> {
        let inner = match self.inner.read() {
            Ok(i) => i,
            Err(_) => return vec![],
        };
        let mut all: Vec<_> = inner.records.values().cloned().collect();
        all.sort_by_key(|v| v.id);
        all
    }

    fn upsert(&self, variant: InventoryVariant) {
        if let Ok(mut inner) = self.inner.write() {
            // Keep the code index in step when an upsert rewrites the code.
            let old_code = inner
                .records
                .get(&variant.id)
                .map(|old| old.variant_code.clone())
                .filter(|code| *code != variant.variant_code);
            if let Some(old_code) = old_code {
                if let Some(ids) = inner.by_code.get_mut(&old_code) {
                    ids.remove(&variant.id);
                    if ids.is_empty() {
                        inner.by_code.remove(&old_code);
                    }
                }
            }
            inner
                .by_code
                .entry(variant.variant_code.clone())
                .or_default()
                .insert(variant.id);
            inner.records.insert(variant.id, variant);
        }
    }

    fn remove(&self, id: VariantId) -> bool {
        if let Ok(mut inner) = self.inner.write() {
            match inner.records.remove(&id) {
                Some(old) => {
                    if let Some(ids) = inner.by_code.get_mut(&old.variant_code) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            inner.by_code.remove(&old.variant_code);
                        }
                    }
                    true
                }
                None => false,
            }
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::MarkupPolicy;
    use chrono::Utc;
    use threadstock_catalog::VariantKey;

    fn variant(name: &str, fabric: Option<&str>) -> InventoryVariant {
        let key = VariantKey::derive(name, fabric);
        InventoryVariant::from_inbound(
            &key,
            name,
            fabric,
            BTreeSet::new(),
            1,
            100,
            &MarkupPolicy::default(),
            Utc::now(),
        )
    }

    #[test]
    fn code_index_tracks_upserts_and_removes() {
        let store = InMemoryVariantStore::new();
        let v = variant("Plain Kurta", Some("Cotton"));
        let id = v.id;
        store.upsert(v.clone());

        assert_eq!(store.find_by_code("PLAIN_KURTA_COTTON"), vec![id]);

        // Rewriting the code moves the index entry.
        let mut renamed = v;
        renamed.variant_code = "PLAIN_KURTA_STANDARD".to_string();
        store.upsert(renamed);
        assert!(store.find_by_code("PLAIN_KURTA_COTTON").is_empty());
        assert_eq!(store.find_by_code("PLAIN_KURTA_STANDARD"), vec![id]);

        assert!(store.remove(id));
        assert!(store.find_by_code("PLAIN_KURTA_STANDARD").is_empty());
        assert!(!store.remove(id));
    }

    #[test]
    fn code_index_is_non_unique() {
        let store = InMemoryVariantStore::new();
        let a = variant("Plain Kurta", Some("Cotton"));
        let b = variant("Plain  Kurta", Some("cotton"));
        let (id_a, id_b) = (a.id, b.id);
        store.upsert(a);
        store.upsert(b);

        // Both normalize to the same code; the index keeps both, oldest first.
        assert_eq!(store.find_by_code("PLAIN_KURTA_COTTON"), vec![id_a, id_b]);
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = InMemoryVariantStore::new();
        let a = variant("A Kurta", None);
        let b = variant("B Kurta", None);
        store.upsert(b.clone());
        store.upsert(a.clone());

        let ids: Vec<_> = store.list().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
