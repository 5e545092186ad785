//! In-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::entity::upsert_into;
use super::{ChangeSet, Entity, EntityKind, Filter, Store, StoreError};

/// Process-local store. A change set is applied under one write lock, so
/// readers never observe half of it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<EntityKind, Vec<Entity>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entities`, in order.
    pub fn seeded(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        {
            let mut collections = store
                .collections
                .write()
                .unwrap_or_else(|e| e.into_inner());
            for entity in entities {
                upsert_into(collections.entry(entity.kind()).or_default(), entity);
            }
        }
        store
    }

    /// Number of records of `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Entity>, StoreError> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|entity| filter.matches(entity))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());

        let current: &HashMap<EntityKind, Vec<Entity>> = &collections;
        changes.check_preconditions(|kind| {
            current.get(&kind).map(Vec::as_slice).unwrap_or_default()
        })?;

        for entity in &changes.entities {
            upsert_into(collections.entry(entity.kind()).or_default(), entity.clone());
        }
        Ok(())
    }
}
