//! Point-in-time classification of entities.

use std::sync::Arc;

use tracing::debug;

use crate::core::{ClassificationSet, ClassificationTag, EntityRef};
use crate::error::StoreError;
use crate::store::EntityStore;

/// Computes an entity's effective classification set.
///
/// Nothing is cached: traits may change between dispatches, so every call
/// queries the store.
pub struct ClassificationResolver {
    store: Arc<dyn EntityStore>,
}

impl ClassificationResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// {primary type} ∪ {current traits}, or the empty set if the entity is gone.
    ///
    /// Backend failures still propagate.
    pub async fn resolve(&self, entity: &EntityRef) -> Result<ClassificationSet, StoreError> {
        let traits = match self.store.traits(entity).await {
            Ok(traits) => traits,
            Err(StoreError::NotFound(_)) => return Ok(vanished(entity)),
            Err(e) => return Err(e),
        };

        match self.store.primary_type(entity).await {
            Ok(primary) => Ok(ClassificationSet::new(primary, traits)),
            Err(StoreError::NotFound(_)) => Ok(vanished(entity)),
            Err(e) => Err(e),
        }
    }

    /// Primary type only, `None` if the entity is gone.
    pub async fn primary_type(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<ClassificationTag>, StoreError> {
        match self.store.primary_type(entity).await {
            Ok(primary) => Ok(Some(primary)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

fn vanished(entity: &EntityRef) -> ClassificationSet {
    debug!(%entity, "entity vanished before classification, treating as unclassified");
    ClassificationSet::empty()
}
