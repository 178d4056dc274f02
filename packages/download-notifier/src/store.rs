//! Contracts for the external collaborators that own entities and namespaces.
//!
//! Nothing here persists anything. The entity store is queried for a point-in-time
//! view of an entity's classification and associations; the namespace resolver
//! maps a store to its canonical base name.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::core::{AssociationKind, ClassificationTag, EntityRef, StoreRef};
use crate::error::StoreError;

// =============================================================================
// Entity Store
// =============================================================================

/// Read-only view over the external entity store.
///
/// Implementations must return [`StoreError::NotFound`] for entities that do
/// not exist, so that callers can tell a vanished entity from a failing store.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// The entity's primary type.
    async fn primary_type(&self, entity: &EntityRef) -> Result<ClassificationTag, StoreError>;

    /// The traits currently attached to the entity.
    async fn traits(&self, entity: &EntityRef) -> Result<BTreeSet<ClassificationTag>, StoreError>;

    /// Targets of the entity's outbound associations of `kind`, in association order.
    async fn target_associations(
        &self,
        entity: &EntityRef,
        kind: &AssociationKind,
    ) -> Result<Vec<EntityRef>, StoreError>;
}

// =============================================================================
// Namespace Resolver
// =============================================================================

/// Maps an entity's store to its canonical base namespace name.
pub trait NamespaceResolver: Send + Sync + 'static {
    fn base_namespace(&self, entity: &EntityRef) -> String;
}

/// Resolves tenant stores to their base store.
///
/// A tenant store identifier has the form `@<tenant>@<base>`; its base
/// namespace is `protocol://<base>`. Other stores resolve to themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantNamespaceResolver;

impl TenantNamespaceResolver {
    const TENANT_SEPARATOR: char = '@';

    pub fn base_store(store: &StoreRef) -> StoreRef {
        let identifier = store
            .identifier
            .strip_prefix(Self::TENANT_SEPARATOR)
            .and_then(|rest| rest.split_once(Self::TENANT_SEPARATOR))
            .map(|(_tenant, base)| base)
            .unwrap_or(&store.identifier);

        StoreRef::new(store.protocol.clone(), identifier)
    }
}

impl NamespaceResolver for TenantNamespaceResolver {
    fn base_namespace(&self, entity: &EntityRef) -> String {
        Self::base_store(&entity.store).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_store_resolves_to_itself() {
        let entity = EntityRef::in_workspace("doc");
        assert_eq!(
            TenantNamespaceResolver.base_namespace(&entity),
            "workspace://SpacesStore"
        );
    }

    #[test]
    fn test_tenant_store_resolves_to_base() {
        let entity = EntityRef::new(StoreRef::new("workspace", "@acme.com@SpacesStore"), "doc");
        assert_eq!(
            TenantNamespaceResolver.base_namespace(&entity),
            "workspace://SpacesStore"
        );
    }

    #[test]
    fn test_malformed_tenant_prefix_is_left_alone() {
        let store = StoreRef::new("archive", "@SpacesStore");
        assert_eq!(TenantNamespaceResolver::base_store(&store), store);
    }
}
