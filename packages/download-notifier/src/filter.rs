//! Namespace-based suppression of download notifications.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::EntityRef;
use crate::store::{NamespaceResolver, TenantNamespaceResolver};

/// Decides whether notifications for an entity are suppressed by its namespace.
///
/// The entity's store is mapped to its base namespace (so every tenant of an
/// excluded store is excluded too) and checked against the excluded set.
#[derive(Clone)]
pub struct NamespaceFilter {
    resolver: Arc<dyn NamespaceResolver>,
    excluded: HashSet<String>,
}

impl NamespaceFilter {
    pub fn new(resolver: Arc<dyn NamespaceResolver>, excluded: HashSet<String>) -> Self {
        Self { resolver, excluded }
    }

    /// Tenant-aware filter over the given excluded base namespaces.
    pub fn excluding<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Arc::new(TenantNamespaceResolver),
            excluded.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_suppressed(&self, entity: &EntityRef) -> bool {
        if self.excluded.is_empty() {
            return false;
        }
        self.excluded.contains(&self.resolver.base_namespace(entity))
    }

    pub fn excluded(&self) -> &HashSet<String> {
        &self.excluded
    }
}

impl Default for NamespaceFilter {
    /// Excludes nothing.
    fn default() -> Self {
        Self::excluding(Vec::<String>::new())
    }
}

impl std::fmt::Debug for NamespaceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceFilter")
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}
