//! Download notification dispatcher.
//!
//! The `DownloadNotifier` is responsible for:
//! 1. Expanding a download container into the entities it requests
//! 2. Skipping entities in excluded namespaces
//! 3. Resolving each entity's classification and the behaviors bound to it
//! 4. Invoking those behaviors on the caller's task
//!
//! ```text
//! notify(entity)
//!     │
//!     ├─ container? ──yes──► requestedNodes associations ─┐
//!     │                                                    │ each member, in order
//!     no                                                   │
//!     ▼                                                    ▼
//! notify_entity(entity) ◄──────────────────────────────────┘
//!     │
//!     ├─ NamespaceFilter::is_suppressed ──yes──► stop
//!     ├─ ClassificationResolver::resolve
//!     ├─ BehaviorRegistry::resolve
//!     └─ ComposedBehavior::on_download
//! ```
//!
//! A failing behavior is not caught. For a container, members after the
//! failing one are not notified and members before it stay notified.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::classify::ClassificationResolver;
use crate::config::NotifierConfig;
use crate::core::{AssociationKind, ClassificationTag, EntityRef};
use crate::error::{NotifierError, StoreError};
use crate::filter::NamespaceFilter;
use crate::registry::{BehaviorRegistry, DownloadBehavior};
use crate::store::{EntityStore, NamespaceResolver, TenantNamespaceResolver};

/// Dispatches download notifications to classification-bound behaviors.
///
/// # Example
///
/// ```ignore
/// let registry = BehaviorRegistry::new()
///     .with_behavior(content_type, AuditDownload { audit });
///
/// let notifier = DownloadNotifier::builder(store, registry)
///     .excluded_namespaces(["archive://SpacesStore"])
///     .build();
///
/// notifier.notify(&entity).await?;
/// ```
pub struct DownloadNotifier {
    classifier: ClassificationResolver,
    registry: Arc<BehaviorRegistry>,
    filter: NamespaceFilter,
    container_type: ClassificationTag,
    member_association: AssociationKind,
}

impl DownloadNotifier {
    pub fn builder(
        store: Arc<dyn EntityStore>,
        registry: BehaviorRegistry,
    ) -> DownloadNotifierBuilder {
        DownloadNotifierBuilder::new(store, Arc::new(registry))
    }

    /// Notify behaviors that `entity` was downloaded.
    ///
    /// A download container is never notified itself; each entity it requests
    /// is, in association order.
    #[instrument(skip_all, fields(entity = %entity))]
    pub async fn notify(&self, entity: &EntityRef) -> Result<(), NotifierError> {
        if !self.is_container(entity).await? {
            return self.notify_entity(entity).await;
        }

        let members = match self
            .classifier
            .store()
            .target_associations(entity, &self.member_association)
            .await
        {
            Ok(members) => members,
            // Deleted between the container check and expansion.
            Err(StoreError::NotFound(_)) => {
                debug!("download container vanished before expansion");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        debug!(members = members.len(), "expanding download container");

        for member in &members {
            self.notify_entity(member).await?;
        }
        Ok(())
    }

    /// Single classification lookup. A vanished entity is not a container.
    async fn is_container(&self, entity: &EntityRef) -> Result<bool, NotifierError> {
        let primary = self.classifier.primary_type(entity).await?;
        Ok(primary.as_ref() == Some(&self.container_type))
    }

    async fn notify_entity(&self, entity: &EntityRef) -> Result<(), NotifierError> {
        if self.filter.is_suppressed(entity) {
            debug!(%entity, "download notification suppressed for excluded namespace");
            return Ok(());
        }

        let classification = self.classifier.resolve(entity).await?;
        let behavior = self.registry.resolve(&classification);
        if behavior.is_noop() {
            debug!(%entity, "no download behavior bound to entity classification");
            return Ok(());
        }

        behavior
            .on_download(entity)
            .await
            .map_err(|source| NotifierError::Behavior {
                entity: entity.clone(),
                source,
            })
    }

}

impl std::fmt::Debug for DownloadNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadNotifier")
            .field("registry", &self.registry)
            .field("filter", &self.filter)
            .field("container_type", &self.container_type)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`DownloadNotifier`].
///
/// Defaults: tenant-aware namespace resolution, nothing excluded, the standard
/// download container type and `requestedNodes` association.
pub struct DownloadNotifierBuilder {
    store: Arc<dyn EntityStore>,
    registry: Arc<BehaviorRegistry>,
    resolver: Arc<dyn NamespaceResolver>,
    excluded: HashSet<String>,
    container_type: ClassificationTag,
    member_association: AssociationKind,
}

impl DownloadNotifierBuilder {
    /// Start from an already-shared registry.
    pub fn new(store: Arc<dyn EntityStore>, registry: Arc<BehaviorRegistry>) -> Self {
        Self {
            store,
            registry,
            resolver: Arc::new(TenantNamespaceResolver),
            excluded: HashSet::new(),
            container_type: ClassificationTag::download_container(),
            member_association: AssociationKind::requested_nodes(),
        }
    }

    pub fn namespace_resolver(mut self, resolver: Arc<dyn NamespaceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn excluded_namespaces<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = excluded.into_iter().map(Into::into).collect();
        self
    }

    /// Apply the namespace settings of a loaded configuration.
    pub fn config(mut self, config: &NotifierConfig) -> Self {
        self.excluded = config.excluded_namespaces.clone();
        self
    }

    pub fn container_type(mut self, tag: ClassificationTag) -> Self {
        self.container_type = tag;
        self
    }

    pub fn member_association(mut self, kind: AssociationKind) -> Self {
        self.member_association = kind;
        self
    }

    pub fn build(self) -> DownloadNotifier {
        DownloadNotifier {
            classifier: ClassificationResolver::new(self.store),
            registry: self.registry,
            filter: NamespaceFilter::new(self.resolver, self.excluded),
            container_type: self.container_type,
            member_association: self.member_association,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use async_trait::async_trait;

    use crate::core::StoreRef;
    use crate::testing::{FailingBehavior, InMemoryEntityStore, RecordingBehavior};

    fn tag(local: &str) -> ClassificationTag {
        ClassificationTag::new("urn:test", local)
    }

    fn container(store: &InMemoryEntityStore, id: &str, members: &[&EntityRef]) -> EntityRef {
        let entity = EntityRef::in_workspace(id);
        store.add_entity(&entity, ClassificationTag::download_container());
        for member in members {
            store.add_association(&entity, AssociationKind::requested_nodes(), member);
        }
        entity
    }

    #[tokio::test]
    async fn test_notify_single_entity() {
        let store = Arc::new(InMemoryEntityStore::new());
        let doc = EntityRef::in_workspace("doc");
        store.add_entity(&doc, tag("content"));

        let behavior = RecordingBehavior::new("content");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(tag("content"), behavior.clone()),
        )
        .build();

        notifier.notify(&doc).await.unwrap();
        assert_eq!(behavior.calls(), vec![doc]);
    }

    #[tokio::test]
    async fn test_notify_container_notifies_members_in_order() {
        let store = Arc::new(InMemoryEntityStore::new());
        let a = EntityRef::in_workspace("a");
        let b = EntityRef::in_workspace("b");
        let c = EntityRef::in_workspace("c");
        for e in [&a, &b, &c] {
            store.add_entity(e, tag("content"));
        }
        let zip = container(&store, "zip", &[&c, &a, &b]);

        let behavior = RecordingBehavior::new("content");
        let any = RecordingBehavior::new("any");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new()
                .with_behavior(tag("content"), behavior.clone())
                .with_behavior(ClassificationTag::any(), any.clone()),
        )
        .build();

        notifier.notify(&zip).await.unwrap();

        assert_eq!(behavior.calls(), vec![c.clone(), a.clone(), b.clone()]);
        // The container itself is never notified, not even by wildcards.
        assert_eq!(any.calls(), vec![c, a, b]);
    }

    #[tokio::test]
    async fn test_empty_container_notifies_nothing() {
        let store = Arc::new(InMemoryEntityStore::new());
        let zip = container(&store, "zip", &[]);

        let any = RecordingBehavior::new("any");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(ClassificationTag::any(), any.clone()),
        )
        .build();

        notifier.notify(&zip).await.unwrap();
        assert_eq!(any.call_count(), 0);
    }

    #[tokio::test]
    async fn test_excluded_namespace_invokes_nothing() {
        let store = Arc::new(InMemoryEntityStore::new());
        let archived = EntityRef::new(StoreRef::new("archive", "SpacesStore"), "doc");
        store.add_entity(&archived, tag("content"));
        store.attach_trait(&archived, tag("titled"));

        let behavior = RecordingBehavior::new("content");
        let any = RecordingBehavior::new("any");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new()
                .with_behavior(tag("content"), behavior.clone())
                .with_behavior(tag("titled"), behavior.clone())
                .with_behavior(ClassificationTag::any(), any.clone()),
        )
        .excluded_namespaces(["archive://SpacesStore"])
        .build();

        notifier.notify(&archived).await.unwrap();
        assert_eq!(behavior.call_count(), 0);
        assert_eq!(any.call_count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_entity_is_silently_skipped() {
        let store = Arc::new(InMemoryEntityStore::new());
        let any = RecordingBehavior::new("any");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(ClassificationTag::any(), any.clone()),
        )
        .build();

        notifier.notify(&EntityRef::in_workspace("gone")).await.unwrap();
        assert_eq!(any.call_count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_container_member_is_skipped() {
        let store = Arc::new(InMemoryEntityStore::new());
        let a = EntityRef::in_workspace("a");
        let gone = EntityRef::in_workspace("gone");
        store.add_entity(&a, tag("content"));
        let zip = container(&store, "zip", &[&gone, &a]);

        let behavior = RecordingBehavior::new("content");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(tag("content"), behavior.clone()),
        )
        .build();

        notifier.notify(&zip).await.unwrap();
        assert_eq!(behavior.calls(), vec![a]);
    }

    #[tokio::test]
    async fn test_failing_member_aborts_remaining_members() {
        let store = Arc::new(InMemoryEntityStore::new());
        let a = EntityRef::in_workspace("a");
        let bad = EntityRef::in_workspace("bad");
        let c = EntityRef::in_workspace("c");
        store.add_entity(&a, tag("content"));
        store.add_entity(&bad, tag("content"));
        store.attach_trait(&bad, tag("poisoned"));
        store.add_entity(&c, tag("content"));
        let zip = container(&store, "zip", &[&a, &bad, &c]);

        let behavior = RecordingBehavior::new("content");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new()
                .with_behavior(tag("content"), behavior.clone())
                .with_behavior(tag("poisoned"), FailingBehavior::new("poisoned entity")),
        )
        .build();

        let err = notifier.notify(&zip).await.unwrap_err();
        match &err {
            NotifierError::Behavior { entity, source } => {
                assert_eq!(entity, &bad);
                assert!(source.to_string().contains("poisoned entity"));
            }
            other => panic!("Expected Behavior error, got {:?}", other),
        }

        // `a` stays notified, `bad`'s type binding ran before its trait failed,
        // `c` was never reached.
        assert_eq!(behavior.calls(), vec![a, bad]);
    }

    #[tokio::test]
    async fn test_store_backend_failure_propagates() {
        let store = Arc::new(InMemoryEntityStore::new());
        let doc = EntityRef::in_workspace("doc");
        store.add_entity(&doc, tag("content"));
        store.fail_with("disk on fire");

        let notifier = DownloadNotifier::builder(store, BehaviorRegistry::new()).build();

        let err = notifier.notify(&doc).await.unwrap_err();
        assert!(matches!(err, NotifierError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_custom_container_type_and_association() {
        let store = Arc::new(InMemoryEntityStore::new());
        let a = EntityRef::in_workspace("a");
        store.add_entity(&a, tag("content"));

        let batch = EntityRef::in_workspace("batch");
        let contains = AssociationKind(tag("contains"));
        store.add_entity(&batch, tag("batch"));
        store.add_association(&batch, contains.clone(), &a);

        let behavior = RecordingBehavior::new("content");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(tag("content"), behavior.clone()),
        )
        .container_type(tag("batch"))
        .member_association(contains)
        .build();

        notifier.notify(&batch).await.unwrap();
        assert_eq!(behavior.calls(), vec![a]);
    }

    /// Reports a container that is deleted as soon as its members are read.
    struct VanishingContainerStore {
        container: EntityRef,
    }

    #[async_trait]
    impl EntityStore for VanishingContainerStore {
        async fn primary_type(&self, entity: &EntityRef) -> Result<ClassificationTag, StoreError> {
            if entity == &self.container {
                Ok(ClassificationTag::download_container())
            } else {
                Err(StoreError::NotFound(entity.clone()))
            }
        }

        async fn traits(
            &self,
            entity: &EntityRef,
        ) -> Result<BTreeSet<ClassificationTag>, StoreError> {
            Err(StoreError::NotFound(entity.clone()))
        }

        async fn target_associations(
            &self,
            entity: &EntityRef,
            _kind: &AssociationKind,
        ) -> Result<Vec<EntityRef>, StoreError> {
            Err(StoreError::NotFound(entity.clone()))
        }
    }

    #[tokio::test]
    async fn test_container_deleted_during_expansion_is_skipped() {
        let zip = EntityRef::in_workspace("zip");
        let store = Arc::new(VanishingContainerStore {
            container: zip.clone(),
        });

        let any = RecordingBehavior::new("any");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(ClassificationTag::any(), any.clone()),
        )
        .build();

        notifier.notify(&zip).await.unwrap();
        assert_eq!(any.call_count(), 0);
    }

    #[tokio::test]
    async fn test_container_expansion_backend_failure_propagates() {
        let store = Arc::new(InMemoryEntityStore::new());
        let zip = container(&store, "zip", &[]);
        let notifier = DownloadNotifier::builder(store.clone(), BehaviorRegistry::new()).build();

        store.fail_with("connection reset");
        let err = notifier.notify(&zip).await.unwrap_err();
        assert!(matches!(err, NotifierError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_custom_namespace_resolver() {
        struct ProtocolOnly;
        impl NamespaceResolver for ProtocolOnly {
            fn base_namespace(&self, entity: &EntityRef) -> String {
                entity.store.protocol.clone()
            }
        }

        let store = Arc::new(InMemoryEntityStore::new());
        let versioned = EntityRef::new(StoreRef::new("version", "version2Store"), "v1");
        let doc = EntityRef::in_workspace("doc");
        store.add_entity(&versioned, tag("content"));
        store.add_entity(&doc, tag("content"));

        let behavior = RecordingBehavior::new("content");
        let notifier = DownloadNotifier::builder(
            store,
            BehaviorRegistry::new().with_behavior(tag("content"), behavior.clone()),
        )
        .namespace_resolver(Arc::new(ProtocolOnly))
        .excluded_namespaces(["version"])
        .build();

        notifier.notify(&versioned).await.unwrap();
        notifier.notify(&doc).await.unwrap();
        assert_eq!(behavior.calls(), vec![doc]);
    }
}
