//! Behavior bindings keyed by classification tag.
//!
//! # Overview
//!
//! A [`DownloadBehavior`] is the one-method capability invoked when an entity is
//! downloaded. Behaviors are bound to a [`ClassificationTag`] in a
//! [`BehaviorRegistry`] during assembly; after that the registry is shared
//! read-only with the dispatcher.
//!
//! # Resolution
//!
//! An entity's classification is multi-valued, so resolution is a fan-out, not
//! a first match. [`BehaviorRegistry::resolve`] collects, in order:
//!
//! 1. bindings for the primary type
//! 2. bindings for each trait, in tag order
//! 3. wildcard bindings (`ClassificationTag::any()`)
//!
//! and composes them into one [`ComposedBehavior`] that invokes each binding
//! once. Bindings are additive: binding the same behavior twice under a tag
//! means it runs twice.
//!
//! # Example
//!
//! ```ignore
//! use download_notifier::{BehaviorRegistry, ClassificationTag, DownloadBehavior};
//!
//! struct AuditDownload { audit: AuditClient }
//!
//! #[async_trait::async_trait]
//! impl DownloadBehavior for AuditDownload {
//!     async fn on_download(&self, entity: &EntityRef) -> anyhow::Result<()> {
//!         self.audit.record("download", entity).await
//!     }
//! }
//!
//! let registry = BehaviorRegistry::new()
//!     .with_behavior(content_type, AuditDownload { audit })
//!     .with_behavior(ClassificationTag::any(), DownloadCounter::default());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use smallvec::SmallVec;
use tracing::trace;

use crate::core::{ClassificationSet, ClassificationTag, EntityRef};

// =============================================================================
// Download Behavior
// =============================================================================

/// Logic invoked when an entity with a matching classification is downloaded.
#[async_trait]
pub trait DownloadBehavior: Send + Sync + 'static {
    /// Called once per matching binding for each downloaded entity.
    ///
    /// Errors propagate to the caller of the dispatch.
    async fn on_download(&self, entity: &EntityRef) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type Bindings = SmallVec<[Arc<dyn DownloadBehavior>; 1]>;

// =============================================================================
// Behavior Registry
// =============================================================================

/// Mapping from classification tag to the behaviors bound to it.
#[derive(Default)]
pub struct BehaviorRegistry {
    bindings: HashMap<ClassificationTag, Bindings>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a behavior to a tag. Existing bindings are kept.
    pub fn register(&mut self, tag: ClassificationTag, behavior: Arc<dyn DownloadBehavior>) {
        self.bindings.entry(tag).or_default().push(behavior);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_behavior<B: DownloadBehavior>(
        mut self,
        tag: ClassificationTag,
        behavior: B,
    ) -> Self {
        self.register(tag, Arc::new(behavior));
        self
    }

    /// Builder form of [`register`](Self::register) for a shared behavior.
    pub fn with_shared_behavior(
        mut self,
        tag: ClassificationTag,
        behavior: Arc<dyn DownloadBehavior>,
    ) -> Self {
        self.register(tag, behavior);
        self
    }

    /// Compose every binding that applies to `classification`.
    ///
    /// An empty classification (vanished entity) resolves to the no-op
    /// behavior; wildcard bindings only apply to entities that exist.
    pub fn resolve(&self, classification: &ClassificationSet) -> ComposedBehavior {
        if classification.is_empty() {
            return ComposedBehavior::noop();
        }

        let behaviors: Vec<_> = classification
            .iter()
            .filter(|tag| !tag.is_any())
            .chain(std::iter::once(&ClassificationTag::any()))
            .filter_map(|tag| self.bindings.get(tag))
            .flat_map(|bindings| bindings.iter().cloned())
            .collect();

        ComposedBehavior { behaviors }
    }

    /// Number of bindings for exactly this tag.
    pub fn bindings_for(&self, tag: &ClassificationTag) -> usize {
        self.bindings.get(tag).map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Total number of bindings across all tags.
    pub fn len(&self) -> usize {
        self.bindings.values().map(|b| b.len()).sum()
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("tag_count", &self.bindings.len())
            .field("binding_count", &self.len())
            .finish()
    }
}

// =============================================================================
// Composed Behavior
// =============================================================================

/// Fan-out over every binding that matched one classification set.
///
/// Invocation is sequential and fail-fast: the first failing binding stops
/// the rest.
#[derive(Clone, Default)]
pub struct ComposedBehavior {
    behaviors: Vec<Arc<dyn DownloadBehavior>>,
}

impl ComposedBehavior {
    /// Behavior that does nothing when invoked.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

#[async_trait]
impl DownloadBehavior for ComposedBehavior {
    async fn on_download(&self, entity: &EntityRef) -> Result<()> {
        for behavior in &self.behaviors {
            trace!(%entity, behavior = behavior.name(), "invoking download behavior");
            behavior.on_download(entity).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "composed"
    }
}

impl std::fmt::Debug for ComposedBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.behaviors.iter().map(|b| b.name()).collect();
        f.debug_struct("ComposedBehavior")
            .field("behaviors", &names)
            .finish()
    }
}
