//! # Download Notifier
//!
//! Decides whether, for whom, and when a "downloaded" notification fires.
//!
//! ## Core Concepts
//!
//! - [`EntityRef`] = an entity in some store
//! - [`ClassificationTag`] = a primary type or a trait
//! - [`DownloadBehavior`] = logic bound to a tag, invoked when a matching entity is downloaded
//!
//! An entity's classification is multi-valued: one primary type plus any
//! number of traits attached and detached over its lifetime. Every matching
//! binding fires, not just the first.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► DownloadNotifier::notify(entity)
//!                 │
//!                 ├─ download container? ─► each requested member
//!                 ▼
//!            NamespaceFilter ──excluded──► stop
//!                 │
//!                 ▼
//!            ClassificationResolver   (type ∪ traits, fresh every call)
//!                 │
//!                 ▼
//!            BehaviorRegistry::resolve ─► ComposedBehavior (fan-out)
//!                 │
//!                 ▼
//!            on_download(entity) for each binding
//! ```
//!
//! Orthogonal to dispatch, a [`DeferredExecutor`] runs a [`PendingAction`]
//! once the enclosing transaction commits ([`TransactionalExecutor`]) or
//! inline for tests ([`ImmediateExecutor`]).
//!
//! ## Key Invariants
//!
//! 1. **Classification is never cached** - traits can change between dispatches
//! 2. **Vanished entities are skipped silently** - empty classification, no-op behavior
//! 3. **Containers are expanded, never notified** - members in association order
//! 4. **Excluded namespaces are absolute** - no binding fires, wildcards included
//! 5. **Behavior failures propagate** - fail-fast, no compensation
//! 6. **Deferred work runs at most once** - never after rollback
//!
//! ## Example
//!
//! ```ignore
//! use download_notifier::{BehaviorRegistry, DownloadNotifier, NotifierConfig};
//!
//! let config = NotifierConfig::from_env()?;
//!
//! // 1. Register all bindings during assembly
//! let registry = BehaviorRegistry::new()
//!     .with_behavior(content_type, AuditDownload { audit })
//!     .with_behavior(ClassificationTag::any(), DownloadCounter::default());
//!
//! // 2. Build the notifier; the registry is read-only from here on
//! let notifier = DownloadNotifier::builder(store, registry)
//!     .config(&config)
//!     .build();
//!
//! // 3. Notify when a download is observed
//! notifier.notify(&entity).await?;
//!
//! // 4. Defer work until commit
//! let executor = config.executor(transaction_host);
//! executor.execute_after_commit(PendingAction::new(source, move |source| async move {
//!     renditions.transform(&source).await
//! })).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Not a general pub/sub bus, not a persistence layer, not a transform engine.

mod classify;
mod config;
mod core;
mod deferred;
mod dispatch;
mod error;
mod filter;
mod registry;
mod store;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export core types
pub use crate::core::{
    AssociationKind, ClassificationSet, ClassificationTag, EntityRef, ParseTagError, StoreRef,
};

// Re-export error types
pub use crate::error::{NotifierError, StoreError, TransactionError};

// Re-export collaborator contracts
pub use store::{EntityStore, NamespaceResolver, TenantNamespaceResolver};

// Re-export classification and registry types
pub use classify::ClassificationResolver;
pub use registry::{BehaviorRegistry, ComposedBehavior, DownloadBehavior};

// Re-export filter and dispatcher types
pub use dispatch::{DownloadNotifier, DownloadNotifierBuilder};
pub use filter::NamespaceFilter;

// Re-export deferred execution types
pub use deferred::{
    CommitCallback, DeferredExecutor, ImmediateExecutor, PendingAction, TransactionHost,
    TransactionalExecutor,
};

// Re-export configuration
pub use config::{DeferredMode, NotifierConfig, DEFERRED_MODE_VAR, EXCLUDED_NAMESPACES_VAR};

// Re-export commonly used external types
pub use async_trait::async_trait;
