//! Testing utilities for download notification and deferred execution.
//!
//! In-memory stand-ins for the external collaborators plus spy behaviors.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! download-notifier = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use download_notifier::testing::{InMemoryEntityStore, RecordingBehavior};
//!
//! let store = Arc::new(InMemoryEntityStore::new());
//! store.add_entity(&doc, content_type.clone());
//!
//! let spy = RecordingBehavior::new("content");
//! let notifier = DownloadNotifier::builder(
//!     store,
//!     BehaviorRegistry::new().with_behavior(content_type, spy.clone()),
//! )
//! .build();
//!
//! notifier.notify(&doc).await?;
//! assert_eq!(spy.calls(), vec![doc]);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::core::{AssociationKind, ClassificationTag, EntityRef};
use crate::deferred::{CommitCallback, TransactionHost};
use crate::error::{StoreError, TransactionError};
use crate::registry::DownloadBehavior;
use crate::store::EntityStore;

// =============================================================================
// In-Memory Entity Store
// =============================================================================

#[derive(Debug, Clone)]
struct EntityRecord {
    primary: ClassificationTag,
    traits: BTreeSet<ClassificationTag>,
    associations: Vec<(AssociationKind, EntityRef)>,
}

/// Entity store backed by a HashMap.
///
/// Entities can be added, deleted, and reclassified at any time, which lets
/// tests simulate concurrent deletion and trait changes between dispatches.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: Mutex<HashMap<EntityRef, EntityRecord>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an entity with a primary type and no traits.
    pub fn add_entity(&self, entity: &EntityRef, primary: ClassificationTag) {
        self.entities.lock().unwrap().insert(
            entity.clone(),
            EntityRecord {
                primary,
                traits: BTreeSet::new(),
                associations: Vec::new(),
            },
        );
    }

    /// Remove an entity. Later lookups return `NotFound`.
    pub fn delete_entity(&self, entity: &EntityRef) {
        self.entities.lock().unwrap().remove(entity);
    }

    pub fn attach_trait(&self, entity: &EntityRef, tag: ClassificationTag) {
        if let Some(record) = self.entities.lock().unwrap().get_mut(entity) {
            record.traits.insert(tag);
        }
    }

    pub fn detach_trait(&self, entity: &EntityRef, tag: &ClassificationTag) {
        if let Some(record) = self.entities.lock().unwrap().get_mut(entity) {
            record.traits.remove(tag);
        }
    }

    /// Append a `kind` association from `source` to `target`.
    pub fn add_association(&self, source: &EntityRef, kind: AssociationKind, target: &EntityRef) {
        if let Some(record) = self.entities.lock().unwrap().get_mut(source) {
            record.associations.push((kind, target.clone()));
        }
    }

    /// Make every subsequent call fail with a backend error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Stop failing.
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entities.lock().unwrap().contains_key(entity)
    }

    fn record(&self, entity: &EntityRef) -> Result<EntityRecord, StoreError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(StoreError::Backend(anyhow!(message)));
        }
        self.entities
            .lock()
            .unwrap()
            .get(entity)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(entity.clone()))
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn primary_type(&self, entity: &EntityRef) -> Result<ClassificationTag, StoreError> {
        self.record(entity).map(|r| r.primary)
    }

    async fn traits(&self, entity: &EntityRef) -> Result<BTreeSet<ClassificationTag>, StoreError> {
        self.record(entity).map(|r| r.traits)
    }

    async fn target_associations(
        &self,
        entity: &EntityRef,
        kind: &AssociationKind,
    ) -> Result<Vec<EntityRef>, StoreError> {
        Ok(self
            .record(entity)?
            .associations
            .into_iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, target)| target)
            .collect())
    }
}

// =============================================================================
// In-Memory Transaction Host
// =============================================================================

/// Transaction host with explicit begin/commit/rollback.
///
/// Only one transaction is active at a time. `commit` runs the registered
/// callbacks in registration order; `rollback` drops them.
#[derive(Default)]
pub struct InMemoryTransactionHost {
    active: Mutex<Option<Vec<CommitCallback>>>,
}

impl InMemoryTransactionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction. A transaction that is already active is kept.
    pub fn begin(&self) {
        let mut active = self.active.lock().unwrap();
        if active.is_none() {
            *active = Some(Vec::new());
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// Callbacks waiting on the active transaction.
    pub fn pending_callbacks(&self) -> usize {
        self.active.lock().unwrap().as_ref().map_or(0, Vec::len)
    }

    /// Commit the active transaction, then fire its callbacks.
    pub async fn commit(&self) -> Result<(), TransactionError> {
        let callbacks = self
            .active
            .lock()
            .unwrap()
            .take()
            .ok_or(TransactionError::NoActiveTransaction)?;

        for callback in callbacks {
            callback().await;
        }
        Ok(())
    }

    /// Roll back the active transaction. No callback fires.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        self.active
            .lock()
            .unwrap()
            .take()
            .map(|_| ())
            .ok_or(TransactionError::NoActiveTransaction)
    }
}

impl TransactionHost for InMemoryTransactionHost {
    fn on_commit(&self, callback: CommitCallback) -> Result<(), TransactionError> {
        match self.active.lock().unwrap().as_mut() {
            Some(callbacks) => {
                callbacks.push(callback);
                Ok(())
            }
            None => Err(TransactionError::NoActiveTransaction),
        }
    }
}

impl std::fmt::Debug for InMemoryTransactionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransactionHost")
            .field("active", &self.is_active())
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

// =============================================================================
// Spy Behaviors
// =============================================================================

/// Behavior that records every entity it is invoked with.
///
/// Clones share the same record.
#[derive(Debug, Clone)]
pub struct RecordingBehavior {
    name: &'static str,
    calls: Arc<Mutex<Vec<EntityRef>>>,
}

impl RecordingBehavior {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Invoked entities, in invocation order.
    pub fn calls(&self) -> Vec<EntityRef> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn was_called_with(&self, entity: &EntityRef) -> bool {
        self.calls.lock().unwrap().contains(entity)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl DownloadBehavior for RecordingBehavior {
    async fn on_download(&self, entity: &EntityRef) -> Result<()> {
        self.calls.lock().unwrap().push(entity.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Behavior that always fails.
#[derive(Debug, Clone)]
pub struct FailingBehavior {
    message: &'static str,
}

impl FailingBehavior {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl DownloadBehavior for FailingBehavior {
    async fn on_download(&self, _entity: &EntityRef) -> Result<()> {
        Err(anyhow!(self.message))
    }
}
