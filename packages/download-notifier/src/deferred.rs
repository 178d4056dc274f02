//! Commit-gated execution of side-effecting work.
//!
//! # Overview
//!
//! Work that must only happen once the enclosing transaction has durably
//! committed (requesting a rendition of a freshly written document, say) is
//! captured as a [`PendingAction`] and handed to a [`DeferredExecutor`].
//!
//! Two interchangeable executors implement the same trait and are selected at
//! assembly time:
//!
//! | Executor                 | When the work runs                 | Work errors          |
//! |--------------------------|------------------------------------|----------------------|
//! | [`TransactionalExecutor`]| after commit, never after rollback | logged (`warn!`)     |
//! | [`ImmediateExecutor`]    | inline, inside the call            | returned to caller   |
//!
//! Both run the same `PendingAction::run`, so the observable effect of the
//! work is identical; only the timing differs.
//!
//! # Guarantees
//!
//! - **At-most-once**: `PendingAction::run` consumes the action.
//! - **No cancellation**: once registered, rollback is the only way work is
//!   dropped, and that is decided by the transaction host.
//! - **One callback per action** is registered with the host.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::EntityRef;
use crate::error::{NotifierError, TransactionError};

// =============================================================================
// Pending Action
// =============================================================================

type Work = Box<dyn FnOnce(EntityRef) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A target entity and the work to perform on it.
///
/// Consumed exactly once by [`PendingAction::run`].
pub struct PendingAction {
    id: Uuid,
    target: EntityRef,
    created_at: DateTime<Utc>,
    work: Work,
}

impl PendingAction {
    /// Capture `work` to be performed on `target`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let renditions = renditions.clone();
    /// let action = PendingAction::new(source, move |source| async move {
    ///     renditions.transform(&source, "doclib").await
    /// });
    /// ```
    pub fn new<F, Fut>(target: EntityRef, work: F) -> Self
    where
        F: FnOnce(EntityRef) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            target,
            created_at: Utc::now(),
            work: Box::new(move |target| work(target).boxed()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &EntityRef {
        &self.target
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Perform the work. The action is gone afterwards.
    pub async fn run(self) -> Result<(), NotifierError> {
        let target = self.target.clone();
        debug!(action_id = %self.id, %target, "running deferred action");
        (self.work)(self.target)
            .await
            .map_err(|source| NotifierError::Action { target, source })
    }
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Transaction Host
// =============================================================================

/// Zero-argument callback fired after a successful commit.
pub type CommitCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// The ambient transaction's commit notification facility.
pub trait TransactionHost: Send + Sync + 'static {
    /// Register `callback` to fire once after the active transaction commits.
    ///
    /// Must not fire on rollback. Returns
    /// [`TransactionError::NoActiveTransaction`] when called outside a
    /// transaction.
    fn on_commit(&self, callback: CommitCallback) -> Result<(), TransactionError>;
}

// =============================================================================
// Deferred Executor
// =============================================================================

/// Runs pending actions once the enclosing transaction's outcome is known.
#[async_trait]
pub trait DeferredExecutor: Send + Sync + 'static {
    /// Schedule `action` to run after the active transaction commits.
    async fn execute_after_commit(&self, action: PendingAction) -> Result<(), NotifierError>;

    /// Capture `work` on `target` and schedule it after commit.
    async fn schedule_after_commit<F, Fut>(
        &self,
        target: EntityRef,
        work: F,
    ) -> Result<(), NotifierError>
    where
        Self: Sized,
        F: FnOnce(EntityRef) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.execute_after_commit(PendingAction::new(target, work))
            .await
    }
}

impl dyn DeferredExecutor {
    /// [`DeferredExecutor::schedule_after_commit`] for a type-erased executor,
    /// such as the one [`NotifierConfig::executor`](crate::NotifierConfig::executor)
    /// returns.
    pub async fn schedule_after_commit<F, Fut>(
        &self,
        target: EntityRef,
        work: F,
    ) -> Result<(), NotifierError>
    where
        F: FnOnce(EntityRef) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.execute_after_commit(PendingAction::new(target, work))
            .await
    }
}

/// Registers each action with the transaction host's commit hook.
pub struct TransactionalExecutor {
    host: Arc<dyn TransactionHost>,
}

impl TransactionalExecutor {
    pub fn new(host: Arc<dyn TransactionHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl DeferredExecutor for TransactionalExecutor {
    async fn execute_after_commit(&self, action: PendingAction) -> Result<(), NotifierError> {
        let target = action.target().clone();
        let action_id = action.id();

        let callback: CommitCallback = Box::new(move || {
            async move {
                // Nobody awaits the outcome after commit.
                if let Err(e) = action.run().await {
                    warn!(%action_id, error = %e, "after-commit action failed");
                }
            }
            .boxed()
        });

        match self.host.on_commit(callback) {
            Ok(()) => {
                debug!(%action_id, %target, "deferred action registered for after commit");
                Ok(())
            }
            Err(TransactionError::NoActiveTransaction) => {
                Err(NotifierError::NoActiveTransaction { target })
            }
            Err(source) => Err(NotifierError::Transaction { target, source }),
        }
    }
}

impl std::fmt::Debug for TransactionalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalExecutor").finish_non_exhaustive()
    }
}

/// Runs each action inline, bypassing the transaction entirely.
///
/// Makes outcomes deterministic in tests without depending on commit timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

#[async_trait]
impl DeferredExecutor for ImmediateExecutor {
    async fn execute_after_commit(&self, action: PendingAction) -> Result<(), NotifierError> {
        action.run().await
    }
}
