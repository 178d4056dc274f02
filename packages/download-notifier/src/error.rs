//! Structured error types for download notification and deferred execution.
//!
//! `NotifierError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Behaviors and deferred work stay on `anyhow` (ergonomic for
//! implementors); the dispatcher wraps their failures with the entity that was
//! being notified.
//!
//! # What Is Not An Error
//!
//! - An entity that vanished before its classification was read. It gets the
//!   empty classification and no behavior fires.
//! - An entity whose classification matches no binding.
//! - Binding the same behavior twice. Bindings are additive.

use thiserror::Error;

use crate::core::EntityRef;

// =============================================================================
// Store Error
// =============================================================================

/// Errors from the external entity store.
///
/// The distinction matters:
/// - [`StoreError::NotFound`] means the entity is gone. Classification
///   resolution recovers from it locally.
/// - [`StoreError::Backend`] means the store itself failed. It propagates.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity does not exist (possibly deleted concurrently).
    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    /// Storage backend failed (timeout, connection, decoding).
    #[error("entity store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err)
    }
}

// =============================================================================
// Transaction Error
// =============================================================================

/// Errors signalled by the transaction host when registering commit callbacks.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// No transaction is active on the calling context.
    #[error("no active transaction to register an after-commit callback with")]
    NoActiveTransaction,

    /// The transaction host failed.
    #[error("transaction host error: {0}")]
    Backend(#[source] anyhow::Error),
}

// =============================================================================
// Notifier Error
// =============================================================================

/// Structured error type for notification and deferral operations.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The entity store failed for a reason other than a missing entity.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bound behavior failed while handling a download of `entity`.
    ///
    /// For containers, members after `entity` were not notified.
    #[error("download behavior failed for {entity}: {source}")]
    Behavior {
        entity: EntityRef,
        #[source]
        source: anyhow::Error,
    },

    /// Deferred work was scheduled outside a transaction.
    ///
    /// This is a programmer error: callers must not retry it.
    #[error("deferred action for {target} scheduled outside an active transaction")]
    NoActiveTransaction { target: EntityRef },

    /// The transaction host rejected the callback registration.
    #[error("failed to register after-commit action for {target}: {source}")]
    Transaction {
        target: EntityRef,
        #[source]
        source: TransactionError,
    },

    /// Deferred work ran and failed.
    #[error("deferred action for {target} failed: {source}")]
    Action {
        target: EntityRef,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl NotifierError {
    /// Returns true for caller-contract violations that must not be retried.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, NotifierError::NoActiveTransaction { .. })
    }
}
