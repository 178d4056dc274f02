use std::collections::HashSet;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dotenvy::dotenv;

use crate::deferred::{DeferredExecutor, ImmediateExecutor, TransactionHost, TransactionalExecutor};
use crate::error::NotifierError;

pub const EXCLUDED_NAMESPACES_VAR: &str = "NOTIFIER_EXCLUDED_NAMESPACES";
pub const DEFERRED_MODE_VAR: &str = "NOTIFIER_DEFERRED_MODE";

/// How deferred actions are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeferredMode {
    /// After the active transaction commits.
    #[default]
    Transactional,
    /// Inline, in the calling context. For tests.
    Immediate,
}

impl FromStr for DeferredMode {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactional" => Ok(DeferredMode::Transactional),
            "immediate" => Ok(DeferredMode::Immediate),
            other => Err(NotifierError::Config {
                message: format!(
                    "{} must be 'transactional' or 'immediate', got {:?}",
                    DEFERRED_MODE_VAR, other
                ),
            }),
        }
    }
}

impl fmt::Display for DeferredMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredMode::Transactional => write!(f, "transactional"),
            DeferredMode::Immediate => write!(f, "immediate"),
        }
    }
}

/// Notifier configuration loaded from environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Base namespaces (`protocol://identifier`) whose entities are never notified.
    pub excluded_namespaces: HashSet<String>,
    pub deferred_mode: DeferredMode,
}

impl NotifierConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, NotifierError> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotifierError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let excluded_namespaces = lookup(EXCLUDED_NAMESPACES_VAR)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let deferred_mode = match lookup(DEFERRED_MODE_VAR) {
            Some(raw) => raw.parse()?,
            None => DeferredMode::default(),
        };

        Ok(Self {
            excluded_namespaces,
            deferred_mode,
        })
    }

    /// The deferred executor selected by `deferred_mode`.
    pub fn executor(&self, host: Arc<dyn TransactionHost>) -> Arc<dyn DeferredExecutor> {
        match self.deferred_mode {
            DeferredMode::Transactional => Arc::new(TransactionalExecutor::new(host)),
            DeferredMode::Immediate => Arc::new(ImmediateExecutor),
        }
    }
}
