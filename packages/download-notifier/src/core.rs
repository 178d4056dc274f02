//! Core value types for download notification.
//!
//! # Overview
//!
//! Every entity lives in a store and is addressed by an [`EntityRef`]. Its
//! classification is a primary type plus any number of traits, each named by a
//! [`ClassificationTag`]. The effective classification at dispatch time is a
//! [`ClassificationSet`], computed fresh for every notification because traits
//! can be attached and detached between dispatches.
//!
//! Containers reference their members through typed, directed associations
//! ([`AssociationKind`]).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Store Reference
// =============================================================================

/// Identifies a store (namespace) that entities live in.
///
/// Displayed as `protocol://identifier`, e.g. `workspace://SpacesStore`.
/// Tenant stores carry the tenant in the identifier: `@acme.com@SpacesStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreRef {
    pub protocol: String,
    pub identifier: String,
}

impl StoreRef {
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }

    /// The default content store.
    pub fn workspace() -> Self {
        Self::new("workspace", "SpacesStore")
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

// =============================================================================
// Entity Reference
// =============================================================================

/// Opaque, comparable identifier for a content entity.
///
/// Owned by the external store; this crate only passes references around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub store: StoreRef,
    pub id: String,
}

impl EntityRef {
    pub fn new(store: StoreRef, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }

    /// Reference an entity in the default workspace store.
    pub fn in_workspace(id: impl Into<String>) -> Self {
        Self::new(StoreRef::workspace(), id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

// =============================================================================
// Classification Tag
// =============================================================================

const DOWNLOAD_MODEL_URI: &str = "http://www.alfresco.org/model/download/1.0";

/// Qualified name of a primary type or a trait.
///
/// Displayed in braced form: `{namespace}local_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassificationTag {
    pub namespace: String,
    pub local_name: String,
}

impl ClassificationTag {
    /// Namespace of the wildcard tag. Bindings against it apply to every classification.
    pub const WILDCARD_NAMESPACE: &'static str = "*";

    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// The "any classification" tag.
    pub fn any() -> Self {
        Self::new(Self::WILDCARD_NAMESPACE, "*")
    }

    /// Primary type of a batch download container.
    pub fn download_container() -> Self {
        Self::new(DOWNLOAD_MODEL_URI, "download")
    }

    pub fn is_any(&self) -> bool {
        self.namespace == Self::WILDCARD_NAMESPACE && self.local_name == "*"
    }
}

impl fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

/// Error parsing a [`ClassificationTag`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid classification tag: {0:?}")]
pub struct ParseTagError(pub String);

impl FromStr for ClassificationTag {
    type Err = ParseTagError;

    /// Accepts `{namespace}local` or a bare `local` (empty namespace).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseTagError(s.to_string()));
        }

        let Some(rest) = s.strip_prefix('{') else {
            if s.contains('}') || s.contains(':') {
                return Err(ParseTagError(s.to_string()));
            }
            return Ok(Self::new("", s));
        };

        match rest.split_once('}') {
            Some((namespace, local)) if !local.is_empty() && !local.contains('}') => {
                Ok(Self::new(namespace, local))
            }
            _ => Err(ParseTagError(s.to_string())),
        }
    }
}

// =============================================================================
// Association Kind
// =============================================================================

/// Type of a directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationKind(pub ClassificationTag);

impl AssociationKind {
    /// Edge from a download container to each entity it requests.
    pub fn requested_nodes() -> Self {
        Self(ClassificationTag::new(DOWNLOAD_MODEL_URI, "requestedNodes"))
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// =============================================================================
// Classification Set
// =============================================================================

/// Point-in-time classification of an entity: {primary type} ∪ {traits}.
///
/// Iteration yields the primary type first, then traits in tag order.
/// An entity that no longer exists has the empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationSet {
    primary: Option<ClassificationTag>,
    traits: BTreeSet<ClassificationTag>,
}

impl ClassificationSet {
    pub fn new(primary: ClassificationTag, mut traits: BTreeSet<ClassificationTag>) -> Self {
        // The primary type is never duplicated as a trait.
        traits.remove(&primary);
        Self {
            primary: Some(primary),
            traits,
        }
    }

    /// Classification of a vanished entity.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> Option<&ClassificationTag> {
        self.primary.as_ref()
    }

    pub fn traits(&self) -> &BTreeSet<ClassificationTag> {
        &self.traits
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.traits.is_empty()
    }

    pub fn len(&self) -> usize {
        usize::from(self.primary.is_some()) + self.traits.len()
    }

    pub fn contains(&self, tag: &ClassificationTag) -> bool {
        self.primary.as_ref() == Some(tag) || self.traits.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassificationTag> {
        self.primary.iter().chain(self.traits.iter())
    }
}
