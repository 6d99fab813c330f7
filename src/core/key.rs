//! Identity of one unit of reconciliation work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::object::ObjectMeta;

/// A namespace/name pair (or a bare name for cluster-scoped resources).
///
/// An empty namespace and an absent one are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawResourceKey")]
pub struct ResourceKey {
    namespace: Option<String>,
    name: String,
}

/// Wire form of [`ResourceKey`]; normalized through [`ResourceKey::new`].
#[derive(Deserialize)]
struct RawResourceKey {
    #[serde(default)]
    namespace: Option<String>,
    name: String,
}

impl From<RawResourceKey> for ResourceKey {
    fn from(raw: RawResourceKey) -> Self {
        Self::new(raw.namespace.unwrap_or_default(), raw.name)
    }
}

impl ResourceKey {
    /// Key for a namespace-scoped resource.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped resource.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of the object itself, read through the metadata accessor.
    pub fn from_object<O>(obj: &O) -> Self
    where
        O: ObjectMeta + ?Sized,
    {
        Self::new(obj.namespace().unwrap_or_default(), obj.name())
    }

    /// Parse the string form produced by [`fmt::Display`].
    ///
    /// Anything without a `/` is a cluster-scoped name.
    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::cluster_scoped(key),
        }
    }

    /// Namespace, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}
