//! Metadata accessors for watched objects.
//!
//! The engine never owns the objects it reconciles. Everything it needs to
//! derive a [`ResourceKey`](crate::core::ResourceKey) is read through
//! [`ObjectMeta`], including through the tombstone left behind when a watch
//! observes a deletion it missed the final state of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Group, version and kind of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group; empty for the core group.
    pub group: String,
    /// API version.
    pub version: String,
    /// Kind.
    pub kind: String,
}

impl GroupVersionKind {
    /// Build a GVK from its parts.
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Pointer from a dependent object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// `group/version` of the owner.
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner. Owners share the dependent's namespace.
    pub name: String,
    /// Set on the single owner that manages the dependent.
    #[serde(default)]
    pub controller: bool,
}

/// Read access to the metadata of a watched object.
pub trait ObjectMeta {
    /// Namespace, `None` for cluster-scoped objects.
    fn namespace(&self) -> Option<&str>;
    /// Object name.
    fn name(&self) -> &str;
    /// Labels attached to the object.
    fn labels(&self) -> &BTreeMap<String, String>;
    /// Owner references attached to the object.
    fn owner_references(&self) -> &[OwnerReference];

    /// The owner reference flagged as controller, if any.
    fn controller_of(&self) -> Option<&OwnerReference> {
        self.owner_references().iter().find(|owner| owner.controller)
    }
}

/// Last known state of an object whose deletion was observed without its
/// final state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedFinalStateUnknown<O> {
    /// Key the object was stored under.
    pub key: String,
    /// Last state seen before the deletion.
    pub obj: O,
}

/// An object as delivered to event handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<O> {
    /// A live object.
    Live(O),
    /// A deleted object's last known state.
    Tombstone(DeletedFinalStateUnknown<O>),
}

impl<O> Observed<O> {
    /// Wrap a deleted object's last known state.
    pub fn tombstone(key: impl Into<String>, obj: O) -> Self {
        Self::Tombstone(DeletedFinalStateUnknown {
            key: key.into(),
            obj,
        })
    }

    /// Returns true for [`Observed::Tombstone`].
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone(_))
    }
}

impl<O> From<O> for Observed<O> {
    fn from(obj: O) -> Self {
        Self::Live(obj)
    }
}

/// Unwrap a tombstone to the object it carries.
pub const fn deletion_handling_accessor<O>(observed: &Observed<O>) -> &O {
    match observed {
        Observed::Live(obj) | Observed::Tombstone(DeletedFinalStateUnknown { obj, .. }) => obj,
    }
}

impl<O: ObjectMeta> ObjectMeta for Observed<O> {
    fn namespace(&self) -> Option<&str> {
        deletion_handling_accessor(self).namespace()
    }

    fn name(&self) -> &str {
        deletion_handling_accessor(self).name()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        deletion_handling_accessor(self).labels()
    }

    fn owner_references(&self) -> &[OwnerReference] {
        deletion_handling_accessor(self).owner_references()
    }
}

/// Plain metadata record, usable directly as a watched object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Namespace, `None` for cluster-scoped objects.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
    /// Labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Owner references.
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectRecord {
    /// Namespace-scoped record.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Cluster-scoped record.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }
}

impl ObjectMeta for ObjectRecord {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn owner_references(&self) -> &[OwnerReference] {
        &self.owner_references
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: "storage.local/v1".into(),
            kind: "LocalVolume".into(),
            name: name.into(),
            controller,
        }
    }

    #[test]
    fn test_group_version() {
        assert_eq!(GroupVersionKind::new("", "v1", "Pod").group_version(), "v1");
        assert_eq!(
            GroupVersionKind::new("apps", "v1", "Deployment").group_version(),
            "apps/v1"
        );
    }

    #[test]
    fn test_controller_of_picks_flagged_owner() {
        let obj = ObjectRecord::new("ns", "child")
            .with_owner(owner("plain", false))
            .with_owner(owner("boss", true));
        assert_eq!(obj.controller_of().map(|o| o.name.as_str()), Some("boss"));

        let orphan = ObjectRecord::new("ns", "child").with_owner(owner("plain", false));
        assert!(orphan.controller_of().is_none());
    }

    #[test]
    fn test_tombstone_delegates_metadata() {
        let live = ObjectRecord::new("ns", "gone").with_label("app", "x");
        let observed = Observed::tombstone("ns/gone", live.clone());
        assert!(observed.is_tombstone());
        assert_eq!(observed.namespace(), Some("ns"));
        assert_eq!(observed.name(), "gone");
        assert_eq!(observed.labels(), live.labels());
        assert_eq!(deletion_handling_accessor(&observed), &live);
    }
}
