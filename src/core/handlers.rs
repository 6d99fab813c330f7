//! Event handler combinators.
//!
//! Watches deliver add/update/delete notifications to a
//! [`ResourceEventHandler`]. The helpers here adapt single-object enqueue
//! functions to that shape and gate which objects reach them.

use crate::core::object::{GroupVersionKind, ObjectMeta, Observed};

/// Receives notifications about a watched object type.
pub trait ResourceEventHandler<O>: Send + Sync {
    /// An object was added (or listed for the first time).
    fn on_add(&self, obj: &Observed<O>);
    /// An object changed.
    fn on_update(&self, old: &Observed<O>, new: &Observed<O>);
    /// An object was deleted. May be a tombstone.
    fn on_delete(&self, obj: &Observed<O>);
}

type ObjectFn<O> = Box<dyn Fn(&Observed<O>) + Send + Sync>;
type UpdateFn<O> = Box<dyn Fn(&Observed<O>, &Observed<O>) + Send + Sync>;

/// Handler assembled from optional closures. Missing closures ignore the event.
pub struct EventHandlerFuncs<O> {
    /// Called on add.
    pub add: Option<ObjectFn<O>>,
    /// Called on update with `(old, new)`.
    pub update: Option<UpdateFn<O>>,
    /// Called on delete.
    pub delete: Option<ObjectFn<O>>,
}

impl<O> Default for EventHandlerFuncs<O> {
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<O> ResourceEventHandler<O> for EventHandlerFuncs<O> {
    fn on_add(&self, obj: &Observed<O>) {
        if let Some(add) = &self.add {
            add(obj);
        }
    }

    fn on_update(&self, old: &Observed<O>, new: &Observed<O>) {
        if let Some(update) = &self.update {
            update(old, new);
        }
    }

    fn on_delete(&self, obj: &Observed<O>) {
        if let Some(delete) = &self.delete {
            delete(obj);
        }
    }
}

/// Adapt a single-object function to an update callback that forwards only
/// the new object.
pub fn pass_new<O, F>(f: F) -> impl Fn(&Observed<O>, &Observed<O>) + Send + Sync
where
    F: Fn(&Observed<O>) + Send + Sync,
{
    move |_old: &Observed<O>, new: &Observed<O>| f(new)
}

/// Send adds, updates (new object only) and deletes to `f`.
pub fn handle_all<O, F>(f: F) -> EventHandlerFuncs<O>
where
    O: 'static,
    F: Fn(&Observed<O>) + Send + Sync + Clone + 'static,
{
    EventHandlerFuncs {
        add: Some(Box::new(f.clone())),
        update: Some(Box::new(pass_new(f.clone()))),
        delete: Some(Box::new(f)),
    }
}

/// Forwards only objects accepted by `filter` to `handler`.
///
/// An update whose old object matched and new one does not becomes a delete;
/// the reverse becomes an add.
pub struct FilteringEventHandler<F, H> {
    filter: F,
    handler: H,
}

impl<F, H> FilteringEventHandler<F, H> {
    /// Gate `handler` behind `filter`.
    pub const fn new(filter: F, handler: H) -> Self {
        Self { filter, handler }
    }
}

impl<O, F, H> ResourceEventHandler<O> for FilteringEventHandler<F, H>
where
    F: Fn(&Observed<O>) -> bool + Send + Sync,
    H: ResourceEventHandler<O>,
{
    fn on_add(&self, obj: &Observed<O>) {
        if (self.filter)(obj) {
            self.handler.on_add(obj);
        }
    }

    fn on_update(&self, old: &Observed<O>, new: &Observed<O>) {
        match ((self.filter)(old), (self.filter)(new)) {
            (true, true) => self.handler.on_update(old, new),
            (false, true) => self.handler.on_add(new),
            (true, false) => self.handler.on_delete(old),
            (false, false) => {}
        }
    }

    fn on_delete(&self, obj: &Observed<O>) {
        if (self.filter)(obj) {
            self.handler.on_delete(obj);
        }
    }
}

/// Accept objects whose controlling owner has the given group/version/kind.
pub fn filter<T>(gvk: GroupVersionKind) -> impl Fn(&T) -> bool + Send + Sync + Clone
where
    T: ObjectMeta + ?Sized,
{
    let api_version = gvk.group_version();
    move |obj: &T| {
        obj.controller_of()
            .is_some_and(|owner| owner.api_version == api_version && owner.kind == gvk.kind)
    }
}

/// Accept objects with the given name, in any namespace.
pub fn filter_with_name<T>(name: impl Into<String>) -> impl Fn(&T) -> bool + Send + Sync + Clone
where
    T: ObjectMeta + ?Sized,
{
    let name = name.into();
    move |obj: &T| obj.name() == name
}

/// Accept the object with the given namespace and name.
pub fn filter_with_name_and_namespace<T>(
    namespace: impl Into<String>,
    name: impl Into<String>,
) -> impl Fn(&T) -> bool + Send + Sync + Clone
where
    T: ObjectMeta + ?Sized,
{
    let namespace = namespace.into();
    let name = name.into();
    move |obj: &T| obj.name() == name && obj.namespace().unwrap_or_default() == namespace
}
