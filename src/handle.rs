//! Weak, patch-stable resource handles.
//!
//! Every live resource occupies a slot in a [`HandleTable`]. A [`ResourcePtr`]
//! names a slot, not an object: swapping the slot's target (dummy promotion,
//! hot reload) is invisible to holders, who simply observe the new content on
//! their next access. A destroyed slot turns every outstanding handle into a
//! checked `None`, never a dangling pointer.

use crate::resource::Resource;
use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

new_key_type! {
    /// Generational key into a [`HandleTable`]
    pub struct SlotKey;
}

/// Shared ownership of a type-erased resource object
pub type SharedResource = Arc<RwLock<Box<dyn Resource>>>;

/// Slab of resource slots, shared by every handle the manager hands out
#[derive(Default)]
pub struct HandleTable {
    slots: RwLock<SlotMap<SlotKey, SharedResource>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot for `target` and return a handle to it
    pub(crate) fn insert(self: &Arc<Self>, target: SharedResource) -> ResourcePtr {
        let key = self.slots.write().insert(target);
        ResourcePtr {
            table: Arc::clone(self),
            key,
        }
    }

    fn get(&self, key: SlotKey) -> Option<SharedResource> {
        self.slots.read().get(key).cloned()
    }

    /// Atomically repoint the slot at `new_target`; every handle sharing the
    /// slot sees the replacement on its next access. Returns the old target.
    pub(crate) fn replace(&self, key: SlotKey, new_target: SharedResource) -> Option<SharedResource> {
        let mut slots = self.slots.write();
        slots
            .get_mut(key)
            .map(|slot| std::mem::replace(slot, new_target))
    }

    /// Free the slot. Outstanding handles become invalid (get() -> None);
    /// slotmap versioning keeps a reused slot from resurrecting them.
    pub(crate) fn remove(&self, key: SlotKey) -> Option<SharedResource> {
        self.slots.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// Type-erased weak handle to a resource slot.
///
/// Cloneable; compares equal by slot identity, which is preserved across
/// patches.
pub struct ResourcePtr {
    table: Arc<HandleTable>,
    key: SlotKey,
}

impl Clone for ResourcePtr {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            key: self.key,
        }
    }
}

impl PartialEq for ResourcePtr {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Arc::ptr_eq(&self.table, &other.table)
    }
}

impl Eq for ResourcePtr {}

impl Hash for ResourcePtr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for ResourcePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePtr").field("key", &self.key).finish()
    }
}

impl ResourcePtr {
    /// Current target, or `None` if the slot has been destroyed
    pub fn get(&self) -> Option<SharedResource> {
        self.table.get(self.key)
    }

    pub fn is_valid(&self) -> bool {
        self.table.slots.read().contains_key(self.key)
    }

    pub(crate) fn key(&self) -> SlotKey {
        self.key
    }

    /// View this handle as a handle to concrete type `T`.
    ///
    /// In debug builds, asserts that the current target (if any) actually is
    /// a `T`.
    pub fn typed<T: Resource>(&self) -> TypedPtr<T> {
        #[cfg(debug_assertions)]
        if let Some(target) = self.get() {
            let guard = target.read();
            debug_assert!(
                guard.as_any().is::<T>(),
                "handle cast to {} but target is {}",
                std::any::type_name::<T>(),
                guard.resource_type(),
            );
        }
        TypedPtr {
            inner: self.clone(),
            _phantom: PhantomData,
        }
    }
}

/// Typed view over a [`ResourcePtr`]
pub struct TypedPtr<T: Resource> {
    inner: ResourcePtr,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Resource> Clone for TypedPtr<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Resource> PartialEq for TypedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Resource> Eq for TypedPtr<T> {}

impl<T: Resource> fmt::Debug for TypedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedPtr").field("key", &self.inner.key).finish()
    }
}

impl<T: Resource> From<TypedPtr<T>> for ResourcePtr {
    fn from(typed: TypedPtr<T>) -> Self {
        typed.inner
    }
}

impl<T: Resource> TypedPtr<T> {
    pub fn untyped(&self) -> &ResourcePtr {
        &self.inner
    }

    pub fn get(&self) -> Option<SharedResource> {
        self.inner.get()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// Run `f` against the target, downcast to `T`. Returns `None` if the
    /// slot is dead or the target is currently a different concrete type
    /// (e.g. a dummy of another type after a miscast).
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let target = self.inner.get()?;
        let guard = target.read();
        guard.as_any().downcast_ref::<T>().map(f)
    }

    /// Mutable counterpart of [`Self::read`]
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let target = self.inner.get()?;
        let mut guard = target.write();
        guard.as_any_mut().downcast_mut::<T>().map(f)
    }

    /// Re-cast to another concrete resource type (debug-checked)
    pub fn cast<U: Resource>(&self) -> TypedPtr<U> {
        self.inner.typed::<U>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceMeta;
    use std::any::Any;

    struct Blob {
        meta: ResourceMeta,
        payload: u32,
    }

    impl Blob {
        fn shared(id: &str, payload: u32) -> SharedResource {
            Arc::new(RwLock::new(Box::new(Blob {
                meta: ResourceMeta::new("Blob", id),
                payload,
            }) as Box<dyn Resource>))
        }
    }

    impl Resource for Blob {
        fn meta(&self) -> &ResourceMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut ResourceMeta {
            &mut self.meta
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_get_returns_target() {
        let table = Arc::new(HandleTable::new());
        let ptr = table.insert(Blob::shared("a", 1));
        let typed = ptr.typed::<Blob>();
        assert_eq!(typed.read(|b| b.payload), Some(1));
    }

    #[test]
    fn test_replace_is_visible_through_old_handle() {
        let table = Arc::new(HandleTable::new());
        let ptr = table.insert(Blob::shared("a", 1));
        let before = ptr.clone();

        table.replace(ptr.key(), Blob::shared("a", 2));

        assert_eq!(before, ptr);
        assert_eq!(before.typed::<Blob>().read(|b| b.payload), Some(2));
    }

    #[test]
    fn test_remove_invalidates_handles() {
        let table = Arc::new(HandleTable::new());
        let ptr = table.insert(Blob::shared("a", 1));
        let clone = ptr.clone();

        assert!(table.remove(ptr.key()).is_some());

        assert!(!clone.is_valid());
        assert!(clone.get().is_none());
    }

    #[test]
    fn test_slot_reuse_does_not_resurrect() {
        let table = Arc::new(HandleTable::new());
        let stale = table.insert(Blob::shared("a", 1));
        table.remove(stale.key());

        // New slot may reuse the index; the old key's version must not match.
        let fresh = table.insert(Blob::shared("b", 2));
        assert!(stale.get().is_none());
        assert_ne!(stale, fresh);
    }

    #[test]
    fn test_equality_survives_patch() {
        let table = Arc::new(HandleTable::new());
        let ptr = table.insert(Blob::shared("a", 1));
        let copy = ptr.clone();
        table.replace(ptr.key(), Blob::shared("a", 9));
        assert_eq!(ptr, copy);
    }
}
