use crate::error::Result;
use crate::handle::ResourcePtr;
use crate::manager::ResourceManager;
use crate::resource::Resource;

/// Whether `load_resource` may defer work to the loader thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Load on the calling thread; the handle targets the real object on return
    Blocking,
    /// Return a dummy-bound handle immediately; the real object is patched in
    /// by a later `update` tick
    Async,
}

/// Strategy object that knows how to produce and refresh one resource.
///
/// The manager is the only caller of these methods. Loaders may call back
/// into the manager only to register or deregister hot-reload watching, from
/// [`ResourceLoader::post_load`].
pub trait ResourceLoader: Send + 'static {
    /// Type tag used for dummy lookup; must match the produced resource's meta
    fn resource_type(&self) -> &'static str;

    /// Stable identity used for cache dedup, typically a file path
    fn resource_id(&self) -> String;

    /// Produce the resource. `existing` carries the currently installed
    /// object during a reload so state (revisions, reusable buffers) can be
    /// carried over; it is `None` for initial loads.
    fn load(&mut self, existing: Option<&dyn Resource>) -> Result<Box<dyn Resource>>;

    /// Destroy a resource this loader produced
    fn delete_resource(&mut self, resource: Box<dyn Resource>) {
        drop(resource);
    }

    /// Heap-durable copy, used when a loader must outlive the call that
    /// supplied it (hot-reload registry)
    fn box_clone(&self) -> Box<dyn ResourceLoader>;

    /// Invoked once per terminal load/reload outcome, after the handle is
    /// stable. Typical use: register for hot reload. Must be idempotent with
    /// respect to duplicate registration.
    fn post_load(&mut self, _manager: &ResourceManager, _handle: &ResourcePtr) {}
}

impl Clone for Box<dyn ResourceLoader> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
