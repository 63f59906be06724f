use crate::error::Result;
use std::any::Any;

bitflags::bitflags! {
    /// Deferred-finalization options for a resource.
    ///
    /// An empty set means no driver-side finalize step is required. `NOT_YET`
    /// marks an object whose construction has not progressed far enough to be
    /// finalized; it is cleared once the load completes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FinalizeFlags: u32 {
        /// Object exists but is not ready for finalization yet
        const NOT_YET = 1 << 0;
        /// Finalize must run on the render thread
        const FROM_RENDERER = 1 << 1;
        /// Finalize may run from the test harness
        const FROM_TEST = 1 << 2;
    }
}

impl FinalizeFlags {
    /// True if any finalize category bit is set (ignoring `NOT_YET`)
    pub fn requires_finalize(self) -> bool {
        !self.difference(FinalizeFlags::NOT_YET).is_empty()
    }

    /// True if this resource can be finalized under the caller's `mask`
    pub fn ready_for(self, mask: FinalizeFlags) -> bool {
        !self.contains(FinalizeFlags::NOT_YET) && self.intersects(mask)
    }
}

/// Bookkeeping state shared by every resource
#[derive(Clone, Debug)]
pub struct ResourceMeta {
    resource_type: &'static str,
    resource_id: String,
    loaded: bool,
    finalize: FinalizeFlags,
    /// Id of the resource this one was produced as a byproduct of, if any
    super_id: Option<String>,
}

impl ResourceMeta {
    pub fn new(resource_type: &'static str, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            loaded: false,
            finalize: FinalizeFlags::empty(),
            super_id: None,
        }
    }

    pub fn with_finalize(mut self, flags: FinalizeFlags) -> Self {
        self.finalize = flags;
        self
    }

    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub fn finalize_flags(&self) -> FinalizeFlags {
        self.finalize
    }

    pub fn set_finalize_flags(&mut self, flags: FinalizeFlags) {
        self.finalize = flags;
    }

    /// Clear the `NOT_YET` guard once the object is fully built
    pub fn mark_constructed(&mut self) {
        self.finalize.remove(FinalizeFlags::NOT_YET);
    }

    pub fn super_id(&self) -> Option<&str> {
        self.super_id.as_deref()
    }

    pub fn set_super_id(&mut self, id: Option<String>) {
        self.super_id = id;
    }
}

/// Core trait for any cached engine asset
///
/// Concrete resources embed a [`ResourceMeta`] and expose it through
/// `meta`/`meta_mut`; the lifecycle accessors below are derived from it.
pub trait Resource: Send + Sync + 'static {
    /// Shared bookkeeping state
    fn meta(&self) -> &ResourceMeta;
    fn meta_mut(&mut self) -> &mut ResourceMeta;

    /// Deferred driver-side completion (e.g. GPU upload). Called at most once
    /// per load, from the thread presenting a matching capability mask.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the resource's content, keeping the object alive
    fn unload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Checked downcast support
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Resource {
    pub fn resource_type(&self) -> &'static str {
        self.meta().resource_type()
    }

    pub fn resource_id(&self) -> &str {
        self.meta().resource_id()
    }

    pub fn is_loaded(&self) -> bool {
        self.meta().is_loaded()
    }

    pub fn finalize_flags(&self) -> FinalizeFlags {
        self.meta().finalize_flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_flag_gating() {
        let flags = FinalizeFlags::FROM_RENDERER | FinalizeFlags::NOT_YET;
        assert!(flags.requires_finalize());
        assert!(!flags.ready_for(FinalizeFlags::FROM_RENDERER));

        let ready = FinalizeFlags::FROM_RENDERER;
        assert!(ready.ready_for(FinalizeFlags::FROM_RENDERER));
        assert!(!ready.ready_for(FinalizeFlags::FROM_TEST));
    }

    #[test]
    fn test_no_finalize_required() {
        let flags = FinalizeFlags::empty();
        assert!(!flags.requires_finalize());
        assert!(!flags.ready_for(FinalizeFlags::FROM_RENDERER | FinalizeFlags::FROM_TEST));
    }

    #[test]
    fn test_meta_defaults() {
        let meta = ResourceMeta::new("Texture", "textures/stone.png");
        assert_eq!(meta.resource_type(), "Texture");
        assert_eq!(meta.resource_id(), "textures/stone.png");
        assert!(!meta.is_loaded());
        assert!(meta.super_id().is_none());
    }
}
