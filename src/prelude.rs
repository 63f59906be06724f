//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_resource::prelude::*;
//! ```

pub use crate::asset_types::{
    AudioLoader, AudioResource, DataLoader, DataResource, TextureLoader, TextureResource,
};
pub use crate::error::{ResourceError, Result};
pub use crate::handle::{ResourcePtr, TypedPtr};
pub use crate::loader::{LoadMode, ResourceLoader};
pub use crate::manager::{LoadState, ResourceConfig, ResourceManager};
pub use crate::resource::{FinalizeFlags, Resource, ResourceMeta};
pub use crate::watch::{ChangeAction, ChangeWatcher, DirWatcher};
