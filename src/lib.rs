// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype Resource - Engine resource cache
//!
//! Loads, caches, hot-reloads and finalizes heavyweight engine assets behind
//! stable weak handles. A background worker runs loader bodies off the game
//! thread, failed or in-flight loads fall back to per-type dummy objects,
//! and driver-side finalization is deferred until the render thread presents
//! a matching capability mask.
//!
//! # Quick Start
//!
//! ```no_run
//! use archetype_resource::prelude::*;
//!
//! let manager = ResourceManager::new();
//! archetype_resource::asset_types::register_builtin_types(&manager).unwrap();
//!
//! let texture = manager
//!     .load_resource::<TextureResource>(
//!         Box::new(TextureLoader::new("textures/stone.tex")),
//!         LoadMode::Async,
//!     )
//!     .unwrap();
//!
//! // game loop
//! manager.update(std::time::Duration::from_millis(16));
//! // render thread, once per frame
//! manager.finalize_resources_with_flags(FinalizeFlags::FROM_RENDERER);
//!
//! let _size = texture.read(|t| (t.width(), t.height()));
//! ```

pub mod asset_types;
pub mod handle;
pub mod loader;
pub mod manager;
pub mod prelude;
pub mod resource;
pub mod watch;

mod error;
mod worker;

pub use error::{ResourceError, Result};
pub use handle::{HandleTable, ResourcePtr, SharedResource, TypedPtr};
pub use loader::{LoadMode, ResourceLoader};
pub use manager::{LoadState, ResourceConfig, ResourceManager};
pub use resource::{FinalizeFlags, Resource, ResourceMeta};
pub use watch::{ChangeAction, ChangeWatcher, DirWatcher};

/// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ResourceManager>();
    }
}
