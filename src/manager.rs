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

//! Central resource manager.
//!
//! Coordinates the whole resource lifecycle: type registry with dummy
//! fallbacks, blocking and asynchronous load paths, the pending-patch and
//! pending-finalize queues, hot-reload bookkeeping keyed by normalized file
//! path, and deletion.
//!
//! Threading: the game thread issues loads and drives [`ResourceManager::update`],
//! one background worker runs loader bodies, and the render thread calls
//! [`ResourceManager::finalize_resources_with_flags`]. The cache, the two
//! queues and the reload registry each sit behind their own lock; entries are
//! always moved out of a lock before loader callbacks run.

use crate::error::{ResourceError, Result};
use crate::handle::{HandleTable, ResourcePtr, SharedResource, TypedPtr};
use crate::loader::{LoadMode, ResourceLoader};
use crate::resource::{FinalizeFlags, Resource};
use crate::watch::{normalize_path, ChangeAction, ChangeWatcher};
use crate::worker::LoaderWorker;
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tunables for hot-reload polling and retry behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Interval between file-change polls, independent of frame rate
    pub poll_interval_ms: u64,
    /// Open retries for a changed file another process still holds open
    pub reload_retry_count: u32,
    /// Delay between open retries
    pub reload_retry_delay_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            reload_retry_count: 10,
            reload_retry_delay_ms: 100,
        }
    }
}

impl ResourceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ResourceError::ConfigError(e.to_string()))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load progress of a cache entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    /// Handle is bound to the dummy while the real object is produced
    Pending,
    Loaded,
    /// Load failed terminally; handle stays on the dummy
    Failed,
}

pub(crate) enum PatchKind {
    Initial,
    Reload,
}

/// A produced (or failed) load waiting to be applied on the game thread
pub(crate) struct PatchEntry {
    pub ptr: ResourcePtr,
    /// `None` marks a failed load
    pub resource: Option<Box<dyn Resource>>,
    pub loader: Box<dyn ResourceLoader>,
    pub finalized: bool,
    pub kind: PatchKind,
}

impl PatchEntry {
    fn ready_to_apply(&self) -> bool {
        if !self.ptr.is_valid() {
            return true; // deleted mid-flight, apply() discards it
        }
        match &self.resource {
            None => true,
            Some(resource) => {
                self.finalized || !resource.meta().finalize_flags().requires_finalize()
            }
        }
    }
}

/// Queues shared between the manager and the loader worker
#[derive(Default)]
pub(crate) struct PendingQueues {
    pub patch: Mutex<Vec<PatchEntry>>,
    /// Installed resources (blocking loads) still awaiting driver finalize
    pub finalize: Mutex<Vec<ResourcePtr>>,
}

struct CacheEntry {
    ptr: ResourcePtr,
    state: LoadState,
    /// The heap copy of the loader that produced (or failed to produce) the
    /// resource; used for deletion. Absent while a load is in flight.
    loader: Option<Box<dyn ResourceLoader>>,
}

struct ReloadEntry {
    /// Taken while a reload for this path is running
    loader: Option<Box<dyn ResourceLoader>>,
    ptr: ResourcePtr,
    /// Poll tick of the last processed change, for duplicate-notification dedup
    last_tick: u64,
}

struct PollState {
    accumulator: Duration,
    tick: u64,
}

/// Central coordinator for resource loading, caching, hot reload and
/// finalization. Shared across threads behind an `Arc`; every method takes
/// `&self`.
pub struct ResourceManager {
    table: Arc<HandleTable>,
    /// Write-once per type at init, read-only afterwards
    dummies: RwLock<AHashMap<&'static str, SharedResource>>,
    cache: Mutex<AHashMap<String, CacheEntry>>,
    pending: Arc<PendingQueues>,
    reload_registry: Mutex<AHashMap<String, ReloadEntry>>,
    watcher: Mutex<Option<Box<dyn ChangeWatcher>>>,
    poll: Mutex<PollState>,
    worker: LoaderWorker,
    config: ResourceConfig,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::with_config(ResourceConfig::default())
    }

    pub fn with_config(config: ResourceConfig) -> Self {
        let pending = Arc::new(PendingQueues::default());
        Self {
            table: Arc::new(HandleTable::new()),
            dummies: RwLock::new(AHashMap::new()),
            cache: Mutex::new(AHashMap::new()),
            pending: Arc::clone(&pending),
            reload_registry: Mutex::new(AHashMap::new()),
            watcher: Mutex::new(None),
            poll: Mutex::new(PollState {
                accumulator: Duration::ZERO,
                tick: 0,
            }),
            worker: LoaderWorker::spawn(pending),
            config,
        }
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Install the file-change collaborator polled by [`Self::update`]
    pub fn set_watcher(&self, watcher: Box<dyn ChangeWatcher>) {
        *self.watcher.lock() = Some(watcher);
    }

    /// Register the singleton dummy for a resource type. The type name is
    /// taken from the dummy's meta. Registering a type twice is an engine
    /// integration bug.
    pub fn register_resource_type(&self, dummy: Box<dyn Resource>) -> Result<()> {
        let name = dummy.meta().resource_type();
        let mut dummies = self.dummies.write();
        if dummies.contains_key(name) {
            debug_assert!(false, "resource type {name} registered twice");
            error!("resource type {name} registered twice");
            return Err(ResourceError::DuplicateType(name.to_string()));
        }
        dummies.insert(name, Arc::new(RwLock::new(dummy)));
        Ok(())
    }

    /// The registered dummy for `resource_type`, if any
    pub fn dummy(&self, resource_type: &str) -> Option<SharedResource> {
        self.dummies.read().get(resource_type).cloned()
    }

    fn is_dummy(&self, target: &SharedResource) -> bool {
        let ty = target.read().resource_type();
        self.dummies
            .read()
            .get(ty)
            .is_some_and(|d| Arc::ptr_eq(d, target))
    }

    /// Load (or fetch the cached) resource identified by the loader.
    ///
    /// Never yields a missing resource: a cache miss binds the handle to the
    /// type's dummy until the real object is produced, and a failed load
    /// leaves it there. Errors are reserved for integration bugs (empty id,
    /// unregistered type).
    pub fn load_resource<T: Resource>(
        &self,
        loader: Box<dyn ResourceLoader>,
        mode: LoadMode,
    ) -> Result<TypedPtr<T>> {
        let id = normalize_path(&loader.resource_id());
        if id.is_empty() {
            debug_assert!(false, "loader reported an empty resource id");
            return Err(ResourceError::EmptyResourceId);
        }
        let ty = loader.resource_type();
        let Some(dummy) = self.dummy(ty) else {
            debug_assert!(false, "resource type {ty} not registered");
            return Err(ResourceError::UnregisteredType(ty.to_string()));
        };

        // Lookup-and-insert under one lock: the first request for an id owns
        // its slot until explicit deletion.
        let ptr = {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&id) {
                debug!(%id, "resource already cached, reusing handle");
                return Ok(entry.ptr.typed::<T>());
            }
            let ptr = self.table.insert(dummy);
            cache.insert(
                id.clone(),
                CacheEntry {
                    ptr: ptr.clone(),
                    state: LoadState::Pending,
                    loader: None,
                },
            );
            ptr
        };

        match mode {
            LoadMode::Async => self.worker.enqueue(ptr.clone(), loader),
            LoadMode::Blocking => self.load_blocking(&id, &ptr, loader),
        }
        Ok(ptr.typed::<T>())
    }

    fn load_blocking(&self, id: &str, ptr: &ResourcePtr, mut loader: Box<dyn ResourceLoader>) {
        match loader.load(None) {
            Ok(mut resource) => {
                resource.meta_mut().mark_constructed();
                resource.meta_mut().set_loaded(true);
                let needs_finalize = resource.meta().finalize_flags().requires_finalize();
                self.table
                    .replace(ptr.key(), Arc::new(RwLock::new(resource)));
                if needs_finalize {
                    self.pending.finalize.lock().push(ptr.clone());
                }
                loader.post_load(self, ptr);
                self.settle(id, LoadState::Loaded, loader);
                debug!(%id, "resource loaded");
            }
            Err(err) => {
                error!(%id, "resource load failed, falling back to dummy: {err}");
                loader.post_load(self, ptr);
                self.settle(id, LoadState::Failed, loader);
            }
        }
    }

    fn settle(&self, id: &str, state: LoadState, loader: Box<dyn ResourceLoader>) {
        if let Some(entry) = self.cache.lock().get_mut(id) {
            entry.state = state;
            entry.loader = Some(loader);
        }
    }

    /// Load progress of the entry owning `handle`, if any
    pub fn load_state(&self, handle: &ResourcePtr) -> Option<LoadState> {
        self.cache
            .lock()
            .values()
            .find(|e| e.ptr == *handle)
            .map(|e| e.state)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Game-thread tick: applies finished loads and polls for file changes.
    pub fn update(&self, elapsed: Duration) {
        self.drain_patch_queue();
        self.poll_watcher(elapsed);
    }

    fn drain_patch_queue(&self) {
        // Move ready entries out of the lock before any loader callback runs.
        // Swap-remove: no ordering guarantee among pending entries.
        let ready: Vec<PatchEntry> = {
            let mut patch = self.pending.patch.lock();
            let mut ready = Vec::new();
            let mut i = 0;
            while i < patch.len() {
                if patch[i].ready_to_apply() {
                    ready.push(patch.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            ready
        };
        for entry in ready {
            self.apply_patch(entry);
        }
    }

    fn apply_patch(&self, entry: PatchEntry) {
        let PatchEntry {
            ptr,
            resource,
            mut loader,
            kind,
            ..
        } = entry;

        // Deleted while the load was in flight: discard the produced object.
        if !ptr.is_valid() {
            if let Some(resource) = resource {
                debug!(
                    id = %loader.resource_id(),
                    "discarding load result for a deleted resource"
                );
                loader.delete_resource(resource);
            }
            return;
        }

        let id = normalize_path(&loader.resource_id());
        match resource {
            None => {
                // The worker already logged the failure.
                debug!(%id, "handle stays on the dummy resource");
                loader.post_load(self, &ptr);
                self.settle(&id, LoadState::Failed, loader);
            }
            Some(mut resource) => {
                resource.meta_mut().set_loaded(true);
                // Promotion from dummy and in-place reload are both a slot
                // retarget; every holder's handle keeps its identity. The
                // superseded object is destroyed once its last direct
                // reference drops.
                self.table
                    .replace(ptr.key(), Arc::new(RwLock::new(resource)));
                loader.post_load(self, &ptr);
                match kind {
                    PatchKind::Initial => {
                        self.settle(&id, LoadState::Loaded, loader);
                        debug!(%id, "resource patched in");
                    }
                    PatchKind::Reload => {
                        // Hand the loader back to the reload registry unless
                        // post_load already re-registered a fresh copy.
                        let mut registry = self.reload_registry.lock();
                        if let Some(entry) = registry
                            .values_mut()
                            .find(|e| e.ptr == ptr && e.loader.is_none())
                        {
                            entry.loader = Some(loader);
                        }
                        info!(%id, "resource hot-reloaded");
                    }
                }
            }
        }
    }

    /// Render-thread call: finalize every pending resource whose options
    /// lack `NOT_YET` and intersect `flags`. Each resource is finalized at
    /// most once.
    pub fn finalize_resources_with_flags(&self, flags: FinalizeFlags) {
        // Installed resources first (blocking loads).
        let due: Vec<ResourcePtr> = {
            let mut queue = self.pending.finalize.lock();
            let mut due = Vec::new();
            let mut i = 0;
            while i < queue.len() {
                let take = match queue[i].get() {
                    Some(target) => target.read().finalize_flags().ready_for(flags),
                    None => true, // deleted; drop the stale entry
                };
                if take {
                    due.push(queue.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            due
        };
        for ptr in due {
            let Some(target) = ptr.get() else { continue };
            let mut guard = target.write();
            if !guard.finalize_flags().ready_for(flags) {
                continue;
            }
            if let Err(err) = guard.finalize() {
                error!(id = %guard.resource_id(), "finalize failed: {err}");
            }
            guard.meta_mut().set_finalize_flags(FinalizeFlags::empty());
        }

        // Loads still waiting in the patch queue: finalize in place and mark
        // the entry; queue membership is update()'s business.
        let mut patch = self.pending.patch.lock();
        for entry in patch.iter_mut() {
            if entry.finalized {
                continue;
            }
            let Some(resource) = entry.resource.as_mut() else {
                continue;
            };
            if resource.meta().finalize_flags().ready_for(flags) {
                if let Err(err) = resource.finalize() {
                    error!(
                        id = %resource.meta().resource_id(),
                        "finalize failed: {err}"
                    );
                }
                resource.meta_mut().set_finalize_flags(FinalizeFlags::empty());
                entry.finalized = true;
            }
        }
    }

    /// Delete the resource owned by `handle`.
    ///
    /// No-op for handles without a cache entry (dummy-bound or foreign).
    /// Pending work referencing the handle is purged; an async load still in
    /// flight completes and its result is then discarded.
    pub fn delete_resource(&self, handle: &ResourcePtr) {
        let removed = {
            let mut cache = self.cache.lock();
            let id = cache
                .iter()
                .find(|(_, e)| e.ptr == *handle)
                .map(|(id, _)| id.clone());
            id.and_then(|id| cache.remove(&id).map(|entry| (id, entry)))
        };
        let Some((id, entry)) = removed else {
            debug!("delete requested for an unmanaged handle");
            return;
        };

        // Purge pending patches, destroying any already-produced replacement.
        let stale: Vec<PatchEntry> = {
            let mut patch = self.pending.patch.lock();
            let mut stale = Vec::new();
            let mut i = 0;
            while i < patch.len() {
                if patch[i].ptr == *handle {
                    stale.push(patch.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            stale
        };
        for mut e in stale {
            if let Some(resource) = e.resource.take() {
                e.loader.delete_resource(resource);
            }
        }
        self.pending.finalize.lock().retain(|p| p != handle);
        self.reload_registry.lock().retain(|_, e| e.ptr != *handle);

        // Free the slot so late patch entries and stale handles read None.
        if let Some(target) = self.table.remove(handle.key()) {
            if !self.is_dummy(&target) {
                {
                    let mut guard = target.write();
                    if guard.is_loaded() {
                        if let Err(err) = guard.unload() {
                            warn!(%id, "unload failed: {err}");
                        }
                        guard.meta_mut().set_loaded(false);
                    }
                }
                let mut loader = entry.loader;
                if let Ok(lock) = Arc::try_unwrap(target) {
                    let resource = lock.into_inner();
                    if let Some(loader) = loader.as_mut() {
                        loader.delete_resource(resource);
                    }
                    // direct Arc holders otherwise keep the object alive
                    // until they drop it
                }
            }
        }
        info!(%id, "resource deleted");
    }

    /// Register `path` so file changes re-run `loader` against `handle`.
    /// Re-registering a watched path refreshes the entry (idempotent).
    pub fn register_loader_for_reload(
        &self,
        path: &str,
        loader: Box<dyn ResourceLoader>,
        handle: ResourcePtr,
    ) {
        let path = normalize_path(path);
        let mut registry = self.reload_registry.lock();
        let last_tick = registry.get(&path).map_or(0, |e| e.last_tick);
        registry.insert(
            path,
            ReloadEntry {
                loader: Some(loader),
                ptr: handle,
                last_tick,
            },
        );
    }

    /// Remove a reload registration. No-op if `path` was never registered.
    pub fn deregister_loader_for_reload(&self, path: &str) {
        let path = normalize_path(path);
        if self.reload_registry.lock().remove(&path).is_none() {
            debug!(%path, "deregister for an unwatched path ignored");
        }
    }

    /// Manually re-run the registered loader for `handle`, feeding the result
    /// through the same patch pipeline as watcher-driven reloads. Returns
    /// false if the handle has no reload registration.
    pub fn reload_resource(&self, handle: &ResourcePtr) -> bool {
        let found = {
            let mut registry = self.reload_registry.lock();
            registry.iter_mut().find_map(|(path, entry)| {
                if entry.ptr == *handle {
                    entry.loader.take().map(|l| (path.clone(), l))
                } else {
                    None
                }
            })
        };
        match found {
            Some((path, loader)) => {
                self.run_reload(&path, loader, handle.clone());
                true
            }
            None => {
                debug!("reload requested for an unregistered handle");
                false
            }
        }
    }

    fn poll_watcher(&self, elapsed: Duration) {
        let tick = {
            let mut poll = self.poll.lock();
            poll.accumulator += elapsed;
            if poll.accumulator < self.config.poll_interval() {
                return;
            }
            poll.accumulator = Duration::ZERO;
            poll.tick += 1;
            poll.tick
        };

        let mut changed: Vec<String> = Vec::new();
        {
            let mut watcher = self.watcher.lock();
            let Some(watcher) = watcher.as_mut() else {
                return;
            };
            watcher.enumerate_changes(&mut |path, action| {
                if action == ChangeAction::Modified {
                    changed.push(normalize_path(path));
                }
            });
        }
        for path in changed {
            self.process_file_change(&path, tick);
        }
    }

    fn process_file_change(&self, path: &str, tick: u64) {
        let (loader, ptr) = {
            let mut registry = self.reload_registry.lock();
            let Some(entry) = registry.get_mut(path) else {
                debug!(%path, "modified file has no reload registration");
                return;
            };
            if entry.last_tick == tick {
                return; // duplicate notification this tick
            }
            entry.last_tick = tick;
            let Some(loader) = entry.loader.take() else {
                return; // reload already running
            };
            (loader, entry.ptr.clone())
        };

        if !self.wait_for_readable(path) {
            warn!(%path, "file still locked after retries, reload skipped");
            let mut registry = self.reload_registry.lock();
            if let Some(entry) = registry.get_mut(path) {
                entry.loader = Some(loader);
            }
            return;
        }
        self.run_reload(path, loader, ptr);
    }

    /// The writing process may still hold the changed file open; retry
    /// briefly rather than waiting forever. A missing file is left to the
    /// loader, which resolves paths itself.
    fn wait_for_readable(&self, path: &str) -> bool {
        for attempt in 0..=self.config.reload_retry_count {
            match std::fs::File::open(path) {
                Ok(_) => return true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
                Err(_) if attempt < self.config.reload_retry_count => {
                    std::thread::sleep(Duration::from_millis(self.config.reload_retry_delay_ms));
                }
                Err(_) => {}
            }
        }
        false
    }

    fn run_reload(&self, path: &str, mut loader: Box<dyn ResourceLoader>, ptr: ResourcePtr) {
        if !ptr.is_valid() {
            self.reload_registry.lock().remove(path);
            return;
        }
        let result = match ptr.get() {
            Some(existing) => {
                let guard = existing.read();
                loader.load(Some(&**guard))
            }
            None => loader.load(None),
        };
        match result {
            Ok(mut resource) => {
                resource.meta_mut().mark_constructed();
                self.pending.patch.lock().push(PatchEntry {
                    ptr,
                    resource: Some(resource),
                    loader,
                    finalized: false,
                    kind: PatchKind::Reload,
                });
            }
            Err(err) => {
                warn!(%path, "reload failed, keeping previous content: {err}");
                let mut registry = self.reload_registry.lock();
                if let Some(entry) = registry.get_mut(path) {
                    if entry.loader.is_none() {
                        entry.loader = Some(loader);
                    }
                }
            }
        }
    }
}
