//! Integration tests for the hot-reload pipeline, finalize gating, and the
//! polling directory watcher.

use archetype_resource::prelude::*;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Watcher scripted by the test: events pushed here come out of the next
/// `enumerate_changes` call.
#[derive(Clone, Default)]
struct ScriptedWatcher {
    events: Arc<Mutex<Vec<(String, ChangeAction)>>>,
}

impl ScriptedWatcher {
    fn push(&self, path: &str, action: ChangeAction) {
        self.events.lock().push((path.to_string(), action));
    }
}

impl ChangeWatcher for ScriptedWatcher {
    fn enumerate_changes(&mut self, callback: &mut dyn FnMut(&str, ChangeAction)) {
        for (path, action) in self.events.lock().drain(..) {
            callback(&path, action);
        }
    }
}

struct Script {
    meta: ResourceMeta,
    source: String,
    revision: u32,
    finalize_calls: u32,
}

impl Resource for Script {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
    fn finalize(&mut self) -> Result<()> {
        self.finalize_calls += 1;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn script_dummy() -> Box<Script> {
    Box::new(Script {
        meta: ResourceMeta::new("Script", "builtin/dummy_script"),
        source: String::new(),
        revision: 0,
        finalize_calls: 0,
    })
}

/// Produces `Script` resources from an in-memory source shared with the
/// test, carrying the revision counter across reloads. Registers itself for
/// hot reload in `post_load`.
#[derive(Clone)]
struct ScriptLoader {
    path: String,
    source: Arc<Mutex<String>>,
    fail_reloads: bool,
    finalize: FinalizeFlags,
    load_calls: Arc<AtomicU32>,
}

impl ScriptLoader {
    fn new(path: &str, source: &str) -> Self {
        Self {
            path: path.to_string(),
            source: Arc::new(Mutex::new(source.to_string())),
            fail_reloads: false,
            finalize: FinalizeFlags::empty(),
            load_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl ResourceLoader for ScriptLoader {
    fn resource_type(&self) -> &'static str {
        "Script"
    }

    fn resource_id(&self) -> String {
        self.path.clone()
    }

    fn load(&mut self, existing: Option<&dyn Resource>) -> Result<Box<dyn Resource>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let previous = existing.and_then(|r| r.as_any().downcast_ref::<Script>());
        if self.fail_reloads && previous.is_some() {
            return Err(ResourceError::LoadingError(format!(
                "syntax error in {}",
                self.path
            )));
        }
        Ok(Box::new(Script {
            meta: ResourceMeta::new("Script", self.path.clone()).with_finalize(self.finalize),
            source: self.source.lock().clone(),
            revision: previous.map_or(0, |s| s.revision + 1),
            finalize_calls: 0,
        }))
    }

    fn box_clone(&self) -> Box<dyn ResourceLoader> {
        Box::new(self.clone())
    }

    fn post_load(&mut self, manager: &ResourceManager, handle: &ResourcePtr) {
        manager.register_loader_for_reload(&self.path, self.box_clone(), handle.clone());
    }
}

fn poll_every_tick() -> ResourceConfig {
    ResourceConfig {
        poll_interval_ms: 0,
        reload_retry_count: 1,
        reload_retry_delay_ms: 1,
    }
}

#[test]
fn reload_preserves_handle_identity() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();
    let watcher = ScriptedWatcher::default();
    manager.set_watcher(Box::new(watcher.clone()));

    let loader = ScriptLoader::new("scripts/ai.lua", "v1");
    let source = Arc::clone(&loader.source);
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Blocking)
        .unwrap();
    let original = ptr.clone();
    assert_eq!(ptr.read(|s| s.revision), Some(0));

    *source.lock() = "v2".to_string();
    watcher.push("scripts\\ai.lua", ChangeAction::Modified); // separator on purpose

    manager.update(Duration::from_millis(16)); // polls, queues the reload patch
    manager.update(Duration::from_millis(16)); // applies it

    assert_eq!(ptr, original);
    assert_eq!(ptr.read(|s| s.revision), Some(1));
    assert_eq!(ptr.read(|s| s.source.clone()).as_deref(), Some("v2"));
}

#[test]
fn duplicate_change_events_reload_once_per_tick() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();
    let watcher = ScriptedWatcher::default();
    manager.set_watcher(Box::new(watcher.clone()));

    let loader = ScriptLoader::new("scripts/ui.lua", "v1");
    let load_calls = Arc::clone(&loader.load_calls);
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Blocking)
        .unwrap();

    // Two notifications for the same change, as some OS backends deliver.
    watcher.push("scripts/ui.lua", ChangeAction::Modified);
    watcher.push("./scripts//ui.lua", ChangeAction::Modified);

    manager.update(Duration::from_millis(16));
    manager.update(Duration::from_millis(16));

    assert_eq!(load_calls.load(Ordering::SeqCst), 2); // initial + one reload
    assert_eq!(ptr.read(|s| s.revision), Some(1));
}

#[test]
fn failed_reload_keeps_previous_content() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();
    let watcher = ScriptedWatcher::default();
    manager.set_watcher(Box::new(watcher.clone()));

    let mut loader = ScriptLoader::new("scripts/hud.lua", "good");
    loader.fail_reloads = true;
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Blocking)
        .unwrap();

    watcher.push("scripts/hud.lua", ChangeAction::Modified);
    manager.update(Duration::from_millis(16));
    manager.update(Duration::from_millis(16));

    assert_eq!(manager.load_state(ptr.untyped()), Some(LoadState::Loaded));
    assert_eq!(ptr.read(|s| s.revision), Some(0));
    assert_eq!(ptr.read(|s| s.source.clone()).as_deref(), Some("good"));
}

#[test]
fn non_modified_actions_are_ignored() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();
    let watcher = ScriptedWatcher::default();
    manager.set_watcher(Box::new(watcher.clone()));

    let loader = ScriptLoader::new("scripts/menu.lua", "v1");
    let load_calls = Arc::clone(&loader.load_calls);
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Blocking)
        .unwrap();

    watcher.push("scripts/menu.lua", ChangeAction::Added);
    watcher.push("scripts/menu.lua", ChangeAction::Removed);
    manager.update(Duration::from_millis(16));
    manager.update(Duration::from_millis(16));

    assert_eq!(load_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ptr.read(|s| s.revision), Some(0));
}

#[test]
fn manual_reload_uses_the_same_pipeline() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();

    let loader = ScriptLoader::new("scripts/boss.lua", "v1");
    let source = Arc::clone(&loader.source);
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Blocking)
        .unwrap();

    *source.lock() = "v2".to_string();
    assert!(manager.reload_resource(ptr.untyped()));
    manager.update(Duration::from_millis(16));

    assert_eq!(ptr.read(|s| s.revision), Some(1));
    assert_eq!(ptr.read(|s| s.source.clone()).as_deref(), Some("v2"));

    // Handles nobody registered are reported, not crashed on.
    let unrelated = manager
        .load_resource::<Script>(
            Box::new(ScriptLoader::new("scripts/no_watch.lua", "x")),
            LoadMode::Blocking,
        )
        .unwrap();
    manager.deregister_loader_for_reload("scripts/no_watch.lua");
    assert!(!manager.reload_resource(unrelated.untyped()));
}

#[test]
fn async_load_waits_for_renderer_finalize() {
    let manager = ResourceManager::with_config(poll_every_tick());
    manager.register_resource_type(script_dummy()).unwrap();

    let mut loader = ScriptLoader::new("scripts/gpu.lua", "shader");
    loader.finalize = FinalizeFlags::FROM_RENDERER;
    let ptr = manager
        .load_resource::<Script>(Box::new(loader), LoadMode::Async)
        .unwrap();
    let dummy = manager.dummy("Script").unwrap();

    // The wrong capability mask can never promote the resource, no matter
    // how the worker is scheduled.
    for _ in 0..20 {
        manager.finalize_resources_with_flags(FinalizeFlags::FROM_TEST);
        manager.update(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(5));
    }
    assert!(Arc::ptr_eq(&ptr.get().unwrap(), &dummy));

    let mut test_timeout = Duration::from_millis(2000);
    while test_timeout > Duration::ZERO
        && manager.load_state(ptr.untyped()) != Some(LoadState::Loaded)
    {
        manager.finalize_resources_with_flags(FinalizeFlags::FROM_RENDERER);
        let sleep_time = Duration::from_millis(10);
        thread::sleep(sleep_time);
        test_timeout -= sleep_time;
        manager.update(sleep_time);
    }

    assert_eq!(ptr.read(|s| s.finalize_calls), Some(1));

    // A second pass with the same mask must not finalize again.
    manager.finalize_resources_with_flags(FinalizeFlags::FROM_RENDERER);
    assert_eq!(ptr.read(|s| s.finalize_calls), Some(1));
}

#[test]
fn dir_watcher_reports_mtime_changes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets").join("table.bin");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"v1").unwrap();

    let mut watcher = DirWatcher::new(dir.path()).with_extensions(&["bin"]);

    // First scan primes the baseline.
    let mut changes = Vec::new();
    watcher.enumerate_changes(&mut |p, a| changes.push((p.to_string(), a)));
    assert!(changes.is_empty());

    // Push the mtime forward instead of sleeping past the fs granularity.
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
    drop(file);

    watcher.enumerate_changes(&mut |p, a| changes.push((p.to_string(), a)));
    assert_eq!(
        changes,
        vec![("assets/table.bin".to_string(), ChangeAction::Modified)]
    );

    // No repeat report without a new modification.
    changes.clear();
    watcher.enumerate_changes(&mut |p, a| changes.push((p.to_string(), a)));
    assert!(changes.is_empty());
}

#[test]
fn dir_watcher_reports_added_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let keep = dir.path().join("keep.bin");
    std::fs::write(&keep, b"x").unwrap();

    let mut watcher = DirWatcher::new(dir.path());
    watcher.enumerate_changes(&mut |_, _| {});

    let fresh = dir.path().join("fresh.bin");
    std::fs::write(&fresh, b"y").unwrap();
    std::fs::remove_file(&keep).unwrap();

    let mut changes = Vec::new();
    watcher.enumerate_changes(&mut |p, a| changes.push((p.to_string(), a)));
    changes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        changes,
        vec![
            ("fresh.bin".to_string(), ChangeAction::Added),
            ("keep.bin".to_string(), ChangeAction::Removed),
        ]
    );
}

#[test]
fn reload_rereads_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");
    std::fs::write(&path, b"first").unwrap();
    let path_str = path.to_string_lossy().to_string();

    let manager = ResourceManager::with_config(poll_every_tick());
    archetype_resource::asset_types::register_builtin_types(&manager).unwrap();
    let watcher = ScriptedWatcher::default();
    manager.set_watcher(Box::new(watcher.clone()));

    let ptr = manager
        .load_resource::<DataResource>(Box::new(DataLoader::new(&path_str)), LoadMode::Blocking)
        .unwrap();
    assert_eq!(ptr.read(|d| d.data().to_vec()).as_deref(), Some(&b"first"[..]));

    std::fs::write(&path, b"second").unwrap();
    watcher.push(&path_str, ChangeAction::Modified);
    manager.update(Duration::from_millis(16));
    manager.update(Duration::from_millis(16));

    assert_eq!(ptr.read(|d| d.revision()), Some(1));
    assert_eq!(
        ptr.read(|d| d.data().to_vec()).as_deref(),
        Some(&b"second"[..])
    );
}
