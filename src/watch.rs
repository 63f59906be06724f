//! File-change integration for hot reload.
//!
//! The manager consumes an external [`ChangeWatcher`] and acts only on
//! [`ChangeAction::Modified`]. Paths coming out of a watcher are normalized
//! before consulting the reload registry, so loaders, watchers and callers
//! can disagree about separators without breaking lookups.

use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Kind of file-system change reported by a watcher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Modified,
    Removed,
}

/// External collaborator supplying file-system change notifications
pub trait ChangeWatcher: Send {
    /// Report changes accumulated since the previous call
    fn enumerate_changes(&mut self, callback: &mut dyn FnMut(&str, ChangeAction));
}

/// Normalize a path for registry lookups: unify separators to `/`, strip
/// `./` prefixes, collapse duplicate separators.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        out.push(c);
    }
    while out.starts_with("./") {
        out.drain(..2);
    }
    out
}

/// Polling directory watcher.
///
/// Scans a directory tree on every `enumerate_changes` call and reports files
/// whose modification time advanced since the previous scan. The first scan
/// primes the baseline without reporting anything. Paths are reported
/// relative to the watched root.
///
/// This is the fallback for platforms without an OS notification backend;
/// the manager's own poll interval keeps the scan rate bounded.
pub struct DirWatcher {
    root: PathBuf,
    /// Extension filter; empty means every file
    extensions: Vec<String>,
    mtimes: AHashMap<PathBuf, SystemTime>,
    primed: bool,
}

impl DirWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            mtimes: AHashMap::new(),
            primed: false,
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }

    fn scan(&self, dir: &Path, found: &mut Vec<(PathBuf, SystemTime)>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), "watch scan failed: {err}");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan(&path, found);
            } else if self.wants(&path) {
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    found.push((path, modified));
                }
            }
        }
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        normalize_path(&rel.to_string_lossy())
    }
}

impl ChangeWatcher for DirWatcher {
    fn enumerate_changes(&mut self, callback: &mut dyn FnMut(&str, ChangeAction)) {
        let mut found = Vec::new();
        self.scan(&self.root, &mut found);

        let mut seen: AHashMap<PathBuf, SystemTime> = AHashMap::with_capacity(found.len());
        for (path, modified) in found {
            match self.mtimes.get(&path) {
                Some(prev) if modified > *prev => {
                    callback(&self.relative(&path), ChangeAction::Modified);
                }
                None if self.primed => {
                    callback(&self.relative(&path), ChangeAction::Added);
                }
                _ => {}
            }
            seen.insert(path, modified);
        }
        if self.primed {
            for path in self.mtimes.keys() {
                if !seen.contains_key(path) {
                    callback(&self.relative(path), ChangeAction::Removed);
                }
            }
        }
        self.mtimes = seen;
        self.primed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_path("textures\\stone.png"), "textures/stone.png");
        assert_eq!(normalize_path("a\\b/c"), "a/b/c");
    }

    #[test]
    fn test_normalize_relative_prefix() {
        assert_eq!(normalize_path("./textures/stone.png"), "textures/stone.png");
        assert_eq!(normalize_path("././a.bin"), "a.bin");
    }

    #[test]
    fn test_normalize_duplicate_separators() {
        assert_eq!(normalize_path("a//b///c"), "a/b/c");
        assert_eq!(normalize_path(".\\\\a.bin"), "a.bin");
    }

    #[test]
    fn test_normalize_leaves_clean_paths_alone() {
        assert_eq!(normalize_path("sounds/ui/click.ogg"), "sounds/ui/click.ogg");
        assert_eq!(normalize_path(""), "");
    }
}
