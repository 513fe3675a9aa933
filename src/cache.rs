//! Shard handle cache (C4).
//!
//! Tracks at most one open [`File`] per shard path. A request for a path
//! already cached under a different mode closes and reopens it; a request
//! for a path that does not exist yet creates its parent directories and
//! the file itself when `create` is set. Eviction only happens on mode
//! mismatch or an explicit [`ShardHandleCache::close_all`] — there is no
//! LRU, matching the working-set assumption in `spec.md` §9.
//!
//! Interior mutability (`RefCell`) lets the driver expose read operations
//! through a shared reference, the same pattern used for bookkeeping
//! wrappers elsewhere in this codebase's ancestry (e.g. a tracking
//! blockstore wrapper keeping stats behind a `RefCell`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMode {
    Read,
    Append,
}

struct CachedHandle {
    file: File,
    mode: FileMode,
}

#[derive(Default)]
pub(crate) struct ShardHandleCache {
    entries: RefCell<HashMap<PathBuf, CachedHandle>>,
}

impl ShardHandleCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn ensure(&self, path: &Path, mode: FileMode, create: bool) -> io::Result<()> {
        {
            let entries = self.entries.borrow();
            if let Some(entry) = entries.get(path) {
                if entry.mode == mode {
                    return Ok(());
                }
            }
        }

        let mut entries = self.entries.borrow_mut();
        // Re-check after acquiring the write borrow in case nothing changed.
        if let Some(entry) = entries.get(path) {
            if entry.mode == mode {
                return Ok(());
            }
            trace!(shard = %path.display(), from = ?entry.mode, to = ?mode, "reopening shard handle for mode mismatch");
            entries.remove(path);
        } else if create && !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(path)?;
        }

        let file = open_with_mode(path, mode)?;
        entries.insert(path.to_path_buf(), CachedHandle { file, mode });
        Ok(())
    }

    /// Runs `op` against the cached handle for `path` in `mode`, opening
    /// (and optionally creating) it first if needed.
    pub(crate) fn with_file<T>(
        &self,
        path: &Path,
        mode: FileMode,
        create: bool,
        op: impl FnOnce(&mut File) -> io::Result<T>,
    ) -> io::Result<T> {
        self.ensure(path, mode, create)?;
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .get_mut(path)
            .expect("ensure() just inserted this entry");
        op(&mut entry.file)
    }

    /// Returns an independent, freshly-seekable clone of the cached
    /// read-mode handle for `path`. The clone shares the underlying OS
    /// file description with the cached handle (same invariant as the
    /// Python original: one open file per shard), but gets its own
    /// `Seek` cursor management from the caller's point of view since it
    /// is only ever used by one scan at a time.
    pub(crate) fn open_read_clone(&self, path: &Path, create: bool) -> io::Result<File> {
        self.ensure(path, FileMode::Read, create)?;
        let entries = self.entries.borrow();
        entries[path].file.try_clone()
    }

    /// The mode a shard is currently cached under, if it is cached at all.
    pub(crate) fn mode_of(&self, path: &Path) -> Option<FileMode> {
        self.entries.borrow().get(path).map(|entry| entry.mode)
    }

    pub(crate) fn flush_all(&self) -> io::Result<()> {
        use std::io::Write;
        for entry in self.entries.borrow_mut().values_mut() {
            entry.file.flush()?;
        }
        Ok(())
    }

    pub(crate) fn close_all(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Installs `file` as the cached handle for `path` in `mode`, used
    /// after an atomic rename has replaced the shard on disk (§4.5 step 5
    /// of the driver design).
    pub(crate) fn replace(&self, path: &Path, mode: FileMode) -> io::Result<()> {
        let file = open_with_mode(path, mode)?;
        self.entries
            .borrow_mut()
            .insert(path.to_path_buf(), CachedHandle { file, mode });
        Ok(())
    }
}

fn open_with_mode(path: &Path, mode: FileMode) -> io::Result<File> {
    match mode {
        FileMode::Read => File::open(path),
        FileMode::Append => OpenOptions::new().create(true).append(true).open(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn reopens_on_mode_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.txt");
        let cache = ShardHandleCache::new();

        cache
            .with_file(&path, FileMode::Append, true, |f| f.write_all(b"a\n"))
            .unwrap();
        cache
            .with_file(&path, FileMode::Append, true, |f| f.write_all(b"b\n"))
            .unwrap();
        cache.flush_all().unwrap();

        let mut clone = cache.open_read_clone(&path, false).unwrap();
        let mut buf = String::new();
        clone.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "a\nb\n");
    }

    #[test]
    fn create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2020/04/01.txt");
        let cache = ShardHandleCache::new();

        cache
            .with_file(&path, FileMode::Append, true, |f| f.write_all(b"x\n"))
            .unwrap();
        assert!(path.is_file());
    }
}
