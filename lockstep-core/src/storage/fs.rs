//! Filesystem record store
//!
//! One file per record plus a sibling `.lock` file carrying an advisory
//! lock. Change notification comes from the OS watch backend through
//! `notify`, so waiting never polls.
//!
//! Record I/O and locking are synchronous and run on the calling thread.
//! A lock is held for one small read or write of a record, and each worker
//! process drives a single current-thread runtime with no other tasks to
//! starve. Waiting for a record to change is the only long block, and that
//! goes through the async `RecordWatch`.

use fs4::fs_std::FileExt;
use notify::{Event, RecursiveMode, Watcher};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{RecordKey, RecordStore, RecordWatch, UpdateFn};
use crate::error::{LockstepError, Result};

/// Default counter location
pub const DEFAULT_COUNTER_PATH: &str = "/tmp/num_sync";

/// Default directory for state and report records
pub const DEFAULT_STATE_DIR: &str = "/tmp/worker_state";

/// Default directory for batch records
pub const DEFAULT_BATCH_DIR: &str = "/tmp/worker_command";

/// Where each record kind lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsLayout {
    /// Registration counter file
    pub counter_path: PathBuf,
    /// Directory holding `worker_state_<id>` and `worker_report_<id>`
    pub state_dir: PathBuf,
    /// Directory holding `worker_command_<id>`
    pub batch_dir: PathBuf,
}

impl Default for FsLayout {
    fn default() -> Self {
        Self {
            counter_path: DEFAULT_COUNTER_PATH.into(),
            state_dir: DEFAULT_STATE_DIR.into(),
            batch_dir: DEFAULT_BATCH_DIR.into(),
        }
    }
}

impl FsLayout {
    /// Lay out every record under one root directory
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            counter_path: root.join("num_sync"),
            state_dir: root.join("worker_state"),
            batch_dir: root.join("worker_command"),
        }
    }

    /// Path of a record's payload file
    pub fn record_path(&self, key: &RecordKey) -> PathBuf {
        match key {
            RecordKey::Counter => self.counter_path.clone(),
            RecordKey::State(id) => self.state_dir.join(format!("worker_state_{}", id)),
            RecordKey::Report(id) => self.state_dir.join(format!("worker_report_{}", id)),
            RecordKey::Batch(id) => self.batch_dir.join(format!("worker_command_{}", id)),
        }
    }

    /// Path of a record's lock file
    pub fn lock_path(&self, key: &RecordKey) -> PathBuf {
        let mut path = self.record_path(key).into_os_string();
        path.push(".lock");
        path.into()
    }
}

/// Exclusive advisory lock held for the lifetime of the guard
struct RecordLock {
    file: File,
}

impl RecordLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Record store backed by a shared filesystem
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    layout: FsLayout,
}

impl FsRecordStore {
    /// Open the store, creating the record directories if needed
    pub fn open(layout: FsLayout) -> Result<Self> {
        let mut dirs = vec![layout.state_dir.clone(), layout.batch_dir.clone()];
        if let Some(parent) = layout.counter_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| LockstepError::state_io(dir.display(), e))?;
        }
        Ok(Self { layout })
    }

    /// Store layout
    pub fn layout(&self) -> &FsLayout {
        &self.layout
    }

    fn lock(&self, key: &RecordKey) -> Result<RecordLock> {
        let path = self.layout.lock_path(key);
        RecordLock::acquire(&path).map_err(|e| LockstepError::state_io(path.display(), e))
    }

    fn read_unlocked(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LockstepError::state_io(path.display(), e)),
        }
    }

    fn write_unlocked(path: &Path, contents: &str, create_new: bool) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }

        let mut file = options
            .open(path)
            .map_err(|e| LockstepError::state_io(path.display(), e))?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| LockstepError::state_io(path.display(), e))
    }
}

impl RecordStore for FsRecordStore {
    fn read(&self, key: &RecordKey) -> Result<Option<String>> {
        let path = self.layout.record_path(key);
        let _lock = self.lock(key)?;
        Self::read_unlocked(&path)
    }

    fn write(&self, key: &RecordKey, contents: &str) -> Result<()> {
        let path = self.layout.record_path(key);
        let _lock = self.lock(key)?;
        Self::write_unlocked(&path, contents, false)?;
        debug!("Wrote {} ({} bytes)", path.display(), contents.len());
        Ok(())
    }

    fn update(&self, key: &RecordKey, f: &mut UpdateFn<'_>) -> Result<()> {
        let path = self.layout.record_path(key);
        let _lock = self.lock(key)?;
        let current = Self::read_unlocked(&path)?;
        let next = f(current.as_deref())?;
        // Exclusive create doubles as the compare-and-swap for a fresh record
        Self::write_unlocked(&path, &next, current.is_none())
    }

    fn remove(&self, key: &RecordKey) -> Result<()> {
        let path = self.layout.record_path(key);
        let lock_path = self.layout.lock_path(key);
        {
            let _lock = self.lock(key)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LockstepError::state_io(path.display(), e)),
            }
        }
        match fs::remove_file(&lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LockstepError::state_io(lock_path.display(), e)),
        }
        debug!("Removed {}", path.display());
        Ok(())
    }

    fn exists(&self, key: &RecordKey) -> bool {
        self.layout.record_path(key).exists() || self.layout.lock_path(key).exists()
    }

    fn watch(&self, key: &RecordKey) -> Result<RecordWatch> {
        let path = self.layout.record_path(key);
        let record = path.display().to_string();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| LockstepError::WatchFailed {
                record: record.clone(),
                reason: "record has no parent directory".into(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let target = path.clone();
        // The directory is watched rather than the file so that a record
        // which does not exist yet can still be waited on.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = event.kind.is_modify()
                    || event.kind.is_create()
                    || event.kind.is_remove();
                if relevant && event.paths.iter().any(|p| p == &target) {
                    let _ = tx.send(());
                }
            }
            Err(e) => {
                warn!("Watch error on {}: {}", target.display(), e);
                let _ = tx.send(());
            }
        })
        .map_err(|e| LockstepError::WatchFailed {
            record: record.clone(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| LockstepError::WatchFailed {
                record: record.clone(),
                reason: e.to_string(),
            })?;

        Ok(RecordWatch::new(record, rx, Some(Box::new(watcher))))
    }

    fn describe(&self, key: &RecordKey) -> String {
        self.layout.record_path(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_layout_paths() {
        let layout = FsLayout::default();
        assert_eq!(layout.record_path(&RecordKey::Counter), PathBuf::from("/tmp/num_sync"));
        assert_eq!(layout.lock_path(&RecordKey::Counter), PathBuf::from("/tmp/num_sync.lock"));
        assert_eq!(
            layout.record_path(&RecordKey::State(2)),
            PathBuf::from("/tmp/worker_state/worker_state_2")
        );
        assert_eq!(
            layout.lock_path(&RecordKey::Batch(4)),
            PathBuf::from("/tmp/worker_command/worker_command_4.lock")
        );
    }

    #[test]
    fn test_read_write_remove() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(FsLayout::under(dir.path())).unwrap();
        let key = RecordKey::State(1);

        assert_eq!(store.read(&key).unwrap(), None);

        store.write(&key, "1").unwrap();
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("1"));
        assert!(store.exists(&key));

        store.remove(&key).unwrap();
        assert!(!store.exists(&key));
        assert!(!store.layout().lock_path(&key).exists());

        // Removing twice is fine
        store.remove(&key).unwrap();
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        let dir = tempdir().unwrap();
        let layout = FsLayout::under(dir.path());
        let key = RecordKey::Counter;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = FsRecordStore::open(layout.clone()).unwrap();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .update(&key, &mut |current: Option<&str>| {
                                let value: u32 = current.map_or(Ok(0), |c| c.parse()).unwrap();
                                Ok((value + 1).to_string())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FsRecordStore::open(layout).unwrap();
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("400"));
    }

    #[test]
    fn test_update_creates_then_modifies() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(FsLayout::under(dir.path())).unwrap();
        let key = RecordKey::Counter;

        store
            .update(&key, &mut |current: Option<&str>| {
                assert!(current.is_none());
                Ok("1".into())
            })
            .unwrap();
        store
            .update(&key, &mut |current: Option<&str>| {
                assert_eq!(current, Some("1"));
                Ok("2".into())
            })
            .unwrap();

        assert_eq!(store.read(&key).unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watch_fires_on_write() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(FsLayout::under(dir.path())).unwrap();
        let key = RecordKey::State(1);

        let mut watch = store.watch(&key).unwrap();
        store.write(&key, "1").unwrap();

        tokio::time::timeout(Duration::from_secs(5), watch.changed())
            .await
            .expect("watch did not fire")
            .unwrap();
    }
}
