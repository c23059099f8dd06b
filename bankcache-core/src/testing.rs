//! In-memory doubles for the engine's seams.
//!
//! `MemorySource` stands in for the bank directory, `TestReader` for the bank
//! reader and `FlagChanges` for the OS watcher. Each is a cheap handle over
//! shared state: clone one, hand the clone to the engine, and keep scripting
//! and inspecting through the original.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use bankcache_types::{BankManifest, EventDescriptor, Guid, ParameterDescriptor};

use crate::reader::{BankReader, OpenError, OpenErrorKind};
use crate::source::{is_bank_file, FileStat, SourceFs};
use crate::watcher::ChangeSource;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Source directory ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct MemoryFile {
    modified: SystemTime,
    len: u64,
    locked: bool,
}

/// In-memory source directory. Directories exist implicitly while they hold a file.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<Mutex<BTreeMap<PathBuf, MemoryFile>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, modified: SystemTime, len: u64) {
        lock(&self.files).insert(
            path.into(),
            MemoryFile {
                modified,
                len,
                locked: false,
            },
        );
    }

    /// Change the mtime of an existing file.
    pub fn touch(&self, path: impl AsRef<Path>, modified: SystemTime) {
        if let Some(file) = lock(&self.files).get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        lock(&self.files).remove(path.as_ref());
    }

    pub fn set_locked(&self, path: impl AsRef<Path>, locked: bool) {
        if let Some(file) = lock(&self.files).get_mut(path.as_ref()) {
            file.locked = locked;
        }
    }

    pub fn file_count(&self) -> usize {
        lock(&self.files).len()
    }
}

impl SourceFs for MemorySource {
    fn is_dir(&self, path: &Path) -> bool {
        lock(&self.files)
            .keys()
            .any(|f| f != path && f.starts_with(path))
    }

    fn list_banks(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(lock(&self.files)
            .keys()
            .filter(|p| p.starts_with(root) && is_bank_file(p))
            .cloned()
            .collect())
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        lock(&self.files)
            .get(path)
            .map(|f| FileStat {
                modified: f.modified,
                len: f.len,
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn is_write_locked(&self, path: &Path) -> bool {
        lock(&self.files).get(path).map_or(false, |f| f.locked)
    }
}

// ─── Bank reader ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ReaderState {
    banks: BTreeMap<PathBuf, BankManifest>,
    failures: BTreeMap<PathBuf, OpenError>,
    opens: Vec<PathBuf>,
    open: BTreeMap<u64, PathBuf>,
    next_handle: u64,
}

#[derive(Debug)]
pub struct TestHandle {
    id: u64,
    path: PathBuf,
}

impl TestHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Scripted [`BankReader`] that records every `open`.
#[derive(Debug, Clone, Default)]
pub struct TestReader {
    state: Arc<Mutex<ReaderState>>,
}

impl TestReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bank(&self, path: impl Into<PathBuf>, manifest: BankManifest) {
        lock(&self.state).banks.insert(path.into(), manifest);
    }

    /// A marker bank: identity only.
    pub fn set_marker(&self, path: impl Into<PathBuf>, guid: Guid) {
        self.set_bank(
            path,
            BankManifest {
                guid,
                ..BankManifest::default()
            },
        );
    }

    pub fn set_events(&self, path: impl Into<PathBuf>, events: Vec<EventDescriptor>) {
        self.set_bank(
            path,
            BankManifest {
                events,
                ..BankManifest::default()
            },
        );
    }

    pub fn fail_open(&self, path: impl Into<PathBuf>, kind: OpenErrorKind, message: &str) {
        lock(&self.state)
            .failures
            .insert(path.into(), OpenError::new(kind, message));
    }

    pub fn clear_failure(&self, path: impl AsRef<Path>) {
        lock(&self.state).failures.remove(path.as_ref());
    }

    /// Every path passed to `open`, in order, failures included.
    pub fn opens(&self) -> Vec<PathBuf> {
        lock(&self.state).opens.clone()
    }

    pub fn clear_opens(&self) {
        lock(&self.state).opens.clear();
    }

    pub fn open_handles(&self) -> usize {
        lock(&self.state).open.len()
    }
}

impl BankReader for TestReader {
    type Handle = TestHandle;

    fn open(&mut self, path: &Path) -> Result<TestHandle, OpenError> {
        let mut state = lock(&self.state);
        state.opens.push(path.to_path_buf());
        if let Some(err) = state.failures.get(path) {
            return Err(err.clone());
        }
        if !state.banks.contains_key(path) {
            return Err(OpenError::new(OpenErrorKind::NotFound, path.display().to_string()));
        }
        let id = state.next_handle;
        state.next_handle += 1;
        state.open.insert(id, path.to_path_buf());
        Ok(TestHandle {
            id,
            path: path.to_path_buf(),
        })
    }

    fn identity(&self, handle: &TestHandle) -> Guid {
        lock(&self.state)
            .banks
            .get(&handle.path)
            .map(|m| m.guid)
            .unwrap_or_default()
    }

    fn enumerate_events(&self, handle: &TestHandle) -> Vec<EventDescriptor> {
        lock(&self.state)
            .banks
            .get(&handle.path)
            .map(|m| m.events.clone())
            .unwrap_or_default()
    }

    fn enumerate_global_parameters(&self) -> Vec<ParameterDescriptor> {
        let state = lock(&self.state);
        let mut seen = BTreeMap::new();
        for path in state.open.values() {
            if let Some(manifest) = state.banks.get(path) {
                for param in &manifest.global_parameters {
                    seen.entry(param.guid).or_insert_with(|| param.clone());
                }
            }
        }
        seen.into_values().collect()
    }

    fn close(&mut self, handle: TestHandle) {
        lock(&self.state).open.remove(&handle.id);
    }
}

// ─── Change source ──────────────────────────────────────────────────

/// [`ChangeSource`] whose change flag is raised by hand.
#[derive(Debug, Clone, Default)]
pub struct FlagChanges {
    changed: Arc<AtomicBool>,
    root_exists: Arc<AtomicBool>,
    root: Arc<Mutex<Option<PathBuf>>>,
}

impl FlagChanges {
    pub fn new() -> Self {
        let changes = Self::default();
        changes.root_exists.store(true, Ordering::Release);
        changes
    }

    /// Simulate a filesystem event.
    pub fn raise(&self) {
        self.changed.store(true, Ordering::Release);
    }

    pub fn set_root_exists(&self, exists: bool) {
        self.root_exists.store(exists, Ordering::Release);
    }

    pub fn watched_root(&self) -> Option<PathBuf> {
        lock(&self.root).clone()
    }
}

impl ChangeSource for FlagChanges {
    fn watch(&mut self, root: Option<&Path>) {
        let mut current = lock(&self.root);
        if current.as_deref() != root {
            *current = root.map(Path::to_path_buf);
            self.changed.store(false, Ordering::Release);
        }
    }

    fn signal_changed(&mut self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    fn root_exists(&self) -> bool {
        lock(&self.root).is_some() && self.root_exists.load(Ordering::Acquire)
    }
}
