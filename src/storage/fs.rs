//! Filesystem abstraction used by the record store.
//!
//! The store never touches `std::fs` directly; it goes through a
//! [`FileSystem`] so tests can run against [`MemoryFileSystem`] and inject
//! write failures.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Operations the record store needs from a filesystem.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write `contents` to `path`, replacing it unless `append` is set.
    fn write(&self, path: &Path, contents: &str, append: bool) -> io::Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Entries directly inside `dir`, files and directories alike.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Entries of `dir` whose file name satisfies `pattern`.
    fn list_files(&self, dir: &Path, pattern: &dyn Fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .list(dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| pattern(name))
            })
            .collect())
    }
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str, append: bool) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    /// Renames, then syncs the parent directory so the new entry survives a crash.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)?;
        sync_parent(to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::File::open(parent)?.sync_all(),
        _ => fs::File::open(".")?.sync_all(),
    }
}

// Directories cannot be opened for syncing here
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    /// Writes to files whose name contains this fragment fail
    failing_writes: Option<String>,
    failing_removes: bool,
}

/// In-memory filesystem with write-failure injection.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to a file whose name contains `fragment` fail.
    pub fn fail_writes_to(&self, fragment: impl Into<String>) {
        self.state.lock().failing_writes = Some(fragment.into());
    }

    /// Make every `remove_dir_all` fail.
    pub fn fail_removes(&self) {
        self.state.lock().failing_removes = true;
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_writes = None;
        state.failing_removes = false;
    }

    /// Current contents of a file.
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    /// Overwrite a file directly, bypassing failure injection.
    pub fn set_contents(&self, path: &Path, contents: impl Into<String>) {
        self.state.lock().files.insert(path.to_path_buf(), contents.into());
    }

    /// Remove a single file.
    pub fn remove_file(&self, path: &Path) -> bool {
        self.state.lock().files.remove(path).is_some()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path).ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, contents: &str, append: bool) -> io::Result<()> {
        let mut state = self.state.lock();

        if let Some(fragment) = &state.failing_writes {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.contains(fragment.as_str()) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("injected write failure for {}", path.display()),
                ));
            }
        }

        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !state.dirs.contains(parent) => {
                return Err(Self::not_found(parent));
            }
            _ => {}
        }

        let file = state.files.entry(path.to_path_buf()).or_default();
        if !append {
            file.clear();
        }
        file.push_str(contents);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        let contents = state.files.remove(from).ok_or_else(|| Self::not_found(from))?;
        state.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock();
        if !state.dirs.contains(dir) {
            return Err(Self::not_found(dir));
        }

        let children = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.failing_removes {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected remove failure for {}", path.display()),
            ));
        }
        if !state.dirs.contains(path) {
            return Err(Self::not_found(path));
        }
        state.files.retain(|file, _| !file.starts_with(path));
        state.dirs.retain(|dir| !dir.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }
}
