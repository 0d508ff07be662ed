//! Filesystem abstraction.
//!
//! `LocalFileSystem` is the production implementation over `tokio::fs`;
//! `InMemoryFileSystem` backs tests and lets them pin modification times.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use super::clock::{Clock, SystemClock};
use crate::error::{LoopError, Result};

/// Metadata the core needs about a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Storage surface used by the loop core.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String>;
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    async fn write(&self, path: &Path, content: &str) -> Result<()>;
    async fn append(&self, path: &Path, content: &str) -> Result<()>;
    async fn exists(&self, path: &Path) -> bool;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    async fn stat(&self, path: &Path) -> Result<FileStat>;
    /// Entry names (not full paths) in `path`, sorted.
    async fn read_dir(&self, path: &Path) -> Result<Vec<String>>;
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    async fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Real filesystem over `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        Ok(tokio::fs::write(path, content).await?)
    }

    async fn append(&self, path: &Path, content: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        Ok(FileStat {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified,
        })
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::copy(from, to).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::remove_file(path).await?)
    }
}

#[derive(Debug, Clone)]
struct MemFile {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemState {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
}

impl MemState {
    fn add_parents(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }
}

/// Filesystem held entirely in memory. Writes create missing parent directories.
pub struct InMemoryFileSystem {
    state: Mutex<MemState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp modification times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemState::default()),
            clock,
        }
    }

    /// Override the modification time of an existing file.
    pub fn set_modified(&self, path: impl AsRef<Path>, modified: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        match state.files.get_mut(path.as_ref()) {
            Some(file) => {
                file.modified = modified;
                Ok(())
            }
            None => Err(not_found(path.as_ref())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put(&self, path: &Path, content: Vec<u8>) {
        let modified = self.clock.now();
        let mut state = self.lock();
        state.add_parents(path);
        state.files.insert(path.to_path_buf(), MemFile { content, modified });
    }
}

fn not_found(path: &Path) -> LoopError {
    LoopError::Io(std::io::Error::new(
        ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    ))
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|e| LoopError::Storage(e.to_string()))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.lock()
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.put(path, content.as_bytes().to_vec());
        Ok(())
    }

    async fn append(&self, path: &Path, content: &str) -> Result<()> {
        let mut bytes = self.lock().files.get(path).map(|f| f.content.clone()).unwrap_or_default();
        bytes.extend_from_slice(content.as_bytes());
        self.put(path, bytes);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state.add_parents(path);
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let state = self.lock();
        if let Some(file) = state.files.get(path) {
            return Ok(FileStat {
                is_file: true,
                is_dir: false,
                size: file.content.len() as u64,
                modified: file.modified,
            });
        }
        if state.dirs.contains(path) {
            return Ok(FileStat {
                is_file: false,
                is_dir: true,
                size: 0,
                modified: self.clock.now(),
            });
        }
        Err(not_found(path))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let state = self.lock();
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        let children = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
        Ok(children.collect::<BTreeSet<_>>().into_iter().collect())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let bytes = self.read(from).await?;
        self.put(to, bytes);
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match self.lock().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(not_found(path)),
        }
    }
}
