//! Substrate file layout and mutations.
//!
//! The substrate is a directory of markdown files the agent reads and
//! edits. Each file has a fixed name and a write mode: most are rewritten
//! whole, the logs are append-only.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::env::FileSystem;
use crate::error::{LoopError, Result};

/// A logical substrate file. Used as the per-file lock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstrateFile {
    Plan,
    Progress,
    Conversation,
    Memory,
    Habits,
    Skills,
    Values,
    Id,
    Security,
    Charter,
    Superego,
}

impl SubstrateFile {
    pub const ALL: [SubstrateFile; 11] = [
        SubstrateFile::Plan,
        SubstrateFile::Progress,
        SubstrateFile::Conversation,
        SubstrateFile::Memory,
        SubstrateFile::Habits,
        SubstrateFile::Skills,
        SubstrateFile::Values,
        SubstrateFile::Id,
        SubstrateFile::Security,
        SubstrateFile::Charter,
        SubstrateFile::Superego,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            SubstrateFile::Plan => "PLAN.md",
            SubstrateFile::Progress => "PROGRESS.md",
            SubstrateFile::Conversation => "CONVERSATION.md",
            SubstrateFile::Memory => "MEMORY.md",
            SubstrateFile::Habits => "HABITS.md",
            SubstrateFile::Skills => "SKILLS.md",
            SubstrateFile::Values => "VALUES.md",
            SubstrateFile::Id => "ID.md",
            SubstrateFile::Security => "SECURITY.md",
            SubstrateFile::Charter => "CHARTER.md",
            SubstrateFile::Superego => "SUPEREGO.md",
        }
    }

    /// Logs only ever grow; everything else is rewritten whole.
    pub fn is_append_only(&self) -> bool {
        matches!(self, SubstrateFile::Progress | SubstrateFile::Conversation)
    }

    pub fn path_in(&self, substrate: &Path) -> PathBuf {
        substrate.join(self.file_name())
    }
}

impl fmt::Display for SubstrateFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Subdirectory holding long-term memory notes.
pub const MEMORY_DIR: &str = "memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Write,
    Append,
}

/// A change to one substrate file produced by a dispatched task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateMutation {
    pub file: SubstrateFile,
    pub kind: MutationKind,
    pub content: String,
}

impl SubstrateMutation {
    pub fn write(file: SubstrateFile, content: impl Into<String>) -> Self {
        Self {
            file,
            kind: MutationKind::Write,
            content: content.into(),
        }
    }

    pub fn append(file: SubstrateFile, content: impl Into<String>) -> Self {
        Self {
            file,
            kind: MutationKind::Append,
            content: content.into(),
        }
    }
}

/// Applies substrate mutations. Callers hold the file's lock while applying.
#[async_trait]
pub trait SubstrateWriter: Send + Sync {
    async fn apply(&self, mutation: &SubstrateMutation) -> Result<()>;
}

/// Writer over a `FileSystem` that refuses to overwrite append-only logs.
pub struct FsSubstrateWriter {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FsSubstrateWriter {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self { fs, root: root.into() }
    }
}

#[async_trait]
impl SubstrateWriter for FsSubstrateWriter {
    async fn apply(&self, mutation: &SubstrateMutation) -> Result<()> {
        let path = mutation.file.path_in(&self.root);
        match mutation.kind {
            MutationKind::Write if mutation.file.is_append_only() => Err(LoopError::Storage(format!(
                "{} is append-only",
                mutation.file
            ))),
            MutationKind::Write => self.fs.write(&path, &mutation.content).await,
            MutationKind::Append => self.fs.append(&path, &mutation.content).await,
        }
    }
}
