//! Injected environment capabilities
//!
//! Everything that touches time, the filesystem or child processes goes
//! through one of these traits so the loop can be driven deterministically
//! in tests:
//! - **Clock**: wall-clock timestamps
//! - **Timer**: interruptible inter-cycle delay
//! - **FileSystem**: the only I/O surface the core touches
//! - **ProcessRunner**: external commands (backup archives)

mod clock;
mod fs;
mod process;
mod timer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use fs::{FileStat, FileSystem, InMemoryFileSystem, LocalFileSystem};
pub use process::{InMemoryProcessRunner, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use timer::{ImmediateTimer, Timer, TokioTimer};
