//! External process execution.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{LoopError, Result};

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program to completion and captures its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        log::debug!("process: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| LoopError::Process(format!("failed to spawn {}: {}", program, e)))?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runner that replays queued outputs in FIFO order and records invocations.
#[derive(Debug, Default)]
pub struct InMemoryProcessRunner {
    queue: Mutex<VecDeque<ProcessOutput>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl InMemoryProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, output: ProcessOutput) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push_back(output);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ProcessRunner for InMemoryProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((program.to_string(), args.to_vec()));
        // An empty queue behaves like a silent, successful command.
        Ok(self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_runner_replays_in_order() {
        let runner = InMemoryProcessRunner::new();
        runner.enqueue(ProcessOutput {
            exit_code: 0,
            stdout: "first".into(),
            stderr: String::new(),
        });
        runner.enqueue(ProcessOutput {
            exit_code: 2,
            stdout: String::new(),
            stderr: "second".into(),
        });

        let a = runner.run("tar", &["-czf".into()]).await.unwrap();
        let b = runner.run("tar", &["-tzf".into()]).await.unwrap();
        let c = runner.run("tar", &[]).await.unwrap();

        assert_eq!(a.stdout, "first");
        assert!(a.success());
        assert_eq!(b.stderr, "second");
        assert!(!b.success());
        assert!(c.success());
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(runner.calls()[1].1, vec!["-tzf".to_string()]);
    }

    #[tokio::test]
    async fn test_tokio_runner_captures_stdout() {
        let runner = TokioProcessRunner;
        let out = runner.run("echo", &["hello".into()]).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_tokio_runner_missing_program_is_error() {
        let runner = TokioProcessRunner;
        let result = runner.run("definitely-not-a-real-program-xyz", &[]).await;
        assert!(matches!(result, Err(LoopError::Process(_))));
    }
}
