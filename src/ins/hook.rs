//! The rule engine itself.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use super::compliance::ComplianceStore;
use super::types::{InsAction, InsActionKind, InsResult, LastTaskResult, TaskResult};
use crate::config::InsConfig;
use crate::env::{Clock, FileSystem};
use crate::error::Result;
use crate::substrate::{MEMORY_DIR, SubstrateFile};

/// Role whose repeated partials are flagged.
const FLAGGED_ROLE: &str = "Ego";

const SUPERSEDED_MARKER: &str = "superseded";

/// Blocking phrases in a task summary, tried in order; first match wins.
static PRECONDITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?im)(?:blocked by|waiting for|precondition:|awaiting|depends on|gated on)\s*["“”]?(.+?)["“”]?\s*$"#,
        r"(?im)(?:cannot proceed|unable to continue).*?(?:until|because)\s+(.+?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("precondition pattern is valid"))
    .collect()
});

/// Pull the stated precondition out of a partial task's summary.
pub fn extract_precondition(summary: &str) -> Option<String> {
    PRECONDITION_PATTERNS.iter().find_map(|re| {
        re.captures(summary)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Runs the five pre-cycle rules against the substrate.
pub struct InsHook {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    substrate: PathBuf,
    config: InsConfig,
    compliance: ComplianceStore,
}

impl InsHook {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
        substrate: impl Into<PathBuf>,
        config: InsConfig,
        compliance: ComplianceStore,
    ) -> Self {
        Self {
            fs,
            clock,
            substrate: substrate.into(),
            config,
            compliance,
        }
    }

    pub fn compliance(&self) -> &ComplianceStore {
        &self.compliance
    }

    /// Evaluate every rule. Never fails; a rule that errors contributes nothing,
    /// and an evaluation over budget yields a noop result.
    pub async fn evaluate(&mut self, cycle: u64, last: Option<&LastTaskResult>) -> InsResult {
        let budget_ms = self.config.budget_ms;
        let outcome = tokio::time::timeout(Duration::from_millis(budget_ms), self.run_rules(cycle, last)).await;
        let Ok(actions) = outcome else {
            log::warn!("ins: cycle {} evaluation exceeded {}ms budget", cycle, budget_ms);
            return InsResult::noop();
        };

        if !actions.is_empty() {
            let kinds: Vec<String> = actions.iter().map(|a| a.kind.to_string()).collect();
            log::debug!("ins: cycle {} produced {} action(s): {}", cycle, actions.len(), kinds.join(", "));
        }
        InsResult::from_actions(actions)
    }

    async fn run_rules(&mut self, cycle: u64, last: Option<&LastTaskResult>) -> Vec<InsAction> {
        let mut actions = Vec::new();

        let line_rules = [
            (SubstrateFile::Conversation, self.config.conversation_line_threshold),
            (SubstrateFile::Progress, self.config.progress_line_threshold),
        ];
        for (file, threshold) in line_rules {
            match self.check_line_count(file, threshold).await {
                Ok(action) => actions.extend(action),
                Err(e) => log::debug!("ins: {} line check failed: {}", file, e),
            }
        }

        match self.check_memory_size().await {
            Ok(action) => actions.extend(action),
            Err(e) => log::debug!("ins: memory size check failed: {}", e),
        }

        actions.extend(self.check_consecutive_partials(cycle, last).await);

        match self.check_archive_candidates().await {
            Ok(found) => actions.extend(found),
            Err(e) => log::debug!("ins: archive scan failed: {}", e),
        }

        actions
    }

    async fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if !self.fs.exists(path).await {
            return Ok(None);
        }
        self.fs.read_to_string(path).await.map(Some)
    }

    async fn check_line_count(&self, file: SubstrateFile, threshold: usize) -> Result<Option<InsAction>> {
        let Some(content) = self.read_optional(&file.path_in(&self.substrate)).await? else {
            return Ok(None);
        };
        let lines = content.split('\n').count();
        if lines <= threshold {
            return Ok(None);
        }
        Ok(Some(InsAction::new(
            InsActionKind::Compaction,
            file.file_name(),
            format!("Line count {} exceeds threshold {} (compaction recommended)", lines, threshold),
        )))
    }

    async fn check_memory_size(&self) -> Result<Option<InsAction>> {
        let file = SubstrateFile::Memory;
        let Some(content) = self.read_optional(&file.path_in(&self.substrate)).await? else {
            return Ok(None);
        };
        // UTF-16 code units, so non-BMP characters count twice.
        let chars = content.encode_utf16().count();
        if chars <= self.config.memory_char_threshold {
            return Ok(None);
        }
        let tokens = (chars as f64 / 4.0).round() as u64;
        Ok(Some(InsAction::new(
            InsActionKind::Compaction,
            file.file_name(),
            format!(
                "Character count {} (~{} tokens) exceeds threshold (summary recommended)",
                chars, tokens
            ),
        )))
    }

    async fn check_consecutive_partials(&mut self, cycle: u64, last: Option<&LastTaskResult>) -> Option<InsAction> {
        let last = last?;
        match last.result {
            TaskResult::Partial => {
                let precondition = last.summary.as_deref().and_then(extract_precondition)?;
                self.compliance.record_partial(&precondition, cycle);
                self.compliance.save().await;

                let count = self.compliance.partial_count(&precondition);
                if count < self.config.consecutive_partial_threshold {
                    return None;
                }
                Some(InsAction {
                    kind: InsActionKind::ComplianceFlag,
                    target: FLAGGED_ROLE.to_string(),
                    detail: format!(
                        "Consecutive-partial pattern detected ({} cycles). Stated precondition: \"{}\". \
                         Possible constructed constraint; examine whether this precondition is real.",
                        count, precondition
                    ),
                    flagged_pattern: Some(precondition),
                })
            }
            TaskResult::Success => {
                self.compliance.clear_all();
                if self.compliance.is_dirty() {
                    self.compliance.save().await;
                }
                None
            }
            TaskResult::Failure => None,
        }
    }

    async fn check_archive_candidates(&self) -> Result<Vec<InsAction>> {
        let dir = self.substrate.join(MEMORY_DIR);
        if !self.fs.exists(&dir).await {
            return Ok(Vec::new());
        }

        let entries = self.fs.read_dir(&dir).await?;
        if entries.len() > self.config.archive_scan_max_files {
            log::debug!(
                "ins: {} has {} entries, skipping archive scan (> {})",
                dir.display(),
                entries.len(),
                self.config.archive_scan_max_files
            );
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let min_age = chrono::Duration::days(self.config.archive_age_days);
        let mut actions = Vec::new();

        for entry in entries {
            let path = dir.join(&entry);
            match self.archive_candidate(&path, now, min_age).await {
                Ok(Some(age_days)) => actions.push(InsAction::new(
                    InsActionKind::ArchiveTag,
                    entry,
                    format!(
                        "File is {} days old and contains SUPERSEDED marker (archive candidate)",
                        age_days
                    ),
                )),
                Ok(None) => {}
                Err(e) => log::debug!("ins: skipping {}: {}", path.display(), e),
            }
        }
        Ok(actions)
    }

    /// Age in days if the file is old enough and marked superseded.
    async fn archive_candidate(
        &self,
        path: &Path,
        now: chrono::DateTime<chrono::Utc>,
        min_age: chrono::Duration,
    ) -> Result<Option<i64>> {
        let stat = self.fs.stat(path).await?;
        if !stat.is_file {
            return Ok(None);
        }
        let age = now - stat.modified;
        if age < min_age {
            return Ok(None);
        }
        let content = self.fs.read_to_string(path).await?;
        if !content.to_lowercase().contains(SUPERSEDED_MARKER) {
            return Ok(None);
        }
        let age_days = (age.num_milliseconds() as f64 / 86_400_000.0).round() as i64;
        Ok(Some(age_days))
    }
}
