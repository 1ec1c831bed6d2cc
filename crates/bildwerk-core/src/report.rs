// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run reports — per-asset issues aggregated per document and per batch,
// plus the process exit status derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssetId, DuplicateGroup};

/// Pipeline stage an issue was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Resolving asset bytes from the document.
    Load,
    /// Table detection on a page.
    Detect,
    /// Rendering a page region.
    Render,
    Composite,
    Hash,
    /// Materializing the asset file.
    Stage,
    /// Sidecar or final file placement.
    Write,
    /// Work lost before reaching the in-order consumer.
    Pipeline,
}

/// Whether the asset survived the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Recovered; the asset continues with a fallback.
    Recovered,
    /// The asset was dropped from the run.
    Skipped,
}

/// One problem recorded against one asset (or one page for detection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIssue {
    pub asset: AssetId,
    pub stage: Stage,
    pub severity: Severity,
    pub reason: String,
}

impl AssetIssue {
    pub fn skipped(asset: AssetId, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            asset,
            stage,
            severity: Severity::Skipped,
            reason: reason.into(),
        }
    }

    pub fn recovered(asset: AssetId, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            asset,
            stage,
            severity: Severity::Recovered,
            reason: reason.into(),
        }
    }
}

/// A canonical asset as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenAsset {
    pub file_name: String,
    pub sidecar: String,
    pub group: DuplicateGroup,
}

/// Outcome of one document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Document stem as found on disk (unsanitized).
    pub document: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Assets the source enumerated.
    pub assets_seen: usize,
    /// Canonical assets, in traversal order.
    pub written: Vec<WrittenAsset>,
    /// Files removed because their content was already canonical.
    pub duplicates_removed: usize,
    pub issues: Vec<AssetIssue>,
}

impl DocumentReport {
    pub fn new(document: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            document: document.into(),
            started_at: now,
            finished_at: now,
            assets_seen: 0,
            written: Vec::new(),
            duplicates_removed: 0,
            issues: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn record(&mut self, issue: AssetIssue) {
        self.issues.push(issue);
    }

    pub fn skipped(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Skipped)
            .count()
    }

    /// No issue of any severity was recorded.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// How a document in a batch ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Completed(DocumentReport),
    /// The document could not be opened or its output folders created.
    Failed { document: String, reason: String },
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: Vec<DocumentOutcome>,
}

/// Process exit status for a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every document completed without issues.
    Clean,
    /// Every document completed, some assets had issues.
    Partial,
    /// At least one document could not be processed.
    DocumentFailures,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::Partial => 3,
            RunStatus::DocumentFailures => 4,
        }
    }
}

impl BatchReport {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            documents: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn status(&self) -> RunStatus {
        let mut status = RunStatus::Clean;
        for outcome in &self.documents {
            match outcome {
                DocumentOutcome::Failed { .. } => return RunStatus::DocumentFailures,
                DocumentOutcome::Completed(report) if !report.is_clean() => {
                    status = RunStatus::Partial;
                }
                DocumentOutcome::Completed(_) => {}
            }
        }
        status
    }

    pub fn canonical_count(&self) -> usize {
        self.completed().map(|r| r.written.len()).sum()
    }

    pub fn duplicate_count(&self) -> usize {
        self.completed().map(|r| r.duplicates_removed).sum()
    }

    fn completed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter_map(|o| match o {
            DocumentOutcome::Completed(report) => Some(report),
            DocumentOutcome::Failed { .. } => None,
        })
    }
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}
