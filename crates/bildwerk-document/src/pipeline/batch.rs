// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch run — collects the PDFs to process and runs them one after another,
// so a broken document never stops the rest.

use std::path::{Path, PathBuf};

use bildwerk_core::config::ExtractConfig;
use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::report::{BatchReport, DocumentOutcome};
use tracing::{error, info, instrument};

use super::document::DocumentRun;
use crate::pdf::PdfAssetSource;

/// Expand `inputs` into the PDF files to process.
///
/// Directories contribute their `*.pdf` entries (extension matched without
/// regard to case, not recursive), sorted by file name. Files are taken as
/// given, in the order given.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .map_err(|err| {
                    BildwerkError::Config(format!("cannot read {}: {err}", input.display()))
                })?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && is_pdf(path))
                .collect();
            found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            info!(folder = %input.display(), documents = found.len(), "Input folder scanned");
            documents.extend(found);
        } else if input.is_file() {
            documents.push(input.clone());
        } else {
            return Err(BildwerkError::Config(format!(
                "input {} does not exist",
                input.display()
            )));
        }
    }

    Ok(documents)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
}

/// Runs the image extraction over many documents into one output root.
#[derive(Debug, Clone, Copy)]
pub struct BatchRun<'a> {
    run: DocumentRun<'a>,
}

impl<'a> BatchRun<'a> {
    pub fn new(root: &'a Path, config: &'a ExtractConfig) -> Self {
        Self {
            run: DocumentRun::new(root, config),
        }
    }

    /// Process every document in order.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn run(&self, documents: &[PathBuf]) -> BatchReport {
        let mut batch = BatchReport::new();

        for path in documents {
            let outcome = PdfAssetSource::open(path).and_then(|source| self.run.images(&source));
            let outcome = match outcome {
                Ok(report) => DocumentOutcome::Completed(report),
                Err(err) => {
                    error!(document = %path.display(), %err, "Document failed");
                    DocumentOutcome::Failed {
                        document: document_name(path),
                        reason: err.to_string(),
                    }
                }
            };
            batch.documents.push(outcome);
        }

        batch.finish();
        info!(
            canonical = batch.canonical_count(),
            duplicates = batch.duplicate_count(),
            status = ?batch.status(),
            "Batch complete"
        );
        batch
    }
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
