// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Asset writer — materializes composited assets, removes the ones later
// judged duplicate, and writes one JSON sidecar per canonical asset.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bildwerk_core::config::ExtractConfig;
use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::naming::{sanitize_stem, sidecar_file_name};
use bildwerk_core::report::{AssetIssue, DocumentReport, Stage, WrittenAsset};
use bildwerk_core::AssetId;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::dedupe::Resolution;

/// Folder structure for one document's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub document_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub metadata_dir: PathBuf,
}

impl OutputLayout {
    /// `<root>/<sanitized stem>/{asset_dir_name, metadata_dir_name}`.
    pub fn new(root: &Path, stem: &str, config: &ExtractConfig) -> Self {
        let document_dir = root.join(sanitize_stem(stem, config.naming.max_stem_chars));
        Self {
            asset_dir: document_dir.join(&config.asset_dir_name),
            metadata_dir: document_dir.join(&config.metadata_dir_name),
            document_dir,
        }
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.asset_dir)?;
        std::fs::create_dir_all(&self.metadata_dir)?;
        Ok(())
    }
}

/// JSON sidecar written next to every canonical asset.
///
/// `Summary` and `LinkToSP` are placeholders filled in by a later process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sidecar<'a> {
    pub source_pdf: &'a str,
    pub file_name: &'a str,
    pub pdf_page_number: u32,
    #[serde(rename = "Summary")]
    pub summary: &'a str,
    #[serde(rename = "LinkToSP")]
    pub link_to_sp: &'a str,
}

/// An asset file already written to the asset folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub id: AssetId,
    pub file_name: String,
    pub path: PathBuf,
}

/// Writes the output of one document run.
#[derive(Debug, Clone)]
pub struct AssetWriter {
    layout: OutputLayout,
    /// Unsanitized document stem, as recorded in sidecars.
    source: String,
}

impl AssetWriter {
    /// Create the output folders and a writer for them.
    pub fn create(layout: OutputLayout, source: impl Into<String>) -> Result<Self> {
        layout.create()?;
        Ok(Self {
            layout,
            source: source.into(),
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Write one asset's bytes under `file_name`. Best effort, not retried.
    pub fn stage(&self, id: AssetId, file_name: &str, bytes: &[u8]) -> Result<StagedAsset> {
        let path = self.layout.asset_dir.join(file_name);
        std::fs::write(&path, bytes).map_err(|err| BildwerkError::Write {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        debug!(asset = %id, file = file_name, bytes = bytes.len(), "Asset staged");
        Ok(StagedAsset {
            id,
            file_name: file_name.to_string(),
            path,
        })
    }

    /// Delete a staged file that will not be part of the output.
    pub fn discard(&self, asset: &StagedAsset) -> Result<()> {
        remove_if_present(&asset.path).map_err(|err| BildwerkError::Write {
            path: asset.path.display().to_string(),
            reason: err.to_string(),
        })?;
        debug!(asset = %asset.id, file = %asset.file_name, "Staged asset discarded");
        Ok(())
    }

    /// Remove duplicate files and write sidecars for canonical assets.
    ///
    /// Running it twice over the same input leaves the same files behind.
    #[instrument(skip_all, fields(document = %self.source))]
    pub fn finalize(
        &self,
        resolution: &Resolution,
        staged: &HashMap<AssetId, StagedAsset>,
        report: &mut DocumentReport,
    ) {
        for id in &resolution.duplicates {
            let Some(asset) = staged.get(id) else {
                continue;
            };
            match remove_if_present(&asset.path) {
                Ok(()) => {
                    report.duplicates_removed += 1;
                    info!(file = %asset.file_name, "Removed duplicate asset");
                }
                Err(err) => {
                    warn!(file = %asset.file_name, %err, "Could not remove duplicate asset");
                    report.record(AssetIssue::recovered(
                        *id,
                        Stage::Write,
                        format!("duplicate left on disk: {err}"),
                    ));
                }
            }
        }

        for group in &resolution.groups {
            let Some(asset) = staged.get(&group.canonical) else {
                report.record(AssetIssue::skipped(
                    group.canonical,
                    Stage::Write,
                    "canonical asset was never staged",
                ));
                continue;
            };
            if !asset.path.is_file() {
                report.record(AssetIssue::skipped(
                    group.canonical,
                    Stage::Write,
                    format!("{} disappeared before finalize", asset.path.display()),
                ));
                continue;
            }

            let pages = group.duplicate_pages();
            if !pages.is_empty() {
                info!(file = %asset.file_name, also_on = ?pages, "Asset appears on several pages");
            }

            match self.write_sidecar(asset, group.canonical.page) {
                Ok(sidecar) => report.written.push(WrittenAsset {
                    file_name: asset.file_name.clone(),
                    sidecar,
                    group: group.clone(),
                }),
                Err(err) => {
                    warn!(file = %asset.file_name, %err, "Sidecar not written");
                    report.record(AssetIssue::skipped(
                        group.canonical,
                        Stage::Write,
                        err.to_string(),
                    ));
                }
            }
        }
    }

    fn write_sidecar(&self, asset: &StagedAsset, page: u32) -> Result<String> {
        let sidecar = Sidecar {
            source_pdf: &self.source,
            file_name: &asset.file_name,
            pdf_page_number: page,
            summary: "",
            link_to_sp: "",
        };
        let name = sidecar_file_name(&asset.file_name);
        let path = self.layout.metadata_dir.join(&name);

        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        sidecar.serialize(&mut serializer)?;

        std::fs::write(&path, json).map_err(|err| BildwerkError::Write {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        debug!(sidecar = %name, "Sidecar written");
        Ok(name)
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bildwerk_core::{DuplicateGroup, MatchTier, Occurrence};

    fn writer(root: &Path) -> AssetWriter {
        let layout = OutputLayout::new(root, "設計:書", &ExtractConfig::default());
        AssetWriter::create(layout, "設計:書").unwrap()
    }

    fn resolution(a: AssetId, b: AssetId, c: AssetId) -> Resolution {
        let mut group = DuplicateGroup::new(a);
        group.occurrences.push(Occurrence {
            asset: b,
            page: b.page,
            tier: MatchTier::Binary,
        });
        Resolution {
            groups: vec![group, DuplicateGroup::new(c)],
            duplicates: vec![b],
        }
    }

    #[test]
    fn layout_uses_sanitized_stem() {
        let layout = OutputLayout::new(Path::new("/out"), "a/b", &ExtractConfig::default());
        assert_eq!(layout.document_dir, PathBuf::from("/out/a_b"));
        assert_eq!(layout.asset_dir, PathBuf::from("/out/a_b/Image"));
        assert_eq!(layout.metadata_dir, PathBuf::from("/out/a_b/JSON"));
    }

    #[test]
    fn discard_removes_staged_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let staged = writer.stage(AssetId::new(1, 0), "x.png", b"pixels").unwrap();

        writer.discard(&staged).unwrap();
        assert!(!staged.path.exists());
        writer.discard(&staged).unwrap();
    }

    #[test]
    fn finalize_removes_duplicates_and_writes_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let (a, b, c) = (AssetId::new(1, 0), AssetId::new(2, 0), AssetId::new(3, 0));

        let mut staged = HashMap::new();
        for (id, name) in [(a, "a.png"), (b, "b.png"), (c, "c.png")] {
            staged.insert(id, writer.stage(id, name, b"pixels").unwrap());
        }

        let mut report = DocumentReport::new("設計:書");
        writer.finalize(&resolution(a, b, c), &staged, &mut report);

        let assets = &writer.layout().asset_dir;
        assert!(assets.join("a.png").is_file());
        assert!(!assets.join("b.png").exists());
        assert!(assets.join("c.png").is_file());
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.written.len(), 2);
        assert!(report.is_clean());

        let sidecar = std::fs::read_to_string(writer.layout().metadata_dir.join("a.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(value["source_pdf"], "設計:書");
        assert_eq!(value["file_name"], "a.png");
        assert_eq!(value["pdf_page_number"], 1);
        assert_eq!(value["Summary"], "");
        assert_eq!(value["LinkToSP"], "");
        // Non-ASCII stays readable and keys are indented by four spaces.
        assert!(sidecar.contains("設計:書"));
        assert!(sidecar.contains("\n    \"source_pdf\""));
        assert!(!writer.layout().metadata_dir.join("b.json").exists());
    }

    #[test]
    fn finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let (a, b, c) = (AssetId::new(1, 0), AssetId::new(2, 0), AssetId::new(3, 0));
        let mut staged = HashMap::new();
        for (id, name) in [(a, "a.png"), (b, "b.png"), (c, "c.png")] {
            staged.insert(id, writer.stage(id, name, b"pixels").unwrap());
        }
        let resolution = resolution(a, b, c);

        let mut first = DocumentReport::new("doc");
        writer.finalize(&resolution, &staged, &mut first);
        let mut second = DocumentReport::new("doc");
        writer.finalize(&resolution, &staged, &mut second);

        assert_eq!(first.written, second.written);
        assert!(second.is_clean());
        let mut files: Vec<_> = std::fs::read_dir(&writer.layout().asset_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["a.png", "c.png"]);
    }

    #[test]
    fn missing_canonical_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let a = AssetId::new(1, 0);
        let staged_asset = writer.stage(a, "a.png", b"x").unwrap();
        std::fs::remove_file(&staged_asset.path).unwrap();
        let staged = HashMap::from([(a, staged_asset)]);

        let resolution = Resolution {
            groups: vec![DuplicateGroup::new(a)],
            duplicates: vec![],
        };
        let mut report = DocumentReport::new("doc");
        writer.finalize(&resolution, &staged, &mut report);
        assert!(report.written.is_empty());
        assert_eq!(report.skipped(), 1);
    }
}
