// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document run — drives one document's assets through load, composite,
// hash and stage on worker threads, folds duplicates in page order and
// finalizes the output folder.

use std::collections::HashMap;
use std::path::Path;

use bildwerk_core::config::ExtractConfig;
use bildwerk_core::error::Result;
use bildwerk_core::naming::{AssetLabel, AssetNamer};
use bildwerk_core::report::{AssetIssue, DocumentReport, Stage};
use bildwerk_core::{AssetId, HashKey, RawAsset};
use tracing::{debug, info, instrument, warn};

use super::ordered::OrderedPipeline;
use crate::dedupe::DuplicateResolver;
use crate::image::{HashComputer, MaskCompositor};
use crate::output::{AssetWriter, OutputLayout, StagedAsset};
use crate::source::AssetSource;
use crate::table::{PageSurface, TableCapture, TableExtractor};

/// Runs documents into one output root.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRun<'a> {
    root: &'a Path,
    config: &'a ExtractConfig,
}

/// What the workers hand to the in-order consumer for one asset.
#[derive(Debug)]
struct Prepared {
    id: AssetId,
    /// `None` when the asset was dropped before reaching the asset folder.
    staged: Option<StagedAsset>,
    /// `None` when hashing failed; the asset is then kept as unique.
    key: Option<HashKey>,
    /// Keep without matching (full-page captures with dedupe turned off).
    bypass: bool,
    issues: Vec<AssetIssue>,
}

impl Prepared {
    fn new(id: AssetId) -> Self {
        Self {
            id,
            staged: None,
            key: None,
            bypass: false,
            issues: Vec::new(),
        }
    }

    fn skip(mut self, stage: Stage, reason: impl Into<String>) -> Self {
        self.issues.push(AssetIssue::skipped(self.id, stage, reason));
        self
    }

    /// Hash `bytes`, then write them under `file_name`.
    fn hash_and_stage(
        mut self,
        hasher: &HashComputer,
        writer: &AssetWriter,
        file_name: &str,
        bytes: &[u8],
    ) -> Self {
        match hasher.compute(bytes) {
            Ok(key) => self.key = Some(key),
            Err(err) => {
                warn!(asset = %self.id, %err, "Hashing failed, kept as unique");
                self.issues
                    .push(AssetIssue::recovered(self.id, Stage::Hash, err.to_string()));
            }
        }

        match writer.stage(self.id, file_name, bytes) {
            Ok(staged) => self.staged = Some(staged),
            Err(err) => {
                warn!(asset = %self.id, %err, "Asset not staged");
                return self.skip(Stage::Stage, err.to_string());
            }
        }
        self
    }
}

/// In-order consumer state for one document.
struct Collector {
    resolver: DuplicateResolver,
    staged: HashMap<AssetId, StagedAsset>,
    report: DocumentReport,
}

impl Collector {
    fn new(report: DocumentReport) -> Self {
        Self {
            resolver: DuplicateResolver::new(),
            staged: HashMap::new(),
            report,
        }
    }

    fn accept(&mut self, prepared: Prepared, writer: &AssetWriter) {
        let Prepared {
            id,
            staged,
            key,
            bypass,
            issues,
        } = prepared;
        for issue in issues {
            self.report.record(issue);
        }
        let Some(staged) = staged else {
            return;
        };

        let verdict = if bypass {
            self.resolver.admit_unique(id)
        } else {
            self.resolver.observe(id, key.as_ref())
        };
        match verdict {
            Ok(verdict) => {
                debug!(asset = %id, ?verdict, "Asset resolved");
                self.staged.insert(id, staged);
            }
            Err(err) => {
                warn!(asset = %id, %err, "Asset rejected by resolver");
                self.report
                    .record(AssetIssue::skipped(id, Stage::Pipeline, err.to_string()));
                if let Err(err) = writer.discard(&staged) {
                    warn!(asset = %id, %err, "Rejected asset left on disk");
                    self.report
                        .record(AssetIssue::recovered(id, Stage::Write, err.to_string()));
                }
            }
        }
    }

    fn lost(&mut self, id: AssetId) {
        self.report.record(AssetIssue::skipped(
            id,
            Stage::Pipeline,
            "worker terminated before finishing the asset",
        ));
    }

    fn finish(mut self, writer: &AssetWriter) -> DocumentReport {
        let resolution = self.resolver.into_resolution();
        writer.finalize(&resolution, &self.staged, &mut self.report);
        self.report.finish();
        info!(
            canonical = self.report.written.len(),
            duplicates = self.report.duplicates_removed,
            issues = self.report.issues.len(),
            "Document complete"
        );
        self.report
    }
}

impl<'a> DocumentRun<'a> {
    pub fn new(root: &'a Path, config: &'a ExtractConfig) -> Self {
        Self { root, config }
    }

    fn pipeline(&self) -> OrderedPipeline {
        OrderedPipeline::new(self.config.workers, self.config.queue_depth)
    }

    fn writer(&self, stem: &str) -> Result<AssetWriter> {
        AssetWriter::create(OutputLayout::new(self.root, stem, self.config), stem)
    }

    /// Extract, deduplicate and write every embedded image of `source`.
    ///
    /// Errors only when the document cannot be run at all (no asset list,
    /// output folders not creatable). Per-asset problems end up in the
    /// returned report.
    #[instrument(skip_all, fields(document = %source.stem()))]
    pub fn images(&self, source: &dyn AssetSource) -> Result<DocumentReport> {
        let mut report = DocumentReport::new(source.stem());
        let assets = source.enumerate()?;
        report.assets_seen = assets.len();
        let writer = self.writer(source.stem())?;
        let namer = AssetNamer::new(source.stem(), &self.config.naming);
        let compositor = MaskCompositor::new();
        info!(assets = assets.len(), workers = self.config.workers, "Extracting images");

        let ids: Vec<AssetId> = assets.iter().map(|asset| asset.id).collect();
        let mut collector = Collector::new(report);
        let perceptual = self.config.perceptual_matching;

        let lost = self.pipeline().run(
            assets,
            || HashComputer::new(perceptual),
            |hasher, raw| prepare_image(source, &compositor, hasher, &namer, &writer, raw),
            |_, prepared| collector.accept(prepared, &writer),
        )?;
        for seq in lost {
            collector.lost(ids[seq]);
        }

        Ok(collector.finish(&writer))
    }

    /// Capture, deduplicate and write the tables of `surface`.
    #[instrument(skip_all, fields(document = %surface.stem()))]
    pub fn tables(
        &self,
        surface: &dyn PageSurface,
        extractor: &TableExtractor<'_>,
    ) -> Result<DocumentReport> {
        let mut report = DocumentReport::new(surface.stem());
        let captures = extractor.extract(surface, &mut report)?;
        report.assets_seen = captures.len();
        let writer = self.writer(surface.stem())?;
        let namer = AssetNamer::new(surface.stem(), &self.config.naming);
        let table_config = extractor.config();

        let ids: Vec<AssetId> = captures.iter().map(|capture| capture.id).collect();
        let mut collector = Collector::new(report);
        let perceptual = table_config.perceptual_matching;
        let dedupe_full_pages = table_config.dedupe_full_pages;

        let lost = self.pipeline().run(
            captures,
            || HashComputer::new(perceptual),
            |hasher, capture: TableCapture| {
                let file_name = namer.asset_file_name(capture.id.page, capture.label(), "png");
                let mut prepared = Prepared::new(capture.id);
                prepared.bypass = capture.is_full_page() && !dedupe_full_pages;
                prepared.hash_and_stage(hasher, &writer, &file_name, &capture.bytes)
            },
            |_, prepared| collector.accept(prepared, &writer),
        )?;
        for seq in lost {
            collector.lost(ids[seq]);
        }

        Ok(collector.finish(&writer))
    }
}

/// Worker stage for one embedded image.
fn prepare_image(
    source: &dyn AssetSource,
    compositor: &MaskCompositor,
    hasher: &HashComputer,
    namer: &AssetNamer,
    writer: &AssetWriter,
    raw: RawAsset,
) -> Prepared {
    let mut prepared = Prepared::new(raw.id);

    let loaded = match source.load(&raw) {
        Ok(loaded) => loaded,
        Err(err) => {
            warn!(asset = %raw.id, %err, "Asset not loadable, skipped");
            return prepared.skip(Stage::Load, err.to_string());
        }
    };
    for failure in loaded.mask_failures {
        prepared
            .issues
            .push(AssetIssue::recovered(raw.id, Stage::Load, failure.to_string()));
    }

    let composite = match compositor.composite(raw.id, loaded.bytes) {
        Ok(composite) => composite,
        Err(err) => {
            warn!(asset = %raw.id, %err, "Asset not decodable, skipped");
            return prepared.skip(Stage::Composite, err.to_string());
        }
    };
    if let Some(failure) = composite.mask_failure {
        prepared
            .issues
            .push(AssetIssue::recovered(raw.id, Stage::Composite, failure.to_string()));
    }

    let asset = composite.asset;
    let label = AssetLabel::Image {
        index: raw.id.index,
    };
    let file_name = namer.asset_file_name(raw.page(), label, &asset.extension);
    prepared.hash_and_stage(hasher, writer, &file_name, &asset.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LoadedAsset;
    use crate::table::tests::{FakeDetector, FakeSurface};
    use bildwerk_core::error::BildwerkError;
    use bildwerk_core::report::Severity;
    use bildwerk_core::{AssetBytes, EncodedImage, ObjectRef, PageGeometry, Rect};
    use image::{DynamicImage, ImageFormat, Luma, Rgb, RgbImage};

    fn png(image: &DynamicImage) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        image.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    fn solid(color: [u8; 3]) -> Vec<u8> {
        png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color))))
    }

    /// In-memory source: one entry per asset, bytes keyed by object number.
    struct MemorySource {
        assets: Vec<RawAsset>,
        objects: HashMap<u32, Vec<u8>>,
    }

    impl MemorySource {
        fn new() -> Self {
            Self {
                assets: Vec::new(),
                objects: HashMap::new(),
            }
        }

        fn object(&mut self, bytes: Vec<u8>) -> ObjectRef {
            let number = self.objects.len() as u32 + 1;
            self.objects.insert(number, bytes);
            ObjectRef::new(number, 0)
        }

        fn image(&mut self, page: u32, index: u32, bytes: Vec<u8>) -> AssetId {
            let base = self.object(bytes);
            self.push(page, index, base, None)
        }

        fn push(
            &mut self,
            page: u32,
            index: u32,
            base: ObjectRef,
            soft_mask: Option<ObjectRef>,
        ) -> AssetId {
            let id = AssetId::new(page, index);
            self.assets.push(RawAsset {
                id,
                base,
                mask: None,
                soft_mask,
            });
            id
        }
    }

    impl AssetSource for MemorySource {
        fn stem(&self) -> &str {
            "report"
        }

        fn enumerate(&self) -> Result<Vec<RawAsset>> {
            Ok(self.assets.clone())
        }

        fn load(&self, asset: &RawAsset) -> Result<LoadedAsset> {
            let fetch = |reference: ObjectRef| {
                self.objects
                    .get(&reference.number)
                    .cloned()
                    .ok_or_else(|| BildwerkError::PdfError(format!("no object {reference}")))
            };
            let base = fetch(asset.base)?;
            Ok(LoadedAsset {
                bytes: AssetBytes {
                    base: EncodedImage::new(base, "png"),
                    mask: None,
                    soft_mask: asset.soft_mask.map(fetch).transpose()?,
                },
                mask_failures: Vec::new(),
            })
        }
    }

    fn config(workers: usize) -> ExtractConfig {
        ExtractConfig {
            workers,
            queue_depth: 2,
            ..ExtractConfig::default()
        }
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn duplicates_are_folded_into_first_occurrence() {
        let mut source = MemorySource::new();
        let a = source.image(1, 0, solid([200, 10, 10]));
        source.image(2, 0, solid([200, 10, 10]));
        source.image(3, 0, solid([10, 10, 200]));

        let dir = tempfile::tempdir().unwrap();
        let config = config(3);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();

        assert_eq!(report.assets_seen, 3);
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.written[0].group.canonical, a);
        assert_eq!(report.written[0].group.duplicate_pages(), vec![2]);
        assert!(report.is_clean());

        let root = dir.path().join("report");
        assert_eq!(
            files(&root.join("Image")),
            vec!["【report】page1_img0.png", "【report】page3_img0.png"]
        );
        assert_eq!(
            files(&root.join("JSON")),
            vec!["【report】page1_img0.json", "【report】page3_img0.json"]
        );
    }

    #[test]
    fn partition_is_independent_of_worker_count() {
        let mut source = MemorySource::new();
        for page in 1..=6 {
            for index in 0..3 {
                let shade = ((page * index) % 4) as u8 * 60;
                source.image(page, index, solid([shade, shade, shade]));
            }
        }

        let run = |workers| {
            let dir = tempfile::tempdir().unwrap();
            let config = config(workers);
            let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();
            report
                .written
                .into_iter()
                .map(|written| written.group)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn undecodable_asset_is_skipped_and_others_continue() {
        let mut source = MemorySource::new();
        source.image(1, 0, b"not an image".to_vec());
        source.image(1, 1, solid([1, 2, 3]));

        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.issues[0].stage, Stage::Composite);
        assert_eq!(report.issues[0].asset, AssetId::new(1, 0));
    }

    #[test]
    fn corrupt_soft_mask_keeps_base_and_records_issue() {
        let mut source = MemorySource::new();
        let base = source.object(solid([9, 9, 9]));
        let smask = source.object(b"garbage".to_vec());
        source.push(1, 0, base, Some(smask));

        let dir = tempfile::tempdir().unwrap();
        let config = config(1);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Severity::Recovered);
        let written = std::fs::read(
            dir.path()
                .join("report/Image")
                .join(&report.written[0].file_name),
        )
        .unwrap();
        assert_eq!(written, solid([9, 9, 9]));
    }

    #[test]
    fn soft_masked_asset_is_written_as_png_with_alpha() {
        let mut source = MemorySource::new();
        let base = source.object(solid([50, 60, 70]));
        let mask = png(&DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            4,
            4,
            Luma([128]),
        )));
        let smask = source.object(mask);
        source.push(1, 0, base, Some(smask));

        let dir = tempfile::tempdir().unwrap();
        let config = config(1);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();

        let path = dir
            .path()
            .join("report/Image")
            .join(&report.written[0].file_name);
        let decoded = image::open(path).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [50, 60, 70, 128]);
    }

    #[test]
    fn asset_rejected_out_of_order_leaves_no_file() {
        let mut source = MemorySource::new();
        source.image(2, 0, solid([1, 2, 3]));
        source.image(1, 0, solid([4, 5, 6]));

        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.issues[0].stage, Stage::Pipeline);
        assert_eq!(report.issues[0].asset, AssetId::new(1, 0));
        assert_eq!(
            files(&dir.path().join("report/Image")),
            vec!["【report】page2_img0.png"]
        );
        assert_eq!(
            files(&dir.path().join("report/JSON")),
            vec!["【report】page2_img0.json"]
        );
    }

    #[test]
    fn empty_document_creates_folders_only() {
        let source = MemorySource::new();
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let report = DocumentRun::new(dir.path(), &config).images(&source).unwrap();
        assert!(report.written.is_empty());
        assert!(dir.path().join("report/Image").is_dir());
        assert!(dir.path().join("report/JSON").is_dir());
    }

    /// Every full page renders to the same bytes, like blank pages would.
    struct BlankPages(u32);

    impl PageSurface for BlankPages {
        fn stem(&self) -> &str {
            "blank"
        }

        fn pages(&self) -> Result<Vec<PageGeometry>> {
            Ok((1..=self.0)
                .map(|number| PageGeometry {
                    number,
                    width: 10.0,
                    height: 10.0,
                })
                .collect())
        }

        fn render(&self, _: &PageGeometry, _: Option<Rect>, _: u32) -> Result<Vec<u8>> {
            Ok(b"blank page".to_vec())
        }
    }

    #[test]
    fn identical_full_pages_are_folded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let detector = FakeDetector::default();
        let extractor = TableExtractor::new(&detector, &config.table);

        let report = DocumentRun::new(dir.path(), &config)
            .tables(&BlankPages(3), &extractor)
            .unwrap();
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.written[0].file_name, "【blank】page1_full_page_table.png");
        assert_eq!(report.written[0].group.duplicate_pages(), vec![2, 3]);
    }

    #[test]
    fn full_pages_kept_when_dedupe_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(2);
        config.table.dedupe_full_pages = false;
        let detector = FakeDetector::default();
        let extractor = TableExtractor::new(&detector, &config.table);

        let report = DocumentRun::new(dir.path(), &config)
            .tables(&BlankPages(3), &extractor)
            .unwrap();
        assert_eq!(report.written.len(), 3);
        assert_eq!(report.duplicates_removed, 0);
    }

    #[test]
    fn table_regions_are_named_by_method_and_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(2);
        let primary = FakeDetector::default();
        let mut secondary = FakeDetector::default();
        secondary.regions.insert(
            2,
            vec![
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Rect::new(20.0, 20.0, 30.0, 30.0),
            ],
        );
        let extractor = TableExtractor::new(&primary, &config.table).with_secondary(&secondary);

        let report = DocumentRun::new(dir.path(), &config)
            .tables(&FakeSurface::new(2), &extractor)
            .unwrap();
        let names: Vec<_> = report.written.iter().map(|w| w.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["【tables】page2_alt_table1.png", "【tables】page2_alt_table2.png"]
        );
    }
}
