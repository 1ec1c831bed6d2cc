// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table capture — runs table detectors over a document's pages and renders
// each detected region to PNG, falling back to whole-page captures when no
// detector finds anything.

use bildwerk_core::config::TableConfig;
use bildwerk_core::error::Result;
use bildwerk_core::naming::AssetLabel;
use bildwerk_core::report::{AssetIssue, DocumentReport, Stage};
use bildwerk_core::{AssetId, ExtractionMethod, PageGeometry, Rect};
use tracing::{debug, info, instrument, warn};

/// A rasterizer for one document's pages.
pub trait PageSurface: Sync {
    /// Document stem as found on disk, before sanitizing.
    fn stem(&self) -> &str;

    /// Every page with its size in points.
    fn pages(&self) -> Result<Vec<PageGeometry>>;

    /// PNG bytes of `region` (in points, origin top-left) or of the whole
    /// page when `region` is `None`.
    fn render(&self, page: &PageGeometry, region: Option<Rect>, dpi: u32) -> Result<Vec<u8>>;
}

/// Finds table regions on a page.
pub trait TableDetector: Sync {
    /// Regions in points, origin top-left, in reading order.
    fn detect(&self, page: &PageGeometry) -> Result<Vec<Rect>>;
}

/// One rendered table region (or full page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCapture {
    pub id: AssetId,
    pub method: ExtractionMethod,
    /// 1-based position among the regions detected on the page.
    pub ordinal: u32,
    pub bytes: Vec<u8>,
}

impl TableCapture {
    pub fn label(&self) -> AssetLabel {
        AssetLabel::Table {
            method: self.method,
            ordinal: self.ordinal,
        }
    }

    pub fn is_full_page(&self) -> bool {
        self.method == ExtractionMethod::FullPage
    }
}

/// Primary detector, then secondary, then full pages.
///
/// The fallback is decided for the whole document: the secondary detector
/// only runs when the primary captured nothing on any page.
pub struct TableExtractor<'a> {
    primary: &'a dyn TableDetector,
    secondary: Option<&'a dyn TableDetector>,
    config: &'a TableConfig,
}

impl<'a> TableExtractor<'a> {
    pub fn new(primary: &'a dyn TableDetector, config: &'a TableConfig) -> Self {
        Self {
            primary,
            secondary: None,
            config,
        }
    }

    pub fn with_secondary(mut self, secondary: &'a dyn TableDetector) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn config(&self) -> &TableConfig {
        self.config
    }

    /// Capture the tables of one document.
    ///
    /// Fails only when the page list itself is unavailable. Detection and
    /// render problems are recorded in `report`.
    #[instrument(skip_all, fields(document = %surface.stem()))]
    pub fn extract(
        &self,
        surface: &dyn PageSurface,
        report: &mut DocumentReport,
    ) -> Result<Vec<TableCapture>> {
        let pages = surface.pages()?;

        let captures = self.capture_regions(
            surface,
            &pages,
            self.primary,
            ExtractionMethod::Primary,
            report,
        );
        if !captures.is_empty() {
            info!(tables = captures.len(), "Tables captured by primary detector");
            return Ok(captures);
        }

        if let Some(secondary) = self.secondary {
            let captures = self.capture_regions(
                surface,
                &pages,
                secondary,
                ExtractionMethod::Secondary,
                report,
            );
            if !captures.is_empty() {
                info!(tables = captures.len(), "Tables captured by secondary detector");
                return Ok(captures);
            }
        }

        if !self.config.full_page_fallback {
            info!("No tables found");
            return Ok(Vec::new());
        }

        info!(pages = pages.len(), "No tables found, capturing full pages");
        let mut captures = Vec::with_capacity(pages.len());
        for page in &pages {
            match surface.render(page, None, self.config.dpi) {
                Ok(bytes) => captures.push(TableCapture {
                    id: AssetId::new(page.number, 0),
                    method: ExtractionMethod::FullPage,
                    ordinal: 1,
                    bytes,
                }),
                Err(err) => {
                    warn!(page = page.number, %err, "Full page not rendered");
                    report.record(AssetIssue::skipped(
                        AssetId::new(page.number, 0),
                        Stage::Render,
                        err.to_string(),
                    ));
                }
            }
        }
        Ok(captures)
    }

    fn capture_regions(
        &self,
        surface: &dyn PageSurface,
        pages: &[PageGeometry],
        detector: &dyn TableDetector,
        method: ExtractionMethod,
        report: &mut DocumentReport,
    ) -> Vec<TableCapture> {
        let mut captures = Vec::new();

        for page in pages {
            let regions = match detector.detect(page) {
                Ok(regions) => regions,
                Err(err) => {
                    warn!(page = page.number, ?method, %err, "Table detection failed");
                    report.record(AssetIssue::recovered(
                        AssetId::new(page.number, 0),
                        Stage::Detect,
                        err.to_string(),
                    ));
                    continue;
                }
            };
            debug!(page = page.number, ?method, regions = regions.len(), "Page searched");

            for (position, region) in regions.into_iter().enumerate() {
                let id = AssetId::new(page.number, position as u32);
                let clip = region.padded_within(self.config.padding, page.width, page.height);
                if clip.is_empty() {
                    debug!(asset = %id, "Region outside the page, ignored");
                    continue;
                }
                match surface.render(page, Some(clip), self.config.dpi) {
                    Ok(bytes) => captures.push(TableCapture {
                        id,
                        method,
                        ordinal: position as u32 + 1,
                        bytes,
                    }),
                    Err(err) => {
                        warn!(asset = %id, %err, "Table region not rendered");
                        report.record(AssetIssue::skipped(id, Stage::Render, err.to_string()));
                    }
                }
            }
        }

        captures
    }
}
