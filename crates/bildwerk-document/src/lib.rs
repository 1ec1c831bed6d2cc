// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bildwerk-document — Asset extraction for Bildwerk.
//
// Enumerates embedded images of PDF documents, composites their masks, folds
// exact and perceptual duplicates in page order, and writes canonical assets
// with JSON sidecars. Table regions rendered by an external rasterizer go
// through the same hash, resolve and write path.

pub mod dedupe;
pub mod image;
pub mod output;
pub mod pdf;
pub mod pipeline;
pub mod source;
pub mod table;

// Re-export the primary structs so callers can use `bildwerk_document::PdfAssetSource` etc.
pub use dedupe::{DuplicateResolver, Resolution, Verdict};
pub use crate::image::{HashComputer, MaskCompositor};
pub use output::{AssetWriter, OutputLayout};
pub use pdf::PdfAssetSource;
pub use pipeline::{BatchRun, DocumentRun, OrderedPipeline, collect_inputs};
pub use source::{AssetSource, LoadedAsset};
pub use table::{PageSurface, TableCapture, TableDetector, TableExtractor};
