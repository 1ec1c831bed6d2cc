// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bildwerk asset pipeline.

use serde::{Deserialize, Serialize};

/// Position of an asset inside its document: 1-based page number and
/// 0-based index within that page.
///
/// The derived ordering is the traversal order of the whole pipeline:
/// page ascending, then index ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub page: u32,
    pub index: u32,
}

impl AssetId {
    pub fn new(page: u32, index: u32) -> Self {
        Self { page, index }
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}#{}", self.page, self.index)
    }
}

/// Opaque reference to an object inside the source document (a PDF indirect
/// object number and generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub number: u32,
    pub generation: u16,
}

impl ObjectRef {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// An embedded image as enumerated from a page, before any mask is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAsset {
    pub id: AssetId,
    /// The image stream itself.
    pub base: ObjectRef,
    /// Stencil (hard) mask stream, from `/Mask`.
    pub mask: Option<ObjectRef>,
    /// Soft mask stream, from `/SMask`.
    pub soft_mask: Option<ObjectRef>,
}

impl RawAsset {
    pub fn page(&self) -> u32 {
        self.id.page
    }
}

/// Encoded image bytes together with the file extension of their encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            bytes,
            extension: extension.into(),
        }
    }
}

/// Bytes resolved for one [`RawAsset`], ready for compositing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBytes {
    pub base: EncodedImage,
    pub mask: Option<Vec<u8>>,
    pub soft_mask: Option<Vec<u8>>,
}

impl AssetBytes {
    /// Bytes with no mask attached.
    pub fn unmasked(base: EncodedImage) -> Self {
        Self {
            base,
            mask: None,
            soft_mask: None,
        }
    }
}

/// Colour layout of a composited pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
    Other,
}

impl ColorMode {
    pub fn has_alpha(self) -> bool {
        matches!(self, ColorMode::LumaAlpha | ColorMode::Rgba)
    }
}

/// One logical image after mask resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositedAsset {
    pub id: AssetId,
    /// Encoded output; exactly the bytes that get hashed and persisted.
    pub bytes: Vec<u8>,
    /// File extension of `bytes` (`png`, `jpeg`, ...).
    pub extension: String,
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    /// True when a mask was applied and the alpha channel rewritten.
    pub masked: bool,
}

impl CompositedAsset {
    pub fn has_alpha(&self) -> bool {
        self.color.has_alpha()
    }
}

/// Content signature of a composited asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashKey {
    /// Hex digest over the exact composited bytes.
    pub binary: String,
    /// Concatenated perceptual hashes; absent when the bytes did not decode.
    pub perceptual: Option<String>,
}

/// Which hash tier matched an asset against an earlier canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    Binary,
    Perceptual,
}

/// A later appearance of already-canonicalized content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub asset: AssetId,
    pub page: u32,
    pub tier: MatchTier,
}

/// A canonical asset and every later occurrence folded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub canonical: AssetId,
    pub occurrences: Vec<Occurrence>,
}

impl DuplicateGroup {
    pub fn new(canonical: AssetId) -> Self {
        Self {
            canonical,
            occurrences: Vec::new(),
        }
    }

    /// Pages (in traversal order) on which the content appears again.
    pub fn duplicate_pages(&self) -> Vec<u32> {
        self.occurrences.iter().map(|o| o.page).collect()
    }
}

/// How a table region was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// The primary table detector.
    Primary,
    /// The secondary detector, tried when the primary finds nothing.
    Secondary,
    /// Whole-page capture, the last resort.
    FullPage,
}

/// Axis-aligned rectangle in page space (PDF points, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Grow by `padding` on every side, clamped to a `page_width` x
    /// `page_height` page.
    pub fn padded_within(&self, padding: f32, page_width: f32, page_height: f32) -> Self {
        Self {
            x0: (self.x0 - padding).max(0.0),
            y0: (self.y0 - padding).max(0.0),
            x1: (self.x1 + padding).min(page_width),
            y1: (self.y1 + padding).min(page_height),
        }
    }
}

/// Size of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// 1-based page number.
    pub number: u32,
    pub width: f32,
    pub height: f32,
}
