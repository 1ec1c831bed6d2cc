// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Asset source — the seam between a document format and the pipeline.

use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::{AssetBytes, RawAsset};

/// Anything that can list the embedded images of one document and hand out
/// their bytes.
///
/// `load` is called from worker threads, concurrently and in any order.
pub trait AssetSource: Sync {
    /// Document stem as found on disk, before sanitizing.
    fn stem(&self) -> &str;

    /// Every embedded image in `(page, index)` order.
    fn enumerate(&self) -> Result<Vec<RawAsset>>;

    /// Resolve the bytes of one asset and of its masks.
    fn load(&self, asset: &RawAsset) -> Result<LoadedAsset>;
}

/// Bytes of one asset as resolved by a source.
#[derive(Debug)]
pub struct LoadedAsset {
    pub bytes: AssetBytes,
    /// Masks that could not be read; the asset continues without them.
    pub mask_failures: Vec<BildwerkError>,
}
