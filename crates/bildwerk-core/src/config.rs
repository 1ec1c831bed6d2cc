// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction configuration, loadable from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BildwerkError, Result};

/// Settings for one extraction run.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Name of the per-document folder holding asset files.
    pub asset_dir_name: String,
    /// Name of the per-document folder holding JSON sidecars.
    pub metadata_dir_name: String,
    /// Worker threads used for load, composite, hash and stage.
    pub workers: usize,
    /// Maximum number of assets in flight ahead of the in-order consumer.
    pub queue_depth: usize,
    /// Fold assets whose perceptual hashes match (images only).
    pub perceptual_matching: bool,
    pub naming: NamingConfig,
    pub table: TableConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            asset_dir_name: "Image".into(),
            metadata_dir_name: "JSON".into(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_depth: 32,
            perceptual_matching: true,
            naming: NamingConfig::default(),
            table: TableConfig::default(),
        }
    }
}

impl ExtractConfig {
    /// Read a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(BildwerkError::Config("workers must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(BildwerkError::Config(
                "queue_depth must be at least 1".into(),
            ));
        }
        if self.asset_dir_name.trim().is_empty() || self.metadata_dir_name.trim().is_empty() {
            return Err(BildwerkError::Config(
                "output folder names must not be empty".into(),
            ));
        }
        if self.asset_dir_name == self.metadata_dir_name {
            return Err(BildwerkError::Config(format!(
                "asset and metadata folders must differ (both are {:?})",
                self.asset_dir_name
            )));
        }
        if self.naming.open_marker.is_empty() || self.naming.close_marker.is_empty() {
            return Err(BildwerkError::Config(
                "naming markers must not be empty".into(),
            ));
        }
        if self.naming.max_stem_chars == 0 {
            return Err(BildwerkError::Config(
                "naming.max_stem_chars must be at least 1".into(),
            ));
        }
        if self.table.dpi == 0 {
            return Err(BildwerkError::Config("table.dpi must be positive".into()));
        }
        if !self.table.padding.is_finite() || self.table.padding < 0.0 {
            return Err(BildwerkError::Config(format!(
                "table.padding must be a non-negative number, got {}",
                self.table.padding
            )));
        }
        Ok(())
    }
}

/// How asset file names are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Placed before the document stem.
    pub open_marker: String,
    /// Placed after the document stem.
    pub close_marker: String,
    /// Sanitized stems are cut to this many characters.
    pub max_stem_chars: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            open_marker: "【".into(),
            close_marker: "】".into(),
            max_stem_chars: 120,
        }
    }
}

/// Table capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Render resolution for table regions.
    pub dpi: u32,
    /// Margin added around each detected region, in points.
    pub padding: f32,
    /// Capture whole pages when neither detector finds a table.
    pub full_page_fallback: bool,
    /// Fold identical full-page captures into one canonical asset.
    pub dedupe_full_pages: bool,
    /// Also fold table captures whose perceptual hashes match.
    pub perceptual_matching: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            padding: 5.0,
            full_page_fallback: true,
            dedupe_full_pages: true,
            perceptual_matching: false,
        }
    }
}
