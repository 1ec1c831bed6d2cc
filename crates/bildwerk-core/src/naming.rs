// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output file naming — document stem sanitization and the
// `【stem】page<N>_img<K>.<ext>` asset name scheme.

use crate::config::NamingConfig;
use crate::types::ExtractionMethod;

/// Characters that are not allowed in file names on at least one platform.
const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names Windows refuses as file names regardless of extension.
const DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Stem used when sanitization leaves nothing.
const EMPTY_STEM: &str = "document";

/// Make a document stem safe to embed in file and folder names.
///
/// Reserved and control characters become `_`, trailing dots and spaces are
/// trimmed, the stem is cut to `max_chars` characters, and Windows device
/// names get a `_` after the name part.
pub fn sanitize_stem(stem: &str, max_chars: usize) -> String {
    let replaced: String = stem
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut cleaned: String = replaced
        .trim()
        .trim_end_matches(['.', ' '])
        .chars()
        .take(max_chars)
        .collect();

    // Truncation can expose a new trailing dot or space.
    while cleaned.ends_with(['.', ' ']) {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        return EMPTY_STEM.to_string();
    }

    let base_len = cleaned.find('.').unwrap_or(cleaned.len());
    if DEVICE_NAMES
        .iter()
        .any(|d| d.eq_ignore_ascii_case(&cleaned[..base_len]))
    {
        cleaned.insert(base_len, '_');
    }
    cleaned
}

/// What kind of asset a file holds, and its position label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetLabel {
    /// Embedded image; `index` is the 0-based position on the page.
    Image { index: u32 },
    /// Detected table region; `ordinal` is 1-based within the page.
    Table {
        method: ExtractionMethod,
        ordinal: u32,
    },
}

/// Builds asset and sidecar file names for one document.
#[derive(Debug, Clone)]
pub struct AssetNamer {
    prefix: String,
}

impl AssetNamer {
    /// `stem` is the raw document stem; it is sanitized here.
    pub fn new(stem: &str, naming: &NamingConfig) -> Self {
        let safe = sanitize_stem(stem, naming.max_stem_chars);
        Self {
            prefix: format!("{}{}{}", naming.open_marker, safe, naming.close_marker),
        }
    }

    /// File name of an asset on `page` (1-based) with encoding `extension`.
    pub fn asset_file_name(&self, page: u32, label: AssetLabel, extension: &str) -> String {
        let tail = match label {
            AssetLabel::Image { index } => format!("img{index}"),
            AssetLabel::Table {
                method: ExtractionMethod::Primary,
                ordinal,
            } => format!("table{ordinal}"),
            AssetLabel::Table {
                method: ExtractionMethod::Secondary,
                ordinal,
            } => format!("alt_table{ordinal}"),
            AssetLabel::Table {
                method: ExtractionMethod::FullPage,
                ..
            } => "full_page_table".to_string(),
        };
        format!("{}page{}_{}.{}", self.prefix, page, tail, extension)
    }
}

/// Sidecar name for an asset file: same stem, `.json` extension.
pub fn sidecar_file_name(asset_file_name: &str) -> String {
    let stem = match asset_file_name.rfind('.') {
        Some(dot) if dot > 0 => &asset_file_name[..dot],
        _ => asset_file_name,
    };
    format!("{stem}.json")
}
