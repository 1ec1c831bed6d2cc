// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bildwerk.

use thiserror::Error;

/// Top-level error type for all Bildwerk operations.
#[derive(Debug, Error)]
pub enum BildwerkError {
    // -- Document errors --
    #[error("cannot open document {path}: {reason}")]
    DocumentOpen { path: String, reason: String },

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    // -- Per-asset errors --
    #[error("base image could not be decoded: {0}")]
    Decode(String),

    #[error("mask could not be applied: {0}")]
    MaskApply(String),

    #[error("asset could not be hashed: {0}")]
    Hash(String),

    #[error("asset could not be written to {path}: {reason}")]
    Write { path: String, reason: String },

    // -- Table capture collaborators --
    #[error("table detection failed on page {page}: {reason}")]
    Detection { page: u32, reason: String },

    #[error("page {page} could not be rendered: {reason}")]
    Render { page: u32, reason: String },

    // -- Resolver --
    #[error("asset {got} observed after {last}; assets must arrive in (page, index) order")]
    OutOfOrder { last: String, got: String },

    // -- Setup --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BildwerkError>;
