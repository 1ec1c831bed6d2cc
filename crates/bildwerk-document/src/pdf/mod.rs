// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — image XObject enumeration and sample decoding.

pub mod reader;
mod sample;

pub use reader::PdfAssetSource;
