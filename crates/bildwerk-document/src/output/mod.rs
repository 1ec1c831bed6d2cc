// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output module — folder layout, asset files and JSON sidecars.

pub mod writer;

pub use writer::{AssetWriter, OutputLayout, Sidecar, StagedAsset};
