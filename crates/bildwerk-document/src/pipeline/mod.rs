// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline module — parallel per-asset work with in-order duplicate folding,
// per document and per batch.

pub mod batch;
pub mod document;
pub mod ordered;

pub use batch::{BatchRun, collect_inputs};
pub use document::DocumentRun;
pub use ordered::OrderedPipeline;
