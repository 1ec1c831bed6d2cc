// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dedupe module — per-document duplicate folding.

pub mod resolver;

pub use resolver::{DuplicateResolver, Resolution, Verdict};
