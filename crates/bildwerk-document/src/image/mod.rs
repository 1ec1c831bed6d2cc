// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — mask compositing and content/perceptual hashing.

pub mod compositor;
pub mod hash;

pub use compositor::{Composite, MaskCompositor};
pub use hash::HashComputer;
