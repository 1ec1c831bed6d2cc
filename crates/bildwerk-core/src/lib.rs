// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bildwerk — Core types, configuration, file naming and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod naming;
pub mod report;
pub mod types;

pub use config::ExtractConfig;
pub use error::BildwerkError;
pub use types::*;
