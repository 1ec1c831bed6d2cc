// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Duplicate resolver — folds assets of one document into canonical assets
// and their later occurrences, first occurrence wins.

use std::collections::HashMap;

use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::{AssetId, DuplicateGroup, HashKey, MatchTier, Occurrence};
use tracing::debug;

/// What the resolver decided for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First appearance of this content; the asset is kept.
    Canonical,
    /// Already seen as `of`; the asset's file is to be discarded.
    Duplicate { of: AssetId, tier: MatchTier },
}

/// Per-document duplicate detection state.
///
/// Assets must be observed in strictly ascending `(page, index)` order.
/// Build a fresh resolver for every document.
#[derive(Debug, Default)]
pub struct DuplicateResolver {
    binary: HashMap<String, AssetId>,
    perceptual: HashMap<String, AssetId>,
    /// Canonical groups in first-seen order.
    groups: Vec<DuplicateGroup>,
    /// Canonical id → position in `groups`.
    positions: HashMap<AssetId, usize>,
    duplicates: Vec<AssetId>,
    last: Option<AssetId>,
}

/// Final partition of a document's assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical assets with their occurrences, in traversal order.
    pub groups: Vec<DuplicateGroup>,
    /// Every asset folded into a canonical, in traversal order.
    pub duplicates: Vec<AssetId>,
}

impl DuplicateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the next asset.
    ///
    /// `key` is `None` when hashing failed entirely; such an asset is kept as
    /// unique and never entered into the lookup tables, so nothing can match
    /// it later.
    pub fn observe(&mut self, id: AssetId, key: Option<&HashKey>) -> Result<Verdict> {
        self.check_order(id)?;

        let Some(key) = key else {
            debug!(asset = %id, "No digest, kept as unique");
            self.admit(id);
            return Ok(Verdict::Canonical);
        };

        let matched = self
            .binary
            .get(&key.binary)
            .map(|&of| (of, MatchTier::Binary))
            .or_else(|| {
                key.perceptual
                    .as_ref()
                    .and_then(|p| self.perceptual.get(p))
                    .map(|&of| (of, MatchTier::Perceptual))
            });

        if let Some((of, tier)) = matched {
            let position = self.positions[&of];
            self.groups[position].occurrences.push(Occurrence {
                asset: id,
                page: id.page,
                tier,
            });
            self.duplicates.push(id);
            self.last = Some(id);
            debug!(asset = %id, canonical = %of, ?tier, "Duplicate folded");
            return Ok(Verdict::Duplicate { of, tier });
        }

        self.binary.insert(key.binary.clone(), id);
        if let Some(perceptual) = &key.perceptual {
            self.perceptual.insert(perceptual.clone(), id);
        }
        self.admit(id);
        Ok(Verdict::Canonical)
    }

    /// Keep an asset as unique without matching or registering it.
    pub fn admit_unique(&mut self, id: AssetId) -> Result<Verdict> {
        self.check_order(id)?;
        self.admit(id);
        Ok(Verdict::Canonical)
    }

    /// Canonical assets seen so far.
    pub fn canonical_count(&self) -> usize {
        self.groups.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    pub fn into_resolution(self) -> Resolution {
        Resolution {
            groups: self.groups,
            duplicates: self.duplicates,
        }
    }

    fn check_order(&self, id: AssetId) -> Result<()> {
        match self.last {
            Some(last) if id <= last => Err(BildwerkError::OutOfOrder {
                last: last.to_string(),
                got: id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn admit(&mut self, id: AssetId) {
        self.positions.insert(id, self.groups.len());
        self.groups.push(DuplicateGroup::new(id));
        self.last = Some(id);
    }
}
