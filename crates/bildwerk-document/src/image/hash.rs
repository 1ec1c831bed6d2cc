// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Asset hashing — SHA-256 over the exact composited bytes, plus a combined
// perceptual key (DCT mean hash + gradient hash) over decoded pixels.

use bildwerk_core::HashKey;
use bildwerk_core::error::{BildwerkError, Result};
use image::{DynamicImage, GenericImageView};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Derives [`HashKey`]s from composited asset bytes.
///
/// Holds prepared perceptual hashers, so each worker thread builds its own.
pub struct HashComputer {
    /// `None` when perceptual matching is turned off.
    perceptual: Option<PerceptualHashers>,
}

struct PerceptualHashers {
    /// Mean hash over DCT coefficients (pHash).
    dct_mean: Hasher,
    /// Horizontal gradient hash (dHash).
    gradient: Hasher,
}

impl HashComputer {
    pub fn new(perceptual: bool) -> Self {
        let perceptual = perceptual.then(|| PerceptualHashers {
            dct_mean: HasherConfig::new()
                .hash_size(8, 8)
                .hash_alg(HashAlg::Mean)
                .preproc_dct()
                .to_hasher(),
            gradient: HasherConfig::new()
                .hash_size(8, 8)
                .hash_alg(HashAlg::Gradient)
                .to_hasher(),
        });
        Self { perceptual }
    }

    /// Binary-only hashing, no perceptual key.
    pub fn binary_only() -> Self {
        Self::new(false)
    }

    /// Hash one asset's encoded bytes.
    ///
    /// Fails with [`BildwerkError::Hash`] only when no digest can be computed
    /// at all (empty input). Undecodable or single-colour pixels just leave
    /// the perceptual key empty.
    pub fn compute(&self, bytes: &[u8]) -> Result<HashKey> {
        if bytes.is_empty() {
            return Err(BildwerkError::Hash("asset has no bytes".into()));
        }
        Ok(HashKey {
            binary: hash_bytes(bytes),
            perceptual: self.perceptual_key(bytes),
        })
    }

    fn perceptual_key(&self, bytes: &[u8]) -> Option<String> {
        let hashers = self.perceptual.as_ref()?;
        match image::load_from_memory(bytes) {
            Ok(img) if is_flat(&img) => {
                debug!("Single-colour image, binary digest only");
                None
            }
            Ok(img) => {
                let dct = hashers.dct_mean.hash_image(&img).to_base64();
                let gradient = hashers.gradient.hash_image(&img).to_base64();
                Some(format!("{dct}_{gradient}"))
            }
            Err(err) => {
                debug!(%err, "Pixels not decodable, binary digest only");
                None
            }
        }
    }
}

/// Every pixel has the same value. Such images all hash to the same
/// perceptual key whatever their colour.
fn is_flat(img: &DynamicImage) -> bool {
    let mut pixels = img.pixels().map(|(_, _, pixel)| pixel);
    match pixels.next() {
        Some(first) => pixels.all(|pixel| pixel == first),
        None => true,
    }
}
