// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mask compositor — merges a base image with its optional stencil mask or
// soft mask into one pixel buffer with correct alpha, using the `image` and
// `imageproc` crates.

use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::{AssetBytes, AssetId, ColorMode, CompositedAsset, EncodedImage};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, Pixel};
use imageproc::contrast::{ThresholdType, threshold};
use tracing::{debug, instrument, warn};

/// Luminance above this level counts as "visible" in a stencil mask.
const HARD_MASK_LEVEL: u8 = 127;

/// Result of compositing one asset.
#[derive(Debug)]
pub struct Composite {
    pub asset: CompositedAsset,
    /// Set when a mask was present but could not be applied; the asset then
    /// holds the unmasked base.
    pub mask_failure: Option<BildwerkError>,
}

/// Applies `/SMask` and `/Mask` data to decoded base images.
///
/// Compositing is a pure function of one asset's bytes, so a single
/// compositor can be shared by any number of worker threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaskCompositor;

impl MaskCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Composite one asset.
    ///
    /// Fails with [`BildwerkError::Decode`] only when the base image cannot
    /// be decoded. A broken mask is reported through
    /// [`Composite::mask_failure`] and the unmasked base is returned.
    #[instrument(skip(self, bytes), fields(asset = %id, base_len = bytes.base.bytes.len()))]
    pub fn composite(&self, id: AssetId, bytes: AssetBytes) -> Result<Composite> {
        let AssetBytes {
            base: encoded,
            mask,
            soft_mask,
        } = bytes;

        let base = image::load_from_memory(&encoded.bytes).map_err(|err| {
            BildwerkError::Decode(format!("{} ({}): {}", id, encoded.extension, err))
        })?;

        let applied = match (&soft_mask, &mask) {
            (Some(smask), _) => apply_soft_mask(&base, smask),
            (None, Some(stencil)) => apply_hard_mask(&base, stencil),
            (None, None) => {
                return Ok(Composite {
                    asset: passthrough(id, &base, encoded),
                    mask_failure: None,
                });
            }
        };

        let encoded_mask = applied.and_then(|img| {
            encode_png(&img)
                .map(|png| (img, png))
                .map_err(|err| BildwerkError::MaskApply(format!("PNG encoding failed: {err}")))
        });

        match encoded_mask {
            Ok((img, png)) => {
                debug!(
                    width = img.width(),
                    height = img.height(),
                    soft = soft_mask.is_some(),
                    "Mask applied"
                );
                Ok(Composite {
                    asset: CompositedAsset {
                        id,
                        bytes: png,
                        extension: "png".into(),
                        width: img.width(),
                        height: img.height(),
                        color: color_mode(img.color()),
                        masked: true,
                    },
                    mask_failure: None,
                })
            }
            Err(err) => {
                warn!(asset = %id, %err, "Mask unusable, keeping unmasked base");
                Ok(Composite {
                    asset: passthrough(id, &base, encoded),
                    mask_failure: Some(err),
                })
            }
        }
    }
}

/// Emit the base exactly as it was encoded.
fn passthrough(id: AssetId, base: &DynamicImage, encoded: EncodedImage) -> CompositedAsset {
    CompositedAsset {
        id,
        width: base.width(),
        height: base.height(),
        color: color_mode(base.color()),
        bytes: encoded.bytes,
        extension: encoded.extension,
        masked: false,
    }
}

/// Replace the base's alpha channel with the soft mask's luminance.
fn apply_soft_mask(base: &DynamicImage, smask: &[u8]) -> Result<DynamicImage> {
    let mask = image::load_from_memory(smask)
        .map_err(|err| BildwerkError::MaskApply(format!("soft mask: {err}")))?
        .to_luma16();
    let mask = fit_to(mask, base.width(), base.height(), FilterType::Triangle);
    Ok(with_alpha(base, |x, y, _| mask.get_pixel(x, y)[0]))
}

/// Intersect the base's alpha (opaque when absent) with a two-level mask.
fn apply_hard_mask(base: &DynamicImage, stencil: &[u8]) -> Result<DynamicImage> {
    let gray = image::load_from_memory(stencil)
        .map_err(|err| BildwerkError::MaskApply(format!("stencil mask: {err}")))?
        .to_luma8();
    let binary = threshold(&gray, HARD_MASK_LEVEL, ThresholdType::Binary);
    // Nearest keeps the mask two-level after scaling.
    let mask = fit_to(binary, base.width(), base.height(), FilterType::Nearest);
    Ok(with_alpha(base, |x, y, alpha| {
        if mask.get_pixel(x, y)[0] > 0 {
            alpha
        } else {
            0
        }
    }))
}

/// Convert `base` to an alpha-capable buffer of the same depth and set each
/// pixel's alpha to `alpha(x, y, current)`.
///
/// Alpha values are passed on the 16-bit scale whatever the base depth.
fn with_alpha(base: &DynamicImage, alpha: impl Fn(u32, u32, u16) -> u16) -> DynamicImage {
    let color = base.color();
    match (is_luma(color), is_deep(color)) {
        (true, true) => {
            let mut out = base.to_luma_alpha16();
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                pixel[1] = alpha(x, y, pixel[1]);
            }
            DynamicImage::ImageLumaA16(out)
        }
        (false, true) => {
            let mut out = base.to_rgba16();
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                pixel[3] = alpha(x, y, pixel[3]);
            }
            DynamicImage::ImageRgba16(out)
        }
        (true, false) => {
            let mut out = base.to_luma_alpha8();
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                pixel[1] = narrow(alpha(x, y, widen(pixel[1])));
            }
            DynamicImage::ImageLumaA8(out)
        }
        (false, false) => {
            let mut out = base.to_rgba8();
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                pixel[3] = narrow(alpha(x, y, widen(pixel[3])));
            }
            DynamicImage::ImageRgba8(out)
        }
    }
}

fn widen(value: u8) -> u16 {
    u16::from(value) * 257
}

fn narrow(value: u16) -> u8 {
    ((u32::from(value) + 128) / 257) as u8
}

fn fit_to<P>(
    mask: ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
    filter: FilterType,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if mask.dimensions() == (width, height) {
        return mask;
    }
    debug!(
        from_w = mask.width(),
        from_h = mask.height(),
        to_w = width,
        to_h = height,
        "Resizing mask to base"
    );
    image::imageops::resize(&mask, width, height, filter)
}

/// More than eight bits per channel.
fn is_deep(color: ColorType) -> bool {
    color.bytes_per_pixel() > color.channel_count()
}

fn is_luma(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    )
}

fn color_mode(color: ColorType) -> ColorMode {
    match color {
        ColorType::L8 | ColorType::L16 => ColorMode::Luma,
        ColorType::La8 | ColorType::La16 => ColorMode::LumaAlpha,
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => ColorMode::Rgb,
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
        _ => ColorMode::Other,
    }
}

/// Encode as PNG, which keeps the alpha channel losslessly.
pub(crate) fn encode_png(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(buffer)
}
