// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image samples — rebuild raw PDF image stream data (anything that is not a
// JPEG passthrough) into pixels that can be re-encoded as PNG.

use bildwerk_core::error::{BildwerkError, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};

/// Colour space of an image XObject, reduced to what the decoder needs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    /// Samples per pixel in the stream.
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    /// Channels per pixel after conversion (gray stays gray, everything else
    /// becomes RGB).
    fn output_channels(&self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb | ColorSpace::Cmyk => 3,
            ColorSpace::Indexed { base, .. } => base.output_channels(),
        }
    }

    pub(crate) fn resolve(doc: &Document, object: &Object) -> Result<Self> {
        let (_, object) = doc
            .dereference(object)
            .map_err(|err| decode_error(format!("unresolvable /ColorSpace: {err}")))?;

        match object {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let family = match items.first() {
                    Some(Object::Name(name)) => name.as_slice(),
                    _ => return Err(decode_error("malformed /ColorSpace array")),
                };
                match family {
                    b"ICCBased" => Self::from_icc(doc, items.get(1)),
                    b"Indexed" | b"I" => Self::from_indexed(doc, items),
                    b"CalGray" => Ok(ColorSpace::Gray),
                    b"CalRGB" => Ok(ColorSpace::Rgb),
                    other => Self::from_name(other),
                }
            }
            other => Err(decode_error(format!(
                "unsupported /ColorSpace object {other:?}"
            ))),
        }
    }

    fn from_name(name: &[u8]) -> Result<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(decode_error(format!(
                "unsupported colour space /{}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn from_icc(doc: &Document, profile: Option<&Object>) -> Result<Self> {
        let profile = profile.ok_or_else(|| decode_error("/ICCBased without a profile"))?;
        let (_, profile) = doc
            .dereference(profile)
            .map_err(|err| decode_error(format!("unresolvable ICC profile: {err}")))?;
        let stream = profile
            .as_stream()
            .map_err(|_| decode_error("ICC profile is not a stream"))?;

        match stream.dict.get(b"N").and_then(Object::as_i64) {
            Ok(1) => Ok(ColorSpace::Gray),
            Ok(3) => Ok(ColorSpace::Rgb),
            Ok(4) => Ok(ColorSpace::Cmyk),
            _ => match stream.dict.get(b"Alternate") {
                Ok(alternate) => Self::resolve(doc, alternate),
                Err(_) => Err(decode_error("ICC profile without a usable /N")),
            },
        }
    }

    fn from_indexed(doc: &Document, items: &[Object]) -> Result<Self> {
        let [_, base, hival, lookup] = items else {
            return Err(decode_error("/Indexed needs base, hival and lookup"));
        };
        let base = Self::resolve(doc, base)?;
        if matches!(base, ColorSpace::Indexed { .. }) {
            return Err(decode_error("/Indexed over /Indexed"));
        }
        let hival = hival
            .as_i64()
            .map_err(|_| decode_error("/Indexed hival is not an integer"))?
            .clamp(0, 255) as u8;

        let (_, lookup) = doc
            .dereference(lookup)
            .map_err(|err| decode_error(format!("unresolvable /Indexed lookup: {err}")))?;
        let lookup = match lookup {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream_data(stream)?,
            _ => return Err(decode_error("/Indexed lookup is neither string nor stream")),
        };

        Ok(ColorSpace::Indexed {
            base: Box::new(base),
            hival,
            lookup,
        })
    }
}

/// Geometry and sample format of one image stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SampleLayout {
    width: u32,
    height: u32,
    bits: u8,
    space: ColorSpace,
    /// `/Decode [1 0]` on a single-component image.
    inverted: bool,
    /// `/ImageMask true`: one bit per pixel, painted samples become white.
    stencil: bool,
}

impl SampleLayout {
    pub(crate) fn from_dict(doc: &Document, dict: &Dictionary) -> Result<Self> {
        let width = positive(dict, b"Width")?;
        let height = positive(dict, b"Height")?;
        let stencil = dict
            .get(b"ImageMask")
            .and_then(Object::as_bool)
            .unwrap_or(false);

        let (bits, space) = if stencil {
            (1, ColorSpace::Gray)
        } else {
            let bits = dict
                .get(b"BitsPerComponent")
                .and_then(Object::as_i64)
                .map_err(|_| decode_error("missing /BitsPerComponent"))?;
            let space = dict
                .get(b"ColorSpace")
                .map_err(|_| decode_error("missing /ColorSpace"))
                .and_then(|cs| ColorSpace::resolve(doc, cs))?;
            (bits, space)
        };

        let bits = match bits {
            1 | 2 | 4 | 8 => bits as u8,
            16 if !matches!(space, ColorSpace::Indexed { .. }) => 16,
            other => return Err(decode_error(format!("unsupported bit depth {other}"))),
        };

        let inverted = space.components() == 1
            && !matches!(space, ColorSpace::Indexed { .. })
            && decode_is_inverted(dict);

        Ok(Self {
            width,
            height,
            bits,
            space,
            inverted,
            stencil,
        })
    }

    /// Unpack `data` (already stripped of stream filters) into pixels.
    pub(crate) fn to_image(&self, data: &[u8]) -> Result<DynamicImage> {
        let width = self.width as usize;
        let height = self.height as usize;
        let components = self.space.components();
        let channels = self.space.output_channels();
        let too_large = || decode_error(format!("image of {width}x{height} is too large"));
        let stride = width
            .checked_mul(components * self.bits as usize)
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(too_large)?;
        let needed = stride.checked_mul(height).ok_or_else(too_large)?;
        let capacity = width
            .checked_mul(height)
            .and_then(|area| area.checked_mul(channels))
            .ok_or_else(too_large)?;
        if data.len() < needed {
            return Err(decode_error(format!(
                "image data truncated: {} bytes, need {needed}",
                data.len()
            )));
        }

        let mut pixels = Vec::with_capacity(capacity);
        let mut samples = [0u8; 4];

        for line in data.chunks(stride).take(height) {
            for column in 0..width {
                if self.stencil {
                    let painted_sample = if self.inverted { 1 } else { 0 };
                    let painted = sample(line, column, 1) == painted_sample;
                    pixels.push(if painted { 255 } else { 0 });
                    continue;
                }

                if let ColorSpace::Indexed {
                    base,
                    hival,
                    lookup,
                } = &self.space
                {
                    let entry = sample(line, column, self.bits).min(u16::from(*hival)) as usize;
                    let span = base.components();
                    for (i, slot) in samples.iter_mut().take(span).enumerate() {
                        *slot = lookup.get(entry * span + i).copied().unwrap_or(0);
                    }
                    push_color(base, &samples[..span], &mut pixels);
                    continue;
                }

                for (i, slot) in samples.iter_mut().take(components).enumerate() {
                    *slot = scale(sample(line, column * components + i, self.bits), self.bits);
                }
                if self.inverted {
                    samples[0] = 255 - samples[0];
                }
                push_color(&self.space, &samples[..components], &mut pixels);
            }
        }

        let image = match channels {
            1 => GrayImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageLuma8),
            _ => RgbImage::from_raw(self.width, self.height, pixels).map(DynamicImage::ImageRgb8),
        };
        image.ok_or_else(|| decode_error("pixel buffer does not match image dimensions"))
    }
}

/// Stream content with its filters removed.
pub(crate) fn stream_data(stream: &Stream) -> Result<Vec<u8>> {
    if stream_filters(&stream.dict).is_empty() {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|err| decode_error(format!("stream could not be decompressed: {err}")))
}

/// Names in `/Filter`, outermost first.
pub(crate) fn stream_filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn push_color(space: &ColorSpace, samples: &[u8], pixels: &mut Vec<u8>) {
    match space {
        ColorSpace::Cmyk => {
            let k = u16::from(samples[3]);
            for &ink in &samples[..3] {
                let value = (255 - u16::from(ink)) * (255 - k) / 255;
                pixels.push(value as u8);
            }
        }
        _ => pixels.extend_from_slice(samples),
    }
}

/// Read the `index`-th sample of `bits` width from a packed row, MSB first.
fn sample(line: &[u8], index: usize, bits: u8) -> u16 {
    match bits {
        8 => u16::from(line[index]),
        16 => u16::from_be_bytes([line[index * 2], line[index * 2 + 1]]),
        _ => {
            let offset = index * bits as usize;
            let byte = line[offset / 8];
            let shift = 8 - bits as usize - offset % 8;
            u16::from((byte >> shift) & ((1u8 << bits) - 1))
        }
    }
}

/// Stretch a sample to the 0..=255 range.
fn scale(value: u16, bits: u8) -> u8 {
    match bits {
        8 => value as u8,
        16 => (value >> 8) as u8,
        _ => (u32::from(value) * 255 / ((1u32 << bits) - 1)) as u8,
    }
}

fn decode_is_inverted(dict: &Dictionary) -> bool {
    let Ok(Object::Array(range)) = dict.get(b"Decode") else {
        return false;
    };
    match (range.first().and_then(number), range.get(1).and_then(number)) {
        (Some(low), Some(high)) => low > high,
        _ => false,
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn positive(dict: &Dictionary, key: &[u8]) -> Result<u32> {
    match dict.get(key).and_then(Object::as_i64) {
        Ok(value) if value > 0 && value <= i64::from(u32::MAX) => Ok(value as u32),
        _ => Err(decode_error(format!(
            "missing or invalid /{}",
            String::from_utf8_lossy(key)
        ))),
    }
}

fn decode_error(reason: impl Into<String>) -> BildwerkError {
    BildwerkError::Decode(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{StringFormat, dictionary};

    fn layout(bits: u8, space: ColorSpace, width: u32, height: u32) -> SampleLayout {
        SampleLayout {
            width,
            height,
            bits,
            space,
            inverted: false,
            stencil: false,
        }
    }

    #[test]
    fn gray_eight_bit_passes_through() {
        let image = layout(8, ColorSpace::Gray, 2, 1).to_image(&[10, 200]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![10, 200]);
    }

    #[test]
    fn one_bit_rows_are_byte_padded() {
        // 3 pixels per row, each row padded to one byte.
        let data = [0b1010_0000, 0b0100_0000];
        let image = layout(1, ColorSpace::Gray, 3, 2).to_image(&data).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![255, 0, 255, 0, 255, 0]);
    }

    #[test]
    fn four_bit_gray_is_scaled() {
        let image = layout(4, ColorSpace::Gray, 2, 1).to_image(&[0xF0]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![255, 0]);
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() {
        let image = layout(16, ColorSpace::Gray, 1, 1).to_image(&[0xAB, 0xCD]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![0xAB]);
    }

    #[test]
    fn oversized_dimensions_are_a_decode_failure() {
        let err = layout(8, ColorSpace::Rgb, u32::MAX, u32::MAX)
            .to_image(&[0; 16])
            .unwrap_err();
        assert!(matches!(err, BildwerkError::Decode(reason) if reason.contains("too large")));
    }

    #[test]
    fn decode_array_inverts_gray() {
        let mut inverted = layout(8, ColorSpace::Gray, 2, 1);
        inverted.inverted = true;
        let image = inverted.to_image(&[0, 255]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![255, 0]);
    }

    #[test]
    fn stencil_paints_zero_samples_white() {
        let mut stencil = layout(1, ColorSpace::Gray, 2, 1);
        stencil.stencil = true;
        let image = stencil.to_image(&[0b0100_0000]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![255, 0]);

        stencil.inverted = true;
        let image = stencil.to_image(&[0b0100_0000]).unwrap();
        assert_eq!(image.to_luma8().into_raw(), vec![0, 255]);
    }

    #[test]
    fn cmyk_becomes_rgb() {
        let image = layout(8, ColorSpace::Cmyk, 2, 1)
            .to_image(&[0, 0, 0, 0, 255, 0, 0, 0])
            .unwrap();
        assert_eq!(image.to_rgb8().into_raw(), vec![255, 255, 255, 0, 255, 255]);
    }

    #[test]
    fn indexed_looks_up_palette() {
        let space = ColorSpace::Indexed {
            base: Box::new(ColorSpace::Rgb),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        // Index 7 is clamped to hival.
        let image = layout(8, space, 3, 1).to_image(&[1, 0, 7]).unwrap();
        assert_eq!(
            image.to_rgb8().into_raw(),
            vec![0, 0, 255, 255, 0, 0, 0, 0, 255]
        );
    }

    #[test]
    fn truncated_data_is_rejected() {
        let err = layout(8, ColorSpace::Rgb, 2, 2).to_image(&[0; 5]).unwrap_err();
        assert!(matches!(err, BildwerkError::Decode(_)));
    }

    #[test]
    fn layout_reads_image_dictionary() {
        let mut doc = Document::with_version("1.5");
        let palette = doc.add_object(Object::String(
            vec![0, 0, 0, 255, 255, 255],
            StringFormat::Hexadecimal,
        ));
        let dict = dictionary! {
            "Width" => 4,
            "Height" => 2,
            "BitsPerComponent" => 2,
            "ColorSpace" => vec![
                Object::Name(b"Indexed".to_vec()),
                Object::Name(b"DeviceRGB".to_vec()),
                Object::Integer(1),
                Object::Reference(palette),
            ],
        };
        let layout = SampleLayout::from_dict(&doc, &dict).unwrap();
        assert_eq!(layout.bits, 2);
        assert!(matches!(layout.space, ColorSpace::Indexed { hival: 1, .. }));
        assert!(!layout.inverted);
    }

    #[test]
    fn icc_profile_component_count_selects_space() {
        let mut doc = Document::with_version("1.5");
        let profile = doc.add_object(Stream::new(dictionary! { "N" => 1 }, vec![]));
        let space = ColorSpace::resolve(
            &doc,
            &Object::Array(vec![
                Object::Name(b"ICCBased".to_vec()),
                Object::Reference(profile),
            ]),
        )
        .unwrap();
        assert_eq!(space, ColorSpace::Gray);
    }

    #[test]
    fn separation_is_unsupported() {
        let doc = Document::with_version("1.5");
        let err = ColorSpace::resolve(&doc, &Object::Name(b"Separation".to_vec())).unwrap_err();
        assert!(matches!(err, BildwerkError::Decode(_)));
    }
}
