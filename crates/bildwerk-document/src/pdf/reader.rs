// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF asset source — open a PDF with `lopdf`, enumerate the image XObjects of
// every page and resolve their bytes and masks.

use std::collections::HashSet;
use std::path::Path;

use bildwerk_core::error::{BildwerkError, Result};
use bildwerk_core::{AssetBytes, AssetId, EncodedImage, ObjectRef, RawAsset};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument, warn};

use super::sample::{SampleLayout, stream_data, stream_filters};
use crate::image::compositor::encode_png;
use crate::source::{AssetSource, LoadedAsset};

/// Upper bound on `/Parent` hops when looking up inherited page attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Reads embedded images out of one PDF document.
pub struct PdfAssetSource {
    /// The underlying lopdf document.
    document: Document,
    /// File stem, used for naming output.
    stem: String,
}

impl PdfAssetSource {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| BildwerkError::DocumentOpen {
            path: path_ref.display().to_string(),
            reason: err.to_string(),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        let stem = path_ref
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self { document, stem })
    }

    /// Create a source from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(stem = %stem.as_ref(), bytes_len = data.len()))]
    pub fn from_bytes(stem: impl AsRef<str>, data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| BildwerkError::DocumentOpen {
            path: stem.as_ref().to_string(),
            reason: err.to_string(),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self::from_document(stem.as_ref(), document))
    }

    /// Wrap an already parsed document.
    pub fn from_document(stem: impl Into<String>, document: Document) -> Self {
        Self {
            document,
            stem: stem.into(),
        }
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    // -- Enumeration ----------------------------------------------------------

    /// Image XObjects drawn by one page, in resource dictionary order.
    ///
    /// Form XObjects are searched recursively. An image referenced more than
    /// once on the same page is listed once.
    fn page_images(&self, page_id: ObjectId) -> Vec<ObjectId> {
        let mut images = Vec::new();
        let Some(resources) = self
            .inherited(page_id, b"Resources")
            .and_then(|object| self.resolve_dict(object))
        else {
            return images;
        };

        let mut seen = HashSet::new();
        let mut forms = HashSet::new();
        self.collect_images(resources, &mut forms, &mut seen, &mut images);
        images
    }

    fn collect_images(
        &self,
        resources: &Dictionary,
        forms: &mut HashSet<ObjectId>,
        seen: &mut HashSet<ObjectId>,
        images: &mut Vec<ObjectId>,
    ) {
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| self.resolve_dict(object))
        else {
            return;
        };

        for (name, object) in xobjects.iter() {
            let Ok(id) = object.as_reference() else {
                debug!(name = %String::from_utf8_lossy(name), "Direct XObject ignored");
                continue;
            };
            let stream = match self.document.get_object(id).and_then(Object::as_stream) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(?id, %err, "XObject unreadable, skipped");
                    continue;
                }
            };

            let subtype = stream.dict.get(b"Subtype").ok();
            if is_name(subtype, b"Image") {
                if seen.insert(id) {
                    images.push(id);
                }
            } else if is_name(subtype, b"Form") && forms.insert(id) {
                if let Some(nested) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| self.resolve_dict(object))
                {
                    self.collect_images(nested, forms, seen, images);
                }
            }
        }
    }

    /// `/SMask` and stream `/Mask` of an image. Colour-key `/Mask` arrays are
    /// not masks in this sense and are ignored.
    fn masks(&self, image: &Dictionary) -> (Option<ObjectRef>, Option<ObjectRef>) {
        let soft_mask = image
            .get(b"SMask")
            .and_then(Object::as_reference)
            .ok()
            .map(object_ref);

        let mask = match image.get(b"Mask") {
            Ok(Object::Reference(id)) if self.is_stream(*id) => Some(object_ref(*id)),
            Ok(Object::Reference(_) | Object::Array(_)) => {
                debug!("Colour-key mask ignored");
                None
            }
            _ => None,
        };

        (mask, soft_mask)
    }

    // -- Decoding -------------------------------------------------------------

    /// Encoded bytes of one image stream.
    ///
    /// JPEG and JPEG 2000 data is passed through untouched; everything else is
    /// rebuilt from its samples and encoded as PNG.
    fn encode_stream(&self, reference: ObjectRef) -> Result<EncodedImage> {
        let stream = self
            .document
            .get_object((reference.number, reference.generation))
            .and_then(Object::as_stream)
            .map_err(|err| BildwerkError::PdfError(format!("image {reference}: {err}")))?;

        let filters = stream_filters(&stream.dict);
        let passthrough = match filters.as_slice() {
            [only] if only.as_slice() == b"DCTDecode" || only.as_slice() == b"DCT" => Some("jpeg"),
            [only] if only.as_slice() == b"JPXDecode" => Some("jpx"),
            _ => None,
        };
        if let Some(extension) = passthrough {
            return Ok(EncodedImage::new(stream.content.clone(), extension));
        }
        if let Some(unsupported) = filters.iter().find(|f| {
            matches!(
                f.as_slice(),
                b"DCTDecode" | b"DCT" | b"JPXDecode" | b"CCITTFaxDecode" | b"CCF" | b"JBIG2Decode"
            )
        }) {
            return Err(BildwerkError::Decode(format!(
                "image {reference}: unsupported filter /{}",
                String::from_utf8_lossy(unsupported)
            )));
        }

        let data = stream_data(stream)?;
        let image = SampleLayout::from_dict(&self.document, &stream.dict)?.to_image(&data)?;
        let bytes = encode_png(&image)
            .map_err(|err| BildwerkError::Decode(format!("PNG encoding failed: {err}")))?;
        Ok(EncodedImage::new(bytes, "png"))
    }

    fn load_mask(
        &self,
        asset: &RawAsset,
        reference: Option<ObjectRef>,
        kind: &str,
        failures: &mut Vec<BildwerkError>,
    ) -> Option<Vec<u8>> {
        match self.encode_stream(reference?) {
            Ok(mask) => Some(mask.bytes),
            Err(err) => {
                warn!(asset = %asset.id, kind, %err, "Mask unreadable, dropped");
                failures.push(BildwerkError::MaskApply(format!("{kind}: {err}")));
                None
            }
        }
    }

    // -- Helpers --------------------------------------------------------------

    /// Look up a page attribute, following `/Parent` for inherited values.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = page_id;
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.document.get_dictionary(current).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            current = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        }
        None
    }

    fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        let (_, object) = self.document.dereference(object).ok()?;
        object.as_dict().ok()
    }

    fn is_stream(&self, id: ObjectId) -> bool {
        matches!(self.document.get_object(id), Ok(Object::Stream(_)))
    }
}

impl AssetSource for PdfAssetSource {
    fn stem(&self) -> &str {
        &self.stem
    }

    #[instrument(skip(self), fields(document = %self.stem))]
    fn enumerate(&self) -> Result<Vec<RawAsset>> {
        let mut assets = Vec::new();

        for (page, page_id) in self.document.get_pages() {
            let images = self.page_images(page_id);
            debug!(page, images = images.len(), "Page scanned");

            for (index, image_id) in images.into_iter().enumerate() {
                let (mask, soft_mask) = match self.document.get_object(image_id) {
                    Ok(Object::Stream(stream)) => self.masks(&stream.dict),
                    _ => (None, None),
                };
                assets.push(RawAsset {
                    id: AssetId::new(page, index as u32),
                    base: object_ref(image_id),
                    mask,
                    soft_mask,
                });
            }
        }

        info!(
            pages = self.page_count(),
            assets = assets.len(),
            "Images enumerated"
        );
        Ok(assets)
    }

    fn load(&self, asset: &RawAsset) -> Result<LoadedAsset> {
        let base = self.encode_stream(asset.base)?;

        let mut mask_failures = Vec::new();
        let soft_mask = self.load_mask(asset, asset.soft_mask, "soft mask", &mut mask_failures);
        let mask = self.load_mask(asset, asset.mask, "mask", &mut mask_failures);

        Ok(LoadedAsset {
            bytes: AssetBytes {
                base,
                mask,
                soft_mask,
            },
            mask_failures,
        })
    }
}

fn object_ref(id: ObjectId) -> ObjectRef {
    ObjectRef::new(id.0, id.1)
}

fn is_name(object: Option<&Object>, expected: &[u8]) -> bool {
    matches!(object, Some(Object::Name(name)) if name.as_slice() == expected)
}
