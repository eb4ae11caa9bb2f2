//! Conversion engine: turn one input document into PDF pages.
//!
//! Dispatches on the detected format. PDFs pass through with their stored
//! geometry, raster images become one full-bleed page each, and the office
//! family (word, spreadsheet, delimited text) runs through the external
//! tool strategy chain with a programmatic fallback (see
//! [`crate::pipeline::office`]).

use crate::config::{BatchConfig, LETTER};
use crate::error::{DocbindError, StrategyAttempt};
use crate::pipeline::detect::{self, DocumentFormat};
use crate::pipeline::office;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GenericImageView;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write as _;
use tracing::{debug, info};

/// One input to a batch operation: opaque bytes plus the original name.
/// The name drives format detection and split-mode archive entry names.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Clockwise display rotation stored in a page's `/Rotate` entry,
/// normalised to the four meaningful values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRotation {
    R0,
    R90,
    R180,
    R270,
}

impl PageRotation {
    /// Normalise any stored `/Rotate` value. Non-multiples of 90 fall back
    /// to upright, matching how viewers treat them.
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            90 => PageRotation::R90,
            180 => PageRotation::R180,
            270 => PageRotation::R270,
            _ => PageRotation::R0,
        }
    }

    pub fn degrees(self) -> i64 {
        match self {
            PageRotation::R0 => 0,
            PageRotation::R90 => 90,
            PageRotation::R180 => 180,
            PageRotation::R270 => 270,
        }
    }
}

/// Geometry of one page inside a [`ConvertedDocument`], with `MediaBox`
/// and `/Rotate` already resolved through page-tree inheritance.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub id: ObjectId,
    pub width: f32,
    pub height: f32,
    pub rotation: PageRotation,
}

/// The outcome of converting one input: a standalone PDF plus its pages
/// in reading order. The page list is non-empty by construction.
#[derive(Debug)]
pub struct ConvertedDocument {
    pub doc: Document,
    pub pages: Vec<PageInfo>,
}

/// Convert one input document to PDF pages.
pub async fn convert_document(
    input: &InputDocument,
    config: &BatchConfig,
) -> Result<ConvertedDocument, DocbindError> {
    let format = detect::detect_format(&input.file_name)?;
    info!(file = %input.file_name, %format, "converting");
    match format {
        DocumentFormat::Pdf => load_pdf(input),
        DocumentFormat::Image => image_page(input),
        DocumentFormat::Word | DocumentFormat::Spreadsheet | DocumentFormat::DelimitedText => {
            office::convert_with_fallback(input, format, config).await
        }
    }
}

fn conversion_error(
    input: &InputDocument,
    format: DocumentFormat,
    strategy: &str,
    reason: String,
) -> DocbindError {
    DocbindError::Conversion {
        file_name: input.file_name.clone(),
        format,
        attempts: vec![StrategyAttempt {
            strategy: strategy.to_string(),
            reason,
        }],
    }
}

/// Native PDF passthrough: parse, enumerate pages, resolve geometry.
fn load_pdf(input: &InputDocument) -> Result<ConvertedDocument, DocbindError> {
    let doc = Document::load_mem(&input.bytes).map_err(|e| {
        conversion_error(
            input,
            DocumentFormat::Pdf,
            "native",
            format!("pdf parse failed: {e}"),
        )
    })?;

    let pages = collect_pages(&doc);
    if pages.is_empty() {
        return Err(conversion_error(
            input,
            DocumentFormat::Pdf,
            "native",
            "document has no pages".into(),
        ));
    }
    Ok(ConvertedDocument { doc, pages })
}

/// Enumerate a parsed document's pages in reading order with resolved
/// geometry. Shared by the native passthrough and the external-tool
/// output path.
pub(crate) fn collect_pages(doc: &Document) -> Vec<PageInfo> {
    doc.get_pages()
        .into_values()
        .map(|id| {
            let (width, height) = resolve_media_box(doc, id);
            let rotation = resolve_rotation(doc, id);
            debug!(page = ?id, width, height, degrees = rotation.degrees(), "page geometry");
            PageInfo {
                id,
                width,
                height,
                rotation,
            }
        })
        .collect()
}

/// Walk a page's `Parent` chain for an inheritable attribute, returning
/// the stored value as-is (a reference stays a reference). Bounded depth
/// guards against cyclic page trees in hostile files.
pub(crate) fn inherited_entry<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..10 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
    None
}

/// Like [`inherited_entry`], but with an indirect value resolved to its
/// target object.
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    match inherited_entry(doc, page_id, key)? {
        Object::Reference(id) => doc.get_object(*id).ok(),
        direct => Some(direct),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Page extent from the inherited `MediaBox`, defaulting to US Letter
/// when the entry is missing or malformed.
fn resolve_media_box(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let parsed = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            if arr.len() != 4 {
                return None;
            }
            let v: Vec<f32> = arr.iter().filter_map(number).collect();
            (v.len() == 4).then(|| ((v[2] - v[0]).abs(), (v[3] - v[1]).abs()))
        });
    parsed.unwrap_or(LETTER)
}

fn resolve_rotation(doc: &Document, page_id: ObjectId) -> PageRotation {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(PageRotation::from_degrees)
        .unwrap_or(PageRotation::R0)
}

/// Raster image to a single full-bleed page, one point per pixel.
///
/// JPEG bytes embed directly under `DCTDecode`; everything else decodes
/// to RGB8 and recompresses under `FlateDecode`.
fn image_page(input: &InputDocument) -> Result<ConvertedDocument, DocbindError> {
    let err = |reason: String| conversion_error(input, DocumentFormat::Image, "raster-embed", reason);

    let decoded =
        image::load_from_memory(&input.bytes).map_err(|e| err(format!("image decode failed: {e}")))?;
    let (px_w, px_h) = decoded.dimensions();
    if px_w == 0 || px_h == 0 {
        return Err(err("image has zero extent".into()));
    }
    let (width, height) = (px_w as f32, px_h as f32);

    let is_jpeg = image::guess_format(&input.bytes)
        .map(|f| f == image::ImageFormat::Jpeg)
        .unwrap_or(false);

    let (filter, color_space, data) = if is_jpeg {
        let space: &[u8] = if decoded.color().has_color() {
            b"DeviceRGB"
        } else {
            b"DeviceGray"
        };
        ("DCTDecode", space, input.bytes.clone())
    } else {
        let rgb = decoded.to_rgb8();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(rgb.as_raw())
            .and_then(|_| encoder.finish())
            .map(|data| ("FlateDecode", b"DeviceRGB" as &[u8], data))
            .map_err(|e| err(format!("pixel recompression failed: {e}")))?
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(px_w))),
            ("Height", Object::Integer(i64::from(px_h))),
            ("ColorSpace", Object::Name(color_space.to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(filter.as_bytes().to_vec())),
        ]),
        data,
    ));

    let content = format!("q\n{width} 0 0 {height} 0 0 cm\n/Im0 Do\nQ\n");
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Contents", Object::Reference(content_id)),
        (
            "Resources",
            Object::Dictionary(Dictionary::from_iter([(
                "XObject",
                Object::Dictionary(Dictionary::from_iter([(
                    "Im0",
                    Object::Reference(image_id),
                )])),
            )])),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                0.into(),
                0.into(),
                Object::Real(width),
                Object::Real(height),
            ]),
        ),
    ]));

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(ConvertedDocument {
        doc,
        pages: vec![PageInfo {
            id: page_id,
            width,
            height,
            rotation: PageRotation::R0,
        }],
    })
}
