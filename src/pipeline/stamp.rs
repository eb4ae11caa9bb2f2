//! Circular label stamps on converted pages.
//!
//! A stamp is a stroked circle outline with centred bold text, placed at the
//! visual top-right corner of the first page. "Visual" is the operative
//! word: pages carry a `/Rotate` entry giving the clockwise rotation the
//! viewer applies at display time, so the stamp is laid out in the
//! rotated frame the reader actually sees and mapped back into stored
//! page coordinates with a transformation matrix. A page stored
//! landscape but displayed portrait gets its stamp at the portrait
//! top-right, not somewhere along an edge.

use crate::config::BatchConfig;
use crate::error::DocbindError;
use crate::pipeline::compose::{escape_pdf_text, text_width};
use crate::pipeline::convert::{self, PageInfo, PageRotation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::fmt::Write as _;
use tracing::debug;

/// Kappa for approximating a quarter circle with one cubic Bezier.
const CIRCLE_K: f32 = 0.5523;

/// Matrix mapping visual-frame coordinates to stored page coordinates,
/// plus the visual frame's (width, height).
///
/// `/Rotate n` means the viewer turns the stored page n degrees clockwise
/// for display. Drawing in the visual frame and prepending this matrix
/// lands the ink where the reader sees it.
pub fn rotation_transform(
    rotation: PageRotation,
    width: f32,
    height: f32,
) -> ([f32; 6], (f32, f32)) {
    match rotation {
        PageRotation::R0 => ([1.0, 0.0, 0.0, 1.0, 0.0, 0.0], (width, height)),
        PageRotation::R90 => ([0.0, 1.0, -1.0, 0.0, width, 0.0], (height, width)),
        PageRotation::R180 => ([-1.0, 0.0, 0.0, -1.0, width, height], (width, height)),
        PageRotation::R270 => ([0.0, -1.0, 1.0, 0.0, 0.0, height], (height, width)),
    }
}

/// Draw a circular stamp with `text` on the given page, at the visual
/// top-right corner.
///
/// The overlay is appended as a separate content stream after the page's
/// existing content, wrapped in `q`/`Q`, so it paints on top without
/// disturbing the page's own graphics state.
pub fn stamp_page(
    doc: &mut Document,
    page: &PageInfo,
    text: &str,
    config: &BatchConfig,
) -> Result<(), DocbindError> {
    let (m, (frame_w, frame_h)) = rotation_transform(page.rotation, page.width, page.height);
    let r = config.stamp_diameter / 2.0;
    let cx = frame_w - r - config.stamp_margin;
    let cy = frame_h - r - config.stamp_margin;

    let font_size = config.stamp_diameter / 2.0;
    let tx = cx - text_width(text, font_size) / 2.0;
    let ty = cy - font_size / 3.0;

    debug!(
        rotation = page.rotation.degrees(),
        cx, cy, "stamping '{text}'"
    );

    let mut ops = String::new();
    let _ = writeln!(
        ops,
        "q\n{} {} {} {} {} {} cm",
        m[0], m[1], m[2], m[3], m[4], m[5]
    );
    // outline only, never filled: the page content stays visible under it
    let _ = writeln!(ops, "0 0 0 RG\n2 w");
    circle_path(&mut ops, cx, cy, r);
    let _ = writeln!(ops, "S");
    let _ = writeln!(
        ops,
        "0 0 0 rg\nBT\n/DbStamp {} Tf\n{} {} Td\n({}) Tj\nET\nQ",
        font_size,
        tx,
        ty,
        escape_pdf_text(text)
    );

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica-Bold".to_vec())),
    ]));
    ensure_stamp_font(doc, page.id, font_id)?;
    append_page_content(doc, page.id, ops.into_bytes())
}

/// Circle at (`cx`, `cy`) with radius `r` as four cubic Beziers.
fn circle_path(ops: &mut String, cx: f32, cy: f32, r: f32) {
    let k = CIRCLE_K * r;
    let _ = writeln!(ops, "{} {} m", cx + r, cy);
    let _ = writeln!(
        ops,
        "{} {} {} {} {} {} c",
        cx + r,
        cy + k,
        cx + k,
        cy + r,
        cx,
        cy + r
    );
    let _ = writeln!(
        ops,
        "{} {} {} {} {} {} c",
        cx - k,
        cy + r,
        cx - r,
        cy + k,
        cx - r,
        cy
    );
    let _ = writeln!(
        ops,
        "{} {} {} {} {} {} c",
        cx - r,
        cy - k,
        cx - k,
        cy - r,
        cx,
        cy - r
    );
    let _ = writeln!(
        ops,
        "{} {} {} {} {} {} c",
        cx + k,
        cy - r,
        cx + r,
        cy - k,
        cx + r,
        cy
    );
}

/// Append a new content stream after the page's existing content,
/// handling the three shapes `/Contents` can take.
fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), DocbindError> {
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| DocbindError::render(format!("page object unavailable: {e}")))?;

    match page_dict.get(b"Contents") {
        Ok(Object::Reference(existing)) => {
            let existing = *existing;
            page_dict.set(
                "Contents",
                Object::Array(vec![
                    Object::Reference(existing),
                    Object::Reference(stream_id),
                ]),
            );
        }
        Ok(Object::Array(streams)) => {
            let mut streams = streams.clone();
            streams.push(Object::Reference(stream_id));
            page_dict.set("Contents", Object::Array(streams));
        }
        _ => {
            page_dict.set("Contents", Object::Reference(stream_id));
        }
    }
    Ok(())
}

/// Where the stamp font needs to be registered for a given page.
enum FontSlot {
    /// Font dict is its own indirect object.
    FontObject(ObjectId),
    /// Resources is an indirect object with an inline (or absent) Font dict.
    SharedResources(ObjectId),
    /// Resources lives inline in the page dict.
    PageInlineResources,
    /// Page has no Resources at all.
    CreateResources,
}

/// Register the stamp font as `/DbStamp` in the page's resources,
/// wherever those happen to live.
fn ensure_stamp_font(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<(), DocbindError> {
    let tree = |e: lopdf::Error| DocbindError::render(format!("page resources unavailable: {e}"));

    // a page may hold no Resources of its own and inherit the entry from
    // the page tree; pull it down so the registration binds to this page
    let pulled_down = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(tree)?;
        if page.has(b"Resources") {
            None
        } else {
            convert::inherited_entry(doc, page_id, b"Resources").cloned()
        }
    };
    if let Some(inherited) = pulled_down {
        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(tree)?;
        page.set("Resources", inherited);
    }

    let slot = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(tree)?;
        match page.get(b"Resources") {
            Ok(Object::Dictionary(res)) => match res.get(b"Font") {
                Ok(Object::Reference(fid)) => FontSlot::FontObject(*fid),
                _ => FontSlot::PageInlineResources,
            },
            Ok(Object::Reference(rid)) => {
                let res = doc.get_object(*rid).and_then(Object::as_dict).map_err(tree)?;
                match res.get(b"Font") {
                    Ok(Object::Reference(fid)) => FontSlot::FontObject(*fid),
                    _ => FontSlot::SharedResources(*rid),
                }
            }
            _ => FontSlot::CreateResources,
        }
    };

    match slot {
        FontSlot::FontObject(fid) => {
            let fonts = doc
                .get_object_mut(fid)
                .and_then(Object::as_dict_mut)
                .map_err(tree)?;
            fonts.set("DbStamp", Object::Reference(font_id));
        }
        FontSlot::SharedResources(rid) => {
            let res = doc
                .get_object_mut(rid)
                .and_then(Object::as_dict_mut)
                .map_err(tree)?;
            set_font_entry(res, font_id);
        }
        FontSlot::PageInlineResources => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(tree)?;
            if let Ok(Object::Dictionary(res)) = page.get_mut(b"Resources") {
                set_font_entry(res, font_id);
            }
        }
        FontSlot::CreateResources => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(tree)?;
            page.set(
                "Resources",
                Object::Dictionary(Dictionary::from_iter([(
                    "Font",
                    Object::Dictionary(Dictionary::from_iter([(
                        "DbStamp",
                        Object::Reference(font_id),
                    )])),
                )])),
            );
        }
    }
    Ok(())
}

fn set_font_entry(res: &mut Dictionary, font_id: ObjectId) {
    match res.get_mut(b"Font") {
        Ok(Object::Dictionary(fonts)) => {
            fonts.set("DbStamp", Object::Reference(font_id));
        }
        _ => {
            res.set(
                "Font",
                Object::Dictionary(Dictionary::from_iter([(
                    "DbStamp",
                    Object::Reference(font_id),
                )])),
            );
        }
    }
}
