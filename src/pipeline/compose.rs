//! Text-layout page composer for programmatically rendered pages.
//!
//! The approximate renderers (word/spreadsheet/csv fallbacks) and the
//! cover page all need the same primitive: put lines of Helvetica text on
//! letter-ish pages, breaking to a new page on overflow. [`PageComposer`]
//! accumulates raw content-stream operators per page and materialises a
//! [`ConvertedDocument`] at the end, with the two standard fonts shared by
//! every page through a single resources dictionary.

use crate::error::DocbindError;
use crate::pipeline::convert::{ConvertedDocument, PageInfo, PageRotation};
use lopdf::{Dictionary, Document, Object, Stream};
use std::fmt::Write as _;

/// Page margin for composed pages, in points.
const MARGIN: f32 = 54.0;

/// Line height as a multiple of font size.
const LINE_FACTOR: f32 = 1.4;

/// The two faces available on composed pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource_name(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

/// Escape a string for a PDF literal string, keeping the content stream
/// pure ASCII. Characters outside the printable ASCII range render as `?`;
/// the fallback renderers are explicitly approximate.
pub(crate) fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            ' '..='~' => out.push(ch),
            _ => out.push('?'),
        }
    }
    out
}

/// Advance widths for the printable ASCII range of Helvetica-Bold, in
/// 1/1000 em units (Adobe core-14 AFM). Used for stamp-text centring and,
/// as a slight overestimate, for wrapping regular-face body text; erring
/// wide only ever wraps a little early.
#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    // 0x20 space ! " # $ % & ' ( ) * + , - . /
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9 : ; < = > ?
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    // @ A-O
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    // P-Z [ \ ] ^ _
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    // ` a-o
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    // p-z { | } ~
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Width of `text` in points at the given size, Helvetica-Bold metrics.
/// Characters outside printable ASCII count as 600/1000 em.
pub(crate) fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (0x20..=0x7E).contains(&code) {
                u32::from(HELVETICA_BOLD_WIDTHS[(code - 0x20) as usize])
            } else {
                600
            }
        })
        .sum();
    units as f32 / 1000.0 * size
}

/// Greedy word wrap against [`text_width`]. Overlong words are broken at
/// character boundaries so a single token can never overflow the measure.
pub(crate) fn wrap_text(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if text_width(word, size) > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let mut chunk = String::new();
            for ch in word.chars() {
                chunk.push(ch);
                if text_width(&chunk, size) > max_width && chunk.chars().count() > 1 {
                    let last = chunk.pop().unwrap_or(' ');
                    lines.push(std::mem::take(&mut chunk));
                    chunk.push(last);
                }
            }
            current = chunk;
            continue;
        }
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, size) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Accumulates content-stream operators page by page.
pub struct PageComposer {
    width: f32,
    height: f32,
    finished: Vec<String>,
    current: String,
    cursor_y: f32,
}

impl PageComposer {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            finished: Vec::new(),
            current: String::new(),
            cursor_y: height - MARGIN,
        }
    }

    /// Usable width between the margins.
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * MARGIN
    }

    pub fn left(&self) -> f32 {
        MARGIN
    }

    /// Close the current page and start a fresh one.
    pub fn break_page(&mut self) {
        self.finished.push(std::mem::take(&mut self.current));
        self.cursor_y = self.height - MARGIN;
    }

    /// Break the page unless at least `needed` points remain above the
    /// bottom margin.
    fn ensure_room(&mut self, needed: f32) {
        if self.cursor_y - needed < MARGIN {
            self.break_page();
        }
    }

    /// Emit one line of text at the cursor, wrapped to the content width,
    /// advancing the cursor (and breaking pages) as needed.
    pub fn text_line(&mut self, text: &str, face: Face, size: f32) {
        let advance = size * LINE_FACTOR;
        for line in wrap_text(text, self.content_width(), size) {
            self.ensure_room(advance);
            self.cursor_y -= advance;
            if !line.is_empty() {
                self.put_text(MARGIN, self.cursor_y, &line, face, size);
            }
        }
    }

    /// Emit one row of cells at fixed column positions (no wrapping; the
    /// caller truncates). Advances the cursor once for the whole row.
    pub fn grid_row(&mut self, cells: &[String], col_width: f32, face: Face, size: f32) {
        let advance = size * LINE_FACTOR;
        self.ensure_room(advance);
        self.cursor_y -= advance;
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let x = MARGIN + i as f32 * col_width;
            self.put_text(x, self.cursor_y, cell, face, size);
        }
    }

    /// Horizontal rule across the content width at the cursor.
    pub fn rule(&mut self) {
        self.ensure_room(6.0);
        self.cursor_y -= 4.0;
        let _ = writeln!(
            self.current,
            "0.75 w\n{} {} m {} {} l S",
            MARGIN,
            self.cursor_y,
            self.width - MARGIN,
            self.cursor_y
        );
        self.cursor_y -= 2.0;
    }

    /// Vertical whitespace.
    pub fn gap(&mut self, pts: f32) {
        self.cursor_y -= pts;
    }

    fn put_text(&mut self, x: f32, y: f32, text: &str, face: Face, size: f32) {
        let _ = writeln!(
            self.current,
            "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET",
            face.resource_name(),
            size,
            x,
            y,
            escape_pdf_text(text)
        );
    }

    /// Materialise the composed pages as a [`ConvertedDocument`].
    ///
    /// Always yields at least one page: an untouched composer produces a
    /// single blank page rather than an invalid zero-page document.
    pub fn finish(mut self) -> Result<ConvertedDocument, DocbindError> {
        self.finished.push(std::mem::take(&mut self.current));

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let bold_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica-Bold".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([
                ("F1", Object::Reference(regular_id)),
                ("F2", Object::Reference(bold_id)),
            ])),
        )]));

        let mut kids = Vec::new();
        let mut pages = Vec::new();
        for content in self.finished {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        0.into(),
                        0.into(),
                        Object::Real(self.width),
                        Object::Real(self.height),
                    ]),
                ),
            ]));
            kids.push(Object::Reference(page_id));
            pages.push(PageInfo {
                id: page_id,
                width: self.width,
                height: self.height,
                rotation: PageRotation::R0,
            });
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(kids)),
                ("Count", Object::Integer(count)),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Ok(ConvertedDocument { doc, pages })
    }
}
