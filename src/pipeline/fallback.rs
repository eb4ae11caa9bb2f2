//! Programmatic approximate renderers, the last strategy in the chain.
//!
//! These never aim for layout fidelity. They exist so a batch still
//! assembles on a host with no office suite installed: paragraphs of a
//! `.docx`, a bounded grid of a spreadsheet, the rows of a CSV, each laid
//! out with the shared [`PageComposer`]. Errors are reason strings folded
//! into the attempt history by the caller.

use crate::config::BatchConfig;
use crate::pipeline::compose::{Face, PageComposer};
use crate::pipeline::convert::{ConvertedDocument, InputDocument};
use crate::pipeline::detect::{self, DocumentFormat};
use calamine::{open_workbook_auto_from_rs, Data, Reader as _};
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use tracing::debug;

pub(crate) fn render(
    input: &InputDocument,
    format: DocumentFormat,
    config: &BatchConfig,
) -> Result<ConvertedDocument, String> {
    match format {
        DocumentFormat::Word => render_word(input, config),
        DocumentFormat::Spreadsheet => render_spreadsheet(input, config),
        DocumentFormat::DelimitedText => render_csv(input, config),
        other => Err(format!("no programmatic renderer for {other}")),
    }
}

/// Paragraph text of a `.docx`, one page flow, breaks on overflow.
fn render_word(input: &InputDocument, config: &BatchConfig) -> Result<ConvertedDocument, String> {
    if detect::extension_of(&input.file_name) == "doc" {
        return Err("binary .doc has no programmatic renderer".into());
    }
    let paragraphs = docx_paragraphs(&input.bytes)?;
    debug!(file = %input.file_name, count = paragraphs.len(), "rendering paragraphs");

    let (w, h) = config.fallback_page;
    let mut composer = PageComposer::new(w, h);
    for paragraph in &paragraphs {
        if paragraph.trim().is_empty() {
            composer.gap(8.0);
        } else {
            composer.text_line(paragraph, Face::Regular, 11.0);
        }
    }
    composer.finish().map_err(|e| e.to_string())
}

/// Extract the visible text of `word/document.xml`, one string per `w:p`.
fn docx_paragraphs(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a zip archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml missing".to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| format!("word/document.xml unreadable: {e}"))?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::Empty(e))
                if matches!(e.name().as_ref(), b"w:br" | b"w:tab") && !current.is_empty() =>
            {
                current.push(' ');
            }
            Ok(Event::Text(t)) if in_text => {
                let piece = t.unescape().map_err(|e| format!("malformed text run: {e}"))?;
                current.push_str(&piece);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("word/document.xml malformed: {e}")),
            _ => {}
        }
    }
    Ok(paragraphs)
}

/// Bounded grid render of every sheet, sheet name as heading.
fn render_spreadsheet(
    input: &InputDocument,
    config: &BatchConfig,
) -> Result<ConvertedDocument, String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(input.bytes.clone()))
        .map_err(|e| format!("workbook unreadable: {e}"))?;

    let (w, h) = config.fallback_page;
    let mut composer = PageComposer::new(w, h);

    let names = workbook.sheet_names().to_vec();
    for (i, name) in names.iter().enumerate() {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| format!("sheet '{name}' unreadable: {e}"))?;

        if i > 0 {
            composer.gap(14.0);
        }
        composer.text_line(name, Face::Bold, 13.0);
        composer.rule();

        let cols = range.width().clamp(1, config.max_grid_cols);
        let col_width = composer.content_width() / cols as f32;
        let total_rows = range.height();

        for row in range.rows().take(config.max_grid_rows) {
            let cells: Vec<String> = row
                .iter()
                .take(cols)
                .map(|cell| clip(&cell_text(cell), config.max_cell_chars))
                .collect();
            composer.grid_row(&cells, col_width, Face::Regular, 9.0);
        }
        if total_rows > config.max_grid_rows {
            composer.gap(4.0);
            composer.text_line(
                &format!("... {} more rows", total_rows - config.max_grid_rows),
                Face::Regular,
                9.0,
            );
        }
    }
    composer.finish().map_err(|e| e.to_string())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format!("{f}"),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{e:?}"),
    }
}

/// Delimiter-sniffed CSV render: header row bold over a rule, data rows
/// regular. An empty file becomes one page saying so rather than a
/// silently blank sheet.
fn render_csv(input: &InputDocument, config: &BatchConfig) -> Result<ConvertedDocument, String> {
    let delimiter = sniff_delimiter(&input.bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(input.bytes.as_slice());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| format!("csv parse failed: {e}"))?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }

    let (w, h) = config.fallback_page;
    let mut composer = PageComposer::new(w, h);

    if rows.is_empty() {
        composer.text_line(&format!("{}: empty file", input.file_name), Face::Bold, 12.0);
        return composer.finish().map_err(|e| e.to_string());
    }

    let cols = rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(1)
        .clamp(1, config.max_grid_cols);
    let col_width = composer.content_width() / cols as f32;

    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row
            .iter()
            .take(cols)
            .map(|field| clip(field, config.max_cell_chars))
            .collect();
        let face = if i == 0 { Face::Bold } else { Face::Regular };
        composer.grid_row(&cells, col_width, face, 9.0);
        if i == 0 {
            composer.rule();
        }
    }
    composer.finish().map_err(|e| e.to_string())
}

/// Pick the candidate separator occurring most often in the first line;
/// comma wins ties and empty input.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
    let candidates = [b',', b';', b'\t', b'|', b':'];
    let mut best = b',';
    let mut best_count = 0usize;
    for &candidate in &candidates {
        let count = first_line.iter().filter(|&&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Truncate to `max` characters, marking the cut with an ASCII ellipsis.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
