//! Format detection: classify an input by file-name extension.
//!
//! Detection is deliberately a fixed extension table rather than content
//! sniffing: the converter for each format validates the actual bytes and
//! fails with a useful error if the extension lied. An unknown extension
//! is a whole-batch validation failure, never a silent skip.

use crate::error::DocbindError;
use std::fmt;

/// The five input families the conversion engine knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Native PDF: pages pass through with their stored geometry.
    Pdf,
    /// Raster image: one full-bleed page per file.
    Image,
    /// Word-processor document (.doc/.docx).
    Word,
    /// Spreadsheet (.xls/.xlsx).
    Spreadsheet,
    /// Delimited text (.csv).
    DelimitedText,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Image => "image",
            DocumentFormat::Word => "word",
            DocumentFormat::Spreadsheet => "spreadsheet",
            DocumentFormat::DelimitedText => "delimited-text",
        };
        f.write_str(name)
    }
}

/// The file-name extension, lowercased, without the dot.
pub(crate) fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classify a file name into a [`DocumentFormat`].
///
/// # Errors
/// [`DocbindError::UnsupportedFormat`] for anything outside the table;
/// the caller must fail the whole batch.
pub fn detect_format(file_name: &str) -> Result<DocumentFormat, DocbindError> {
    let ext = extension_of(file_name);
    match ext.as_str() {
        "pdf" => Ok(DocumentFormat::Pdf),
        "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tif" | "tiff" => Ok(DocumentFormat::Image),
        "doc" | "docx" => Ok(DocumentFormat::Word),
        "xls" | "xlsx" => Ok(DocumentFormat::Spreadsheet),
        "csv" => Ok(DocumentFormat::DelimitedText),
        _ => Err(DocbindError::UnsupportedFormat {
            file_name: file_name.to_string(),
            extension: ext,
        }),
    }
}
