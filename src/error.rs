//! Error types for the docbind library.
//!
//! Every error aborts the in-flight batch operation: the assembler never
//! produces a partial merge or a partial archive. The one deliberate
//! exception lives outside this enum: spreadsheet print-layout
//! normalisation is best-effort and only logs its failures
//! (see [`crate::pipeline::office`]).

use crate::pipeline::detect::DocumentFormat;
use std::fmt;
use thiserror::Error;

/// One failed conversion strategy, recorded in the order it was tried.
///
/// Carried by [`DocbindError::Conversion`] so callers can see the whole
/// fallback chain (which executables were probed, why each attempt died)
/// instead of just the last failure.
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    /// Strategy label, e.g. `external-tool(soffice)` or `programmatic`.
    pub strategy: String,
    /// Why this strategy failed.
    pub reason: String,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// All errors returned by the docbind library.
#[derive(Debug, Error)]
pub enum DocbindError {
    /// Malformed batch input (array length mismatch, empty batch).
    /// Surfaced before any document is touched.
    #[error("invalid batch input: {0}")]
    Validation(String),

    /// The file extension is not in the format table.
    /// Policy is fail-fast: the whole batch is rejected, never a silent skip.
    #[error("unsupported format for '{file_name}' (extension '{extension}')\nSupported: .pdf .jpg .jpeg .png .bmp .gif .tif .tiff .doc .docx .xls .xlsx .csv")]
    UnsupportedFormat { file_name: String, extension: String },

    /// Every strategy in the format's fallback chain failed.
    /// `attempts` holds the ordered history for diagnosis.
    #[error("conversion of '{file_name}' ({format}) failed after {} attempt(s):\n{}",
        attempts.len(),
        attempts.iter().map(|a| format!("  - {a}")).collect::<Vec<_>>().join("\n"))]
    Conversion {
        file_name: String,
        format: DocumentFormat,
        attempts: Vec<StrategyAttempt>,
    },

    /// Stamping or cover-page generation failed after a successful
    /// conversion (malformed page geometry, broken page tree). Fatal for
    /// the batch.
    #[error("render failed: {detail}")]
    Render { detail: String },

    /// Temporary storage could not be allocated or written. The staging
    /// scope still sweeps anything partially created on the way out.
    #[error("temporary storage failed: {detail}")]
    Resource {
        detail: String,
        #[source]
        source: std::io::Error,
    },
}

impl DocbindError {
    /// Shorthand for a render failure.
    pub(crate) fn render(detail: impl Into<String>) -> Self {
        DocbindError::Render {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_display_lists_attempts_in_order() {
        let e = DocbindError::Conversion {
            file_name: "report.docx".into(),
            format: DocumentFormat::Word,
            attempts: vec![
                StrategyAttempt {
                    strategy: "external-tool(soffice)".into(),
                    reason: "executable not found".into(),
                },
                StrategyAttempt {
                    strategy: "programmatic".into(),
                    reason: "not a zip archive".into(),
                },
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("report.docx"), "got: {msg}");
        assert!(msg.contains("2 attempt(s)"), "got: {msg}");
        let tool = msg.find("external-tool(soffice)").unwrap();
        let prog = msg.find("programmatic").unwrap();
        assert!(tool < prog, "attempt order must be preserved");
    }

    #[test]
    fn unsupported_format_names_the_file() {
        let e = DocbindError::UnsupportedFormat {
            file_name: "notes.txt".into(),
            extension: "txt".into(),
        };
        assert!(e.to_string().contains("notes.txt"));
        assert!(e.to_string().contains("'txt'"));
    }

    #[test]
    fn validation_display() {
        let e = DocbindError::Validation("labels length 2 != documents length 3".into());
        assert!(e.to_string().starts_with("invalid batch input"));
    }
}
