//! Office-family conversion: external tool chain with programmatic fallback.
//!
//! Word, spreadsheet, and delimited-text inputs try each configured
//! headless office executable in order, then the format's approximate
//! programmatic renderer. Every failed strategy is recorded; only when
//! the whole chain is exhausted does the document fail, carrying the
//! ordered attempt history.

use crate::config::BatchConfig;
use crate::error::{DocbindError, StrategyAttempt};
use crate::pipeline::convert::{self, ConvertedDocument, InputDocument};
use crate::pipeline::detect::{self, DocumentFormat};
use crate::pipeline::{fallback, staging::Staging};
use lopdf::Document;
use std::borrow::Cow;
use std::io::{Read, Write};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Run the strategy chain for one office-family input.
pub(crate) async fn convert_with_fallback(
    input: &InputDocument,
    format: DocumentFormat,
    config: &BatchConfig,
) -> Result<ConvertedDocument, DocbindError> {
    let extension = detect::extension_of(&input.file_name);

    // Spreadsheets get a best-effort print layout before the external
    // tool renders them, so wide sheets come out landscape and fitted
    // instead of sliced across pages. Failure keeps the original bytes.
    let staged_bytes: Cow<'_, [u8]> =
        if format == DocumentFormat::Spreadsheet && extension == "xlsx" {
            match normalize_print_layout(&input.bytes) {
                Some(patched) => Cow::Owned(patched),
                None => {
                    warn!(file = %input.file_name, "print-layout normalisation failed, using original bytes");
                    Cow::Borrowed(&input.bytes)
                }
            }
        } else {
            Cow::Borrowed(&input.bytes)
        };

    let mut attempts = Vec::new();
    let per_attempt = Duration::from_secs(config.office_timeout_secs);

    for exe in &config.office_executables {
        match run_external(exe, &input.file_name, &staged_bytes, &extension, per_attempt).await {
            Ok(done) => {
                info!(file = %input.file_name, tool = %exe, pages = done.pages.len(), "external conversion succeeded");
                return Ok(done);
            }
            Err(reason) => {
                debug!(file = %input.file_name, tool = %exe, %reason, "external attempt failed");
                attempts.push(StrategyAttempt {
                    strategy: format!("external-tool({exe})"),
                    reason,
                });
            }
        }
    }

    match fallback::render(input, format, config) {
        Ok(done) => {
            info!(file = %input.file_name, pages = done.pages.len(), "programmatic fallback succeeded");
            Ok(done)
        }
        Err(reason) => {
            attempts.push(StrategyAttempt {
                strategy: "programmatic".into(),
                reason,
            });
            Err(DocbindError::Conversion {
                file_name: input.file_name.clone(),
                format,
                attempts,
            })
        }
    }
}

/// One external attempt: stage the input in a scoped temp directory,
/// invoke the tool headless, parse the PDF it leaves behind. Any failure
/// comes back as a reason string for the attempt record. The staging
/// directory is swept on every exit path, and `kill_on_drop` reaps the
/// child if the timeout abandons it.
async fn run_external(
    exe: &str,
    file_name: &str,
    bytes: &[u8],
    extension: &str,
    per_attempt: Duration,
) -> Result<ConvertedDocument, String> {
    let staging = Staging::create().map_err(|e| e.to_string())?;
    let staged = staging
        .stage_input(extension, bytes)
        .map_err(|e| e.to_string())?;

    debug!(tool = %exe, input = %staged.display(), "spawning headless conversion");
    let run = Command::new(exe)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(staging.path())
        .arg(&staged)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match timeout(per_attempt, run).await {
        Err(_) => return Err(format!("timed out after {}s", per_attempt.as_secs())),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err("executable not found".into())
        }
        Ok(Err(e)) => return Err(format!("could not spawn: {e}")),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet: String = stderr.trim().chars().take(200).collect();
        return Err(format!("exited with {}: {snippet}", output.status));
    }

    let produced = staging.expected_output();
    let pdf_bytes = std::fs::read(&produced)
        .map_err(|_| format!("no output at {}", produced.display()))?;

    let doc = Document::load_mem(&pdf_bytes)
        .map_err(|e| format!("tool output for '{file_name}' unparsable: {e}"))?;
    let pages = convert::collect_pages(&doc);
    if pages.is_empty() {
        return Err("tool output has no pages".into());
    }
    Ok(ConvertedDocument { doc, pages })
}

/// Inject a landscape, fit-to-page `<pageSetup>` into every worksheet of
/// an `.xlsx` that does not already declare one. Returns `None` on any
/// structural surprise; the caller falls back to the original bytes.
fn normalize_print_layout(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).ok()?;
    let mut out = Vec::new();
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut out));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).ok()?;
        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).ok()?;

        if name.starts_with("xl/worksheets/") && name.ends_with(".xml") {
            if let Ok(text) = String::from_utf8(content) {
                content = patch_worksheet(text).into_bytes();
            } else {
                return None;
            }
        }

        writer.start_file(name, options).ok()?;
        writer.write_all(&content).ok()?;
    }
    writer.finish().ok()?;
    Some(out)
}

fn patch_worksheet(text: String) -> String {
    if text.contains("<pageSetup") {
        return text;
    }
    match text.rfind("</worksheet>") {
        Some(pos) => {
            let mut patched = String::with_capacity(text.len() + 64);
            patched.push_str(&text[..pos]);
            patched.push_str(r#"<pageSetup orientation="landscape" fitToPage="1"/>"#);
            patched.push_str(&text[pos..]);
            patched
        }
        None => text,
    }
}
