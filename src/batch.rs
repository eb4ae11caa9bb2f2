//! Batch assembly: the `merge` and `label_split` entry operations.
//!
//! Both take positionally aligned `documents` / `labels` / `start_numbers`
//! and process strictly sequentially, so category numbering never depends
//! on scheduling. A document is stamped only when its own start number is
//! present; the per-request [`CategoryCounters`] then assigns
//! `start + previously stamped in this category`. The first error aborts
//! the whole operation. There is no partial merge and no partial archive.

use crate::config::BatchConfig;
use crate::cover;
use crate::error::DocbindError;
use crate::pipeline::convert::{self, ConvertedDocument, InputDocument};
use crate::pipeline::stamp;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use tracing::{debug, info};

/// Running per-category stamp counts for one request. Never shared across
/// requests; keys are trimmed labels.
#[derive(Debug, Default)]
struct CategoryCounters(HashMap<String, u32>);

impl CategoryCounters {
    /// The number for the next stamp of `label`, advancing the count.
    /// Saturates at `u32::MAX` rather than wrapping past it.
    fn next(&mut self, label: &str, start: u32) -> u32 {
        let used = self.0.entry(label.trim().to_string()).or_insert(0);
        let number = start.saturating_add(*used);
        *used = used.saturating_add(1);
        number
    }
}

/// Stamp text for a label and number: `"INV"` + `100` is `"INV100"`,
/// a blank label yields the bare number.
fn stamp_text(label: &str, number: u32) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        number.to_string()
    } else {
        format!("{trimmed}{number}")
    }
}

fn validate(
    documents: &[InputDocument],
    labels: &[String],
    start_numbers: &[Option<u32>],
) -> Result<(), DocbindError> {
    if documents.is_empty() {
        return Err(DocbindError::Validation("batch is empty".into()));
    }
    if labels.len() != documents.len() || start_numbers.len() != documents.len() {
        return Err(DocbindError::Validation(format!(
            "documents ({}), labels ({}), and start numbers ({}) must be the same length",
            documents.len(),
            labels.len(),
            start_numbers.len()
        )));
    }
    Ok(())
}

fn stamp_first_page(
    converted: &mut ConvertedDocument,
    text: &str,
    config: &BatchConfig,
) -> Result<(), DocbindError> {
    let first = converted
        .pages
        .first()
        .cloned()
        .ok_or_else(|| DocbindError::render("converted document has no pages"))?;
    stamp::stamp_page(&mut converted.doc, &first, text, config)
}

/// Convert every document, stamp numbered first pages in input order, and
/// return one combined PDF. A cover page is prepended when the config
/// asks for one.
pub async fn merge(
    documents: &[InputDocument],
    labels: &[String],
    start_numbers: &[Option<u32>],
    config: &BatchConfig,
) -> Result<Vec<u8>, DocbindError> {
    validate(documents, labels, start_numbers)?;
    info!(count = documents.len(), cover = config.include_cover, "merging batch");

    let mut counters = CategoryCounters::default();
    let mut parts: Vec<ConvertedDocument> = Vec::with_capacity(documents.len() + 1);

    if config.include_cover {
        parts.push(cover::make_cover(labels)?);
    }

    for (i, input) in documents.iter().enumerate() {
        let mut converted = convert::convert_document(input, config).await?;
        if let Some(start) = start_numbers[i] {
            let number = counters.next(&labels[i], start);
            let text = stamp_text(&labels[i], number);
            debug!(file = %input.file_name, %text, "stamping");
            stamp_first_page(&mut converted, &text, config)?;
        }
        parts.push(converted);
    }

    let mut combined = combine_documents(parts)?;
    let mut out = Vec::new();
    combined
        .save_to(&mut out)
        .map_err(|e| DocbindError::render(format!("could not serialise merged pdf: {e}")))?;
    Ok(out)
}

/// Convert and stamp per document, grouped by category in first-seen
/// order, and return a zip archive with one standalone PDF per input.
pub async fn label_split(
    documents: &[InputDocument],
    labels: &[String],
    start_numbers: &[Option<u32>],
    config: &BatchConfig,
) -> Result<Vec<u8>, DocbindError> {
    validate(documents, labels, start_numbers)?;
    info!(count = documents.len(), "splitting batch into archive");

    // group indices by trimmed label, categories in first-seen order,
    // original relative order inside each category
    let mut category_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        let key = label.trim().to_string();
        if !groups.contains_key(&key) {
            category_order.push(key.clone());
        }
        groups.entry(key).or_default().push(i);
    }

    let mut counters = CategoryCounters::default();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(documents.len());

    for category in &category_order {
        for &i in &groups[category] {
            let input = &documents[i];
            let mut converted = convert::convert_document(input, config).await?;
            if let Some(start) = start_numbers[i] {
                let number = counters.next(category, start);
                let text = stamp_text(category, number);
                debug!(file = %input.file_name, %text, "stamping");
                stamp_first_page(&mut converted, &text, config)?;
            }
            let mut bytes = Vec::new();
            converted.doc.save_to(&mut bytes).map_err(|e| {
                DocbindError::render(format!(
                    "could not serialise pdf for '{}': {e}",
                    input.file_name
                ))
            })?;
            entries.push((pdf_entry_name(&input.file_name), bytes));
        }
    }

    write_archive(entries)
}

/// The archive entry name for an input: original stem, extension forced
/// to `.pdf`.
fn pdf_entry_name(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    format!("{stem}.pdf")
}

/// Zip the entries, uniquifying name collisions as `name (2).pdf`,
/// `name (3).pdf`, and so on.
fn write_archive(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, DocbindError> {
    let archive_err = |e: String| DocbindError::render(format!("archive write failed: {e}"));

    let mut out = Vec::new();
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut out));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut used: HashSet<String> = HashSet::new();
    for (name, bytes) in entries {
        let name = uniquify(&mut used, name);
        writer
            .start_file(name, options)
            .map_err(|e| archive_err(e.to_string()))?;
        writer
            .write_all(&bytes)
            .map_err(|e| archive_err(e.to_string()))?;
    }
    writer.finish().map_err(|e| archive_err(e.to_string()))?;
    Ok(out)
}

fn uniquify(used: &mut HashSet<String>, candidate: String) -> String {
    if used.insert(candidate.clone()) {
        return candidate;
    }
    let stem = candidate.trim_end_matches(".pdf").to_string();
    for n in 2u32.. {
        let alternative = format!("{stem} ({n}).pdf");
        if used.insert(alternative.clone()) {
            return alternative;
        }
    }
    unreachable!("counter space exhausted")
}

/// Rebuild one page tree over every part's pages, in part order and page
/// order within each part. Each part is renumbered past the running
/// maximum so object ids never collide; the parts' own catalogs and page
/// trees are discarded. Attributes a page inherits from its source tree
/// (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are flattened onto the
/// page dict first, since the ancestors holding them do not survive.
fn combine_documents(parts: Vec<ConvertedDocument>) -> Result<Document, DocbindError> {
    let mut combined = Document::with_version("1.5");
    let mut max_id: u32 = 1;
    let mut page_objects: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut carried: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut part in parts {
        part.doc.renumber_objects_with(max_id);
        max_id = part.doc.max_id + 1;

        for page_id in part.doc.get_pages().into_values() {
            let Ok(page) = part.doc.get_object(page_id).and_then(Object::as_dict) else {
                continue;
            };
            let mut page = page.clone();
            for key in [b"Resources".as_slice(), b"MediaBox", b"CropBox", b"Rotate"] {
                if !page.has(key) {
                    if let Some(value) = convert::inherited_entry(&part.doc, page_id, key) {
                        page.set(key, value.clone());
                    }
                }
            }
            page_objects.push((page_id, page));
        }
        for (object_id, object) in part.doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    carried.insert(object_id, object);
                }
            }
        }
    }

    if page_objects.is_empty() {
        return Err(DocbindError::render("nothing to combine"));
    }

    for (object_id, object) in carried {
        combined.objects.insert(object_id, object);
    }
    combined.max_id = max_id;

    let pages_id = combined.new_object_id();
    let mut kids = Vec::with_capacity(page_objects.len());
    for (page_id, mut page) in page_objects {
        page.set("Parent", Object::Reference(pages_id));
        combined.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    combined.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );
    let catalog_id = combined.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    combined.trailer.set("Root", Object::Reference(catalog_id));
    combined.renumber_objects();
    Ok(combined)
}
