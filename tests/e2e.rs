//! End-to-end tests driving the public API with in-memory fixtures.
//!
//! External office executables are pointed at a nonexistent path so the
//! programmatic fallbacks run deterministically on any host.

use docbind::{label_split, merge, BatchConfig, DocbindError, InputDocument};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Read, Write};

// ── fixtures ────────────────────────────────────────────────────────────

fn pdf_with_pages(texts: &[&str], media_box: (f32, f32), rotate: Option<i64>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::new();
    for text in texts {
        let content = format!("BT\n/F1 24 Tf\n72 700 Td\n({text}) Tj\nET\n");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let mut page = Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    Object::Real(media_box.0),
                    Object::Real(media_box.1),
                ]),
            ),
        ]);
        if let Some(degrees) = rotate {
            page.set("Rotate", Object::Integer(degrees));
        }
        kids.push(Object::Reference(doc.add_object(page)));
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

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// One-page PDF that stores MediaBox, Rotate, and Resources only on the
/// Pages node; the page inherits everything.
fn pdf_with_tree_level_geometry(text: &str, media_box: (f32, f32), rotate: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));
    let content = format!("BT\n/F1 24 Tf\n72 700 Td\n({text}) Tj\nET\n");
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Contents", Object::Reference(content_id)),
    ]));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
            (
                "MediaBox",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    Object::Real(media_box.0),
                    Object::Real(media_box.1),
                ]),
            ),
            ("Rotate", Object::Integer(rotate)),
            ("Resources", Object::Reference(resources_id)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, image::Rgb([30, 144, 255]));
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), w, h, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let mut out = Vec::new();
    let mut writer = zip::ZipWriter::new(Cursor::new(&mut out));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap();
    out
}

fn xlsx_bytes() -> Vec<u8> {
    let parts: [(&str, &str); 5] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c><c r="B1" t="inlineStr"><is><t>qty</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>bolt</t></is></c><c r="B2"><v>4</v></c></row>
</sheetData></worksheet>"#,
        ),
    ];

    let mut out = Vec::new();
    let mut writer = zip::ZipWriter::new(Cursor::new(&mut out));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in parts {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    out
}

/// Config that deterministically skips the external tool.
fn offline_config() -> BatchConfig {
    BatchConfig::builder()
        .office_executables(["/nonexistent/soffice"])
        .office_timeout_secs(5)
        .build()
        .unwrap()
}

// ── inspection helpers ──────────────────────────────────────────────────

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

fn page_text(doc: &Document, page_id: ObjectId) -> String {
    let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
    let mut out = String::new();
    let mut collect = |id: ObjectId| {
        if let Ok(Object::Stream(s)) = doc.get_object(id) {
            out.push_str(&String::from_utf8_lossy(&s.content));
        }
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => collect(*id),
        Ok(Object::Array(items)) => {
            for item in items {
                if let Object::Reference(id) = item {
                    collect(*id);
                }
            }
        }
        _ => {}
    }
    out
}

fn archive_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries
}

// ── merge ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_stamps_first_pages_in_input_order() {
    let documents = vec![
        InputDocument::new("a.pdf", pdf_with_pages(&["p1", "p2"], (612.0, 792.0), None)),
        InputDocument::new("b.jpg", jpeg_bytes(100, 80)),
    ];
    let labels = vec!["INV".to_string(), "INV".to_string()];
    let starts = vec![Some(100), Some(100)];

    let out = merge(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 3, "2 pdf pages + 1 image page");

    assert!(page_text(&merged, pages[0]).contains("(INV100) Tj"));
    assert!(
        !page_text(&merged, pages[1]).contains("INV"),
        "inner pages stay clean"
    );
    assert!(page_text(&merged, pages[2]).contains("(INV101) Tj"));
}

#[tokio::test]
async fn blank_label_stamps_bare_number_and_none_skips() {
    let documents = vec![
        InputDocument::new("a.pdf", pdf_with_pages(&["x"], (612.0, 792.0), None)),
        InputDocument::new("b.pdf", pdf_with_pages(&["y"], (612.0, 792.0), None)),
    ];
    let labels = vec!["A".to_string(), String::new()];
    let starts = vec![Some(5), None];

    let out = merge(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 2);
    assert!(page_text(&merged, pages[0]).contains("(A5) Tj"));
    assert!(
        !page_text(&merged, pages[1]).contains("/DbStamp"),
        "no start number means no stamp"
    );
}

#[tokio::test]
async fn stamp_lands_in_the_rotated_frame() {
    let documents = vec![InputDocument::new(
        "rot.pdf",
        pdf_with_pages(&["sideways"], (612.0, 792.0), Some(90)),
    )];
    let labels = vec!["R".to_string()];
    let starts = vec![Some(1)];

    let out = merge(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    let text = page_text(&merged, pages[0]);
    assert!(text.contains("(R1) Tj"), "got: {text}");
    // the overlay maps the viewer's frame through the 90-degree matrix
    assert!(text.contains("0 1 -1 0 612 0 cm"), "got: {text}");
}

#[tokio::test]
async fn passthrough_preserves_page_geometry() {
    let documents = vec![InputDocument::new(
        "wide.pdf",
        pdf_with_pages(&["w"], (400.0, 300.0), None),
    )];
    let out = merge(
        &documents,
        &[String::new()],
        &[None],
        &offline_config(),
    )
    .await
    .unwrap();

    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 1);
    let page = merged.get_object(pages[0]).unwrap().as_dict().unwrap();
    let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
    let dims: Vec<f32> = mb
        .iter()
        .map(|o| match o {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r,
            _ => panic!("non-numeric media box"),
        })
        .collect();
    assert_eq!(dims, vec![0.0, 0.0, 400.0, 300.0]);
}

#[tokio::test]
async fn merge_keeps_geometry_inherited_from_the_page_tree() {
    let documents = vec![InputDocument::new(
        "tree.pdf",
        pdf_with_tree_level_geometry("inherited", (612.0, 792.0), 90),
    )];
    let out = merge(&documents, &["R".to_string()], &[Some(1)], &offline_config())
        .await
        .unwrap();

    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 1);

    // the source Pages node held MediaBox/Rotate/Resources; all three must
    // survive on the merged page, which hangs off a fresh tree
    let page = merged.get_object(pages[0]).unwrap().as_dict().unwrap();
    let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
    assert_eq!(mb.len(), 4);
    assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
    let res = match page.get(b"Resources").unwrap() {
        Object::Reference(id) => merged.get_object(*id).unwrap().as_dict().unwrap(),
        Object::Dictionary(d) => d,
        other => panic!("unexpected resources: {other:?}"),
    };
    let fonts = res.get(b"Font").unwrap().as_dict().unwrap();
    assert!(fonts.has(b"F1"), "inherited font survives");
    assert!(fonts.has(b"DbStamp"), "stamp font registered");

    // and the stamp was laid out for the inherited rotation
    let text = page_text(&merged, pages[0]);
    assert!(text.contains("(R1) Tj"), "got: {text}");
    assert!(text.contains("0 1 -1 0 612 0 cm"), "got: {text}");
}

#[tokio::test]
async fn programmatic_fallbacks_carry_office_formats() {
    let documents = vec![
        InputDocument::new("memo.docx", docx_bytes(&["Hello there.", "Second paragraph."])),
        InputDocument::new("books.xlsx", xlsx_bytes()),
        InputDocument::new("rows.csv", b"name,qty\nbolt,4\nnut,9\n".to_vec()),
    ];
    let labels = vec!["D".into(), "S".into(), "C".into()];
    let starts = vec![Some(1), Some(1), Some(1)];

    let out = merge(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert!(pages.len() >= 3, "one page minimum per document");

    let all_text: String = pages.iter().map(|&p| page_text(&merged, p)).collect();
    assert!(all_text.contains("(D1) Tj"));
    assert!(all_text.contains("(S1) Tj"));
    assert!(all_text.contains("(C1) Tj"));
    assert!(all_text.contains("Hello there."), "docx paragraph text");
    assert!(all_text.contains("Sheet1"), "sheet heading");
    assert!(all_text.contains("bolt"), "grid cells");
}

#[tokio::test]
async fn empty_csv_gets_an_explicit_page() {
    let documents = vec![InputDocument::new("nothing.csv", Vec::new())];
    let out = merge(
        &documents,
        &[String::new()],
        &[None],
        &offline_config(),
    )
    .await
    .unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 1);
    assert!(page_text(&merged, pages[0]).contains("empty file"));
}

#[tokio::test]
async fn cover_page_is_prepended_when_requested() {
    let config = BatchConfig::builder()
        .office_executables(["/nonexistent/soffice"])
        .include_cover(true)
        .build()
        .unwrap();
    let documents = vec![
        InputDocument::new("a.pdf", pdf_with_pages(&["a"], (612.0, 792.0), None)),
        InputDocument::new("b.pdf", pdf_with_pages(&["b"], (612.0, 792.0), None)),
    ];
    let labels = vec!["INV".to_string(), "PO".to_string()];
    let starts = vec![Some(1), Some(1)];

    let out = merge(&documents, &labels, &starts, &config).await.unwrap();
    let merged = Document::load_mem(&out).unwrap();
    let pages = page_ids(&merged);
    assert_eq!(pages.len(), 3, "cover + 2 documents");

    let cover = page_text(&merged, pages[0]);
    assert!(cover.contains("(Contents) Tj"), "got: {cover}");
    assert!(cover.contains("1. INV"));
    assert!(cover.contains("2. PO"));
    // stamps land on the documents, not the cover
    assert!(page_text(&merged, pages[1]).contains("(INV1) Tj"));
    assert!(page_text(&merged, pages[2]).contains("(PO1) Tj"));
}

// ── split ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn split_yields_one_pdf_entry_per_input() {
    let documents = vec![
        InputDocument::new("a.pdf", pdf_with_pages(&["a"], (612.0, 792.0), None)),
        InputDocument::new("b.jpg", jpeg_bytes(64, 64)),
        InputDocument::new("rows.csv", b"x,y\n1,2\n".to_vec()),
    ];
    let labels = vec!["INV".into(), "INV".into(), "PO".into()];
    let starts = vec![Some(1), Some(1), Some(1)];

    let out = label_split(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let entries = archive_entries(&out);
    assert_eq!(entries.len(), 3);
    for (name, bytes) in &entries {
        assert!(name.ends_with(".pdf"), "entry '{name}' must be a pdf");
        Document::load_mem(bytes).expect("every entry parses as a pdf");
    }
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"a.pdf"));
    assert!(names.contains(&"b.pdf"));
    assert!(names.contains(&"rows.pdf"));
}

#[tokio::test]
async fn split_numbers_by_category_in_first_seen_group_order() {
    let documents = vec![
        InputDocument::new("one.pdf", pdf_with_pages(&["1"], (612.0, 792.0), None)),
        InputDocument::new("two.pdf", pdf_with_pages(&["2"], (612.0, 792.0), None)),
        InputDocument::new("three.pdf", pdf_with_pages(&["3"], (612.0, 792.0), None)),
    ];
    // A, B, A: category A groups first with both its documents
    let labels = vec!["A".into(), "B".into(), "A".into()];
    let starts = vec![Some(1), Some(9), Some(1)];

    let out = label_split(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let entries = archive_entries(&out);
    assert_eq!(entries.len(), 3);

    let stamped: Vec<(String, String)> = entries
        .iter()
        .map(|(name, bytes)| {
            let doc = Document::load_mem(bytes).unwrap();
            let first = page_ids(&doc)[0];
            (name.clone(), page_text(&doc, first))
        })
        .collect();

    // archive order follows the grouped processing order
    assert_eq!(stamped[0].0, "one.pdf");
    assert!(stamped[0].1.contains("(A1) Tj"));
    assert_eq!(stamped[1].0, "three.pdf");
    assert!(stamped[1].1.contains("(A2) Tj"));
    assert_eq!(stamped[2].0, "two.pdf");
    assert!(stamped[2].1.contains("(B9) Tj"));
}

#[tokio::test]
async fn split_uniquifies_colliding_entry_names() {
    let documents = vec![
        InputDocument::new("scan.pdf", pdf_with_pages(&["a"], (612.0, 792.0), None)),
        InputDocument::new("scan.jpg", jpeg_bytes(32, 32)),
    ];
    let labels = vec![String::new(), String::new()];
    let starts = vec![None, None];

    let out = label_split(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap();
    let mut names: Vec<String> = archive_entries(&out).into_iter().map(|(n, _)| n).collect();
    names.sort();
    assert_eq!(names, vec!["scan (2).pdf".to_string(), "scan.pdf".to_string()]);
}

// ── failure modes ───────────────────────────────────────────────────────

#[tokio::test]
async fn empty_batch_is_rejected_before_any_work() {
    let err = merge(&[], &[], &[], &offline_config()).await.unwrap_err();
    assert!(matches!(err, DocbindError::Validation(_)));
}

#[tokio::test]
async fn misaligned_arrays_are_rejected() {
    let documents = vec![InputDocument::new(
        "a.pdf",
        pdf_with_pages(&["a"], (612.0, 792.0), None),
    )];
    let err = label_split(
        &documents,
        &["A".to_string(), "B".to_string()],
        &[Some(1)],
        &offline_config(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DocbindError::Validation(_)));
}

#[tokio::test]
async fn unsupported_extension_fails_the_whole_batch() {
    let documents = vec![
        InputDocument::new("good.pdf", pdf_with_pages(&["g"], (612.0, 792.0), None)),
        InputDocument::new("notes.txt", b"plain text".to_vec()),
    ];
    let labels = vec![String::new(), String::new()];
    let starts = vec![None, None];

    let err = merge(&documents, &labels, &starts, &offline_config())
        .await
        .unwrap_err();
    match err {
        DocbindError::UnsupportedFormat { file_name, extension } => {
            assert_eq!(file_name, "notes.txt");
            assert_eq!(extension, "txt");
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_strategies_report_the_attempt_history() {
    // binary .doc with no office suite: external fails, programmatic refuses
    let documents = vec![InputDocument::new(
        "legacy.doc",
        vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1],
    )];
    let err = merge(
        &documents,
        &[String::new()],
        &[None],
        &offline_config(),
    )
    .await
    .unwrap_err();

    match err {
        DocbindError::Conversion { file_name, attempts, .. } => {
            assert_eq!(file_name, "legacy.doc");
            assert!(attempts.len() >= 2, "external + programmatic");
            assert!(attempts[0].strategy.starts_with("external-tool("));
            assert_eq!(attempts.last().unwrap().strategy, "programmatic");
        }
        other => panic!("expected Conversion, got {other:?}"),
    }
}
