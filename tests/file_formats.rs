//! Binary document formats through submission, processing, and search.

use std::io::Write;
use std::sync::Arc;

use legally::config::Config;
use legally::embedding::FallbackEmbedder;
use legally::models::Status;
use legally::pipeline::Outcome;
use legally::service::{Service, SubmitRequest};
use legally::store::InMemoryStore;

fn service(preserve_paragraphs: bool) -> Service {
    let mut cfg = Config::minimal("unused.sqlite");
    cfg.embedding.provider = "fallback".to_string();
    cfg.extraction.preserve_paragraphs = preserve_paragraphs;
    Service::new(
        cfg,
        Arc::new(InMemoryStore::new()),
        Arc::new(FallbackEmbedder::new()),
    )
}

fn request(content: Vec<u8>, format: Option<&str>, filename: &str) -> SubmitRequest {
    SubmitRequest {
        content,
        format: format.map(str::to_string),
        title: "Court Decision".to_string(),
        category: "Administrative Law".to_string(),
        source: "archive".to_string(),
        filename: filename.to_string(),
        owner_id: String::new(),
    }
}

/// One-page PDF whose only text is `phrase`.
fn pdf_with_phrase(phrase: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(phrase)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    zip_with(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

fn pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect();
    let borrowed: Vec<(&str, String)> = entries
        .iter()
        .map(|(n, b)| (n.as_str(), b.clone()))
        .collect();
    zip_with(&borrowed)
}

fn xlsx_with_cells(strings: &[&str]) -> Vec<u8> {
    let shared: String = strings
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", s))
        .collect();
    let cells: String = (0..strings.len())
        .map(|i| format!("<c r=\"A{}\" t=\"s\"><v>{}</v></c>", i + 1, i))
        .collect();
    zip_with(&[
        (
            "xl/sharedStrings.xml",
            format!(
                "<?xml version=\"1.0\"?><sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">{}</sst>",
                shared
            ),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                "<?xml version=\"1.0\"?><worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData><row r=\"1\">{}</row></sheetData></worksheet>",
                cells
            ),
        ),
    ])
}

#[tokio::test]
async fn pdf_submission_is_searchable() {
    let svc = service(false);
    let summary = svc
        .submit(request(
            pdf_with_phrase("permit revoked by ministry"),
            Some("application/pdf"),
            "decision.pdf",
        ))
        .await
        .unwrap();

    let outcome = svc.process_now(&summary.id).await.unwrap();
    assert!(matches!(outcome, Outcome::Processed { .. }));

    let results = svc.search("ministry", None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, summary.id);
    assert!(results[0].excerpt.to_lowercase().contains("ministry"));
}

#[tokio::test]
async fn docx_paragraphs_become_chunks() {
    let svc = service(true);
    let summary = svc
        .submit(request(
            docx_with_paragraphs(&[
                "The applicant sought a building permit.",
                "The municipality refused without reasons.",
                "The refusal is annulled.",
            ]),
            None,
            "ruling.docx",
        ))
        .await
        .unwrap();

    svc.process_now(&summary.id).await.unwrap();
    let doc = svc.get(&summary.id).await.unwrap();
    assert_eq!(doc.status, Status::Processed);
    assert_eq!(doc.chunks.len(), 3);
    assert_eq!(doc.chunks[1].content, "The municipality refused without reasons.");
    for (i, chunk) in doc.chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64);
        let slice: String = doc
            .content
            .chars()
            .skip(chunk.start_offset as usize)
            .take((chunk.end_offset - chunk.start_offset) as usize)
            .collect();
        assert_eq!(slice, chunk.content);
    }
}

#[tokio::test]
async fn docx_collapses_whitespace_by_default() {
    let svc = service(false);
    let summary = svc
        .submit(request(
            docx_with_paragraphs(&["First finding.", "Second finding."]),
            Some("docx"),
            "",
        ))
        .await
        .unwrap();

    let doc = svc.get(&summary.id).await.unwrap();
    assert_eq!(doc.content, "First finding. Second finding.");
}

#[tokio::test]
async fn pptx_and_xlsx_are_extracted() {
    let svc = service(false);

    let slides = svc
        .submit(request(
            pptx_with_slides(&["Hearing agenda", "Witness list"]),
            None,
            "hearing.pptx",
        ))
        .await
        .unwrap();
    let doc = svc.get(&slides.id).await.unwrap();
    assert_eq!(doc.content, "Hearing agenda Witness list");

    let sheet = svc
        .submit(request(
            xlsx_with_cells(&["Fine", "Penalty"]),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            "fines.xlsx",
        ))
        .await
        .unwrap();
    let doc = svc.get(&sheet.id).await.unwrap();
    assert_eq!(doc.content, "Fine Penalty");
}

#[tokio::test]
async fn corrupt_binaries_are_rejected_synchronously() {
    let svc = service(false);

    let err = svc
        .submit(request(b"%PDF-garbage".to_vec(), Some("pdf"), "broken.pdf"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "extraction_failed");

    let err = svc
        .submit(request(b"PK not really".to_vec(), None, "broken.docx"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "extraction_failed");

    assert_eq!(svc.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn staged_docx_upload_submits_cached_text() {
    let svc = service(false);
    let staged = svc
        .stage_upload(
            "clerk-1",
            &docx_with_paragraphs(&["Staged decision text."]),
            None,
            "staged.docx",
        )
        .await
        .unwrap();
    assert_eq!(staged.format, "docx");

    let summary = svc
        .submit_staged("clerk-1", "Staged Decision", "Administrative Law", "")
        .await
        .unwrap();
    let doc = svc.get(&summary.id).await.unwrap();
    assert_eq!(doc.content, "Staged decision text.");
    assert_eq!(doc.filename, "staged.docx");
    assert_eq!(doc.owner_id, "clerk-1");
}
