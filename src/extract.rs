//! Content extraction: binary document payload → normalized plain text.
//!
//! The payload is copied into a scoped temporary file, parsed on the
//! blocking pool under a timeout, and normalized. The temporary file is
//! owned by [`extract_document`] and removed on every exit path,
//! including the timeout path.
//!
//! Supported formats: PDF (`pdf-extract`), DOCX/PPTX/XLSX (`zip` +
//! `quick-xml`), and UTF-8 plain text.

use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::Duration;

use quick_xml::events::Event;

use crate::chunk::split_paragraphs;
use crate::config::ExtractionConfig;
use crate::error::ExtractError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// A recognized document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Text,
}

impl Format {
    /// Resolve a declared format: a MIME type, a bare extension
    /// (`pdf`, `.docx`), or a filename.
    pub fn from_declared(declared: &str) -> Result<Format, ExtractError> {
        let d = declared.trim().to_ascii_lowercase();
        let by_name = match d.as_str() {
            MIME_PDF | "pdf" => Some(Format::Pdf),
            MIME_DOCX | "docx" => Some(Format::Docx),
            MIME_PPTX | "pptx" => Some(Format::Pptx),
            MIME_XLSX | "xlsx" => Some(Format::Xlsx),
            MIME_TEXT | "text/markdown" | "txt" | "text" | "md" => Some(Format::Text),
            _ => None,
        };
        by_name
            .or_else(|| Format::from_filename(&d))
            .ok_or_else(|| ExtractError::UnsupportedFormat(declared.to_string()))
    }

    /// Infer a format from a filename extension.
    pub fn from_filename(name: &str) -> Option<Format> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        match ext.as_str() {
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            "pptx" => Some(Format::Pptx),
            "xlsx" => Some(Format::Xlsx),
            "txt" | "md" => Some(Format::Text),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Pptx => "pptx",
            Format::Xlsx => "xlsx",
            Format::Text => "txt",
        }
    }
}

/// Extract and normalize text from a document payload.
///
/// Fails with [`ExtractError::TooLarge`] above `max_bytes`,
/// [`ExtractError::ExtractionTimeout`] when parsing exceeds
/// `timeout_secs`, and [`ExtractError::EmptyDocument`] when nothing but
/// whitespace was extracted.
pub async fn extract_document(
    bytes: &[u8],
    format: Format,
    config: &ExtractionConfig,
) -> Result<String, ExtractError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    extract_with(bytes, format, config, timeout, extract_file).await
}

type Extractor = fn(&Path, Format) -> Result<String, ExtractError>;

async fn extract_with(
    bytes: &[u8],
    format: Format,
    config: &ExtractionConfig,
    timeout: Duration,
    extractor: Extractor,
) -> Result<String, ExtractError> {
    if bytes.len() > config.max_bytes {
        return Err(ExtractError::TooLarge {
            size: bytes.len(),
            limit: config.max_bytes,
        });
    }

    let suffix = format!(".{}", format.extension());
    let mut builder = tempfile::Builder::new();
    builder.prefix("legally_").suffix(&suffix);
    let mut tmp = match &config.temp_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            builder.tempfile_in(dir)?
        }
        None => builder.tempfile()?,
    };
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().flush()?;

    let path = tmp.path().to_path_buf();
    let task = tokio::task::spawn_blocking(move || extractor(&path, format));

    let raw = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_err)) => {
            return Err(ExtractError::Unreadable(format!(
                "extraction task failed: {}",
                join_err
            )))
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "extraction timed out, discarding temp file"
            );
            return Err(ExtractError::ExtractionTimeout(timeout.as_secs()));
        }
    };
    drop(tmp);

    let text = if config.preserve_paragraphs {
        normalize_paragraphs(&raw)
    } else {
        normalize_whitespace(&raw)
    };

    if text.is_empty() {
        return Err(ExtractError::EmptyDocument);
    }

    Ok(text)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace inside paragraphs but keep blank-line boundaries
/// as `\n\n`.
pub fn normalize_paragraphs(text: &str) -> String {
    split_paragraphs(text, 1)
        .iter()
        .map(|span| normalize_whitespace(&span.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_file(path: &Path, format: Format) -> Result<String, ExtractError> {
    match format {
        Format::Pdf => {
            pdf_extract::extract_text(path).map_err(|e| ExtractError::Unreadable(e.to_string()))
        }
        Format::Docx => extract_docx(open_zip(path)?),
        Format::Pptx => extract_pptx(open_zip(path)?),
        Format::Xlsx => extract_xlsx(open_zip(path)?),
        Format::Text => {
            let bytes = std::fs::read(path)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| ExtractError::Unreadable("text is not valid UTF-8".to_string()))?;
            Ok(text.trim_start_matches('\u{feff}').to_string())
        }
    }
}

fn open_zip(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, ExtractError> {
    let file = std::fs::File::open(path)?;
    zip::ZipArchive::new(file).map_err(|e| ExtractError::Unreadable(e.to_string()))
}

fn read_zip_entry_bounded<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Unreadable(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Unreadable(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx<R: Read + Seek>(mut archive: zip::ZipArchive<R>) -> Result<String, ExtractError> {
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_text_runs(&xml)
}

fn extract_pptx<R: Read + Seek>(mut archive: zip::ZipArchive<R>) -> Result<String, ExtractError> {
    let slide_names = sorted_entries(&archive, "ppt/slides/slide");
    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_text_runs(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Collect `<t>` runs (`w:t` in Word, `a:t` in slides). Each closed `<p>`
/// paragraph ends with a blank line so paragraph structure survives.
fn extract_text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push(' ');
                    }
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with("\n\n") {
                    out.push_str("\n\n");
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Unreadable(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn sorted_entries<R: Read + Seek>(archive: &zip::ZipArchive<R>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_xlsx<R: Read + Seek>(mut archive: zip::ZipArchive<R>) -> Result<String, ExtractError> {
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = sorted_entries(&archive, "xl/worksheets/sheet");
    let mut out = String::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let cell_texts = extract_xlsx_sheet_cells(&sheet_xml, &shared_strings)?;
        if !out.is_empty() && !cell_texts.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&cell_texts);
    }
    Ok(out)
}

fn read_shared_strings<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ExtractError> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Unreadable(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_xlsx_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    if cell_is_shared_str {
                        if let Some(text) = s.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                            cells.push(text.clone());
                        }
                    } else {
                        cells.push(s.to_string());
                    }
                }
                in_v = false;
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Unreadable(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn temp_config(dir: &Path) -> ExtractionConfig {
        ExtractionConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn test_format_from_declared() {
        assert_eq!(Format::from_declared("application/pdf").unwrap(), Format::Pdf);
        assert_eq!(Format::from_declared("PDF").unwrap(), Format::Pdf);
        assert_eq!(Format::from_declared("contract.DOCX").unwrap(), Format::Docx);
        assert_eq!(Format::from_declared("txt").unwrap(), Format::Text);
        assert_eq!(Format::from_declared(MIME_XLSX).unwrap(), Format::Xlsx);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = Format::from_declared("application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
        assert!(Format::from_declared("scan.tiff").is_err());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  The\tparties \n\n agree\r\n  hereby. "),
            "The parties agree hereby."
        );
    }

    #[test]
    fn test_normalize_paragraphs_keeps_blank_lines() {
        assert_eq!(
            normalize_paragraphs("Article  1\nGeneral.\n\n\n  Article 2 \n\n"),
            "Article 1 General.\n\nArticle 2"
        );
    }

    #[tokio::test]
    async fn test_plain_text_normalized() {
        let dir = tempfile::TempDir::new().unwrap();
        let text = extract_document(
            "Civil  Code\n\nArticle 1.\tScope".as_bytes(),
            Format::Text,
            &temp_config(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(text, "Civil Code Article 1. Scope");
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = extract_document(b" \n\t \n", Format::Text, &temp_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyDocument));
    }

    #[tokio::test]
    async fn test_too_large_rejected() {
        let cfg = ExtractionConfig {
            max_bytes: 4,
            ..ExtractionConfig::default()
        };
        let err = extract_document(b"hello", Format::Text, &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 5, limit: 4 }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = extract_document(&[0xff, 0xfe, 0x00], Format::Text, &temp_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[tokio::test]
    async fn test_invalid_pdf_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = extract_document(b"not a pdf", Format::Pdf, &temp_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[tokio::test]
    async fn test_invalid_zip_returns_error_for_docx() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = extract_document(b"not a zip", Format::Docx, &temp_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[tokio::test]
    async fn test_docx_paragraphs() {
        let dir = tempfile::TempDir::new().unwrap();
        let bytes = docx_with_paragraphs(&["Article 1", "The lessee shall pay rent."]);
        let cfg = ExtractionConfig {
            preserve_paragraphs: true,
            ..temp_config(dir.path())
        };
        let text = extract_document(&bytes, Format::Docx, &cfg).await.unwrap();
        assert_eq!(text, "Article 1\n\nThe lessee shall pay rent.");
    }

    fn slow_extractor(_path: &Path, _format: Format) -> Result<String, ExtractError> {
        std::thread::sleep(Duration::from_millis(300));
        Ok("too late".to_string())
    }

    #[tokio::test]
    async fn test_timeout_removes_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = temp_config(dir.path());
        let err = extract_with(
            b"payload",
            Format::Text,
            &cfg,
            Duration::from_millis(20),
            slow_extractor,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionTimeout(_)));
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0, "temp file must be removed on timeout");
    }

    #[tokio::test]
    async fn test_temp_files_removed_on_success_and_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = temp_config(dir.path());
        extract_document(b"some text", Format::Text, &cfg).await.unwrap();
        let _ = extract_document(b"not a zip", Format::Xlsx, &cfg).await;
        let _ = extract_document(b"   ", Format::Text, &cfg).await;
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0, "temporary files must be cleaned up");
    }
}
