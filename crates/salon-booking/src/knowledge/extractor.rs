//! Plain-text extraction for uploaded knowledge documents.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{BookingError, BookingResult};

/// Upload formats accepted by the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Txt,
    Pdf,
    Docx,
    /// Legacy binary Word. Accepted for upload; extraction always fails.
    Doc,
}

impl DocumentKind {
    pub const ALLOWED_EXTENSIONS: [&'static str; 4] = [".pdf", ".docx", ".doc", ".txt"];

    /// Detect the kind from a file name's extension, case-insensitively.
    pub fn from_file_name(file_name: &str) -> BookingResult<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        match extension.as_str() {
            ".txt" => Ok(DocumentKind::Txt),
            ".pdf" => Ok(DocumentKind::Pdf),
            ".docx" => Ok(DocumentKind::Docx),
            ".doc" => Ok(DocumentKind::Doc),
            other => Err(BookingError::invalid(format!(
                "File type {} not supported. Allowed types: {}",
                if other.is_empty() { "(none)" } else { other },
                Self::ALLOWED_EXTENSIONS.join(", ")
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Txt => ".txt",
            DocumentKind::Pdf => ".pdf",
            DocumentKind::Docx => ".docx",
            DocumentKind::Doc => ".doc",
        }
    }
}

fn processing(context: &str, err: impl std::fmt::Display) -> BookingError {
    BookingError::Processing(format!("{}: {}", context, err))
}

/// Extract raw text from a stored file. Blocking; run off the async runtime.
pub fn extract_text(path: &Path, kind: DocumentKind) -> BookingResult<String> {
    match kind {
        DocumentKind::Txt => {
            let bytes = fs::read(path).map_err(|e| processing("Error reading text file", e))?;
            let text = String::from_utf8(bytes)
                .map_err(|e| processing("Text file is not valid UTF-8", e))?;
            Ok(text.trim().to_string())
        }
        DocumentKind::Pdf => {
            let bytes = fs::read(path).map_err(|e| processing("Error reading PDF file", e))?;
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| processing("PDF parse error", e))?;
            Ok(text.trim().to_string())
        }
        DocumentKind::Docx => extract_docx_text(path),
        DocumentKind::Doc => Err(BookingError::Processing(
            "Legacy .doc files cannot be processed; please convert to .docx".to_string(),
        )),
    }
}

/// Text of `word/document.xml` in document order: one line per paragraph, table cells
/// separated by spaces.
fn extract_docx_text(path: &Path) -> BookingResult<String> {
    let file = fs::File::open(path).map_err(|e| processing("Error opening Word file", e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| processing("Invalid .docx archive", e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| processing("Missing word/document.xml", e))?
        .read_to_string(&mut xml)
        .map_err(|e| processing("Error reading word/document.xml", e))?;

    let mut reader = Reader::from_str(&xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(e)) => {
                let chunk = e.unescape().map_err(|e| processing("Malformed document text", e))?;
                text.push_str(&chunk);
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:p" => text.push('\n'),
                b"w:tc" => text.push(' '),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(processing("Malformed document XML", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_docx(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("care.docx");
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(DocumentKind::from_file_name("care.TXT").unwrap(), DocumentKind::Txt);
        assert_eq!(DocumentKind::from_file_name("menu.pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("a.b.Docx").unwrap(), DocumentKind::Docx);
        assert_eq!(DocumentKind::from_file_name("old.doc").unwrap(), DocumentKind::Doc);
        assert!(matches!(
            DocumentKind::from_file_name("photo.png"),
            Err(BookingError::InvalidArgument(_))
        ));
        assert!(DocumentKind::from_file_name("README").is_err());
    }

    #[test]
    fn test_extract_txt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("care.txt");
        fs::write(&path, "  Aftercare: avoid water for two hours\n").unwrap();
        assert_eq!(
            extract_text(&path, DocumentKind::Txt).unwrap(),
            "Aftercare: avoid water for two hours"
        );
    }

    #[test]
    fn test_extract_invalid_utf8_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            extract_text(&path, DocumentKind::Txt),
            Err(BookingError::Processing(_))
        ));
    }

    #[test]
    fn test_extract_docx_paragraphs_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_docx(
            dir.path(),
            "<w:p><w:r><w:t>Gel &amp; acrylic care</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Avoid</w:t></w:r><w:r><w:t xml:space=\"preserve\"> hot water</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Gel</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>200000</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let text = extract_text(&path, DocumentKind::Docx).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Gel & acrylic care", "Avoid hot water", "Gel", "200000"]);
    }

    #[test]
    fn test_extract_legacy_doc_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.doc");
        fs::write(&path, b"\xd0\xcf\x11\xe0").unwrap();
        assert!(matches!(
            extract_text(&path, DocumentKind::Doc),
            Err(BookingError::Processing(_))
        ));
    }

    #[test]
    fn test_extract_corrupt_docx_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            extract_text(&path, DocumentKind::Docx),
            Err(BookingError::Processing(_))
        ));
    }
}
