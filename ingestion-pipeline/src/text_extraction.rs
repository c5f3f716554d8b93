use std::io::{Cursor, Read};

use tracing::debug;
use zip::ZipArchive;

use common::error::AppError;

/// One registered extractor per supported format; unknown types are a
/// permanent error.
type Extractor = fn(&[u8]) -> Result<String, AppError>;

fn registry_lookup(mime_type: &str, filename: &str) -> Option<(&'static str, Extractor)> {
    let resolved = if mime_type.is_empty() || mime_type == "application/octet-stream" {
        mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or(mime_type)
    } else {
        mime_type
    };

    match resolved {
        "text/plain" | "text/markdown" => Some(("txt", extract_txt)),
        "application/pdf" => Some(("pdf", extract_pdf)),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(("docx", extract_docx))
        }
        _ => match filename.rsplit('.').next().map(str::to_lowercase).as_deref() {
            Some("txt") | Some("md") => Some(("txt", extract_txt)),
            Some("pdf") => Some(("pdf", extract_pdf)),
            Some("docx") => Some(("docx", extract_docx)),
            _ => None,
        },
    }
}

/// Route the raw bytes through the extractor registered for the document's
/// MIME type (falling back to the filename extension).
pub fn extract_text(bytes: &[u8], mime_type: &str, filename: &str) -> Result<String, AppError> {
    let Some((format, extractor)) = registry_lookup(mime_type, filename) else {
        return Err(AppError::Validation(format!(
            "Unsupported document type: {mime_type}"
        )));
    };

    debug!(%format, %filename, "Extracting document text");
    let text = extractor(bytes)?;

    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "Document contained no extractable text".into(),
        ));
    }

    Ok(text)
}

fn extract_txt(bytes: &[u8]) -> Result<String, AppError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::Validation("Text file is not valid UTF-8".into()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, AppError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::Validation(format!("Failed to extract PDF text: {e}")))
}

/// DOCX files are ZIP archives; the document body lives in
/// `word/document.xml`. Paragraph ends become newlines before the tags are
/// stripped.
fn extract_docx(bytes: &[u8]) -> Result<String, AppError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| AppError::Validation(format!("DOCX is not a readable archive: {e}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| AppError::Validation(format!("DOCX is missing word/document.xml: {e}")))?
        .read_to_string(&mut document_xml)
        .map_err(|e| AppError::Validation(format!("Failed to read DOCX body: {e}")))?;

    let with_breaks = document_xml
        .replace("</w:p>", "</w:p>\n")
        .replace("<w:tab/>", " ");

    Ok(strip_xml_tags(&with_breaks))
}

fn strip_xml_tags(xml: &str) -> String {
    let mut result = String::with_capacity(xml.len() / 4);
    let mut in_tag = false;

    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_bytes(body_xml: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file("word/document.xml", SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(body_xml.as_bytes()).expect("write xml");
            writer.finish().expect("finish zip");
        }
        cursor.into_inner()
    }

    #[test]
    fn plain_text_extracts_as_utf8() {
        let text = extract_text("Petição inicial.".as_bytes(), "text/plain", "peticao.txt")
            .expect("extract");
        assert_eq!(text, "Petição inicial.");
    }

    #[test]
    fn invalid_utf8_text_is_a_permanent_error() {
        let result = extract_text(&[0xff, 0xfe, 0x00], "text/plain", "bad.txt");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn unknown_mime_is_a_permanent_error() {
        let result = extract_text(b"data", "application/vnd.ms-excel", "planilha.xls");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_extracted_text_is_rejected() {
        let result = extract_text(b"   \n ", "text/plain", "vazio.txt");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn extension_fallback_applies_for_octet_stream() {
        let text = extract_text(b"conteudo", "application/octet-stream", "arquivo.txt")
            .expect("extract");
        assert_eq!(text, "conteudo");
    }

    #[test]
    fn docx_body_text_is_extracted() {
        let xml = r#"<?xml version="1.0"?>
            <w:document><w:body>
            <w:p><w:r><w:t>EMENTA: responsabilidade civil.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Segundo parágrafo.</w:t></w:r></w:p>
            </w:body></w:document>"#;

        let text = extract_text(
            &docx_bytes(xml),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "acordao.docx",
        )
        .expect("extract");

        assert!(text.contains("EMENTA: responsabilidade civil."));
        assert!(text.contains("Segundo parágrafo."));
        let ementa_line = text
            .lines()
            .position(|l| l.contains("EMENTA"))
            .expect("first paragraph");
        let second_line = text
            .lines()
            .position(|l| l.contains("Segundo"))
            .expect("second paragraph");
        assert!(ementa_line < second_line, "paragraph order preserved");
    }

    #[test]
    fn corrupt_docx_is_a_permanent_error() {
        let result = extract_text(
            b"not a zip",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "broken.docx",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
