use crate::{IngestError, PdfExtractor, RawDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads each path into a [`RawDocument`], keeping the given order.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<RawDocument>, IngestError> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
            let bytes = fs::read(path)?;
            Ok(RawDocument::new(name, bytes))
        })
        .collect()
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Concatenates the text of every page of every document, in upload order.
///
/// Nothing is inserted between pages or documents. The first document that
/// fails to parse aborts the whole extraction.
pub fn extract_text<X>(extractor: &X, documents: &[RawDocument]) -> Result<String, IngestError>
where
    X: PdfExtractor + ?Sized,
{
    let mut text = String::new();

    for document in documents {
        let pages = extractor.extract_pages(document)?;
        debug!(
            document = %document.name,
            checksum = %digest_bytes(&document.bytes),
            pages = pages.len(),
            "extracted document"
        );

        for page in pages {
            text.push_str(&page.text);
        }
    }

    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{digest_bytes, discover_pdf_files, extract_text, load_documents};
    use crate::{IngestError, LopdfExtractor, PageText, PdfExtractor, RawDocument};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    /// Treats each document's bytes as UTF-8 with pages separated by form feeds.
    pub(crate) struct FormFeedExtractor;

    impl PdfExtractor for FormFeedExtractor {
        fn extract_pages(&self, document: &RawDocument) -> Result<Vec<PageText>, IngestError> {
            let body = std::str::from_utf8(&document.bytes).map_err(|error| IngestError::PdfParse {
                document: document.name.clone(),
                details: error.to_string(),
            })?;

            Ok(body
                .split('\u{000c}')
                .enumerate()
                .map(|(index, text)| PageText {
                    number: (index + 1) as u32,
                    text: text.to_string(),
                })
                .collect())
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"skip"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn load_documents_keeps_order_and_names() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let second = dir.path().join("b.pdf");
        let first = dir.path().join("a.pdf");
        fs::write(&second, b"second")?;
        fs::write(&first, b"first")?;

        let documents = load_documents(&[second, first])?;
        let names: Vec<_> = documents.iter().map(|doc| doc.name.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
        assert_eq!(documents[1].bytes, b"first");
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[test]
    fn pages_and_documents_are_concatenated_in_order() {
        let documents = vec![
            RawDocument::new("one.pdf", "A\n\u{000c}B\n".as_bytes()),
            RawDocument::new("two.pdf", "C".as_bytes()),
        ];

        let text = extract_text(&FormFeedExtractor, &documents).unwrap();
        assert_eq!(text, "A\nB\nC");
    }

    #[test]
    fn no_documents_extract_to_empty_text() {
        let text = extract_text(&FormFeedExtractor, &[]).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn one_malformed_document_fails_the_whole_extraction() {
        let documents = vec![
            RawDocument::new("good.pdf", crate::extractor::tests::sample_pdf(&["fine"])),
            RawDocument::new("bad.pdf", b"%PDF-1.4\n%broken".to_vec()),
        ];

        let result = extract_text(&LopdfExtractor, &documents);
        assert!(matches!(
            result,
            Err(IngestError::PdfParse { ref document, .. }) if document == "bad.pdf"
        ));
    }
}
