use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every PDF starts with this header (followed by a version like `1.7`).
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("not a PDF file: {0}")]
    NotPdf(PathBuf),
    #[error("no PDF files found in {0}")]
    NoPdfsFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A PDF read from disk, ready to be handed to the provider as opaque bytes.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Load a PDF from disk.
///
/// The content is not parsed; only the `%PDF-` header is checked so that an
/// obviously wrong file is rejected before it is uploaded anywhere.
pub fn load_pdf(path: &Path) -> Result<PdfDocument, PdfError> {
    if !path.is_file() {
        return Err(PdfError::NotFound(path.to_path_buf()));
    }
    if !has_pdf_header(path)? {
        return Err(PdfError::NotPdf(path.to_path_buf()));
    }

    let bytes = fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    log::debug!("loaded {} ({} bytes)", filename, bytes.len());

    Ok(PdfDocument {
        path: path.to_path_buf(),
        filename,
        bytes,
    })
}

/// Check whether a file starts with the PDF magic bytes.
pub fn has_pdf_header(path: &Path) -> Result<bool, PdfError> {
    let mut file = fs::File::open(path)?;
    let mut header = [0u8; PDF_MAGIC.len()];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == PDF_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// List the `*.pdf` files directly inside `dir`, sorted by file name.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, PdfError> {
    if !dir.is_dir() {
        return Err(PdfError::NotFound(dir.to_path_buf()));
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_pdf_extension(&path) {
            found.push(path);
        }
    }
    found.sort();

    if found.is_empty() {
        return Err(PdfError::NoPdfsFound(dir.to_path_buf()));
    }
    Ok(found)
}

/// Expand command-line inputs: files are kept as given, directories are
/// replaced by the PDFs they contain.
pub fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, PdfError> {
    let mut resolved = Vec::new();
    for input in inputs {
        if input.is_dir() {
            resolved.extend(discover_pdfs(input)?);
        } else if input.is_file() {
            resolved.push(input.clone());
        } else {
            return Err(PdfError::NotFound(input.clone()));
        }
    }
    Ok(resolved)
}

fn is_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_valid_pdf() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "calculus.pdf", b"%PDF-1.7\n%fake body");
        let doc = load_pdf(&path).unwrap();
        assert_eq!(doc.filename, "calculus.pdf");
        assert_eq!(doc.len(), 19);
        assert!(!doc.is_empty());
    }

    #[test]
    fn load_rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "notes.pdf", b"hello world");
        assert!(matches!(load_pdf(&path), Err(PdfError::NotPdf(_))));
    }

    #[test]
    fn load_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "tiny.pdf", b"%PD");
        assert!(matches!(load_pdf(&path), Err(PdfError::NotPdf(_))));
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.pdf");
        assert!(matches!(load_pdf(&missing), Err(PdfError::NotFound(_))));
    }

    #[test]
    fn discover_sorted_pdfs_only() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.pdf", b"%PDF-1.4");
        write(dir.path(), "a.PDF", b"%PDF-1.4");
        write(dir.path(), "readme.txt", b"ignore me");
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let found = discover_pdfs(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn discover_empty_dir_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "readme.txt", b"nothing here");
        assert!(matches!(
            discover_pdfs(dir.path()),
            Err(PdfError::NoPdfsFound(_))
        ));
    }

    #[test]
    fn resolve_mixes_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("data");
        fs::create_dir(&sub).unwrap();
        write(&sub, "one.pdf", b"%PDF-1.4");
        write(&sub, "two.pdf", b"%PDF-1.4");
        let single = write(dir.path(), "single.pdf", b"%PDF-1.4");

        let resolved = resolve_inputs(&[single.clone(), sub.clone()]).unwrap();
        assert_eq!(resolved, vec![single, sub.join("one.pdf"), sub.join("two.pdf")]);
    }

    #[test]
    fn resolve_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.pdf");
        assert!(matches!(
            resolve_inputs(&[missing]),
            Err(PdfError::NotFound(_))
        ));
    }
}
