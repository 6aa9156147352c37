use std::path::Path;

use anyhow::{bail, Context, Result};
use lopdf::Document;
use tracing::{info, warn};

const MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;
const PDF_MAGIC: &[u8] = b"%PDF";

/// Reject anything that is not a plausibly-sized PDF before parsing it.
pub fn validate_upload(path: &Path) -> Result<()> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        bail!("Invalid file type: {} (expected .pdf)", path.display());
    }

    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if size == 0 {
        bail!("Empty file: {}", path.display());
    }
    if size > MAX_UPLOAD_BYTES {
        bail!(
            "File too large: {} is {} bytes (limit {})",
            path.display(),
            size,
            MAX_UPLOAD_BYTES
        );
    }

    let head = read_head(path)?;
    if !head.starts_with(PDF_MAGIC) {
        bail!("Not a PDF (missing %PDF header): {}", path.display());
    }
    Ok(())
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut buf = Vec::with_capacity(PDF_MAGIC.len());
    std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}

/// Extract text page by page, in page order. Pages that fail to extract come
/// back as empty strings so the rest of the document still gets processed.
pub fn read_pages(path: &Path) -> Result<Vec<String>> {
    let doc = Document::load(path)
        .with_context(|| format!("Failed to load PDF: {}", path.display()))?;

    let pages: Vec<String> = doc
        .get_pages()
        .into_keys()
        .map(|page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                warn!("No text on page {} of {}: {}", page_num, path.display(), e);
                String::new()
            }
        })
        .collect();

    let chars: usize = pages.iter().map(|p| p.chars().count()).sum();
    info!(file = %path.display(), pages = pages.len(), chars, "PDF text extracted");
    Ok(pages)
}

pub fn joined_text(pages: &[String]) -> String {
    pages.join("\n")
}
