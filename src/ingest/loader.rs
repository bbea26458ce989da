//! Manual discovery and page-level text extraction.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse PDF {path}: {source}")]
    Pdf { path: String, source: lopdf::Error },

    #[error("unsupported file type: {0}")]
    Unsupported(String),
}

/// Text of one page; plain-text documents are a single page 1.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// Checks if a file extension is supported
pub fn is_supported_extension(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "pdf" | "txt" | "md")
}

/// Supported files under `dir`, recursively, in sorted order.
pub fn discover(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir).hidden(false).git_ignore(false).build();

    let mut paths: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(is_supported_extension)
        })
        .collect();
    paths.sort();
    paths
}

/// Reads a document into its pages.
///
/// PDF pages whose text cannot be extracted are skipped with a warning.
pub fn load_document(path: &Path) -> Result<Vec<PageText>, LoadError> {
    let shown = path.display().to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "pdf" => {
            let doc = lopdf::Document::load(path).map_err(|source| LoadError::Pdf {
                path: shown.clone(),
                source,
            })?;
            let mut pages = Vec::new();
            for page in doc.get_pages().keys().copied() {
                match doc.extract_text(&[page]) {
                    Ok(text) => pages.push(PageText { page, text }),
                    Err(e) => warn!("{shown}: could not extract page {page}: {e}"),
                }
            }
            Ok(pages)
        }
        "txt" | "md" => {
            let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
                path: shown,
                source,
            })?;
            Ok(vec![PageText { page: 1, text }])
        }
        _ => Err(LoadError::Unsupported(shown)),
    }
}
