//! Manual ingestion: discover documents, split them into chunks, embed and
//! upsert them, resuming from a checkpoint of already-processed chunk ids.

pub mod checkpoint;
pub mod core;
pub mod loader;
pub mod splitter;

use serde::{Deserialize, Serialize};

pub use self::core::{ChunkSet, Ingestor, prepare_chunks};

/// Unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `"{file stem}-{position}"`.
    pub id: String,
    pub source: String,
    pub page: u32,
    /// Offset across the whole run, not within the document.
    pub position: usize,
    pub text: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub failed_documents: usize,
    pub chunks: usize,
    /// Chunks already present in the checkpoint.
    pub skipped: usize,
    pub upserted: usize,
    pub processed_total: usize,
}
