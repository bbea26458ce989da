//! Retrieval index: the `find_relevant` facade over interchangeable vector stores.

pub mod local;
pub mod pinecone;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::embedder::{Embedder, EmbedderError};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("local index error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("vector store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vector store returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("vector store response was invalid: {0}")]
    InvalidResponse(String),

    #[error("vector store misconfigured: {0}")]
    Config(String),
}

/// Payload stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub position: usize,
    pub text: String,
}

/// Unit of upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One retrieval hit; higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub source: String,
    pub page: Option<u32>,
    pub position: usize,
    pub text: String,
    pub score: f64,
}

/// Storage backend for embedded chunks.
pub trait VectorStore: Send + Sync {
    /// Inserts or overwrites `records` by id, returning how many were written.
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError>;

    /// Nearest neighbours of `vector` by cosine similarity.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IndexError>;
}

/// Text-in, chunks-out search over a [`VectorStore`].
///
/// Every call embeds the query and hits the store; nothing is cached.
#[derive(Clone)]
pub struct ManualIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl ManualIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Up to `k` chunks most relevant to `query`, best first.
    pub fn find_relevant(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query)?;
        let mut hits = self.store.query(&vector, k)?;
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        debug!(k, found = hits.len(), "retrieved manual chunks");
        Ok(hits)
    }
}
