/// Deterministic in-process embedder.
///
/// Vectors are derived from a hash of the text, so identical inputs always
/// map to identical vectors. Used by tests and offline runs.
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Counts every text it embeds, which lets ingestion tests assert that a
/// resumed run did no embedding work.
pub struct MockEmbedder {
    pub dimensions: usize,
    embedded: AtomicUsize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            embedded: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    #[must_use]
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::Relaxed)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let bytes = hasher.finish().to_le_bytes();

        // Spread the hash over the vector with a per-slot offset so the
        // vector is not periodic in 8.
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let b = bytes[i % 8].wrapping_add((i / 8) as u8);
                f32::from(b) / 255.0 - 0.5
            })
            .collect();

        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for MockEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.embedded.fetch_add(texts.len(), Ordering::Relaxed);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
