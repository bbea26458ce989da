use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::checkpoint::{self, Checkpoint};
use super::loader::{self, LoadError};
use super::splitter::TextSplitter;
use super::{DocumentChunk, IngestReport};
use crate::config::IngestConfig;
use crate::embedder::Embedder;
use crate::index::{ChunkMetadata, VectorRecord, VectorStore};

/// Chunks ready for embedding, with document accounting.
///
/// This is also the chunk cache format, so a reused cache reports the same
/// document counts as the run that wrote it.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSet {
    pub documents: usize,
    pub failed_documents: usize,
    pub chunks: Vec<DocumentChunk>,
    #[serde(skip)]
    pub from_cache: bool,
}

/// Page-tagged chunk texts for one document.
fn chunk_file(path: &Path, splitter: &TextSplitter) -> Result<Vec<(u32, String)>, LoadError> {
    let pages = loader::load_document(path)?;
    Ok(pages
        .into_iter()
        .flat_map(|p| {
            let page = p.page;
            splitter
                .split(&p.text)
                .into_iter()
                .map(move |text| (page, text))
        })
        .collect())
}

/// Splits every file in `paths` on a pool of `max_workers` threads.
///
/// Results are merged in input order, so positions and ids are stable for a
/// stable input set.
pub fn chunk_documents(paths: &[PathBuf], settings: &IngestConfig) -> Result<ChunkSet> {
    let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.max_workers.max(1))
        .build()
        .context("failed to build chunking pool")?;

    let per_file: Vec<(&PathBuf, Result<Vec<(u32, String)>, LoadError>)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| (path, chunk_file(path, &splitter)))
            .collect()
    });

    let mut set = ChunkSet::default();
    for (path, result) in per_file {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let pieces = match result {
            Ok(pieces) => pieces,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                set.failed_documents += 1;
                continue;
            }
        };

        println!("{source}: {} chunks", pieces.len());
        set.documents += 1;
        for (page, text) in pieces {
            let position = set.chunks.len();
            set.chunks.push(DocumentChunk {
                id: format!("{stem}-{position}"),
                source: source.clone(),
                page,
                position,
                text,
            });
        }
    }

    Ok(set)
}

/// Chunk list for `dir`, reusing the chunk cache when one exists.
pub fn prepare_chunks(dir: &Path, settings: &IngestConfig) -> Result<ChunkSet> {
    let cache_path = settings.chunks_path();
    if let Some(mut set) = checkpoint::load_chunk_cache(&cache_path)? {
        info!(
            "Loaded {} chunks from {}",
            set.chunks.len(),
            cache_path.display()
        );
        set.from_cache = true;
        return Ok(set);
    }

    anyhow::ensure!(
        dir.is_dir(),
        "manuals directory not found: {}",
        dir.display()
    );
    let paths = loader::discover(dir);
    info!("Chunking {} documents from {}", paths.len(), dir.display());

    let set = chunk_documents(&paths, settings)?;
    checkpoint::save_chunk_cache(&cache_path, &set)?;
    info!(
        "Wrote {} chunks to {}",
        set.chunks.len(),
        cache_path.display()
    );
    Ok(set)
}

/// Embeds chunks in batches and upserts them into a [`VectorStore`].
pub struct Ingestor<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    settings: &'a IngestConfig,
    show_progress: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        settings: &'a IngestConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            settings,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Chunks `dir` (or reuses the cache) and upserts everything not yet
    /// recorded in the checkpoint.
    pub fn run(&self, dir: &Path) -> Result<IngestReport> {
        let set = prepare_chunks(dir, self.settings)?;
        let mut report = self.upsert_all(&set.chunks)?;
        report.documents = set.documents;
        report.failed_documents = set.failed_documents;
        Ok(report)
    }

    /// Upserts `chunks` batch by batch, persisting the checkpoint after each
    /// successful batch.
    pub fn upsert_all(&self, chunks: &[DocumentChunk]) -> Result<IngestReport> {
        let progress_path = self.settings.progress_path();
        let mut checkpoint = Checkpoint::load(&progress_path)?;
        let mut report = IngestReport {
            chunks: chunks.len(),
            ..IngestReport::default()
        };

        let pb = self.progress_bar(chunks.len() as u64);

        for (batch_no, batch) in chunks.chunks(self.settings.batch_size.max(1)).enumerate() {
            let pending: Vec<&DocumentChunk> =
                batch.iter().filter(|c| !checkpoint.contains(&c.id)).collect();
            report.skipped += batch.len() - pending.len();

            if pending.is_empty() {
                pb.inc(batch.len() as u64);
                continue;
            }

            let texts: Vec<&str> = pending.iter().map(|c| c.text.as_str()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .with_context(|| format!("failed to embed batch {batch_no}"))?;

            let records: Vec<VectorRecord> = pending
                .iter()
                .zip(vectors)
                .map(|(c, values)| VectorRecord {
                    id: c.id.clone(),
                    values,
                    metadata: ChunkMetadata {
                        source: c.source.clone(),
                        page: Some(c.page),
                        position: c.position,
                        text: c.text.clone(),
                    },
                })
                .collect();

            let written = self
                .store
                .upsert(&records)
                .with_context(|| format!("failed to upsert batch {batch_no}"))?;

            checkpoint.extend(pending.iter().map(|c| c.id.as_str()));
            checkpoint.save(&progress_path)?;

            report.upserted += written;
            pb.inc(batch.len() as u64);
            pb.suspend(|| println!("Upserted {} chunks", report.upserted));
        }

        pb.finish_and_clear();
        report.processed_total = checkpoint.len();
        info!(
            "Ingestion finished: {} upserted, {} already processed, {} total",
            report.upserted, report.skipped, report.processed_total
        );
        Ok(report)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb
    }
}
