//! On-disk ingestion state: the chunk cache and the processed-id checkpoint.
//!
//! Both files are written through a temporary sibling and renamed into place
//! so an interrupted run never leaves a truncated file behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::core::ChunkSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub processed: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Loads the checkpoint, or an empty one if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read checkpoint: {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid checkpoint: {}", path.display()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processed.extend(ids.into_iter().map(Into::into));
        self.updated_at = Some(Utc::now());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self).context("failed to marshal checkpoint")?;
        write_atomic(path, &data)
    }
}

/// Cached chunk set, if a previous run wrote one.
pub fn load_chunk_cache(path: &Path) -> Result<Option<ChunkSet>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read chunk cache: {}", path.display()))?;
    let set = serde_json::from_str(&data)
        .with_context(|| format!("invalid chunk cache: {}", path.display()))?;
    Ok(Some(set))
}

pub fn save_chunk_cache(path: &Path, set: &ChunkSet) -> Result<()> {
    let data = serde_json::to_vec(set).context("failed to marshal chunk cache")?;
    write_atomic(path, &data)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, data).with_context(|| format!("failed to write {}", path.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DocumentChunk;
    use tempfile::tempdir;

    #[test]
    fn test_missing_checkpoint_is_empty() {
        let dir = tempdir().unwrap();
        let cp = Checkpoint::load(&dir.path().join("progress.json")).unwrap();
        assert!(cp.is_empty());
        assert!(cp.updated_at.is_none());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/progress.json");

        let mut cp = Checkpoint::default();
        cp.extend(["camry-0", "camry-1"]);
        cp.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, cp);
        assert!(loaded.contains("camry-1"));
        assert!(!dir.path().join("state/progress.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "[oops").unwrap();
        assert!(Checkpoint::load(&path).is_err());
    }

    #[test]
    fn test_chunk_cache_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        assert!(load_chunk_cache(&path).unwrap().is_none());

        let set = ChunkSet {
            documents: 1,
            failed_documents: 1,
            chunks: vec![DocumentChunk {
                id: "civic-0".to_string(),
                source: "civic.pdf".to_string(),
                page: 2,
                position: 0,
                text: "Remove the wheel.".to_string(),
            }],
            from_cache: false,
        };
        save_chunk_cache(&path, &set).unwrap();
        assert_eq!(load_chunk_cache(&path).unwrap(), Some(set));
    }
}
