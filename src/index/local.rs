//! Embedded vector store backed by the local SQLite database.

use std::sync::Mutex;

use super::{IndexError, RetrievedChunk, VectorRecord, VectorStore};
use crate::db::Db;
use crate::db::models::ChunkRow;

pub struct LocalStore {
    db: Mutex<Db>,
}

impl LocalStore {
    pub fn new(db: Db) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Db>, IndexError> {
        self.db
            .lock()
            .map_err(|_| IndexError::Config("local index lock poisoned".into()))
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> Result<usize, IndexError> {
        Ok(self.lock()?.count_chunks()?)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }
}

fn check_width(db: &Db, width: usize) -> Result<(), IndexError> {
    if width != db.dimensions() {
        return Err(IndexError::Config(format!(
            "vector has {width} dimensions, local index expects {}",
            db.dimensions()
        )));
    }
    Ok(())
}

impl VectorStore for LocalStore {
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        let rows: Vec<(ChunkRow<'_>, &[f32])> = records
            .iter()
            .map(|r| {
                (
                    ChunkRow {
                        key: &r.id,
                        source: &r.metadata.source,
                        page: r.metadata.page,
                        position: r.metadata.position,
                        content: &r.metadata.text,
                    },
                    r.values.as_slice(),
                )
            })
            .collect();
        let mut db = self.lock()?;
        for record in records {
            check_width(&db, record.values.len())?;
        }
        Ok(db.upsert_chunks(&rows)?)
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let db = self.lock()?;
        check_width(&db, vector.len())?;
        let results = db.search(vector, top_k)?;
        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                id: r.chunk_key,
                source: r.source,
                page: r.page,
                position: r.position,
                text: r.content,
                score: r.similarity,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::embedder::mock::MockEmbedder;
    use crate::index::{ChunkMetadata, ManualIndex};
    use std::sync::Arc;

    fn record(embedder: &MockEmbedder, id: &str, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values: embedder.embed(text).unwrap(),
            metadata: ChunkMetadata {
                source: "corolla_2015.pdf".to_string(),
                page: Some(12),
                position: 0,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn test_local_store_round_trip_through_facade() {
        let embedder = Arc::new(MockEmbedder::new(32));
        let store = Arc::new(LocalStore::new(Db::open_in_memory(32).unwrap()));

        let records = vec![
            record(&embedder, "corolla_2015-0", "Replace the cabin air filter behind the glove box."),
            record(&embedder, "corolla_2015-1", "Check the serpentine belt tension."),
        ];
        assert_eq!(store.upsert(&records).unwrap(), 2);
        assert_eq!(store.len().unwrap(), 2);

        let index = ManualIndex::new(embedder, store);
        let hits = index
            .find_relevant("Check the serpentine belt tension.", 1)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "corolla_2015-1");
        assert_eq!(hits[0].page, Some(12));
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn test_upsert_same_id_does_not_duplicate() {
        let embedder = MockEmbedder::new(8);
        let store = LocalStore::new(Db::open_in_memory(8).unwrap());
        store.upsert(&[record(&embedder, "a-0", "first")]).unwrap();
        store.upsert(&[record(&embedder, "a-0", "second")]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_mismatched_vector_width_is_rejected() {
        let store = LocalStore::new(Db::open_in_memory(8).unwrap());
        assert!(store.is_empty().unwrap());

        let wide = record(&MockEmbedder::new(16), "a-0", "timing belt");
        let err = store.upsert(&[wide]).unwrap_err();
        assert!(
            err.to_string()
                .contains("vector has 16 dimensions, local index expects 8")
        );
        assert!(store.is_empty().unwrap());

        assert!(matches!(
            store.query(&[0.0; 4], 3),
            Err(IndexError::Config(_))
        ));
    }
}
