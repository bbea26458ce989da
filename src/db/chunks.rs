use super::{Db, models::ChunkRow, serialize_vector};
use chrono::Utc;
use rusqlite::{Result, params};

impl Db {
    /// Inserts or replaces chunks and their vectors, keyed by chunk key.
    ///
    /// Returns the number of chunks written.
    pub fn upsert_chunks(&mut self, rows: &[(ChunkRow<'_>, &[f32])]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let now = Utc::now();

        for (row, vector) in rows {
            let chunk_id: i64 = tx.query_row(
                r#"
                INSERT INTO chunks (chunk_key, source, page, position, content, upserted_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_key) DO UPDATE SET
                    source = excluded.source,
                    page = excluded.page,
                    position = excluded.position,
                    content = excluded.content,
                    upserted_at = excluded.upserted_at
                RETURNING id
                "#,
                params![
                    row.key,
                    row.source,
                    row.page,
                    row.position as i64,
                    row.content,
                    now
                ],
                |r| r.get(0),
            )?;

            // vec0 tables have no upsert; replace the vector by rowid
            tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![chunk_id])?;
            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, serialize_vector(vector)],
            )?;
        }

        tx.commit()?;
        Ok(rows.len())
    }

    /// Number of chunks stored in the local index.
    pub fn count_chunks(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn chunk_content(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row(
                "SELECT content FROM chunks WHERE chunk_key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }
}
