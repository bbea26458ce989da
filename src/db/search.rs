use super::{Db, serialize_vector};
use rusqlite::{Result, params};

#[derive(Debug)]
pub struct SearchResult {
    pub chunk_key: String,
    pub source: String,
    pub page: Option<u32>,
    pub position: usize,
    pub content: String,
    pub similarity: f64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(5)?;
    Ok(SearchResult {
        chunk_key: row.get(0)?,
        source: row.get(1)?,
        page: row.get(2)?,
        position: row.get::<_, i64>(3)? as usize,
        content: row.get(4)?,
        similarity: 1.0 - distance,
    })
}

impl Db {
    /// Perform vector similarity search using cosine distance
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                c.chunk_key,
                c.source,
                c.page,
                c.position,
                c.content,
                vec_distance_cosine(v.embedding, ?) as distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
