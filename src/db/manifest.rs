use std::io::Read;

use super::{
    Db,
    models::{ManifestRow, QueryTable},
};
use rusqlite::types::ValueRef;
use rusqlite::{Result, params};
use tracing::warn;

/// Outcome of a manifest import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ManifestImport {
    pub inserted: usize,
    pub skipped: usize,
}

fn render_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

impl Db {
    /// Replaces the `manifest` table with the rows of a CSV document.
    ///
    /// The CSV must have a header row naming `make`, `model`, `year` and
    /// `bundle_url`. Rows that fail to parse or have an empty field are
    /// skipped with a warning.
    pub fn load_manifest_csv<R: Read>(&mut self, reader: R) -> Result<ManifestImport> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            r#"
            DROP TABLE IF EXISTS manifest;
            CREATE TABLE manifest (
                make        TEXT NOT NULL,
                model       TEXT NOT NULL,
                year        TEXT NOT NULL,
                bundle_url  TEXT NOT NULL
            );
            "#,
        )?;

        let mut import = ManifestImport::default();
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        {
            let mut insert = tx.prepare("INSERT INTO manifest VALUES (?, ?, ?, ?)")?;
            for (line, record) in csv_reader.deserialize::<ManifestRow>().enumerate() {
                // +2: header row and 1-based numbering
                let line = line + 2;
                let row = match record {
                    Ok(row) => row,
                    Err(e) => {
                        warn!("could not insert CSV line {line}: {e}");
                        import.skipped += 1;
                        continue;
                    }
                };
                if let Some(column) = row.first_empty_field() {
                    warn!("could not insert CSV line {line}: empty {column}");
                    import.skipped += 1;
                    continue;
                }
                insert.execute(params![row.make, row.model, row.year, row.bundle_url])?;
                import.inserted += 1;
            }
        }

        tx.commit()?;
        Ok(import)
    }

    /// Whether `sql` compiles to a statement that does not write.
    pub fn is_read_only_statement(&self, sql: &str) -> Result<bool> {
        let stmt = self.conn.prepare(sql)?;
        Ok(stmt.readonly())
    }

    /// Runs `sql` and renders every cell as text.
    pub fn query_table(&self, sql: &str) -> Result<QueryTable> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(render_cell(row.get_ref(i)?));
            }
            rows.push(cells);
        }

        Ok(QueryTable { columns, rows })
    }
}
