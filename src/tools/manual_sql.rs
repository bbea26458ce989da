use std::sync::Mutex;

use tracing::debug;

use super::{Tool, ToolError};
use crate::db::Db;

/// Legacy lookup of manual bundles in the `manifest` table.
///
/// The connection should be opened read-only; statements that would write
/// are rejected before they run either way.
pub struct ManualSqlTool {
    db: Mutex<Db>,
}

impl ManualSqlTool {
    pub fn new(db: Db) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Runs `sql` and returns the rows as CSV with a header row, or an
    /// empty string when nothing matches.
    pub fn lookup(&self, sql: &str) -> Result<String, ToolError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(ToolError::Rejected("empty statement".into()));
        }
        let db = self
            .db
            .lock()
            .map_err(|_| ToolError::Format("database lock poisoned".into()))?;

        if !db.is_read_only_statement(sql)? {
            return Err(ToolError::Rejected(format!("not a read-only statement: {sql}")));
        }

        let table = db.query_table(sql)?;
        debug!(rows = table.rows.len(), "manual_sql lookup");
        if table.rows.is_empty() {
            return Ok(String::new());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&table.columns)
            .map_err(|e| ToolError::Format(e.to_string()))?;
        for row in &table.rows {
            writer
                .write_record(row)
                .map_err(|e| ToolError::Format(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ToolError::Format(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ToolError::Format(e.to_string()))
    }
}

impl Tool for ManualSqlTool {
    fn name(&self) -> &'static str {
        "manual_sql"
    }

    fn description(&self) -> &'static str {
        "A read-only SQL query over manifest(make, model, year, bundle_url) → CSV rows"
    }

    fn call(&self, input: &str) -> Result<String, ToolError> {
        self.lookup(input)
    }
}
