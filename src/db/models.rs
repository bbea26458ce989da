use serde::Deserialize;

/// A chunk row as written to the `chunks` table.
#[derive(Debug, Clone)]
pub struct ChunkRow<'a> {
    pub key: &'a str,
    pub source: &'a str,
    pub page: Option<u32>,
    pub position: usize,
    pub content: &'a str,
}

/// One line of the manual manifest CSV.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestRow {
    pub make: String,
    pub model: String,
    pub year: String,
    pub bundle_url: String,
}

impl ManifestRow {
    /// Name of the first empty field, if any.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("make", &self.make),
            ("model", &self.model),
            ("year", &self.year),
            ("bundle_url", &self.bundle_url),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Result set of an ad-hoc query, every cell rendered as text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
