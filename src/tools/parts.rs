use std::collections::BTreeMap;

use url::form_urlencoded::byte_serialize;

use super::{Tool, ToolError};

const RETAILERS: [(&str, &str); 3] = [
    ("amazon", "https://www.amazon.com/s?k="),
    ("autozone", "https://www.autozone.com/searchresult?searchText="),
    ("oreilly", "https://www.oreillyauto.com/search?q="),
];

/// Builds retailer search links for a parts list. No network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartsSearchTool;

impl PartsSearchTool {
    /// Joins the comma-separated entries of `parts` into one search query.
    pub fn search_query(parts: &str) -> String {
        parts
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Retailer name → search URL for `parts`.
    pub fn urls_for(parts: &str) -> BTreeMap<String, String> {
        let query = Self::search_query(parts);
        let encoded: String = byte_serialize(query.as_bytes()).collect();
        RETAILERS
            .iter()
            .map(|(name, prefix)| (name.to_string(), format!("{prefix}{encoded}")))
            .collect()
    }
}

impl Tool for PartsSearchTool {
    fn name(&self) -> &'static str {
        "parts_search"
    }

    fn description(&self) -> &'static str {
        "A comma-separated list of parts/tools → search URLs on Amazon, AutoZone and O'Reilly"
    }

    fn call(&self, input: &str) -> Result<String, ToolError> {
        serde_json::to_string(&Self::urls_for(input)).map_err(|e| ToolError::Format(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_for_combines_parts() {
        let urls = PartsSearchTool::urls_for("oil filter, air filter");
        assert_eq!(
            urls.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["amazon", "autozone", "oreilly"]
        );
        for url in urls.values() {
            assert!(url.contains("oil+filter+air+filter"), "{url}");
        }
        assert_eq!(urls["amazon"], "https://www.amazon.com/s?k=oil+filter+air+filter");
    }

    #[test]
    fn test_reserved_characters_are_encoded() {
        let urls = PartsSearchTool::urls_for("10mm socket & ratchet, 3/8\" extension");
        assert_eq!(
            urls["oreilly"],
            "https://www.oreillyauto.com/search?q=10mm+socket+%26+ratchet+3%2F8%22+extension"
        );
    }

    #[test]
    fn test_empty_entries_dropped() {
        assert_eq!(PartsSearchTool::search_query(" , brake pads,, ,rotors "), "brake pads rotors");
        let urls = PartsSearchTool::urls_for("");
        assert_eq!(urls["autozone"], "https://www.autozone.com/searchresult?searchText=");
    }

    #[test]
    fn test_call_returns_json() {
        let out = PartsSearchTool.call("wiper blades").unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed["amazon"].ends_with("wiper+blades"));
    }
}
