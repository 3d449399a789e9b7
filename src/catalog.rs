//! The read-only book catalog recommendations are drawn from.
//!
//! The catalog is a JSON array of records:
//!
//! ```json
//! [{"title": "Moby-Dick", "authors": "Herman Melville",
//!   "description": "A whaling voyage...", "category": "Fiction"}]
//! ```
//!
//! Titles are the key. Later records with a title already seen are dropped.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One catalog book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Title, unique within the catalog.
    pub title: String,
    /// Author names as a display string.
    #[serde(default)]
    pub authors: String,
    /// Blurb compared against reader preferences.
    #[serde(default)]
    pub description: String,
    /// Category labels, matched by substring.
    #[serde(default)]
    pub category: String,
}

/// Books in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog, dropping duplicate titles.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for entry in entries {
            if entry.title.trim().is_empty() {
                return Err(Error::Validation("catalog entry without a title".into()));
            }
            if seen.insert(entry.title.clone()) {
                kept.push(entry);
            } else {
                tracing::warn!(title = %entry.title, "duplicate catalog title dropped");
            }
        }
        Ok(Self { entries: kept })
    }

    /// Parse a JSON array of entries.
    pub fn from_json_reader(reader: impl Read) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_reader(reader)
            .map_err(|e| Error::Validation(format!("catalog: {e}")))?;
        Self::from_entries(entries)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("catalog {}", path.display())),
            _ => Error::Storage(format!("{}: {e}", path.display())),
        })?;
        let catalog = Self::from_json_reader(BufReader::new(file))?;
        tracing::info!(path = %path.display(), books = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    /// Entries in catalog order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Look up a book by title.
    pub fn get(&self, title: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.title == title)
    }

    /// Number of books.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no books.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let json = r#"[
            {"title": "A", "authors": "X", "description": "d", "category": "Fiction"},
            {"title": "B", "category": "Science"}
        ]"#;
        let catalog = Catalog::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("B").unwrap().authors, "");
    }

    #[test]
    fn test_duplicate_titles_keep_first() {
        let entry = |title: &str, category: &str| CatalogEntry {
            title: title.into(),
            authors: String::new(),
            description: String::new(),
            category: category.into(),
        };
        let catalog =
            Catalog::from_entries([entry("A", "one"), entry("A", "two"), entry("B", "x")]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("A").unwrap().category, "one");
    }

    #[test]
    fn test_malformed_json_is_validation_error() {
        let err = Catalog::from_json_reader("{".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::load(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
