//! Materialized favorites view.
//!
//! The UI queries favorites constantly, so the model is rebuilt once per
//! favorites-affecting mutation instead of being derived on every read.

use crate::index::HistoryIndex;

/// One entry in the favorites view.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteEntry {
    pub url: String,
    pub title: String,
    pub favicon: Option<Vec<u8>>,
}

/// Queryable favorites projection, sorted by title then URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoritesModel {
    pub entries: Vec<FavoriteEntry>,
}

impl FavoritesModel {
    /// Rebuild the view from the index.
    pub fn rebuild(index: &HistoryIndex) -> Self {
        let mut entries: Vec<FavoriteEntry> = index
            .favorites()
            .map(|r| FavoriteEntry { url: r.url.clone(), title: r.title.clone(), favicon: r.favicon.clone() })
            .collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.url.cmp(&b.url)));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PageVisit;
    use chrono::Utc;

    #[test]
    fn test_rebuild_sorts_by_title() {
        let mut index = HistoryIndex::new();
        for (url, title) in [("https://b.test", "Beta"), ("https://a.test", "Alpha")] {
            index.upsert(None, &PageVisit { url: url.to_string(), title: title.to_string(), visited_at: Utc::now() }, false);
            index.set_favorite(url, true);
        }

        let model = FavoritesModel::rebuild(&index);
        assert_eq!(model.len(), 2);
        assert_eq!(model.entries[0].title, "Alpha");
        assert_eq!(model.entries[1].title, "Beta");
    }

    #[test]
    fn test_rebuild_includes_bare_favorites() {
        let mut index = HistoryIndex::new();
        index.set_favorite("https://bare.test", true);
        let model = FavoritesModel::rebuild(&index);
        assert_eq!(model.len(), 1);
        assert_eq!(model.entries[0].url, "https://bare.test");
        assert!(model.entries[0].title.is_empty());
    }

    #[test]
    fn test_rebuild_on_empty_index() {
        let model = FavoritesModel::rebuild(&HistoryIndex::new());
        assert!(model.is_empty());
    }
}
