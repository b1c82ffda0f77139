//! In-memory history index.
//!
//! Owns one record per URL plus a time-ordered view for recency queries and
//! age-based expiry. The index itself is single-threaded; `History` wraps it
//! in a reader/writer lock and keeps every lock hold free of I/O.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

/// One browsing-history record, keyed by its URL.
///
/// A record with `visit_count == 0` and no timestamp is a bare favorite:
/// it exists only to carry the favorite flag and is excluded from the
/// history view.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub url: String,
    pub title: String,
    pub favicon: Option<Vec<u8>>,
    pub favorite: bool,
    pub last_visited: Option<DateTime<Utc>>,
    pub visit_count: u64,
}

impl HistoryRecord {
    /// Whether the record carries visit data (as opposed to being a bare
    /// favorite created by `set_favorite` on an unvisited URL).
    pub fn has_history(&self) -> bool {
        self.visit_count > 0 || self.last_visited.is_some()
    }
}

/// A page visit as reported by the navigation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PageVisit {
    pub url: String,
    pub title: String,
    pub visited_at: DateTime<Utc>,
}

/// Scope of a bulk deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeClass {
    /// Drop every record, history and favorites alike.
    All,
    /// Clear favorite flags; bare favorite-only records are dropped.
    FavoritesOnly,
    /// Clear visit data; standalone favorite entries survive as bare records.
    HistoryOnly,
}

/// Outcome of a favorite-flag mutation, used to pick the store mirror
/// operation and the emitted event.
#[derive(Debug, Clone, PartialEq)]
pub enum FavoriteUpdate {
    /// The flag already had the requested state; nothing happened.
    Unchanged,
    /// A bare favorite record was created for an unvisited URL.
    Created(HistoryRecord),
    /// The flag changed on a record that remains in the index.
    Updated(HistoryRecord),
    /// Unfavoriting removed a bare favorite-only record entirely.
    Dropped(String),
}

/// URL-keyed record map plus a lockstep time index.
///
/// The time index maps `(last_visited, insertion sequence)` to the URL, so
/// "most recent n" and expiry scans never walk the whole record map. Every
/// mutation keeps both sides consistent.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    records: HashMap<String, HistoryRecord>,
    by_time: BTreeMap<(DateTime<Utc>, u64), String>,
    time_key: HashMap<String, (DateTime<Utc>, u64)>,
    seq: u64,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn favorite_count(&self) -> usize {
        self.records.values().filter(|r| r.favorite).count()
    }

    pub fn get(&self, url: &str) -> Option<&HistoryRecord> {
        self.records.get(url)
    }

    pub fn is_favorite(&self, url: &str) -> bool {
        self.records.get(url).is_some_and(|r| r.favorite)
    }

    /// Snapshot copy of all records carrying visit data.
    ///
    /// Bare favorite-only records are not part of the history view.
    pub fn snapshot(&self) -> HashMap<String, HistoryRecord> {
        self.records
            .iter()
            .filter(|(_, r)| r.has_history())
            .map(|(url, r)| (url.clone(), r.clone()))
            .collect()
    }

    /// Up to `n` most recently visited records, strictly descending by
    /// last-visited time; ties broken by most recent insertion.
    pub fn last_n(&self, n: usize) -> Vec<HistoryRecord> {
        self.by_time
            .iter()
            .rev()
            .take(n)
            .filter_map(|(_, url)| self.records.get(url).cloned())
            .collect()
    }

    /// Records currently flagged as favorites.
    pub fn favorites(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values().filter(|r| r.favorite)
    }

    /// Insert or merge a visit.
    ///
    /// Absent URL: insert with `visit_count` 1. Present and `force` false:
    /// bump the count, move the timestamp, and take title/favicon only when
    /// the supplied values are non-empty. Present and `force` true: replace
    /// title and favicon wholesale while preserving the favorite flag, the
    /// visit count, and the last-visited timestamp.
    ///
    /// Returns whether a record was created, plus a copy of its new state.
    pub fn upsert(&mut self, icon: Option<&[u8]>, visit: &PageVisit, force: bool) -> (bool, HistoryRecord) {
        let (created, record, touched) = match self.records.entry(visit.url.clone()) {
            Entry::Vacant(slot) => {
                let record = HistoryRecord {
                    url: visit.url.clone(),
                    title: visit.title.clone(),
                    favicon: icon.filter(|i| !i.is_empty()).map(<[u8]>::to_vec),
                    favorite: false,
                    last_visited: Some(visit.visited_at),
                    visit_count: 1,
                };
                slot.insert(record.clone());
                (true, record, Some(visit.visited_at))
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if force {
                    record.title = visit.title.clone();
                    record.favicon = icon.filter(|i| !i.is_empty()).map(<[u8]>::to_vec);
                    (false, record.clone(), None)
                } else {
                    record.visit_count += 1;
                    record.last_visited = Some(visit.visited_at);
                    if !visit.title.is_empty() {
                        record.title = visit.title.clone();
                    }
                    if let Some(i) = icon {
                        if !i.is_empty() {
                            record.favicon = Some(i.to_vec());
                        }
                    }
                    (false, record.clone(), Some(visit.visited_at))
                }
            }
        };

        if let Some(ts) = touched {
            self.touch(&visit.url, ts);
        }
        (created, record)
    }

    /// Update the favicon of a known URL. Unknown URLs are a no-op.
    pub fn set_favicon(&mut self, url: &str, icon: &[u8]) -> Option<HistoryRecord> {
        let record = self.records.get_mut(url)?;
        record.favicon = Some(icon.to_vec());
        Some(record.clone())
    }

    /// Set or clear the favorite flag.
    ///
    /// Flagging an unknown URL creates a bare favorite record; unflagging a
    /// record with no visit data removes it entirely.
    pub fn set_favorite(&mut self, url: &str, state: bool) -> FavoriteUpdate {
        match self.records.get_mut(url) {
            Some(record) => {
                if record.favorite == state {
                    return FavoriteUpdate::Unchanged;
                }
                record.favorite = state;
                let drop_bare = !state && !record.has_history();
                let snapshot = record.clone();
                if drop_bare {
                    self.records.remove(url);
                    FavoriteUpdate::Dropped(url.to_string())
                } else {
                    FavoriteUpdate::Updated(snapshot)
                }
            }
            None => {
                if !state {
                    return FavoriteUpdate::Unchanged;
                }
                let record = HistoryRecord {
                    url: url.to_string(),
                    title: String::new(),
                    favicon: None,
                    favorite: true,
                    last_visited: None,
                    visit_count: 0,
                };
                self.records.insert(url.to_string(), record.clone());
                FavoriteUpdate::Created(record)
            }
        }
    }

    /// Apply a record loaded from the store.
    ///
    /// Loaded rows are applied verbatim; a favorite flag set by a foreground
    /// call racing the load is preserved. Last writer under the lock wins
    /// for everything else.
    pub fn restore(&mut self, mut record: HistoryRecord) {
        if let Some(existing) = self.records.get(&record.url) {
            record.favorite = record.favorite || existing.favorite;
        }
        match record.last_visited {
            Some(ts) => self.touch(&record.url, ts),
            None => self.untrack(&record.url),
        }
        self.records.insert(record.url.clone(), record);
    }

    /// Delete the given URLs. Returns the records actually removed.
    pub fn remove(&mut self, urls: &[String]) -> Vec<HistoryRecord> {
        let mut removed = Vec::new();
        for url in urls {
            if let Some(record) = self.records.remove(url) {
                self.untrack(url);
                removed.push(record);
            }
        }
        removed
    }

    /// Bulk-delete by class. Returns the URLs removed from the index
    /// entirely (flag-only clears are not listed).
    pub fn purge(&mut self, class: PurgeClass) -> Vec<String> {
        match class {
            PurgeClass::All => {
                let urls: Vec<String> = self.records.keys().cloned().collect();
                self.records.clear();
                self.by_time.clear();
                self.time_key.clear();
                urls
            }
            PurgeClass::FavoritesOnly => {
                let mut dropped = Vec::new();
                self.records.retain(|url, record| {
                    if !record.favorite {
                        return true;
                    }
                    record.favorite = false;
                    if record.has_history() {
                        true
                    } else {
                        dropped.push(url.clone());
                        false
                    }
                });
                // bare records never had time entries
                dropped
            }
            PurgeClass::HistoryOnly => {
                let mut removed = Vec::new();
                self.records.retain(|url, record| {
                    if record.favorite {
                        record.title.clear();
                        record.favicon = None;
                        record.last_visited = None;
                        record.visit_count = 0;
                        true
                    } else {
                        removed.push(url.clone());
                        false
                    }
                });
                self.by_time.clear();
                self.time_key.clear();
                removed
            }
        }
    }

    /// Remove up to `limit` non-favorite records last visited before
    /// `cutoff`. Favorites are never expired.
    pub fn purge_expired(&mut self, cutoff: DateTime<Utc>, limit: usize) -> Vec<String> {
        let mut expired = Vec::new();
        for url in self.by_time.range(..(cutoff, 0u64)).map(|(_, url)| url) {
            if expired.len() == limit {
                break;
            }
            if self.records.get(url).is_some_and(|r| !r.favorite) {
                expired.push(url.clone());
            }
        }
        for url in &expired {
            self.records.remove(url);
            self.untrack(url);
        }
        expired
    }

    fn touch(&mut self, url: &str, ts: DateTime<Utc>) {
        if let Some(key) = self.time_key.remove(url) {
            self.by_time.remove(&key);
        }
        self.seq += 1;
        let key = (ts, self.seq);
        self.by_time.insert(key, url.to_string());
        self.time_key.insert(url.to_string(), key);
    }

    fn untrack(&mut self, url: &str) {
        if let Some(key) = self.time_key.remove(url) {
            self.by_time.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn visit(url: &str, title: &str, at: DateTime<Utc>) -> PageVisit {
        PageVisit { url: url.to_string(), title: title.to_string(), visited_at: at }
    }

    #[test]
    fn test_insert_starts_at_one_visit() {
        let mut index = HistoryIndex::new();
        let (created, record) = index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        assert!(created);
        assert_eq!(record.visit_count, 1);
        assert!(!record.favorite);
    }

    #[test]
    fn test_merge_bumps_count_and_timestamp() {
        let mut index = HistoryIndex::new();
        let first = Utc::now();
        let second = first + Duration::seconds(10);
        index.upsert(None, &visit("https://a.test", "A", first), false);
        let (created, record) = index.upsert(None, &visit("https://a.test", "A", second), false);
        assert!(!created);
        assert_eq!(record.visit_count, 2);
        assert_eq!(record.last_visited, Some(second));
    }

    #[test]
    fn test_merge_keeps_title_and_icon_when_empty() {
        let mut index = HistoryIndex::new();
        let now = Utc::now();
        index.upsert(Some(b"icon".as_slice()), &visit("https://a.test", "A", now), false);
        let (_, record) =
            index.upsert(Some(b"".as_slice()), &visit("https://a.test", "", now + Duration::seconds(1)), false);
        assert_eq!(record.title, "A");
        assert_eq!(record.favicon.as_deref(), Some(b"icon".as_slice()));
    }

    #[test]
    fn test_force_replaces_metadata_only() {
        let mut index = HistoryIndex::new();
        let first = Utc::now();
        index.upsert(Some(b"icon".as_slice()), &visit("https://a.test", "A", first), false);
        index.set_favorite("https://a.test", true);

        let (_, record) = index.upsert(None, &visit("https://a.test", "New title", first + Duration::hours(1)), true);
        assert_eq!(record.title, "New title");
        assert_eq!(record.favicon, None);
        assert_eq!(record.visit_count, 1);
        assert_eq!(record.last_visited, Some(first));
        assert!(record.favorite);
    }

    #[test]
    fn test_last_n_descending_with_tie_break() {
        let mut index = HistoryIndex::new();
        let base = Utc::now();
        index.upsert(None, &visit("https://one.test", "1", base), false);
        index.upsert(None, &visit("https://two.test", "2", base + Duration::seconds(5)), false);
        // same timestamp as two.test: most recent insertion wins the tie
        index.upsert(None, &visit("https://three.test", "3", base + Duration::seconds(5)), false);

        let recent = index.last_n(10);
        let urls: Vec<&str> = recent.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://three.test", "https://two.test", "https://one.test"]);
    }

    #[test]
    fn test_last_n_zero_is_empty() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        assert!(index.last_n(0).is_empty());
    }

    #[test]
    fn test_last_n_caps_at_available() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        assert_eq!(index.last_n(5).len(), 1);
    }

    #[test]
    fn test_revisit_moves_time_slot() {
        let mut index = HistoryIndex::new();
        let base = Utc::now();
        index.upsert(None, &visit("https://a.test", "A", base), false);
        index.upsert(None, &visit("https://b.test", "B", base + Duration::seconds(1)), false);
        index.upsert(None, &visit("https://a.test", "A", base + Duration::seconds(2)), false);

        let recent = index.last_n(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://a.test");
    }

    #[test]
    fn test_bare_favorite_lifecycle() {
        let mut index = HistoryIndex::new();
        let update = index.set_favorite("https://a.test", true);
        assert!(matches!(update, FavoriteUpdate::Created(_)));
        assert!(index.is_favorite("https://a.test"));
        assert!(index.snapshot().is_empty());

        let update = index.set_favorite("https://a.test", false);
        assert!(matches!(update, FavoriteUpdate::Dropped(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_set_favorite_is_idempotent() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        assert!(matches!(index.set_favorite("https://a.test", true), FavoriteUpdate::Updated(_)));
        assert!(matches!(index.set_favorite("https://a.test", true), FavoriteUpdate::Unchanged));
        assert!(matches!(index.set_favorite("https://missing.test", false), FavoriteUpdate::Unchanged));
    }

    #[test]
    fn test_unfavorite_keeps_visited_record() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        index.set_favorite("https://a.test", true);
        let update = index.set_favorite("https://a.test", false);
        assert!(matches!(update, FavoriteUpdate::Updated(_)));
        assert_eq!(index.snapshot().len(), 1);
    }

    #[test]
    fn test_remove_returns_only_known() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        let removed = index.remove(&["https://a.test".to_string(), "https://missing.test".to_string()]);
        assert_eq!(removed.len(), 1);
        assert!(index.is_empty());
        assert!(index.last_n(10).is_empty());
    }

    #[test]
    fn test_purge_all_clears_everything() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        index.set_favorite("https://b.test", true);
        let removed = index.purge(PurgeClass::All);
        assert_eq!(removed.len(), 2);
        assert!(index.is_empty());
        assert_eq!(index.favorite_count(), 0);
    }

    #[test]
    fn test_purge_favorites_keeps_history_fields() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        index.set_favorite("https://a.test", true);
        index.set_favorite("https://bare.test", true);

        let removed = index.purge(PurgeClass::FavoritesOnly);
        assert_eq!(removed, vec!["https://bare.test".to_string()]);
        assert!(!index.is_favorite("https://a.test"));
        let snapshot = index.snapshot();
        assert_eq!(snapshot["https://a.test"].title, "A");
        assert_eq!(snapshot["https://a.test"].visit_count, 1);
    }

    #[test]
    fn test_purge_history_preserves_standalone_favorites() {
        let mut index = HistoryIndex::new();
        index.upsert(None, &visit("https://a.test", "A", Utc::now()), false);
        index.upsert(None, &visit("https://b.test", "B", Utc::now()), false);
        index.set_favorite("https://a.test", true);

        let removed = index.purge(PurgeClass::HistoryOnly);
        assert_eq!(removed, vec!["https://b.test".to_string()]);
        assert!(index.snapshot().is_empty());
        assert!(index.is_favorite("https://a.test"));
        assert!(index.last_n(10).is_empty());
        let bare = index.get("https://a.test").unwrap();
        assert_eq!(bare.visit_count, 0);
        assert!(bare.title.is_empty());
        assert!(bare.favicon.is_none());
    }

    #[test]
    fn test_purge_expired_skips_favorites() {
        let mut index = HistoryIndex::new();
        let old = Utc::now() - Duration::days(30);
        index.upsert(None, &visit("https://old.test", "old", old), false);
        index.upsert(None, &visit("https://kept.test", "kept", old), false);
        index.set_favorite("https://kept.test", true);
        index.upsert(None, &visit("https://fresh.test", "fresh", Utc::now()), false);

        let cutoff = Utc::now() - Duration::days(7);
        let expired = index.purge_expired(cutoff, 100);
        assert_eq!(expired, vec!["https://old.test".to_string()]);
        assert!(index.get("https://kept.test").is_some());
        assert!(index.get("https://fresh.test").is_some());
    }

    #[test]
    fn test_purge_expired_respects_limit() {
        let mut index = HistoryIndex::new();
        let old = Utc::now() - Duration::days(30);
        for i in 0..10 {
            index.upsert(None, &visit(&format!("https://{i}.test"), "t", old + Duration::seconds(i)), false);
        }
        let cutoff = Utc::now() - Duration::days(7);
        assert_eq!(index.purge_expired(cutoff, 4).len(), 4);
        assert_eq!(index.purge_expired(cutoff, 100).len(), 6);
    }

    #[test]
    fn test_restore_preserves_foreground_favorite() {
        let mut index = HistoryIndex::new();
        index.set_favorite("https://a.test", true);
        index.restore(HistoryRecord {
            url: "https://a.test".to_string(),
            title: "A".to_string(),
            favicon: None,
            favorite: false,
            last_visited: Some(Utc::now()),
            visit_count: 7,
        });
        let record = index.get("https://a.test").unwrap();
        assert!(record.favorite);
        assert_eq!(record.visit_count, 7);
    }

    #[test]
    fn test_set_favicon_unknown_url_is_noop() {
        let mut index = HistoryIndex::new();
        assert!(index.set_favicon("https://missing.test", b"icon").is_none());
        assert!(index.is_empty());
    }
}
