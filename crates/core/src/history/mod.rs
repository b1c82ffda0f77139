//! The history service.
//!
//! `History` owns the in-memory index behind a single reader/writer lock,
//! mirrors every mutation to the encrypted store before the call returns,
//! and runs two background tasks: one-shot population at construction and,
//! when a retention window is configured, a periodic expiry sweep. Both
//! tasks stop cooperatively via a shared cancellation flag.
//!
//! Reads never touch the store; they block only for the read-lock hold.
//! Teardown is `abort()` then `shutdown()`, which joins both task handles
//! before the caller releases the service.

mod tasks;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::crypto::{Cipher, KeyMaterial};
use crate::error::Error;
use crate::events::{EventBus, HistoryEvent};
use crate::favorites::FavoritesModel;
use crate::index::{FavoriteUpdate, HistoryIndex, HistoryRecord, PageVisit, PurgeClass};
use crate::store::{FavoritePayload, HistoryPayload, SealedRow, SessionRow, SessionTab, StoreDb};

/// Everything guarded by the one reader/writer lock: the index, the
/// materialized favorites view, and the previous session's tabs.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub index: HistoryIndex,
    pub favorites: FavoritesModel,
    pub session_tabs: Vec<SessionTab>,
}

/// Counts derived from the index under one read lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub records: usize,
    pub favorites: usize,
    pub session_tabs: usize,
}

struct TaskHandles {
    populate: Option<JoinHandle<()>>,
    expiry: Option<JoinHandle<()>>,
}

/// The browsing-history subsystem.
pub struct History {
    shared: Arc<RwLock<Shared>>,
    store: StoreDb,
    cipher: Cipher,
    events: EventBus,
    cancel_tx: watch::Sender<bool>,
    populated_rx: watch::Receiver<bool>,
    purge_gate: Arc<Mutex<()>>,
    handles: Mutex<TaskHandles>,
}

impl History {
    /// Open the store at the configured path and start population.
    ///
    /// Returns immediately; the index fills in the background. Use
    /// [`History::wait_populated`] or subscribe for the `Populated` event.
    pub async fn open(config: AppConfig, keys: &KeyMaterial) -> Result<Self, Error> {
        let store = StoreDb::open(&config.db_path).await?;
        Ok(Self::start(store, config, keys))
    }

    /// Open against an in-memory database. Nothing survives the process.
    pub async fn open_in_memory(config: AppConfig, keys: &KeyMaterial) -> Result<Self, Error> {
        let store = StoreDb::open_in_memory().await?;
        Ok(Self::start(store, config, keys))
    }

    fn start(store: StoreDb, config: AppConfig, keys: &KeyMaterial) -> Self {
        let cipher = Cipher::new(keys);
        let events = EventBus::new(config.event_capacity);
        let shared = Arc::new(RwLock::new(Shared::default()));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (populated_tx, populated_rx) = watch::channel(false);
        let purge_gate = Arc::new(Mutex::new(()));

        let populate = tokio::spawn(tasks::populate(tasks::PopulateCtx {
            shared: Arc::clone(&shared),
            store: store.clone(),
            cipher: cipher.clone(),
            events: events.clone(),
            cancel: cancel_rx.clone(),
            done: populated_tx,
            batch: config.populate_batch,
        }));

        let expiry = config.retention_days.map(|days| {
            tokio::spawn(tasks::expiry_loop(
                cancel_rx.clone(),
                config.purge_interval(),
                tasks::ExpiryCtx {
                    shared: Arc::clone(&shared),
                    store: store.clone(),
                    cipher: cipher.clone(),
                    events: events.clone(),
                    cancel: cancel_rx,
                    gate: Arc::clone(&purge_gate),
                    retention_days: days,
                    batch: config.purge_batch,
                },
            ))
        });

        Self {
            shared,
            store,
            cipher,
            events,
            cancel_tx,
            populated_rx,
            purge_gate,
            handles: Mutex::new(TaskHandles { populate: Some(populate), expiry }),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Snapshot copy of every record carrying visit data.
    pub async fn history(&self) -> HashMap<String, HistoryRecord> {
        self.shared.read().await.index.snapshot()
    }

    /// Up to `n` most recently visited records, most recent first.
    pub async fn last_n_actions(&self, n: usize) -> Vec<HistoryRecord> {
        self.shared.read().await.index.last_n(n)
    }

    /// The tab snapshot saved by the previous session.
    pub async fn previous_session_tabs(&self) -> Vec<SessionTab> {
        self.shared.read().await.session_tabs.clone()
    }

    /// The materialized favorites view.
    pub async fn favorites_model(&self) -> FavoritesModel {
        self.shared.read().await.favorites.clone()
    }

    /// Whether `url` is flagged as a favorite. Unknown URLs are not.
    pub async fn is_favorite(&self, url: &str) -> bool {
        self.shared.read().await.index.is_favorite(url)
    }

    /// Record counts for diagnostics.
    pub async fn stats(&self) -> HistoryStats {
        let shared = self.shared.read().await;
        HistoryStats {
            records: shared.index.len(),
            favorites: shared.index.favorite_count(),
            session_tabs: shared.session_tabs.len(),
        }
    }

    /// Subscribe to mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    /// Wait until the population task has finished (complete or not).
    pub async fn wait_populated(&self) {
        let mut rx = self.populated_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Record a visit, merging into an existing record unless `force`
    /// replaces its display metadata. Write-through to the store.
    pub async fn save_item(&self, icon: Option<Vec<u8>>, item: PageVisit, force: bool) -> Result<(), Error> {
        let (created, record) = {
            let mut shared = self.shared.write().await;
            let result = shared.index.upsert(icon.as_deref(), &item, force);
            // a favorite's title/icon feed the favorites view
            if result.1.favorite {
                shared.favorites = FavoritesModel::rebuild(&shared.index);
            }
            result
        };

        self.mirror_history(&record).await?;

        if created {
            self.events.emit(HistoryEvent::NewItem { record });
        } else {
            self.events.emit(HistoryEvent::ItemUpdated { record });
        }
        Ok(())
    }

    /// Attach a favicon to a known URL. Unknown URLs are a no-op.
    pub async fn save_favicon(&self, icon: Vec<u8>, url: &str) -> Result<(), Error> {
        let updated = {
            let mut shared = self.shared.write().await;
            let updated = shared.index.set_favicon(url, &icon);
            if updated.as_ref().is_some_and(|r| r.favorite) {
                shared.favorites = FavoritesModel::rebuild(&shared.index);
            }
            updated
        };

        let Some(record) = updated else {
            return Ok(());
        };
        self.mirror_history(&record).await?;
        self.events.emit(HistoryEvent::IconUpdated { url: url.to_string(), icon });
        Ok(())
    }

    /// Set or clear the favorite flag; flagging an unvisited URL creates a
    /// bare favorite record.
    pub async fn save_favorite(&self, url: &str, state: bool) -> Result<(), Error> {
        let update = {
            let mut shared = self.shared.write().await;
            let update = shared.index.set_favorite(url, state);
            if !matches!(update, FavoriteUpdate::Unchanged) {
                shared.favorites = FavoritesModel::rebuild(&shared.index);
            }
            update
        };

        match update {
            FavoriteUpdate::Unchanged => Ok(()),
            FavoriteUpdate::Created(record) => {
                self.mirror_favorite(url, true).await?;
                self.events.emit(HistoryEvent::NewItem { record });
                Ok(())
            }
            FavoriteUpdate::Updated(record) => {
                if state {
                    self.mirror_favorite(url, true).await?;
                } else {
                    self.store.delete_favorite(self.cipher.url_digest(url)).await?;
                }
                self.events.emit(HistoryEvent::ItemUpdated { record });
                Ok(())
            }
            FavoriteUpdate::Dropped(dropped) => {
                let digest = self.cipher.url_digest(url);
                self.store.delete_favorite(digest.clone()).await?;
                // a bare favorite may still own a favicon-only history row
                self.store.delete_history(vec![digest]).await?;
                self.events.emit(HistoryEvent::RemoveItems { urls: vec![dropped] });
                Ok(())
            }
        }
    }

    /// Clear the favorite flag. A no-op (and no event) for non-favorites.
    pub async fn remove_favorite(&self, url: &str) -> Result<(), Error> {
        self.save_favorite(url, false).await
    }

    /// Delete specific records from the index and the store.
    pub async fn remove_items_list(&self, urls: &[String]) -> Result<(), Error> {
        let removed = {
            let mut shared = self.shared.write().await;
            let removed = shared.index.remove(urls);
            if removed.iter().any(|r| r.favorite) {
                shared.favorites = FavoritesModel::rebuild(&shared.index);
            }
            removed
        };
        if removed.is_empty() {
            return Ok(());
        }

        let digests: Vec<String> = removed.iter().map(|r| self.cipher.url_digest(&r.url)).collect();
        self.store.delete_history(digests.clone()).await?;
        self.store.delete_favorites(digests).await?;

        self.events
            .emit(HistoryEvent::RemoveItems { urls: removed.into_iter().map(|r| r.url).collect() });
        Ok(())
    }

    /// Replace the session-tab snapshot wholesale.
    pub async fn save_session_tabs(&self, tabs: Vec<SessionTab>) -> Result<(), Error> {
        let rows = tabs
            .iter()
            .enumerate()
            .map(|(ordinal, tab)| {
                let (nonce, payload) = self.cipher.seal_json(tab)?;
                Ok(SessionRow { ordinal: ordinal as i64, nonce, payload })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.shared.write().await.session_tabs = tabs;
        self.store.replace_session_tabs(rows).await?;
        Ok(())
    }

    // ── Purges ──────────────────────────────────────────────────────────

    /// Drop every record, history and favorites alike.
    pub async fn purge_all(&self) -> Result<(), Error> {
        self.purge(PurgeClass::All).await
    }

    /// Clear favorite flags everywhere; bare favorites disappear.
    pub async fn purge_favorites(&self) -> Result<(), Error> {
        self.purge(PurgeClass::FavoritesOnly).await
    }

    /// Clear visit data everywhere; standalone favorites survive.
    pub async fn purge_history(&self) -> Result<(), Error> {
        self.purge(PurgeClass::HistoryOnly).await
    }

    /// Apply a purge: index first (immediately visible to readers), then
    /// the store mirror. The gate serializes concurrent purge requests.
    async fn purge(&self, class: PurgeClass) -> Result<(), Error> {
        let _gate = self.purge_gate.lock().await;

        let removed = {
            let mut shared = self.shared.write().await;
            let removed = shared.index.purge(class);
            shared.favorites = FavoritesModel::rebuild(&shared.index);
            removed
        };

        match class {
            PurgeClass::All => {
                self.store.clear_history().await?;
                self.store.clear_favorites().await?;
            }
            PurgeClass::FavoritesOnly => {
                self.store.clear_favorites().await?;
                if !removed.is_empty() {
                    let digests = removed.iter().map(|url| self.cipher.url_digest(url)).collect();
                    self.store.delete_history(digests).await?;
                }
            }
            PurgeClass::HistoryOnly => {
                self.store.clear_history().await?;
            }
        }

        tracing::info!(?class, removed = removed.len(), "purge applied");
        if !removed.is_empty() {
            self.events.emit(HistoryEvent::RemoveItems { urls: removed });
        }
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Signal both background tasks to stop at their next checkpoint.
    /// Non-blocking and idempotent.
    pub fn abort(&self) {
        let _ = self.cancel_tx.send_replace(true);
    }

    /// Abort and join both background tasks.
    ///
    /// Call before releasing the service; after this returns no task holds
    /// the index or the store connection.
    pub async fn shutdown(&self) {
        self.abort();
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.populate.take() {
            let _ = handle.await;
        }
        if let Some(handle) = handles.expiry.take() {
            let _ = handle.await;
        }
    }

    // ── Store mirroring ─────────────────────────────────────────────────

    async fn mirror_history(&self, record: &HistoryRecord) -> Result<(), Error> {
        let (nonce, payload) = self.cipher.seal_json(&HistoryPayload::from(record))?;
        self.store
            .put_history(SealedRow { url_digest: self.cipher.url_digest(&record.url), nonce, payload })
            .await
    }

    async fn mirror_favorite(&self, url: &str, state: bool) -> Result<(), Error> {
        let (nonce, payload) = self.cipher.seal_json(&FavoritePayload { url: url.to_string(), state })?;
        self.store
            .put_favorite(SealedRow { url_digest: self.cipher.url_digest(url), nonce, payload })
            .await
    }
}

impl Drop for History {
    fn drop(&mut self) {
        // Tasks hold only clones; signalling is enough here. Joining is
        // shutdown()'s job and cannot happen in a destructor.
        let _ = self.cancel_tx.send_replace(true);
    }
}
