//! Background population and expiry passes.
//!
//! Both tasks decrypt and stage work off-lock, take the write lock only to
//! apply already-computed values, and poll the cancellation flag at batch
//! boundaries. Cancellation mid-pass leaves the index partially
//! populated/purged, which is an accepted terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, watch};

use super::Shared;
use crate::Error;
use crate::crypto::Cipher;
use crate::events::{EventBus, HistoryEvent};
use crate::favorites::FavoritesModel;
use crate::store::{FavoritePayload, HistoryPayload, SessionTab, StoreDb};

pub(super) struct PopulateCtx {
    pub shared: Arc<RwLock<Shared>>,
    pub store: StoreDb,
    pub cipher: Cipher,
    pub events: EventBus,
    pub cancel: watch::Receiver<bool>,
    pub done: watch::Sender<bool>,
    pub batch: usize,
}

/// Load the whole store into the index, then announce completion.
///
/// Runs once per service lifetime. Always fires the `done` latch and a
/// `Populated` event, with `complete == false` after cancellation or a
/// store failure.
pub(super) async fn populate(ctx: PopulateCtx) {
    let complete = match populate_pass(&ctx).await {
        Ok(complete) => complete,
        Err(e) => {
            tracing::warn!(error = %e, "population stopped on store failure");
            false
        }
    };
    ctx.events.emit(HistoryEvent::Populated { complete });
    let _ = ctx.done.send(true);
    tracing::info!(complete, "history population finished");
}

async fn populate_pass(ctx: &PopulateCtx) -> Result<bool, Error> {
    let mut offset = 0u64;
    let mut skipped = 0usize;

    loop {
        if *ctx.cancel.borrow() {
            return Ok(false);
        }
        let rows = ctx.store.load_history_page(offset, ctx.batch as u64).await?;
        if rows.is_empty() {
            break;
        }
        offset += rows.len() as u64;

        // Decrypt off-lock; unreadable rows are dropped, loading continues.
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match ctx.cipher.open_json::<HistoryPayload>(&row.nonce, &row.payload) {
                Ok(payload) => records.push(payload.into_record()),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(digest = %row.url_digest, error = %e, "skipping unreadable history row");
                }
            }
        }

        let mut shared = ctx.shared.write().await;
        for record in records {
            shared.index.restore(record);
        }
    }

    if *ctx.cancel.borrow() {
        return Ok(false);
    }
    let mut flags = Vec::new();
    for row in ctx.store.load_favorites().await? {
        match ctx.cipher.open_json::<FavoritePayload>(&row.nonce, &row.payload) {
            Ok(payload) => flags.push(payload),
            Err(e) => {
                skipped += 1;
                tracing::warn!(digest = %row.url_digest, error = %e, "skipping unreadable favorites row");
            }
        }
    }
    let favorites = {
        let mut shared = ctx.shared.write().await;
        for flag in flags {
            if flag.state {
                shared.index.set_favorite(&flag.url, true);
            }
        }
        shared.favorites = FavoritesModel::rebuild(&shared.index);
        shared.favorites.clone()
    };

    if *ctx.cancel.borrow() {
        return Ok(false);
    }
    let mut tabs = Vec::new();
    for row in ctx.store.load_session_tabs().await? {
        match ctx.cipher.open_json::<SessionTab>(&row.nonce, &row.payload) {
            Ok(tab) => tabs.push(tab),
            Err(e) => {
                skipped += 1;
                tracing::warn!(ordinal = row.ordinal, error = %e, "skipping unreadable session tab");
            }
        }
    }
    ctx.shared.write().await.session_tabs = tabs;

    if skipped > 0 {
        tracing::warn!(skipped, "dropped unreadable rows during population");
    }
    ctx.events.emit(HistoryEvent::PopulatedFavorites { favorites: favorites.entries });
    Ok(true)
}

pub(super) struct ExpiryCtx {
    pub shared: Arc<RwLock<Shared>>,
    pub store: StoreDb,
    pub cipher: Cipher,
    pub events: EventBus,
    pub cancel: watch::Receiver<bool>,
    pub gate: Arc<Mutex<()>>,
    pub retention_days: i64,
    pub batch: usize,
}

/// Periodic age-based expiry. Only spawned when a retention window is
/// configured.
pub(super) async fn expiry_loop(mut cancel: watch::Receiver<bool>, period: Duration, ctx: ExpiryCtx) {
    let mut interval = tokio::time::interval(period);
    // consume the immediate first tick; the first pass runs one period in
    interval.tick().await;

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if let Err(e) = expiry_pass(&ctx).await {
                    tracing::warn!(error = %e, "expiry pass stopped; retrying on next tick");
                }
            }
        }
    }
}

/// One bounded-batch expiry sweep.
///
/// Each batch: write lock to drop expired records, then the matching store
/// delete, then one event; cancellation is polled between batches.
pub(super) async fn expiry_pass(ctx: &ExpiryCtx) -> Result<u64, Error> {
    let _gate = ctx.gate.lock().await;
    let cutoff = Utc::now() - chrono::Duration::days(ctx.retention_days);
    let mut total = 0u64;

    loop {
        if *ctx.cancel.borrow() {
            break;
        }
        let expired = {
            let mut shared = ctx.shared.write().await;
            shared.index.purge_expired(cutoff, ctx.batch)
        };
        if expired.is_empty() {
            break;
        }

        let digests: Vec<String> = expired.iter().map(|url| ctx.cipher.url_digest(url)).collect();
        ctx.store.delete_history(digests).await?;
        total += expired.len() as u64;
        ctx.events.emit(HistoryEvent::RemoveItems { urls: expired });
    }

    if total > 0 {
        tracing::info!(removed = total, "expired aged history records");
    }
    Ok(total)
}
