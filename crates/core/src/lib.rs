//! Browsing-history subsystem with an encrypted persistent store.
//!
//! This crate provides:
//! - An in-memory history index behind one reader/writer lock
//! - An encrypted SQLite store mirrored on every mutation
//! - Background population and age-based expiry with cooperative cancellation
//! - A materialized favorites view and a broadcast event channel

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod favorites;
pub mod history;
pub mod index;
pub mod store;

pub use config::AppConfig;
pub use crypto::{Cipher, KeyMaterial};
pub use error::Error;
pub use events::HistoryEvent;
pub use favorites::{FavoriteEntry, FavoritesModel};
pub use history::{History, HistoryStats};
pub use index::{HistoryRecord, PageVisit, PurgeClass};
pub use store::SessionTab;
