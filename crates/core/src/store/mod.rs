//! Encrypted SQLite store for history, favorites, and session tabs.
//!
//! This module is the persistence boundary of the subsystem, using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Sealed (AES-GCM) row payloads located by keyed URL digest
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Paged history loading so population can checkpoint between pages
//!
//! Rows cross this boundary already sealed; the store never sees key
//! material or plaintext.

pub mod connection;
pub mod favorites;
pub mod history;
pub mod migrations;
pub mod session;

pub use crate::Error;

pub use connection::StoreDb;
pub use favorites::FavoritePayload;
pub use history::HistoryPayload;
pub use session::{SessionRow, SessionTab};

/// An encrypted row as it sits on disk: lookup digest, nonce, ciphertext.
#[derive(Debug, Clone)]
pub struct SealedRow {
    pub url_digest: String,
    pub nonce: Vec<u8>,
    pub payload: Vec<u8>,
}
