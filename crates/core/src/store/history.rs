//! History table CRUD.
//!
//! Rows are keyed by URL digest and carry a sealed JSON payload. Loading
//! is paged so the population task can checkpoint cancellation between
//! pages without the store holding anything open across the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::SealedRow;
use super::connection::StoreDb;
use crate::Error;
use crate::index::HistoryRecord;

/// Plaintext shape of a sealed history row.
///
/// The favorite flag is deliberately absent: it lives in the favorites
/// table, so purging one record kind never rewrites the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPayload {
    pub url: String,
    pub title: String,
    pub favicon: Option<Vec<u8>>,
    pub last_visited: Option<DateTime<Utc>>,
    pub visit_count: u64,
}

impl From<&HistoryRecord> for HistoryPayload {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            url: record.url.clone(),
            title: record.title.clone(),
            favicon: record.favicon.clone(),
            last_visited: record.last_visited,
            visit_count: record.visit_count,
        }
    }
}

impl HistoryPayload {
    /// Convert into an index record. The favorite flag is applied later
    /// from the favorites table.
    pub fn into_record(self) -> HistoryRecord {
        HistoryRecord {
            url: self.url,
            title: self.title,
            favicon: self.favicon,
            favorite: false,
            last_visited: self.last_visited,
            visit_count: self.visit_count,
        }
    }
}

impl StoreDb {
    /// Insert or replace a sealed history row.
    pub async fn put_history(&self, row: SealedRow) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO history (url_digest, nonce, payload) VALUES (?1, ?2, ?3)
                     ON CONFLICT(url_digest) DO UPDATE SET
                        nonce = excluded.nonce,
                        payload = excluded.payload",
                    params![row.url_digest, row.nonce, row.payload],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Load one page of sealed history rows in stable digest order.
    pub async fn load_history_page(&self, offset: u64, limit: u64) -> Result<Vec<SealedRow>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<SealedRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url_digest, nonce, payload FROM history
                     ORDER BY url_digest LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
                    Ok(SealedRow { url_digest: row.get(0)?, nonce: row.get(1)?, payload: row.get(2)? })
                })?;

                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete history rows by digest in one transaction.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_history(&self, digests: Vec<String>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0usize;
                for digest in &digests {
                    deleted += tx.execute("DELETE FROM history WHERE url_digest = ?1", params![digest])?;
                }
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every history row.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_history(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM history", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
