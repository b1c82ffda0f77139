//! Favorites table CRUD.
//!
//! One row per favorited URL. The payload carries the plaintext URL inside
//! the sealed blob so a bare favorite survives a full history purge with
//! nothing but this table.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::SealedRow;
use super::connection::StoreDb;
use crate::Error;

/// Plaintext shape of a sealed favorites row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritePayload {
    pub url: String,
    pub state: bool,
}

impl StoreDb {
    /// Insert or replace a sealed favorites row.
    pub async fn put_favorite(&self, row: SealedRow) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO favorites (url_digest, nonce, payload) VALUES (?1, ?2, ?3)
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

    /// Load every sealed favorites row. The favorites set is small enough
    /// that paging buys nothing here.
    pub async fn load_favorites(&self) -> Result<Vec<SealedRow>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<SealedRow>, Error> {
                let mut stmt = conn.prepare("SELECT url_digest, nonce, payload FROM favorites ORDER BY url_digest")?;
                let rows = stmt.query_map([], |row| {
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

    /// Delete a single favorites row.
    pub async fn delete_favorite(&self, digest: String) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM favorites WHERE url_digest = ?1", params![digest])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete favorites rows by digest in one transaction.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_favorites(&self, digests: Vec<String>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0usize;
                for digest in &digests {
                    deleted += tx.execute("DELETE FROM favorites WHERE url_digest = ?1", params![digest])?;
                }
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every favorites row.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_favorites(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM favorites", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(digest: &str) -> SealedRow {
        SealedRow { url_digest: digest.to_string(), nonce: vec![0u8; 12], payload: b"sealed".to_vec() }
    }

    #[tokio::test]
    async fn test_put_load_delete() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.put_favorite(row("aa")).await.unwrap();
        db.put_favorite(row("bb")).await.unwrap();
        assert_eq!(db.load_favorites().await.unwrap().len(), 2);

        db.delete_favorite("aa".to_string()).await.unwrap();
        let remaining = db.load_favorites().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url_digest, "bb");
    }

    #[tokio::test]
    async fn test_delete_many_and_clear() {
        let db = StoreDb::open_in_memory().await.unwrap();
        for digest in ["aa", "bb", "cc"] {
            db.put_favorite(row(digest)).await.unwrap();
        }

        let deleted = db
            .delete_favorites(vec!["aa".to_string(), "bb".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.clear_favorites().await.unwrap(), 1);
        assert!(db.load_favorites().await.unwrap().is_empty());
    }
}
