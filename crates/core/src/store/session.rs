//! Session-tab snapshot storage.
//!
//! The snapshot is replaced wholesale on every save; there is no
//! incremental merge. Ordinals preserve tab order across the round trip.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::StoreDb;
use crate::Error;

/// One open tab in the saved session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTab {
    pub url: String,
    pub pinned: bool,
}

/// A sealed session-tab row: position plus nonce and ciphertext.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub ordinal: i64,
    pub nonce: Vec<u8>,
    pub payload: Vec<u8>,
}

impl StoreDb {
    /// Replace the whole snapshot in one transaction.
    pub async fn replace_session_tabs(&self, rows: Vec<SessionRow>) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM session_tabs", [])?;
                for row in &rows {
                    tx.execute(
                        "INSERT INTO session_tabs (ordinal, nonce, payload) VALUES (?1, ?2, ?3)",
                        params![row.ordinal, row.nonce, row.payload],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Load the snapshot in saved order.
    pub async fn load_session_tabs(&self) -> Result<Vec<SessionRow>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<SessionRow>, Error> {
                let mut stmt = conn.prepare("SELECT ordinal, nonce, payload FROM session_tabs ORDER BY ordinal")?;
                let rows = stmt.query_map([], |row| {
                    Ok(SessionRow { ordinal: row.get(0)?, nonce: row.get(1)?, payload: row.get(2)? })
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ordinal: i64) -> SessionRow {
        SessionRow { ordinal, nonce: vec![0u8; 12], payload: format!("tab-{ordinal}").into_bytes() }
    }

    #[tokio::test]
    async fn test_replace_and_load_in_order() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.replace_session_tabs(vec![row(1), row(0), row(2)]).await.unwrap();

        let loaded = db.load_session_tabs().await.unwrap();
        let ordinals: Vec<i64> = loaded.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.replace_session_tabs(vec![row(0), row(1), row(2)]).await.unwrap();
        db.replace_session_tabs(vec![row(0)]).await.unwrap();
        assert_eq!(db.load_session_tabs().await.unwrap().len(), 1);

        db.replace_session_tabs(Vec::new()).await.unwrap();
        assert!(db.load_session_tabs().await.unwrap().is_empty());
    }
}
