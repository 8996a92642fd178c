//! SQLite back-end
//!
//! A single table holds every engine's chunks and directories:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sorted_array_chunks (
//!     key   TEXT PRIMARY KEY,
//!     chunk BLOB NOT NULL
//! );
//! ```
//!
//! Each store instance is scoped to a `key`: chunk blobs live under
//! `"<key>_<id>"`, the directory blob under `"<key>"`. Every operation
//! runs inside one transaction. Retrying on SQLITE_BUSY when another
//! writer holds the database is the caller's concern.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::meta::Meta;

use super::ChunkStorage;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS sorted_array_chunks (
    key   TEXT PRIMARY KEY,
    chunk BLOB NOT NULL
)";

const UPSERT_SQL: &str = "INSERT INTO sorted_array_chunks (key, chunk) VALUES (?1, ?2)
    ON CONFLICT(key) DO UPDATE SET chunk = excluded.chunk";

/// Back-end persisting serialized blobs in a SQLite table
pub struct SqliteChunkStorage {
    conn: Mutex<Connection>,
    key: String,
}

impl SqliteChunkStorage {
    /// Open (or create) a database file, scoped to `key`
    pub fn open<P: AsRef<Path>>(path: P, key: &str) -> Result<Self> {
        Self::init(Connection::open(path)?, key)
    }

    /// Open a private in-memory database, scoped to `key`
    pub fn open_in_memory(key: &str) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, key)
    }

    fn init(conn: Connection, key: &str) -> Result<Self> {
        conn.execute(CREATE_TABLE_SQL, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: key.to_string(),
        })
    }

    /// Composite key for one chunk blob
    fn chunk_key(&self, id: u32) -> String {
        format!("{}_{}", self.key, id)
    }
}

impl ChunkStorage for SqliteChunkStorage {
    fn read(&self, ids: &[u32]) -> Result<HashMap<u32, Option<Chunk>>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut out = HashMap::with_capacity(ids.len());
        {
            let mut stmt =
                tx.prepare("SELECT chunk FROM sorted_array_chunks WHERE key = ?1")?;
            for &id in ids {
                let blob: Option<Vec<u8>> = stmt
                    .query_row(params![self.chunk_key(id)], |row| row.get(0))
                    .optional()?;
                let chunk = match blob {
                    Some(bytes) => Some(Chunk::deserialize(&bytes)?),
                    None => None,
                };
                out.insert(id, chunk);
            }
        }

        tx.commit()?;
        Ok(out)
    }

    fn save(&self, chunks: HashMap<u32, Chunk>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for (id, chunk) in &chunks {
                stmt.execute(params![self.chunk_key(*id), chunk.serialize()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, ids: &[u32]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM sorted_array_chunks WHERE key = ?1")?;
            for &id in ids {
                stmt.execute(params![self.chunk_key(id)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_meta(&self) -> Result<Meta> {
        let conn = self.conn.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT chunk FROM sorted_array_chunks WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => Meta::deserialize(&bytes),
            None => Ok(Meta::new()),
        }
    }

    fn save_meta(&self, meta: &Meta) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(UPSERT_SQL, params![self.key, meta.serialize()])?;
        Ok(())
    }
}
