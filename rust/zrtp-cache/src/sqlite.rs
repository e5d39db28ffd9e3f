/*
 * Copyright 2006 - 2018, Werner Dittmann
 * Copyright 2026 - Francisco F. Pinochet
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *         http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::{generate_zid, CacheEntry, RetainedSecret, Zid, ZidCache};
use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};

/// A persistent implementation of the [`ZidCache`] trait using SQLite.
///
/// Secrets are rows of `zrtp_cache` named `rs1`, `rs2` and `pbx`. Multi-row
/// updates run in a transaction.
///
/// All peers share one connection, so cache I/O for handshakes with
/// different peers is serialized. [`InMemoryCache`](crate::InMemoryCache)
/// locks per peer pair instead.
pub struct SqliteCache {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteCache {
    /// Opens (or creates) a SQLite cache at the given path.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Self::init(conn)
    }

    /// A cache that lives only as long as this value.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS zrtp_identity (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                zid BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS zrtp_cache (
                local_zid BLOB NOT NULL,
                peer_zid BLOB NOT NULL,
                name TEXT NOT NULL,
                value BLOB NOT NULL,
                last_used_at INTEGER NOT NULL,
                ttl INTEGER NOT NULL,
                PRIMARY KEY (local_zid, peer_zid, name)
            );
            CREATE TABLE IF NOT EXISTS zrtp_peer (
                local_zid BLOB NOT NULL,
                peer_zid BLOB NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (local_zid, peer_zid)
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl ZidCache for SqliteCache {
    fn load_or_create_zid(&self) -> Result<Zid> {
        let conn = self.conn.lock();
        let stored: Option<Vec<u8>> = conn
            .query_row("SELECT zid FROM zrtp_identity WHERE id = 0", [], |row| row.get(0))
            .optional()?;
        if let Some(bytes) = stored {
            let zid: Zid = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("stored ZID has {} bytes", bytes.len()))?;
            return Ok(zid);
        }
        let zid = generate_zid();
        conn.execute("INSERT INTO zrtp_identity (id, zid) VALUES (0, ?1)", params![zid.as_slice()])?;
        log::info!("created local ZID {:02x?}", zid);
        Ok(zid)
    }

    fn entry(&self, local: &Zid, peer: &Zid) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let mut entry = CacheEntry::default();
        let mut found = false;

        let mut stmt = conn.prepare(
            "SELECT name, value, last_used_at, ttl FROM zrtp_cache WHERE local_zid = ?1 AND peer_zid = ?2",
        )?;
        let rows = stmt.query_map(params![local.as_slice(), peer.as_slice()], |row| {
            let name: String = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            let last_used_at: i64 = row.get(2)?;
            let ttl: i64 = row.get(3)?;
            Ok((name, value, last_used_at, ttl))
        })?;
        for row in rows {
            let (name, value, last_used_at, ttl) = row?;
            found = true;
            let secret = RetainedSecret {
                value,
                last_used_at: last_used_at.max(0) as u64,
                ttl: ttl.clamp(0, u32::MAX as i64) as u32,
            };
            match name.as_str() {
                "rs1" => entry.rs1 = Some(secret),
                "rs2" => entry.rs2 = Some(secret),
                "pbx" => entry.pbx = Some(secret.value),
                other => log::warn!("ignoring unknown cache row {}", other),
            }
        }

        let verified: Option<bool> = conn
            .query_row(
                "SELECT verified FROM zrtp_peer WHERE local_zid = ?1 AND peer_zid = ?2",
                params![local.as_slice(), peer.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(verified) = verified {
            found = true;
            entry.verified = verified;
        }

        Ok(found.then_some(entry))
    }

    fn rotate(&self, local: &Zid, peer: &Zid, rs1: RetainedSecret) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM zrtp_cache WHERE local_zid = ?1 AND peer_zid = ?2 AND name = 'rs2'",
            params![local.as_slice(), peer.as_slice()],
        )?;
        tx.execute(
            "UPDATE zrtp_cache SET name = 'rs2' WHERE local_zid = ?1 AND peer_zid = ?2 AND name = 'rs1'",
            params![local.as_slice(), peer.as_slice()],
        )?;
        tx.execute(
            "INSERT INTO zrtp_cache (local_zid, peer_zid, name, value, last_used_at, ttl)
             VALUES (?1, ?2, 'rs1', ?3, ?4, ?5)",
            params![
                local.as_slice(),
                peer.as_slice(),
                rs1.value,
                rs1.last_used_at as i64,
                rs1.ttl as i64
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn store_pbx_secret(&self, local: &Zid, peer: &Zid, secret: &[u8]) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let previous: Option<Vec<u8>> = tx
            .query_row(
                "SELECT value FROM zrtp_cache WHERE local_zid = ?1 AND peer_zid = ?2 AND name = 'pbx'",
                params![local.as_slice(), peer.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "INSERT OR REPLACE INTO zrtp_cache (local_zid, peer_zid, name, value, last_used_at, ttl)
             VALUES (?1, ?2, 'pbx', ?3, ?4, ?5)",
            params![
                local.as_slice(),
                peer.as_slice(),
                secret,
                crate::unix_now() as i64,
                crate::TTL_FOREVER as i64
            ],
        )?;
        tx.commit()?;
        Ok(previous.as_deref() != Some(secret))
    }

    fn set_verified(&self, local: &Zid, peer: &Zid, verified: bool) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO zrtp_peer (local_zid, peer_zid, verified) VALUES (?1, ?2, ?3)
             ON CONFLICT (local_zid, peer_zid) DO UPDATE SET verified = excluded.verified",
            params![local.as_slice(), peer.as_slice(), verified],
        )?;
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM zrtp_cache; DELETE FROM zrtp_peer;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: Zid = [0x11; 12];
    const PEER: Zid = [0x22; 12];

    #[test]
    fn test_secrets_survive_reopen() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zid.db");

        let zid = {
            let cache = SqliteCache::new(&path).unwrap();
            let zid = cache.load_or_create_zid().unwrap();
            cache.rotate(&ME, &PEER, RetainedSecret::new(vec![1; 32], 3600)).unwrap();
            cache.rotate(&ME, &PEER, RetainedSecret::new(vec![2; 32], 3600)).unwrap();
            cache.set_verified(&ME, &PEER, true).unwrap();
            zid
        };

        let cache = SqliteCache::new(&path).unwrap();
        assert_eq!(cache.load_or_create_zid().unwrap(), zid);
        let entry = cache.entry(&ME, &PEER).unwrap().unwrap();
        assert_eq!(entry.rs1.as_ref().unwrap().value, vec![2; 32]);
        assert_eq!(entry.rs2.as_ref().unwrap().value, vec![1; 32]);
        assert!(entry.verified);
        assert!(!entry.is_enrolled());
    }

    #[test]
    fn test_pbx_secret_and_wipe() {
        let cache = SqliteCache::in_memory().unwrap();
        let zid = cache.load_or_create_zid().unwrap();
        assert!(cache.entry(&ME, &PEER).unwrap().is_none());

        assert!(cache.store_pbx_secret(&ME, &PEER, &[7; 32]).unwrap());
        assert!(!cache.store_pbx_secret(&ME, &PEER, &[7; 32]).unwrap());
        assert!(cache.store_pbx_secret(&ME, &PEER, &[8; 32]).unwrap());
        assert_eq!(cache.entry(&ME, &PEER).unwrap().unwrap().pbx, Some(vec![8; 32]));

        cache.wipe().unwrap();
        assert!(cache.entry(&ME, &PEER).unwrap().is_none());
        assert_eq!(cache.load_or_create_zid().unwrap(), zid);
    }
}
