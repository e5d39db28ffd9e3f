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
use dashmap::DashMap;
use parking_lot::Mutex;

type PeerKey = (Zid, Zid);

/// A simple in-memory implementation of the [`ZidCache`] trait.
///
/// Entries are sharded by peer pair, so handshakes with different peers
/// never wait on each other. Every update of one entry happens under its
/// shard lock.
/// Note: This implementation does not persist data to disk.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    own_zid: Mutex<Option<Zid>>,
    entries: DashMap<PeerKey, CacheEntry>,
}

impl InMemoryCache {
    /// Creates a new, empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ZidCache for InMemoryCache {
    fn load_or_create_zid(&self) -> Result<Zid> {
        let mut own = self.own_zid.lock();
        Ok(*own.get_or_insert_with(generate_zid))
    }

    fn entry(&self, local: &Zid, peer: &Zid) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(&(*local, *peer)).map(|entry| entry.value().clone()))
    }

    fn rotate(&self, local: &Zid, peer: &Zid, rs1: RetainedSecret) -> Result<()> {
        self.entries.entry((*local, *peer)).or_default().rotate(rs1);
        Ok(())
    }

    fn store_pbx_secret(&self, local: &Zid, peer: &Zid, secret: &[u8]) -> Result<bool> {
        let mut entry = self.entries.entry((*local, *peer)).or_default();
        let fresh = entry.pbx.as_deref() != Some(secret);
        entry.pbx = Some(secret.to_vec());
        Ok(fresh)
    }

    fn set_verified(&self, local: &Zid, peer: &Zid, verified: bool) -> Result<()> {
        self.entries.entry((*local, *peer)).or_default().verified = verified;
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}
