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

//! Retained-secret cache.
//!
//! The cache persists this endpoint's ZID and, per (local ZID, peer ZID)
//! pair, the last two retained secrets, the trusted-MiTM (PBX) secret and
//! the SAS-verified flag. Secrets survive across calls and process
//! restarts to prevent man-in-the-middle attacks.

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

mod memory;
mod sqlite;

pub use memory::InMemoryCache;
pub use sqlite::SqliteCache;

/// A 96-bit ZRTP identifier.
pub type Zid = [u8; 12];

/// Secrets with this TTL never expire.
pub const TTL_FOREVER: u32 = 0xFFFF_FFFF;

/// Seconds since the UNIX epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A secret shared with one peer, with its freshness metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct RetainedSecret {
    pub value: Vec<u8>,
    /// When the secret was last stored, seconds since the epoch.
    pub last_used_at: u64,
    /// Validity in seconds.
    pub ttl: u32,
}

impl RetainedSecret {
    pub fn new(value: Vec<u8>, ttl: u32) -> Self {
        Self {
            value,
            last_used_at: unix_now(),
            ttl,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl != TTL_FOREVER && self.last_used_at.saturating_add(self.ttl as u64) < now
    }
}

impl std::fmt::Debug for RetainedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedSecret")
            .field("last_used_at", &self.last_used_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Everything cached for one peer ZID pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub rs1: Option<RetainedSecret>,
    pub rs2: Option<RetainedSecret>,
    /// Secret shared with a trusted MiTM; present once the peer is enrolled.
    pub pbx: Option<Vec<u8>>,
    /// The user verified the SAS with this peer.
    pub verified: bool,
}

impl CacheEntry {
    pub fn is_enrolled(&self) -> bool {
        self.pbx.is_some()
    }

    /// Shifts RS1 into RS2 and installs a fresh RS1.
    pub fn rotate(&mut self, rs1: RetainedSecret) {
        self.rs2 = self.rs1.replace(rs1);
    }
}

/// Trait for ZID cache (retained secret storage).
///
/// Implementations serialize access per peer pair; a rotation is never
/// observable half-done by a concurrent [`ZidCache::entry`] read.
pub trait ZidCache: Send + Sync {
    /// Returns the persisted local ZID, creating and storing one on first use.
    fn load_or_create_zid(&self) -> Result<Zid>;
    /// Snapshot of the entry for a peer pair, if any.
    fn entry(&self, local: &Zid, peer: &Zid) -> Result<Option<CacheEntry>>;
    /// Atomically moves RS1 to RS2 and stores `rs1`.
    fn rotate(&self, local: &Zid, peer: &Zid, rs1: RetainedSecret) -> Result<()>;
    /// Stores the trusted-MiTM secret. Returns `true` if the peer was not enrolled with this secret before.
    fn store_pbx_secret(&self, local: &Zid, peer: &Zid, secret: &[u8]) -> Result<bool>;
    /// Records whether the SAS with this peer was verified.
    fn set_verified(&self, local: &Zid, peer: &Zid, verified: bool) -> Result<()>;
    /// Forgets every peer entry. The local ZID is kept.
    fn wipe(&self) -> Result<()>;
}

fn generate_zid() -> Zid {
    use rand_core::{OsRng, RngCore};
    let mut zid = [0u8; 12];
    OsRng.fill_bytes(&mut zid);
    zid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rotation_shifts_rs1() {
        let mut entry = CacheEntry::default();
        entry.rotate(RetainedSecret::new(vec![1; 32], 60));
        assert!(entry.rs2.is_none());
        entry.rotate(RetainedSecret::new(vec![2; 32], 60));
        assert_eq!(entry.rs1.as_ref().map(|s| s.value[0]), Some(2));
        assert_eq!(entry.rs2.as_ref().map(|s| s.value[0]), Some(1));
    }

    #[test]
    fn test_expiry() {
        let mut secret = RetainedSecret::new(vec![0; 32], 10);
        secret.last_used_at = 100;
        assert!(!secret.is_expired(110));
        assert!(secret.is_expired(111));
        secret.ttl = TTL_FOREVER;
        assert!(!secret.is_expired(u64::MAX));
    }
}
