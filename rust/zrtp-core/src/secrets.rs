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

//! Retained, auxiliary and PBX secrets of one peer pair.

use crate::state::Role;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use zrtp_cache::{unix_now, RetainedSecret, Zid, ZidCache};
use zrtp_crypto::{kdf::secret_id, random_array, Hash};
use zrtp_proto::packets::SecretIds;

/// A set of shared secret kinds.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SecretFlags(u8);

impl SecretFlags {
    pub const RS1: Self = Self(0x02);
    pub const RS2: Self = Self(0x04);
    pub const AUX: Self = Self(0x10);
    pub const PBX: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for SecretFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for SecretFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitXor for SecretFlags {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Not for SecretFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for SecretFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::RS1, "RS1"),
            (Self::RS2, "RS2"),
            (Self::AUX, "AUX"),
            (Self::PBX, "PBX"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "SecretFlags({})", set.join("|"))
    }
}

/// Which secrets were cached, which matched the peer, and which were expected
/// to match but did not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretStatus {
    pub cached: SecretFlags,
    pub matches: SecretFlags,
    pub wrongs: SecretFlags,
}

#[derive(Clone)]
struct Secret {
    value: Vec<u8>,
    cached: bool,
    expired: bool,
}

impl Secret {
    fn random() -> Self {
        Self {
            value: random_array::<32>().to_vec(),
            cached: false,
            expired: false,
        }
    }

    fn retained(secret: &RetainedSecret, now: u64) -> Self {
        Self {
            value: secret.value.clone(),
            cached: true,
            expired: secret.is_expired(now),
        }
    }

    fn id(&self, hash: &dyn Hash, role: Role) -> [u8; 8] {
        secret_id(hash, &self.value, role.label())
    }
}

/// Secrets selected for s0: s1 from RS1/RS2, s2 from AUX, s3 from PBX.
#[derive(Default)]
pub(crate) struct SelectedSecrets {
    pub s1: Option<Vec<u8>>,
    pub s2: Option<Vec<u8>>,
    pub s3: Option<Vec<u8>>,
}

/// Missing secrets are replaced by random values so the ids sent in DHPart
/// never reveal which secrets we hold.
pub(crate) struct SharedSecrets {
    loaded: bool,
    rs1: Secret,
    rs2: Secret,
    aux: Secret,
    pbx: Secret,
    pub status: SecretStatus,
    pub verified: bool,
}

impl SharedSecrets {
    pub fn new() -> Self {
        Self {
            loaded: false,
            rs1: Secret::random(),
            rs2: Secret::random(),
            aux: Secret::random(),
            pbx: Secret::random(),
            status: SecretStatus::default(),
            verified: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Reads the cache entry for this peer once per session.
    pub fn load(&mut self, cache: &dyn ZidCache, local: &Zid, peer: &Zid, aux: Option<&[u8]>) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        let now = unix_now();
        match cache.entry(local, peer) {
            Ok(Some(entry)) => {
                if let Some(rs1) = &entry.rs1 {
                    self.rs1 = Secret::retained(rs1, now);
                }
                if let Some(rs2) = &entry.rs2 {
                    self.rs2 = Secret::retained(rs2, now);
                }
                if let Some(pbx) = &entry.pbx {
                    self.pbx = Secret {
                        value: pbx.clone(),
                        cached: true,
                        expired: false,
                    };
                }
                self.verified = entry.verified;
            }
            Ok(None) => log::debug!("no cached secrets for peer {}", hex::encode(peer)),
            Err(e) => log::warn!("cache lookup failed, continuing without secrets: {:#}", e),
        }
        if let Some(aux) = aux {
            self.aux = Secret {
                value: aux.to_vec(),
                cached: true,
                expired: false,
            };
        }

        let mut cached = SecretFlags::empty();
        for (secret, flag) in [
            (&self.rs1, SecretFlags::RS1),
            (&self.rs2, SecretFlags::RS2),
            (&self.aux, SecretFlags::AUX),
            (&self.pbx, SecretFlags::PBX),
        ] {
            if secret.cached {
                cached.insert(flag);
            }
        }
        self.status = SecretStatus {
            cached,
            ..SecretStatus::default()
        };
    }

    /// The ids we put into our DHPart.
    pub fn local_ids(&self, hash: &dyn Hash, role: Role) -> SecretIds {
        SecretIds {
            rs1: self.rs1.id(hash, role),
            rs2: self.rs2.id(hash, role),
            aux: self.aux.id(hash, role),
            pbx: self.pbx.id(hash, role),
        }
    }

    /// Compares our secrets with the ids from the peer's DHPart and picks the
    /// ones both sides hold.
    pub fn negotiate(&mut self, hash: &dyn Hash, peer: &SecretIds, peer_role: Role) -> SelectedSecrets {
        let mut selected = SelectedSecrets::default();
        let mut matches = SecretFlags::empty();
        let mut cached = self.status.cached;

        if self.rs1.id(hash, peer_role) == peer.rs1 || self.rs1.id(hash, peer_role) == peer.rs2 {
            selected.s1 = Some(self.rs1.value.clone());
            matches.insert(SecretFlags::RS1);
        } else if self.rs2.id(hash, peer_role) == peer.rs1 {
            // The peer missed our last rotation; carry on with the older secret.
            self.rs1 = self.rs2.clone();
            selected.s1 = Some(self.rs1.value.clone());
            matches.insert(SecretFlags::RS1);
            cached.insert(SecretFlags::RS1);
        }
        if self.rs2.id(hash, peer_role) == peer.rs2 {
            matches.insert(SecretFlags::RS2);
            if selected.s1.is_none() {
                selected.s1 = Some(self.rs2.value.clone());
            }
        }
        if self.aux.id(hash, peer_role) == peer.aux {
            selected.s2 = Some(self.aux.value.clone());
            matches.insert(SecretFlags::AUX);
        }
        if self.pbx.cached && self.pbx.id(hash, peer_role) == peer.pbx {
            selected.s3 = Some(self.pbx.value.clone());
            matches.insert(SecretFlags::PBX);
        }

        let expired = self.rs1.expired || self.rs2.expired;
        let wrongs = if expired {
            SecretFlags::empty()
        } else {
            (matches ^ cached) & !(SecretFlags::RS2 | SecretFlags::PBX)
        };
        self.status = SecretStatus { cached, matches, wrongs };
        log::debug!("retained secrets: {:?}", self.status);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zrtp_cache::InMemoryCache;
    use zrtp_crypto::backends::Sha256;

    const ALICE: Zid = [0xA1; 12];
    const BOB: Zid = [0xB0; 12];

    fn loaded(cache: &InMemoryCache, local: &Zid, peer: &Zid) -> SharedSecrets {
        let mut secrets = SharedSecrets::new();
        secrets.load(cache, local, peer, None);
        secrets
    }

    #[test]
    fn test_flags_ops() {
        let flags = SecretFlags::RS1 | SecretFlags::PBX;
        assert!(flags.contains(SecretFlags::RS1));
        assert!(!flags.contains(SecretFlags::RS2));
        assert_eq!((flags ^ SecretFlags::RS1), SecretFlags::PBX);
        assert_eq!(flags.bits(), 0x22);
        assert_eq!(format!("{:?}", flags), "SecretFlags(RS1|PBX)");
    }

    #[test]
    fn test_fresh_peers_match_nothing() {
        let hash = Sha256;
        let (ca, cb) = (InMemoryCache::new(), InMemoryCache::new());
        let mut a = loaded(&ca, &ALICE, &BOB);
        let mut b = loaded(&cb, &BOB, &ALICE);

        let a_ids = a.local_ids(&hash, Role::Initiator);
        let b_ids = b.local_ids(&hash, Role::Responder);
        let sel = a.negotiate(&hash, &b_ids, Role::Responder);
        b.negotiate(&hash, &a_ids, Role::Initiator);
        assert!(sel.s1.is_none());
        assert_eq!(a.status, SecretStatus::default());
        assert_eq!(b.status, SecretStatus::default());
    }

    #[test]
    fn test_shared_rs1_matches() {
        let hash = Sha256;
        let (ca, cb) = (InMemoryCache::new(), InMemoryCache::new());
        let shared = RetainedSecret::new(vec![7; 32], 3600);
        ca.rotate(&ALICE, &BOB, shared.clone()).unwrap();
        cb.rotate(&BOB, &ALICE, shared).unwrap();

        let mut a = loaded(&ca, &ALICE, &BOB);
        let b = loaded(&cb, &BOB, &ALICE);
        let sel = a.negotiate(&hash, &b.local_ids(&hash, Role::Responder), Role::Responder);
        assert_eq!(sel.s1, Some(vec![7; 32]));
        assert_eq!(a.status.matches, SecretFlags::RS1);
        assert!(a.status.wrongs.is_empty());
    }

    #[test]
    fn test_lost_rotation_falls_back_to_rs2() {
        let hash = Sha256;
        let (ca, cb) = (InMemoryCache::new(), InMemoryCache::new());
        let old = RetainedSecret::new(vec![1; 32], 3600);
        let new = RetainedSecret::new(vec![2; 32], 3600);
        ca.rotate(&ALICE, &BOB, old.clone()).unwrap();
        ca.rotate(&ALICE, &BOB, new).unwrap();
        cb.rotate(&BOB, &ALICE, old).unwrap();

        let mut a = loaded(&ca, &ALICE, &BOB);
        let mut b = loaded(&cb, &BOB, &ALICE);
        let a_ids = a.local_ids(&hash, Role::Initiator);
        let b_ids = b.local_ids(&hash, Role::Responder);
        let sel_a = a.negotiate(&hash, &b_ids, Role::Responder);
        let sel_b = b.negotiate(&hash, &a_ids, Role::Initiator);
        assert_eq!(sel_a.s1, Some(vec![1; 32]));
        assert_eq!(sel_a.s1, sel_b.s1);
        assert!(a.status.wrongs.is_empty());
        assert!(b.status.wrongs.is_empty());
    }

    #[test]
    fn test_wiped_peer_raises_wrongs() {
        let hash = Sha256;
        let (ca, cb) = (InMemoryCache::new(), InMemoryCache::new());
        ca.rotate(&ALICE, &BOB, RetainedSecret::new(vec![3; 32], 3600)).unwrap();

        let mut a = loaded(&ca, &ALICE, &BOB);
        let b = loaded(&cb, &BOB, &ALICE);
        a.negotiate(&hash, &b.local_ids(&hash, Role::Responder), Role::Responder);
        assert_eq!(a.status.cached, SecretFlags::RS1);
        assert_eq!(a.status.wrongs, SecretFlags::RS1);
    }

    #[test]
    fn test_expired_secret_suppresses_wrongs() {
        let hash = Sha256;
        let (ca, cb) = (InMemoryCache::new(), InMemoryCache::new());
        let mut stale = RetainedSecret::new(vec![4; 32], 1);
        stale.last_used_at = 0;
        ca.rotate(&ALICE, &BOB, stale).unwrap();

        let mut a = loaded(&ca, &ALICE, &BOB);
        let b = loaded(&cb, &BOB, &ALICE);
        a.negotiate(&hash, &b.local_ids(&hash, Role::Responder), Role::Responder);
        assert!(a.status.wrongs.is_empty());
    }
}
