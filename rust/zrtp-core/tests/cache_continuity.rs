/*
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

mod common;

use common::*;
use std::sync::Arc;
use zrtp_core::{
    InMemoryCache, SecretFlags, SecretStatus, SecurityEvent, SessionInfo, SqliteCache, ZidCache, ZrtpProfile,
};

/// One complete call; both sessions are torn down afterwards.
fn call(alice: &Endpoint, bob: &Endpoint, profile: ZrtpProfile) -> (SessionInfo, SessionInfo) {
    let (sa, sb, wire) = secure_call(alice, bob, profile);
    let info = (
        alice.identity.session_info(sa).unwrap(),
        bob.identity.session_info(sb).unwrap(),
    );
    assert_eq!(
        alice.identity.stream_info(wire.left.stream).unwrap().secrets,
        info.0.secrets
    );
    alice.identity.session_destroy(sa).unwrap();
    bob.identity.session_destroy(sb).unwrap();
    info
}

fn status(cached: SecretFlags, matches: SecretFlags) -> SecretStatus {
    SecretStatus {
        cached,
        matches,
        wrongs: SecretFlags::empty(),
    }
}

#[test]
fn test_retained_secrets_accumulate() {
    init_logging();
    let (cache_a, cache_b) = (Arc::new(InMemoryCache::new()), Arc::new(InMemoryCache::new()));
    let alice = Endpoint::client(cache_a.clone());
    let bob = Endpoint::client(cache_b.clone());
    let (zid_a, zid_b) = (alice.identity.zid(), bob.identity.zid());
    assert!(cache_a.entry(&zid_a, &zid_b).unwrap().is_none());

    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert_eq!(a.secrets, SecretStatus::default());
    assert_eq!(b.secrets, SecretStatus::default());
    let rs1_a = cache_a.entry(&zid_a, &zid_b).unwrap().and_then(|e| e.rs1).unwrap();
    let rs1_b = cache_b.entry(&zid_b, &zid_a).unwrap().and_then(|e| e.rs1).unwrap();
    assert_eq!(rs1_a.value, rs1_b.value);

    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    let rs1 = SecretFlags::RS1;
    assert_eq!(a.secrets, status(rs1, rs1));
    assert_eq!(b.secrets, status(rs1, rs1));
    let entry = cache_a.entry(&zid_a, &zid_b).unwrap().unwrap();
    assert_eq!(entry.rs2.map(|s| s.value), Some(rs1_a.value));

    let both = SecretFlags::RS1 | SecretFlags::RS2;
    for _ in 0..2 {
        let (a, b) = call(&alice, &bob, ZrtpProfile::default());
        assert_eq!(a.secrets, status(both, both));
        assert_eq!(b.secrets, status(both, both));
        assert!(!a.mitm_alert && !b.mitm_alert);
    }
}

#[test]
fn test_cache_survives_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (path_a, path_b) = (dir.path().join("alice.db"), dir.path().join("bob.db"));

    let zid_a = {
        let alice = Endpoint::client(Arc::new(SqliteCache::new(&path_a).unwrap()));
        let bob = Endpoint::client(Arc::new(SqliteCache::new(&path_b).unwrap()));
        let (a, _) = call(&alice, &bob, ZrtpProfile::default());
        assert_eq!(a.secrets, SecretStatus::default());
        alice.identity.zid()
    };

    let alice = Endpoint::client(Arc::new(SqliteCache::new(&path_a).unwrap()));
    let bob = Endpoint::client(Arc::new(SqliteCache::new(&path_b).unwrap()));
    assert_eq!(alice.identity.zid(), zid_a);
    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert_eq!(a.secrets, status(SecretFlags::RS1, SecretFlags::RS1));
    assert_eq!(b.secrets, status(SecretFlags::RS1, SecretFlags::RS1));
}

#[test]
fn test_lost_cache_warns_the_other_side() {
    init_logging();
    let (cache_a, cache_b) = (Arc::new(InMemoryCache::new()), Arc::new(InMemoryCache::new()));
    let alice = Endpoint::client(cache_a.clone());
    let bob = Endpoint::client(cache_b.clone());
    let (zid_a, zid_b) = (alice.identity.zid(), bob.identity.zid());
    call(&alice, &bob, ZrtpProfile::default());
    let rs1_before = cache_a.entry(&zid_a, &zid_b).unwrap().and_then(|e| e.rs1).unwrap();

    cache_b.wipe().unwrap();
    assert_eq!(bob.identity.zid(), zid_b);

    let (sa, sb, wire) = secure_call(&alice, &bob, ZrtpProfile::default());
    let (ha, hb) = (wire.left.stream, wire.right.stream);
    assert_eq!(
        alice.host.security_events(ha),
        vec![SecurityEvent::MitmWarning { wrongs: SecretFlags::RS1 }]
    );
    assert!(bob.host.security_events(hb).is_empty());

    let info_a = alice.identity.session_info(sa).unwrap();
    assert_eq!(info_a.secrets.wrongs, SecretFlags::RS1);
    assert_eq!(info_a.secrets.matches, SecretFlags::empty());
    assert!(info_a.mitm_alert);
    // The new secret waits for the users to compare the SAS.
    let held = cache_a.entry(&zid_a, &zid_b).unwrap().and_then(|e| e.rs1).unwrap();
    assert_eq!(held.value, rs1_before.value);

    alice.identity.set_verified(sa, true).unwrap();
    let info_a = alice.identity.session_info(sa).unwrap();
    assert!(!info_a.mitm_alert);
    assert!(info_a.sas_verified);
    let entry = cache_a.entry(&zid_a, &zid_b).unwrap().unwrap();
    assert_ne!(entry.rs1.map(|s| s.value), Some(rs1_before.value));
    assert!(entry.verified);
    alice.identity.session_destroy(sa).unwrap();
    bob.identity.session_destroy(sb).unwrap();

    // Both sides agree on the secret again.
    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert!(a.secrets.matches.contains(SecretFlags::RS1));
    assert!(b.secrets.matches.contains(SecretFlags::RS1));
    assert!(a.secrets.wrongs.is_empty());
    assert!(b.secrets.wrongs.is_empty());
}

#[test]
fn test_verified_flag_needs_both_sides() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());

    let (sa, sb, _) = secure_call(&alice, &bob, ZrtpProfile::default());
    alice.identity.set_verified(sa, true).unwrap();
    alice.identity.session_destroy(sa).unwrap();
    bob.identity.session_destroy(sb).unwrap();

    // Bob never verified, so his Confirm clears Alice's flag.
    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert!(!a.sas_verified);
    assert!(!b.sas_verified);

    let (sa, sb, _) = secure_call(&alice, &bob, ZrtpProfile::default());
    alice.identity.set_verified(sa, true).unwrap();
    bob.identity.set_verified(sb, true).unwrap();
    alice.identity.session_destroy(sa).unwrap();
    bob.identity.session_destroy(sb).unwrap();

    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert!(a.sas_verified);
    assert!(b.sas_verified);
}

#[test]
fn test_zero_ttl_retains_nothing() {
    init_logging();
    let (cache_a, cache_b) = (Arc::new(InMemoryCache::new()), Arc::new(InMemoryCache::new()));
    let alice = Endpoint::client(cache_a.clone());
    let bob = Endpoint::client(cache_b.clone());
    let profile = ZrtpProfile {
        cache_ttl: 0,
        ..ZrtpProfile::default()
    };

    let (a, _) = call(&alice, &bob, profile);
    assert_eq!(a.cache_ttl, 0);
    let (zid_a, zid_b) = (alice.identity.zid(), bob.identity.zid());
    assert!(cache_a.entry(&zid_a, &zid_b).unwrap().and_then(|e| e.rs1).is_none());
    assert!(cache_b.entry(&zid_b, &zid_a).unwrap().and_then(|e| e.rs1).is_none());

    let (a, b) = call(&alice, &bob, ZrtpProfile::default());
    assert_eq!(a.secrets, SecretStatus::default());
    assert_eq!(b.secrets, SecretStatus::default());
}
