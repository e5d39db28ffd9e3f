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
use std::time::Duration;
use zrtp_core::{
    DropReason, InMemoryCache, PacketDisposition, ProtocolError, ProtocolEvent, Role, SecurityEvent,
    SignalingRole, StreamMode, ZrtpError, ZrtpProfile, ZrtpState,
};
use zrtp_proto::packets::MessageType;

#[test]
fn test_single_stream_handshake() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (sa, sb, wire) = secure_call(&alice, &bob, ZrtpProfile::default());
    let (ha, hb) = (wire.left.stream, wire.right.stream);

    assert_eq!(
        alice.host.protocol_events(ha),
        vec![
            ProtocolEvent::IsClear,
            ProtocolEvent::IsInitiatingSecure,
            ProtocolEvent::IsSecure,
            ProtocolEvent::IsSecureDone
        ]
    );
    assert_eq!(
        bob.host.protocol_events(hb),
        vec![
            ProtocolEvent::IsClear,
            ProtocolEvent::IsPendingSecure,
            ProtocolEvent::IsSecure,
            ProtocolEvent::IsSecureDone
        ]
    );
    assert!(alice.host.security_events(ha).is_empty());
    assert!(bob.host.security_events(hb).is_empty());
    assert_eq!(alice.host.states(ha).last(), Some(&ZrtpState::Secure));

    let info_a = alice.identity.session_info(sa).unwrap();
    let info_b = bob.identity.session_info(sb).unwrap();
    assert!(info_a.sas_is_ready());
    assert_eq!(info_a.sas_hash, info_b.sas_hash);
    assert_eq!(info_a.sas1, info_b.sas1);
    assert_eq!(info_a.sas1.len(), 4);
    assert_eq!(info_a.peer_zid, Some(bob.identity.zid()));
    assert_eq!(info_b.peer_zid, Some(alice.identity.zid()));
    assert_eq!(info_a.algorithms, info_b.algorithms);
    assert_eq!(info_a.algorithms.map(|a| a.key_agreement), Some(*b"X255"));
    assert_eq!(info_a.secrets, Default::default());

    let stream_a = alice.identity.stream_info(ha).unwrap();
    let stream_b = bob.identity.stream_info(hb).unwrap();
    assert_eq!(stream_a.role, Role::Initiator);
    assert_eq!(stream_b.role, Role::Responder);
    assert_eq!(stream_a.mode, StreamMode::Dh);
    assert_eq!(stream_a.peer_ssrc, Some(0xB000_0001));
    assert_eq!(stream_a.peer_client_id.as_deref(), Some("ZRTP-Rust"));
    assert_eq!(stream_a.peer_version.as_deref(), Some("1.10"));
    assert!(!stream_a.peer_mitm);
    assert!(alice.identity.session_is_secure(sa).unwrap());
    assert!(bob.identity.session_is_secure(sb).unwrap());
}

#[test]
fn test_simultaneous_commits_pick_one_initiator() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let wire = Wire::new(Leg::new(&alice, ha[0], 1), Leg::new(&bob, hb[0], 2));
    connect(&[wire]);

    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
    let roles = [
        alice.identity.stream_info(ha[0]).unwrap().role,
        bob.identity.stream_info(hb[0]).unwrap().role,
    ];
    assert!(roles.contains(&Role::Initiator));
    assert!(roles.contains(&Role::Responder));
}

#[test]
fn test_multistream_shares_the_dh_exchange() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (sa, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 2);
    let (sb, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 2);
    let audio = Wire::new(Leg::new(&alice, ha[0], 10), Leg::new(&bob, hb[0], 20));
    let video = Wire::new(Leg::new(&alice, ha[1], 11), Leg::new(&bob, hb[1], 21));
    connect(&[audio, video]);

    for wire in [audio, video] {
        assert_eq!(wire.left.state(), ZrtpState::Secure);
        assert_eq!(wire.right.state(), ZrtpState::Secure);
    }
    let modes: Vec<_> = ha
        .iter()
        .map(|h| alice.identity.stream_info(*h).unwrap().mode)
        .collect();
    assert!(modes.contains(&StreamMode::Dh));
    assert!(modes.contains(&StreamMode::Multistream));
    assert_eq!(bob.identity.stream_info(hb[1]).unwrap().mode, StreamMode::Multistream);

    let info_a = alice.identity.session_info(sa).unwrap();
    let info_b = bob.identity.session_info(sb).unwrap();
    assert_eq!(info_a.streams, 2);
    assert_eq!(info_a.sas_hash, info_b.sas_hash);
    assert!(alice.identity.session_is_secure(sa).unwrap());
    assert!(bob.identity.session_is_secure(sb).unwrap());
}

#[test]
fn test_session_is_secure_needs_every_stream() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (sa, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 2);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 2);
    let audio = Wire::new(Leg::new(&alice, ha[0], 10), Leg::new(&bob, hb[0], 20));
    connect(&[audio]);

    assert_eq!(audio.left.state(), ZrtpState::Secure);
    assert_eq!(alice.state(ha[1]), ZrtpState::Active);
    assert!(!alice.identity.session_is_secure(sa).unwrap());
}

#[test]
fn test_wrong_signaling_hash_warns_the_receiver_only() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 1);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 1);
    let (ha, hb) = (ha[0], hb[0]);

    // Alice learns Bob's real hash, Bob is handed a bogus one for Alice.
    let attribute = bob.identity.signaling_hash_attribute(hb).unwrap();
    assert!(attribute.starts_with("1.10 "));
    alice.identity.signaling_hash_set_attribute(ha, &attribute).unwrap();
    bob.identity.signaling_hash_set(hb, &[0x55; 32]).unwrap();

    let wire = Wire::new(Leg::new(&alice, ha, 1), Leg::new(&bob, hb, 2));
    connect(&[wire]);

    assert_eq!(bob.host.security_events(hb), vec![SecurityEvent::WrongSignalingHash]);
    assert!(alice.host.security_events(ha).is_empty());
    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
}

#[test]
fn test_signaling_hash_accessors() {
    init_logging();
    let alice = Endpoint::fresh();
    let (_, h) = alice.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let hash = alice.identity.signaling_hash_get(h[0]).unwrap();
    assert_eq!(hash.len(), 32);
    // The Hello is fixed when the stream is attached.
    assert_eq!(alice.identity.signaling_hash_get(h[0]).unwrap(), hash);

    assert!(matches!(
        alice.identity.signaling_hash_set(h[0], &[1, 2, 3]),
        Err(ZrtpError::BadParam(_))
    ));
    alice.identity.stream_start(h[0], 5).unwrap();
    assert_eq!(
        alice.identity.signaling_hash_set(h[0], &hash),
        Err(ZrtpError::WrongState(ZrtpState::WaitHelloAck))
    );
}

#[test]
fn test_silent_peer_ends_in_no_zrtp() {
    init_logging();
    let alice = Endpoint::fresh();
    let (_, h) = alice.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let h = h[0];
    alice.identity.stream_start(h, 1).unwrap();

    let mut intervals = Vec::new();
    while let Some(delay) = alice.identity.next_timeout(h).unwrap() {
        intervals.push(delay);
        alice.identity.handle_timeout(h).unwrap();
        assert!(intervals.len() <= 21);
    }

    assert_eq!(alice.state(h), ZrtpState::NoZrtp);
    assert_eq!(intervals.len(), 21);
    assert_eq!(&intervals[..4], &[
        Duration::from_millis(50),
        Duration::from_millis(100),
        Duration::from_millis(200),
        Duration::from_millis(200),
    ]);
    // The first Hello plus 20 retransmissions.
    assert_eq!(alice.host.take_packets(h).len(), 21);
    assert_eq!(alice.host.count(h, ProtocolEvent::NoZrtpQuick), 1);
    assert_eq!(alice.host.count(h, ProtocolEvent::NoZrtp), 1);
}

#[test]
fn test_lost_commit_is_retransmitted() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 1);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 1);
    let wire = Wire::new(Leg::new(&alice, ha[0], 1), Leg::new(&bob, hb[0], 2));
    wire.left.start();
    wire.right.start();

    let mut lost = 0;
    pump_with(&[wire], &mut |packet| {
        if message_type(packet) == Some(MessageType::Commit) && lost == 0 {
            lost += 1;
            return None;
        }
        Some(packet.to_vec())
    });
    assert_eq!(lost, 1);
    assert_eq!(wire.left.state(), ZrtpState::InitiatingSecure);

    settle(&[wire]);
    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
}

#[test]
fn test_stray_packets_are_dropped() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 1);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 1);
    let wire = Wire::new(Leg::new(&alice, ha[0], 1), Leg::new(&bob, hb[0], 2));
    wire.left.start();
    wire.right.start();

    let mut commit = None;
    pump_with(&[wire], &mut |packet| {
        if message_type(packet) == Some(MessageType::Commit) {
            commit = Some(packet.to_vec());
        }
        Some(packet.to_vec())
    });
    settle(&[wire]);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
    let commit = commit.unwrap();
    let before = bob.identity.stream_info(hb[0]).unwrap().dropped_packets;

    // A replayed Commit after the handshake.
    assert_eq!(
        bob.identity.process_incoming(2, &commit),
        PacketDisposition::Dropped(DropReason::Unexpected)
    );
    // Truncated and bit-flipped frames.
    assert_eq!(
        bob.identity.process_incoming(2, &commit[..40]),
        PacketDisposition::Dropped(DropReason::Malformed)
    );
    let mut flipped = commit.clone();
    flipped[30] ^= 0x01;
    assert_eq!(
        bob.identity.process_incoming(2, &flipped),
        PacketDisposition::Dropped(DropReason::Malformed)
    );
    // A valid frame with an unknown message type.
    let unknown = reframe(&commit, |m| m[4..12].copy_from_slice(b"Bogus   "));
    assert_eq!(
        bob.identity.process_incoming(2, &unknown),
        PacketDisposition::Dropped(DropReason::UnknownMessage)
    );

    assert_eq!(wire.right.state(), ZrtpState::Secure);
    let after = bob.identity.stream_info(hb[0]).unwrap().dropped_packets;
    assert_eq!(after, before + 4);
}

#[test]
fn test_tampered_public_value_is_fatal() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Initiator, 1);
    let (_, hb) = bob.call(ZrtpProfile::default(), SignalingRole::Responder, 1);
    let wire = Wire::new(Leg::new(&alice, ha[0], 1), Leg::new(&bob, hb[0], 2));
    wire.left.start();
    wire.right.start();

    pump_with(&[wire], &mut |packet| {
        if message_type(packet) == Some(MessageType::DHPart2) {
            // Header, H1 and the four secret ids precede the public value.
            return Some(reframe(packet, |m| m[80] ^= 0x40));
        }
        Some(packet.to_vec())
    });
    settle(&[wire]);

    assert_eq!(wire.right.state(), ZrtpState::Error);
    assert_eq!(wire.left.state(), ZrtpState::Error);
    let info_b = bob.identity.stream_info(hb[0]).unwrap();
    assert_eq!(info_b.last_error, Some(ProtocolError::HviMismatch));
    assert_eq!(
        bob.host.security_events(hb[0]),
        vec![SecurityEvent::ProtocolError { error: ProtocolError::HviMismatch, remote: false }]
    );
    assert_eq!(
        alice.host.security_events(ha[0]),
        vec![SecurityEvent::ProtocolError { error: ProtocolError::HviMismatch, remote: true }]
    );
    assert_eq!(alice.host.count(ha[0], ProtocolEvent::IsSecure), 0);
    assert_eq!(bob.host.count(hb[0], ProtocolEvent::IsSecure), 0);
}

#[test]
fn test_equal_zid_is_rejected() {
    init_logging();
    let cache = Arc::new(InMemoryCache::new());
    let (alice, mirror) = (Endpoint::client(cache.clone()), Endpoint::client(cache));
    assert_eq!(alice.identity.zid(), mirror.identity.zid());

    let (_, ha) = alice.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let (_, hb) = mirror.call(ZrtpProfile::default(), SignalingRole::Unknown, 1);
    let wire = Wire::new(Leg::new(&alice, ha[0], 1), Leg::new(&mirror, hb[0], 2));
    connect(&[wire]);

    for leg in [wire.left, wire.right] {
        assert_eq!(leg.state(), ZrtpState::Error);
        let info = leg.endpoint.identity.stream_info(leg.stream).unwrap();
        assert_eq!(info.last_error, Some(ProtocolError::EqualZid));
    }
    assert!(alice
        .host
        .security_events(ha[0])
        .contains(&SecurityEvent::ProtocolError { error: ProtocolError::EqualZid, remote: false }));
}

#[test]
fn test_go_clear_and_back() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let profile = ZrtpProfile {
        allowclear: true,
        ..ZrtpProfile::default()
    };
    let (sa, _, wire) = secure_call(&alice, &bob, profile);
    let (ha, hb) = (wire.left.stream, wire.right.stream);
    assert!(alice.identity.stream_info(ha).unwrap().allowclear);

    alice.identity.stream_clear(ha).unwrap();
    pump(&[wire]);
    assert_eq!(wire.left.state(), ZrtpState::InitiatingClear);
    assert_eq!(wire.right.state(), ZrtpState::PendingClear);
    assert_eq!(bob.host.count(hb, ProtocolEvent::IsPendingClear), 1);

    // Only the host's confirmation lets Bob go clear.
    bob.identity.stream_clear(hb).unwrap();
    pump(&[wire]);
    assert_eq!(wire.left.state(), ZrtpState::Clear);
    assert_eq!(wire.right.state(), ZrtpState::Clear);
    assert_eq!(alice.host.count(ha, ProtocolEvent::IsClear), 2);
    assert!(!alice.identity.session_is_secure(sa).unwrap());

    alice.identity.stream_secure(ha).unwrap();
    settle(&[wire]);
    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
    assert_eq!(alice.identity.stream_info(ha).unwrap().mode, StreamMode::Multistream);
}

#[test]
fn test_go_clear_needs_both_sides() {
    init_logging();
    let (alice, bob) = (Endpoint::fresh(), Endpoint::fresh());
    let (_, _, wire) = secure_call(&alice, &bob, ZrtpProfile::default());
    assert_eq!(alice.identity.stream_clear(wire.left.stream), Err(ZrtpError::ClearNotAllowed));
    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(
        alice.identity.stream_secure(wire.left.stream),
        Err(ZrtpError::WrongState(ZrtpState::Secure))
    );
}
