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

//! In-memory network shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use zrtp_core::{
    InMemoryCache, ProtocolEvent, SecurityEvent, SessionHandle, SignalingRole, StreamEvent, StreamHandle,
    ZidCache, ZrtpConfig, ZrtpHost, ZrtpIdentity, ZrtpProfile, ZrtpState,
};
use zrtp_proto::packets::MessageType;
use zrtp_proto::transport::{frame, unframe};

/// Records everything the engine hands to its host.
#[derive(Default)]
pub struct RecordingHost {
    outbox: Mutex<Vec<(StreamHandle, Vec<u8>)>>,
    events: Mutex<Vec<(StreamHandle, StreamEvent)>>,
    states: Mutex<Vec<(StreamHandle, ZrtpState)>>,
}

impl ZrtpHost for RecordingHost {
    fn send_packet(&self, stream: StreamHandle, packet: &[u8]) {
        self.outbox.lock().push((stream, packet.to_vec()));
    }

    fn on_event(&self, stream: StreamHandle, event: StreamEvent) {
        self.events.lock().push((stream, event));
    }

    fn on_state_change(&self, stream: StreamHandle, state: ZrtpState) {
        self.states.lock().push((stream, state));
    }
}

impl RecordingHost {
    /// Removes and returns the packets sent on `stream`.
    pub fn take_packets(&self, stream: StreamHandle) -> Vec<Vec<u8>> {
        let mut outbox = self.outbox.lock();
        let (mine, rest): (Vec<_>, Vec<_>) = outbox.drain(..).partition(|(s, _)| *s == stream);
        *outbox = rest;
        mine.into_iter().map(|(_, p)| p).collect()
    }

    pub fn events(&self, stream: StreamHandle) -> Vec<StreamEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, e)| *e)
            .collect()
    }

    pub fn protocol_events(&self, stream: StreamHandle) -> Vec<ProtocolEvent> {
        self.events(stream)
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Protocol(p) => Some(p),
                StreamEvent::Security(_) => None,
            })
            .collect()
    }

    pub fn security_events(&self, stream: StreamHandle) -> Vec<SecurityEvent> {
        self.events(stream)
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Security(s) => Some(s),
                StreamEvent::Protocol(_) => None,
            })
            .collect()
    }

    pub fn count(&self, stream: StreamHandle, event: ProtocolEvent) -> usize {
        self.protocol_events(stream).iter().filter(|e| **e == event).count()
    }

    pub fn states(&self, stream: StreamHandle) -> Vec<ZrtpState> {
        self.states
            .lock()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, st)| *st)
            .collect()
    }
}

/// An identity with its recording host.
pub struct Endpoint {
    pub identity: ZrtpIdentity,
    pub host: Arc<RecordingHost>,
}

impl Endpoint {
    pub fn new(config: ZrtpConfig, cache: Arc<dyn ZidCache>) -> Self {
        let host = Arc::new(RecordingHost::default());
        let identity = ZrtpIdentity::new(config, cache, host.clone()).unwrap();
        Self { identity, host }
    }

    pub fn client(cache: Arc<dyn ZidCache>) -> Self {
        Self::new(ZrtpConfig::default(), cache)
    }

    pub fn pbx(cache: Arc<dyn ZidCache>) -> Self {
        let config = ZrtpConfig {
            client_id: "ZRTP-Rust PBX".into(),
            is_mitm: true,
            ..Default::default()
        };
        Self::new(config, cache)
    }

    pub fn fresh() -> Self {
        Self::client(Arc::new(InMemoryCache::new()))
    }

    /// Creates a session with `streams` attached streams.
    pub fn call(&self, profile: ZrtpProfile, role: SignalingRole, streams: usize) -> (SessionHandle, Vec<StreamHandle>) {
        let session = self.identity.session_create(profile, role).unwrap();
        let handles = (0..streams)
            .map(|_| self.identity.stream_attach(session).unwrap())
            .collect();
        (session, handles)
    }

    pub fn state(&self, stream: StreamHandle) -> ZrtpState {
        self.identity.stream_info(stream).unwrap().state
    }
}

/// One side of a media stream: endpoint, stream and the id it was started with.
#[derive(Clone, Copy)]
pub struct Leg<'a> {
    pub endpoint: &'a Endpoint,
    pub stream: StreamHandle,
    pub id: u32,
}

impl<'a> Leg<'a> {
    pub fn new(endpoint: &'a Endpoint, stream: StreamHandle, id: u32) -> Self {
        Self { endpoint, stream, id }
    }

    pub fn start(&self) {
        self.endpoint.identity.stream_start(self.stream, self.id).unwrap();
    }

    pub fn state(&self) -> ZrtpState {
        self.endpoint.state(self.stream)
    }
}

/// A media path between two legs.
#[derive(Clone, Copy)]
pub struct Wire<'a> {
    pub left: Leg<'a>,
    pub right: Leg<'a>,
}

impl<'a> Wire<'a> {
    pub fn new(left: Leg<'a>, right: Leg<'a>) -> Self {
        Self { left, right }
    }
}

/// Message type of a framed packet.
pub fn message_type(packet: &[u8]) -> Option<MessageType> {
    let (_, message) = unframe(packet).ok()?;
    MessageType::peek(message)
}

/// Rewrites the message inside a frame, keeping the frame valid.
pub fn reframe(packet: &[u8], edit: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let (header, message) = unframe(packet).unwrap();
    let mut message = message.to_vec();
    edit(&mut message);
    frame(header.sequence, header.ssrc, &message)
}

/// Moves packets over `wires` until none are left. `filter` may rewrite or drop each one.
pub fn pump_with(wires: &[Wire], filter: &mut dyn FnMut(&[u8]) -> Option<Vec<u8>>) -> usize {
    let mut moved = 0;
    for _ in 0..1000 {
        let mut progress = false;
        for wire in wires {
            for (from, to) in [(wire.left, wire.right), (wire.right, wire.left)] {
                for packet in from.endpoint.host.take_packets(from.stream) {
                    progress = true;
                    moved += 1;
                    if let Some(packet) = filter(&packet) {
                        to.endpoint.identity.process_incoming(to.id, &packet);
                    }
                }
            }
        }
        if !progress {
            return moved;
        }
    }
    panic!("network never settled");
}

pub fn pump(wires: &[Wire]) -> usize {
    pump_with(wires, &mut |p| Some(p.to_vec()))
}

/// Fires every pending timer once. Returns whether any was due.
pub fn tick(wires: &[Wire]) -> bool {
    let mut fired = false;
    for wire in wires {
        for leg in [wire.left, wire.right] {
            let identity = &leg.endpoint.identity;
            if let Ok(Some(_)) = identity.next_timeout(leg.stream) {
                identity.handle_timeout(leg.stream).unwrap();
                fired = true;
            }
        }
    }
    fired
}

/// Pumps packets and fires timers until nothing is pending.
pub fn settle(wires: &[Wire]) {
    for _ in 0..100 {
        pump(wires);
        if !tick(wires) {
            return;
        }
    }
    panic!("handshake never settled");
}

/// Starts every leg and runs the handshakes to completion.
pub fn connect(wires: &[Wire]) {
    for wire in wires {
        wire.left.start();
        wire.right.start();
    }
    settle(wires);
}

/// Runs one single-stream call between two endpoints and returns both sides.
pub fn secure_call<'a>(
    a: &'a Endpoint,
    b: &'a Endpoint,
    profile: ZrtpProfile,
) -> (SessionHandle, SessionHandle, Wire<'a>) {
    let (sa, ha) = a.call(profile.clone(), SignalingRole::Initiator, 1);
    let (sb, hb) = b.call(profile, SignalingRole::Responder, 1);
    let wire = Wire::new(Leg::new(a, ha[0], 0xA000_0001), Leg::new(b, hb[0], 0xB000_0001));
    connect(&[wire]);
    assert_eq!(wire.left.state(), ZrtpState::Secure);
    assert_eq!(wire.right.state(), ZrtpState::Secure);
    (sa, sb, wire)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
