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

use crate::arena::Index;
use crate::chain::{HashChain, PeerChain};
use crate::dispatch::{DropReason, PacketDisposition};
use crate::error::{ProtocolError, Result as ZrtpResult, ZrtpError};
use crate::events::{ProtocolEvent, SecurityEvent, StreamEvent, StreamOutput};
use crate::options::{
    COMMIT_DELAY, NO_ZRTP_QUICK_RETRIES, T1_CAP, T1_INITIAL, T2_CAP, T2_INITIAL, T2_MAX_RETRIES,
};
use crate::secrets::{SecretFlags, SecretStatus, SelectedSecrets};
use crate::session::{NegotiatedAlgorithms, SasValue, SessionContext};
use crate::state::{MitmMode, Role, SignalingRole, StreamMode, ZrtpEvent, ZrtpState};
use std::time::Duration;
use zrtp_cache::{RetainedSecret, Zid};
use zrtp_crypto::kdf::{
    derive_multistream_s0, derive_s0, derive_session_keys, kdf_context, truncated_mac, ZrtpKeys,
    KDF_STRING,
};
use zrtp_crypto::{constant_time_eq, random_array, DiffieHellman, Hash, SasScheme};
use zrtp_proto::packets::*;
use zrtp_proto::transport::{frame, unframe};

/// Why a message was not acted upon.
pub(crate) enum Reject {
    /// Ignore the message; the state machine is unchanged.
    Drop(&'static str),
    /// Abort the handshake with an Error packet.
    Fail(ProtocolError),
}

impl From<ProtocolError> for Reject {
    fn from(error: ProtocolError) -> Self {
        Reject::Fail(error)
    }
}

pub(crate) type Handled = std::result::Result<(), Reject>;

fn parsed<T>(result: nom::IResult<&[u8], T>) -> std::result::Result<T, Reject> {
    result.map(|(_, packet)| packet).map_err(|_| Reject::Drop("malformed message"))
}

/// Overwrites the trailing MAC of a Hello, Commit or DHPart.
fn seal(hash: &dyn Hash, key: &[u8; 32], mut message: Vec<u8>) -> Vec<u8> {
    let body = message.len() - MAC_LEN;
    let mac = truncated_mac(hash, key, &message[..body]);
    message[body..].copy_from_slice(&mac);
    message
}

fn ack(message_type: [u8; 8]) -> Vec<u8> {
    GenericAckPacket::new(message_type).to_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryKind {
    Hello,
    Commit,
    DhPart2,
    Confirm2,
    GoClear,
    Error,
    SasRelay,
    /// Not a retransmission: a signaling responder waiting before it commits.
    CommitDelay,
}

/// The one message a stream retransmits until it is answered.
pub(crate) struct RetryTask {
    kind: RetryKind,
    message: Vec<u8>,
    retries: u32,
    max_retries: u32,
    interval: Duration,
    cap: Duration,
}

impl RetryTask {
    fn new(kind: RetryKind, message: Vec<u8>, hello_max_retries: u32) -> Self {
        let (interval, cap, max_retries) = match kind {
            RetryKind::Hello => (T1_INITIAL, T1_CAP, hello_max_retries),
            RetryKind::CommitDelay => (COMMIT_DELAY, COMMIT_DELAY, 0),
            _ => (T2_INITIAL, T2_CAP, T2_MAX_RETRIES),
        };
        Self {
            kind,
            message,
            retries: 0,
            max_retries,
            interval,
            cap,
        }
    }
}

/// Protocol engine of one media stream.
///
/// Holds everything of a single handshake; what the streams of a call share
/// lives in [`SessionContext`] and is passed into every call.
pub(crate) struct ZrtpStream {
    pub(crate) index: Index,
    /// Current protocol state.
    pub state: ZrtpState,
    /// Current role (Initiator/Responder).
    pub role: Role,
    pub mode: StreamMode,
    pub mitm_mode: MitmMode,
    pub ssrc: u32,
    /// Sender SSRC seen in the peer's frames.
    pub peer_ssrc: Option<u32>,
    seq: u16,

    /// Hash chain (H0, H1, H2, H3).
    chain: HashChain,
    /// Our Hello as sent on the wire.
    hello: Vec<u8>,
    hello_acked: bool,
    signaling_hash: Option<[u8; 32]>,
    dh: Box<dyn DiffieHellman>,
    public_value: Option<Vec<u8>>,

    pub(crate) peer_hello: Option<HelloPacket>,
    peer_hello_bytes: Vec<u8>,
    peer_chain: Option<PeerChain>,

    commit: Option<CommitPacket>,
    commit_bytes: Vec<u8>,
    peer_commit: Option<CommitPacket>,
    peer_commit_bytes: Vec<u8>,
    own_dhpart: Vec<u8>,
    peer_dhpart: Vec<u8>,
    peer_confirm: Vec<u8>,

    pub(crate) algorithms: Option<NegotiatedAlgorithms>,
    /// Derived keys of this stream.
    pub(crate) keys: Option<ZrtpKeys>,
    pub secrets: SecretStatus,
    pub peer_disclose: bool,
    pub peer_allowclear: bool,
    pub last_error: Option<ProtocolError>,

    retry: Option<RetryTask>,
    last_reply: Option<Vec<u8>>,
    pub dropped: u32,
    /// Discovery is done and the stream wants to go secure as soon as it may.
    waiting: bool,
    commit_delayed: bool,
    outputs: Vec<StreamOutput>,
}

impl ZrtpStream {
    /// Creates a stream and prepares its Hello.
    pub fn new(ctx: &SessionContext, index: Index) -> Self {
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let chain = HashChain::generate(hash);

        let offer = AlgorithmOffer {
            hash: vec![hash.id()],
            cipher: vec![crypto.cipher().id()],
            auth_tag: crypto.auth_tag_ids(),
            key_agreement: vec![crypto.key_agreement_id(), KEY_AGREEMENT_MULT],
            sas: ctx.profile.sas_schemes.iter().map(|s| s.id()).collect(),
        };
        let flags = if ctx.is_mitm { HelloPacket::FLAG_MITM } else { 0 };
        let hello = HelloPacket::new(ctx.client_id, chain.h(3), ctx.zid, flags, offer);
        let hello = seal(hash, &chain.h(2), hello.to_bytes());

        Self {
            index,
            state: ZrtpState::Active,
            role: Role::None,
            mode: StreamMode::Unknown,
            mitm_mode: MitmMode::Unknown,
            ssrc: 0,
            peer_ssrc: None,
            seq: u16::from_be_bytes(random_array::<2>()),
            chain,
            hello,
            hello_acked: false,
            signaling_hash: None,
            dh: crypto.key_agreement(),
            public_value: None,
            peer_hello: None,
            peer_hello_bytes: Vec::new(),
            peer_chain: None,
            commit: None,
            commit_bytes: Vec::new(),
            peer_commit: None,
            peer_commit_bytes: Vec::new(),
            own_dhpart: Vec::new(),
            peer_dhpart: Vec::new(),
            peer_confirm: Vec::new(),
            algorithms: None,
            keys: None,
            secrets: SecretStatus::default(),
            peer_disclose: false,
            peer_allowclear: false,
            last_error: None,
            retry: None,
            last_reply: None,
            dropped: 0,
            waiting: false,
            commit_delayed: false,
            outputs: Vec::new(),
        }
    }

    /// Hash of our Hello, exchanged over signaling.
    pub fn hello_hash(&self, hash: &dyn Hash) -> Vec<u8> {
        hash.digest(&self.hello)
    }

    /// Sets the hash the peer's Hello is expected to have.
    pub fn set_signaling_hash(&mut self, expected: [u8; 32]) -> ZrtpResult<()> {
        if self.state != ZrtpState::Active {
            return Err(ZrtpError::WrongState(self.state));
        }
        self.signaling_hash = Some(expected);
        Ok(())
    }

    pub fn start(&mut self, ctx: &mut SessionContext, ssrc: u32, registration: bool) -> ZrtpResult<()> {
        if self.state != ZrtpState::Active {
            return Err(ZrtpError::WrongState(self.state));
        }
        self.ssrc = ssrc;
        if registration {
            self.mitm_mode = MitmMode::RegServer;
        }
        self.handle_event(ctx, ZrtpEvent::Start, None);
        Ok(())
    }

    /// Validates a frame and feeds its message to the state machine.
    pub fn receive(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> PacketDisposition {
        let (header, message) = match unframe(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("dropping frame: {}", e);
                self.dropped += 1;
                return PacketDisposition::Dropped(DropReason::Malformed);
            }
        };
        if let Some(ssrc) = self.peer_ssrc {
            if ssrc != header.ssrc {
                log::warn!("peer SSRC changed from {:#010x} to {:#010x}", ssrc, header.ssrc);
            }
        }
        self.peer_ssrc = Some(header.ssrc);

        let Some(message_type) = MessageType::peek(message) else {
            self.dropped += 1;
            return PacketDisposition::Dropped(DropReason::UnknownMessage);
        };
        if self.handle_event(ctx, message_type.into(), Some(message)) {
            PacketDisposition::Protocol
        } else {
            PacketDisposition::Dropped(DropReason::Unexpected)
        }
    }

    /// Primary entry point for protocol events. Handles state transitions.
    ///
    /// Returns `false` if a message was dropped without effect.
    pub fn handle_event(&mut self, ctx: &mut SessionContext, event: ZrtpEvent, packet: Option<&[u8]>) -> bool {
        log::trace!("stream event {:?} in state {:?}", event, self.state);
        let bytes = packet.unwrap_or_default();
        let result = match event {
            ZrtpEvent::Start => self.on_start(ctx),
            ZrtpEvent::HelloReceived => self.on_hello(ctx, bytes),
            ZrtpEvent::HelloAckReceived => self.on_hello_ack(ctx),
            ZrtpEvent::CommitReceived => self.on_commit(ctx, bytes),
            ZrtpEvent::DHPart1Received => self.on_dhpart1(ctx, bytes),
            ZrtpEvent::DHPart2Received => self.on_dhpart2(ctx, bytes),
            ZrtpEvent::Confirm1Received => self.on_confirm1(ctx, bytes),
            ZrtpEvent::Confirm2Received => self.on_confirm2(ctx, bytes),
            ZrtpEvent::Conf2AckReceived => self.on_conf2ack(ctx),
            ZrtpEvent::GoClearReceived => self.on_goclear(ctx, bytes),
            ZrtpEvent::ClearAckReceived => self.on_clear_ack(),
            ZrtpEvent::ErrorReceived => self.on_error(ctx, bytes),
            ZrtpEvent::ErrorAckReceived => self.on_error_ack(),
            ZrtpEvent::SasRelayReceived => self.on_sas_relay(ctx, bytes),
            ZrtpEvent::RelayAckReceived => self.on_relay_ack(),
            ZrtpEvent::Timeout => self.on_timeout(ctx),
        };
        match result {
            Ok(()) => true,
            Err(Reject::Drop(reason)) => {
                log::debug!("dropping {:?} in state {:?}: {}", event, self.state, reason);
                self.dropped += 1;
                false
            }
            Err(Reject::Fail(error)) => {
                self.fail(ctx, error);
                true
            }
        }
    }

    pub fn next_timeout(&self) -> Option<Duration> {
        self.retry.as_ref().map(|task| task.interval)
    }

    pub fn take_outputs(&mut self) -> Vec<StreamOutput> {
        std::mem::take(&mut self.outputs)
    }

    pub fn is_waiting_for_session(&self) -> bool {
        self.waiting
            && self.state == ZrtpState::Clear
            && !matches!(&self.retry, Some(task) if task.kind == RetryKind::CommitDelay)
    }

    /// Called before the stream is removed from its session.
    pub fn stop(&mut self, ctx: &mut SessionContext) {
        self.release(ctx);
        self.retry = None;
    }

    /// Host request to start the key exchange on a clear stream.
    pub fn request_secure(&mut self, ctx: &mut SessionContext) -> ZrtpResult<()> {
        if self.state != ZrtpState::Clear {
            return Err(ZrtpError::WrongState(self.state));
        }
        self.waiting = true;
        self.initiate_secure(ctx);
        Ok(())
    }

    /// Host request to go clear, or confirmation of the peer's request.
    pub fn request_clear(&mut self, ctx: &mut SessionContext) -> ZrtpResult<()> {
        match self.state {
            ZrtpState::Secure => {
                if !(ctx.profile.allowclear && self.peer_allowclear) {
                    return Err(ZrtpError::ClearNotAllowed);
                }
                let crypto = ctx.crypto.clone();
                let keys = self.keys.as_ref().ok_or(ZrtpError::NotSecure)?;
                let (_, mac_key) = self.own_keys(keys);
                let clear_hmac = truncated_mac(crypto.hash(), mac_key, &GoClearPacket::MESSAGE_TYPE);
                let message = GoClearPacket::new(clear_hmac).to_bytes();
                self.send_retried(ctx, RetryKind::GoClear, message);
                self.set_state(ZrtpState::InitiatingClear);
                Ok(())
            }
            ZrtpState::PendingClear => {
                self.send(&ack(GenericAckPacket::MESSAGE_TYPE_CLEAR_ACK));
                self.go_clear();
                Ok(())
            }
            state => Err(ZrtpError::WrongState(state)),
        }
    }

    fn on_start(&mut self, ctx: &mut SessionContext) -> Handled {
        let hello = self.hello.clone();
        self.send_retried(ctx, RetryKind::Hello, hello);
        self.set_state(ZrtpState::WaitHelloAck);
        Ok(())
    }

    fn on_hello(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        if matches!(
            self.state,
            ZrtpState::Active | ZrtpState::NoZrtp | ZrtpState::Error | ZrtpState::InitiatingError
        ) {
            return Err(Reject::Drop("Hello while not running"));
        }
        if self.peer_hello.is_some() {
            if bytes == self.peer_hello_bytes.as_slice() {
                self.send(&ack(GenericAckPacket::MESSAGE_TYPE_HELLO_ACK));
                return Ok(());
            }
            return Err(Reject::Drop("Hello differs from the first one"));
        }

        let hello = parsed(HelloPacket::parse(bytes))?;
        if &hello.version[..2] != b"1." {
            return Err(Reject::Fail(ProtocolError::UnsupportedVersion));
        }
        if hello.zid == ctx.zid {
            return Err(Reject::Fail(ProtocolError::EqualZid));
        }
        match ctx.peer_zid {
            Some(zid) if zid != hello.zid => return Err(Reject::Fail(ProtocolError::WrongZid)),
            _ => ctx.peer_zid = Some(hello.zid),
        }

        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let mut chain = PeerChain::new(hello.hash_h3);
        chain.expect_mac(hash, 2, MessageType::Hello, bytes)?;
        if let Some(expected) = self.signaling_hash {
            if !constant_time_eq(&hash.digest(bytes), &expected) {
                log::warn!("peer Hello does not match the signaled hash");
                self.alert(SecurityEvent::WrongSignalingHash);
            }
        }
        if hello.is_mitm() && self.mitm_mode == MitmMode::Unknown {
            self.mitm_mode = MitmMode::Client;
        }
        log::debug!(
            "peer Hello from {} ({})",
            hex::encode(hello.zid),
            String::from_utf8_lossy(&hello.client_id).trim_end()
        );
        self.peer_chain = Some(chain);
        self.peer_hello_bytes = bytes.to_vec();
        self.peer_hello = Some(hello);

        self.send(&ack(GenericAckPacket::MESSAGE_TYPE_HELLO_ACK));
        match self.state {
            ZrtpState::WaitHelloAck if self.hello_acked => self.discovery_done(ctx),
            ZrtpState::WaitHello => self.discovery_done(ctx),
            _ => {}
        }
        Ok(())
    }

    fn on_hello_ack(&mut self, ctx: &mut SessionContext) -> Handled {
        if self.state != ZrtpState::WaitHelloAck {
            // Late acks for retransmitted Hellos.
            return match self.state {
                ZrtpState::Active | ZrtpState::NoZrtp => Err(Reject::Drop("HelloACK while not running")),
                _ => Ok(()),
            };
        }
        self.hello_acked = true;
        self.retry = None;
        if self.peer_hello.is_some() {
            self.discovery_done(ctx);
        } else {
            self.set_state(ZrtpState::WaitHello);
        }
        Ok(())
    }

    fn discovery_done(&mut self, ctx: &mut SessionContext) {
        self.retry = None;
        self.set_state(ZrtpState::Clear);
        self.emit(ProtocolEvent::IsClear);
        if ctx.profile.autosecure {
            self.waiting = true;
            self.initiate_secure(ctx);
        }
    }

    fn peer_supports_multistream(&self) -> bool {
        self.peer_hello
            .as_ref()
            .is_some_and(|h| h.algorithms.key_agreement.contains(&KEY_AGREEMENT_MULT))
    }

    /// Sends our Commit if nothing in the session prevents it.
    pub fn initiate_secure(&mut self, ctx: &mut SessionContext) {
        if self.state != ZrtpState::Clear || !self.waiting {
            return;
        }
        if matches!(&self.retry, Some(task) if task.kind == RetryKind::CommitDelay) {
            return;
        }
        let result = if ctx.dh_done && ctx.zrtp_session.is_some() && self.peer_supports_multistream() {
            self.start_multistream_commit(ctx)
        } else if ctx.dh_owner.is_some_and(|owner| owner != self.index) {
            log::debug!("stream waits for the DH exchange of its session");
            return;
        } else if ctx.signaling_role == SignalingRole::Responder && !self.commit_delayed {
            self.retry = Some(RetryTask::new(RetryKind::CommitDelay, Vec::new(), 0));
            return;
        } else {
            self.start_dh_commit(ctx)
        };
        if let Err(reject) = result {
            match reject {
                Reject::Drop(reason) => log::warn!("cannot commit: {}", reason),
                Reject::Fail(error) => self.fail(ctx, error),
            }
        }
    }

    fn own_public_value(&mut self) -> std::result::Result<Vec<u8>, Reject> {
        if let Some(pv) = &self.public_value {
            return Ok(pv.clone());
        }
        let pv = self.dh.generate_keypair().map_err(|e| {
            log::error!("key agreement failed: {:#}", e);
            Reject::Fail(ProtocolError::CriticalSoftware)
        })?;
        self.public_value = Some(pv.clone());
        Ok(pv)
    }

    fn start_dh_commit(&mut self, ctx: &mut SessionContext) -> Handled {
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let peer = self.peer_hello.as_ref().ok_or(Reject::Drop("no peer Hello"))?;
        let algorithms = negotiate(ctx, &peer.algorithms)?;

        ctx.load_secrets();
        let pv = self.own_public_value()?;
        let ids = ctx.secrets.local_ids(hash, Role::Initiator);
        let dh2 = DHPartPacket::new(DHPartPacket::MESSAGE_TYPE_DH2, self.chain.h(1), ids, pv);
        let dh2 = seal(hash, &self.chain.h(0), dh2.to_bytes());

        let mut hvi_input = dh2.clone();
        hvi_input.extend_from_slice(&self.peer_hello_bytes);
        let mut hvi = [0u8; 32];
        hvi.copy_from_slice(&hash.digest(&hvi_input)[..32]);

        let commit = self.build_commit(ctx, &algorithms, CommitValue::Hvi(hvi));
        let bytes = seal(hash, &self.chain.h(1), commit.to_bytes());

        self.role = Role::Initiator;
        self.mode = StreamMode::Dh;
        self.algorithms = Some(algorithms);
        self.own_dhpart = dh2;
        self.commit = Some(commit);
        self.commit_bytes = bytes.clone();
        self.waiting = false;
        ctx.dh_owner = Some(self.index);
        ctx.dh_commit_hvi = Some(hvi);

        self.send_retried(ctx, RetryKind::Commit, bytes);
        self.set_state(ZrtpState::InitiatingSecure);
        self.emit(ProtocolEvent::IsInitiatingSecure);
        Ok(())
    }

    fn start_multistream_commit(&mut self, ctx: &mut SessionContext) -> Handled {
        let crypto = ctx.crypto.clone();
        let mut algorithms = ctx.algorithms.ok_or(Reject::Drop("session has no algorithms"))?;
        algorithms.key_agreement = KEY_AGREEMENT_MULT;

        let commit = self.build_commit(ctx, &algorithms, CommitValue::Nonce(random_array::<16>()));
        let bytes = seal(crypto.hash(), &self.chain.h(1), commit.to_bytes());

        self.role = Role::Initiator;
        self.mode = StreamMode::Multistream;
        self.algorithms = Some(algorithms);
        self.commit = Some(commit);
        self.commit_bytes = bytes.clone();
        self.waiting = false;

        self.send_retried(ctx, RetryKind::Commit, bytes);
        self.set_state(ZrtpState::InitiatingSecure);
        self.emit(ProtocolEvent::IsInitiatingSecure);
        Ok(())
    }

    fn build_commit(&self, ctx: &SessionContext, algorithms: &NegotiatedAlgorithms, value: CommitValue) -> CommitPacket {
        CommitPacket {
            header: CommitPacket::header_for(&value),
            hash_h2: self.chain.h(2),
            zid: ctx.zid,
            hash_alg: algorithms.hash,
            cipher_alg: algorithms.cipher,
            auth_tag_alg: algorithms.auth_tag,
            key_agreement_alg: algorithms.key_agreement,
            sas_alg: algorithms.sas.id(),
            value,
            mac: [0u8; 8],
        }
    }

    fn on_commit(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        match self.state {
            ZrtpState::WaitHelloAck | ZrtpState::WaitHello if self.peer_hello.is_some() => {
                // A Commit implies the peer saw our Hello.
                self.hello_acked = true;
                self.retry = None;
                self.set_state(ZrtpState::Clear);
            }
            ZrtpState::Clear | ZrtpState::InitiatingSecure => {}
            ZrtpState::PendingSecure | ZrtpState::WaitConfirm2
                if bytes == self.peer_commit_bytes.as_slice() =>
            {
                self.resend_reply();
                return Ok(());
            }
            _ => return Err(Reject::Drop("Commit not expected")),
        }

        let commit = parsed(CommitPacket::parse(bytes))?;
        if Some(commit.zid) != ctx.peer_zid {
            return Err(Reject::Fail(ProtocolError::WrongZid));
        }
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let chain = self.peer_chain.as_mut().ok_or(Reject::Drop("no peer Hello"))?;
        chain.reveal(hash, commit.hash_h2, 2)?;
        chain.expect_mac(hash, 1, MessageType::Commit, bytes)?;

        if self.state == ZrtpState::InitiatingSecure {
            if self.wins_contention(&commit) {
                log::debug!("both sides committed, ours wins");
                return Ok(());
            }
            log::debug!("both sides committed, switching to responder");
            if self.mode == StreamMode::Dh && ctx.dh_owner == Some(self.index) {
                ctx.dh_commit_hvi = None;
            }
            self.commit = None;
            self.commit_bytes.clear();
        }
        self.retry = None;
        self.waiting = false;

        if commit.is_multistream() {
            self.accept_multistream_commit(ctx, commit, bytes)
        } else {
            self.accept_dh_commit(ctx, commit, bytes)
        }
    }

    /// Larger hvi or nonce wins; a DH Commit beats a Multistream one.
    fn wins_contention(&self, theirs: &CommitPacket) -> bool {
        let Some(ours) = &self.commit else {
            return false;
        };
        match (ours.is_multistream(), theirs.is_multistream()) {
            (false, true) => true,
            (true, false) => false,
            _ => ours.value.as_bytes() > theirs.value.as_bytes(),
        }
    }

    fn accept_dh_commit(&mut self, ctx: &mut SessionContext, commit: CommitPacket, bytes: &[u8]) -> Handled {
        if let Some(owner) = ctx.dh_owner {
            if owner != self.index {
                // Both sides started DH on different streams; the larger hvi keeps going.
                match &ctx.dh_commit_hvi {
                    Some(ours) if commit.value.as_bytes() > &ours[..] => {
                        log::debug!("peer DH Commit on another stream wins");
                    }
                    _ => return Err(Reject::Drop("another stream runs the DH exchange")),
                }
            }
        }
        let algorithms = validate_commit(ctx, &commit)?;
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();

        ctx.load_secrets();
        let pv = self.own_public_value()?;
        let ids = ctx.secrets.local_ids(hash, Role::Responder);
        let dh1 = DHPartPacket::new(DHPartPacket::MESSAGE_TYPE_DH1, self.chain.h(1), ids, pv);
        let dh1 = seal(hash, &self.chain.h(0), dh1.to_bytes());

        self.role = Role::Responder;
        self.mode = StreamMode::Dh;
        self.algorithms = Some(algorithms);
        self.peer_commit = Some(commit);
        self.peer_commit_bytes = bytes.to_vec();
        self.own_dhpart = dh1.clone();
        ctx.dh_owner = Some(self.index);
        ctx.dh_commit_hvi = None;

        self.reply(dh1);
        self.set_state(ZrtpState::PendingSecure);
        self.emit(ProtocolEvent::IsPendingSecure);
        Ok(())
    }

    fn accept_multistream_commit(&mut self, ctx: &mut SessionContext, commit: CommitPacket, bytes: &[u8]) -> Handled {
        let session_key = ctx
            .zrtp_session
            .clone()
            .ok_or(Reject::Fail(ProtocolError::NoSharedSecret))?;
        let peer_zid = ctx.peer_zid.ok_or(Reject::Drop("no peer ZID"))?;
        let algorithms = validate_commit(ctx, &commit)?;

        self.role = Role::Responder;
        self.mode = StreamMode::Multistream;
        self.algorithms = Some(algorithms);

        let mut transcript = self.hello.clone();
        transcript.extend_from_slice(bytes);
        let total_hash = ctx.crypto.hash().digest(&transcript);
        let zid = ctx.zid;
        self.derive_multistream_keys(ctx, &session_key, &total_hash, &peer_zid, &zid);

        self.peer_commit = Some(commit);
        self.peer_commit_bytes = bytes.to_vec();
        let confirm1 = self.build_confirm(ctx, ConfirmPacket::MESSAGE_TYPE_CONF1)?;
        self.reply(confirm1);
        self.set_state(ZrtpState::WaitConfirm2);
        self.emit(ProtocolEvent::IsPendingSecure);
        Ok(())
    }

    fn on_dhpart1(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        if self.state == ZrtpState::WaitConfirm1 && bytes == self.peer_dhpart.as_slice() {
            return Ok(());
        }
        if self.state != ZrtpState::InitiatingSecure || self.mode != StreamMode::Dh {
            return Err(Reject::Drop("DHPart1 not expected"));
        }
        if ctx.dh_owner != Some(self.index) {
            return Err(Reject::Drop("DH exchange moved to another stream"));
        }
        let dh1 = parsed(DHPartPacket::parse(bytes))?;
        if dh1.public_value.len() != self.dh.public_key_len() {
            return Err(Reject::Fail(ProtocolError::BadDhValue));
        }
        let peer_zid = ctx.peer_zid.ok_or(Reject::Drop("no peer ZID"))?;
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let chain = self.peer_chain.as_mut().ok_or(Reject::Drop("no peer Hello"))?;
        chain.reveal(hash, dh1.hash_h1, 1)?;
        chain.expect_mac(hash, 0, MessageType::DHPart1, bytes)?;

        let shared = self.dh.compute_shared_secret(&dh1.public_value).map_err(|e| {
            log::warn!("rejecting peer public value: {:#}", e);
            Reject::Fail(ProtocolError::BadDhValue)
        })?;
        self.retry = None;
        let selected = ctx.secrets.negotiate(hash, &dh1.ids, Role::Responder);

        let mut transcript = self.peer_hello_bytes.clone();
        transcript.extend_from_slice(&self.commit_bytes);
        transcript.extend_from_slice(bytes);
        transcript.extend_from_slice(&self.own_dhpart);
        let total_hash = hash.digest(&transcript);
        let zid = ctx.zid;
        self.derive_dh_keys(ctx, &shared, &total_hash, &zid, &peer_zid, selected);
        self.peer_dhpart = bytes.to_vec();

        let dh2 = self.own_dhpart.clone();
        self.send_retried(ctx, RetryKind::DhPart2, dh2);
        self.set_state(ZrtpState::WaitConfirm1);
        Ok(())
    }

    fn on_dhpart2(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        if self.state == ZrtpState::WaitConfirm2 && bytes == self.peer_dhpart.as_slice() {
            self.resend_reply();
            return Ok(());
        }
        if self.state != ZrtpState::PendingSecure {
            return Err(Reject::Drop("DHPart2 not expected"));
        }
        let dh2 = parsed(DHPartPacket::parse(bytes))?;
        if dh2.public_value.len() != self.dh.public_key_len() {
            return Err(Reject::Fail(ProtocolError::BadDhValue));
        }
        let peer_zid = ctx.peer_zid.ok_or(Reject::Drop("no peer ZID"))?;
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let chain = self.peer_chain.as_mut().ok_or(Reject::Drop("no peer Hello"))?;
        chain.reveal(hash, dh2.hash_h1, 1)?;
        chain.expect_mac(hash, 0, MessageType::DHPart2, bytes)?;

        let expected = match self.peer_commit.as_ref().map(|c| &c.value) {
            Some(CommitValue::Hvi(hvi)) => *hvi,
            _ => return Err(Reject::Drop("no DH Commit to check against")),
        };
        let mut hvi_input = bytes.to_vec();
        hvi_input.extend_from_slice(&self.hello);
        if !constant_time_eq(&hash.digest(&hvi_input)[..32], &expected) {
            return Err(Reject::Fail(ProtocolError::HviMismatch));
        }

        let shared = self.dh.compute_shared_secret(&dh2.public_value).map_err(|e| {
            log::warn!("rejecting peer public value: {:#}", e);
            Reject::Fail(ProtocolError::BadDhValue)
        })?;
        let selected = ctx.secrets.negotiate(hash, &dh2.ids, Role::Initiator);

        let mut transcript = self.hello.clone();
        transcript.extend_from_slice(&self.peer_commit_bytes);
        transcript.extend_from_slice(&self.own_dhpart);
        transcript.extend_from_slice(bytes);
        let total_hash = hash.digest(&transcript);
        let zid = ctx.zid;
        self.derive_dh_keys(ctx, &shared, &total_hash, &peer_zid, &zid, selected);
        self.peer_dhpart = bytes.to_vec();

        let confirm1 = self.build_confirm(ctx, ConfirmPacket::MESSAGE_TYPE_CONF1)?;
        self.reply(confirm1);
        self.set_state(ZrtpState::WaitConfirm2);
        Ok(())
    }

    fn derive_dh_keys(
        &mut self,
        ctx: &mut SessionContext,
        shared: &[u8],
        total_hash: &[u8],
        zid_i: &Zid,
        zid_r: &Zid,
        selected: SelectedSecrets,
    ) {
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let s0 = derive_s0(
            hash,
            shared,
            KDF_STRING,
            zid_i,
            zid_r,
            total_hash,
            selected.s1.as_deref(),
            selected.s2.as_deref(),
            selected.s3.as_deref(),
        );
        let context = kdf_context(zid_i, zid_r, total_hash);
        let keys = derive_session_keys(hash, &s0, &context, crypto.cipher().key_len());

        let mut sas_hash = [0u8; 32];
        sas_hash.copy_from_slice(&keys.sas_hash[..32]);
        let scheme = self.algorithms.map(|a| a.sas).unwrap_or(SasScheme::Base32);
        ctx.sas = Some(SasValue {
            hash: sas_hash,
            scheme,
            relayed: false,
        });
        ctx.zrtp_session = Some(keys.zrtp_session.clone());
        ctx.dh_kdf_context = context;
        ctx.algorithms = self.algorithms;
        self.secrets = ctx.secrets.status;
        self.keys = Some(keys);
    }

    fn derive_multistream_keys(
        &mut self,
        ctx: &SessionContext,
        session_key: &[u8],
        total_hash: &[u8],
        zid_i: &Zid,
        zid_r: &Zid,
    ) {
        let crypto = ctx.crypto.clone();
        let hash = crypto.hash();
        let context = kdf_context(zid_i, zid_r, total_hash);
        let s0 = derive_multistream_s0(hash, session_key, &context);
        self.keys = Some(derive_session_keys(hash, &s0, &context, crypto.cipher().key_len()));
        self.secrets = ctx.secrets.status;
    }

    /// Confirm key and MAC key we send with.
    pub(crate) fn own_keys<'k>(&self, keys: &'k ZrtpKeys) -> (&'k [u8], &'k [u8]) {
        match self.role {
            Role::Responder => (&keys.confirm_key_r, &keys.mac_key_r),
            _ => (&keys.confirm_key_i, &keys.mac_key_i),
        }
    }

    /// Confirm key and MAC key the peer sends with.
    pub(crate) fn peer_keys<'k>(&self, keys: &'k ZrtpKeys) -> (&'k [u8], &'k [u8]) {
        match self.role {
            Role::Responder => (&keys.confirm_key_i, &keys.mac_key_i),
            _ => (&keys.confirm_key_r, &keys.mac_key_r),
        }
    }

    fn build_confirm(&self, ctx: &SessionContext, message_type: [u8; 8]) -> std::result::Result<Vec<u8>, Reject> {
        let keys = self.keys.as_ref().ok_or(Reject::Fail(ProtocolError::CriticalSoftware))?;
        let (confirm_key, mac_key) = self.own_keys(keys);

        let mut flags = 0;
        if self.mitm_mode == MitmMode::RegServer {
            flags |= ConfirmPacket::FLAG_ENROLLMENT;
        }
        if ctx.sas_verified {
            flags |= ConfirmPacket::FLAG_SAS_VERIFIED;
        }
        if ctx.profile.allowclear {
            flags |= ConfirmPacket::FLAG_ALLOW_CLEAR;
        }
        if ctx.profile.disclose_bit {
            flags |= ConfirmPacket::FLAG_DISCLOSE;
        }

        let mut confirm = ConfirmPacket::new(message_type, self.chain.h(0), flags, ctx.profile.cache_ttl);
        confirm.iv = random_array::<16>();
        let encrypted = ctx
            .crypto
            .cipher()
            .encrypt(confirm_key, &confirm.iv, &confirm.encrypted_part())
            .map_err(|e| {
                log::error!("Confirm encryption failed: {:#}", e);
                Reject::Fail(ProtocolError::CriticalSoftware)
            })?;
        confirm.set_encrypted_part(&encrypted);
        confirm.hmac = truncated_mac(ctx.crypto.hash(), mac_key, &encrypted);
        Ok(confirm.to_bytes())
    }

    fn open_confirm(&self, ctx: &SessionContext, bytes: &[u8]) -> std::result::Result<ConfirmPacket, Reject> {
        let mut confirm = parsed(ConfirmPacket::parse(bytes))?;
        let keys = self.keys.as_ref().ok_or(Reject::Drop("no keys yet"))?;
        let (confirm_key, mac_key) = self.peer_keys(keys);

        let encrypted = confirm.encrypted_part();
        let expected = truncated_mac(ctx.crypto.hash(), mac_key, &encrypted);
        if !constant_time_eq(&expected, &confirm.hmac) {
            return Err(Reject::Fail(ProtocolError::ConfirmAuth));
        }
        let plain = ctx
            .crypto
            .cipher()
            .decrypt(confirm_key, &confirm.iv, &encrypted)
            .map_err(|_| Reject::Fail(ProtocolError::CriticalSoftware))?;
        if !confirm.set_encrypted_part(&plain) {
            return Err(Reject::Drop("bad Confirm length"));
        }
        Ok(confirm)
    }

    fn on_confirm1(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        match (self.state, self.mode) {
            (ZrtpState::WaitConfirm1, StreamMode::Dh) => {}
            (ZrtpState::InitiatingSecure, StreamMode::Multistream) => {
                let session_key = ctx.zrtp_session.clone().ok_or(Reject::Drop("no session key"))?;
                let peer_zid = ctx.peer_zid.ok_or(Reject::Drop("no peer ZID"))?;
                let mut transcript = self.peer_hello_bytes.clone();
                transcript.extend_from_slice(&self.commit_bytes);
                let total_hash = ctx.crypto.hash().digest(&transcript);
                let zid = ctx.zid;
                self.derive_multistream_keys(ctx, &session_key, &total_hash, &zid, &peer_zid);
            }
            (ZrtpState::WaitConfirmAck, _) => return Ok(()),
            _ => return Err(Reject::Drop("Confirm1 not expected")),
        }

        let confirm = self.open_confirm(ctx, bytes)?;
        let crypto = ctx.crypto.clone();
        let chain = self.peer_chain.as_mut().ok_or(Reject::Drop("no peer Hello"))?;
        chain.reveal(crypto.hash(), confirm.hash_h0, 0)?;
        self.apply_peer_confirm(ctx, &confirm)?;

        self.retry = None;
        let confirm2 = self.build_confirm(ctx, ConfirmPacket::MESSAGE_TYPE_CONF2)?;
        self.send_retried(ctx, RetryKind::Confirm2, confirm2);
        self.set_state(ZrtpState::WaitConfirmAck);
        Ok(())
    }

    fn on_confirm2(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        if self.state.is_secure() && bytes == self.peer_confirm.as_slice() {
            self.send(&ack(GenericAckPacket::MESSAGE_TYPE_CONF2_ACK));
            return Ok(());
        }
        if self.state != ZrtpState::WaitConfirm2 {
            return Err(Reject::Drop("Confirm2 not expected"));
        }
        let confirm = self.open_confirm(ctx, bytes)?;
        let crypto = ctx.crypto.clone();
        let chain = self.peer_chain.as_mut().ok_or(Reject::Drop("no peer Hello"))?;
        chain.reveal(crypto.hash(), confirm.hash_h0, 0)?;
        self.apply_peer_confirm(ctx, &confirm)?;

        self.peer_confirm = bytes.to_vec();
        self.send(&ack(GenericAckPacket::MESSAGE_TYPE_CONF2_ACK));
        self.enter_secure(ctx);
        Ok(())
    }

    fn on_conf2ack(&mut self, ctx: &mut SessionContext) -> Handled {
        match self.state {
            ZrtpState::WaitConfirmAck => {
                self.retry = None;
                self.enter_secure(ctx);
                Ok(())
            }
            state if state.is_secure() => Ok(()),
            _ => Err(Reject::Drop("Conf2ACK not expected")),
        }
    }

    fn apply_peer_confirm(&mut self, ctx: &mut SessionContext, confirm: &ConfirmPacket) -> Handled {
        let flags = confirm.flags;
        self.peer_disclose = flags & ConfirmPacket::FLAG_DISCLOSE != 0;
        self.peer_allowclear = flags & ConfirmPacket::FLAG_ALLOW_CLEAR != 0;
        if flags & ConfirmPacket::FLAG_ENROLLMENT != 0 {
            match self.mitm_mode {
                MitmMode::Client | MitmMode::RegClient => self.mitm_mode = MitmMode::RegClient,
                _ => {
                    log::warn!("enrollment offered by a peer that is not a trusted MiTM");
                    return Err(Reject::Fail(ProtocolError::UntrustedMitm));
                }
            }
        }
        if self.mode == StreamMode::Dh {
            if flags & ConfirmPacket::FLAG_SAS_VERIFIED == 0 && ctx.sas_verified {
                log::info!("peer has not verified the SAS, clearing our verified flag");
                ctx.store_verified(false);
            }
            ctx.cache_ttl = ctx.profile.cache_ttl.min(confirm.exp_time);
        }
        Ok(())
    }

    fn enter_secure(&mut self, ctx: &mut SessionContext) {
        self.retry = None;
        self.set_state(ZrtpState::Secure);
        self.emit(ProtocolEvent::IsSecure);
        if self.mode == StreamMode::Dh {
            self.finish_dh(ctx);
        } else {
            self.secrets = ctx.secrets.status;
        }
        self.emit(ProtocolEvent::IsSecureDone);
    }

    /// Reports the secret matching and updates the cache after a DH exchange.
    fn finish_dh(&mut self, ctx: &mut SessionContext) {
        if ctx.dh_owner == Some(self.index) {
            ctx.dh_owner = None;
        }
        ctx.dh_commit_hvi = None;
        ctx.dh_done = true;

        let status = ctx.secrets.status;
        self.secrets = status;
        if !status.wrongs.is_empty() {
            log::warn!("cached secrets do not match: {:?}", status.wrongs);
            ctx.mitm_alert = true;
            self.alert(SecurityEvent::MitmWarning { wrongs: status.wrongs });
        }
        if status.cached.contains(SecretFlags::PBX) && !status.matches.contains(SecretFlags::PBX) {
            self.emit(ProtocolEvent::UserUnenrolled);
        }
        match self.mitm_mode {
            MitmMode::RegServer if status.matches.contains(SecretFlags::PBX) => {
                self.emit(ProtocolEvent::UserAlreadyEnrolled);
            }
            MitmMode::RegServer => {
                self.enroll(ctx);
                self.emit(ProtocolEvent::NewUserEnrolled);
            }
            MitmMode::RegClient => self.emit(ProtocolEvent::IsClientEnrollment),
            _ => {}
        }

        if ctx.cache_ttl == 0 {
            return;
        }
        if let Some(keys) = &self.keys {
            let rs1 = RetainedSecret::new(keys.new_rs1.clone(), ctx.cache_ttl);
            if ctx.mitm_alert {
                log::warn!("holding back the new retained secret until the SAS is verified");
                ctx.pending_rs1 = Some(rs1);
            } else {
                ctx.rotate_rs1(rs1);
            }
        }
    }

    fn on_goclear(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        match self.state {
            ZrtpState::PendingClear => return Ok(()),
            ZrtpState::Clear if self.keys.is_none() && self.role == Role::None => {
                // Our ClearACK was lost.
                self.send(&ack(GenericAckPacket::MESSAGE_TYPE_CLEAR_ACK));
                return Ok(());
            }
            ZrtpState::Secure | ZrtpState::SasRelaying => {}
            _ => return Err(Reject::Drop("GoClear not expected")),
        }
        let packet = parsed(GoClearPacket::parse(bytes))?;
        let keys = self.keys.as_ref().ok_or(Reject::Drop("no keys"))?;
        let (_, mac_key) = self.peer_keys(keys);
        let expected = truncated_mac(ctx.crypto.hash(), mac_key, &GoClearPacket::MESSAGE_TYPE);
        if !constant_time_eq(&expected, &packet.clear_hmac) {
            return Err(Reject::Fail(ProtocolError::WrongMessageMac));
        }
        if !ctx.profile.allowclear {
            return Err(Reject::Fail(ProtocolError::GoClearNotAllowed));
        }
        self.retry = None;
        self.set_state(ZrtpState::PendingClear);
        self.emit(ProtocolEvent::IsPendingClear);
        Ok(())
    }

    fn on_clear_ack(&mut self) -> Handled {
        match self.state {
            ZrtpState::InitiatingClear => {
                self.retry = None;
                self.go_clear();
                Ok(())
            }
            ZrtpState::Clear => Ok(()),
            _ => Err(Reject::Drop("ClearACK not expected")),
        }
    }

    /// Drops the keys of the finished exchange; a later Commit starts over.
    fn go_clear(&mut self) {
        self.keys = None;
        self.role = Role::None;
        self.mode = StreamMode::Unknown;
        self.commit = None;
        self.commit_bytes.clear();
        self.peer_commit = None;
        self.peer_commit_bytes.clear();
        self.own_dhpart.clear();
        self.peer_dhpart.clear();
        self.peer_confirm.clear();
        self.last_reply = None;
        self.waiting = false;
        if let Some(chain) = self.peer_chain.as_mut() {
            chain.rewind();
        }
        self.set_state(ZrtpState::Clear);
        self.emit(ProtocolEvent::IsClear);
    }

    fn on_error(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        match self.state {
            ZrtpState::Active | ZrtpState::NoZrtp => return Err(Reject::Drop("Error while not running")),
            ZrtpState::Error => {
                self.send(&ack(GenericAckPacket::MESSAGE_TYPE_ERROR_ACK));
                return Ok(());
            }
            _ => {}
        }
        let packet = parsed(ErrorPacket::parse(bytes))?;
        let error = ProtocolError::from_code(packet.error_code);
        log::warn!("peer aborted the handshake: {}", error);

        self.release(ctx);
        self.retry = None;
        self.last_error = Some(error);
        self.send(&ack(GenericAckPacket::MESSAGE_TYPE_ERROR_ACK));
        self.set_state(ZrtpState::Error);
        self.alert(SecurityEvent::ProtocolError { error, remote: true });
        Ok(())
    }

    fn on_error_ack(&mut self) -> Handled {
        if self.state == ZrtpState::InitiatingError {
            self.retry = None;
            self.set_state(ZrtpState::Error);
        }
        Ok(())
    }

    fn on_timeout(&mut self, ctx: &mut SessionContext) -> Handled {
        let Some(task) = self.retry.as_mut() else {
            return Ok(());
        };
        if task.kind == RetryKind::Commit
            && self.mode == StreamMode::Dh
            && ctx.dh_owner != Some(self.index)
        {
            log::debug!("DH exchange moved to another stream, withdrawing our Commit");
            self.retry = None;
            self.commit = None;
            self.commit_bytes.clear();
            self.role = Role::None;
            self.mode = StreamMode::Unknown;
            self.waiting = true;
            self.set_state(ZrtpState::Clear);
            return Ok(());
        }

        if task.retries >= task.max_retries {
            let kind = task.kind;
            self.retry = None;
            return match kind {
                RetryKind::Hello => {
                    log::info!("no answer to Hello, peer does not speak ZRTP");
                    self.set_state(ZrtpState::NoZrtp);
                    self.emit(ProtocolEvent::NoZrtp);
                    Ok(())
                }
                RetryKind::CommitDelay => {
                    self.commit_delayed = true;
                    self.initiate_secure(ctx);
                    Ok(())
                }
                RetryKind::Error => {
                    self.set_state(ZrtpState::Error);
                    Ok(())
                }
                RetryKind::SasRelay => {
                    log::warn!("SASrelay was never acknowledged");
                    self.set_state(ZrtpState::Secure);
                    Ok(())
                }
                _ => Err(Reject::Fail(ProtocolError::Timeout)),
            };
        }

        task.retries += 1;
        task.interval = (task.interval * 2).min(task.cap);
        let (kind, retries, message) = (task.kind, task.retries, task.message.clone());
        log::trace!("retransmitting {:?}, attempt {}", kind, retries);
        self.send(&message);
        if kind == RetryKind::Hello && retries == NO_ZRTP_QUICK_RETRIES && self.peer_hello.is_none() {
            self.emit(ProtocolEvent::NoZrtpQuick);
        }
        Ok(())
    }

    /// Aborts the handshake with `error`.
    pub(crate) fn fail(&mut self, ctx: &mut SessionContext, error: ProtocolError) {
        if matches!(self.state, ZrtpState::Error | ZrtpState::InitiatingError) {
            return;
        }
        log::warn!("handshake failed in state {:?}: {}", self.state, error);
        self.release(ctx);
        self.last_error = Some(error);
        let message = ErrorPacket::new(error.code()).to_bytes();
        self.send_retried(ctx, RetryKind::Error, message);
        self.set_state(ZrtpState::InitiatingError);
        self.alert(SecurityEvent::ProtocolError { error, remote: false });
    }

    fn release(&mut self, ctx: &mut SessionContext) {
        if ctx.dh_owner == Some(self.index) {
            ctx.dh_owner = None;
            ctx.dh_commit_hvi = None;
        }
        self.waiting = false;
    }

    fn send(&mut self, message: &[u8]) {
        let packet = frame(self.seq, self.ssrc, message);
        self.seq = self.seq.wrapping_add(1);
        self.outputs.push(StreamOutput::Packet(packet));
    }

    pub(crate) fn send_retried(&mut self, ctx: &SessionContext, kind: RetryKind, message: Vec<u8>) {
        self.send(&message);
        self.retry = Some(RetryTask::new(kind, message, ctx.profile.hello_max_retries));
    }

    pub(crate) fn send_once(&mut self, message: &[u8]) {
        self.send(message);
    }

    /// Sends a reply that is repeated when the peer retransmits.
    fn reply(&mut self, message: Vec<u8>) {
        self.send(&message);
        self.last_reply = Some(message);
    }

    fn resend_reply(&mut self) {
        if let Some(message) = self.last_reply.clone() {
            self.send(&message);
        }
    }

    pub(crate) fn clear_retry(&mut self) {
        self.retry = None;
    }

    pub(crate) fn set_state(&mut self, state: ZrtpState) {
        if self.state == state {
            return;
        }
        log::debug!("stream {:#010x}: {:?} -> {:?}", self.ssrc, self.state, state);
        self.state = state;
        self.outputs.push(StreamOutput::State(state));
    }

    pub(crate) fn emit(&mut self, event: ProtocolEvent) {
        log::debug!("stream {:#010x}: {:?}", self.ssrc, event);
        self.outputs.push(StreamOutput::Event(StreamEvent::Protocol(event)));
    }

    pub(crate) fn alert(&mut self, event: SecurityEvent) {
        self.outputs.push(StreamOutput::Event(StreamEvent::Security(event)));
    }
}

/// Picks the first of our algorithms the peer offers; RFC 6189 mandatory
/// algorithms are implied even when not listed.
fn negotiate(ctx: &SessionContext, peer: &AlgorithmOffer) -> std::result::Result<NegotiatedAlgorithms, ProtocolError> {
    fn choose(ours: &[[u8; 4]], theirs: &[[u8; 4]], implied: Option<[u8; 4]>) -> Option<[u8; 4]> {
        ours.iter()
            .copied()
            .find(|id| theirs.contains(id) || Some(*id) == implied)
    }
    let crypto = ctx.crypto.as_ref();
    let hash = choose(&[crypto.hash().id()], &peer.hash, Some(*b"S256"))
        .ok_or(ProtocolError::UnsupportedHash)?;
    let cipher = choose(&[crypto.cipher().id()], &peer.cipher, Some(*b"AES1"))
        .ok_or(ProtocolError::UnsupportedCipher)?;
    let auth_tag = choose(&crypto.auth_tag_ids(), &peer.auth_tag, Some(*b"HS32"))
        .ok_or(ProtocolError::UnsupportedAuthTag)?;
    let key_agreement = choose(&[crypto.key_agreement_id()], &peer.key_agreement, None)
        .ok_or(ProtocolError::UnsupportedKeyAgreement)?;
    let ours: Vec<[u8; 4]> = ctx.profile.sas_schemes.iter().map(|s| s.id()).collect();
    let sas = choose(&ours, &peer.sas, Some(*b"B32 "))
        .and_then(|id| SasScheme::from_id(&id))
        .ok_or(ProtocolError::UnsupportedSas)?;
    Ok(NegotiatedAlgorithms {
        hash,
        cipher,
        auth_tag,
        key_agreement,
        sas,
    })
}

/// Checks that the peer's Commit only names algorithms we offered.
fn validate_commit(ctx: &SessionContext, commit: &CommitPacket) -> std::result::Result<NegotiatedAlgorithms, ProtocolError> {
    let crypto = ctx.crypto.as_ref();
    if commit.hash_alg != crypto.hash().id() {
        return Err(ProtocolError::UnsupportedHash);
    }
    if commit.cipher_alg != crypto.cipher().id() {
        return Err(ProtocolError::UnsupportedCipher);
    }
    if !crypto.auth_tag_ids().contains(&commit.auth_tag_alg) {
        return Err(ProtocolError::UnsupportedAuthTag);
    }
    if !commit.is_multistream() && commit.key_agreement_alg != crypto.key_agreement_id() {
        return Err(ProtocolError::UnsupportedKeyAgreement);
    }
    let sas = SasScheme::from_id(&commit.sas_alg)
        .filter(|s| ctx.profile.sas_schemes.contains(s))
        .ok_or(ProtocolError::UnsupportedSas)?;
    Ok(NegotiatedAlgorithms {
        hash: commit.hash_alg,
        cipher: commit.cipher_alg,
        auth_tag: commit.auth_tag_alg,
        key_agreement: commit.key_agreement_alg,
        sas,
    })
}
