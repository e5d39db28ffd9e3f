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

//! The local ZRTP endpoint and its session and stream handles.

use crate::arena::{Arena, Index};
use crate::engine::ZrtpStream;
use crate::error::{ProtocolError, Result, ZrtpError};
use crate::events::{StreamOutput, ZrtpHost};
use crate::options::{ZrtpConfig, ZrtpProfile};
use crate::secrets::{SecretStatus, SharedSecrets};
use crate::session::{NegotiatedAlgorithms, SessionContext, ZrtpSession};
use crate::state::{HandshakePhase, MitmMode, Role, SignalingRole, StreamMode, ZrtpEvent, ZrtpState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zrtp_cache::{Zid, ZidCache};
use zrtp_crypto::{CryptoProvider, DefaultCryptoProvider, SasScheme};
use zrtp_proto::packets::HelloPacket;

static NEXT_IDENTITY: AtomicU32 = AtomicU32::new(1);

/// Refers to a session of one [`ZrtpIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub(crate) identity: u32,
    pub(crate) index: Index,
}

/// Refers to a stream within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub(crate) session: SessionHandle,
    pub(crate) index: Index,
}

impl StreamHandle {
    pub fn session(&self) -> SessionHandle {
        self.session
    }
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub zid: Zid,
    pub peer_zid: Option<Zid>,
    pub signaling_role: SignalingRole,
    /// First half of the rendered SAS; empty until keys exist.
    pub sas1: String,
    /// Second word of a Base256 SAS.
    pub sas2: String,
    pub sas_hash: Option<[u8; 32]>,
    pub sas_scheme: Option<SasScheme>,
    /// The SAS was replaced by a trusted MiTM.
    pub sas_relayed: bool,
    pub sas_verified: bool,
    pub secrets: SecretStatus,
    pub algorithms: Option<NegotiatedAlgorithms>,
    /// Lifetime agreed for the retained secret, in seconds.
    pub cache_ttl: u32,
    pub mitm_alert: bool,
    pub streams: usize,
}

impl SessionInfo {
    pub fn sas_is_ready(&self) -> bool {
        self.sas_hash.is_some()
    }
}

/// Snapshot of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub state: ZrtpState,
    pub phase: HandshakePhase,
    pub mode: StreamMode,
    pub mitm_mode: MitmMode,
    pub role: Role,
    pub ssrc: u32,
    pub peer_ssrc: Option<u32>,
    pub peer_client_id: Option<String>,
    pub peer_version: Option<String>,
    pub peer_mitm: bool,
    pub peer_passive: bool,
    pub peer_disclose: bool,
    pub allowclear: bool,
    pub secrets: SecretStatus,
    pub last_error: Option<ProtocolError>,
    pub dropped_packets: u32,
}

/// A local endpoint: one ZID, one cache, any number of sessions.
pub struct ZrtpIdentity {
    pub(crate) id: u32,
    zid: Zid,
    pub(crate) config: ZrtpConfig,
    cache: Arc<dyn ZidCache>,
    crypto: Arc<dyn CryptoProvider>,
    host: Arc<dyn ZrtpHost>,
    sessions: RwLock<Arena<Arc<Mutex<ZrtpSession>>>>,
    /// Host stream id (given to `stream_start`) to stream.
    pub(crate) routes: DashMap<u32, StreamHandle>,
}

impl ZrtpIdentity {
    /// Creates an identity with the default algorithms. The ZID comes from `cache`.
    pub fn new(config: ZrtpConfig, cache: Arc<dyn ZidCache>, host: Arc<dyn ZrtpHost>) -> Result<Self> {
        Self::with_crypto(config, cache, host, Arc::new(DefaultCryptoProvider))
    }

    pub fn with_crypto(
        config: ZrtpConfig,
        cache: Arc<dyn ZidCache>,
        host: Arc<dyn ZrtpHost>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self> {
        let zid = cache.load_or_create_zid()?;
        log::info!(
            "ZRTP identity {} ({}), trusted MiTM: {}",
            hex::encode(zid),
            config.client_id,
            config.is_mitm
        );
        Ok(Self {
            id: NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed),
            zid,
            config,
            cache,
            crypto,
            host,
            sessions: RwLock::new(Arena::new()),
            routes: DashMap::new(),
        })
    }

    pub fn zid(&self) -> Zid {
        self.zid
    }

    pub fn config(&self) -> &ZrtpConfig {
        &self.config
    }

    pub fn session_create(&self, profile: ZrtpProfile, role: SignalingRole) -> Result<SessionHandle> {
        profile.validate()?;
        let ctx = SessionContext {
            zid: self.zid,
            client_id: self.config.client_id_block(),
            is_mitm: self.config.is_mitm,
            cache_ttl: profile.cache_ttl,
            profile,
            signaling_role: role,
            crypto: self.crypto.clone(),
            cache: self.cache.clone(),
            peer_zid: None,
            secrets: SharedSecrets::new(),
            dh_owner: None,
            dh_commit_hvi: None,
            dh_done: false,
            zrtp_session: None,
            dh_kdf_context: Vec::new(),
            algorithms: None,
            sas: None,
            sas_verified: false,
            mitm_alert: false,
            pending_rs1: None,
        };
        let index = self
            .sessions
            .write()
            .insert(Arc::new(Mutex::new(ZrtpSession::new(ctx))));
        log::debug!("session created with signaling role {:?}", role);
        Ok(SessionHandle {
            identity: self.id,
            index,
        })
    }

    /// Creates a session with the profile from [`ZrtpConfig::default_profile`].
    pub fn session_create_default(&self, role: SignalingRole) -> Result<SessionHandle> {
        self.session_create(self.config.default_profile.clone(), role)
    }

    /// Destroys a session and all of its streams.
    pub fn session_destroy(&self, session: SessionHandle) -> Result<()> {
        self.check_owner(session)?;
        let removed = self
            .sessions
            .write()
            .remove(session.index)
            .ok_or(ZrtpError::NotFound("session"))?;
        {
            let mut guard = removed.lock();
            let ZrtpSession { ctx, streams } = &mut *guard;
            for (_, stream) in streams.iter_mut() {
                stream.stop(ctx);
            }
        }
        self.routes.retain(|_, handle| handle.session != session);
        log::debug!("session destroyed");
        Ok(())
    }

    pub fn session_info(&self, session: SessionHandle) -> Result<SessionInfo> {
        self.with_session(session, |s| {
            let ctx = &s.ctx;
            let (sas1, sas2) = ctx.sas.as_ref().map(|sas| sas.render()).unwrap_or_default();
            Ok(SessionInfo {
                zid: ctx.zid,
                peer_zid: ctx.peer_zid,
                signaling_role: ctx.signaling_role,
                sas1,
                sas2,
                sas_hash: ctx.sas.as_ref().map(|sas| sas.hash),
                sas_scheme: ctx.sas.as_ref().map(|sas| sas.scheme),
                sas_relayed: ctx.sas.as_ref().is_some_and(|sas| sas.relayed),
                sas_verified: ctx.sas_verified,
                secrets: ctx.secrets.status,
                algorithms: ctx.algorithms,
                cache_ttl: ctx.cache_ttl,
                mitm_alert: ctx.mitm_alert,
                streams: s.streams.len(),
            })
        })
    }

    /// True when every stream of the session is secure.
    pub fn session_is_secure(&self, session: SessionHandle) -> Result<bool> {
        self.with_session(session, |s| Ok(s.is_secure()))
    }

    /// Records whether the users compared the SAS successfully.
    ///
    /// Verifying releases a retained secret held back by a MiTM warning.
    pub fn set_verified(&self, session: SessionHandle, verified: bool) -> Result<()> {
        self.with_session(session, |s| {
            let ctx = &mut s.ctx;
            if ctx.sas.is_none() {
                return Err(ZrtpError::NotSecure);
            }
            ctx.store_verified(verified);
            if verified && ctx.mitm_alert {
                ctx.mitm_alert = false;
                if let Some(rs1) = ctx.pending_rs1.take() {
                    ctx.rotate_rs1(rs1);
                }
            }
            Ok(())
        })
    }

    /// Adds a stream to `session`; its Hello is prepared right away.
    pub fn stream_attach(&self, session: SessionHandle) -> Result<StreamHandle> {
        self.with_session(session, |s| {
            let max = s.ctx.profile.max_streams;
            if s.streams.len() >= max {
                return Err(ZrtpError::StreamLimit(max));
            }
            let ctx = &s.ctx;
            let index = s.streams.insert_with(|index| ZrtpStream::new(ctx, index));
            Ok(StreamHandle { session, index })
        })
    }

    /// Starts discovery. `ssrc` doubles as the stream id for [`Self::process_incoming`].
    pub fn stream_start(&self, stream: StreamHandle, ssrc: u32) -> Result<()> {
        self.start_stream(stream, ssrc, false)
    }

    pub(crate) fn start_stream(&self, stream: StreamHandle, ssrc: u32, registration: bool) -> Result<()> {
        self.with_stream(stream, |s, ctx| {
            if s.state != ZrtpState::Active {
                return Err(ZrtpError::WrongState(s.state));
            }
            match self.routes.entry(ssrc) {
                Entry::Occupied(route) if *route.get() != stream => {
                    return Err(ZrtpError::StreamIdInUse(ssrc));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(route) => {
                    route.insert(stream);
                }
            }
            s.start(ctx, ssrc, registration)
        })
    }

    /// Removes a stream from its session.
    pub fn stream_stop(&self, stream: StreamHandle) -> Result<()> {
        self.with_session(stream.session, |s| {
            let mut removed = s
                .streams
                .remove(stream.index)
                .ok_or(ZrtpError::NotFound("stream"))?;
            removed.stop(&mut s.ctx);
            Ok(())
        })?;
        self.routes.retain(|_, handle| *handle != stream);
        Ok(())
    }

    /// Starts the key exchange on a clear stream.
    pub fn stream_secure(&self, stream: StreamHandle) -> Result<()> {
        self.with_stream(stream, |s, ctx| s.request_secure(ctx))
    }

    /// Sends GoClear, or confirms a GoClear received from the peer.
    pub fn stream_clear(&self, stream: StreamHandle) -> Result<()> {
        self.with_stream(stream, |s, ctx| s.request_clear(ctx))
    }

    pub fn stream_info(&self, stream: StreamHandle) -> Result<StreamInfo> {
        self.with_stream(stream, |s, ctx| {
            let peer: Option<&HelloPacket> = s.peer_hello.as_ref();
            Ok(StreamInfo {
                state: s.state,
                phase: s.state.phase(),
                mode: s.mode,
                mitm_mode: s.mitm_mode,
                role: s.role,
                ssrc: s.ssrc,
                peer_ssrc: s.peer_ssrc,
                peer_client_id: peer.map(|h| String::from_utf8_lossy(&h.client_id).trim_end().to_string()),
                peer_version: peer.map(|h| String::from_utf8_lossy(&h.version).to_string()),
                peer_mitm: peer.is_some_and(|h| h.is_mitm()),
                peer_passive: peer.is_some_and(|h| h.is_passive()),
                peer_disclose: s.peer_disclose,
                allowclear: ctx.profile.allowclear && s.peer_allowclear,
                secrets: s.secrets,
                last_error: s.last_error,
                dropped_packets: s.dropped,
            })
        })
    }

    /// Hash of our Hello on `stream`, to be sent over signaling.
    pub fn signaling_hash_get(&self, stream: StreamHandle) -> Result<Vec<u8>> {
        self.with_stream(stream, |s, ctx| Ok(s.hello_hash(ctx.crypto.hash())))
    }

    /// Hash the peer's Hello must have. Only accepted before the stream starts.
    pub fn signaling_hash_set(&self, stream: StreamHandle, hash: &[u8]) -> Result<()> {
        let expected: [u8; 32] = hash
            .try_into()
            .map_err(|_| ZrtpError::BadParam(format!("signaling hash must be 32 bytes, got {}", hash.len())))?;
        self.with_stream(stream, |s, _| s.set_signaling_hash(expected))
    }

    /// The `a=zrtp-hash` SDP attribute value: version and hex encoded hash.
    pub fn signaling_hash_attribute(&self, stream: StreamHandle) -> Result<String> {
        let hash = self.signaling_hash_get(stream)?;
        Ok(format!(
            "{} {}",
            String::from_utf8_lossy(&HelloPacket::VERSION),
            hex::encode(hash)
        ))
    }

    /// Parses an `a=zrtp-hash` attribute value received from the peer.
    pub fn signaling_hash_set_attribute(&self, stream: StreamHandle, attribute: &str) -> Result<()> {
        let encoded = attribute.split_whitespace().last().unwrap_or_default();
        let hash = hex::decode(encoded)
            .map_err(|e| ZrtpError::BadParam(format!("signaling hash: {}", e)))?;
        self.signaling_hash_set(stream, &hash)
    }

    /// Must be called when the delay returned by [`Self::next_timeout`] elapsed.
    pub fn handle_timeout(&self, stream: StreamHandle) -> Result<()> {
        self.with_stream(stream, |s, ctx| {
            s.handle_event(ctx, ZrtpEvent::Timeout, None);
            Ok(())
        })
    }

    /// Delay until the stream wants [`Self::handle_timeout`], if it has a timer running.
    pub fn next_timeout(&self, stream: StreamHandle) -> Result<Option<Duration>> {
        self.with_stream(stream, |s, _| Ok(s.next_timeout()))
    }

    fn check_owner(&self, session: SessionHandle) -> Result<()> {
        if session.identity != self.id {
            return Err(ZrtpError::ForeignHandle);
        }
        Ok(())
    }

    /// Runs `f` on a locked session, then delivers what its streams produced.
    ///
    /// Host callbacks run after the session lock is released.
    pub(crate) fn with_session<R>(
        &self,
        session: SessionHandle,
        f: impl FnOnce(&mut ZrtpSession) -> Result<R>,
    ) -> Result<R> {
        self.check_owner(session)?;
        let shared = self
            .sessions
            .read()
            .get(session.index)
            .cloned()
            .ok_or(ZrtpError::NotFound("session"))?;
        let (result, outputs) = {
            let mut guard = shared.lock();
            let result = f(&mut guard);
            guard.kick_waiting();
            (result, guard.drain_outputs())
        };
        self.deliver(session, outputs);
        result
    }

    pub(crate) fn with_stream<R>(
        &self,
        stream: StreamHandle,
        f: impl FnOnce(&mut ZrtpStream, &mut SessionContext) -> Result<R>,
    ) -> Result<R> {
        self.with_session(stream.session, |s| {
            let target = s
                .streams
                .get_mut(stream.index)
                .ok_or(ZrtpError::NotFound("stream"))?;
            f(target, &mut s.ctx)
        })
    }

    fn deliver(&self, session: SessionHandle, outputs: Vec<(Index, StreamOutput)>) {
        for (index, output) in outputs {
            let stream = StreamHandle { session, index };
            match output {
                StreamOutput::Packet(packet) => self.host.send_packet(stream, &packet),
                StreamOutput::Event(event) => self.host.on_event(stream, event),
                StreamOutput::State(state) => self.host.on_state_change(stream, state),
            }
        }
    }
}

impl std::fmt::Debug for ZrtpIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZrtpIdentity")
            .field("zid", &hex::encode(self.zid))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
