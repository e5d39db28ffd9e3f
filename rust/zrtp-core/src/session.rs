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

//! State shared by the streams of one call.

use crate::arena::{Arena, Index};
use crate::engine::ZrtpStream;
use crate::events::StreamOutput;
use crate::options::ZrtpProfile;
use crate::secrets::SharedSecrets;
use crate::state::SignalingRole;
use std::sync::Arc;
use zrtp_cache::{RetainedSecret, Zid, ZidCache};
use zrtp_crypto::{CryptoProvider, SasScheme};

/// Algorithms agreed in the Commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    pub hash: [u8; 4],
    pub cipher: [u8; 4],
    pub auth_tag: [u8; 4],
    pub key_agreement: [u8; 4],
    pub sas: SasScheme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SasValue {
    pub hash: [u8; 32],
    pub scheme: SasScheme,
    pub relayed: bool,
}

impl SasValue {
    pub fn render(&self) -> (String, String) {
        self.scheme.render(&self.hash)
    }
}

/// Everything a stream reads or writes beyond its own handshake.
pub(crate) struct SessionContext {
    pub zid: Zid,
    pub client_id: [u8; 16],
    pub is_mitm: bool,
    pub profile: ZrtpProfile,
    pub signaling_role: SignalingRole,
    pub crypto: Arc<dyn CryptoProvider>,
    pub cache: Arc<dyn ZidCache>,

    pub peer_zid: Option<Zid>,
    pub secrets: SharedSecrets,
    /// Stream running the DH exchange of this session, if one is in progress.
    pub dh_owner: Option<Index>,
    /// hvi of our outstanding DH Commit, compared against DH Commits on other streams.
    pub dh_commit_hvi: Option<[u8; 32]>,
    /// A DH stream reached Secure, so further streams may use Multistream.
    pub dh_done: bool,
    pub zrtp_session: Option<Vec<u8>>,
    /// KDF context of the DH stream, used for the PBX secret.
    pub dh_kdf_context: Vec<u8>,
    pub algorithms: Option<NegotiatedAlgorithms>,
    pub sas: Option<SasValue>,
    pub sas_verified: bool,
    /// Cached secrets did not match; the new RS1 is held until the SAS is verified.
    pub mitm_alert: bool,
    pub pending_rs1: Option<RetainedSecret>,
    /// Lifetime agreed with the peer for the next RS1.
    pub cache_ttl: u32,
}

impl SessionContext {
    /// Loads the retained secrets once the peer is known.
    pub fn load_secrets(&mut self) {
        if self.secrets.is_loaded() {
            return;
        }
        if let Some(peer) = self.peer_zid {
            let aux = self.profile.aux_secret.clone();
            self.secrets
                .load(self.cache.as_ref(), &self.zid, &peer, aux.as_deref());
            self.sas_verified = self.secrets.verified;
        }
    }

    /// Persists the verified flag; the cache entry is created on demand.
    pub fn store_verified(&mut self, verified: bool) {
        self.sas_verified = verified;
        let Some(peer) = self.peer_zid else {
            return;
        };
        if let Err(e) = self.cache.set_verified(&self.zid, &peer, verified) {
            log::error!("failed to store verified flag: {:#}", e);
        }
    }

    /// Writes a new RS1 to the cache.
    pub fn rotate_rs1(&mut self, rs1: RetainedSecret) {
        let Some(peer) = self.peer_zid else {
            return;
        };
        match self.cache.rotate(&self.zid, &peer, rs1) {
            Ok(()) => log::debug!("retained secret rotated for peer {}", hex::encode(peer)),
            Err(e) => log::error!("failed to rotate retained secret: {:#}", e),
        }
    }
}

pub(crate) struct ZrtpSession {
    pub ctx: SessionContext,
    pub streams: Arena<ZrtpStream>,
}

impl ZrtpSession {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            streams: Arena::new(),
        }
    }

    /// Lets streams that were waiting for the DH stream continue.
    pub fn kick_waiting(&mut self) {
        let ready = self.ctx.dh_done || self.ctx.dh_owner.is_none();
        if !ready {
            return;
        }
        for index in self.streams.indices() {
            if let Some(stream) = self.streams.get_mut(index) {
                if stream.is_waiting_for_session() {
                    stream.initiate_secure(&mut self.ctx);
                }
            }
        }
    }

    pub fn drain_outputs(&mut self) -> Vec<(Index, StreamOutput)> {
        let mut out = Vec::new();
        for (index, stream) in self.streams.iter_mut() {
            out.extend(stream.take_outputs().into_iter().map(|o| (index, o)));
        }
        out
    }

    /// Logical AND over all attached streams.
    pub fn is_secure(&self) -> bool {
        !self.streams.is_empty() && self.streams.iter().all(|(_, s)| s.state.is_secure())
    }
}
