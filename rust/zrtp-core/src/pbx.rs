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

//! Trusted MiTM (PBX) support: enrollment and SAS relaying.

use crate::engine::{Handled, Reject, RetryKind, ZrtpStream};
use crate::error::{ProtocolError, Result, ZrtpError};
use crate::events::ProtocolEvent;
use crate::identity::{StreamHandle, ZrtpIdentity};
use crate::secrets::SecretFlags;
use crate::session::{SasValue, SessionContext};
use crate::state::ZrtpState;
use zrtp_crypto::kdf::{derive_pbx_secret, truncated_mac};
use zrtp_crypto::{constant_time_eq, random_array, SasScheme};
use zrtp_proto::packets::{ConfirmPacket, GenericAckPacket, SasRelayPacket};

impl ZrtpStream {
    /// Computes the PBX secret of this call and stores it for the peer.
    ///
    /// Returns whether the secret was new.
    pub(crate) fn store_pbx_secret(&self, ctx: &SessionContext) -> Result<bool> {
        let peer = ctx.peer_zid.ok_or(ZrtpError::NotSecure)?;
        let session_key = ctx.zrtp_session.as_ref().ok_or(ZrtpError::NotSecure)?;
        let secret = derive_pbx_secret(ctx.crypto.hash(), session_key, &ctx.dh_kdf_context);
        Ok(ctx.cache.store_pbx_secret(&ctx.zid, &peer, &secret)?)
    }

    /// Registration on the PBX side, right after the enrollment call went secure.
    pub(crate) fn enroll(&mut self, ctx: &mut SessionContext) {
        match self.store_pbx_secret(ctx) {
            Ok(fresh) => log::info!("enrolled user, fresh secret: {}", fresh),
            Err(e) => log::error!("failed to store PBX secret: {}", e),
        }
    }

    /// Sends `sas` to the peer, encrypted with this stream's keys.
    pub(crate) fn relay_sas(&mut self, ctx: &SessionContext, sas: &SasValue) -> Result<()> {
        if !matches!(self.state, ZrtpState::Secure | ZrtpState::SasRelaying) {
            return Err(ZrtpError::NotSecure);
        }
        let keys = self.keys.as_ref().ok_or(ZrtpError::NotSecure)?;
        let (confirm_key, mac_key) = self.own_keys(keys);

        let flags = if ctx.sas_verified { ConfirmPacket::FLAG_SAS_VERIFIED } else { 0 };
        let mut relay = SasRelayPacket::new(flags, sas.scheme.id(), sas.hash);
        relay.iv = random_array::<16>();
        let encrypted = ctx
            .crypto
            .cipher()
            .encrypt(confirm_key, &relay.iv, &relay.encrypted_part())
            .map_err(|e| ZrtpError::Crypto(format!("{:#}", e)))?;
        relay.set_encrypted_part(&encrypted);
        relay.hmac = truncated_mac(ctx.crypto.hash(), mac_key, &encrypted);

        log::info!("relaying {} SAS to stream {:#010x}", sas.scheme.name(), self.ssrc);
        self.send_retried(ctx, RetryKind::SasRelay, relay.to_bytes());
        self.set_state(ZrtpState::SasRelaying);
        Ok(())
    }

    pub(crate) fn on_sas_relay(&mut self, ctx: &mut SessionContext, bytes: &[u8]) -> Handled {
        if !self.state.is_secure() {
            return Err(Reject::Drop("SASrelay on a stream that is not secure"));
        }
        let mut relay = SasRelayPacket::parse(bytes)
            .map(|(_, packet)| packet)
            .map_err(|_| Reject::Drop("malformed message"))?;
        let keys = self.keys.as_ref().ok_or(Reject::Drop("no keys"))?;
        let (confirm_key, mac_key) = self.peer_keys(keys);

        let encrypted = relay.encrypted_part();
        let expected = truncated_mac(ctx.crypto.hash(), mac_key, &encrypted);
        if !constant_time_eq(&expected, &relay.hmac) {
            return Err(Reject::Fail(ProtocolError::WrongMessageMac));
        }
        let plain = ctx
            .crypto
            .cipher()
            .decrypt(confirm_key, &relay.iv, &encrypted)
            .map_err(|_| Reject::Fail(ProtocolError::CriticalSoftware))?;
        if !relay.set_encrypted_part(&plain) {
            return Err(Reject::Drop("bad SASrelay length"));
        }

        self.send_once(&GenericAckPacket::new(GenericAckPacket::MESSAGE_TYPE_RELAY_ACK).to_bytes());

        let peer_is_mitm = self.peer_hello.as_ref().is_some_and(|h| h.is_mitm());
        if !peer_is_mitm || !ctx.secrets.status.matches.contains(SecretFlags::PBX) {
            log::warn!("ignoring SAS relayed by a MiTM we are not enrolled with");
            return Ok(());
        }
        let current = ctx.sas.as_ref().map(|s| s.scheme).unwrap_or(SasScheme::Base32);
        let value = SasValue {
            hash: relay.sas_hash,
            scheme: SasScheme::from_id(&relay.rendering).unwrap_or(current),
            relayed: true,
        };
        if ctx.sas.as_ref() != Some(&value) {
            ctx.sas = Some(value);
            self.emit(ProtocolEvent::LocalSasUpdated);
        }
        Ok(())
    }

    pub(crate) fn on_relay_ack(&mut self) -> Handled {
        if self.state == ZrtpState::SasRelaying {
            self.clear_retry();
            self.set_state(ZrtpState::Secure);
        }
        Ok(())
    }
}

impl ZrtpIdentity {
    /// Starts `stream` as the PBX side of an enrollment call.
    pub fn stream_start_registration(&self, stream: StreamHandle, ssrc: u32) -> Result<()> {
        if !self.config.is_mitm {
            return Err(ZrtpError::NotMitm);
        }
        self.start_stream(stream, ssrc, true)
    }

    /// Accepts the enrollment offered by the PBX on `stream`.
    ///
    /// A peer whose PBX secret already matched this call keeps it, so
    /// accepting again is a no-op.
    pub fn register_with_trusted_mitm(&self, stream: StreamHandle) -> Result<()> {
        self.with_stream(stream, |s, ctx| {
            if !s.state.is_secure() {
                return Err(ZrtpError::NotSecure);
            }
            if !s.peer_hello.as_ref().is_some_and(|h| h.is_mitm()) {
                return Err(ZrtpError::BadParam("peer is not a trusted MiTM".into()));
            }
            if ctx.secrets.status.matches.contains(SecretFlags::PBX) {
                log::info!("already registered with this trusted MiTM");
                return Ok(());
            }
            let fresh = s.store_pbx_secret(ctx)?;
            log::info!("registered with trusted MiTM, fresh secret: {}", fresh);
            Ok(())
        })
    }

    /// Joins two secure legs of a bridged call so both users see one SAS.
    ///
    /// The enrolled leg (`a` when both are) receives the SAS of the other leg.
    ///
    /// The legs are inspected one at a time. A leg stopped or destroyed
    /// meanwhile fails with [`ZrtpError::NotFound`] rather than
    /// [`ZrtpError::NotSecure`].
    pub fn resolve_mitm_call(&self, a: StreamHandle, b: StreamHandle) -> Result<()> {
        if !self.config.is_mitm {
            return Err(ZrtpError::NotMitm);
        }
        if a == b {
            return Err(ZrtpError::SameStream);
        }
        if a.session().identity != self.id || b.session().identity != self.id {
            return Err(ZrtpError::ForeignHandle);
        }
        let leg = |handle: StreamHandle| {
            self.with_stream(handle, |s, ctx| {
                if s.state != ZrtpState::Secure {
                    return Err(ZrtpError::NotSecure);
                }
                let sas = ctx.sas.clone().ok_or(ZrtpError::NotSecure)?;
                Ok((ctx.secrets.status.matches.contains(SecretFlags::PBX), sas))
            })
        };
        let (enrolled_a, sas_a) = leg(a)?;
        let (enrolled_b, sas_b) = leg(b)?;
        let (target, sas) = match (enrolled_a, enrolled_b) {
            (true, _) => (a, sas_b),
            (false, true) => (b, sas_a),
            (false, false) => return Err(ZrtpError::NotEnrolled),
        };
        self.with_stream(target, |s, ctx| s.relay_sas(ctx, &sas))
    }
}
