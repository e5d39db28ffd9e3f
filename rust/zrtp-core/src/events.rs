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

//! What the engine reports back to its host.

use crate::error::ProtocolError;
use crate::identity::StreamHandle;
use crate::secrets::SecretFlags;
use crate::state::ZrtpState;

/// Progress of the protocol on one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolEvent {
    IsClear,
    IsInitiatingSecure,
    IsPendingSecure,
    /// The peer asked to go clear; call `stream_clear` to confirm.
    IsPendingClear,
    /// The peer never answered our Hello.
    NoZrtp,
    /// Early hint that the peer probably does not speak ZRTP.
    NoZrtpQuick,
    /// The PBX invites us to enroll; call `register_with_trusted_mitm` to accept.
    IsClientEnrollment,
    NewUserEnrolled,
    UserAlreadyEnrolled,
    UserUnenrolled,
    /// A trusted MiTM replaced the SAS of this session.
    LocalSasUpdated,
    IsSecure,
    /// Every follow-up of entering Secure has been reported.
    IsSecureDone,
}

/// Anything that should be shown to the user as a security problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEvent {
    ProtocolError { error: ProtocolError, remote: bool },
    /// The peer's Hello does not match the hash exchanged over signaling.
    WrongSignalingHash,
    /// Retained secrets we cached did not match the peer's.
    MitmWarning { wrongs: SecretFlags },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    Protocol(ProtocolEvent),
    Security(SecurityEvent),
}

/// Callbacks into the application that owns the media streams.
///
/// Calls are made after the engine released its internal locks, so the host
/// may call back into the engine from inside them.
pub trait ZrtpHost: Send + Sync {
    /// Puts a framed ZRTP packet on the wire of `stream`.
    fn send_packet(&self, stream: StreamHandle, packet: &[u8]);

    fn on_event(&self, stream: StreamHandle, event: StreamEvent);

    /// Called when the stream changes state.
    fn on_state_change(&self, _stream: StreamHandle, _state: ZrtpState) {}
}

/// Produced by a stream while its session is locked, delivered afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamOutput {
    Packet(Vec<u8>),
    Event(StreamEvent),
    State(ZrtpState),
}
