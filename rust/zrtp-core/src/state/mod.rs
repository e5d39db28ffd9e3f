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

use zrtp_proto::packets::MessageType;

/// Represents the various states of the ZRTP stream state machine.
///
/// These states follow the logic defined in RFC 6189.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZrtpState {
    /// Attached to a session but not started.
    Active,
    /// Sending Hello, waiting for the peer's HelloACK.
    WaitHelloAck,
    /// Our Hello was acknowledged, waiting for the peer's Hello.
    WaitHello,
    /// Discovery done, no keys in use.
    Clear,
    /// Commit sent, waiting for DHPart1 or Confirm1.
    InitiatingSecure,
    /// DHPart2 sent, waiting for Confirm1.
    WaitConfirm1,
    /// Confirm2 sent, waiting for Conf2ACK.
    WaitConfirmAck,
    /// Commit received and DHPart1 sent, waiting for DHPart2.
    PendingSecure,
    /// Confirm1 sent, waiting for Confirm2.
    WaitConfirm2,
    /// Handshake completed.
    Secure,
    /// Secure, with a SASrelay waiting for RelayACK.
    SasRelaying,
    /// GoClear sent, waiting for ClearACK.
    InitiatingClear,
    /// GoClear received, waiting for the host to confirm.
    PendingClear,
    /// Error sent, waiting for ErrorACK.
    InitiatingError,
    /// Terminal error state.
    Error,
    /// The peer never answered our Hello.
    NoZrtp,
}

/// Coarse view of [`ZrtpState`] for hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    Init,
    Discovery,
    CommitNegotiation,
    DhExchange,
    Confirm,
    Secure,
    PendingClear,
    Clear,
    Error,
}

impl ZrtpState {
    pub fn phase(self) -> HandshakePhase {
        match self {
            ZrtpState::Active => HandshakePhase::Init,
            ZrtpState::WaitHelloAck | ZrtpState::WaitHello => HandshakePhase::Discovery,
            ZrtpState::InitiatingSecure => HandshakePhase::CommitNegotiation,
            ZrtpState::PendingSecure | ZrtpState::WaitConfirm1 => HandshakePhase::DhExchange,
            ZrtpState::WaitConfirm2 | ZrtpState::WaitConfirmAck => HandshakePhase::Confirm,
            ZrtpState::Secure | ZrtpState::SasRelaying | ZrtpState::InitiatingClear => {
                HandshakePhase::Secure
            }
            ZrtpState::PendingClear => HandshakePhase::PendingClear,
            ZrtpState::Clear | ZrtpState::NoZrtp => HandshakePhase::Clear,
            ZrtpState::InitiatingError | ZrtpState::Error => HandshakePhase::Error,
        }
    }

    /// Keys are established and media may be protected.
    pub fn is_secure(self) -> bool {
        matches!(
            self,
            ZrtpState::Secure | ZrtpState::SasRelaying | ZrtpState::InitiatingClear
        )
    }
}

/// Represents the events that can trigger state transitions in the ZRTP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZrtpEvent {
    /// Start the protocol engine.
    Start,
    /// Received a Hello packet.
    HelloReceived,
    /// Received a HelloACK packet.
    HelloAckReceived,
    /// Received a Commit packet.
    CommitReceived,
    /// Received a DHPart1 packet.
    DHPart1Received,
    /// Received a DHPart2 packet.
    DHPart2Received,
    /// Received a Confirm1 packet.
    Confirm1Received,
    /// Received a Confirm2 packet.
    Confirm2Received,
    /// Received a Conf2ACK packet.
    Conf2AckReceived,
    /// Received a GoClear packet.
    GoClearReceived,
    /// Received a ClearACK packet.
    ClearAckReceived,
    /// Received an Error packet.
    ErrorReceived,
    /// Received an ErrorACK packet.
    ErrorAckReceived,
    /// Received a SASrelay packet.
    SasRelayReceived,
    /// Received a RelayACK packet.
    RelayAckReceived,
    /// Retransmission timeout.
    Timeout,
}

impl From<MessageType> for ZrtpEvent {
    fn from(message: MessageType) -> Self {
        match message {
            MessageType::Hello => ZrtpEvent::HelloReceived,
            MessageType::HelloAck => ZrtpEvent::HelloAckReceived,
            MessageType::Commit => ZrtpEvent::CommitReceived,
            MessageType::DHPart1 => ZrtpEvent::DHPart1Received,
            MessageType::DHPart2 => ZrtpEvent::DHPart2Received,
            MessageType::Confirm1 => ZrtpEvent::Confirm1Received,
            MessageType::Confirm2 => ZrtpEvent::Confirm2Received,
            MessageType::Conf2Ack => ZrtpEvent::Conf2AckReceived,
            MessageType::GoClear => ZrtpEvent::GoClearReceived,
            MessageType::ClearAck => ZrtpEvent::ClearAckReceived,
            MessageType::Error => ZrtpEvent::ErrorReceived,
            MessageType::ErrorAck => ZrtpEvent::ErrorAckReceived,
            MessageType::SasRelay => ZrtpEvent::SasRelayReceived,
            MessageType::RelayAck => ZrtpEvent::RelayAckReceived,
        }
    }
}

/// The role of the endpoint in the ZRTP handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sent the Commit that won.
    Initiator,
    /// Answered the peer's Commit.
    Responder,
    /// Role not yet determined.
    None,
}

impl Role {
    /// Label used when computing retained secret ids.
    pub(crate) fn label(self) -> &'static [u8] {
        match self {
            Role::Responder => b"Responder",
            _ => b"Initiator",
        }
    }
}

/// The role negotiated by the call signaling, if any.
///
/// A `Responder` holds back its own Commit for a while so the signaling
/// initiator normally wins the Commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignalingRole {
    #[default]
    Unknown,
    Initiator,
    Responder,
}

/// How a stream derives its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    Unknown,
    /// Full Diffie-Hellman exchange.
    Dh,
    /// Keys derived from the session key of an earlier DH stream.
    Multistream,
}

/// Trusted MiTM role of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MitmMode {
    Unknown,
    /// The peer announced itself as a trusted MiTM.
    Client,
    /// We are a PBX running an enrollment call.
    RegServer,
    /// The PBX asked us to enroll.
    RegClient,
}
