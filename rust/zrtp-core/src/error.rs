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

//! Errors returned to the host and protocol error causes.

use crate::state::ZrtpState;
use thiserror::Error;

/// Result type of every host-facing operation.
pub type Result<T> = std::result::Result<T, ZrtpError>;

/// A host call that could not be carried out. No state was changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZrtpError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("handle belongs to another identity")]
    ForeignHandle,
    #[error("operation not allowed in state {0:?}")]
    WrongState(ZrtpState),
    #[error("session already holds {0} streams")]
    StreamLimit(usize),
    #[error("stream id {0:#010x} is already in use")]
    StreamIdInUse(u32),
    #[error("identity is not configured as a trusted MiTM")]
    NotMitm,
    #[error("stream is not secure")]
    NotSecure,
    #[error("neither leg is enrolled with this MiTM")]
    NotEnrolled,
    #[error("clear mode is not allowed on this stream")]
    ClearNotAllowed,
    #[error("both legs name the same stream")]
    SameStream,
    #[error("bad parameter: {0}")]
    BadParam(String),
    #[error("cache: {0}")]
    Cache(String),
    #[error("crypto: {0}")]
    Crypto(String),
}

impl From<anyhow::Error> for ZrtpError {
    fn from(err: anyhow::Error) -> Self {
        ZrtpError::Cache(format!("{:#}", err))
    }
}

/// Why a handshake failed, with the RFC 6189 Section 5.9 code where one exists.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolError {
    #[error("malformed packet")]
    MalformedPacket,
    #[error("critical software error")]
    CriticalSoftware,
    #[error("unsupported ZRTP version")]
    UnsupportedVersion,
    #[error("Hello components mismatch")]
    HelloComponentsMismatch,
    #[error("hash type not supported")]
    UnsupportedHash,
    #[error("cipher type not supported")]
    UnsupportedCipher,
    #[error("public key exchange not supported")]
    UnsupportedKeyAgreement,
    #[error("SRTP auth tag not supported")]
    UnsupportedAuthTag,
    #[error("SAS rendering scheme not supported")]
    UnsupportedSas,
    #[error("no shared secret available, DH mode required")]
    NoSharedSecret,
    #[error("DH error: bad public value")]
    BadDhValue,
    #[error("DH error: hvi does not match hashed data")]
    HviMismatch,
    #[error("received relayed SAS from untrusted MiTM")]
    UntrustedMitm,
    #[error("bad Confirm packet MAC")]
    ConfirmAuth,
    #[error("nonce reuse")]
    NonceReuse,
    #[error("equal ZIDs in Hello")]
    EqualZid,
    #[error("SSRC collision")]
    SsrcCollision,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("protocol timeout")]
    Timeout,
    #[error("GoClear received but not allowed")]
    GoClearNotAllowed,
    #[error("hash chain preimage does not match")]
    WrongHashChain,
    #[error("message MAC does not match")]
    WrongMessageMac,
    #[error("peer ZID changed within the session")]
    WrongZid,
    #[error("unknown error code {0:#x}")]
    Unknown(u32),
}

impl ProtocolError {
    const CODES: [(ProtocolError, u32); 23] = [
        (ProtocolError::MalformedPacket, 0x10),
        (ProtocolError::CriticalSoftware, 0x20),
        (ProtocolError::UnsupportedVersion, 0x30),
        (ProtocolError::HelloComponentsMismatch, 0x40),
        (ProtocolError::UnsupportedHash, 0x51),
        (ProtocolError::UnsupportedCipher, 0x52),
        (ProtocolError::UnsupportedKeyAgreement, 0x53),
        (ProtocolError::UnsupportedAuthTag, 0x54),
        (ProtocolError::UnsupportedSas, 0x55),
        (ProtocolError::NoSharedSecret, 0x56),
        (ProtocolError::BadDhValue, 0x61),
        (ProtocolError::HviMismatch, 0x62),
        (ProtocolError::UntrustedMitm, 0x63),
        (ProtocolError::ConfirmAuth, 0x70),
        (ProtocolError::NonceReuse, 0x80),
        (ProtocolError::EqualZid, 0x90),
        (ProtocolError::SsrcCollision, 0x91),
        (ProtocolError::ServiceUnavailable, 0xA0),
        (ProtocolError::Timeout, 0xB0),
        (ProtocolError::GoClearNotAllowed, 0x100),
        // Local causes; peers that do not know them see an unknown code.
        (ProtocolError::WrongHashChain, 0x201),
        (ProtocolError::WrongZid, 0x202),
        (ProtocolError::WrongMessageMac, 0x203),
    ];

    /// The code carried in an Error packet.
    pub fn code(self) -> u32 {
        if let ProtocolError::Unknown(code) = self {
            return code;
        }
        Self::CODES
            .iter()
            .find(|(e, _)| *e == self)
            .map(|(_, c)| *c)
            .unwrap_or(0x20)
    }

    pub fn from_code(code: u32) -> Self {
        Self::CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(e, _)| *e)
            .unwrap_or(ProtocolError::Unknown(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_roundtrip() {
        for (err, code) in ProtocolError::CODES {
            assert_eq!(err.code(), code);
            assert_eq!(ProtocolError::from_code(code), err);
        }
        assert_eq!(ProtocolError::from_code(0x999), ProtocolError::Unknown(0x999));
        assert_eq!(ProtocolError::Unknown(0x999).code(), 0x999);
    }
}
