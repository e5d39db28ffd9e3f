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

//! Transport framing of ZRTP messages (RFC 6189 Section 5).
//!
//! A frame is `0x10 0x00 | sequence | "ZRTP" | SSRC | message | CRC-32C`.

use crate::packets::header::{ZrtpPacketHeader, ZRTP_MAGIC};
use nom::{
    bytes::complete::tag,
    number::complete::{be_u16, be_u32},
    IResult,
};
use thiserror::Error;

/// Length of the transport header preceding the message.
pub const TRANSPORT_HEADER_LEN: usize = 12;
/// Length of the trailing CRC.
pub const CRC_LEN: usize = 4;
/// Smallest possible frame: transport header, message header, CRC.
pub const MIN_FRAME_LEN: usize = TRANSPORT_HEADER_LEN + 12 + CRC_LEN;

const FRAME_PREFIX: [u8; 2] = [0x10, 0x00];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("not a ZRTP frame")]
    NotZrtp,
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    BadCrc { expected: u32, actual: u32 },
    #[error("message length {announced} does not match frame payload {actual}")]
    BadLength { announced: usize, actual: usize },
}

/// The fields of the transport header that matter to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub sequence: u16,
    pub ssrc: u32,
}

impl TransportHeader {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&FRAME_PREFIX[..])(input)?;
        let (input, sequence) = be_u16(input)?;
        let (input, _) = tag(&ZRTP_MAGIC.to_be_bytes()[..])(input)?;
        let (input, ssrc) = be_u32(input)?;
        Ok((input, Self { sequence, ssrc }))
    }
}

/// Wraps a serialized message into a transport frame.
pub fn frame(sequence: u16, ssrc: u32, message: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TRANSPORT_HEADER_LEN + message.len() + CRC_LEN);
    bytes.extend_from_slice(&FRAME_PREFIX);
    bytes.extend_from_slice(&sequence.to_be_bytes());
    bytes.extend_from_slice(&ZRTP_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&ssrc.to_be_bytes());
    bytes.extend_from_slice(message);
    let crc = crc32c(&bytes);
    bytes.extend_from_slice(&crc.to_be_bytes());
    bytes
}

/// Validates a frame and returns its transport header and the message it carries.
pub fn unframe(bytes: &[u8]) -> Result<(TransportHeader, &[u8]), FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(bytes.len()));
    }
    let (body, crc_bytes) = bytes.split_at(bytes.len() - CRC_LEN);
    let (message, header) = TransportHeader::parse(body).map_err(|_| FrameError::NotZrtp)?;

    let expected = crc32c(body);
    let actual = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if expected != actual {
        log::trace!("frame crc mismatch: expected {:08x}, got {:08x}", expected, actual);
        return Err(FrameError::BadCrc { expected, actual });
    }

    let (_, msg_header) = ZrtpPacketHeader::parse(message).map_err(|_| FrameError::NotZrtp)?;
    if msg_header.byte_len() != message.len() {
        return Err(FrameError::BadLength {
            announced: msg_header.byte_len(),
            actual: message.len(),
        });
    }
    Ok((header, message))
}

/// Checks the fixed prefix and magic cookie of a frame.
pub fn looks_like_zrtp(bytes: &[u8]) -> bool {
    bytes.len() >= TRANSPORT_HEADER_LEN
        && bytes[0] == FRAME_PREFIX[0]
        && bytes[4..8] == ZRTP_MAGIC.to_be_bytes()
}

/// CRC-32C (Castagnoli), reflected, as required for ZRTP frames.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for byte in data {
        crc ^= *byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0x82F6_3B78 & mask);
        }
    }
    !crc
}
