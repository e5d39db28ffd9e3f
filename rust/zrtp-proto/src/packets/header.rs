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

use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    number::complete::be_u16,
    IResult,
};

/// The ZRTP Magic number as defined in RFC 6189.
pub const ZRTP_MAGIC: u32 = 0x5a525450;

/// The ZRTP ID (first 16 bits of the message header).
pub const ZRTP_ID: u16 = 0x505a;

/// Length of the message header in bytes.
pub const HEADER_LEN: usize = 12;

/// The common ZRTP message header structure.
///
/// Every ZRTP message starts with this 12-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZrtpPacketHeader {
    /// Must be equal to ZRTP_ID (0x505a).
    pub zrtp_id: u16,
    /// The length of the message in 32-bit words, including the header.
    pub length: u16,
    /// The 8-character message type string (e.g., "Hello   ").
    pub message_type: [u8; 8],
}

impl ZrtpPacketHeader {
    /// Builds a header for a message of `total_len` bytes.
    pub fn new(message_type: [u8; 8], total_len: usize) -> Self {
        Self {
            zrtp_id: ZRTP_ID,
            length: (total_len / 4) as u16,
            message_type,
        }
    }

    /// Parses a ZRTP message header from the given input bytes.
    ///
    /// Rejects headers whose preamble is not `ZRTP_ID`.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let start = input;
        let (input, zrtp_id) = be_u16(input)?;
        if zrtp_id != ZRTP_ID {
            return Err(nom::Err::Error(Error::new(start, ErrorKind::Tag)));
        }
        let (input, length) = be_u16(input)?;
        let (input, msg_type_bytes) = take(8usize)(input)?;

        let mut message_type = [0u8; 8];
        message_type.copy_from_slice(msg_type_bytes);

        Ok((input, Self {
            zrtp_id,
            length,
            message_type,
        }))
    }

    /// Serializes the ZRTP message header into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&self.zrtp_id.to_be_bytes());
        bytes.extend_from_slice(&self.length.to_be_bytes());
        bytes.extend_from_slice(&self.message_type);
        bytes
    }

    /// Message length in bytes as announced by the header.
    pub fn byte_len(&self) -> usize {
        self.length as usize * 4
    }
}

/// Every message type the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    HelloAck,
    Commit,
    DHPart1,
    DHPart2,
    Confirm1,
    Confirm2,
    Conf2Ack,
    Error,
    ErrorAck,
    GoClear,
    ClearAck,
    SasRelay,
    RelayAck,
}

impl MessageType {
    const TABLE: [(MessageType, &'static [u8; 8]); 14] = [
        (MessageType::Hello, b"Hello   "),
        (MessageType::HelloAck, b"HelloACK"),
        (MessageType::Commit, b"Commit  "),
        (MessageType::DHPart1, b"DHPart1 "),
        (MessageType::DHPart2, b"DHPart2 "),
        (MessageType::Confirm1, b"Confirm1"),
        (MessageType::Confirm2, b"Confirm2"),
        (MessageType::Conf2Ack, b"Conf2ACK"),
        (MessageType::Error, b"Error   "),
        (MessageType::ErrorAck, b"ErrorACK"),
        (MessageType::GoClear, b"GoClear "),
        (MessageType::ClearAck, b"ClearACK"),
        (MessageType::SasRelay, b"SASrelay"),
        (MessageType::RelayAck, b"RelayACK"),
    ];

    /// Maps a type block from the wire to a known message type.
    pub fn from_block(block: &[u8; 8]) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, b)| *b == block)
            .map(|(t, _)| *t)
    }

    /// The 8-byte type block for this message.
    pub fn block(self) -> [u8; 8] {
        Self::TABLE
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, b)| **b)
            .unwrap_or(*b"        ")
    }

    /// Reads the message type of a raw message without parsing its body.
    pub fn peek(message: &[u8]) -> Option<Self> {
        let (_, header) = ZrtpPacketHeader::parse(message).ok()?;
        Self::from_block(&header.message_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_rejects_bad_preamble() {
        let mut bytes = ZrtpPacketHeader::new(*b"Hello   ", 12).to_bytes();
        assert!(ZrtpPacketHeader::parse(&bytes).is_ok());
        bytes[0] = 0x00;
        assert!(ZrtpPacketHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_message_type_lookup() {
        for (t, block) in MessageType::TABLE.iter() {
            assert_eq!(MessageType::from_block(block), Some(*t));
            assert_eq!(t.block(), **block);
        }
        assert_eq!(MessageType::from_block(b"Ping    "), None);
    }
}
