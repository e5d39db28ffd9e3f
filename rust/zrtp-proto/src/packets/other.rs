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

use super::header::{ZrtpPacketHeader, HEADER_LEN};
use nom::{
    bytes::complete::take,
    number::complete::be_u32,
    IResult,
};

/// The GoClear packet is used to switch back to unencrypted mode.
///
/// Defined in RFC 6189 Section 5.11.
#[derive(Debug, Clone)]
pub struct GoClearPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// HMAC protecting the GoClear request.
    pub clear_hmac: [u8; 8],
}

impl GoClearPacket {
    /// The message type identifier for GoClear packets.
    pub const MESSAGE_TYPE: [u8; 8] = *b"GoClear ";

    pub fn new(clear_hmac: [u8; 8]) -> Self {
        Self {
            header: ZrtpPacketHeader::new(Self::MESSAGE_TYPE, HEADER_LEN + 8),
            clear_hmac,
        }
    }

    /// Parses a GoClear packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, clear_hmac_bytes) = take(8usize)(input)?;
        let mut clear_hmac = [0u8; 8];
        clear_hmac.copy_from_slice(clear_hmac_bytes);
        Ok((input, Self { header, clear_hmac }))
    }

    /// Serializes the GoClear packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.clear_hmac);
        bytes
    }
}

/// The Error packet is sent when a protocol error occurs.
///
/// Defined in RFC 6189 Section 5.9.
#[derive(Debug, Clone)]
pub struct ErrorPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// The error code as defined in RFC 6189 Section 5.9.
    pub error_code: u32,
}

impl ErrorPacket {
    /// The message type identifier for Error packets.
    pub const MESSAGE_TYPE: [u8; 8] = *b"Error   ";

    pub fn new(error_code: u32) -> Self {
        Self {
            header: ZrtpPacketHeader::new(Self::MESSAGE_TYPE, HEADER_LEN + 4),
            error_code,
        }
    }

    /// Parses an Error packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, error_code) = be_u32(input)?;
        Ok((input, Self { header, error_code }))
    }

    /// Serializes the Error packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.error_code.to_be_bytes());
        bytes
    }
}

/// A header-only acknowledgement (HelloACK, Conf2ACK, ErrorACK, ClearACK, RelayACK).
///
/// Defined in RFC 6189 Sections 5.3, 5.8, 5.10, 5.12 and 5.14.
#[derive(Debug, Clone)]
pub struct GenericAckPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
}

impl GenericAckPacket {
    pub const MESSAGE_TYPE_HELLO_ACK: [u8; 8] = *b"HelloACK";
    pub const MESSAGE_TYPE_CONF2_ACK: [u8; 8] = *b"Conf2ACK";
    pub const MESSAGE_TYPE_ERROR_ACK: [u8; 8] = *b"ErrorACK";
    pub const MESSAGE_TYPE_CLEAR_ACK: [u8; 8] = *b"ClearACK";
    pub const MESSAGE_TYPE_RELAY_ACK: [u8; 8] = *b"RelayACK";

    pub fn new(message_type: [u8; 8]) -> Self {
        Self {
            header: ZrtpPacketHeader::new(message_type, HEADER_LEN),
        }
    }

    /// Parses a Generic Ack packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        Ok((input, Self { header }))
    }

    /// Serializes the Generic Ack packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.header.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goclear_packet_codec() {
        let goclear = GoClearPacket::new([0xEE; 8]);
        assert_eq!(goclear.header.length, 5);

        let bytes = goclear.to_bytes();
        let (rem, parsed) = GoClearPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.clear_hmac, goclear.clear_hmac);
    }

    #[test]
    fn test_error_packet_codec() {
        let error = ErrorPacket::new(0xB0);

        let bytes = error.to_bytes();
        let (rem, parsed) = ErrorPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.error_code, 0xB0);
    }

    #[test]
    fn test_ack_packet_codec() {
        let ack = GenericAckPacket::new(GenericAckPacket::MESSAGE_TYPE_HELLO_ACK);
        assert_eq!(ack.header.length, 3);

        let bytes = ack.to_bytes();
        let (rem, parsed) = GenericAckPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.header.message_type, GenericAckPacket::MESSAGE_TYPE_HELLO_ACK);
    }
}
