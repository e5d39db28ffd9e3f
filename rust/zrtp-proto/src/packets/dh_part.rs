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
    IResult,
};

/// Identifiers of the four secrets a side offers in its DHPart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretIds {
    pub rs1: [u8; 8],
    pub rs2: [u8; 8],
    pub aux: [u8; 8],
    pub pbx: [u8; 8],
}

/// The DHPart packet is used to exchange Diffie-Hellman public values.
///
/// Defined in RFC 6189 Section 5.5 and 5.6.
#[derive(Debug, Clone)]
pub struct DHPartPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// The H1 hash value.
    pub hash_h1: [u8; 32],
    /// Retained secret identifiers.
    pub ids: SecretIds,
    /// The DH public value.
    pub public_value: Vec<u8>,
    /// The MAC of the packet, keyed with H0.
    pub mac: [u8; 8],
}

impl DHPartPacket {
    /// The message type identifier for DHPart1 packets.
    pub const MESSAGE_TYPE_DH1: [u8; 8] = *b"DHPart1 ";
    /// The message type identifier for DHPart2 packets.
    pub const MESSAGE_TYPE_DH2: [u8; 8] = *b"DHPart2 ";
    const FIXED_LEN: usize = HEADER_LEN + 32 + 32 + 8;

    /// Builds a DHPart1 or DHPart2 with an empty MAC.
    pub fn new(message_type: [u8; 8], hash_h1: [u8; 32], ids: SecretIds, public_value: Vec<u8>) -> Self {
        Self {
            header: ZrtpPacketHeader::new(message_type, Self::FIXED_LEN + public_value.len()),
            hash_h1,
            ids,
            public_value,
            mac: [0u8; 8],
        }
    }

    /// Parses a DHPart packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, hash_h1_bytes) = take(32usize)(input)?;
        let (input, rs1_id_bytes) = take(8usize)(input)?;
        let (input, rs2_id_bytes) = take(8usize)(input)?;
        let (input, aux_secret_id_bytes) = take(8usize)(input)?;
        let (input, pbx_secret_id_bytes) = take(8usize)(input)?;

        let mut hash_h1 = [0u8; 32];
        hash_h1.copy_from_slice(hash_h1_bytes);

        let mut ids = SecretIds::default();
        ids.rs1.copy_from_slice(rs1_id_bytes);
        ids.rs2.copy_from_slice(rs2_id_bytes);
        ids.aux.copy_from_slice(aux_secret_id_bytes);
        ids.pbx.copy_from_slice(pbx_secret_id_bytes);

        // Public value length: Total - Header(12) - H1(32) - 4IDs(32) - MAC(8) = Total - 84
        let pub_val_len = header.byte_len().saturating_sub(Self::FIXED_LEN);
        let (input, public_value_bytes) = take(pub_val_len)(input)?;

        let (input, mac_bytes) = take(8usize)(input)?;
        let mut mac = [0u8; 8];
        mac.copy_from_slice(mac_bytes);

        Ok((input, Self {
            header,
            hash_h1,
            ids,
            public_value: public_value_bytes.to_vec(),
            mac,
        }))
    }

    /// Serializes the DHPart packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.hash_h1);
        bytes.extend_from_slice(&self.ids.rs1);
        bytes.extend_from_slice(&self.ids.rs2);
        bytes.extend_from_slice(&self.ids.aux);
        bytes.extend_from_slice(&self.ids.pbx);
        bytes.extend_from_slice(&self.public_value);
        bytes.extend_from_slice(&self.mac);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dh_part_packet_codec() {
        let ids = SecretIds { rs1: [0x77; 8], rs2: [0x88; 8], aux: [0x99; 8], pbx: [0xAA; 8] };
        let mut dh = DHPartPacket::new(DHPartPacket::MESSAGE_TYPE_DH1, [0x66; 32], ids, vec![0xBB; 32]);
        dh.mac = [0xCC; 8];
        // 84 fixed + 32 public value = 116 bytes, 29 words
        assert_eq!(dh.header.length, 29);

        let bytes = dh.to_bytes();
        let (rem, parsed) = DHPartPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.hash_h1, dh.hash_h1);
        assert_eq!(parsed.ids, ids);
        assert_eq!(parsed.public_value, dh.public_value);
        assert_eq!(parsed.mac, dh.mac);
    }
}
