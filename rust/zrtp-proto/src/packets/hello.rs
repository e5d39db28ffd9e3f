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

/// Algorithm identifiers offered in a Hello, one list per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgorithmOffer {
    pub hash: Vec<[u8; 4]>,
    pub cipher: Vec<[u8; 4]>,
    pub auth_tag: Vec<[u8; 4]>,
    pub key_agreement: Vec<[u8; 4]>,
    pub sas: Vec<[u8; 4]>,
}

impl AlgorithmOffer {
    fn total(&self) -> usize {
        self.hash.len() + self.cipher.len() + self.auth_tag.len() + self.key_agreement.len() + self.sas.len()
    }
}

/// The Hello packet is used in the discovery phase to find peer capabilities.
///
/// Defined in RFC 6189 Section 5.2.
#[derive(Debug, Clone)]
pub struct HelloPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// The ZRTP protocol version supported.
    pub version: [u8; 4],
    /// Client identifier string.
    pub client_id: [u8; 16],
    /// The H3 hash chain value.
    pub hash_h3: [u8; 32],
    /// The ZID of the endpoint.
    pub zid: [u8; 12],
    /// Signature-capable, MiTM and passive flags.
    pub flags: u8,
    /// Offered algorithms.
    pub algorithms: AlgorithmOffer,
    /// The MAC of the packet, keyed with H2.
    pub hmac: [u8; 8],
}

impl HelloPacket {
    /// The message type identifier for Hello packets.
    pub const MESSAGE_TYPE: [u8; 8] = *b"Hello   ";
    /// Protocol version we speak.
    pub const VERSION: [u8; 4] = *b"1.10";

    /// Endpoint can sign the SAS.
    pub const FLAG_SIGNATURE: u8 = 0x40;
    /// Endpoint is a trusted MiTM (PBX).
    pub const FLAG_MITM: u8 = 0x20;
    /// Endpoint is passive and never initiates.
    pub const FLAG_PASSIVE: u8 = 0x10;

    /// Builds a Hello with an empty MAC and a header length matching its content.
    pub fn new(client_id: [u8; 16], hash_h3: [u8; 32], zid: [u8; 12], flags: u8, algorithms: AlgorithmOffer) -> Self {
        let len = HEADER_LEN + 4 + 16 + 32 + 12 + 4 + algorithms.total() * 4 + 8;
        Self {
            header: ZrtpPacketHeader::new(Self::MESSAGE_TYPE, len),
            version: Self::VERSION,
            client_id,
            hash_h3,
            zid,
            flags,
            algorithms,
            hmac: [0u8; 8],
        }
    }

    /// Parses a Hello packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, version_bytes) = take(4usize)(input)?;
        let (input, client_id_bytes) = take(16usize)(input)?;
        let (input, hash_h3_bytes) = take(32usize)(input)?;
        let (input, zid_bytes) = take(12usize)(input)?;
        let (input, word) = take(4usize)(input)?;

        let flags = word[0];
        let counts = [
            (word[1] & 0x0F) as usize,
            ((word[2] >> 4) & 0x0F) as usize,
            (word[2] & 0x0F) as usize,
            ((word[3] >> 4) & 0x0F) as usize,
            (word[3] & 0x0F) as usize,
        ];

        let mut lists: [Vec<[u8; 4]>; 5] = Default::default();
        let mut input = input;
        for (list, count) in lists.iter_mut().zip(counts) {
            for _ in 0..count {
                let (rest, id) = take(4usize)(input)?;
                let mut alg = [0u8; 4];
                alg.copy_from_slice(id);
                list.push(alg);
                input = rest;
            }
        }
        let (input, hmac_bytes) = take(8usize)(input)?;

        let mut version = [0u8; 4];
        version.copy_from_slice(version_bytes);
        let mut client_id = [0u8; 16];
        client_id.copy_from_slice(client_id_bytes);
        let mut hash_h3 = [0u8; 32];
        hash_h3.copy_from_slice(hash_h3_bytes);
        let mut zid = [0u8; 12];
        zid.copy_from_slice(zid_bytes);
        let mut hmac = [0u8; 8];
        hmac.copy_from_slice(hmac_bytes);

        let [hash, cipher, auth_tag, key_agreement, sas] = lists;
        Ok((input, Self {
            header,
            version,
            client_id,
            hash_h3,
            zid,
            flags,
            algorithms: AlgorithmOffer { hash, cipher, auth_tag, key_agreement, sas },
            hmac,
        }))
    }

    /// Serializes the Hello packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let algs = &self.algorithms;
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.version);
        bytes.extend_from_slice(&self.client_id);
        bytes.extend_from_slice(&self.hash_h3);
        bytes.extend_from_slice(&self.zid);
        bytes.push(self.flags);
        bytes.push(algs.hash.len() as u8 & 0x0F);
        bytes.push(((algs.cipher.len() as u8) << 4) | (algs.auth_tag.len() as u8 & 0x0F));
        bytes.push(((algs.key_agreement.len() as u8) << 4) | (algs.sas.len() as u8 & 0x0F));

        for list in [&algs.hash, &algs.cipher, &algs.auth_tag, &algs.key_agreement, &algs.sas] {
            for alg in list {
                bytes.extend_from_slice(alg);
            }
        }
        bytes.extend_from_slice(&self.hmac);
        bytes
    }

    pub fn is_mitm(&self) -> bool {
        self.flags & Self::FLAG_MITM != 0
    }

    pub fn is_passive(&self) -> bool {
        self.flags & Self::FLAG_PASSIVE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_packet_codec() {
        let mut client_id = [0u8; 16];
        client_id[..16].copy_from_slice(b"ZRTP-Rust-Tester");

        let offer = AlgorithmOffer {
            hash: vec![*b"S256"],
            cipher: vec![*b"AES1"],
            auth_tag: vec![*b"HS32", *b"HS80"],
            key_agreement: vec![*b"X255"],
            sas: vec![*b"B32 ", *b"B256"],
        };
        let mut hello = HelloPacket::new(client_id, [0x33; 32], [0x11; 12], HelloPacket::FLAG_MITM, offer);
        hello.hmac = [0xAA; 8];

        // 12 + 4 + 16 + 32 + 12 + 4 + 7 * 4 + 8 = 116 bytes, 29 words.
        assert_eq!(hello.header.length, 29);

        let bytes = hello.to_bytes();
        assert_eq!(bytes.len(), hello.header.byte_len());
        let (rem, parsed) = HelloPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.zid, hello.zid);
        assert_eq!(parsed.version, HelloPacket::VERSION);
        assert_eq!(parsed.algorithms, hello.algorithms);
        assert_eq!(parsed.hmac, hello.hmac);
        assert!(parsed.is_mitm());
        assert!(!parsed.is_passive());
    }

    #[test]
    fn test_hello_truncated_algorithm_list() {
        let offer = AlgorithmOffer {
            hash: vec![*b"S256"],
            sas: vec![*b"B32 "],
            ..Default::default()
        };
        let hello = HelloPacket::new([0u8; 16], [0u8; 32], [0x22; 12], 0, offer);
        let bytes = hello.to_bytes();
        assert!(HelloPacket::parse(&bytes[..bytes.len() - 12]).is_err());
    }
}
