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

/// Key agreement id announcing multistream mode.
pub const KEY_AGREEMENT_MULT: [u8; 4] = *b"Mult";

/// The commitment carried by a Commit: `hvi` in DH mode, a nonce in multistream mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitValue {
    Hvi([u8; 32]),
    Nonce([u8; 16]),
}

impl CommitValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CommitValue::Hvi(hvi) => hvi,
            CommitValue::Nonce(nonce) => nonce,
        }
    }
}

/// The Commit packet is used to negotiate cryptographic algorithms.
///
/// Defined in RFC 6189 Section 5.4.
#[derive(Debug, Clone)]
pub struct CommitPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// The H2 hash value.
    pub hash_h2: [u8; 32],
    /// The ZID of the endpoint.
    pub zid: [u8; 12],
    /// Selected hash algorithm (e.g., "S256").
    pub hash_alg: [u8; 4],
    /// Selected cipher algorithm (e.g., "AES1").
    pub cipher_alg: [u8; 4],
    /// Selected auth tag algorithm (e.g., "HS32").
    pub auth_tag_alg: [u8; 4],
    /// Selected key agreement algorithm (e.g., "X255" or "Mult").
    pub key_agreement_alg: [u8; 4],
    /// Selected SAS algorithm (e.g., "B32 ").
    pub sas_alg: [u8; 4],
    /// Hash value of the initiator, or the multistream nonce.
    pub value: CommitValue,
    /// Message Authentication Code for the Commit packet.
    pub mac: [u8; 8],
}

impl CommitPacket {
    /// The message type identifier for Commit packets.
    pub const MESSAGE_TYPE: [u8; 8] = *b"Commit  ";
    const FIXED_LEN: usize = HEADER_LEN + 32 + 12 + 20 + 8;

    /// Parses a Commit packet from the given input bytes.
    ///
    /// The header length selects between the DH and multistream layouts.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, hash_h2_bytes) = take(32usize)(input)?;
        let (input, zid_bytes) = take(12usize)(input)?;
        let (input, hash_alg_bytes) = take(4usize)(input)?;
        let (input, cipher_alg_bytes) = take(4usize)(input)?;
        let (input, auth_tag_alg_bytes) = take(4usize)(input)?;
        let (input, key_agreement_alg_bytes) = take(4usize)(input)?;
        let (input, sas_alg_bytes) = take(4usize)(input)?;

        let value_len = header.byte_len().saturating_sub(Self::FIXED_LEN);
        let (input, value_bytes) = take(value_len)(input)?;
        let value = match value_len {
            32 => {
                let mut hvi = [0u8; 32];
                hvi.copy_from_slice(value_bytes);
                CommitValue::Hvi(hvi)
            }
            16 => {
                let mut nonce = [0u8; 16];
                nonce.copy_from_slice(value_bytes);
                CommitValue::Nonce(nonce)
            }
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    value_bytes,
                    nom::error::ErrorKind::LengthValue,
                )))
            }
        };
        let (input, mac_bytes) = take(8usize)(input)?;

        let mut hash_h2 = [0u8; 32];
        hash_h2.copy_from_slice(hash_h2_bytes);

        let mut zid = [0u8; 12];
        zid.copy_from_slice(zid_bytes);

        let mut hash_alg = [0u8; 4];
        hash_alg.copy_from_slice(hash_alg_bytes);

        let mut cipher_alg = [0u8; 4];
        cipher_alg.copy_from_slice(cipher_alg_bytes);

        let mut auth_tag_alg = [0u8; 4];
        auth_tag_alg.copy_from_slice(auth_tag_alg_bytes);

        let mut key_agreement_alg = [0u8; 4];
        key_agreement_alg.copy_from_slice(key_agreement_alg_bytes);

        let mut sas_alg = [0u8; 4];
        sas_alg.copy_from_slice(sas_alg_bytes);

        let mut mac = [0u8; 8];
        mac.copy_from_slice(mac_bytes);

        Ok((input, Self {
            header,
            hash_h2,
            zid,
            hash_alg,
            cipher_alg,
            auth_tag_alg,
            key_agreement_alg,
            sas_alg,
            value,
            mac,
        }))
    }

    /// Serializes the Commit packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.hash_h2);
        bytes.extend_from_slice(&self.zid);
        bytes.extend_from_slice(&self.hash_alg);
        bytes.extend_from_slice(&self.cipher_alg);
        bytes.extend_from_slice(&self.auth_tag_alg);
        bytes.extend_from_slice(&self.key_agreement_alg);
        bytes.extend_from_slice(&self.sas_alg);
        bytes.extend_from_slice(self.value.as_bytes());
        bytes.extend_from_slice(&self.mac);
        bytes
    }

    /// Header length for a Commit carrying `value`.
    pub fn header_for(value: &CommitValue) -> ZrtpPacketHeader {
        ZrtpPacketHeader::new(Self::MESSAGE_TYPE, Self::FIXED_LEN + value.as_bytes().len())
    }

    pub fn is_multistream(&self) -> bool {
        self.key_agreement_alg == KEY_AGREEMENT_MULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(value: CommitValue, key_agreement_alg: [u8; 4]) -> CommitPacket {
        CommitPacket {
            header: CommitPacket::header_for(&value),
            hash_h2: [0x22; 32],
            zid: [0x33; 12],
            hash_alg: *b"S256",
            cipher_alg: *b"AES1",
            auth_tag_alg: *b"HS32",
            key_agreement_alg,
            sas_alg: *b"B32 ",
            value,
            mac: [0x55; 8],
        }
    }

    #[test]
    fn test_commit_packet_codec() {
        let commit = commit(CommitValue::Hvi([0x44; 32]), *b"X255");
        assert_eq!(commit.header.length, 29);

        let bytes = commit.to_bytes();
        let (rem, parsed) = CommitPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.zid, commit.zid);
        assert_eq!(parsed.hash_alg, commit.hash_alg);
        assert_eq!(parsed.value, commit.value);
        assert!(!parsed.is_multistream());
    }

    #[test]
    fn test_multistream_commit_layout() {
        let commit = commit(CommitValue::Nonce([0x66; 16]), KEY_AGREEMENT_MULT);
        assert_eq!(commit.header.length, 25);

        let bytes = commit.to_bytes();
        let (_, parsed) = CommitPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.value, CommitValue::Nonce([0x66; 16]));
        assert!(parsed.is_multistream());
    }

    #[test]
    fn test_commit_bad_value_length() {
        let mut commit = commit(CommitValue::Nonce([0x66; 16]), KEY_AGREEMENT_MULT);
        commit.header.length = 27;
        let mut bytes = commit.to_bytes();
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(CommitPacket::parse(&bytes).is_err());
    }
}
