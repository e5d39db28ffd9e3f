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

/// Length of the encrypted part of a Confirm packet.
pub const CONFIRM_ENCRYPTED_LEN: usize = 40;

/// The Confirm packet is used to confirm the keys and state.
///
/// Defined in RFC 6189 Section 5.7.
#[derive(Debug, Clone)]
pub struct ConfirmPacket {
    /// Common ZRTP header.
    pub header: ZrtpPacketHeader,
    /// HMAC over the encrypted part.
    pub hmac: [u8; 8],
    /// Initialization Vector for the encrypted part.
    pub iv: [u8; 16],
    /// The H0 hash value.
    pub hash_h0: [u8; 32],
    /// Unused filler bytes.
    pub filler: [u8; 2],
    /// Length of the signature, if present.
    pub sig_length: u8,
    /// E, V, A and D flags.
    pub flags: u8,
    /// Cache expiration interval in seconds.
    pub exp_time: u32,
}

impl ConfirmPacket {
    /// The message type identifier for Confirm1 packets.
    pub const MESSAGE_TYPE_CONF1: [u8; 8] = *b"Confirm1";
    /// The message type identifier for Confirm2 packets.
    pub const MESSAGE_TYPE_CONF2: [u8; 8] = *b"Confirm2";

    /// PBX enrollment.
    pub const FLAG_ENROLLMENT: u8 = 0x08;
    /// SAS verified.
    pub const FLAG_SAS_VERIFIED: u8 = 0x04;
    /// Allow clear.
    pub const FLAG_ALLOW_CLEAR: u8 = 0x02;
    /// Disclosure.
    pub const FLAG_DISCLOSE: u8 = 0x01;

    /// Builds a plaintext Confirm; the caller encrypts it with [`Self::set_encrypted_part`].
    pub fn new(message_type: [u8; 8], hash_h0: [u8; 32], flags: u8, exp_time: u32) -> Self {
        Self {
            header: ZrtpPacketHeader::new(message_type, HEADER_LEN + 8 + 16 + CONFIRM_ENCRYPTED_LEN),
            hmac: [0u8; 8],
            iv: [0u8; 16],
            hash_h0,
            filler: [0u8; 2],
            sig_length: 0,
            flags,
            exp_time,
        }
    }

    /// Parses a Confirm packet from the given input bytes.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, hmac_bytes) = take(8usize)(input)?;
        let (input, iv_bytes) = take(16usize)(input)?;
        let (input, hash_h0_bytes) = take(32usize)(input)?;
        let (input, filler_bytes) = take(2usize)(input)?;
        let (input, sig_length_bytes) = take(1usize)(input)?;
        let (input, flags_bytes) = take(1usize)(input)?;
        let (input, exp_time) = be_u32(input)?;

        let mut hmac = [0u8; 8];
        hmac.copy_from_slice(hmac_bytes);

        let mut iv = [0u8; 16];
        iv.copy_from_slice(iv_bytes);

        let mut hash_h0 = [0u8; 32];
        hash_h0.copy_from_slice(hash_h0_bytes);

        let mut filler = [0u8; 2];
        filler.copy_from_slice(filler_bytes);

        Ok((input, Self {
            header,
            hmac,
            iv,
            hash_h0,
            filler,
            sig_length: sig_length_bytes[0],
            flags: flags_bytes[0],
            exp_time,
        }))
    }

    /// Serializes the Confirm packet into its byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.hmac);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.encrypted_part());
        bytes
    }

    /// The 40 bytes covered by encryption and the confirm MAC.
    pub fn encrypted_part(&self) -> Vec<u8> {
        let mut part = Vec::with_capacity(CONFIRM_ENCRYPTED_LEN);
        part.extend_from_slice(&self.hash_h0);
        part.extend_from_slice(&self.filler);
        part.push(self.sig_length);
        part.push(self.flags);
        part.extend_from_slice(&self.exp_time.to_be_bytes());
        part
    }

    /// Replaces the 40 encrypted bytes, e.g. after encryption or decryption.
    ///
    /// Returns `false` if `part` has the wrong length.
    pub fn set_encrypted_part(&mut self, part: &[u8]) -> bool {
        if part.len() != CONFIRM_ENCRYPTED_LEN {
            return false;
        }
        self.hash_h0.copy_from_slice(&part[0..32]);
        self.filler.copy_from_slice(&part[32..34]);
        self.sig_length = part[34];
        self.flags = part[35];
        self.exp_time = u32::from_be_bytes([part[36], part[37], part[38], part[39]]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_packet_codec() {
        let mut confirm = ConfirmPacket::new(
            ConfirmPacket::MESSAGE_TYPE_CONF1,
            [0xDD; 32],
            ConfirmPacket::FLAG_ALLOW_CLEAR,
            0x12345678,
        );
        confirm.hmac = [0xBB; 8];
        confirm.iv = [0xCC; 16];
        assert_eq!(confirm.header.length, 19);

        let bytes = confirm.to_bytes();
        let (rem, parsed) = ConfirmPacket::parse(&bytes).unwrap();

        assert_eq!(rem.len(), 0);
        assert_eq!(parsed.hmac, confirm.hmac);
        assert_eq!(parsed.hash_h0, confirm.hash_h0);
        assert_eq!(parsed.exp_time, confirm.exp_time);
        assert_eq!(parsed.flags, ConfirmPacket::FLAG_ALLOW_CLEAR);
    }

    #[test]
    fn test_encrypted_part_replacement() {
        let mut confirm = ConfirmPacket::new(ConfirmPacket::MESSAGE_TYPE_CONF2, [0x01; 32], 0x0F, 7);
        let mut part = confirm.encrypted_part();
        part[35] = ConfirmPacket::FLAG_DISCLOSE;
        assert!(confirm.set_encrypted_part(&part));
        assert_eq!(confirm.flags, ConfirmPacket::FLAG_DISCLOSE);
        assert_eq!(confirm.exp_time, 7);
        assert!(!confirm.set_encrypted_part(&part[..39]));
    }
}
