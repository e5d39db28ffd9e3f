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

/// Length of the encrypted part of a SASrelay packet.
pub const SAS_RELAY_ENCRYPTED_LEN: usize = 2 + 1 + 1 + 4 + 32;

/// The SASrelay packet carries a SAS from one leg of a trusted MiTM to the other.
///
/// Defined in RFC 6189 Section 5.13.
#[derive(Debug, Clone)]
pub struct SasRelayPacket {
    pub header: ZrtpPacketHeader,
    /// HMAC over the encrypted part.
    pub hmac: [u8; 8],
    pub iv: [u8; 16],
    pub filler: [u8; 2],
    pub sig_length: u8,
    pub flags: u8,
    /// SAS rendering scheme of the relayed SAS (e.g., "B32 ").
    pub rendering: [u8; 4],
    /// SAS hash of the other leg.
    pub sas_hash: [u8; 32],
}

impl SasRelayPacket {
    pub const MESSAGE_TYPE: [u8; 8] = *b"SASrelay";

    pub fn new(flags: u8, rendering: [u8; 4], sas_hash: [u8; 32]) -> Self {
        Self {
            header: ZrtpPacketHeader::new(Self::MESSAGE_TYPE, HEADER_LEN + 8 + 16 + SAS_RELAY_ENCRYPTED_LEN),
            hmac: [0u8; 8],
            iv: [0u8; 16],
            filler: [0u8; 2],
            sig_length: 0,
            flags,
            rendering,
            sas_hash,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = ZrtpPacketHeader::parse(input)?;
        let (input, hmac_bytes) = take(8usize)(input)?;
        let (input, iv_bytes) = take(16usize)(input)?;
        let (input, encrypted) = take(SAS_RELAY_ENCRYPTED_LEN)(input)?;

        let mut relay = Self::new(0, [0u8; 4], [0u8; 32]);
        relay.header = header;
        relay.hmac.copy_from_slice(hmac_bytes);
        relay.iv.copy_from_slice(iv_bytes);
        relay.set_encrypted_part(encrypted);
        Ok((input, relay))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.hmac);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.encrypted_part());
        bytes
    }

    pub fn encrypted_part(&self) -> Vec<u8> {
        let mut part = Vec::with_capacity(SAS_RELAY_ENCRYPTED_LEN);
        part.extend_from_slice(&self.filler);
        part.push(self.sig_length);
        part.push(self.flags);
        part.extend_from_slice(&self.rendering);
        part.extend_from_slice(&self.sas_hash);
        part
    }

    /// Replaces the encrypted bytes. Returns `false` on a length mismatch.
    pub fn set_encrypted_part(&mut self, part: &[u8]) -> bool {
        if part.len() != SAS_RELAY_ENCRYPTED_LEN {
            return false;
        }
        self.filler.copy_from_slice(&part[0..2]);
        self.sig_length = part[2];
        self.flags = part[3];
        self.rendering.copy_from_slice(&part[4..8]);
        self.sas_hash.copy_from_slice(&part[8..40]);
        true
    }
}
