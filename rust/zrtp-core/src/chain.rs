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

//! Our H0..H3 hash chain and verification of the peer's.
//!
//! Each message reveals a preimage of the previous message's hash and the key
//! of the previous message's MAC: Hello carries H3 and is keyed with H2,
//! Commit carries H2 keyed with H1, DHPart carries H1 keyed with H0 and
//! Confirm reveals H0.

use crate::error::ProtocolError;
use zrtp_crypto::{constant_time_eq, kdf::truncated_mac, random_array, Hash};
use zrtp_proto::packets::{split_mac, MessageType};

pub(crate) struct HashChain {
    links: [[u8; 32]; 4],
}

impl HashChain {
    pub fn generate(hash: &dyn Hash) -> Self {
        let mut links = [[0u8; 32]; 4];
        links[0] = random_array::<32>();
        for i in 1..4 {
            let digest = hash.digest(&links[i - 1]);
            links[i].copy_from_slice(&digest[..32]);
        }
        Self { links }
    }

    /// Link `Hn`.
    pub fn h(&self, n: usize) -> [u8; 32] {
        self.links[n]
    }
}

struct PendingMac {
    key_depth: usize,
    message: MessageType,
    data: Vec<u8>,
    mac: [u8; 8],
}

/// What we know of the peer's chain.
pub(crate) struct PeerChain {
    /// Revealed links, indexed by depth.
    revealed: [Option<[u8; 32]>; 4],
    /// Deepest link verified so far.
    depth: usize,
    pending: Vec<PendingMac>,
}

impl PeerChain {
    /// Starts from the H3 found in the peer's Hello.
    pub fn new(h3: [u8; 32]) -> Self {
        Self {
            revealed: [None, None, None, Some(h3)],
            depth: 3,
            pending: Vec::new(),
        }
    }

    /// Registers the MAC of `message`, keyed with link `key_depth`.
    ///
    /// The MAC is checked right away if the key is already known, otherwise
    /// once a later message reveals it.
    pub fn expect_mac(
        &mut self,
        hash: &dyn Hash,
        key_depth: usize,
        message: MessageType,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        let (data, mac) = split_mac(bytes).ok_or(ProtocolError::MalformedPacket)?;
        let mut tag = [0u8; 8];
        tag.copy_from_slice(mac);
        let pending = PendingMac {
            key_depth,
            message,
            data: data.to_vec(),
            mac: tag,
        };
        match self.revealed[key_depth] {
            Some(key) => verify(hash, &key, &pending),
            None => {
                self.pending.push(pending);
                Ok(())
            }
        }
    }

    /// Accepts link `Hn` from a message and checks it against what we know.
    pub fn reveal(&mut self, hash: &dyn Hash, value: [u8; 32], depth: usize) -> Result<(), ProtocolError> {
        if depth >= self.depth {
            // Retransmissions reveal the same link again.
            return match self.revealed[depth] {
                Some(known) if known == value => Ok(()),
                _ => Err(ProtocolError::WrongHashChain),
            };
        }

        let mut links = [None; 4];
        links[depth] = Some(value);
        let mut image = value;
        for d in depth + 1..=self.depth {
            let digest = hash.digest(&image);
            image.copy_from_slice(&digest[..32]);
            links[d] = Some(image);
        }
        if self.revealed[self.depth] != Some(image) {
            log::warn!("peer hash chain broken at H{}", depth);
            return Err(ProtocolError::WrongHashChain);
        }
        for (d, link) in links.iter().enumerate().take(self.depth).skip(depth) {
            self.revealed[d] = *link;
        }
        self.depth = depth;

        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.key_depth >= depth);
        self.pending = waiting;
        for pending in &ready {
            if let Some(key) = self.revealed[pending.key_depth] {
                verify(hash, &key, pending)?;
            }
        }
        Ok(())
    }

    /// Forgets the MACs of an aborted exchange and goes back to the Hello link.
    pub fn rewind(&mut self) {
        self.pending.clear();
        self.revealed = [None, None, None, self.revealed[3]];
        self.depth = 3;
    }
}

fn verify(hash: &dyn Hash, key: &[u8; 32], pending: &PendingMac) -> Result<(), ProtocolError> {
    let expected = truncated_mac(hash, key, &pending.data);
    if constant_time_eq(&expected, &pending.mac) {
        Ok(())
    } else {
        log::warn!("MAC of peer {:?} does not verify", pending.message);
        Err(ProtocolError::WrongMessageMac)
    }
}
