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

//! The capability set handed to the protocol engine.

use crate::backends::{AesCfb128, Sha256, X25519};
use crate::traits::{Cipher, DiffieHellman, Hash};

/// Supplies the hash, cipher and a fresh key agreement per stream.
pub trait CryptoProvider: Send + Sync {
    fn hash(&self) -> &dyn Hash;
    fn cipher(&self) -> &dyn Cipher;
    /// A new, unused key agreement instance.
    fn key_agreement(&self) -> Box<dyn DiffieHellman>;
    /// Wire id of the key agreement this provider creates.
    fn key_agreement_id(&self) -> [u8; 4];
    /// Wire ids of the SRTP auth tags this provider offers.
    fn auth_tag_ids(&self) -> Vec<[u8; 4]> {
        vec![*b"HS32", *b"HS80"]
    }
}

/// SHA-256, AES-128-CFB and X25519.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCryptoProvider;

impl CryptoProvider for DefaultCryptoProvider {
    fn hash(&self) -> &dyn Hash {
        &Sha256
    }

    fn cipher(&self) -> &dyn Cipher {
        &AesCfb128
    }

    fn key_agreement(&self) -> Box<dyn DiffieHellman> {
        Box::new(X25519::default())
    }

    fn key_agreement_id(&self) -> [u8; 4] {
        *b"X255"
    }
}
