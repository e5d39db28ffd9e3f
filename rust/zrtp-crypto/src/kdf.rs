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

use crate::traits::Hash;

/// KDF label for the DH-mode s0 hash.
pub const KDF_STRING: &[u8] = b"ZRTP-HMAC-KDF";

/// A structure holding all derived keys for a ZRTP stream.
#[derive(Clone)]
pub struct ZrtpKeys {
    /// SRTP master key for initiator.
    pub srtp_key_i: Vec<u8>,
    /// SRTP master salt for initiator.
    pub srtp_salt_i: Vec<u8>,
    /// SRTP master key for responder.
    pub srtp_key_r: Vec<u8>,
    /// SRTP master salt for responder.
    pub srtp_salt_r: Vec<u8>,
    /// Key encrypting the initiator's Confirm and SASrelay.
    pub confirm_key_i: Vec<u8>,
    /// Key encrypting the responder's Confirm and SASrelay.
    pub confirm_key_r: Vec<u8>,
    /// MAC key of the initiator.
    pub mac_key_i: Vec<u8>,
    /// MAC key of the responder.
    pub mac_key_r: Vec<u8>,
    /// Hash of the SAS (Short Authentication String).
    pub sas_hash: Vec<u8>,
    /// ZRTP session key.
    pub zrtp_session: Vec<u8>,
    /// Exported key for application use.
    pub exported_key: Vec<u8>,
    /// New retained secret RS1.
    pub new_rs1: Vec<u8>,
}

impl std::fmt::Debug for ZrtpKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZrtpKeys").finish_non_exhaustive()
    }
}

/// `KDF_Context = ZIDi || ZIDr || total_hash`.
pub fn kdf_context(zid_i: &[u8; 12], zid_r: &[u8; 12], total_hash: &[u8]) -> Vec<u8> {
    let mut context = Vec::with_capacity(24 + total_hash.len());
    context.extend_from_slice(zid_i);
    context.extend_from_slice(zid_r);
    context.extend_from_slice(total_hash);
    context
}

/// Derives the S0 intermediate secret as defined in RFC 6189 Section 4.4.1.4.
///
/// S0 = hash(1 | DHResult | "ZRTP-HMAC-KDF" | ZIDi | ZIDr | total_hash | len(s1) | s1 | len(s2) | s2 | len(s3) | s3)
#[allow(clippy::too_many_arguments)]
pub fn derive_s0(
    hash: &dyn Hash,
    dh_result: &[u8],
    zrtp_kdf_str: &[u8],
    zid_i: &[u8; 12],
    zid_r: &[u8; 12],
    total_hash: &[u8],
    s1: Option<&[u8]>,
    s2: Option<&[u8]>,
    s3: Option<&[u8]>,
) -> Vec<u8> {
    let mut data = Vec::new();

    // counter = 1
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(dh_result);
    data.extend_from_slice(zrtp_kdf_str);
    data.extend_from_slice(zid_i);
    data.extend_from_slice(zid_r);
    data.extend_from_slice(total_hash);

    for s in &[s1, s2, s3] {
        if let Some(secret) = s {
            data.extend_from_slice(&(secret.len() as u32).to_be_bytes());
            data.extend_from_slice(secret);
        } else {
            data.extend_from_slice(&0u32.to_be_bytes());
        }
    }

    hash.digest(&data)
}

/// Multistream S0: `KDF(ZRTPSess, "ZRTP MSK", KDF_Context, hashlen)`.
pub fn derive_multistream_s0(hash: &dyn Hash, zrtp_session: &[u8], context: &[u8]) -> Vec<u8> {
    hash.kdf(zrtp_session, b"ZRTP MSK", context, hash.output_len())
}

/// Derives all stream keys from S0 as defined in RFC 6189 Section 4.5.3.
pub fn derive_session_keys(hash: &dyn Hash, s0: &[u8], context: &[u8], key_len: usize) -> ZrtpKeys {
    let hash_len = hash.output_len();
    ZrtpKeys {
        srtp_key_i: hash.kdf(s0, b"Initiator SRTP master key", context, key_len),
        srtp_salt_i: hash.kdf(s0, b"Initiator SRTP master salt", context, 14),
        srtp_key_r: hash.kdf(s0, b"Responder SRTP master key", context, key_len),
        srtp_salt_r: hash.kdf(s0, b"Responder SRTP master salt", context, 14),
        confirm_key_i: hash.kdf(s0, b"Initiator ZRTP key", context, key_len),
        confirm_key_r: hash.kdf(s0, b"Responder ZRTP key", context, key_len),
        mac_key_i: hash.kdf(s0, b"Initiator HMAC key", context, hash_len),
        mac_key_r: hash.kdf(s0, b"Responder HMAC key", context, hash_len),
        sas_hash: hash.kdf(s0, b"SAS", context, 32),
        zrtp_session: hash.kdf(s0, b"ZRTP Session Key", context, hash_len),
        exported_key: hash.kdf(s0, b"Exported key", context, hash_len),
        new_rs1: hash.kdf(s0, b"retained secret", context, hash_len),
    }
}

/// The secret shared with a trusted MiTM: `KDF(ZRTPSess, "Trusted MiTM key", KDF_Context, 32)`.
pub fn derive_pbx_secret(hash: &dyn Hash, zrtp_session: &[u8], context: &[u8]) -> Vec<u8> {
    hash.kdf(zrtp_session, b"Trusted MiTM key", context, 32)
}

/// Identifier of a retained secret as sent in DHPart: `HMAC(secret, role)[0..8]`.
pub fn secret_id(hash: &dyn Hash, secret: &[u8], role_label: &[u8]) -> [u8; 8] {
    let mac = hash.hmac(secret, role_label);
    let mut id = [0u8; 8];
    id.copy_from_slice(&mac[..8]);
    id
}

/// MAC truncated to the 8 bytes carried in ZRTP messages.
pub fn truncated_mac(hash: &dyn Hash, key: &[u8], data: &[u8]) -> [u8; 8] {
    let mac = hash.hmac(key, data);
    let mut out = [0u8; 8];
    out.copy_from_slice(&mac[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Sha256;

    #[test]
    fn test_s0_derivation() {
        let hash = Sha256;
        let dh_result = vec![0xAA; 32];
        let zid_i = [0x11; 12];
        let zid_r = [0x22; 12];
        let total_hash = vec![0x33; 32];

        let plain = derive_s0(&hash, &dh_result, KDF_STRING, &zid_i, &zid_r, &total_hash, None, None, None);
        assert_eq!(plain.len(), 32);

        let with_rs1 = derive_s0(
            &hash, &dh_result, KDF_STRING, &zid_i, &zid_r, &total_hash,
            Some(&[0x44; 32]), None, None,
        );
        assert_ne!(plain, with_rs1);
    }

    #[test]
    fn test_session_keys_are_role_separated() {
        let hash = Sha256;
        let context = kdf_context(&[0x11; 12], &[0x22; 12], &[0x33; 32]);
        let keys = derive_session_keys(&hash, &[0x55; 32], &context, 16);
        assert_eq!(keys.confirm_key_i.len(), 16);
        assert_eq!(keys.mac_key_r.len(), 32);
        assert_ne!(keys.confirm_key_i, keys.confirm_key_r);
        assert_ne!(keys.mac_key_i, keys.mac_key_r);
        assert_ne!(keys.new_rs1, keys.zrtp_session);
    }

    #[test]
    fn test_secret_id_depends_on_role() {
        let hash = Sha256;
        let secret = [0x77; 32];
        assert_ne!(secret_id(&hash, &secret, b"Initiator"), secret_id(&hash, &secret, b"Responder"));
        assert_eq!(secret_id(&hash, &secret, b"Initiator"), secret_id(&hash, &secret, b"Initiator"));
    }
}
