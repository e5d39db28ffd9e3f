/*
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

use crate::error::{Result, ZrtpError};
use std::time::Duration;
use zrtp_crypto::SasScheme;

/// First retransmission interval for Hello.
pub const T1_INITIAL: Duration = Duration::from_millis(50);
/// Hello retransmissions never wait longer than this.
pub const T1_CAP: Duration = Duration::from_millis(200);
/// First retransmission interval for Commit, DHPart2, Confirm2, GoClear, Error and SASrelay.
pub const T2_INITIAL: Duration = Duration::from_millis(150);
pub const T2_CAP: Duration = Duration::from_millis(1200);
pub const T2_MAX_RETRIES: u32 = 10;
/// Hello retransmissions without a peer Hello before `NoZrtpQuick` is reported.
pub const NO_ZRTP_QUICK_RETRIES: u32 = 5;
/// How long a signaling responder waits before sending its own Commit.
pub const COMMIT_DELAY: Duration = Duration::from_millis(300);
/// Retained secret lifetime offered to peers, in seconds.
pub const DEFAULT_CACHE_TTL: u32 = 30 * 24 * 60 * 60;

/// Immutable configuration of a local identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZrtpConfig {
    /// Up to 16 bytes announced in Hello; padded with spaces.
    pub client_id: String,
    /// This endpoint acts as a trusted MiTM (PBX) and sets the M flag in Hello.
    pub is_mitm: bool,
    /// Profile used by [`crate::ZrtpIdentity::session_create_default`].
    pub default_profile: ZrtpProfile,
}

impl Default for ZrtpConfig {
    fn default() -> Self {
        Self {
            client_id: "ZRTP-Rust".to_string(),
            is_mitm: false,
            default_profile: ZrtpProfile::default(),
        }
    }
}

impl ZrtpConfig {
    pub(crate) fn client_id_block(&self) -> [u8; 16] {
        let mut block = [b' '; 16];
        let id = self.client_id.as_bytes();
        let len = id.len().min(16);
        block[..len].copy_from_slice(&id[..len]);
        block
    }
}

/// Per-session behaviour chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZrtpProfile {
    /// Start the key exchange as soon as discovery completes.
    pub autosecure: bool,
    /// Accept and offer GoClear.
    pub allowclear: bool,
    /// Set the disclosure flag in Confirm.
    pub disclose_bit: bool,
    /// Lifetime of retained secrets we create, in seconds. Zero disables caching.
    pub cache_ttl: u32,
    /// Upper bound on streams attached to one session.
    pub max_streams: usize,
    /// Hello retransmissions before the peer is declared as not speaking ZRTP.
    pub hello_max_retries: u32,
    /// SAS schemes offered, most preferred first.
    pub sas_schemes: Vec<SasScheme>,
    /// Auxiliary secret shared out of band, if any.
    pub aux_secret: Option<Vec<u8>>,
}

impl Default for ZrtpProfile {
    fn default() -> Self {
        Self {
            autosecure: true,
            allowclear: false,
            disclose_bit: false,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_streams: 2,
            hello_max_retries: 20,
            sas_schemes: vec![SasScheme::Base32, SasScheme::Base256],
            aux_secret: None,
        }
    }
}

impl ZrtpProfile {
    /// Returns a profile that never goes clear and prefers the word list SAS.
    pub fn strict() -> Self {
        Self {
            allowclear: false,
            disclose_bit: false,
            sas_schemes: vec![SasScheme::Base256, SasScheme::Base32],
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sas_schemes.is_empty() {
            return Err(ZrtpError::BadParam("profile offers no SAS scheme".into()));
        }
        if self.max_streams == 0 {
            return Err(ZrtpError::BadParam("max_streams must be at least 1".into()));
        }
        if self.hello_max_retries == 0 {
            return Err(ZrtpError::BadParam("hello_max_retries must be at least 1".into()));
        }
        Ok(())
    }
}
