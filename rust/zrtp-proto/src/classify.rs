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

//! Inbound packet classification: ZRTP protocol traffic versus media.

use crate::transport::looks_like_zrtp;

/// Media carried alongside ZRTP on the same transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Rtp,
    Rtcp,
}

/// What an inbound datagram is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Zrtp,
    Media(MediaKind),
    Unknown,
}

/// Classifies a datagram from its first bytes.
pub fn classify(bytes: &[u8]) -> PacketKind {
    if looks_like_zrtp(bytes) {
        return PacketKind::Zrtp;
    }
    if bytes.len() >= 12 && bytes[0] >> 6 == 2 {
        // RTCP packet types SR..APP occupy 200..=204 in the second byte.
        return match bytes[1] {
            200..=204 => PacketKind::Media(MediaKind::Rtcp),
            _ => PacketKind::Media(MediaKind::Rtp),
        };
    }
    PacketKind::Unknown
}
