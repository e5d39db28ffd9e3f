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

//! Routing of inbound datagrams to their stream.

use crate::error::{Result, ZrtpError};
use crate::identity::{StreamHandle, ZrtpIdentity};
use zrtp_proto::{classify, MediaKind, PacketKind};

/// Why a datagram had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Bad frame: CRC, magic, or a message that does not parse.
    Malformed,
    /// Valid frame carrying an unknown message type.
    UnknownMessage,
    /// Message not expected in the current state, or a stale retransmission.
    Unexpected,
    /// Neither ZRTP nor RTP/RTCP.
    NotRecognized,
}

/// Outcome of handing a datagram to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDisposition {
    /// Consumed by the protocol engine.
    Protocol,
    /// Media for the host's SRTP path.
    Media(MediaKind),
    Dropped(DropReason),
    /// No live stream is registered under the identifier.
    UnknownStream,
}

impl ZrtpIdentity {
    /// Routes a datagram received for the host stream id `stream_id`.
    ///
    /// Never fails: datagrams for unknown or torn down streams are reported
    /// as [`PacketDisposition::UnknownStream`].
    pub fn process_incoming(&self, stream_id: u32, bytes: &[u8]) -> PacketDisposition {
        let Some(stream) = self.route(stream_id) else {
            log::debug!("datagram for unknown stream {:#010x}", stream_id);
            return PacketDisposition::UnknownStream;
        };
        match self.stream_feed_packet(stream, bytes) {
            Ok(disposition) => disposition,
            Err(ZrtpError::NotFound(_)) => PacketDisposition::UnknownStream,
            Err(e) => {
                log::warn!("datagram for stream {:#010x} rejected: {}", stream_id, e);
                PacketDisposition::UnknownStream
            }
        }
    }

    /// Feeds a datagram to `stream` directly.
    pub fn stream_feed_packet(&self, stream: StreamHandle, bytes: &[u8]) -> Result<PacketDisposition> {
        match classify(bytes) {
            PacketKind::Zrtp => self.with_stream(stream, |s, ctx| Ok(s.receive(ctx, bytes))),
            PacketKind::Media(kind) => {
                // Still reject stale handles so the host learns the stream is gone.
                self.with_stream(stream, |_, _| Ok(PacketDisposition::Media(kind)))
            }
            PacketKind::Unknown => {
                log::warn!("unrecognised datagram of {} bytes", bytes.len());
                self.with_stream(stream, |s, _| {
                    s.dropped += 1;
                    Ok(PacketDisposition::Dropped(DropReason::NotRecognized))
                })
            }
        }
    }

    fn route(&self, stream_id: u32) -> Option<StreamHandle> {
        self.routes.get(&stream_id).map(|route| *route.value())
    }
}
