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

//! ZRTP key-agreement engine.
//!
//! A [`ZrtpIdentity`] owns the local ZID, the retained-secret cache and any
//! number of sessions. Each session groups the media streams of one call;
//! the first stream runs the Diffie-Hellman exchange and the others derive
//! their keys from it in multistream mode. The engine never performs I/O:
//! outbound packets and events are handed to a [`ZrtpHost`], inbound
//! datagrams come in through [`ZrtpIdentity::process_incoming`], and time
//! is driven by [`ZrtpIdentity::handle_timeout`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use zrtp_core::{SignalingRole, StreamEvent, StreamHandle, ZrtpConfig, ZrtpHost, ZrtpIdentity};
//!
//! struct Host;
//!
//! impl ZrtpHost for Host {
//!     fn send_packet(&self, _stream: StreamHandle, _packet: &[u8]) {}
//!     fn on_event(&self, stream: StreamHandle, event: StreamEvent) {
//!         println!("{:?}: {:?}", stream, event);
//!     }
//! }
//!
//! # fn main() -> zrtp_core::Result<()> {
//! let cache = Arc::new(zrtp_core::SqliteCache::new("zrtp.db")?);
//! let identity = ZrtpIdentity::new(ZrtpConfig::default(), cache, Arc::new(Host))?;
//! let session = identity.session_create_default(SignalingRole::Initiator)?;
//! let audio = identity.stream_attach(session)?;
//! identity.stream_start(audio, 0x1234_5678)?;
//! # Ok(())
//! # }
//! ```

mod arena;
mod chain;
pub mod dispatch;
mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod options;
mod pbx;
mod secrets;
mod session;
pub mod state;

pub use dispatch::{DropReason, PacketDisposition};
pub use error::{ProtocolError, Result, ZrtpError};
pub use events::{ProtocolEvent, SecurityEvent, StreamEvent, ZrtpHost};
pub use identity::{SessionHandle, SessionInfo, StreamHandle, StreamInfo, ZrtpIdentity};
pub use options::{ZrtpConfig, ZrtpProfile};
pub use secrets::{SecretFlags, SecretStatus};
pub use session::NegotiatedAlgorithms;
pub use state::{HandshakePhase, MitmMode, Role, SignalingRole, StreamMode, ZrtpState};

pub use zrtp_cache::{InMemoryCache, SqliteCache, Zid, ZidCache};
pub use zrtp_crypto::{CryptoProvider, DefaultCryptoProvider, SasScheme};
pub use zrtp_proto::MediaKind;
