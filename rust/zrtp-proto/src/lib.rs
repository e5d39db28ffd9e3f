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

//! ZRTP wire protocol.
//!
//! Message codecs built on `nom`, the transport frame with its CRC, and the
//! classifier separating protocol traffic from media.

pub mod packets;
pub mod transport;
pub mod classify;

pub use classify::{classify, MediaKind, PacketKind};
pub use transport::{frame, unframe, FrameError, TransportHeader};
