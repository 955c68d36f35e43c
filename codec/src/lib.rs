//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! # Sockhost Message Codec
//!
//! Wire framing for the sockhost connection engine. Every application message
//! travels as one frame:
//!
//! ```text
//! [fixed header: N bytes][length: u16 big-endian = N + 2 + payload][payload]
//! ```
//!
//! ## Core Components
//!
//! ### [`FrameCodec`]
//!
//! The per-connection framer. It applies the connection's
//! [`MessageTransform`] to outbound payloads before framing them, and
//! extracts complete frames from a growing receive buffer on the way in.
//! It implements [`tokio_util::codec::Decoder`] and
//! [`tokio_util::codec::Encoder`] so it can sit directly under a
//! `FramedRead`/`FramedWrite`.
//!
//! ### [`split_frame`] and [`encode_frame`]
//!
//! The transform-free primitives. `split_frame` borrows the buffer it scans
//! and returns views over the payload and the remainder, so callers that own
//! a reassembly buffer decide themselves when to discard consumed bytes.
//!
//! ### [`MessageTransform`]
//!
//! Optional compression ([`Compression`]) and encryption ([`Encryption`],
//! backed by an application [`CryptoService`]).
//!
//! ## Limits
//!
//! The length field is 16 bits, so a frame is at most 65535 bytes including
//! header and length field. Encoding a larger payload fails with
//! [`CodecError::FrameTooLarge`]; callers are expected to chunk.
//!
//! On receive, the payload produced by undoing the transform is capped by
//! [`FrameCodec::with_max_decoded_len`] (default
//! [`DEFAULT_MAX_DECODED_LENGTH`]). A frame that would decompress past the
//! cap fails with [`CodecError::PayloadTooLarge`] instead of allocating.

mod error;
mod frame;
mod transform;

pub use error::{CodecError, CryptoError, Result};
pub use frame::{
    DEFAULT_MAX_DECODED_LENGTH, FrameCodec, LENGTH_FIELD_SIZE, MAX_FRAME_LENGTH, RawFrame, encode_frame, max_payload_len,
    split_frame,
};
pub use transform::{Compression, CryptoService, Encryption, MessageTransform};
