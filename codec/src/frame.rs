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

//! Length-prefixed frame encoding and extraction
//!
//! Wire layout of one frame:
//!
//! ```text
//! +----------------------+-------------------+---------------------+
//! | fixed header (N)     | length (2, BE)    | payload             |
//! +----------------------+-------------------+---------------------+
//!                          = N + 2 + payload
//! ```
//!
//! The length field counts the whole frame so a receiver knows exactly how
//! many bytes to consume before the next frame begins.

use crate::{CodecError, MessageTransform, Result};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Size of the big-endian length field
pub const LENGTH_FIELD_SIZE: usize = 2;

/// Largest frame the 16-bit length field can describe
pub const MAX_FRAME_LENGTH: usize = u16::MAX as usize;

/// Default limit on a payload after the inbound transform (1 MiB)
pub const DEFAULT_MAX_DECODED_LENGTH: usize = 1 << 20;

/// Largest payload that fits in a frame behind a header of `header_len` bytes
pub fn max_payload_len(header_len: usize) -> usize {
    MAX_FRAME_LENGTH.saturating_sub(header_len + LENGTH_FIELD_SIZE)
}

/// One complete frame located inside a receive buffer
///
/// Both slices borrow from the scanned buffer; nothing is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    /// Payload bytes as they appeared on the wire (still transformed)
    pub payload: &'a [u8],
    /// Bytes following the frame, to be kept for the next scan
    pub remaining: &'a [u8],
}

impl RawFrame<'_> {
    /// Number of bytes the frame occupied in the scanned buffer
    pub fn consumed(&self, buffer_len: usize) -> usize {
        buffer_len - self.remaining.len()
    }
}

/// Write `header`, the length field and `payload` into `dst`
///
/// Fails only when the resulting frame would not fit the 16-bit length
/// field; callers must split larger payloads themselves.
pub fn encode_frame(payload: &[u8], header: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = header.len() + LENGTH_FIELD_SIZE + payload.len();
    if length > MAX_FRAME_LENGTH {
        return Err(CodecError::FrameTooLarge {
            length,
            max: MAX_FRAME_LENGTH,
        });
    }

    let mut field = [0u8; LENGTH_FIELD_SIZE];
    BigEndian::write_u16(&mut field, length as u16);

    dst.reserve(length);
    dst.put_slice(header);
    dst.put_slice(&field);
    dst.put_slice(payload);
    Ok(())
}

/// Locate the first complete frame at the start of `buffer`
///
/// Returns `Ok(None)` while more bytes are needed. The buffer is never
/// modified, so the same call can be repeated as the buffer grows, and
/// repeated on [`RawFrame::remaining`] to drain several frames.
///
/// Violations are reported as soon as the offending bytes are visible: a
/// header byte that differs from `header`, or a declared length shorter than
/// the prefix or longer than `max_frame_len`.
pub fn split_frame<'a>(
    buffer: &'a [u8],
    header: &[u8],
    max_frame_len: usize,
) -> Result<Option<RawFrame<'a>>> {
    let visible = buffer.len().min(header.len());
    if buffer[..visible] != header[..visible] {
        return Err(CodecError::HeaderMismatch);
    }

    let prefix = header.len() + LENGTH_FIELD_SIZE;
    if buffer.len() < prefix {
        return Ok(None);
    }

    let declared = BigEndian::read_u16(&buffer[header.len()..prefix]) as usize;
    if declared < prefix {
        return Err(CodecError::MalformedLength {
            declared,
            minimum: prefix,
        });
    }
    if declared > max_frame_len {
        return Err(CodecError::FrameTooLarge {
            length: declared,
            max: max_frame_len,
        });
    }
    if buffer.len() < declared {
        return Ok(None);
    }

    Ok(Some(RawFrame {
        payload: &buffer[prefix..declared],
        remaining: &buffer[declared..],
    }))
}

/// Message framer for one connection
///
/// Holds the host-wide fixed header, the connection's payload transform and
/// the largest frame the receiver is willing to buffer. Implements the
/// `tokio_util` codec traits so it can drive a `FramedRead` directly.
///
/// # Example
///
/// ```
/// use sockhost_codec::FrameCodec;
///
/// let codec = FrameCodec::new().with_header(vec![0xAA, 0x55]);
/// let frame = codec.encode(b"PING").unwrap();
/// assert_eq!(&frame[..], &[0xAA, 0x55, 0x00, 0x08, b'P', b'I', b'N', b'G']);
///
/// let (payload, rest) = codec.try_extract(&frame).unwrap().unwrap();
/// assert_eq!(&payload[..], b"PING");
/// assert!(rest.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    header: Bytes,
    transform: MessageTransform,
    max_frame_len: usize,
    max_decoded_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with no header, no transform and the full 16-bit limit
    pub fn new() -> Self {
        Self {
            header: Bytes::new(),
            transform: MessageTransform::identity(),
            max_frame_len: MAX_FRAME_LENGTH,
            max_decoded_len: DEFAULT_MAX_DECODED_LENGTH,
        }
    }

    /// Set the fixed header prepended to every frame
    pub fn with_header(mut self, header: impl Into<Bytes>) -> Self {
        self.header = header.into();
        self
    }

    /// Set the payload transform
    pub fn with_transform(mut self, transform: MessageTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the largest declared frame length accepted on receive
    ///
    /// Values above [`MAX_FRAME_LENGTH`] are clamped.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max.min(MAX_FRAME_LENGTH);
        self
    }

    /// Set the largest payload accepted after the inbound transform
    ///
    /// Bounds what a compressed frame may expand to.
    pub fn with_max_decoded_len(mut self, max: usize) -> Self {
        self.max_decoded_len = max;
        self
    }

    /// Get the fixed header
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Get the payload transform
    pub fn transform(&self) -> &MessageTransform {
        &self.transform
    }

    /// Get the receive-side frame limit
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Get the receive-side limit on decoded payloads
    pub fn max_decoded_len(&self) -> usize {
        self.max_decoded_len
    }

    /// Largest payload (after transform) that can be encoded
    pub fn max_payload_len(&self) -> usize {
        max_payload_len(self.header.len())
    }

    /// Transform and frame a payload
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(payload, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Transform and frame a payload, appending to `dst`
    pub fn encode_into(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        let transformed = self.transform.encode(payload)?;
        encode_frame(&transformed, &self.header, dst)
    }

    /// Extract and inverse-transform the first complete frame in `buffer`
    ///
    /// Returns the payload and the unconsumed remainder, or `None` if the
    /// buffer does not yet hold a complete frame.
    pub fn try_extract<'a>(&self, buffer: &'a [u8]) -> Result<Option<(Bytes, &'a [u8])>> {
        match split_frame(buffer, &self.header, self.max_frame_len)? {
            Some(raw) => {
                let payload = self
                    .transform
                    .decode_limited(Bytes::copy_from_slice(raw.payload), self.max_decoded_len)?;
                Ok(Some((payload, raw.remaining)))
            }
            None => Ok(None),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let consumed = match split_frame(src, &self.header, self.max_frame_len)? {
            Some(raw) => raw.consumed(src.len()),
            None => return Ok(None),
        };

        let frame = src.split_to(consumed).freeze();
        let payload = frame.slice(self.header.len() + LENGTH_FIELD_SIZE..);
        trace!(frame_len = consumed, buffered = src.len(), "Frame extracted");
        self.transform
            .decode_limited(payload, self.max_decoded_len)
            .map(Some)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.encode_into(&item, dst)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        self.encode_into(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const HEADER: &[u8] = &[0xAA, 0x55];

    #[test]
    fn test_ping_scenario() {
        let mut dst = BytesMut::new();
        encode_frame(b"PING", HEADER, &mut dst).unwrap();
        assert_eq!(&dst[..], &[0xAA, 0x55, 0x00, 0x08, 0x50, 0x49, 0x4E, 0x47]);

        let raw = split_frame(&dst, HEADER, MAX_FRAME_LENGTH)
            .unwrap()
            .unwrap();
        assert_eq!(raw.payload, b"PING");
        assert!(raw.remaining.is_empty());
        assert_eq!(raw.consumed(dst.len()), 8);
    }

    #[test]
    fn test_empty_payload() {
        let codec = FrameCodec::new();
        let frame = codec.encode(b"").unwrap();
        assert_eq!(&frame[..], &[0x00, 0x02]);
        let (payload, rest) = codec.try_extract(&frame).unwrap().unwrap();
        assert!(payload.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_encode_limit() {
        let fits = vec![0u8; max_payload_len(HEADER.len())];
        let mut dst = BytesMut::new();
        encode_frame(&fits, HEADER, &mut dst).unwrap();
        assert_eq!(dst.len(), MAX_FRAME_LENGTH);

        let too_big = vec![0u8; fits.len() + 1];
        let err = encode_frame(&too_big, HEADER, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FrameTooLarge {
                length: 65536,
                max: MAX_FRAME_LENGTH
            }
        ));
    }

    #[test]
    fn test_need_more_data() {
        assert_eq!(split_frame(&[], HEADER, MAX_FRAME_LENGTH).unwrap(), None);
        assert_eq!(split_frame(&[0xAA], HEADER, MAX_FRAME_LENGTH).unwrap(), None);
        assert_eq!(
            split_frame(&[0xAA, 0x55, 0x00, 0x08, 0x50], HEADER, MAX_FRAME_LENGTH).unwrap(),
            None
        );
    }

    #[test]
    fn test_header_mismatch_detected_early() {
        let err = split_frame(&[0xAB], HEADER, MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(err, CodecError::HeaderMismatch));
    }

    #[test]
    fn test_declared_length_too_short() {
        let err = split_frame(&[0xAA, 0x55, 0x00, 0x03], HEADER, MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedLength {
                declared: 3,
                minimum: 4
            }
        ));
    }

    #[test]
    fn test_declared_length_over_buffer_limit() {
        // Rejected from the length field alone, before the payload arrives.
        let err = split_frame(&[0x01, 0x00], &[], 128).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FrameTooLarge {
                length: 256,
                max: 128
            }
        ));
    }

    #[test]
    #[traced_test]
    fn test_decoder_leaves_remainder() {
        let mut codec = FrameCodec::new().with_header(HEADER.to_vec());
        let mut buf = BytesMut::new();
        codec.encode_into(b"one", &mut buf).unwrap();
        codec.encode_into(b"two", &mut buf).unwrap();
        buf.extend_from_slice(&[0xAA, 0x55, 0x00]);

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], &[0xAA, 0x55, 0x00]);
        assert!(logs_contain("Frame extracted"));
    }

    #[test]
    fn test_max_frame_len_clamped() {
        let codec = FrameCodec::new().with_max_frame_len(1 << 20);
        assert_eq!(codec.max_frame_len(), MAX_FRAME_LENGTH);
    }
}
