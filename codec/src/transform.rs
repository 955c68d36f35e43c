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

//! Payload transforms applied before framing
//!
//! A [`MessageTransform`] pairs a [`Compression`] algorithm with an
//! [`Encryption`] mode. Outbound payloads are compressed first and then
//! encrypted; inbound payloads are decrypted first and then decompressed.
//!
//! Compression is backed by `async-compression`. Each payload is a complete
//! in-memory buffer, so the async encoders are driven to completion with a
//! local executor and never actually suspend.

use crate::{CodecError, CryptoError, Result};
use async_compression::tokio::bufread::{
    BrotliDecoder, BrotliEncoder, DeflateDecoder, DeflateEncoder, GzipDecoder, GzipEncoder,
    ZlibDecoder, ZlibEncoder, ZstdDecoder, ZstdEncoder,
};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Compression algorithm applied to each message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Payloads pass through unchanged
    #[default]
    None,
    /// Gzip (RFC 1952)
    Gzip,
    /// Raw DEFLATE (RFC 1951)
    Deflate,
    /// DEFLATE with a zlib wrapper (RFC 1950)
    Zlib,
    /// Brotli
    Brotli,
    /// Zstandard
    Zstd,
}

impl Compression {
    /// Compress a complete payload
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        let result = match self {
            Compression::None => return Ok(data.to_vec()),
            Compression::Gzip => read_all(GzipEncoder::new(data), usize::MAX),
            Compression::Deflate => read_all(DeflateEncoder::new(data), usize::MAX),
            Compression::Zlib => read_all(ZlibEncoder::new(data), usize::MAX),
            Compression::Brotli => read_all(BrotliEncoder::new(data), usize::MAX),
            Compression::Zstd => read_all(ZstdEncoder::new(data), usize::MAX),
        };
        result.map_err(|source| CodecError::Compression {
            algorithm: self,
            source,
        })
    }

    /// Decompress a complete payload
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        self.decompress_limited(data, usize::MAX)
    }

    /// Decompress a complete payload, refusing output larger than `limit`
    ///
    /// Decoding stops one byte past the limit, so a small compressed
    /// payload cannot expand into an unbounded allocation.
    pub fn decompress_limited(self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        let bound = limit.saturating_add(1);
        let result = match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => read_all(GzipDecoder::new(data), bound),
            Compression::Deflate => read_all(DeflateDecoder::new(data), bound),
            Compression::Zlib => read_all(ZlibDecoder::new(data), bound),
            Compression::Brotli => read_all(BrotliDecoder::new(data), bound),
            Compression::Zstd => read_all(ZstdDecoder::new(data), bound),
        };
        let out = result.map_err(|source| CodecError::Compression {
            algorithm: self,
            source,
        })?;
        if out.len() > limit {
            return Err(CodecError::PayloadTooLarge { max: limit });
        }
        Ok(out)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Zlib => write!(f, "zlib"),
            Compression::Brotli => write!(f, "brotli"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

fn read_all<R: AsyncRead>(reader: R, bound: usize) -> std::io::Result<Vec<u8>> {
    futures::executor::block_on(async move {
        let mut reader = std::pin::pin!(reader.take(bound as u64));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    })
}

/// Application supplied payload cipher
///
/// The engine does not ship ciphers of its own; the surrounding application
/// implements this trait and hands it to a listener or connector through
/// [`Encryption::Service`].
///
/// # Example
///
/// ```
/// use sockhost_codec::{CryptoError, CryptoService};
///
/// struct XorCipher(u8);
///
/// impl CryptoService for XorCipher {
///     fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
///         Ok(plain.iter().map(|b| b ^ self.0).collect())
///     }
///
///     fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError> {
///         Ok(cipher.iter().map(|b| b ^ self.0).collect())
///     }
/// }
/// ```
pub trait CryptoService: Send + Sync + 'static {
    /// Encrypt an outbound payload
    fn encrypt(&self, plain: &[u8]) -> std::result::Result<Vec<u8>, CryptoError>;

    /// Decrypt an inbound payload
    fn decrypt(&self, cipher: &[u8]) -> std::result::Result<Vec<u8>, CryptoError>;
}

/// Encryption mode for message payloads
#[derive(Clone, Default)]
pub enum Encryption {
    /// Payloads are sent in the clear
    #[default]
    None,
    /// Payloads are passed through an application cipher
    Service(Arc<dyn CryptoService>),
}

impl Encryption {
    /// Wrap a crypto service
    pub fn service(service: impl CryptoService) -> Self {
        Encryption::Service(Arc::new(service))
    }

    /// Check if encryption is disabled
    pub fn is_none(&self) -> bool {
        matches!(self, Encryption::None)
    }
}

impl fmt::Debug for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encryption::None => write!(f, "Encryption::None"),
            Encryption::Service(_) => write!(f, "Encryption::Service(..)"),
        }
    }
}

/// Combined compression and encryption pipeline for one connection
#[derive(Debug, Clone, Default)]
pub struct MessageTransform {
    compression: Compression,
    encryption: Encryption,
}

impl MessageTransform {
    /// Create a transform from its two stages
    pub fn new(compression: Compression, encryption: Encryption) -> Self {
        Self {
            compression,
            encryption,
        }
    }

    /// A transform that leaves payloads untouched
    pub fn identity() -> Self {
        Self::default()
    }

    /// Get the compression stage
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Get the encryption stage
    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    /// Check if both stages are disabled
    pub fn is_identity(&self) -> bool {
        self.compression == Compression::None && self.encryption.is_none()
    }

    /// Apply the outbound transform: compress, then encrypt
    pub fn encode<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        if self.is_identity() {
            return Ok(Cow::Borrowed(payload));
        }
        let compressed = match self.compression {
            Compression::None => Cow::Borrowed(payload),
            algorithm => Cow::Owned(algorithm.compress(payload)?),
        };
        match &self.encryption {
            Encryption::None => Ok(compressed),
            Encryption::Service(service) => service
                .encrypt(&compressed)
                .map(Cow::Owned)
                .map_err(CodecError::Crypto),
        }
    }

    /// Apply the inbound transform: decrypt, then decompress
    pub fn decode(&self, payload: Bytes) -> Result<Bytes> {
        self.decode_limited(payload, usize::MAX)
    }

    /// Apply the inbound transform, refusing payloads larger than `limit`
    pub fn decode_limited(&self, payload: Bytes, limit: usize) -> Result<Bytes> {
        let decrypted = match &self.encryption {
            Encryption::None => payload,
            Encryption::Service(service) => service
                .decrypt(&payload)
                .map(Bytes::from)
                .map_err(CodecError::Crypto)?,
        };
        match self.compression {
            Compression::None if decrypted.len() > limit => {
                Err(CodecError::PayloadTooLarge { max: limit })
            }
            Compression::None => Ok(decrypted),
            algorithm => algorithm
                .decompress_limited(&decrypted, limit)
                .map(Bytes::from),
        }
    }
}
