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

//! Error types for framing and payload transforms

use crate::Compression;
use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error returned by an application supplied [`CryptoService`](crate::CryptoService)
pub type CryptoError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Codec error types
#[derive(Debug, Error)]
pub enum CodecError {
    /// A frame (header + length field + payload) does not fit the limit
    ///
    /// On encode the limit is the 16-bit length field; on decode it is the
    /// configured message buffer size.
    #[error("Frame length {length} exceeds maximum {max}")]
    FrameTooLarge {
        /// Total frame length in bytes
        length: usize,
        /// Maximum allowed frame length
        max: usize,
    },

    /// The declared frame length cannot even hold the header and length field
    #[error("Declared frame length {declared} is shorter than the {minimum} byte prefix")]
    MalformedLength {
        /// Length read from the wire
        declared: usize,
        /// Header length plus the length field
        minimum: usize,
    },

    /// The payload grew past the receive limit when the transform was undone
    #[error("Decoded payload exceeds maximum {max}")]
    PayloadTooLarge {
        /// Maximum decoded payload length
        max: usize,
    },

    /// The fixed frame header did not match
    #[error("Frame header mismatch")]
    HeaderMismatch,

    /// Compression or decompression failed
    #[error("{algorithm} transform failed: {source}")]
    Compression {
        /// Algorithm in use
        algorithm: Compression,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The crypto service rejected the payload
    #[error("Crypto transform failed: {0}")]
    Crypto(#[source] CryptoError),

    /// I/O error surfaced through the tokio codec traits
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Check if the error means the peer violated the wire protocol
    ///
    /// Protocol violations are fatal for the connection that produced them.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            CodecError::FrameTooLarge { .. }
                | CodecError::PayloadTooLarge { .. }
                | CodecError::MalformedLength { .. }
                | CodecError::HeaderMismatch
                | CodecError::Compression { .. }
                | CodecError::Crypto(_)
        )
    }
}
