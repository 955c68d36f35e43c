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

//! Error types for the connection host

use sockhost_codec::CodecError;
use sockhost_pool::{PoolError, WorkError};
use std::time::Duration;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Connection host error types
#[derive(Debug, Error)]
pub enum HostError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or transform error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Worker pool error
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// The remote side closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// No traffic within the configured idle timeout
    #[error("Connection idle for longer than {0:?}")]
    IdleTimeout(Duration),

    /// An application callback failed or panicked
    #[error("Handler fault: {0}")]
    Handler(#[source] WorkError),

    /// Outbound connect failed
    #[error("Failed to connect to {address}: {source}")]
    ConnectFailed {
        /// Remote address as configured
        address: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Host has not been started
    #[error("Host not running")]
    NotRunning,

    /// Host has been stopped and cannot be reused
    #[error("Host stopped")]
    Stopped,

    /// `start()` was called twice
    #[error("Host already started")]
    AlreadyStarted,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HostError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors are those that don't indicate a fatal condition
    /// and where retrying the operation might succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HostError::Io(_)
                | HostError::ConnectionClosed
                | HostError::IdleTimeout(_)
                | HostError::ConnectFailed { .. }
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            HostError::Io(_)
                | HostError::ConnectionClosed
                | HostError::ConnectFailed { .. }
        )
    }

    /// Check if the error is a wire protocol violation
    pub fn is_protocol_error(&self) -> bool {
        match self {
            HostError::Codec(e) => e.is_protocol_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_is_recoverable() {
        assert!(HostError::ConnectionClosed.is_recoverable());
        assert!(HostError::IdleTimeout(Duration::from_secs(1)).is_recoverable());
        assert!(HostError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_recoverable());
        assert!(!HostError::Stopped.is_recoverable());
        assert!(!HostError::InvalidConfig("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_is_connection_error() {
        assert!(HostError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_connection_error());
        assert!(HostError::ConnectionClosed.is_connection_error());
        assert!(!HostError::NotRunning.is_connection_error());
    }

    #[test]
    fn test_error_is_protocol_error() {
        let violation = HostError::Codec(CodecError::FrameTooLarge {
            length: 70000,
            max: 65535,
        });
        assert!(violation.is_protocol_error());
        assert!(!HostError::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = HostError::IdleTimeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "Connection idle for longer than 3s");

        let err = HostError::Handler(WorkError::Panicked("boom".into()));
        assert_eq!(err.to_string(), "Handler fault: panicked: boom");

        let err = HostError::ConnectFailed {
            address: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.to_string().starts_with("Failed to connect to 127.0.0.1:1"));
    }
}
