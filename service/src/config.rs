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

//! Host and connector configuration
//!
//! # Examples
//!
//! ```
//! use sockhost_service::{HostConfig, ListenerConfig, ConnectorConfig, ReconnectPolicy};
//! use sockhost_codec::Compression;
//! use std::time::Duration;
//!
//! let host = HostConfig::default()
//!     .with_header(vec![0xAA, 0x55])
//!     .with_threads(2, 8)
//!     .with_idle_timeout(Some(Duration::from_secs(120)));
//! assert!(host.validate().is_ok());
//!
//! let listener = ListenerConfig::new("127.0.0.1:0".parse().unwrap())
//!     .with_backlog(256)
//!     .with_compression(Compression::Zstd);
//!
//! let connector = ConnectorConfig::new("example.com:7000")
//!     .with_reconnect(ReconnectPolicy::every(Duration::from_secs(5)).with_max_attempts(10));
//! ```

use crate::{HostError, Result};
use bytes::Bytes;
use sockhost_codec::{
    Compression, DEFAULT_MAX_DECODED_LENGTH, Encryption, FrameCodec, LENGTH_FIELD_SIZE,
    MAX_FRAME_LENGTH, MessageTransform,
};
use sockhost_pool::PoolConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Host-wide configuration, fixed once the host is started
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Socket receive buffer size, also the read chunk size
    pub socket_buffer_size: usize,

    /// Largest declared frame length accepted on receive
    pub message_buffer_size: usize,

    /// Largest payload a received frame may expand to after decompression
    pub max_payload_size: usize,

    /// Worker pool threads spawned at start
    pub min_threads: usize,

    /// Upper bound for worker pool growth
    pub max_threads: usize,

    /// How often the idle sweep and UDP peer pruning run
    pub idle_check_interval: Duration,

    /// Inactivity after which a connection is dropped (None disables the sweep)
    pub idle_timeout: Option<Duration>,

    /// Default listen backlog
    pub backlog: u32,

    /// Default number of concurrent accept tasks per listener
    pub accept_tasks: usize,

    /// Threads in the I/O runtime
    pub io_threads: usize,

    /// Bound on connection drain and worker joins during `stop()`
    pub shutdown_timeout: Duration,

    /// Fixed header prepended to every frame
    pub header: Bytes,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            socket_buffer_size: 8192,
            message_buffer_size: MAX_FRAME_LENGTH,
            max_payload_size: DEFAULT_MAX_DECODED_LENGTH,
            min_threads: 4,
            max_threads: 16,
            idle_check_interval: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(300)), // 5 minutes
            backlog: 128,
            accept_tasks: 2,
            io_threads: 2,
            shutdown_timeout: Duration::from_secs(5),
            header: Bytes::new(),
        }
    }
}

impl HostConfig {
    /// Set the socket receive buffer size
    pub fn with_socket_buffer_size(mut self, size: usize) -> Self {
        self.socket_buffer_size = size;
        self
    }

    /// Set the largest accepted frame length
    pub fn with_message_buffer_size(mut self, size: usize) -> Self {
        self.message_buffer_size = size;
        self
    }

    /// Set the limit on a received payload after decompression
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the worker pool bounds
    pub fn with_threads(mut self, min: usize, max: usize) -> Self {
        self.min_threads = min;
        self.max_threads = max;
        self
    }

    /// Set the idle sweep interval
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the default listen backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the default accept task count
    pub fn with_accept_tasks(mut self, tasks: usize) -> Self {
        self.accept_tasks = tasks;
        self
    }

    /// Set the I/O runtime thread count
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the fixed frame header
    pub fn with_header(mut self, header: impl Into<Bytes>) -> Self {
        self.header = header.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let overhead = self.header.len() + LENGTH_FIELD_SIZE;
        if overhead > MAX_FRAME_LENGTH {
            return Err(HostError::InvalidConfig(format!(
                "header length {} leaves no room for a length field",
                self.header.len()
            )));
        }
        if self.socket_buffer_size == 0 || u32::try_from(self.socket_buffer_size).is_err() {
            return Err(HostError::InvalidConfig(format!(
                "socket_buffer_size must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.message_buffer_size < overhead || self.message_buffer_size > MAX_FRAME_LENGTH {
            return Err(HostError::InvalidConfig(format!(
                "message_buffer_size must be between {} and {}",
                overhead, MAX_FRAME_LENGTH
            )));
        }
        if self.max_payload_size == 0 {
            return Err(HostError::InvalidConfig(
                "max_payload_size must be greater than 0".to_string(),
            ));
        }
        if self.min_threads == 0 {
            return Err(HostError::InvalidConfig(
                "min_threads must be greater than 0".to_string(),
            ));
        }
        if self.max_threads < self.min_threads {
            return Err(HostError::InvalidConfig(format!(
                "max_threads ({}) must be >= min_threads ({})",
                self.max_threads, self.min_threads
            )));
        }
        if self.idle_check_interval.is_zero() || self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(HostError::InvalidConfig(
                "idle timeout and check interval must be non-zero".to_string(),
            ));
        }
        if self.backlog == 0 || self.accept_tasks == 0 {
            return Err(HostError::InvalidConfig(
                "backlog and accept_tasks must be greater than 0".to_string(),
            ));
        }
        if self.io_threads == 0 {
            return Err(HostError::InvalidConfig(
                "io_threads must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the frame codec for a connector's transform
    pub fn frame_codec(&self, transform: MessageTransform) -> FrameCodec {
        FrameCodec::new()
            .with_header(self.header.clone())
            .with_transform(transform)
            .with_max_frame_len(self.message_buffer_size)
            .with_max_decoded_len(self.max_payload_size)
    }

    /// Socket receive buffer size as the OS option expects it
    pub(crate) fn recv_buffer_size(&self) -> u32 {
        u32::try_from(self.socket_buffer_size).unwrap_or(u32::MAX)
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_threads(self.min_threads, self.max_threads)
            .with_thread_name("sockhost-worker")
            .with_join_timeout(self.shutdown_timeout)
    }
}

/// Inbound TCP listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Local address to bind
    pub address: SocketAddr,
    /// Payload compression
    pub compression: Compression,
    /// Payload encryption
    pub encryption: Encryption,
    /// Listen backlog (falls back to the host default)
    pub backlog: Option<u32>,
    /// Concurrent accept tasks (falls back to the host default)
    pub accept_tasks: Option<usize>,
}

impl ListenerConfig {
    /// Create a listener for the given address
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            compression: Compression::None,
            encryption: Encryption::None,
            backlog: None,
            accept_tasks: None,
        }
    }

    /// Set the payload compression
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the payload encryption
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the listen backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Set the number of concurrent accept tasks
    pub fn with_accept_tasks(mut self, tasks: usize) -> Self {
        self.accept_tasks = Some(tasks);
        self
    }

    /// Payload transform for accepted connections
    pub fn transform(&self) -> MessageTransform {
        MessageTransform::new(self.compression, self.encryption.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backlog == Some(0) || self.accept_tasks == Some(0) {
            return Err(HostError::InvalidConfig(format!(
                "listener {}: backlog and accept_tasks must be greater than 0",
                self.address
            )));
        }
        Ok(())
    }
}

/// Reconnect behavior for outbound connectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether to reconnect after a non-explicit disconnect or failed connect
    pub enabled: bool,
    /// Delay between attempts
    pub interval: Duration,
    /// Consecutive failed attempts before giving up (None retries forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Reconnect after the given interval
    pub fn every(interval: Duration) -> Self {
        Self {
            enabled: true,
            interval,
            max_attempts: None,
        }
    }

    /// Limit consecutive failed attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Check whether another attempt is allowed after `failures` consecutive failures
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| failures < max)
    }
}

/// Outbound TCP connector
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Remote address as `host:port`, resolved on every attempt
    pub remote: String,
    /// Optional local address to bind before connecting
    pub local: Option<SocketAddr>,
    /// Connect timeout per attempt
    pub connect_timeout: Duration,
    /// Payload compression
    pub compression: Compression,
    /// Payload encryption
    pub encryption: Encryption,
    /// Reconnect policy
    pub reconnect: ReconnectPolicy,
}

impl ConnectorConfig {
    /// Create a connector for the given remote address
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            local: None,
            connect_timeout: Duration::from_secs(10),
            compression: Compression::None,
            encryption: Encryption::None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Bind to a local address before connecting
    pub fn with_local(mut self, local: SocketAddr) -> Self {
        self.local = Some(local);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the payload compression
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the payload encryption
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Payload transform for the established connection
    pub fn transform(&self) -> MessageTransform {
        MessageTransform::new(self.compression, self.encryption.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote.is_empty() {
            return Err(HostError::InvalidConfig(
                "connector remote address is empty".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(HostError::InvalidConfig(format!(
                "connector {}: connect_timeout must be non-zero",
                self.remote
            )));
        }
        if self.reconnect.enabled && self.reconnect.interval.is_zero() {
            return Err(HostError::InvalidConfig(format!(
                "connector {}: reconnect interval must be non-zero",
                self.remote
            )));
        }
        Ok(())
    }
}

/// UDP endpoint
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind
    pub address: SocketAddr,
    /// Peer opened at start, before any datagram arrives
    pub remote: Option<SocketAddr>,
    /// Payload compression
    pub compression: Compression,
    /// Payload encryption
    pub encryption: Encryption,
}

impl UdpConfig {
    /// Create an endpoint bound to the given address
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            remote: None,
            compression: Compression::None,
            encryption: Encryption::None,
        }
    }

    /// Open a peer connection to `remote` at start
    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set the payload compression
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the payload encryption
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Payload transform for peer connections
    pub fn transform(&self) -> MessageTransform {
        MessageTransform::new(self.compression, self.encryption.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.socket_buffer_size, 8192);
        assert_eq!(config.message_buffer_size, 65535);
        assert_eq!(config.min_threads, 4);
        assert_eq!(config.max_threads, 16);
        assert_eq!(config.idle_check_interval, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.backlog, 128);
        assert_eq!(config.accept_tasks, 2);
        assert!(config.header.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_host_validation() {
        assert!(HostConfig::default().with_threads(0, 4).validate().is_err());
        assert!(HostConfig::default().with_threads(8, 4).validate().is_err());
        assert!(HostConfig::default().with_socket_buffer_size(0).validate().is_err());
        assert!(HostConfig::default().with_message_buffer_size(70000).validate().is_err());
        assert!(
            HostConfig::default()
                .with_header(vec![1u8, 2, 3])
                .with_message_buffer_size(4)
                .validate()
                .is_err()
        );
        assert!(
            HostConfig::default()
                .with_idle_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
        assert!(
            HostConfig::default()
                .with_idle_timeout(None)
                .with_idle_check_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(HostConfig::default().with_backlog(0).validate().is_err());
        assert!(HostConfig::default().with_max_payload_size(0).validate().is_err());

        let err = HostConfig::default().with_threads(8, 4).validate().unwrap_err();
        assert!(matches!(err, HostError::InvalidConfig(_)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_socket_buffer_size_must_fit_u32() {
        let oversized = u32::MAX as usize + 1;
        let err = HostConfig::default()
            .with_socket_buffer_size(oversized)
            .validate()
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidConfig(_)));
        assert!(
            HostConfig::default()
                .with_socket_buffer_size(u32::MAX as usize)
                .validate()
                .is_ok()
        );
        assert_eq!(
            HostConfig::default()
                .with_socket_buffer_size(oversized)
                .recv_buffer_size(),
            u32::MAX
        );
    }

    #[test]
    fn test_frame_codec_uses_host_limits() {
        let config = HostConfig::default()
            .with_header(vec![0xAAu8, 0x55])
            .with_message_buffer_size(1024);
        let codec = config.frame_codec(MessageTransform::identity());
        assert_eq!(codec.header(), &[0xAA, 0x55]);
        assert_eq!(codec.max_frame_len(), 1024);
        assert_eq!(codec.max_decoded_len(), 1 << 20);

        let codec = config
            .with_max_payload_size(4096)
            .frame_codec(MessageTransform::identity());
        assert_eq!(codec.max_decoded_len(), 4096);
    }

    #[test]
    fn test_reconnect_policy() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.allows_retry(0));

        let policy = ReconnectPolicy::every(Duration::from_millis(100));
        assert!(policy.allows_retry(1_000));

        let policy = policy.with_max_attempts(3);
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_connector_validation() {
        assert!(ConnectorConfig::new("").validate().is_err());
        assert!(
            ConnectorConfig::new("localhost:1")
                .with_connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ConnectorConfig::new("localhost:1")
                .with_reconnect(ReconnectPolicy::every(Duration::ZERO))
                .validate()
                .is_err()
        );
        assert!(ConnectorConfig::new("localhost:1").validate().is_ok());
    }

    #[test]
    fn test_listener_validation() {
        let listener = ListenerConfig::new("127.0.0.1:0".parse().unwrap());
        assert!(listener.validate().is_ok());
        assert!(listener.clone().with_backlog(0).validate().is_err());
        assert!(listener.with_accept_tasks(0).validate().is_err());
    }
}
