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

//! Core types for the connection host

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state (stored as atomic u8 for lock-free state management)
///
/// ```text
/// Connecting -> Connected -> Disconnecting -> Disconnected
///      \            \              \
///       +------------+--------------+--> Error -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Socket exists, accept/connect not yet completed
    Connecting = 0,
    /// Receiving and accepting sends
    Connected = 1,
    /// Explicit close requested; queued frames are flushed, new sends ignored
    Disconnecting = 2,
    /// Socket closed and removed from the host
    Disconnected = 3,
    /// A fault was raised; the connection is about to be disconnected
    Error = 4,
}

impl ConnectionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Disconnecting,
            3 => Self::Disconnected,
            4 => Self::Error,
            _ => Self::Disconnected,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the connection can no longer carry traffic
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Check if sends are currently accepted
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How a connection came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Accepted by a TCP listener
    Accepted,
    /// Established by an outbound connector
    Initiated,
    /// A remote address seen by a UDP endpoint
    UdpPeer,
}

impl Direction {
    /// Short label used in logs and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Initiated => "initiated",
            Self::UdpPeer => "udp",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// How the connection was created
    pub direction: Direction,
    /// Current state
    pub state: ConnectionState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// Local address
    pub local_addr: SocketAddr,
    /// When the connection was created
    pub created_at: Instant,
    /// Last activity timestamp
    pub last_activity: Instant,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total messages sent
    pub messages_sent: u64,
    /// Total messages received
    pub messages_received: u64,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Host snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    /// Whether the host is started and not yet stopped
    pub running: bool,
    /// Number of live connections
    pub active_connections: usize,
    /// Total connections since the host was created
    pub total_connections: u64,
    /// Addresses bound by started listeners and UDP endpoints
    pub local_addrs: Vec<SocketAddr>,
    /// Live worker pool threads
    pub worker_threads: usize,
    /// Events waiting for a pool worker
    pub queued_events: usize,
    /// Time since start, zero if never started
    pub uptime: Duration,
}

impl fmt::Display for HostSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionHost {{ running: {}, active: {}, total: {}, addrs: {:?}, workers: {}, queued: {}, uptime: {:?} }}",
            self.running,
            self.active_connections,
            self.total_connections,
            self.local_addrs,
            self.worker_threads,
            self.queued_events,
            self.uptime
        )
    }
}
