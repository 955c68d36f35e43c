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

//! Lock-free metrics for the connection host
//!
//! [`HostMetrics`] keeps the host's own counters. The same events are also
//! reported through the `metrics` facade under `sockhost.*` so an installed
//! recorder can export them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free host metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a view of all
/// metrics at a point in time.
#[derive(Debug)]
pub struct HostMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,

    // Throughput
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,

    // Errors
    connection_errors: AtomicU64,
    protocol_errors: AtomicU64,
    timeout_errors: AtomicU64,
    handler_errors: AtomicU64,
    connect_failures: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    created_at: Instant,
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            timeout_errors: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new connection being opened
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.connections.opened").increment(1);
        metrics::gauge!("sockhost.connections.active").increment(1.0);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        metrics::counter!("sockhost.connections.closed").increment(1);
        metrics::gauge!("sockhost.connections.active").decrement(1.0);
        metrics::histogram!("sockhost.connections.duration_seconds").record(duration.as_secs_f64());
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since the host was created
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record bytes written to a socket
    pub fn bytes_sent(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("sockhost.bytes.sent").increment(count);
    }

    /// Record bytes read from a socket
    pub fn bytes_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("sockhost.bytes.received").increment(count);
    }

    /// Record a frame written
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.messages.sent").increment(1);
    }

    /// Record a frame extracted
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.messages.received").increment(1);
    }

    // Error tracking

    /// Record a socket-level fault
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.errors", "kind" => "connection").increment(1);
    }

    /// Record a protocol violation
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.errors", "kind" => "protocol").increment(1);
    }

    /// Record an idle timeout
    pub fn timeout_error(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.errors", "kind" => "timeout").increment(1);
    }

    /// Record a failing or panicking application callback
    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.errors", "kind" => "handler").increment(1);
    }

    /// Record a failed outbound connect attempt
    pub fn connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sockhost.errors", "kind" => "connect").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Counters are read one at a time, so a snapshot taken under load may
    /// be slightly inconsistent. It is close enough for monitoring.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of host metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since the host was created
    pub total_connections: u64,
    /// Current live connections
    pub active_connections: u64,
    /// Total bytes written
    pub bytes_sent: u64,
    /// Total bytes read
    pub bytes_received: u64,
    /// Total frames written
    pub messages_sent: u64,
    /// Total frames extracted
    pub messages_received: u64,
    /// Socket-level faults
    pub connection_errors: u64,
    /// Protocol violations
    pub protocol_errors: u64,
    /// Idle timeouts
    pub timeout_errors: u64,
    /// Application callback faults
    pub handler_errors: u64,
    /// Failed outbound connect attempts
    pub connect_failures: u64,
    /// Time since the host was created
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate messages per second (sent)
    pub fn messages_sent_per_sec(&self) -> f64 {
        self.per_sec(self.messages_sent)
    }

    /// Calculate messages per second (received)
    pub fn messages_received_per_sec(&self) -> f64 {
        self.per_sec(self.messages_received)
    }

    /// Calculate bytes per second (sent)
    pub fn bytes_sent_per_sec(&self) -> f64 {
        self.per_sec(self.bytes_sent)
    }

    /// Calculate bytes per second (received)
    pub fn bytes_received_per_sec(&self) -> f64 {
        self.per_sec(self.bytes_received)
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.connection_errors
            + self.protocol_errors
            + self.timeout_errors
            + self.handler_errors
            + self.connect_failures
    }

    /// Calculate error rate (errors per second)
    pub fn error_rate(&self) -> f64 {
        self.per_sec(self.total_errors())
    }

    fn per_sec(&self, value: u64) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        value as f64 / self.uptime.as_secs_f64()
    }
}
