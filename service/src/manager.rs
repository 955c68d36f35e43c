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

//! Connection manager implementation
//!
//! The ConnectionManager is the only owner of the live-connection table:
//! - Allocating connection IDs and registering new connections
//! - Lookup for targeted sends and disconnects
//! - Broadcasting messages to every connected peer
//! - Idle sweeps and shutdown

use crate::{Connection, ConnectionId, ConnectionInfo, Direction, HostError};
use bytes::Bytes;
use dashmap::DashMap;
use sockhost_codec::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Result of a broadcast operation
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// Total number of connections attempted
    pub total: usize,
    /// Number of successful sends
    pub succeeded: usize,
    /// Number of failed sends
    pub failed: usize,
    /// Errors that occurred (ConnectionId and error message)
    pub errors: Vec<(ConnectionId, String)>,
}

impl BroadcastResult {
    fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Check if all broadcasts succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Connection manager
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    /// Live connections (lock-free concurrent map)
    connections: DashMap<ConnectionId, Connection>,
    /// Next connection ID (monotonically increasing)
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub(crate) fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an ID and register a new connection
    pub(crate) fn register(
        &self,
        direction: Direction,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        codec: FrameCodec,
    ) -> (Connection, mpsc::UnboundedReceiver<Bytes>) {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (connection, queue) = Connection::new(id, direction, peer_addr, local_addr, codec);
        self.connections.insert(id, connection.clone());
        debug!(connection_id = %id, peer_addr = %peer_addr, %direction, "Connection registered");
        (connection, queue)
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub(crate) fn count(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub(crate) fn infos(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    /// Send a payload to every connected peer except `exclude`
    pub(crate) fn broadcast(&self, payload: &[u8], exclude: Option<ConnectionId>) -> BroadcastResult {
        let mut result = BroadcastResult::new();
        for connection in self.snapshot() {
            if Some(connection.id()) == exclude || !connection.is_connected() {
                continue;
            }
            result.total += 1;
            match connection.send(payload) {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((connection.id(), e.to_string()));
                }
            }
        }
        debug!(
            total = result.total,
            failed = result.failed,
            "Broadcast complete"
        );
        result
    }

    /// Abort every connection idle for longer than `timeout`
    pub(crate) fn sweep_idle(&self, timeout: Duration) -> usize {
        let mut swept = 0;
        for connection in self.snapshot() {
            if connection.idle_for() > timeout
                && connection.abort(Arc::new(HostError::IdleTimeout(timeout)))
            {
                debug!(connection_id = %connection.id(), "Idle timeout");
                swept += 1;
            }
        }
        if swept > 0 {
            info!(swept, "Idle sweep disconnected connections");
        }
        swept
    }

    /// Explicitly close every connection
    pub(crate) fn close_all(&self) -> usize {
        let connections = self.snapshot();
        for connection in &connections {
            connection.close();
        }
        connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionState;
    use tracing_test::traced_test;

    fn register(manager: &ConnectionManager) -> (Connection, mpsc::UnboundedReceiver<Bytes>) {
        manager.register(
            Direction::Accepted,
            "127.0.0.1:9000".parse().unwrap(),
            "127.0.0.1:9001".parse().unwrap(),
            FrameCodec::new(),
        )
    }

    #[test]
    fn test_register_allocates_unique_ids() {
        let manager = ConnectionManager::new();
        let (a, _qa) = register(&manager);
        let (b, _qb) = register(&manager);

        assert!(a.id() < b.id());
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.get(a.id()).unwrap().id(), a.id());

        manager.remove(a.id());
        assert!(manager.get(a.id()).is_none());
        assert_eq!(manager.ids(), vec![b.id()]);
    }

    #[test]
    fn test_broadcast_skips_excluded_and_unconnected() {
        let manager = ConnectionManager::new();
        let (a, mut qa) = register(&manager);
        let (b, mut qb) = register(&manager);
        let (_c, mut qc) = register(&manager);
        a.mark_connected();
        b.mark_connected();

        let result = manager.broadcast(b"hello", Some(b.id()));
        assert_eq!(result.total, 1);
        assert!(result.all_succeeded());
        assert_eq!(result.success_rate(), 100.0);

        assert!(qa.try_recv().is_ok());
        assert!(qb.try_recv().is_err());
        assert!(qc.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reports_failures() {
        let manager = ConnectionManager::new();
        let (a, _qa) = register(&manager);
        a.mark_connected();

        let result = manager.broadcast(&vec![0u8; 70_000], None);
        assert_eq!(result.total, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].0, a.id());
        assert_eq!(result.success_rate(), 0.0);
    }

    #[test]
    #[traced_test]
    fn test_sweep_idle() {
        let manager = ConnectionManager::new();
        let (stale, _qs) = register(&manager);
        stale.mark_connected();
        std::thread::sleep(Duration::from_millis(300));
        let (fresh, _qf) = register(&manager);
        fresh.mark_connected();

        assert_eq!(manager.sweep_idle(Duration::from_millis(200)), 1);
        assert!(stale.close_token().is_cancelled());
        assert!(!fresh.close_token().is_cancelled());
        assert!(matches!(
            stale.take_failure().as_deref(),
            Some(HostError::IdleTimeout(_))
        ));
        assert!(logs_contain("Idle sweep disconnected connections"));

        // Already aborted connections are not counted twice
        assert_eq!(manager.sweep_idle(Duration::from_millis(200)), 0);
    }

    #[test]
    fn test_close_all() {
        let manager = ConnectionManager::new();
        let (a, _qa) = register(&manager);
        a.mark_connected();
        assert_eq!(manager.close_all(), 1);
        assert_eq!(a.state(), ConnectionState::Disconnecting);
        assert!(a.is_explicitly_closed());
    }
}
