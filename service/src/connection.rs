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

//! Connection handle
//!
//! A [`Connection`] is a cheap, cloneable handle onto one live socket
//! session. The socket itself is owned by the connection's worker task;
//! the handle frames outbound payloads and queues them for that worker,
//! which is the only writer, so frames from concurrent senders never
//! interleave on the wire.

use crate::{ConnectionId, ConnectionInfo, ConnectionState, Direction, HostError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use sockhost_codec::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

struct ConnectionInner {
    id: ConnectionId,
    direction: Direction,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: AtomicU8,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    codec: FrameCodec,
    outbound: mpsc::UnboundedSender<Bytes>,
    close: CancellationToken,
    terminated: CancellationToken,
    explicit_close: AtomicBool,
    failure: Mutex<Option<Arc<HostError>>>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

/// Handle onto a live connection
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        direction: Direction,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        codec: FrameCodec,
    ) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let now = Instant::now();
        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                direction,
                peer_addr,
                local_addr,
                state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
                created_at: now,
                last_activity: Mutex::new(now),
                codec,
                outbound,
                close: CancellationToken::new(),
                terminated: CancellationToken::new(),
                explicit_close: AtomicBool::new(false),
                failure: Mutex::new(None),
                bytes_sent: AtomicU64::new(0),
                bytes_received: AtomicU64::new(0),
                messages_sent: AtomicU64::new(0),
                messages_received: AtomicU64::new(0),
            }),
        };
        (connection, queue)
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// How the connection was created
    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Check if the connection accepts sends
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// When the connection was created
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Last time a frame was sent or bytes were received
    pub fn last_activity(&self) -> Instant {
        *self.inner.last_activity.lock()
    }

    /// Time since the last activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Get the codec used for this connection
    pub fn codec(&self) -> &FrameCodec {
        &self.inner.codec
    }

    /// Total bytes written to the socket
    pub fn bytes_sent(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::Relaxed)
    }

    /// Total bytes read from the socket
    pub fn bytes_received(&self) -> u64 {
        self.inner.bytes_received.load(Ordering::Relaxed)
    }

    /// Total frames written
    pub fn messages_sent(&self) -> u64 {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    /// Total frames received
    pub fn messages_received(&self) -> u64 {
        self.inner.messages_received.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the connection
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.inner.id,
            direction: self.inner.direction,
            state: self.state(),
            peer_addr: self.inner.peer_addr,
            local_addr: self.inner.local_addr,
            created_at: self.inner.created_at,
            last_activity: self.last_activity(),
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
            messages_sent: self.messages_sent(),
            messages_received: self.messages_received(),
        }
    }

    /// Frame a payload and queue it for writing
    ///
    /// Sending on a connection that is not `Connected` is a no-op; the
    /// caller has raced a disconnect. A payload that does not fit in one
    /// frame is rejected with [`sockhost_codec::CodecError::FrameTooLarge`].
    #[instrument(level = "trace", skip(self, payload), fields(connection_id = %self.inner.id, len = payload.len()))]
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            debug!(state = %self.state(), "Send ignored, connection not connected");
            return Ok(());
        }
        let frame = self.inner.codec.encode(payload)?;
        if self.inner.outbound.send(frame).is_err() {
            debug!("Send ignored, writer already finished");
        }
        Ok(())
    }

    /// Request an explicit close
    ///
    /// Frames queued before the call are still written. An explicitly
    /// closed outbound connection is never reconnected.
    pub fn close(&self) {
        self.inner.explicit_close.store(true, Ordering::Release);
        self.transition(
            &[ConnectionState::Connecting, ConnectionState::Connected],
            ConnectionState::Disconnecting,
        );
        self.inner.close.cancel();
    }

    /// Check if `close()` was called
    pub fn is_explicitly_closed(&self) -> bool {
        self.inner.explicit_close.load(Ordering::Acquire)
    }

    /// Check if the connection has been torn down
    pub fn is_closed(&self) -> bool {
        self.inner.terminated.is_cancelled()
    }

    /// Wait until the connection has been torn down
    pub async fn closed(&self) {
        self.inner.terminated.cancelled().await
    }

    /// Force a non-explicit disconnect carrying `error`
    ///
    /// Returns `false` if the connection was already closing.
    pub(crate) fn abort(&self, error: Arc<HostError>) -> bool {
        if self.inner.close.is_cancelled() || self.state().is_terminal() {
            return false;
        }
        self.inner.failure.lock().get_or_insert(error);
        self.inner.close.cancel();
        true
    }

    pub(crate) fn take_failure(&self) -> Option<Arc<HostError>> {
        self.inner.failure.lock().take()
    }

    pub(crate) fn close_token(&self) -> CancellationToken {
        self.inner.close.clone()
    }

    pub(crate) fn mark_connected(&self) -> bool {
        self.transition(&[ConnectionState::Connecting], ConnectionState::Connected)
    }

    pub(crate) fn mark_error(&self) {
        self.inner
            .state
            .store(ConnectionState::Error.as_u8(), Ordering::Release);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.inner
            .state
            .store(ConnectionState::Disconnected.as_u8(), Ordering::Release);
        self.inner.terminated.cancel();
    }

    pub(crate) fn touch(&self) {
        *self.inner.last_activity.lock() = Instant::now();
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.inner
            .bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received_bytes(&self, bytes: usize) {
        self.inner
            .bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_received_message(&self) {
        self.inner.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        self.inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&ConnectionState::from_u8(current))
                    .then_some(to.as_u8())
            })
            .is_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("direction", &self.inner.direction)
            .field("state", &self.state())
            .field("peer_addr", &self.inner.peer_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockhost_codec::CodecError;

    fn connection(codec: FrameCodec) -> (Connection, mpsc::UnboundedReceiver<Bytes>) {
        Connection::new(
            ConnectionId::new(7),
            Direction::Accepted,
            "127.0.0.1:4000".parse().unwrap(),
            "127.0.0.1:5000".parse().unwrap(),
            codec,
        )
    }

    #[test]
    fn test_send_before_connected_is_ignored() {
        let (conn, mut queue) = connection(FrameCodec::new());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.send(b"early").unwrap();
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn test_send_queues_framed_payload() {
        let (conn, mut queue) = connection(FrameCodec::new().with_header(vec![0xAAu8, 0x55]));
        assert!(conn.mark_connected());
        conn.send(b"PING").unwrap();

        let frame = queue.try_recv().unwrap();
        assert_eq!(&frame[..], &[0xAA, 0x55, 0x00, 0x08, b'P', b'I', b'N', b'G']);
    }

    #[test]
    fn test_oversized_send_is_rejected() {
        let (conn, mut queue) = connection(FrameCodec::new());
        conn.mark_connected();
        let err = conn.send(&vec![0u8; 70_000]).unwrap_err();
        assert!(matches!(
            err,
            HostError::Codec(CodecError::FrameTooLarge { .. })
        ));
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn test_close_is_explicit() {
        let (conn, mut queue) = connection(FrameCodec::new());
        conn.mark_connected();
        conn.close();

        assert_eq!(conn.state(), ConnectionState::Disconnecting);
        assert!(conn.is_explicitly_closed());
        assert!(conn.close_token().is_cancelled());

        conn.send(b"late").unwrap();
        assert!(queue.try_recv().is_err());
        assert!(!conn.abort(Arc::new(HostError::ConnectionClosed)));
    }

    #[test]
    fn test_abort_keeps_first_failure() {
        let (conn, _queue) = connection(FrameCodec::new());
        conn.mark_connected();
        assert!(conn.abort(Arc::new(HostError::IdleTimeout(Duration::from_secs(1)))));
        assert!(!conn.abort(Arc::new(HostError::ConnectionClosed)));
        assert!(!conn.is_explicitly_closed());

        let failure = conn.take_failure().unwrap();
        assert!(matches!(*failure, HostError::IdleTimeout(_)));
        assert!(conn.take_failure().is_none());
    }

    #[test]
    fn test_teardown_states() {
        let (conn, _queue) = connection(FrameCodec::new());
        conn.mark_connected();
        assert!(!conn.mark_connected());
        conn.mark_error();
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(!conn.is_closed());
        conn.mark_disconnected();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_counters() {
        let (conn, _queue) = connection(FrameCodec::new());
        conn.record_sent(10);
        conn.record_received_bytes(4);
        conn.record_received_message();

        let info = conn.info();
        assert_eq!(info.id, ConnectionId::new(7));
        assert_eq!(info.bytes_sent, 10);
        assert_eq!(info.messages_sent, 1);
        assert_eq!(info.bytes_received, 4);
        assert_eq!(info.messages_received, 1);
    }
}
