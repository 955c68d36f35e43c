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

//! Application-facing callback contracts
//!
//! Two ways to observe a host:
//!
//! - [`ConnectionService`]: one per host, called on pool workers for every
//!   connection event. A callback that returns an error or panics forces
//!   its connection to disconnect with that fault attached.
//! - Event listeners registered with
//!   [`ConnectionHost::subscribe`](crate::ConnectionHost::subscribe): any
//!   number of closures receiving every [`HostEvent`], invoked after the
//!   service callback on the same worker.

use crate::{Connection, ConnectionId, Direction, HostError};
use bytes::Bytes;
use sockhost_pool::BoxError;
use std::net::SocketAddr;
use std::sync::Arc;

/// Result returned by service callbacks
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Connection service trait
///
/// Implement this trait to handle connection events. Every method has a
/// default implementation that does nothing. Events for one connection are
/// delivered one at a time, in the order they occurred.
///
/// # Example
///
/// ```no_run
/// use sockhost_service::{Connection, ConnectionId, ConnectionService, HandlerResult};
/// use bytes::Bytes;
///
/// struct Echo;
///
/// impl ConnectionService for Echo {
///     fn on_received(&self, _id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
///         conn.send(&payload)?;
///         Ok(())
///     }
/// }
/// ```
pub trait ConnectionService: Send + Sync + 'static {
    /// Called once the connection is registered and receiving
    fn on_connected(&self, _id: ConnectionId, _conn: &Connection) -> HandlerResult {
        Ok(())
    }

    /// Called for every complete message
    fn on_received(&self, _id: ConnectionId, _conn: &Connection, _payload: Bytes) -> HandlerResult {
        Ok(())
    }

    /// Called after a frame has been written to the socket
    fn on_sent(&self, _id: ConnectionId, _conn: &Connection, _bytes: usize) -> HandlerResult {
        Ok(())
    }

    /// Called when a fault is about to disconnect the connection
    fn on_error(&self, _id: ConnectionId, _conn: &Connection, _error: &HostError) -> HandlerResult {
        Ok(())
    }

    /// Called after the connection has been closed and removed from the host
    ///
    /// A failure here cannot be attributed to a live connection and is
    /// reported as [`HostEvent::Exception`].
    fn on_disconnected(
        &self,
        _id: ConnectionId,
        _conn: &Connection,
        _error: Option<&HostError>,
    ) -> HandlerResult {
        Ok(())
    }
}

/// Service that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopService;

impl ConnectionService for NoopService {}

type ConnectFn = Box<dyn Fn(ConnectionId, &Connection) -> HandlerResult + Send + Sync + 'static>;
type ReceiveFn =
    Box<dyn Fn(ConnectionId, &Connection, Bytes) -> HandlerResult + Send + Sync + 'static>;
type SentFn = Box<dyn Fn(ConnectionId, &Connection, usize) -> HandlerResult + Send + Sync + 'static>;
type ErrorFn =
    Box<dyn Fn(ConnectionId, &Connection, &HostError) -> HandlerResult + Send + Sync + 'static>;
type DisconnectFn = Box<
    dyn Fn(ConnectionId, &Connection, Option<&HostError>) -> HandlerResult + Send + Sync + 'static,
>;

/// Callback-based service implementation
///
/// This provides a way to implement a service using closures instead of
/// implementing [`ConnectionService`].
///
/// # Example
///
/// ```no_run
/// use sockhost_service::CallbackService;
///
/// let service = CallbackService {
///     on_received: Some(Box::new(|id, conn, payload| {
///         println!("{} sent {} bytes", id, payload.len());
///         conn.send(&payload)?;
///         Ok(())
///     })),
///     ..Default::default()
/// };
/// ```
#[derive(Default)]
pub struct CallbackService {
    /// Called on connection establishment
    pub on_connected: Option<ConnectFn>,
    /// Called for every message
    pub on_received: Option<ReceiveFn>,
    /// Called after a frame was written
    pub on_sent: Option<SentFn>,
    /// Called when a fault is about to disconnect the connection
    pub on_error: Option<ErrorFn>,
    /// Called on disconnection
    pub on_disconnected: Option<DisconnectFn>,
}

impl ConnectionService for CallbackService {
    fn on_connected(&self, id: ConnectionId, conn: &Connection) -> HandlerResult {
        match &self.on_connected {
            Some(f) => f(id, conn),
            None => Ok(()),
        }
    }

    fn on_received(&self, id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
        match &self.on_received {
            Some(f) => f(id, conn, payload),
            None => Ok(()),
        }
    }

    fn on_sent(&self, id: ConnectionId, conn: &Connection, bytes: usize) -> HandlerResult {
        match &self.on_sent {
            Some(f) => f(id, conn, bytes),
            None => Ok(()),
        }
    }

    fn on_error(&self, id: ConnectionId, conn: &Connection, error: &HostError) -> HandlerResult {
        match &self.on_error {
            Some(f) => f(id, conn, error),
            None => Ok(()),
        }
    }

    fn on_disconnected(
        &self,
        id: ConnectionId,
        conn: &Connection,
        error: Option<&HostError>,
    ) -> HandlerResult {
        match &self.on_disconnected {
            Some(f) => f(id, conn, error),
            None => Ok(()),
        }
    }
}

/// Event delivered to subscribed listeners
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A connection was established
    Connected {
        /// Connection ID
        id: ConnectionId,
        /// Peer address
        peer_addr: SocketAddr,
        /// How the connection was created
        direction: Direction,
    },
    /// A complete message arrived
    Received {
        /// Connection ID
        id: ConnectionId,
        /// Message payload after the inverse transform
        payload: Bytes,
    },
    /// A frame was written
    Sent {
        /// Connection ID
        id: ConnectionId,
        /// Frame length on the wire
        bytes: usize,
    },
    /// A fault is disconnecting the connection
    ConnectionError {
        /// Connection ID
        id: ConnectionId,
        /// The fault
        error: Arc<HostError>,
    },
    /// A connection was closed and removed
    Disconnected {
        /// Connection ID
        id: ConnectionId,
        /// Why, if not a local close
        error: Option<Arc<HostError>>,
    },
    /// An outbound connect attempt failed
    ConnectFailed {
        /// Remote address as configured
        remote: String,
        /// Consecutive failed attempts including this one
        attempt: u32,
        /// The failure
        error: Arc<HostError>,
    },
    /// A fault that cannot be attributed to a live connection
    Exception {
        /// The fault
        error: Arc<HostError>,
    },
}

impl HostEvent {
    /// Connection the event belongs to, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            HostEvent::Connected { id, .. }
            | HostEvent::Received { id, .. }
            | HostEvent::Sent { id, .. }
            | HostEvent::ConnectionError { id, .. }
            | HostEvent::Disconnected { id, .. } => Some(*id),
            HostEvent::ConnectFailed { .. } | HostEvent::Exception { .. } => None,
        }
    }

    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::Connected { .. } => "connected",
            HostEvent::Received { .. } => "received",
            HostEvent::Sent { .. } => "sent",
            HostEvent::ConnectionError { .. } => "connection_error",
            HostEvent::Disconnected { .. } => "disconnected",
            HostEvent::ConnectFailed { .. } => "connect_failed",
            HostEvent::Exception { .. } => "exception",
        }
    }
}

/// Listener closure registered with `ConnectionHost::subscribe`
pub type EventListener = Arc<dyn Fn(&HostEvent) + Send + Sync + 'static>;
