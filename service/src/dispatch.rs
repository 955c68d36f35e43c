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

//! Event dispatch onto the worker pool
//!
//! I/O tasks never call application code directly. Each connection event
//! becomes an [`EventItem`] keyed by the connection ID, so the pool runs a
//! connection's events one at a time in the order the I/O task posted
//! them, while events of different connections run in parallel.

use crate::{Connection, ConnectionService, EventListener, HostError, HostEvent, HostMetrics};
use parking_lot::RwLock;
use sockhost_pool::{BoxError, PoolConfig, WorkError, WorkItem, WorkerPool};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Everything an event needs once it reaches a pool worker
pub(crate) struct Observers {
    service: Arc<dyn ConnectionService>,
    listeners: RwLock<Vec<EventListener>>,
    metrics: Arc<HostMetrics>,
}

impl Observers {
    fn notify(&self, event: &HostEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    fn exception(&self, error: Arc<HostError>) {
        error!(error = %error, "Unhandled exception in connection callback");
        self.metrics.handler_error();
        self.notify(&HostEvent::Exception { error });
    }
}

/// A connection event waiting for a pool worker
pub(crate) struct EventItem {
    observers: Arc<Observers>,
    connection: Option<Connection>,
    event: HostEvent,
}

impl EventItem {
    fn invoke_service(&self) -> Result<(), BoxError> {
        let Some(conn) = &self.connection else {
            return Ok(());
        };
        let service = &self.observers.service;
        let id = conn.id();
        match &self.event {
            HostEvent::Connected { .. } => service.on_connected(id, conn),
            HostEvent::Received { payload, .. } => service.on_received(id, conn, payload.clone()),
            HostEvent::Sent { bytes, .. } => service.on_sent(id, conn, *bytes),
            HostEvent::ConnectionError { error, .. } => service.on_error(id, conn, error),
            HostEvent::Disconnected { error, .. } => service.on_disconnected(id, conn, error.as_deref()),
            HostEvent::ConnectFailed { .. } | HostEvent::Exception { .. } => Ok(()),
        }
    }
}

impl WorkItem for EventItem {
    fn key(&self) -> Option<u64> {
        self.connection.as_ref().map(|conn| conn.id().as_u64())
    }

    fn execute(&mut self) -> Result<(), BoxError> {
        self.invoke_service()?;
        self.observers.notify(&self.event);
        Ok(())
    }

    fn fault(self: Box<Self>, error: WorkError) {
        let error = Arc::new(HostError::Handler(error));
        match (&self.connection, &self.event) {
            (_, HostEvent::Exception { .. }) => {
                error!(error = %error, "Exception listener failed");
            }
            (Some(conn), event) if !matches!(event, HostEvent::Disconnected { .. }) => {
                if conn.abort(error.clone()) {
                    warn!(
                        connection_id = %conn.id(),
                        event = event.name(),
                        error = %error,
                        "Callback failed, disconnecting"
                    );
                    self.observers.metrics.handler_error();
                } else {
                    // Already going down, nothing left to attach the fault to
                    self.observers.exception(error);
                }
            }
            _ => self.observers.exception(error),
        }
    }
}

/// Routes events from I/O tasks into the worker pool
pub(crate) struct Dispatcher {
    pool: WorkerPool,
    observers: Arc<Observers>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: PoolConfig,
        service: Arc<dyn ConnectionService>,
        metrics: Arc<HostMetrics>,
    ) -> Self {
        Self {
            pool: WorkerPool::new(config),
            observers: Arc::new(Observers {
                service,
                listeners: RwLock::new(Vec::new()),
                metrics,
            }),
        }
    }

    pub(crate) fn start(&self) -> crate::Result<()> {
        self.pool.start()?;
        Ok(())
    }

    pub(crate) fn stop(&self) {
        self.pool.stop();
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn subscribe(&self, listener: EventListener) {
        self.observers.listeners.write().push(listener);
    }

    /// Queue an event for a connection
    pub(crate) fn post(&self, connection: &Connection, event: HostEvent) {
        self.enqueue(Some(connection.clone()), event);
    }

    /// Queue an event that belongs to no connection
    pub(crate) fn post_global(&self, event: HostEvent) {
        self.enqueue(None, event);
    }

    fn enqueue(&self, connection: Option<Connection>, event: HostEvent) {
        let name = event.name();
        let item = EventItem {
            observers: self.observers.clone(),
            connection,
            event,
        };
        if let Err(e) = self.pool.enqueue(item) {
            debug!(event = name, error = %e, "Dropping event");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool)
            .field("listeners", &self.observers.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionId, Direction, HandlerResult};
    use bytes::Bytes;
    use sockhost_codec::FrameCodec;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Fragile;

    impl ConnectionService for Fragile {
        fn on_received(&self, _id: ConnectionId, _conn: &Connection, payload: Bytes) -> HandlerResult {
            if payload.as_ref() == b"boom" {
                panic!("boom");
            }
            Ok(())
        }

        fn on_disconnected(
            &self,
            _id: ConnectionId,
            _conn: &Connection,
            _error: Option<&HostError>,
        ) -> HandlerResult {
            Err("cleanup failed".into())
        }
    }

    fn dispatcher() -> (Dispatcher, mpsc::Receiver<HostEvent>) {
        let dispatcher = Dispatcher::new(
            PoolConfig::default().with_threads(2, 4),
            Arc::new(Fragile),
            Arc::new(HostMetrics::new()),
        );
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(Arc::new(move |event: &HostEvent| {
            let _ = tx.send(event.clone());
        }));
        dispatcher.start().unwrap();
        (dispatcher, rx)
    }

    fn connection(id: u64) -> Connection {
        let (conn, _queue) = Connection::new(
            ConnectionId::new(id),
            Direction::Accepted,
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
            FrameCodec::new(),
        );
        conn.mark_connected();
        conn
    }

    #[test]
    fn test_events_reach_listeners_in_order() {
        let (dispatcher, rx) = dispatcher();
        let conn = connection(1);
        for i in 0..20u8 {
            dispatcher.post(
                &conn,
                HostEvent::Received {
                    id: conn.id(),
                    payload: Bytes::from(vec![i]),
                },
            );
        }

        for i in 0..20u8 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                HostEvent::Received { payload, .. } => assert_eq!(payload[0], i),
                other => panic!("unexpected event {other:?}"),
            }
        }
        dispatcher.stop();
    }

    #[test]
    fn test_received_fault_aborts_connection() {
        let (dispatcher, _rx) = dispatcher();
        let conn = connection(2);
        dispatcher.post(
            &conn,
            HostEvent::Received {
                id: conn.id(),
                payload: Bytes::from_static(b"boom"),
            },
        );
        dispatcher.stop();

        let failure = conn.take_failure().unwrap();
        assert!(matches!(&*failure, HostError::Handler(e) if e.is_panic()));
        assert!(conn.close_token().is_cancelled());
        assert!(!conn.is_explicitly_closed());
    }

    #[test]
    fn test_disconnected_fault_is_an_exception() {
        let (dispatcher, rx) = dispatcher();
        let conn = connection(3);
        dispatcher.post(
            &conn,
            HostEvent::Disconnected {
                id: conn.id(),
                error: None,
            },
        );

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            HostEvent::Exception { error } => {
                assert_eq!(error.to_string(), "Handler fault: cleanup failed")
            }
            other => panic!("unexpected event {other:?}"),
        }
        dispatcher.stop();
    }
}
