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

//! # Sockhost Connection Host
//!
//! An embeddable, protocol-agnostic TCP/UDP connection engine. A
//! [`ConnectionHost`] accepts and establishes connections, frames
//! application messages onto the wire with [`sockhost_codec`], and
//! delivers connection events to the application on a bounded worker pool
//! so that a slow or failing callback never stalls socket I/O.
//!
//! # Architecture
//!
//! ```text
//! ConnectionHost
//!     ├── connectors: TCP listener / outbound connector / UDP endpoint
//!     ├── ConnectionManager ── Connection (handle) ── ConnectionWorker (I/O task)
//!     └── Dispatcher ── WorkerPool ── ConnectionService + event listeners
//! ```
//!
//! I/O runs on a tokio runtime owned by the host. Every event a
//! connection worker produces is posted to the pool keyed by the
//! connection ID, which keeps each connection's events in order.
//!
//! # Example
//!
//! ```no_run
//! use sockhost_service::{
//!     Connection, ConnectionHost, ConnectionId, ConnectionService, HandlerResult, HostConfig,
//!     ListenerConfig,
//! };
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ConnectionService for Echo {
//!     fn on_received(&self, _id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
//!         conn.send(&payload)?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = ConnectionHost::new(HostConfig::default(), Arc::new(Echo))?;
//!     host.add_listener(ListenerConfig::new("0.0.0.0:7000".parse()?))?;
//!     host.start()?;
//!     std::thread::park();
//!     host.stop();
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod dialer;
mod dispatch;
mod error;
mod handler;
mod host;
mod listener;
mod manager;
mod metrics;
mod types;
mod udp;
mod worker;

pub use config::{ConnectorConfig, HostConfig, ListenerConfig, ReconnectPolicy, UdpConfig};
pub use connection::Connection;
pub use error::{HostError, Result};
pub use handler::{
    CallbackService, ConnectionService, EventListener, HandlerResult, HostEvent, NoopService,
};
pub use host::ConnectionHost;
pub use manager::BroadcastResult;
pub use metrics::{HostMetrics, MetricsSnapshot};
pub use types::{ConnectionId, ConnectionInfo, ConnectionState, Direction, HostSnapshot};

pub use sockhost_codec::{Compression, CryptoService, Encryption};
