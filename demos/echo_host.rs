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

//! Echo Host Example
//!
//! Runs a connection host that:
//! - Accepts framed TCP connections on 127.0.0.1:4000
//! - Answers framed UDP datagrams on 127.0.0.1:4001
//! - Echoes every message back to its sender
//! - Drops connections that stay idle for a minute
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example echo_host
//! ```
//!
//! Press Enter to stop the host.

use bytes::Bytes;
use sockhost_service::{
    Connection, ConnectionHost, ConnectionId, ConnectionService, HandlerResult, HostConfig,
    HostError, HostEvent, ListenerConfig, UdpConfig,
};
use std::sync::Arc;
use std::time::Duration;

struct EchoService;

impl ConnectionService for EchoService {
    fn on_connected(&self, id: ConnectionId, conn: &Connection) -> HandlerResult {
        tracing::info!("Client {} connected from {}", id, conn.peer_addr());
        Ok(())
    }

    fn on_received(&self, id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
        tracing::debug!("Client {} sent {} bytes", id, payload.len());
        conn.send(&payload)?;
        Ok(())
    }

    fn on_disconnected(
        &self,
        id: ConnectionId,
        conn: &Connection,
        error: Option<&HostError>,
    ) -> HandlerResult {
        match error {
            Some(e) => tracing::info!("Client {} disconnected: {}", id, e),
            None => tracing::info!("Client {} disconnected", id),
        }
        tracing::debug!(
            "Client {} exchanged {} messages in, {} messages out",
            id,
            conn.messages_received(),
            conn.messages_sent()
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let config = HostConfig::default()
        .with_threads(2, 8)
        .with_idle_timeout(Some(Duration::from_secs(60)))
        .with_idle_check_interval(Duration::from_secs(5));

    let host = ConnectionHost::new(config, Arc::new(EchoService))?;
    host.add_listener(ListenerConfig::new("127.0.0.1:4000".parse()?))?;
    host.add_udp_endpoint(UdpConfig::new("127.0.0.1:4001".parse()?))?;
    host.subscribe(|event: &HostEvent| {
        if let HostEvent::Exception { error } = event {
            tracing::error!("Host exception: {}", error);
        }
    });

    host.start()?;
    println!("Echo host listening on {:?}", host.local_addrs());
    println!("Press Enter to stop\n");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    println!("Shutting down...");
    host.stop();
    println!("{:#?}", host.metrics());

    Ok(())
}
