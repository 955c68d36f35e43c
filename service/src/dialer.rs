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

//! Outbound TCP connector
//!
//! The dialer owns one outbound connection at a time. After a failed
//! attempt, or after a disconnect that was not explicit, it waits for the
//! reconnect interval and dials again, as long as the policy allows.

use crate::host::HostShared;
use crate::worker::spawn_stream;
use crate::{ConnectorConfig, Direction, HostConfig, HostError, HostEvent, Result};
use sockhost_codec::FrameCodec;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::select;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Resolve the remote and connect to the first address that answers
pub(crate) async fn connect(config: &ConnectorConfig, host: &HostConfig) -> Result<TcpStream> {
    let failed = |source: io::Error| HostError::ConnectFailed {
        address: config.remote.clone(),
        source,
    };

    let addresses: Vec<SocketAddr> = lookup_host(config.remote.as_str())
        .await
        .map_err(failed)?
        .collect();

    let mut last_error =
        io::Error::new(io::ErrorKind::NotFound, "remote resolved to no addresses");
    for address in addresses {
        match connect_addr(address, config, host).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(remote = %address, error = %e, "Connect attempt failed");
                last_error = e;
            }
        }
    }
    Err(failed(last_error))
}

async fn connect_addr(
    address: SocketAddr,
    config: &ConnectorConfig,
    host: &HostConfig,
) -> io::Result<TcpStream> {
    let socket = match address {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    if let Err(e) = socket.set_recv_buffer_size(host.recv_buffer_size()) {
        debug!(error = %e, "Failed to set receive buffer size");
    }
    if let Some(local) = config.local {
        socket.bind(local)?;
    }
    match timeout(config.connect_timeout, socket.connect(address)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
    }
}

/// Dial, hold the connection, and redial according to the reconnect policy
#[instrument(name = "connector", skip_all, fields(remote = %config.remote))]
pub(crate) async fn run(
    config: ConnectorConfig,
    shared: Arc<HostShared>,
    codec: FrameCodec,
    shutdown: CancellationToken,
) {
    let policy = config.reconnect.clone();
    let mut failures: u32 = 0;

    loop {
        let attempt = select! {
            _ = shutdown.cancelled() => break,
            attempt = connect(&config, &shared.config) => attempt,
        };

        match attempt.and_then(|stream| {
            spawn_stream(&shared, stream, Direction::Initiated, codec.clone())
        }) {
            Ok(connection) => {
                failures = 0;
                select! {
                    _ = shutdown.cancelled() => break,
                    _ = connection.closed() => {}
                }
                if connection.is_explicitly_closed() || !policy.enabled {
                    debug!(connection_id = %connection.id(), "Connection closed, not reconnecting");
                    break;
                }
                info!(
                    connection_id = %connection.id(),
                    interval = ?policy.interval,
                    "Connection lost, reconnecting"
                );
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(attempt = failures, error = %e, "Connect failed");
                shared.metrics.connect_failure();
                shared.dispatcher.post_global(HostEvent::ConnectFailed {
                    remote: config.remote.clone(),
                    attempt: failures,
                    error: Arc::new(e),
                });
                if !policy.allows_retry(failures) {
                    info!(attempts = failures, "Giving up on connector");
                    break;
                }
            }
        }

        select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(policy.interval) => {}
        }
    }

    debug!("Connector stopped");
}
