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

//! TCP listener
//!
//! A listener binds once and then runs several accept tasks against the
//! same socket, so a burst of inbound connections is not serialized
//! behind a single pending accept.

use crate::host::HostShared;
use crate::worker::spawn_stream;
use crate::{Direction, HostConfig, ListenerConfig, Result};
use sockhost_codec::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept, so descriptor exhaustion does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Bind and listen
///
/// Must be called inside the I/O runtime.
pub(crate) fn bind(config: &ListenerConfig, host: &HostConfig) -> Result<TcpListener> {
    let socket = match config.address {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    if let Err(e) = socket.set_recv_buffer_size(host.recv_buffer_size()) {
        debug!(address = %config.address, error = %e, "Failed to set receive buffer size");
    }
    socket.bind(config.address)?;
    let listener = socket.listen(config.backlog.unwrap_or(host.backlog))?;
    Ok(listener)
}

/// Spawn the accept tasks for a bound listener
///
/// Must be called inside the I/O runtime.
pub(crate) fn spawn_accept_tasks(
    listener: TcpListener,
    tasks: usize,
    shared: Arc<HostShared>,
    codec: FrameCodec,
    shutdown: CancellationToken,
) {
    let listener = Arc::new(listener);
    for index in 0..tasks {
        tokio::spawn(accept_loop(
            index,
            listener.clone(),
            shared.clone(),
            codec.clone(),
            shutdown.clone(),
        ));
    }
}

async fn accept_loop(
    index: usize,
    listener: Arc<TcpListener>,
    shared: Arc<HostShared>,
    codec: FrameCodec,
    shutdown: CancellationToken,
) {
    let local_addr = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    debug!(local_addr = %local_addr, task = index, "Accept task started");

    loop {
        select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, task = index, "Accepted connection");
                    if let Err(e) = spawn_stream(&shared, stream, Direction::Accepted, codec.clone()) {
                        warn!(peer_addr = %peer_addr, error = %e, "Failed to register accepted connection");
                        shared.metrics.connection_error();
                    }
                }
                Err(e) => {
                    error!(local_addr = %local_addr, error = %e, "Accept failed");
                    shared.metrics.connection_error();
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    info!(local_addr = %local_addr, task = index, "Accept task stopped");
}
