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

//! UDP endpoint
//!
//! One socket, many peers. Every distinct remote address becomes its own
//! connection; the endpoint's receive task only demultiplexes datagrams
//! onto the peer workers, which reassemble and drain frames exactly like a
//! TCP connection does.

use crate::host::HostShared;
use crate::worker::spawn_datagram;
use crate::{ConnectionId, Result, UdpConfig};
use bytes::Bytes;
use sockhost_codec::FrameCodec;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Largest UDP payload
const MAX_DATAGRAM: usize = 65536;

/// Bind the endpoint socket
///
/// Must be called inside the I/O runtime.
pub(crate) fn bind(config: &UdpConfig) -> Result<UdpSocket> {
    let socket = std::net::UdpSocket::bind(config.address)?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket)?)
}

struct Peer {
    id: ConnectionId,
    datagrams: mpsc::Sender<Bytes>,
}

struct Endpoint {
    socket: Arc<UdpSocket>,
    shared: Arc<HostShared>,
    codec: FrameCodec,
    peers: HashMap<SocketAddr, Peer>,
}

impl Endpoint {
    fn open_peer(&mut self, addr: SocketAddr) -> Option<&Peer> {
        match spawn_datagram(&self.shared, self.socket.clone(), addr, self.codec.clone()) {
            Ok((connection, datagrams)) => {
                debug!(peer_addr = %addr, connection_id = %connection.id(), "UDP peer opened");
                self.peers.insert(
                    addr,
                    Peer {
                        id: connection.id(),
                        datagrams,
                    },
                );
                self.peers.get(&addr)
            }
            Err(e) => {
                warn!(peer_addr = %addr, error = %e, "Failed to open UDP peer");
                self.shared.metrics.connection_error();
                None
            }
        }
    }

    /// Forget peers whose connection has ended
    ///
    /// A peer reaped by the idle sweep or closed by a fault leaves a closed
    /// sender behind until the same address writes again; this bounds the
    /// table to peers that are still alive.
    fn prune(&mut self) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, peer| !peer.datagrams.is_closed());
        let pruned = before - self.peers.len();
        if pruned > 0 {
            debug!(pruned, peers = self.peers.len(), "Pruned closed UDP peers");
        }
        pruned
    }

    fn deliver(&mut self, from: SocketAddr, datagram: Bytes) {
        let needs_peer = self
            .peers
            .get(&from)
            .is_none_or(|peer| peer.datagrams.is_closed());
        if needs_peer {
            self.peers.remove(&from);
            if self.open_peer(from).is_none() {
                return;
            }
        }

        let Some(peer) = self.peers.get(&from) else {
            return;
        };
        match peer.datagrams.try_send(datagram) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %peer.id, "UDP peer queue full, dropping datagram");
            }
            Err(TrySendError::Closed(_)) => {
                trace!(connection_id = %peer.id, "UDP peer closed, dropping datagram");
                self.peers.remove(&from);
            }
        }
    }
}

/// Receive datagrams and route them to peer connections
#[instrument(name = "udp_endpoint", skip_all, fields(local_addr = ?socket.local_addr().ok()))]
pub(crate) async fn run(
    socket: UdpSocket,
    remote: Option<SocketAddr>,
    shared: Arc<HostShared>,
    codec: FrameCodec,
    shutdown: CancellationToken,
) {
    let mut endpoint = Endpoint {
        socket: Arc::new(socket),
        shared,
        codec,
        peers: HashMap::new(),
    };
    if let Some(remote) = remote {
        endpoint.open_peer(remote);
    }

    let mut prune = interval(endpoint.shared.config.idle_check_interval);
    prune.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        select! {
            _ = shutdown.cancelled() => break,
            _ = prune.tick() => {
                endpoint.prune();
            }
            received = endpoint.socket.recv_from(&mut buffer) => match received {
                Ok((0, from)) => trace!(peer_addr = %from, "Ignoring empty datagram"),
                Ok((n, from)) => endpoint.deliver(from, Bytes::copy_from_slice(&buffer[..n])),
                Err(e) => {
                    // ICMP unreachable from a previous send surfaces here on some platforms
                    debug!(error = %e, "UDP receive failed");
                }
            },
        }
    }

    info!(peers = endpoint.peers.len(), "UDP endpoint stopped");
}
